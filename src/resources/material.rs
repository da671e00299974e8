//! Texture and material deduplication.
//!
//! Every material slot that references a texture is grouped by the texture's
//! identity and, within one identity, by its border modes. Each identity is
//! decoded and uploaded exactly once; each (identity, border modes) pair gets
//! exactly one sampler. Slots without a texture share a single 1x1 fallback
//! (a separate flat-normal one for normal maps).
//!
//! Slots are recorded as [`SlotAddress`]es while the materials are converted and
//! patched with their final sampler index once the samplers exist.

use std::collections::HashMap;

use crate::{
    config::TextureConfig,
    data_structures::{
        material::{MaterialConfig, MaterialGpuData, SlotAddress, TextureSlot},
        texture::{ImageData, TextureIdentity, TextureTable},
    },
    error::LoadError,
    gpu::{BorderMode, BorderModes, Command, FilterMode, Gpu},
};

/// Result of converting one batch of materials.
pub struct MaterialBatch<'a, G: Gpu> {
    /// One entry per input configuration, in input order.
    pub materials: Vec<MaterialGpuData>,
    /// Sampler `i` is addressed as `sampler_index_offset + i` by the materials.
    pub samplers: Vec<G::ImageSampler>,
    /// Image uploads that have to be submitted before the samplers are used.
    pub commands: Vec<Command<'a, G>>,
    pub stats: DedupStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupStats {
    pub images: usize,
    pub samplers: usize,
    pub fallback_samplers: usize,
    pub normal_fallback_samplers: usize,
}

struct UsageVariant {
    border: BorderModes,
    slots: Vec<SlotAddress>,
}

struct UsageGroup {
    identity: TextureIdentity,
    variants: Vec<UsageVariant>,
}

/// Slot usages gathered from a batch of materials.
#[derive(Default)]
struct TextureUsages {
    /// In order of first reference.
    groups: Vec<UsageGroup>,
    by_identity: HashMap<TextureIdentity, usize>,
    missing: Vec<SlotAddress>,
    missing_normals: Vec<SlotAddress>,
}

impl TextureUsages {
    fn collect(configs: &[MaterialConfig]) -> Self {
        let mut usages = Self::default();
        for (material, config) in configs.iter().enumerate() {
            for slot in TextureSlot::ALL {
                let address = SlotAddress { material, slot };
                match config.texture(slot) {
                    Some(texture) => usages.add(texture.identity(), texture.border, address),
                    None if slot.is_normal_map() => usages.missing_normals.push(address),
                    None => usages.missing.push(address),
                }
            }
        }
        usages
    }

    fn add(&mut self, identity: TextureIdentity, border: BorderModes, address: SlotAddress) {
        let group = match self.by_identity.get(&identity) {
            Some(&group) => group,
            None => {
                self.by_identity.insert(identity.clone(), self.groups.len());
                self.groups.push(UsageGroup {
                    identity,
                    variants: Vec::new(),
                });
                self.groups.len() - 1
            }
        };
        let variants = &mut self.groups[group].variants;
        match variants.iter_mut().find(|v| v.border == border) {
            Some(variant) => variant.slots.push(address),
            None => variants.push(UsageVariant {
                border,
                slots: vec![address],
            }),
        }
    }

    fn sampler_count(&self) -> usize {
        let textured: usize = self.groups.iter().map(|g| g.variants.len()).sum();
        textured + usize::from(!self.missing.is_empty()) + usize::from(!self.missing_normals.is_empty())
    }
}

fn backpatch(materials: &mut [MaterialGpuData], slots: &[SlotAddress], index: i32) {
    for address in slots {
        materials[address.material].texture_indices[address.slot.index()] = index;
    }
}

fn fallback_sampler<G: Gpu>(
    gpu: &G,
    label: &str,
    colour: [u8; 4],
    commands: &mut Vec<Command<'_, G>>,
) -> Result<G::ImageSampler, LoadError> {
    let image = gpu.create_image(label, 1, 1)?;
    commands.push(Command::UploadImage {
        image: image.clone(),
        data: ImageData::solid(colour),
    });
    Ok(gpu.create_image_sampler(image, FilterMode::NearestNeighbor, [BorderMode::Repeat; 2])?)
}

/// Converts `configs` to their GPU form and creates the samplers they reference.
///
/// * `sampler_index_offset` is the number of samplers already held by the scene, so
///   batches of several assets can be concatenated.
///
/// Nothing is submitted here; the caller submits `commands` together with the
/// material buffer fill.
pub fn convert_for_gpu_usage<'a, G: Gpu>(
    gpu: &G,
    configs: &[MaterialConfig],
    textures: &TextureTable,
    sampler_index_offset: usize,
    config: &TextureConfig,
) -> Result<MaterialBatch<'a, G>, LoadError> {
    // Sized up front, slot addresses index into it.
    let mut materials: Vec<MaterialGpuData> = configs.iter().map(MaterialGpuData::from).collect();
    let usages = TextureUsages::collect(configs);

    let mut samplers = Vec::with_capacity(usages.sampler_count());
    let mut commands = Vec::new();
    let mut stats = DedupStats::default();
    let next_index = |samplers: &[G::ImageSampler]| (sampler_index_offset + samplers.len() - 1) as i32;

    if !usages.missing.is_empty() {
        samplers.push(fallback_sampler(gpu, "fallback texture", config.fallback_color, &mut commands)?);
        backpatch(&mut materials, &usages.missing, next_index(&samplers));
        stats.fallback_samplers = 1;
        stats.images += 1;
    }

    if !usages.missing_normals.is_empty() {
        samplers.push(fallback_sampler(gpu, "fallback normal map", config.fallback_normal, &mut commands)?);
        backpatch(&mut materials, &usages.missing_normals, next_index(&samplers));
        stats.normal_fallback_samplers = 1;
        stats.images += 1;
    }

    for group in &usages.groups {
        assert!(
            !group.variants.is_empty(),
            "texture `{}` has no usages",
            group.identity
        );
        let data = textures.decode(&group.identity)?;
        let label = group.identity.to_string();
        let image = gpu.create_image(&label, data.width, data.height)?;
        log::debug!(
            "texture {label} ({}x{}) is sampled {} way(s)",
            data.width,
            data.height,
            group.variants.len()
        );
        commands.push(Command::UploadImage {
            image: image.clone(),
            data,
        });
        stats.images += 1;

        for variant in &group.variants {
            assert!(!variant.slots.is_empty());
            samplers.push(gpu.create_image_sampler(image.clone(), config.filter, variant.border)?);
            backpatch(&mut materials, &variant.slots, next_index(&samplers));
        }
    }

    assert!(
        materials.iter().all(MaterialGpuData::is_resolved),
        "material slot left without a sampler"
    );
    stats.samplers = samplers.len();

    Ok(MaterialBatch {
        materials,
        samplers,
        commands,
        stats,
    })
}
