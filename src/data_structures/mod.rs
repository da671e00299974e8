//! Scene data structures: materials, textures, instances and draw calls.
//!
//! - `material` holds the asset and GPU forms of a material
//! - `texture` names texture payloads and decodes them
//! - `instance` holds per-instance transforms and manifest placements
//! - `draw_call` ties a material group's buffers to its resolved material

pub mod draw_call;
pub mod instance;
pub mod material;
pub mod texture;
