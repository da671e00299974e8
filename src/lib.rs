//! flow-rtx
//!
//! Scene ingestion for a wgpu ray tracer. Assets listed in a manifest are loaded,
//! their materials and textures deduplicated, and every material group turned
//! into a bottom-level acceleration structure. A registry tracks which instances
//! are active and the top-level structure is rebuilt whenever that set changes.
//!
//! High-level modules
//! - `gpu`: the device seam every other module is generic over
//! - `context`: the wgpu implementation of that seam
//! - `data_structures`: materials, textures, instances and draw calls
//! - `resources`: asset, texture and manifest loading plus material deduplication
//! - `geometry`: per-object buffers and bottom-level structures
//! - `scene`: the instance registry and the top-level rebuild protocol
//! - `render`: the per-frame façade handed to the render loop
//! - `config`: scene, texture and lens configuration
//!

pub mod config;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod geometry;
pub mod gpu;
pub mod render;
pub mod resources;
pub mod scene;

// Re-exports commonly used crates for convenience in downstream code.
pub use cgmath;
pub use wgpu;

pub use config::SceneConfig;
pub use context::Context;
pub use render::{LoadReport, SceneRenderer};

/// Installs the logger: `env_logger` natively (configured through `RUST_LOG`),
/// the browser console on wasm.
pub fn init_logger() {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        if let Err(e) = console_log::init_with_level(log::Level::Info) {
            web_sys::console::warn_1(&wasm_bindgen::JsValue::from_str(&format!(
                "Could not initialize logger: {e}"
            )));
        }
    }
}
