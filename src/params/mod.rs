//! Parameter definitions with physical units and documented semantics.
//!
//! All tunables live here with:
//! - Physical units (meters, seconds, etc.)
//! - Documented ranges and meanings
//! - Validation where a bad value would break the GPU pipeline

mod camera;
mod ocean;
mod render;

// Re-export all types
pub use camera::{CameraPreset, FixedCamera, FlyoverPath, OrbitPath};
pub use ocean::{
    full_mip_chain, FftSizes, GridConfig, OceanConfig, MAX_FFT_SIZE, MAX_GRID_RESOLUTION,
    MAX_LOD_INDIRECT,
};
pub use render::{RecordingConfig, RenderConfig};
