//! GPU ocean: camera-following LOD tile grid, frustum culling into indirect
//! draws, and FFT-synthesized height, displacement and normal fields.

pub mod cull;
pub mod fft;
pub mod grid;
pub mod mesh;
pub mod mipmap;
pub mod render;
pub mod spectrum;
pub mod synth;
pub mod system;

pub use cull::{IndirectSlot, TileRecord};
pub use grid::GridPlacement;
pub use mesh::{LodMeshTable, OceanVertex};
pub use spectrum::{SpectrumKind, SpectrumStore};
pub use system::{ocean_resources, OceanSystem};
