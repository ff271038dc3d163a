//! FFT ocean - GPU-resident ocean surface with an adaptive LOD tile grid,
//! GPU frustum culling and indirect draws.

pub mod camera;
pub mod cli;
pub mod demo;
pub mod error;
pub mod frame;
pub mod gpu;
pub mod graph;
pub mod ocean;
pub mod params;
pub mod rendering;

pub use error::{OceanError, Result};
