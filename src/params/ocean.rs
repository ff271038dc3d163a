//! Ocean grid, spectrum and LOD parameters.

use crate::error::{OceanError, Result};

/// Maximum number of LOD tiers that get an indirect draw slot.
pub const MAX_LOD_INDIRECT: u32 = 8;

/// Largest per-cell tessellation; vertex positions are stored as `u8`.
pub const MAX_GRID_RESOLUTION: u32 = 128;

/// Largest accepted FFT resolution (per side); keeps one butterfly pass
/// within a single dispatch dimension.
pub const MAX_FFT_SIZE: u32 = 2048;

/// Tile grid layout
#[derive(Debug, Clone)]
pub struct GridConfig {
    /// World extent covered by the grid, x and z (meters).
    /// Also the world size of one height/displacement spectrum patch.
    pub size_m: [f32; 2],

    /// Number of cells along x
    pub grid_width: u32,

    /// Number of cells along z
    pub grid_height: u32,

    /// Quads per cell side at the finest tier (power of two)
    pub grid_resolution: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            size_m: [1024.0, 1024.0],
            grid_width: 32,
            grid_height: 32,
            grid_resolution: 32,
        }
    }
}

impl GridConfig {
    /// World size of one cell (meters)
    pub fn cell_size(&self) -> [f32; 2] {
        [
            self.size_m[0] / self.grid_width as f32,
            self.size_m[1] / self.grid_height as f32,
        ]
    }

    pub fn cell_count(&self) -> u32 {
        self.grid_width * self.grid_height
    }

    /// Number of mesh tiers: strides 1, 2, 4, ..., grid_resolution
    pub fn lod_tiers(&self) -> u32 {
        self.grid_resolution.max(1).ilog2() + 1
    }
}

/// Square transform resolutions for the three synthesized fields
#[derive(Debug, Clone, Copy)]
pub struct FftSizes {
    pub height: u32,
    pub displacement: u32,
    /// Conventionally >= height for sharper shading detail
    pub normal: u32,
}

impl Default for FftSizes {
    fn default() -> Self {
        Self {
            height: 256,
            displacement: 128,
            normal: 256,
        }
    }
}

/// Complete ocean configuration (immutable after construction)
#[derive(Debug, Clone)]
pub struct OceanConfig {
    pub grid: GridConfig,
    pub fft: FftSizes,

    /// World size of one normal-map patch (meters)
    pub normal_size_m: [f32; 2],

    /// Distance at which a cell drops one LOD (meters).
    /// Level = log2(1 + d / lod_distance_m).
    pub lod_distance_m: f32,

    /// Conservative vertical extent used for every cell's culling volume (meters)
    pub heightmap_range_m: (f32, f32),

    /// Horizontal displacement multiplier applied while baking
    pub choppiness: f32,

    /// Mip count of the normal field; `None` means the full chain
    pub normal_mip_levels: Option<u32>,
}

impl Default for OceanConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            fft: FftSizes::default(),
            normal_size_m: [128.0, 128.0],
            lod_distance_m: 64.0,
            heightmap_range_m: (-10.0, 10.0),
            choppiness: 1.0,
            normal_mip_levels: None,
        }
    }
}

/// Mip levels of a full chain for a square texture of `size`
pub fn full_mip_chain(size: u32) -> u32 {
    size.max(1).ilog2() + 1
}

impl OceanConfig {
    /// Reject configurations the GPU pipeline cannot run.
    pub fn validate(&self) -> Result<()> {
        let grid = &self.grid;
        if grid.grid_width == 0 || grid.grid_height == 0 {
            return Err(OceanError::invalid(
                "grid",
                format!(
                    "cell grid must be non-empty, got {}x{}",
                    grid.grid_width, grid.grid_height
                ),
            ));
        }
        if !grid.grid_resolution.is_power_of_two()
            || !(2..=MAX_GRID_RESOLUTION).contains(&grid.grid_resolution)
        {
            return Err(OceanError::invalid(
                "grid_resolution",
                format!(
                    "must be a power of two in 2..={}, got {}",
                    MAX_GRID_RESOLUTION, grid.grid_resolution
                ),
            ));
        }
        if grid.lod_tiers() > MAX_LOD_INDIRECT {
            return Err(OceanError::invalid(
                "grid_resolution",
                format!("{} tiers exceed {}", grid.lod_tiers(), MAX_LOD_INDIRECT),
            ));
        }
        for (field, size) in [
            ("size_m", grid.size_m),
            ("normal_size_m", self.normal_size_m),
        ] {
            if !size.iter().all(|v| v.is_finite() && *v > 0.0) {
                return Err(OceanError::invalid(
                    field,
                    format!("must be positive, got {:?}", size),
                ));
            }
        }
        for (field, n) in [
            ("fft.height", self.fft.height),
            ("fft.displacement", self.fft.displacement),
            ("fft.normal", self.fft.normal),
        ] {
            if !n.is_power_of_two() || !(2..=MAX_FFT_SIZE).contains(&n) {
                return Err(OceanError::invalid(
                    field,
                    format!("FFT size must be a power of 2 in 2..={}, got {}", MAX_FFT_SIZE, n),
                ));
            }
        }
        if !(self.lod_distance_m > 0.0) {
            return Err(OceanError::invalid(
                "lod_distance_m",
                format!("must be > 0, got {}", self.lod_distance_m),
            ));
        }
        let (lo, hi) = self.heightmap_range_m;
        if !(lo <= hi) {
            return Err(OceanError::invalid(
                "heightmap_range_m",
                format!("min {} exceeds max {}", lo, hi),
            ));
        }
        if let Some(levels) = self.normal_mip_levels {
            let full = full_mip_chain(self.fft.normal);
            if levels == 0 || levels > full {
                return Err(OceanError::invalid(
                    "normal_mip_levels",
                    format!("must be in 1..={}, got {}", full, levels),
                ));
            }
        }
        Ok(())
    }

    /// Mip levels of the baked height-displacement and gradient-jacobian maps
    pub fn vertex_mip_levels(&self) -> u32 {
        self.grid.lod_tiers().min(full_mip_chain(self.fft.height))
    }

    pub fn normal_mip_levels(&self) -> u32 {
        self.normal_mip_levels
            .unwrap_or_else(|| full_mip_chain(self.fft.normal))
    }

    /// Normal-map UV scale relative to the height patch
    pub fn normal_uv_scale(&self) -> [f32; 2] {
        [
            self.grid.size_m[0] / self.normal_size_m[0],
            self.grid.size_m[1] / self.normal_size_m[1],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(OceanConfig::default().validate().is_ok());
    }

    #[test]
    fn test_non_power_of_two_fft_rejected() {
        let mut config = OceanConfig::default();
        config.fft.displacement = 100;
        match config.validate() {
            Err(OceanError::InvalidConfig { field, .. }) => assert_eq!(field, "fft.displacement"),
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_grid_rejected() {
        let mut config = OceanConfig::default();
        config.grid.grid_height = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lod_tiers() {
        let mut grid = GridConfig::default();
        grid.grid_resolution = 8;
        assert_eq!(grid.lod_tiers(), 4);
        grid.grid_resolution = 128;
        assert_eq!(grid.lod_tiers(), 8);
    }

    #[test]
    fn test_vertex_mips_clamped_to_texture_chain() {
        let mut config = OceanConfig::default();
        config.grid.grid_resolution = 128;
        config.fft.height = 32;
        // 8 tiers but a 32x32 texture only has 6 levels
        assert_eq!(config.vertex_mip_levels(), 6);
        assert_eq!(config.normal_mip_levels(), 9);
    }
}
