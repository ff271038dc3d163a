//! LOD grid controller: snaps the tile grid to the camera and classifies
//! every cell's continuous detail level into the LOD texture.

use bytemuck::{Pod, Zeroable};
use glam::{IVec2, UVec2, Vec2, Vec3};

use crate::error::Result;
use crate::gpu;
use crate::graph::{ResourceLookup, OCEAN_LODS};
use crate::params::GridConfig;

pub const LOD_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

/// Grid placement derived from the latched camera position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPlacement {
    /// Snapped grid center, in cells
    pub center: Vec2,
    /// World-space corner of cell (0, 0)
    pub base: Vec2,
    /// Texel offset for toroidal addressing of the LOD texture
    pub image_offset: IVec2,
    /// World size of one cell
    pub cell_size: Vec2,
    pub dims: UVec2,
}

impl GridPlacement {
    pub fn from_camera(camera: Vec3, grid: &GridConfig) -> Self {
        let dims = UVec2::new(grid.grid_width, grid.grid_height);
        let size = Vec2::from_array(grid.size_m);
        let cell_size = size / dims.as_vec2();

        let center = (Vec2::new(camera.x, camera.z) / cell_size).round();
        let base = center * cell_size - 0.5 * size;
        let image_offset = center.as_ivec2() - (dims.as_ivec2() >> 1);

        Self {
            center,
            base,
            image_offset,
            cell_size,
            dims,
        }
    }

    /// World-space [min, max] of a cell
    pub fn cell_bounds(&self, cell: UVec2) -> (Vec2, Vec2) {
        let min = self.base + cell.as_vec2() * self.cell_size;
        (min, min + self.cell_size)
    }

    /// LOD texel holding `cell` (cells outside the grid are clamped to its edge)
    pub fn texel(&self, cell: IVec2) -> UVec2 {
        let dims = self.dims.as_ivec2();
        let clamped = cell.clamp(IVec2::ZERO, dims - 1);
        (clamped + self.image_offset).rem_euclid(dims).as_uvec2()
    }
}

/// Continuous level for one cell; 0 for the cell under the camera.
pub fn cell_lod(camera: Vec3, cell_min: Vec2, cell_max: Vec2, lod_distance: f32, max_lod: f32) -> f32 {
    let eye = Vec2::new(camera.x, camera.z);
    let nearest = eye.clamp(cell_min, cell_max);
    let d = eye.distance(nearest);
    (1.0 + d / lod_distance).log2().clamp(0.0, max_lod)
}

/// Reference classification, texel-ordered exactly like the LOD texture.
pub fn classify_reference(
    camera: Vec3,
    placement: &GridPlacement,
    lod_distance: f32,
    max_lod: f32,
) -> Vec<f32> {
    let dims = placement.dims;
    let mut texels = vec![0.0; (dims.x * dims.y) as usize];
    for y in 0..dims.y {
        for x in 0..dims.x {
            let cell = UVec2::new(x, y);
            let (min, max) = placement.cell_bounds(cell);
            let texel = placement.texel(cell.as_ivec2());
            texels[(texel.y * dims.x + texel.x) as usize] =
                cell_lod(camera, min, max, lod_distance, max_lod);
        }
    }
    texels
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct LodParams {
    camera_pos: [f32; 3],
    max_lod: f32,
    image_offset: [i32; 2],
    num_threads: [u32; 2],
    grid_base: [f32; 2],
    grid_size: [f32; 2],
    lod_distance: f32,
    _padding: [f32; 3],
}

/// Compute stage writing `ocean-lods`
pub struct LodController {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    lod_distance: f32,
    max_lod: f32,
}

impl LodController {
    pub fn new(device: &wgpu::Device, lod_distance: f32, num_lods: u32) -> Result<Self> {
        gpu::scoped(device, || Ok(Self::build(device, lod_distance, num_lods)))
    }

    fn build(device: &wgpu::Device, lod_distance: f32, num_lods: u32) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Ocean Update LOD Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/update_lod.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Ocean Update LOD Layout"),
            entries: &[
                gpu::uniform_entry(0, wgpu::ShaderStages::COMPUTE),
                gpu::storage_texture_entry(1, LOD_FORMAT),
            ],
        });

        let pipeline = gpu::compute_pipeline(
            device,
            "Ocean Update LOD Pipeline",
            &shader,
            &bind_group_layout,
            "main",
        );

        let params_buffer = gpu::uniform_buffer(device, "Ocean LOD Params", &LodParams::zeroed());

        Self {
            pipeline,
            bind_group_layout,
            params_buffer,
            lod_distance,
            max_lod: num_lods.saturating_sub(1) as f32,
        }
    }

    pub fn record(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        lookup: &dyn ResourceLookup,
        camera: Vec3,
        placement: &GridPlacement,
    ) -> Result<()> {
        let lods = lookup.texture(OCEAN_LODS)?;

        let params = LodParams {
            camera_pos: camera.to_array(),
            max_lod: self.max_lod,
            image_offset: placement.image_offset.to_array(),
            num_threads: placement.dims.to_array(),
            grid_base: placement.base.to_array(),
            grid_size: placement.cell_size.to_array(),
            lod_distance: self.lod_distance,
            _padding: [0.0; 3],
        };
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));

        let view = lods.full_view();
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Ocean Update LOD Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
            ],
        });

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Ocean Build LOD Map"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(
            gpu::group_count(placement.dims.x, 8),
            gpu::group_count(placement.dims.y, 8),
            1,
        );

        log::trace!(
            "LOD map dispatched: center {:?}, offset {:?}",
            placement.center,
            placement.image_offset
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_64() -> GridConfig {
        GridConfig {
            size_m: [1000.0, 1000.0],
            grid_width: 64,
            grid_height: 64,
            grid_resolution: 8,
        }
    }

    #[test]
    fn test_camera_at_origin_snaps_to_origin() {
        let placement = GridPlacement::from_camera(Vec3::ZERO, &grid_64());
        assert_eq!(placement.center, Vec2::ZERO);
        assert_eq!(placement.base, Vec2::new(-500.0, -500.0));
        assert_eq!(placement.image_offset, IVec2::new(-32, -32));
    }

    #[test]
    fn test_snapping_rounds_to_nearest_cell() {
        let grid = grid_64();
        // 1000 / 64 = 15.625 m cells
        let placement = GridPlacement::from_camera(Vec3::new(20.0, 50.0, -7.0), &grid);
        assert_eq!(placement.center, Vec2::new(1.0, 0.0));
        assert_eq!(placement.base, Vec2::new(15.625 - 500.0, -500.0));

        // Small camera moves inside a cell do not move the grid
        let nudged = GridPlacement::from_camera(Vec3::new(21.0, 50.0, -6.0), &grid);
        assert_eq!(nudged, placement);
    }

    #[test]
    fn test_camera_cell_is_level_zero() {
        let grid = grid_64();
        let camera = Vec3::new(3.0, 40.0, 4.0);
        let placement = GridPlacement::from_camera(camera, &grid);
        let texels = classify_reference(camera, &placement, 64.0, 3.0);

        let camera_cell = ((Vec2::new(camera.x, camera.z) - placement.base) / placement.cell_size)
            .floor()
            .as_ivec2();
        let texel = placement.texel(camera_cell);
        assert_eq!(texels[(texel.y * 64 + texel.x) as usize], 0.0);
        assert!(texels.iter().all(|&lod| (0.0..=3.0).contains(&lod)));
        assert!(texels.iter().any(|&lod| lod == 3.0));
    }

    #[test]
    fn test_lod_grows_with_distance() {
        let near = cell_lod(Vec3::ZERO, Vec2::new(10.0, 0.0), Vec2::new(20.0, 10.0), 64.0, 7.0);
        let far = cell_lod(Vec3::ZERO, Vec2::new(300.0, 0.0), Vec2::new(310.0, 10.0), 64.0, 7.0);
        assert!(near < far);
        assert!(far < 7.0);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let grid = grid_64();
        let camera = Vec3::new(123.4, 20.0, -87.6);
        let first = GridPlacement::from_camera(camera, &grid);
        let second = GridPlacement::from_camera(camera, &grid);
        assert_eq!(first, second);
        assert_eq!(
            classify_reference(camera, &first, 64.0, 3.0),
            classify_reference(camera, &second, 64.0, 3.0)
        );
    }

    #[test]
    fn test_texel_mapping_is_a_permutation() {
        let placement = GridPlacement::from_camera(Vec3::new(-900.0, 0.0, 413.0), &grid_64());
        let mut seen = vec![false; 64 * 64];
        for y in 0..64 {
            for x in 0..64 {
                let t = placement.texel(IVec2::new(x, y));
                let idx = (t.y * 64 + t.x) as usize;
                assert!(!seen[idx]);
                seen[idx] = true;
            }
        }
    }
}
