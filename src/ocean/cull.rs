//! GPU tile culler: frustum-tests every cell and bins the survivors by
//! integer LOD into per-tier ranges of `ocean-lod-data`, counting them in
//! the indirect draw blocks of `ocean-lod-counter`.

use bytemuck::{Pod, Zeroable};
use glam::{IVec2, UVec2, Vec3};

use crate::camera::Frustum;
use crate::error::Result;
use crate::gpu;
use crate::graph::{ResourceLookup, OCEAN_LODS, OCEAN_LOD_COUNTER, OCEAN_LOD_DATA};
use crate::ocean::grid::GridPlacement;
use crate::params::MAX_LOD_INDIRECT;

/// One DrawIndexedIndirect argument block, padded to 32 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct IndirectSlot {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
    pub _padding: [u32; 3],
}

pub const INDIRECT_SLOT_SIZE: u64 = std::mem::size_of::<IndirectSlot>() as u64;

/// Byte size of the counter buffer
pub const COUNTER_BUFFER_SIZE: u64 = MAX_LOD_INDIRECT as u64 * INDIRECT_SLOT_SIZE;

/// Per-visible-tile instance data
///
/// `offset_lod = (world x, world z, continuous lod, integer level)`,
/// `edge_lods = (-x, +x, -z, +z)` neighbour levels, never below the tile's own.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TileRecord {
    pub offset_lod: [f32; 4],
    pub edge_lods: [f32; 4],
}

pub const TILE_RECORD_SIZE: u64 = std::mem::size_of::<TileRecord>() as u64;

/// Byte size of the tile buffer: one full-grid range per tier
pub fn tile_buffer_size(cell_count: u32) -> u64 {
    cell_count as u64 * MAX_LOD_INDIRECT as u64 * TILE_RECORD_SIZE
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct CullParams {
    image_offset: [i32; 2],
    num_threads: [u32; 2],
    grid_base: [f32; 2],
    grid_size: [f32; 2],
    heightmap_range: [f32; 2],
    lod_stride: u32,
    num_lods: u32,
    frustum: [[f32; 4]; 6],
}

/// Output of [`cull_reference`]: tiles per tier in cell order
#[derive(Debug, Clone, Default)]
pub struct CullResult {
    pub tiles: Vec<Vec<TileRecord>>,
}

impl CullResult {
    pub fn counts(&self) -> Vec<u32> {
        self.tiles.iter().map(|tier| tier.len() as u32).collect()
    }

    pub fn total(&self) -> usize {
        self.tiles.iter().map(Vec::len).sum()
    }
}

/// CPU mirror of the cull kernel. `lod_texels` is the LOD texture contents.
pub fn cull_reference(
    lod_texels: &[f32],
    placement: &GridPlacement,
    frustum: &Frustum,
    heightmap_range: (f32, f32),
    num_lods: u32,
) -> CullResult {
    let dims = placement.dims;
    let load = |cell: IVec2| {
        let t: UVec2 = placement.texel(cell);
        lod_texels[(t.y * dims.x + t.x) as usize]
    };

    let mut tiles = vec![Vec::new(); num_lods as usize];
    for y in 0..dims.y {
        for x in 0..dims.x {
            let (min, max) = placement.cell_bounds(UVec2::new(x, y));
            let lo = Vec3::new(min.x, heightmap_range.0, min.y);
            let hi = Vec3::new(max.x, heightmap_range.1, max.y);
            if !frustum.intersects_aabb(lo, hi) {
                continue;
            }

            let cell = IVec2::new(x as i32, y as i32);
            let lod = load(cell);
            let level = (lod.floor() as u32).min(num_lods - 1);
            let edge = |dx, dy| lod.max(load(cell + IVec2::new(dx, dy)));
            tiles[level as usize].push(TileRecord {
                offset_lod: [min.x, min.y, lod, level as f32],
                edge_lods: [edge(-1, 0), edge(1, 0), edge(0, -1), edge(0, 1)],
            });
        }
    }
    CullResult { tiles }
}

pub struct LodCuller {
    init_pipeline: wgpu::ComputePipeline,
    cull_pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    index_counts_buffer: wgpu::Buffer,
    heightmap_range: (f32, f32),
    num_lods: u32,
}

impl LodCuller {
    /// `index_counts` holds one entry per mesh tier, finest first.
    pub fn new(
        device: &wgpu::Device,
        index_counts: &[u32],
        heightmap_range: (f32, f32),
    ) -> Result<Self> {
        gpu::scoped(device, || Ok(Self::build(device, index_counts, heightmap_range)))
    }

    fn build(device: &wgpu::Device, index_counts: &[u32], heightmap_range: (f32, f32)) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Ocean Cull Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/cull.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Ocean Cull Layout"),
            entries: &[
                gpu::uniform_entry(0, wgpu::ShaderStages::COMPUTE),
                gpu::storage_entry(1, false),
                gpu::storage_entry(2, false),
                gpu::texture_entry(3, wgpu::ShaderStages::COMPUTE, false),
                gpu::uniform_entry(4, wgpu::ShaderStages::COMPUTE),
            ],
        });

        let init_pipeline = gpu::compute_pipeline(
            device,
            "Ocean Init Counters Pipeline",
            &shader,
            &bind_group_layout,
            "init_counters",
        );
        let cull_pipeline = gpu::compute_pipeline(
            device,
            "Ocean Cull Pipeline",
            &shader,
            &bind_group_layout,
            "main",
        );

        let mut counts = [0u32; MAX_LOD_INDIRECT as usize];
        for (slot, &count) in counts.iter_mut().zip(index_counts) {
            *slot = count;
        }
        let index_counts_buffer = gpu::uniform_buffer(device, "Ocean LOD Index Counts", &counts);
        let params_buffer = gpu::uniform_buffer(device, "Ocean Cull Params", &CullParams::zeroed());

        Self {
            init_pipeline,
            cull_pipeline,
            bind_group_layout,
            params_buffer,
            index_counts_buffer,
            heightmap_range,
            num_lods: index_counts.len().clamp(1, MAX_LOD_INDIRECT as usize) as u32,
        }
    }

    pub fn num_lods(&self) -> u32 {
        self.num_lods
    }

    /// Record the counter reset and the cull dispatch as two passes so the
    /// reset is complete before any append.
    pub fn record(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        lookup: &dyn ResourceLookup,
        placement: &GridPlacement,
        frustum: &Frustum,
    ) -> Result<()> {
        let lods = lookup.texture(OCEAN_LODS)?;
        let counter = lookup.buffer(OCEAN_LOD_COUNTER)?;
        let data = lookup.buffer(OCEAN_LOD_DATA)?;

        let params = CullParams {
            image_offset: placement.image_offset.to_array(),
            num_threads: placement.dims.to_array(),
            grid_base: placement.base.to_array(),
            grid_size: placement.cell_size.to_array(),
            heightmap_range: [self.heightmap_range.0, self.heightmap_range.1],
            lod_stride: placement.dims.x * placement.dims.y,
            num_lods: self.num_lods,
            frustum: frustum.to_cols(),
        };
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));

        let lod_view = lods.full_view();
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Ocean Cull Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: counter.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: data.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&lod_view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: self.index_counts_buffer.as_entire_binding(),
                },
            ],
        });

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Ocean Init Counters"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.init_pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(1, 1, 1);
        }

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Ocean Cull Tiles"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.cull_pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(
                gpu::group_count(placement.dims.x, 8),
                gpu::group_count(placement.dims.y, 8),
                1,
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::ViewParams;
    use crate::ocean::grid::classify_reference;
    use crate::params::GridConfig;
    use glam::{Mat4, Vec4};

    fn grid_64() -> GridConfig {
        GridConfig {
            size_m: [1000.0, 1000.0],
            grid_width: 64,
            grid_height: 64,
            grid_resolution: 8,
        }
    }

    fn classify(camera: Vec3) -> (GridPlacement, Vec<f32>) {
        let placement = GridPlacement::from_camera(camera, &grid_64());
        let texels = classify_reference(camera, &placement, 64.0, 3.0);
        (placement, texels)
    }

    #[test]
    fn test_gpu_structs_are_32_bytes() {
        assert_eq!(INDIRECT_SLOT_SIZE, 32);
        assert_eq!(TILE_RECORD_SIZE, 32);
        assert_eq!(std::mem::size_of::<CullParams>(), 144);
    }

    #[test]
    fn test_infinite_frustum_keeps_every_cell() {
        let camera = Vec3::new(0.0, 30.0, 0.0);
        let (placement, texels) = classify(camera);
        let result = cull_reference(&texels, &placement, &Frustum::infinite(), (-10.0, 10.0), 4);
        assert_eq!(result.total(), 4096);
        assert_eq!(result.counts().iter().sum::<u32>(), 4096);
    }

    #[test]
    fn test_cells_behind_plane_are_dropped() {
        let camera = Vec3::new(0.0, 30.0, 0.0);
        let (placement, texels) = classify(camera);

        // Keep only x >= 0
        let mut frustum = Frustum::infinite();
        frustum.planes[0] = Vec4::new(1.0, 0.0, 0.0, 0.0);
        let result = cull_reference(&texels, &placement, &frustum, (-10.0, 10.0), 4);

        assert!(result.total() < 4096);
        for tile in result.tiles.iter().flatten() {
            let max_x = tile.offset_lod[0] + placement.cell_size.x;
            assert!(max_x >= 0.0);
        }

        // Every cell on the inside appears exactly once
        let inside = (0..64)
            .filter(|&x| placement.cell_bounds(UVec2::new(x, 0)).1.x >= 0.0)
            .count();
        let mut offsets: Vec<(i64, i64)> = result
            .tiles
            .iter()
            .flatten()
            .map(|t| (t.offset_lod[0] as i64, t.offset_lod[1] as i64))
            .collect();
        offsets.sort_unstable();
        offsets.dedup();
        assert_eq!(offsets.len(), result.total());
        assert_eq!(result.total(), inside * 64);
    }

    #[test]
    fn test_visible_never_exceeds_classified() {
        let camera = Vec3::new(40.0, 25.0, -60.0);
        let (placement, texels) = classify(camera);
        let view_proj = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.5, 4000.0)
            * Mat4::look_at_rh(camera, Vec3::new(40.0, 0.0, 100.0), Vec3::Y);
        let view = ViewParams::new(camera, view_proj);

        let result = cull_reference(&texels, &placement, &view.frustum, (-10.0, 10.0), 4);
        let classified = cull_reference(&texels, &placement, &Frustum::infinite(), (-10.0, 10.0), 4);
        assert!(result.total() > 0);
        assert!(result.total() < 4096);
        for (visible, all) in result.counts().iter().zip(classified.counts()) {
            assert!(*visible <= all);
        }
    }

    #[test]
    fn test_tiles_land_in_their_floor_tier() {
        let (placement, texels) = classify(Vec3::new(0.0, 30.0, 0.0));
        let result = cull_reference(&texels, &placement, &Frustum::infinite(), (-10.0, 10.0), 4);
        for (level, tier) in result.tiles.iter().enumerate() {
            for tile in tier {
                let lod = tile.offset_lod[2];
                assert_eq!(tile.offset_lod[3], level as f32);
                assert_eq!((lod.floor() as usize).min(3), level);
                assert!(tile.edge_lods.iter().all(|&edge| edge >= lod));
            }
        }
    }

    #[test]
    fn test_border_edges_use_own_lod() {
        let (placement, texels) = classify(Vec3::ZERO);
        let result = cull_reference(&texels, &placement, &Frustum::infinite(), (-10.0, 10.0), 4);
        let corner = result
            .tiles
            .iter()
            .flatten()
            .find(|t| t.offset_lod[0] == placement.base.x && t.offset_lod[1] == placement.base.y)
            .copied()
            .unwrap();
        assert_eq!(corner.edge_lods[0], corner.offset_lod[2]);
        assert_eq!(corner.edge_lods[2], corner.offset_lod[2]);
    }
}
