//! LOD mesh table: one nested tile mesh per detail tier.
//!
//! A cell of the ocean grid is drawn as a square tile of `resolution` quads
//! per side. Tier 0 tessellates it at stride 1, every following tier doubles
//! the stride until a single quad remains, so a resolution of 32 gives six
//! tiers. Every tier is one triangle strip whose rows are separated by
//! [`PRIMITIVE_RESTART`].
//!
//! Vertices keep integer grid positions in `[0, resolution]`; the vertex
//! shader scales them into world space with the tile's offset from the cull
//! pass. Each vertex also records:
//!
//! - which half of the tile it lies in, so geomorphing snaps it toward the
//!   tile's inner corner and neighbouring strides land on the same points;
//! - which edge (if any) it sits on, so edge vertices take the neighbour's
//!   LOD and adjacent tiles of different tiers meet without cracks.
//!
//! The table is built once and never changes; the index into it is the LOD
//! level used by the indirect draws.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::error::Result;
use crate::gpu;

/// Sentinel that ends a triangle-strip row
pub const PRIMITIVE_RESTART: u16 = 0xffff;

/// Tile vertex: integer position plus edge-stitching weights
///
/// `pos = (x, y, x < res/2, y < res/2)`; `weights` marks at most one of the
/// -X, +X, -Y, +Y edges with 255.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct OceanVertex {
    pub pos: [u8; 4],
    pub weights: [u8; 4],
}

/// CPU-side mesh of one tier
#[derive(Debug, Clone, PartialEq)]
pub struct LodMeshData {
    /// Quads per side at this tier
    pub size: u32,
    pub stride: u32,
    pub vertices: Vec<OceanVertex>,
    pub indices: Vec<u16>,
}

impl LodMeshData {
    /// Build the tier covering `[0, resolution]` at `stride`
    pub fn build(resolution: u32, stride: u32) -> Self {
        let size = resolution / stride;
        let size_1 = size + 1;
        let half_size = resolution >> 1;

        let mut vertices = Vec::with_capacity((size_1 * size_1) as usize);
        for y in (0..=resolution).step_by(stride as usize) {
            for x in (0..=resolution).step_by(stride as usize) {
                let mut v = OceanVertex {
                    pos: [x as u8, y as u8, (x < half_size) as u8, (y < half_size) as u8],
                    weights: [0; 4],
                };

                if x == 0 {
                    v.weights[0] = 255;
                } else if x == resolution {
                    v.weights[1] = 255;
                } else if y == 0 {
                    v.weights[2] = 255;
                } else if y == resolution {
                    v.weights[3] = 255;
                }

                vertices.push(v);
            }
        }

        let mut indices = Vec::with_capacity((size * (2 * size_1 + 1)) as usize);
        for row in 0..size {
            let base = row * size_1;
            for x in 0..=size {
                indices.push((base + x) as u16);
                indices.push((base + size_1 + x) as u16);
            }
            indices.push(PRIMITIVE_RESTART);
        }

        Self {
            size,
            stride,
            vertices,
            indices,
        }
    }
}

/// Build every tier for `resolution`, finest first.
pub fn build_lod_table_data(resolution: u32) -> Vec<LodMeshData> {
    let mut tiers = Vec::new();
    let mut size = resolution;
    let mut stride = 1;
    while size >= 1 {
        tiers.push(LodMeshData::build(resolution, stride));
        size >>= 1;
        stride <<= 1;
    }
    tiers
}

/// GPU buffers of one tier
pub struct LodMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

/// Immutable table of tier meshes; the index into it is the LOD level.
pub struct LodMeshTable {
    resolution: u32,
    lods: Vec<LodMesh>,
}

impl LodMeshTable {
    pub fn new(device: &wgpu::Device, resolution: u32) -> Result<Self> {
        let build = || {
            build_lod_table_data(resolution)
                .into_iter()
                .map(|data| LodMesh {
                    vertex_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Ocean LOD Vertex Buffer"),
                        contents: bytemuck::cast_slice(&data.vertices),
                        usage: wgpu::BufferUsages::VERTEX,
                    }),
                    index_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Ocean LOD Index Buffer"),
                        contents: bytemuck::cast_slice(&pad_to_copy_alignment(&data.indices)),
                        usage: wgpu::BufferUsages::INDEX,
                    }),
                    index_count: data.indices.len() as u32,
                })
                .collect::<Vec<_>>()
        };
        let lods = gpu::scoped(device, || Ok(build()))?;

        log::info!(
            "Built {} ocean LOD tiers for resolution {}",
            lods.len(),
            resolution
        );
        Ok(Self { resolution, lods })
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn len(&self) -> usize {
        self.lods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lods.is_empty()
    }

    pub fn get(&self, level: usize) -> Option<&LodMesh> {
        self.lods.get(level)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LodMesh> {
        self.lods.iter()
    }

    /// Index counts per tier, for the indirect argument blocks
    pub fn index_counts(&self) -> Vec<u32> {
        self.lods.iter().map(|lod| lod.index_count).collect()
    }
}

// Buffer contents must be a multiple of 4 bytes
fn pad_to_copy_alignment(indices: &[u16]) -> Vec<u16> {
    let mut padded = indices.to_vec();
    if padded.len() % 2 == 1 {
        padded.push(PRIMITIVE_RESTART);
    }
    padded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_8_has_four_tiers() {
        let tiers = build_lod_table_data(8);
        let strides: Vec<u32> = tiers.iter().map(|t| t.stride).collect();
        assert_eq!(strides, vec![1, 2, 4, 8]);
        assert_eq!(tiers[0].vertices.len(), 81);
    }

    #[test]
    fn test_index_count_matches_strip_formula() {
        for tier in build_lod_table_data(8) {
            let size = tier.size as usize;
            assert_eq!(tier.vertices.len(), (size + 1) * (size + 1));
            assert_eq!(tier.indices.len(), (2 * (size + 1) + 1) * size);
        }
    }

    #[test]
    fn test_rows_end_with_restart() {
        let tier = LodMeshData::build(4, 1);
        let row_len = 2 * (tier.size as usize + 1) + 1;
        for row in tier.indices.chunks(row_len) {
            assert_eq!(*row.last().unwrap(), PRIMITIVE_RESTART);
            assert!(row[..row_len - 1].iter().all(|&i| i != PRIMITIVE_RESTART));
            assert!(row[..row_len - 1]
                .iter()
                .all(|&i| (i as usize) < tier.vertices.len()));
        }
    }

    #[test]
    fn test_coarse_tier_positions_stay_in_full_resolution_units() {
        let tier = LodMeshData::build(8, 4);
        let xs: Vec<u8> = tier.vertices.iter().take(3).map(|v| v.pos[0]).collect();
        assert_eq!(xs, vec![0, 4, 8]);
        let last = tier.vertices.last().unwrap();
        assert_eq!(&last.pos[..2], &[8, 8]);
        assert_eq!(&last.pos[2..], &[0, 0]);
    }

    #[test]
    fn test_edge_weights() {
        let tier = LodMeshData::build(4, 1);
        let at = |x: usize, y: usize| tier.vertices[y * 5 + x];
        assert_eq!(at(0, 2).weights, [255, 0, 0, 0]);
        assert_eq!(at(4, 2).weights, [0, 255, 0, 0]);
        assert_eq!(at(2, 0).weights, [0, 0, 255, 0]);
        assert_eq!(at(2, 4).weights, [0, 0, 0, 255]);
        assert_eq!(at(2, 2).weights, [0; 4]);
        // Corners belong to the X edges
        assert_eq!(at(0, 0).weights, [255, 0, 0, 0]);
        assert_eq!(at(4, 4).weights, [0, 255, 0, 0]);
    }

    #[test]
    fn test_build_is_idempotent() {
        assert_eq!(build_lod_table_data(16), build_lod_table_data(16));
    }
}
