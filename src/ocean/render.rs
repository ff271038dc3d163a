//! Ocean renderer: one indirect draw per LOD tier over the culled tiles.

use bytemuck::{Pod, Zeroable};

use crate::camera::ViewParams;
use crate::error::Result;
use crate::gpu;
use crate::graph::{
    ResourceLookup, GRADIENT_JACOBIAN_OUTPUT, HEIGHT_DISPLACEMENT_OUTPUT, NORMAL_FFT_OUTPUT,
    OCEAN_LOD_COUNTER, OCEAN_LOD_DATA,
};
use crate::ocean::cull::{TileRecord, INDIRECT_SLOT_SIZE, TILE_RECORD_SIZE};
use crate::ocean::mesh::{LodMeshTable, OceanVertex};
use crate::params::OceanConfig;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Uniforms shared by the ocean vertex and fragment stages
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct OceanUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 4],
    /// 1 / height patch size
    pub inv_patch_size: [f32; 2],
    pub normal_uv_scale: [f32; 2],
    /// Cell size / grid resolution: integer vertex units to meters
    pub integer_to_world: [f32; 2],
    pub heightmap_range: [f32; 2],
    /// Geomorph clamp: coarsest LOD tier
    pub max_lod: f32,
    /// Coarsest mip of the baked maps; can sit below `max_lod`
    pub max_texture_lod: f32,
    pub _padding: [f32; 2],
}

impl OceanUniforms {
    pub fn new(config: &OceanConfig, view: &ViewParams) -> Self {
        let grid = &config.grid;
        let cell = grid.cell_size();
        let res = grid.grid_resolution as f32;
        Self {
            view_proj: view.view_proj.to_cols_array_2d(),
            camera_pos: view.camera_position.extend(1.0).to_array(),
            inv_patch_size: [1.0 / grid.size_m[0], 1.0 / grid.size_m[1]],
            normal_uv_scale: config.normal_uv_scale(),
            integer_to_world: [cell[0] / res, cell[1] / res],
            heightmap_range: [config.heightmap_range_m.0, config.heightmap_range_m.1],
            max_lod: config.grid.lod_tiers().saturating_sub(1) as f32,
            max_texture_lod: config.vertex_mip_levels().saturating_sub(1) as f32,
            _padding: [0.0; 2],
        }
    }
}

pub struct OceanRenderer {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
    bind_group: Option<wgpu::BindGroup>,
    /// Byte stride between tier ranges of the tile buffer
    tier_stride: u64,
}

impl OceanRenderer {
    pub fn new(
        device: &wgpu::Device,
        config: &OceanConfig,
        color_format: wgpu::TextureFormat,
    ) -> Result<Self> {
        gpu::scoped(device, || Ok(Self::build(device, config, color_format)))
    }

    fn build(
        device: &wgpu::Device,
        config: &OceanConfig,
        color_format: wgpu::TextureFormat,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Ocean Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/ocean.wgsl").into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Ocean Render Layout"),
            entries: &[
                gpu::uniform_entry(
                    0,
                    wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ),
                gpu::texture_entry(1, wgpu::ShaderStages::VERTEX, true),
                gpu::texture_entry(2, wgpu::ShaderStages::FRAGMENT, true),
                gpu::texture_entry(3, wgpu::ShaderStages::FRAGMENT, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Ocean Render Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Ocean Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<OceanVertex>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &[
                            wgpu::VertexAttribute {
                                offset: 0,
                                shader_location: 0,
                                format: wgpu::VertexFormat::Uint8x4,
                            },
                            wgpu::VertexAttribute {
                                offset: 4,
                                shader_location: 1,
                                format: wgpu::VertexFormat::Unorm8x4,
                            },
                        ],
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<TileRecord>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &[
                            wgpu::VertexAttribute {
                                offset: 0,
                                shader_location: 2,
                                format: wgpu::VertexFormat::Float32x4,
                            },
                            wgpu::VertexAttribute {
                                offset: 16,
                                shader_location: 3,
                                format: wgpu::VertexFormat::Float32x4,
                            },
                        ],
                    },
                ],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                strip_index_format: Some(wgpu::IndexFormat::Uint16),
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Ocean Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let uniform_buffer =
            gpu::uniform_buffer(device, "Ocean Uniform Buffer", &OceanUniforms::zeroed());

        Self {
            pipeline,
            layout,
            uniform_buffer,
            sampler,
            bind_group: None,
            tier_stride: config.grid.cell_count() as u64 * TILE_RECORD_SIZE,
        }
    }

    /// Bind phase: upload this frame's uniforms and bind the synthesized maps.
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        lookup: &dyn ResourceLookup,
        uniforms: &OceanUniforms,
    ) -> Result<()> {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));

        let height_displacement = lookup.texture(HEIGHT_DISPLACEMENT_OUTPUT)?.full_view();
        let gradient_jacobian = lookup.texture(GRADIENT_JACOBIAN_OUTPUT)?.full_view();
        let normal = lookup.texture(NORMAL_FFT_OUTPUT)?.full_view();

        self.bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Ocean Render Bind Group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&height_displacement),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&gradient_jacobian),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&normal),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        }));
        Ok(())
    }

    /// Issue one indirect draw per tier, finest first. Does nothing until
    /// [`OceanRenderer::prepare`] has run.
    pub fn draw(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        lookup: &dyn ResourceLookup,
        meshes: &LodMeshTable,
    ) -> Result<()> {
        let Some(bind_group) = &self.bind_group else {
            log::warn!("Ocean draw skipped: renderer was not prepared this frame");
            return Ok(());
        };
        let counter = lookup.buffer(OCEAN_LOD_COUNTER)?;
        let tiles = lookup.buffer(OCEAN_LOD_DATA)?;

        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        for (lod, mesh) in meshes.iter().enumerate() {
            let start = lod as u64 * self.tier_stride;
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_vertex_buffer(1, tiles.buffer.slice(start..start + self.tier_stride));
            pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed_indirect(&counter.buffer, lod as u64 * INDIRECT_SLOT_SIZE);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_uniform_layout() {
        assert_eq!(std::mem::size_of::<OceanUniforms>(), 128);
    }

    #[test]
    fn test_uniforms_from_config() {
        let mut config = OceanConfig::default();
        config.grid.size_m = [1024.0, 1024.0];
        config.grid.grid_width = 32;
        config.grid.grid_height = 32;
        config.grid.grid_resolution = 32;
        let uniforms = OceanUniforms::new(&config, &ViewParams::unculled(Vec3::new(1.0, 2.0, 3.0)));

        assert_eq!(uniforms.integer_to_world, [1.0, 1.0]);
        assert_eq!(uniforms.inv_patch_size, [1.0 / 1024.0; 2]);
        assert_eq!(uniforms.normal_uv_scale, [8.0, 8.0]);
        assert_eq!(uniforms.camera_pos, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(uniforms.max_lod, 5.0);
        assert_eq!(uniforms.max_texture_lod, 5.0);
    }

    #[test]
    fn test_morph_clamp_follows_tiers_not_mips() {
        // 8 tiers over a 6-level height chain
        let mut config = OceanConfig::default();
        config.grid.grid_resolution = 128;
        config.fft.height = 32;
        config.validate().unwrap();

        let uniforms = OceanUniforms::new(&config, &ViewParams::unculled(Vec3::ZERO));
        assert_eq!(uniforms.max_lod, 7.0);
        assert_eq!(uniforms.max_texture_lod, 5.0);
    }
}
