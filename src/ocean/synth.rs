//! Spectral synthesizer: modulates the three distributions to the current
//! time, runs their inverse transforms and bakes the vertex and shading maps.

use bytemuck::{Pod, Zeroable};

use crate::error::Result;
use crate::gpu;
use crate::graph::{
    ResourceLookup, DISPLACEMENT_FFT_INPUT, DISPLACEMENT_FFT_OUTPUT, HEIGHT_FFT_INPUT,
    HEIGHT_FFT_OUTPUT, NORMAL_FFT_INPUT,
};
use crate::ocean::fft::{GpuFft, ResolveMode};
use crate::ocean::spectrum::{GenerateParams, SpectrumKind, SpectrumStore};
use crate::params::OceanConfig;

pub const HEIGHT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;
/// Two channels used; rg32float has no storage support on GLES
pub const DISPLACEMENT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
pub const NORMAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
/// Format of the baked height-displacement and gradient-jacobian maps
pub const BAKED_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct BakeParams {
    height_size: [u32; 2],
    disp_size: [u32; 2],
    height_texel: [f32; 2],
    disp_texel: [f32; 2],
    choppiness: f32,
    _padding: [f32; 3],
}

/// Mip-0 storage views the synthesizer writes this frame
pub struct SynthTargets<'a> {
    pub normal: &'a wgpu::TextureView,
    pub height_displacement: &'a wgpu::TextureView,
    pub gradient_jacobian: &'a wgpu::TextureView,
}

struct FieldPlan {
    kind: SpectrumKind,
    input: &'static str,
    params_buffer: wgpu::Buffer,
    modulus: [f32; 2],
    fft: GpuFft,
}

pub struct SpectralSynthesizer {
    generate_pipeline: wgpu::ComputePipeline,
    generate_layout: wgpu::BindGroupLayout,
    fields: Vec<FieldPlan>,
    bake_pipeline: wgpu::ComputePipeline,
    bake_layout: wgpu::BindGroupLayout,
    bake_params: wgpu::Buffer,
    height_size: u32,
}

impl SpectralSynthesizer {
    pub fn new(device: &wgpu::Device, config: &OceanConfig) -> Result<Self> {
        gpu::scoped(device, || Self::build(device, config))
    }

    fn build(device: &wgpu::Device, config: &OceanConfig) -> Result<Self> {
        let generate_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Ocean Generate FFT Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/generate_fft.wgsl").into()),
        });
        let generate_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Ocean Generate FFT Layout"),
            entries: &[
                gpu::uniform_entry(0, wgpu::ShaderStages::COMPUTE),
                gpu::storage_entry(1, true),
                gpu::storage_entry(2, false),
            ],
        });
        let generate_pipeline = gpu::compute_pipeline(
            device,
            "Ocean Generate FFT Pipeline",
            &generate_shader,
            &generate_layout,
            "main",
        );

        let fields = SpectrumKind::ALL
            .into_iter()
            .map(|kind| -> Result<FieldPlan> {
                let n = kind.fft_size(config);
                let (input, format, mode) = match kind {
                    SpectrumKind::Height => (HEIGHT_FFT_INPUT, HEIGHT_FORMAT, ResolveMode::Real),
                    SpectrumKind::Displacement => {
                        (DISPLACEMENT_FFT_INPUT, DISPLACEMENT_FORMAT, ResolveMode::Complex)
                    }
                    SpectrumKind::Normal => (NORMAL_FFT_INPUT, NORMAL_FORMAT, ResolveMode::Complex),
                };
                Ok(FieldPlan {
                    kind,
                    input,
                    params_buffer: gpu::uniform_buffer(
                        device,
                        "Ocean Generate FFT Params",
                        &GenerateParams::zeroed(),
                    ),
                    modulus: kind.modulus(config),
                    fft: GpuFft::new(device, "Ocean FFT Scratch", n, format, mode)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let bake_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Ocean Bake Maps Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/bake_maps.wgsl").into()),
        });
        let bake_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Ocean Bake Maps Layout"),
            entries: &[
                gpu::uniform_entry(0, wgpu::ShaderStages::COMPUTE),
                gpu::texture_entry(1, wgpu::ShaderStages::COMPUTE, false),
                gpu::texture_entry(2, wgpu::ShaderStages::COMPUTE, false),
                gpu::storage_texture_entry(3, BAKED_FORMAT),
                gpu::storage_texture_entry(4, BAKED_FORMAT),
            ],
        });
        let bake_pipeline = gpu::compute_pipeline(
            device,
            "Ocean Bake Maps Pipeline",
            &bake_shader,
            &bake_layout,
            "main",
        );

        let height = config.fft.height;
        let disp = config.fft.displacement;
        let size = config.grid.size_m;
        let bake = BakeParams {
            height_size: [height, height],
            disp_size: [disp, disp],
            height_texel: [size[0] / height as f32, size[1] / height as f32],
            disp_texel: [size[0] / disp as f32, size[1] / disp as f32],
            choppiness: config.choppiness,
            _padding: [0.0; 3],
        };
        let bake_params = gpu::uniform_buffer(device, "Ocean Bake Params", &bake);

        Ok(Self {
            generate_pipeline,
            generate_layout,
            fields,
            bake_pipeline,
            bake_layout,
            bake_params,
            height_size: height,
        })
    }

    /// Record modulation, transforms and the bake for time `time_s`.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        lookup: &dyn ResourceLookup,
        store: &SpectrumStore,
        time_s: f32,
        targets: &SynthTargets<'_>,
    ) -> Result<()> {
        let height_view = lookup.texture(HEIGHT_FFT_OUTPUT)?.full_view();
        let displacement_view = lookup.texture(DISPLACEMENT_FFT_OUTPUT)?.full_view();

        for field in &self.fields {
            let n = field.fft.size();
            let params = GenerateParams {
                modulus: field.modulus,
                n: [n, n],
                time: time_s,
                variant: field.kind.variant(),
                _padding: [0; 2],
            };
            queue.write_buffer(&field.params_buffer, 0, bytemuck::bytes_of(&params));

            let input = lookup.buffer(field.input)?;
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Ocean Generate FFT Bind Group"),
                layout: &self.generate_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: field.params_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: store.get(field.kind).buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: input.buffer.as_entire_binding(),
                    },
                ],
            });

            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("Ocean Generate FFT"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.generate_pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(gpu::group_count(n, 64), n, 1);
            }

            let output = match field.kind {
                SpectrumKind::Height => &height_view,
                SpectrumKind::Displacement => &displacement_view,
                SpectrumKind::Normal => targets.normal,
            };
            field.fft.record(device, encoder, &input.buffer, output)?;
        }

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Ocean Bake Maps Bind Group"),
            layout: &self.bake_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.bake_params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&height_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&displacement_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(targets.height_displacement),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(targets.gradient_jacobian),
                },
            ],
        });

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Ocean Bake Maps"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.bake_pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(
            gpu::group_count(self.height_size, 8),
            gpu::group_count(self.height_size, 8),
            1,
        );

        log::trace!("Ocean spectra synthesized at t = {:.3}s", time_s);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bake_params_layout() {
        assert_eq!(std::mem::size_of::<BakeParams>(), 48);
    }

    #[test]
    fn test_storage_formats() {
        for format in [HEIGHT_FORMAT, DISPLACEMENT_FORMAT, NORMAL_FORMAT, BAKED_FORMAT] {
            assert!(format
                .guaranteed_format_features(wgpu::Features::empty())
                .allowed_usages
                .contains(wgpu::TextureUsages::STORAGE_BINDING));
            // Downlevel adapters only write the formats with a WGSL name
            assert!(
                gpu::storage_format_name(format).is_some(),
                "{:?} is not storage-capable on every adapter",
                format
            );
        }
    }
}
