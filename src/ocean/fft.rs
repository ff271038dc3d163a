//! Inverse 2D FFT on the GPU.
//!
//! Radix-2 Stockham autosort: log2(N) passes over the rows, then log2(N)
//! over the columns, ping-ponging between the graph's input buffer and a
//! scratch buffer owned by the plan. The pass count is even, so the spatial
//! result always ends up back in the input buffer before the resolve pass
//! writes it to the output image. The transform is unnormalised.

use std::f32::consts::PI;

use bytemuck::{Pod, Zeroable};
use rustfft::num_complex::Complex32;
use wgpu::util::DeviceExt;

use crate::error::{OceanError, Result};
use crate::gpu;
use crate::ocean::spectrum::complex_buffer_size;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct FftPass {
    n: u32,
    ns: u32,
    axis: u32,
    _padding: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct ResolveParams {
    n: [u32; 2],
    _padding: [u32; 2],
}

/// How the complex spatial result lands in the output image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Real part only (height)
    Real,
    /// Real and imaginary parts as two channels
    Complex,
}

/// `(axis, ns)` of every butterfly pass of a `width` x `height` transform:
/// rows first, then columns.
fn axis_passes(width: u32, height: u32) -> Vec<(u32, u32)> {
    let mut passes = Vec::new();
    for (axis, len) in [(0, width), (1, height)] {
        let mut ns = 1;
        while ns < len {
            passes.push((axis, ns));
            ns <<= 1;
        }
    }
    passes
}

fn pass_schedule(n: u32) -> Vec<FftPass> {
    axis_passes(n, n)
        .into_iter()
        .map(|(axis, ns)| FftPass {
            n,
            ns,
            axis,
            _padding: 0,
        })
        .collect()
}

/// One butterfly pass over `src`, same indexing as `fft_radix2.wgsl`
fn reference_pass(
    src: &[Complex32],
    dst: &mut [Complex32],
    width: usize,
    height: usize,
    ns: usize,
    axis: u32,
) {
    let (len, lines) = if axis == 0 {
        (width, height)
    } else {
        (height, width)
    };
    let half = len / 2;
    let element = |line: usize, i: usize| {
        if axis == 0 {
            line * width + i
        } else {
            i * width + line
        }
    };
    for line in 0..lines {
        for j in 0..half {
            let k = j % ns;
            let a = src[element(line, j)];
            let b = src[element(line, j + half)];
            let angle = 2.0 * PI * k as f32 / (2 * ns) as f32;
            let bw = b * Complex32::new(angle.cos(), angle.sin());
            let out = (j / ns) * ns * 2 + k;
            dst[element(line, out)] = a + bw;
            dst[element(line, out + ns)] = a - bw;
        }
    }
}

/// CPU mirror of the GPU transform for a row-major `width` x `height` field
/// (unnormalised inverse; both sides powers of two).
pub fn inverse_fft_reference(data: &[Complex32], width: usize, height: usize) -> Vec<Complex32> {
    let mut a = data.to_vec();
    let mut b = vec![Complex32::new(0.0, 0.0); width * height];
    for (axis, ns) in axis_passes(width as u32, height as u32) {
        reference_pass(&a, &mut b, width, height, ns as usize, axis);
        std::mem::swap(&mut a, &mut b);
    }
    a
}

/// [`inverse_fft_reference`] for the square N x N fields the ocean uses
pub fn inverse_fft_2d_reference(data: &[Complex32], n: usize) -> Vec<Complex32> {
    inverse_fft_reference(data, n, n)
}

/// GPU plan for one transform size and output format
pub struct GpuFft {
    n: u32,
    butterfly_pipeline: wgpu::ComputePipeline,
    butterfly_layout: wgpu::BindGroupLayout,
    resolve_pipeline: wgpu::ComputePipeline,
    resolve_layout: wgpu::BindGroupLayout,
    pass_buffers: Vec<wgpu::Buffer>,
    resolve_params: wgpu::Buffer,
    scratch: wgpu::Buffer,
}

impl GpuFft {
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        n: u32,
        output_format: wgpu::TextureFormat,
        mode: ResolveMode,
    ) -> Result<Self> {
        let format_name =
            gpu::storage_format_name(output_format).ok_or_else(|| OceanError::Device {
                message: format!("{:?} is not a portable storage format", output_format),
            })?;
        gpu::scoped(device, || {
            Ok(Self::build(device, label, n, output_format, format_name, mode))
        })
    }

    fn build(
        device: &wgpu::Device,
        label: &str,
        n: u32,
        output_format: wgpu::TextureFormat,
        format_name: &str,
        mode: ResolveMode,
    ) -> Self {
        let butterfly_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Ocean FFT Radix-2 Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/fft_radix2.wgsl").into()),
        });
        let butterfly_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Ocean FFT Butterfly Layout"),
            entries: &[
                gpu::uniform_entry(0, wgpu::ShaderStages::COMPUTE),
                gpu::storage_entry(1, true),
                gpu::storage_entry(2, false),
            ],
        });
        let butterfly_pipeline = gpu::compute_pipeline(
            device,
            "Ocean FFT Butterfly Pipeline",
            &butterfly_shader,
            &butterfly_layout,
            "main",
        );

        let resolve_source = include_str!("../shaders/fft_resolve.wgsl")
            .replace("{{OUTPUT_FORMAT}}", format_name)
            .replace(
                "{{RESOLVE_COMPLEX}}",
                if mode == ResolveMode::Complex { "true" } else { "false" },
            );
        let resolve_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Ocean FFT Resolve Shader"),
            source: wgpu::ShaderSource::Wgsl(resolve_source.into()),
        });
        let resolve_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Ocean FFT Resolve Layout"),
            entries: &[
                gpu::uniform_entry(0, wgpu::ShaderStages::COMPUTE),
                gpu::storage_entry(1, true),
                gpu::storage_texture_entry(2, output_format),
            ],
        });
        let resolve_pipeline = gpu::compute_pipeline(
            device,
            "Ocean FFT Resolve Pipeline",
            &resolve_shader,
            &resolve_layout,
            "main",
        );

        let pass_buffers = pass_schedule(n)
            .iter()
            .map(|pass| {
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Ocean FFT Pass Params"),
                    contents: bytemuck::bytes_of(pass),
                    usage: wgpu::BufferUsages::UNIFORM,
                })
            })
            .collect();

        let resolve_params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Ocean FFT Resolve Params"),
            contents: bytemuck::bytes_of(&ResolveParams {
                n: [n, n],
                _padding: [0; 2],
            }),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let scratch = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: complex_buffer_size(n),
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        Self {
            n,
            butterfly_pipeline,
            butterfly_layout,
            resolve_pipeline,
            resolve_layout,
            pass_buffers,
            resolve_params,
            scratch,
        }
    }

    pub fn size(&self) -> u32 {
        self.n
    }

    pub fn pass_count(&self) -> usize {
        self.pass_buffers.len()
    }

    /// Transform `input` in place and resolve it into `output` (a single-mip view).
    pub fn record(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        input: &wgpu::Buffer,
        output: &wgpu::TextureView,
    ) -> Result<()> {
        let butterflies = self.n * (self.n / 2);
        for (i, params) in self.pass_buffers.iter().enumerate() {
            let (src, dst) = if i % 2 == 0 {
                (input, &self.scratch)
            } else {
                (&self.scratch, input)
            };
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Ocean FFT Butterfly Bind Group"),
                layout: &self.butterfly_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: src.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: dst.as_entire_binding(),
                    },
                ],
            });

            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Ocean FFT Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.butterfly_pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(gpu::group_count(butterflies, 64), 1, 1);
        }

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Ocean FFT Resolve Bind Group"),
            layout: &self.resolve_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.resolve_params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: input.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(output),
                },
            ],
        });
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Ocean FFT Resolve"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.resolve_pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(gpu::group_count(self.n, 8), gpu::group_count(self.n, 8), 1);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::MAX_FFT_SIZE;
    use rand::{Rng, SeedableRng};
    use rustfft::FftPlanner;

    fn forward_2d(data: &[Complex32], width: usize, height: usize) -> Vec<Complex32> {
        let mut planner = FftPlanner::<f32>::new();
        let row_fft = planner.plan_fft_forward(width);
        let column_fft = planner.plan_fft_forward(height);
        let mut rows = data.to_vec();
        for row in rows.chunks_mut(width) {
            row_fft.process(row);
        }
        let mut out = rows.clone();
        let mut column = vec![Complex32::new(0.0, 0.0); height];
        for x in 0..width {
            for y in 0..height {
                column[y] = rows[y * width + x];
            }
            column_fft.process(&mut column);
            for y in 0..height {
                out[y * width + x] = column[y];
            }
        }
        out
    }

    fn assert_round_trip(width: usize, height: usize, seed: u64) {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let signal: Vec<Complex32> = (0..width * height)
            .map(|_| Complex32::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
            .collect();

        let spectrum = forward_2d(&signal, width, height);
        let restored = inverse_fft_reference(&spectrum, width, height);
        let scale = 1.0 / (width * height) as f32;
        for (i, (a, b)) in signal.iter().zip(&restored).enumerate() {
            assert!(
                (*a - *b * scale).norm() < 1e-4,
                "{}x{} texel {}: {} vs {}",
                width,
                height,
                i,
                a,
                *b * scale
            );
        }
    }

    #[test]
    fn test_pass_count_is_even() {
        for n in [2, 8, 256, 2048] {
            let passes = pass_schedule(n);
            assert_eq!(passes.len(), 2 * n.ilog2() as usize);
            assert_eq!(passes.len() % 2, 0);
        }
    }

    #[test]
    fn test_single_bin_gives_plane_wave() {
        let n = 8;
        let mut spectrum = vec![Complex32::new(0.0, 0.0); n * n];
        spectrum[1] = Complex32::new(1.0, 0.0);
        let spatial = inverse_fft_2d_reference(&spectrum, n);
        for y in 0..n {
            for x in 0..n {
                let angle = 2.0 * PI * x as f32 / n as f32;
                let expected = Complex32::new(angle.cos(), angle.sin());
                assert!((spatial[y * n + x] - expected).norm() < 1e-5);
            }
        }
    }

    #[test]
    fn test_matches_direct_inverse_dft() {
        let n = 4;
        let spectrum: Vec<Complex32> = (0..n * n)
            .map(|i| Complex32::new(i as f32 * 0.25 - 1.0, (i % 3) as f32))
            .collect();
        let spatial = inverse_fft_2d_reference(&spectrum, n);

        for y in 0..n {
            for x in 0..n {
                let mut sum = Complex32::new(0.0, 0.0);
                for v in 0..n {
                    for u in 0..n {
                        let angle = 2.0 * PI * ((u * x + v * y) as f32) / n as f32;
                        sum += spectrum[v * n + u] * Complex32::new(angle.cos(), angle.sin());
                    }
                }
                assert!((spatial[y * n + x] - sum).norm() < 1e-4);
            }
        }
    }

    #[test]
    fn test_round_trip_with_rustfft() {
        assert_round_trip(32, 32, 7);
    }

    #[test]
    fn test_round_trip_non_square() {
        // Mixing up rows and columns only shows when the sides differ
        assert_round_trip(16, 4, 11);
        assert_round_trip(4, 16, 12);
    }

    #[test]
    fn test_round_trip_at_max_size() {
        let max = MAX_FFT_SIZE as usize;
        assert_round_trip(max, 2, 13);
        assert_round_trip(2, max, 14);
    }

    #[test]
    fn test_max_size_dispatch_fits_limits() {
        let limits = wgpu::Limits::downlevel_defaults();
        let butterflies = MAX_FFT_SIZE * (MAX_FFT_SIZE / 2);
        assert!(gpu::group_count(butterflies, 64) <= limits.max_compute_workgroups_per_dimension);
        assert!(
            complex_buffer_size(MAX_FFT_SIZE) <= limits.max_storage_buffer_binding_size as u64
        );
    }
}
