//! Mip chain generation for the baked maps and the normal field.
//!
//! Level i is a 2x2 box filter of level i - 1. The filter never writes the
//! texture it samples: each level is downsampled into a scratch texture and
//! then copied into place. GL drops storage writes to a mip of a texture
//! whose other mip is bound for sampling in the same dispatch.

use bytemuck::{Pod, Zeroable};

use crate::error::Result;
use crate::gpu;
use crate::ocean::synth::BAKED_FORMAT;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct MipParams {
    dst_size: [u32; 2],
    _padding: [u32; 2],
}

/// One texture to downsample this frame
pub struct MipChain<'a> {
    pub texture: &'a wgpu::Texture,
    /// Base size of the texture (square)
    pub size: u32,
    /// Single-level views, mip 0 first
    pub views: &'a [wgpu::TextureView],
}

/// Level-1-sized target shared by every chain with the same base size
struct Scratch {
    base_size: u32,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

pub struct MipGenerator {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    /// Uniform per (base size, destination level)
    params: Vec<(u32, u32, wgpu::Buffer)>,
    scratch: Vec<Scratch>,
}

impl MipGenerator {
    /// `chains` lists `(base size, level count)` of every texture this
    /// generator will be asked to downsample.
    pub fn new(device: &wgpu::Device, chains: &[(u32, u32)]) -> Result<Self> {
        gpu::scoped(device, || Ok(Self::build(device, chains)))
    }

    fn build(device: &wgpu::Device, chains: &[(u32, u32)]) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Ocean Mipmap Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/mipmap.wgsl").into()),
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Ocean Mipmap Layout"),
            entries: &[
                gpu::uniform_entry(0, wgpu::ShaderStages::COMPUTE),
                gpu::texture_entry(1, wgpu::ShaderStages::COMPUTE, false),
                gpu::storage_texture_entry(2, BAKED_FORMAT),
            ],
        });
        let pipeline =
            gpu::compute_pipeline(device, "Ocean Mipmap Pipeline", &shader, &layout, "main");

        let mut params: Vec<(u32, u32, wgpu::Buffer)> = Vec::new();
        let mut scratch: Vec<Scratch> = Vec::new();
        for &(size, levels) in chains {
            if levels > 1 && !scratch.iter().any(|s| s.base_size == size) {
                scratch.push(create_scratch(device, size));
            }
            for level in 1..levels {
                if params.iter().any(|(s, l, _)| *s == size && *l == level) {
                    continue;
                }
                let dst = (size >> level).max(1);
                let buffer = gpu::uniform_buffer(
                    device,
                    "Ocean Mip Params",
                    &MipParams {
                        dst_size: [dst, dst],
                        _padding: [0; 2],
                    },
                );
                params.push((size, level, buffer));
            }
        }

        Self {
            pipeline,
            layout,
            params,
            scratch,
        }
    }

    /// Record every level of every chain, level by level. Each downsample is
    /// its own pass followed by the copy into the destination mip, so the
    /// next level reads finished data.
    pub fn record(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        chains: &[MipChain<'_>],
    ) {
        let passes = chains.iter().map(|c| c.views.len()).max().unwrap_or(0);
        for level in 1..passes {
            for chain in chains.iter().filter(|c| level < c.views.len()) {
                let params = self
                    .params
                    .iter()
                    .find(|(s, l, _)| *s == chain.size && *l == level as u32);
                let scratch = self.scratch.iter().find(|s| s.base_size == chain.size);
                let (Some((_, _, params)), Some(scratch)) = (params, scratch) else {
                    log::warn!("No mip resources for size {} level {}", chain.size, level);
                    continue;
                };

                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Ocean Mipmap Bind Group"),
                    layout: &self.layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: params.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(&chain.views[level - 1]),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::TextureView(&scratch.view),
                        },
                    ],
                });
                let dst = (chain.size >> level).max(1);

                {
                    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some("Ocean Mipmap Level"),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(&self.pipeline);
                    pass.set_bind_group(0, &bind_group, &[]);
                    pass.dispatch_workgroups(
                        gpu::group_count(dst, 8),
                        gpu::group_count(dst, 8),
                        1,
                    );
                }

                encoder.copy_texture_to_texture(
                    wgpu::ImageCopyTexture {
                        texture: &scratch.texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::ImageCopyTexture {
                        texture: chain.texture,
                        mip_level: level as u32,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::Extent3d {
                        width: dst,
                        height: dst,
                        depth_or_array_layers: 1,
                    },
                );
            }
        }
    }
}

fn create_scratch(device: &wgpu::Device, base_size: u32) -> Scratch {
    let size = (base_size / 2).max(1);
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Ocean Mip Scratch"),
        size: wgpu::Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: BAKED_FORMAT,
        usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Scratch {
        base_size,
        texture,
        view,
    }
}

/// CPU mirror of one downsample step (row-major RGBA texels)
pub fn box_downsample(src: &[[f32; 4]], width: usize, height: usize) -> Vec<[f32; 4]> {
    let dst_w = (width / 2).max(1);
    let dst_h = (height / 2).max(1);
    let at = |x: usize, y: usize| src[y.min(height - 1) * width + x.min(width - 1)];

    let mut out = Vec::with_capacity(dst_w * dst_h);
    for y in 0..dst_h {
        for x in 0..dst_w {
            let taps = [
                at(2 * x, 2 * y),
                at(2 * x + 1, 2 * y),
                at(2 * x, 2 * y + 1),
                at(2 * x + 1, 2 * y + 1),
            ];
            let mut sum = [0.0; 4];
            for tap in taps {
                for (s, v) in sum.iter_mut().zip(tap) {
                    *s += v;
                }
            }
            out.push(sum.map(|v| v * 0.25));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_filter_averages_quads() {
        let src = vec![
            [1.0, 0.0, 0.0, 0.0],
            [3.0, 0.0, 0.0, 0.0],
            [5.0, 2.0, 0.0, 0.0],
            [7.0, 2.0, 0.0, 0.0],
        ];
        let out = box_downsample(&src, 2, 2);
        assert_eq!(out, vec![[4.0, 1.0, 0.0, 0.0]]);
    }

    #[test]
    fn test_chain_preserves_mean() {
        let size = 16;
        let mut level: Vec<[f32; 4]> = (0..size * size)
            .map(|i| [(i % 7) as f32, (i / 16) as f32, 0.5, 1.0])
            .collect();
        let mean = level.iter().map(|t| t[0]).sum::<f32>() / level.len() as f32;

        let mut w = size;
        while w > 1 {
            level = box_downsample(&level, w, w);
            w /= 2;
        }
        assert_eq!(level.len(), 1);
        assert!((level[0][0] - mean).abs() < 1e-4);
        assert_eq!(level[0][3], 1.0);
    }
}
