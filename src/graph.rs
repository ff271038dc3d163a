//! Named frame resources, their declarations and a minimal transient pool.
//!
//! The ocean never owns frame-transient memory. It declares what it reads and
//! writes under stable names; a host scheduler allocates the physical
//! resources and hands them back through [`ResourceLookup`] when a pass is
//! recorded. [`TransientPool`] is the in-crate host used by the binary and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{OceanError, Result};
use crate::gpu;

pub const OCEAN_LODS: &str = "ocean-lods";
pub const OCEAN_LOD_COUNTER: &str = "ocean-lod-counter";
pub const OCEAN_LOD_DATA: &str = "ocean-lod-data";

pub const HEIGHT_DISTRIBUTION: &str = "ocean-height-distribution";
pub const DISPLACEMENT_DISTRIBUTION: &str = "ocean-displacement-distribution";
pub const NORMAL_DISTRIBUTION: &str = "ocean-normal-distribution";

pub const HEIGHT_FFT_INPUT: &str = "ocean-height-fft-input";
pub const DISPLACEMENT_FFT_INPUT: &str = "ocean-displacement-fft-input";
pub const NORMAL_FFT_INPUT: &str = "ocean-normal-fft-input";

pub const HEIGHT_FFT_OUTPUT: &str = "ocean-height-fft-output";
pub const DISPLACEMENT_FFT_OUTPUT: &str = "ocean-displacement-fft-output";
pub const NORMAL_FFT_OUTPUT: &str = "ocean-normal-fft-output";

pub const HEIGHT_DISPLACEMENT_OUTPUT: &str = "ocean-height-displacement-output";
pub const GRADIENT_JACOBIAN_OUTPUT: &str = "ocean-gradient-jacobian-output";

pub const PASS_UPDATE_LODS: &str = "ocean-update-lods";
pub const PASS_UPDATE_FFT: &str = "ocean-update-fft";
pub const PASS_RENDER: &str = "ocean-render";

/// Queue a pass runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassQueue {
    Compute,
    Graphics,
}

/// Pipeline stage in which an access happens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStage {
    Compute,
    VertexShader,
    FragmentShader,
    /// Vertex-input fetch (instance-rate vertex buffers)
    VertexInput,
    IndirectDraw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// Physical shape of a declared resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceDesc {
    Buffer {
        size: u64,
    },
    Texture {
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        mip_levels: u32,
    },
}

/// One access of one named resource by one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDecl {
    pub name: &'static str,
    pub pass: &'static str,
    pub queue: PassQueue,
    pub desc: ResourceDesc,
    pub access: Access,
    pub stage: AccessStage,
    /// Owned outside the transient pool (e.g. the spectrum store)
    pub imported: bool,
}

impl ResourceDecl {
    fn usage_bits(&self) -> (wgpu::BufferUsages, wgpu::TextureUsages) {
        let mut buffer = wgpu::BufferUsages::empty();
        let mut texture = wgpu::TextureUsages::empty();
        match (self.stage, self.access) {
            (AccessStage::IndirectDraw, _) => buffer |= wgpu::BufferUsages::INDIRECT,
            (AccessStage::VertexInput, _) => buffer |= wgpu::BufferUsages::VERTEX,
            (AccessStage::Compute, Access::Write) => {
                buffer |= wgpu::BufferUsages::STORAGE;
                texture |= wgpu::TextureUsages::STORAGE_BINDING;
            }
            _ => {
                buffer |= wgpu::BufferUsages::STORAGE;
                texture |= wgpu::TextureUsages::TEXTURE_BINDING;
            }
        }
        (buffer, texture)
    }
}

static NEXT_COOKIE: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a physical allocation; changes on reallocation.
pub fn next_cookie() -> u64 {
    NEXT_COOKIE.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug)]
pub struct PhysicalBuffer {
    pub buffer: wgpu::Buffer,
    pub cookie: u64,
}

#[derive(Debug)]
pub struct PhysicalTexture {
    pub texture: wgpu::Texture,
    pub format: wgpu::TextureFormat,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub cookie: u64,
}

impl PhysicalTexture {
    /// View of a single mip level
    pub fn mip_view(&self, level: u32) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Ocean Mip View"),
            base_mip_level: level,
            mip_level_count: Some(1),
            ..Default::default()
        })
    }

    /// View of the whole mip chain
    pub fn full_view(&self) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    pub fn mip_extent(&self, level: u32) -> (u32, u32) {
        ((self.width >> level).max(1), (self.height >> level).max(1))
    }
}

/// Resolves named resources to physical ones while a pass is recorded
pub trait ResourceLookup {
    fn buffer(&self, name: &str) -> Result<&PhysicalBuffer>;
    fn texture(&self, name: &str) -> Result<&PhysicalTexture>;
}

enum Slot {
    Buffer(PhysicalBuffer),
    Texture(PhysicalTexture),
}

/// Allocates every non-imported declared resource once, merging usages.
#[derive(Default)]
pub struct TransientPool {
    slots: HashMap<&'static str, Slot>,
}

impl TransientPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)allocate physical resources for `decls`. Every allocation gets a new cookie.
    pub fn realize(&mut self, device: &wgpu::Device, decls: &[ResourceDecl]) -> Result<()> {
        let mut merged: Vec<(&'static str, ResourceDesc, wgpu::BufferUsages, wgpu::TextureUsages)> =
            Vec::new();

        for decl in decls.iter().filter(|d| !d.imported) {
            let (buffer_usage, texture_usage) = decl.usage_bits();
            match merged.iter_mut().find(|(name, ..)| *name == decl.name) {
                Some(entry) => {
                    if entry.1 != decl.desc {
                        return Err(OceanError::ResourceKind {
                            name: decl.name.to_string(),
                            expected: "consistent description across passes",
                        });
                    }
                    entry.2 |= buffer_usage;
                    entry.3 |= texture_usage;
                }
                None => merged.push((decl.name, decl.desc, buffer_usage, texture_usage)),
            }
        }

        self.slots.clear();
        let slots = gpu::scoped(device, || {
            Ok(merged
                .into_iter()
                .map(|(name, desc, buffer_usage, texture_usage)| {
                    (name, allocate(device, name, desc, buffer_usage, texture_usage))
                })
                .collect::<Vec<_>>())
        })?;
        self.slots.extend(slots);

        log::debug!("Transient pool realized {} resources", self.slots.len());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

fn allocate(
    device: &wgpu::Device,
    name: &'static str,
    desc: ResourceDesc,
    buffer_usage: wgpu::BufferUsages,
    texture_usage: wgpu::TextureUsages,
) -> Slot {
    match desc {
        ResourceDesc::Buffer { size } => Slot::Buffer(PhysicalBuffer {
            buffer: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(name),
                size,
                usage: buffer_usage | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            }),
            cookie: next_cookie(),
        }),
        ResourceDesc::Texture {
            width,
            height,
            format,
            mip_levels,
        } => Slot::Texture(PhysicalTexture {
            // Mip levels past 0 are filled by copies
            texture: device.create_texture(&wgpu::TextureDescriptor {
                label: Some(name),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: mip_levels,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: texture_usage
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC
                    | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            }),
            format,
            width,
            height,
            mip_levels,
            cookie: next_cookie(),
        }),
    }
}

impl ResourceLookup for TransientPool {
    fn buffer(&self, name: &str) -> Result<&PhysicalBuffer> {
        match self.slots.get(name) {
            Some(Slot::Buffer(buffer)) => Ok(buffer),
            Some(Slot::Texture(_)) => Err(OceanError::ResourceKind {
                name: name.to_string(),
                expected: "buffer",
            }),
            None => Err(OceanError::MissingResource {
                name: name.to_string(),
            }),
        }
    }

    fn texture(&self, name: &str) -> Result<&PhysicalTexture> {
        match self.slots.get(name) {
            Some(Slot::Texture(texture)) => Ok(texture),
            Some(Slot::Buffer(_)) => Err(OceanError::ResourceKind {
                name: name.to_string(),
                expected: "texture",
            }),
            None => Err(OceanError::MissingResource {
                name: name.to_string(),
            }),
        }
    }
}

/// Per-mip views of one physical texture, rebuilt only when its cookie changes.
#[derive(Default)]
pub struct MipViewCache {
    cookie: Option<u64>,
    views: Vec<wgpu::TextureView>,
}

impl MipViewCache {
    /// Views of the first `levels` mips (clamped to what the texture has)
    pub fn views(&mut self, texture: &PhysicalTexture, levels: u32) -> &[wgpu::TextureView] {
        let levels = levels.min(texture.mip_levels);
        if self.cookie != Some(texture.cookie) || self.views.len() != levels as usize {
            self.views = (0..levels).map(|level| texture.mip_view(level)).collect();
            self.cookie = Some(texture.cookie);
        }
        &self.views
    }

    pub fn cookie(&self) -> Option<u64> {
        self.cookie
    }

    pub fn clear(&mut self) {
        self.cookie = None;
        self.views.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(stage: AccessStage, access: Access) -> ResourceDecl {
        ResourceDecl {
            name: OCEAN_LOD_COUNTER,
            pass: PASS_UPDATE_LODS,
            queue: PassQueue::Compute,
            desc: ResourceDesc::Buffer { size: 256 },
            access,
            stage,
            imported: false,
        }
    }

    #[test]
    fn test_indirect_read_maps_to_indirect_usage() {
        let (buffer, _) = decl(AccessStage::IndirectDraw, Access::Read).usage_bits();
        assert!(buffer.contains(wgpu::BufferUsages::INDIRECT));
    }

    #[test]
    fn test_compute_write_maps_to_storage() {
        let (buffer, texture) = decl(AccessStage::Compute, Access::Write).usage_bits();
        assert!(buffer.contains(wgpu::BufferUsages::STORAGE));
        assert!(texture.contains(wgpu::TextureUsages::STORAGE_BINDING));
    }

    #[test]
    fn test_cookies_are_unique() {
        let a = next_cookie();
        let b = next_cookie();
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_pool_reports_missing() {
        let pool = TransientPool::new();
        assert!(pool.is_empty());
        match pool.buffer(OCEAN_LOD_DATA) {
            Err(OceanError::MissingResource { name }) => assert_eq!(name, OCEAN_LOD_DATA),
            other => panic!("expected MissingResource, got {:?}", other.map(|_| ())),
        }
    }
}
