//! Small wgpu helpers shared by the ocean compute and render stages.

use bytemuck::Pod;
use wgpu::util::DeviceExt;

use crate::error::Result;

/// Run `create` inside validation and out-of-memory error scopes.
///
/// Any error wgpu reports while `create` runs comes back as
/// [`OceanError::Device`](crate::error::OceanError::Device) instead of
/// reaching the device's uncaptured-error handler. Scopes nest, so `create`
/// may itself call other scoped constructors.
pub fn scoped<T>(device: &wgpu::Device, create: impl FnOnce() -> Result<T>) -> Result<T> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    // Scopes pop in reverse push order
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());

    match validation.or(out_of_memory) {
        Some(err) => Err(err.into()),
        None => value,
    }
}

/// WGSL texel format name for a storage texture.
///
/// Only formats that are storage-capable on every adapter class the crate
/// targets (including GLES downlevel) have a name; everything else is `None`.
pub fn storage_format_name(format: wgpu::TextureFormat) -> Option<&'static str> {
    match format {
        wgpu::TextureFormat::R32Float => Some("r32float"),
        wgpu::TextureFormat::Rgba16Float => Some("rgba16float"),
        wgpu::TextureFormat::Rgba32Float => Some("rgba32float"),
        _ => None,
    }
}

pub fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Write-only storage texture for compute
pub fn storage_texture_entry(
    binding: u32,
    format: wgpu::TextureFormat,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

pub fn texture_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    filterable: bool,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

pub fn compute_pipeline(
    device: &wgpu::Device,
    label: &str,
    module: &wgpu::ShaderModule,
    layout: &wgpu::BindGroupLayout,
    entry_point: &str,
) -> wgpu::ComputePipeline {
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    })
}

/// Uniform buffer initialised with `value`, writable every frame
pub fn uniform_buffer<T: Pod>(device: &wgpu::Device, label: &str, value: &T) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::bytes_of(value),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

/// Workgroups needed to cover `count` invocations
pub fn group_count(count: u32, workgroup_size: u32) -> u32 {
    count.div_ceil(workgroup_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_count_rounds_up() {
        assert_eq!(group_count(0, 8), 0);
        assert_eq!(group_count(1, 8), 1);
        assert_eq!(group_count(64, 8), 8);
        assert_eq!(group_count(65, 8), 9);
    }

    #[test]
    fn test_storage_format_names() {
        assert_eq!(
            storage_format_name(wgpu::TextureFormat::Rgba32Float),
            Some("rgba32float")
        );
        assert_eq!(
            storage_format_name(wgpu::TextureFormat::R32Float),
            Some("r32float")
        );
        // Not writable as storage on GLES
        assert_eq!(storage_format_name(wgpu::TextureFormat::Rg32Float), None);
        assert_eq!(storage_format_name(wgpu::TextureFormat::Rgba8Unorm), None);
    }
}
