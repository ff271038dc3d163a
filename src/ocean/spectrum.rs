//! Frequency-domain distributions and their time modulation.
//!
//! The three distributions are owned here and imported into the frame graph.
//! They start zeroed; an external spectrum generator fills them through
//! [`SpectrumStore::upload`] or by writing the buffers directly.

use std::f32::consts::PI;

use bytemuck::{Pod, Zeroable};
use rustfft::num_complex::Complex32;

use crate::error::{OceanError, Result};
use crate::gpu;
use crate::graph::{
    next_cookie, PhysicalBuffer, DISPLACEMENT_DISTRIBUTION, HEIGHT_DISTRIBUTION,
    NORMAL_DISTRIBUTION,
};
use crate::params::OceanConfig;

/// Bytes per complex sample (two f32)
pub const COMPLEX_SAMPLE_SIZE: u64 = 8;

pub const GRAVITY: f32 = 9.81;

/// Byte size of an N x N complex buffer
pub fn complex_buffer_size(n: u32) -> u64 {
    n as u64 * n as u64 * COMPLEX_SAMPLE_SIZE
}

/// Which synthesized field a distribution feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpectrumKind {
    Height,
    Displacement,
    Normal,
}

impl SpectrumKind {
    pub const ALL: [SpectrumKind; 3] = [Self::Height, Self::Displacement, Self::Normal];

    /// Kernel variant selector in `generate_fft.wgsl`
    pub(crate) fn variant(self) -> u32 {
        match self {
            Self::Height => 0,
            Self::Displacement => 1,
            Self::Normal => 2,
        }
    }

    pub fn distribution_name(self) -> &'static str {
        match self {
            Self::Height => HEIGHT_DISTRIBUTION,
            Self::Displacement => DISPLACEMENT_DISTRIBUTION,
            Self::Normal => NORMAL_DISTRIBUTION,
        }
    }

    pub fn fft_size(self, config: &OceanConfig) -> u32 {
        match self {
            Self::Height => config.fft.height,
            Self::Displacement => config.fft.displacement,
            Self::Normal => config.fft.normal,
        }
    }

    /// World size of the patch this field tiles (meters)
    pub fn patch_size(self, config: &OceanConfig) -> [f32; 2] {
        match self {
            Self::Normal => config.normal_size_m,
            _ => config.grid.size_m,
        }
    }

    /// Angular frequency per index step: 2 pi / patch size
    pub fn modulus(self, config: &OceanConfig) -> [f32; 2] {
        let size = self.patch_size(config);
        [2.0 * PI / size[0], 2.0 * PI / size[1]]
    }
}

/// Owner of the three distribution buffers
pub struct SpectrumStore {
    height: PhysicalBuffer,
    displacement: PhysicalBuffer,
    normal: PhysicalBuffer,
    sizes: [u32; 3],
}

impl SpectrumStore {
    pub fn new(device: &wgpu::Device, config: &OceanConfig) -> Result<Self> {
        let make = |kind: SpectrumKind| PhysicalBuffer {
            buffer: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(kind.distribution_name()),
                size: complex_buffer_size(kind.fft_size(config)),
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            }),
            cookie: next_cookie(),
        };
        gpu::scoped(device, || {
            Ok(Self {
                height: make(SpectrumKind::Height),
                displacement: make(SpectrumKind::Displacement),
                normal: make(SpectrumKind::Normal),
                sizes: SpectrumKind::ALL.map(|kind| kind.fft_size(config)),
            })
        })
    }

    pub fn get(&self, kind: SpectrumKind) -> &PhysicalBuffer {
        match kind {
            SpectrumKind::Height => &self.height,
            SpectrumKind::Displacement => &self.displacement,
            SpectrumKind::Normal => &self.normal,
        }
    }

    pub fn size(&self, kind: SpectrumKind) -> u32 {
        self.sizes[kind.variant() as usize]
    }

    /// Replace one distribution. `samples` must hold N x N row-major values.
    pub fn upload(&self, queue: &wgpu::Queue, kind: SpectrumKind, samples: &[[f32; 2]]) -> Result<()> {
        let n = self.size(kind) as usize;
        if samples.len() != n * n {
            return Err(OceanError::invalid(
                "distribution",
                format!(
                    "{:?} expects {} samples, got {}",
                    kind,
                    n * n,
                    samples.len()
                ),
            ));
        }
        queue.write_buffer(&self.get(kind).buffer, 0, bytemuck::cast_slice(samples));
        Ok(())
    }
}

/// Uniform block of `generate_fft.wgsl`
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub(crate) struct GenerateParams {
    pub modulus: [f32; 2],
    pub n: [u32; 2],
    pub time: f32,
    pub variant: u32,
    pub _padding: [u32; 2],
}

fn signed_frequency(i: usize, n: usize) -> f32 {
    if i < n / 2 {
        i as f32
    } else {
        i as f32 - n as f32
    }
}

/// CPU mirror of the modulation kernel
pub fn modulate_reference(
    distribution: &[Complex32],
    n: usize,
    modulus: [f32; 2],
    time: f32,
    kind: SpectrumKind,
) -> Vec<Complex32> {
    let mut out = vec![Complex32::new(0.0, 0.0); n * n];
    for y in 0..n {
        for x in 0..n {
            let kx = modulus[0] * signed_frequency(x, n);
            let kz = modulus[1] * signed_frequency(y, n);
            let mx = (n - x) & (n - 1);
            let my = (n - y) & (n - 1);

            let a = distribution[y * n + x];
            let b = distribution[my * n + mx].conj();
            let k_len = (kx * kx + kz * kz).sqrt();
            let rot = Complex32::from_polar(1.0, (GRAVITY * k_len).sqrt() * time);
            let h = a * rot + b * rot.conj();

            out[y * n + x] = match kind {
                SpectrumKind::Height => h,
                SpectrumKind::Displacement if k_len > 0.0 => {
                    h * Complex32::new(kz / k_len, -kx / k_len)
                }
                SpectrumKind::Displacement => Complex32::new(0.0, 0.0),
                SpectrumKind::Normal => h * Complex32::new(-kz, kx),
            };
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size() {
        assert_eq!(complex_buffer_size(256), 256 * 256 * 8);
        assert_eq!(std::mem::size_of::<GenerateParams>(), 32);
    }

    #[test]
    fn test_zero_distribution_stays_zero() {
        let dist = vec![Complex32::new(0.0, 0.0); 16 * 16];
        for kind in SpectrumKind::ALL {
            let out = modulate_reference(&dist, 16, [0.1, 0.1], 3.7, kind);
            assert!(out.iter().all(|c| c.norm() == 0.0));
        }
    }

    #[test]
    fn test_height_spectrum_is_hermitian() {
        let n = 8;
        let dist: Vec<Complex32> = (0..n * n)
            .map(|i| Complex32::new((i as f32 * 0.37).sin(), (i as f32 * 0.11).cos()))
            .collect();
        let out = modulate_reference(&dist, n, [0.2, 0.2], 1.25, SpectrumKind::Height);
        // Skip the Nyquist row and column, which pair with themselves
        for y in 0..n {
            for x in 0..n {
                if x == n / 2 || y == n / 2 {
                    continue;
                }
                let mirror = out[((n - y) & (n - 1)) * n + ((n - x) & (n - 1))];
                let d = out[y * n + x] - mirror.conj();
                assert!(d.norm() < 1e-5, "bin ({}, {}) not hermitian", x, y);
            }
        }
    }

    #[test]
    fn test_dc_displacement_is_zero() {
        let dist = vec![Complex32::new(1.0, 1.0); 4 * 4];
        let out = modulate_reference(&dist, 4, [0.5, 0.5], 0.0, SpectrumKind::Displacement);
        assert_eq!(out[0], Complex32::new(0.0, 0.0));
    }

    #[test]
    fn test_time_zero_height_combines_both_halves() {
        let mut dist = vec![Complex32::new(0.0, 0.0); 4 * 4];
        dist[1] = Complex32::new(1.0, 0.0);
        let out = modulate_reference(&dist, 4, [1.0, 1.0], 0.0, SpectrumKind::Height);
        // Bin 1 gets h0(k); its mirror, bin 3, gets conj(h0(k))
        assert_eq!(out[1], Complex32::new(1.0, 0.0));
        assert_eq!(out[3], Complex32::new(1.0, 0.0));
    }
}
