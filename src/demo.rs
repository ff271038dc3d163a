//! Phillips-spectrum distributions for the binary and GPU tests.

use std::f32::consts::{FRAC_1_SQRT_2, PI};

use rand::{Rng, SeedableRng};

use crate::ocean::spectrum::GRAVITY;

/// Wind-driven spectrum settings
#[derive(Debug, Clone)]
pub struct PhillipsParams {
    /// Wind speed (m/s)
    pub wind_speed: f32,

    /// Wind direction in the xz plane (normalized on use)
    pub wind_dir: [f32; 2],

    /// RMS height the spectrum is scaled to (meters)
    pub rms_height_m: f32,

    /// Waves shorter than this are damped (meters)
    pub small_wave_m: f32,

    pub seed: u64,
}

impl Default for PhillipsParams {
    fn default() -> Self {
        Self {
            wind_speed: 12.0,
            wind_dir: [0.6, 0.8],
            rms_height_m: 1.2,
            small_wave_m: 0.1,
            seed: 1337,
        }
    }
}

fn phillips(k: [f32; 2], wind: [f32; 2], p: &PhillipsParams) -> f32 {
    let k2 = k[0] * k[0] + k[1] * k[1];
    if k2 == 0.0 {
        return 0.0;
    }
    let largest = p.wind_speed * p.wind_speed / GRAVITY;
    let k_dot_w = (k[0] * wind[0] + k[1] * wind[1]) / k2.sqrt();
    let damping = (-k2 * p.small_wave_m * p.small_wave_m).exp();
    (-1.0 / (k2 * largest * largest)).exp() / (k2 * k2) * k_dot_w * k_dot_w * damping
}

/// h0(k) for an N x N patch of `size_m`, row-major, DC at index 0.
pub fn phillips_distribution(n: u32, size_m: [f32; 2], params: &PhillipsParams) -> Vec<[f32; 2]> {
    let n = n as usize;
    let len = (params.wind_dir[0].hypot(params.wind_dir[1])).max(f32::EPSILON);
    let wind = [params.wind_dir[0] / len, params.wind_dir[1] / len];
    let mut rng = rand::rngs::StdRng::seed_from_u64(params.seed);

    let mut power = Vec::with_capacity(n * n);
    for y in 0..n {
        for x in 0..n {
            let fx = if x < n / 2 { x as f32 } else { x as f32 - n as f32 };
            let fy = if y < n / 2 { y as f32 } else { y as f32 - n as f32 };
            let k = [2.0 * PI * fx / size_m[0], 2.0 * PI * fy / size_m[1]];
            power.push(phillips(k, wind, params));
        }
    }

    // Each bin contributes about 2 |h0|^2 to the variance
    let total: f32 = power.iter().sum();
    let scale = if total > 0.0 {
        params.rms_height_m * params.rms_height_m / (2.0 * total)
    } else {
        0.0
    };

    power
        .into_iter()
        .map(|p| {
            let amplitude = (p * scale).sqrt() * FRAC_1_SQRT_2;
            [gaussian(&mut rng) * amplitude, gaussian(&mut rng) * amplitude]
        })
        .collect()
}

// Box-Muller
fn gaussian(rng: &mut impl Rng) -> f32 {
    let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
    let u2: f32 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dc_bin_is_zero() {
        let dist = phillips_distribution(16, [256.0, 256.0], &PhillipsParams::default());
        assert_eq!(dist.len(), 256);
        assert_eq!(dist[0], [0.0, 0.0]);
    }

    #[test]
    fn test_seed_is_deterministic() {
        let params = PhillipsParams::default();
        let a = phillips_distribution(8, [100.0, 100.0], &params);
        let b = phillips_distribution(8, [100.0, 100.0], &params);
        assert_eq!(a, b);
    }

    #[test]
    fn test_crosswind_waves_vanish() {
        let wind = [1.0, 0.0];
        let along = phillips([0.1, 0.0], wind, &PhillipsParams::default());
        let across = phillips([0.0, 0.1], wind, &PhillipsParams::default());
        assert!(along > 0.0);
        assert_eq!(across, 0.0);
    }
}
