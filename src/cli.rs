//! Command-line argument parsing.

use clap::Parser;

use crate::demo::PhillipsParams;
use crate::params::{
    CameraPreset, FftSizes, FixedCamera, FlyoverPath, GridConfig, OceanConfig, OrbitPath,
    RecordingConfig, RenderConfig,
};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "fft-ocean")]
#[command(about = "Headless GPU FFT ocean renderer", long_about = None)]
pub struct Args {
    /// Number of frames to render
    #[arg(long, default_value = "1")]
    pub frames: usize,

    /// Simulated frames per second
    #[arg(long, default_value = "30")]
    pub fps: u32,

    /// Directory for PNG frames
    #[arg(long, value_name = "DIR", default_value = "frames")]
    pub output: String,

    /// Camera preset: fixed (default), flyover or orbit
    #[arg(long, value_name = "PRESET", default_value = "fixed")]
    pub camera: String,

    /// Camera altitude (meters)
    #[arg(long, value_name = "METERS", default_value = "25")]
    pub elevation: f32,

    /// Cells along each grid side
    #[arg(long, default_value = "32")]
    pub grid: u32,

    /// Quads per cell side at the finest LOD (power of two)
    #[arg(long, default_value = "32")]
    pub resolution: u32,

    /// World extent of the grid and height patch (meters)
    #[arg(long, value_name = "METERS", default_value = "1024")]
    pub size: f32,

    #[arg(long, default_value = "256")]
    pub height_fft: u32,

    #[arg(long, default_value = "128")]
    pub displacement_fft: u32,

    #[arg(long, default_value = "256")]
    pub normal_fft: u32,

    /// Wind speed for the demo spectrum (m/s)
    #[arg(long, default_value = "12")]
    pub wind_speed: f32,

    #[arg(long, default_value = "1337")]
    pub seed: u64,

    #[arg(long, default_value = "1280")]
    pub width: u32,

    #[arg(long, default_value = "720")]
    pub height: u32,

    /// Compare the GPU height field against the CPU reference and exit
    #[arg(long)]
    pub verify: bool,
}

impl Args {
    pub fn ocean_config(&self) -> OceanConfig {
        OceanConfig {
            grid: GridConfig {
                size_m: [self.size, self.size],
                grid_width: self.grid,
                grid_height: self.grid,
                grid_resolution: self.resolution,
            },
            fft: FftSizes {
                height: self.height_fft,
                displacement: self.displacement_fft,
                normal: self.normal_fft,
            },
            ..OceanConfig::default()
        }
    }

    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            width: self.width,
            height: self.height,
            ..RenderConfig::default()
        }
    }

    pub fn recording_config(&self) -> RecordingConfig {
        RecordingConfig::new(self.frames, self.fps, self.output.clone())
    }

    pub fn phillips_params(&self) -> PhillipsParams {
        PhillipsParams {
            wind_speed: self.wind_speed,
            seed: self.seed,
            ..PhillipsParams::default()
        }
    }

    /// Parse camera preset from command-line arguments
    pub fn camera_preset(&self) -> CameraPreset {
        match self.camera.to_lowercase().as_str() {
            "flyover" => {
                log::info!("Camera: Flyover (straight flight at {}m)", self.elevation);
                CameraPreset::Flyover(FlyoverPath {
                    altitude_m: self.elevation,
                    ..FlyoverPath::default()
                })
            }
            "orbit" => {
                log::info!("Camera: Orbit (altitude {}m)", self.elevation);
                CameraPreset::Orbit(OrbitPath {
                    altitude_m: self.elevation,
                    ..OrbitPath::default()
                })
            }
            "fixed" => {
                log::info!("Camera: Fixed (elevation: {}m)", self.elevation);
                let mut fixed = FixedCamera::default();
                fixed.position[1] = self.elevation;
                CameraPreset::Fixed(fixed)
            }
            other => {
                log::warn!("Unknown camera preset '{}', using fixed", other);
                CameraPreset::Fixed(FixedCamera::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_build_a_valid_config() {
        let args = Args::parse_from(["fft-ocean"]);
        assert!(args.ocean_config().validate().is_ok());
        assert!(!args.verify);
        assert!(matches!(args.camera_preset(), CameraPreset::Fixed(_)));
    }

    #[test]
    fn test_flags_reach_config() {
        let args = Args::parse_from([
            "fft-ocean",
            "--grid",
            "64",
            "--resolution",
            "8",
            "--height-fft",
            "64",
            "--camera",
            "orbit",
        ]);
        let config = args.ocean_config();
        assert_eq!(config.grid.grid_width, 64);
        assert_eq!(config.grid.lod_tiers(), 4);
        assert_eq!(config.fft.height, 64);
        assert!(matches!(args.camera_preset(), CameraPreset::Orbit(_)));
    }
}
