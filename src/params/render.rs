//! Rendering and capture configuration.

/// Rendering configuration
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Output width (pixels)
    pub width: u32,

    /// Output height (pixels)
    pub height: u32,

    /// Field of view (degrees)
    pub fov_degrees: f32,

    /// Near clipping plane (meters)
    pub near_plane_m: f32,

    /// Far clipping plane (meters)
    /// Must cover the grid extent for distant tiles to survive culling
    pub far_plane_m: f32,

    /// Clear color behind the ocean (linear RGB)
    pub sky_color: [f64; 3],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fov_degrees: 60.0,
            near_plane_m: 0.5,
            far_plane_m: 4000.0,
            sky_color: [0.45, 0.6, 0.75],
        }
    }
}

impl RenderConfig {
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

/// Headless capture configuration
#[derive(Debug, Clone)]
pub struct RecordingConfig {
    /// Number of frames to render
    pub frames: usize,

    /// Simulated seconds between frames
    pub frame_dt_s: f32,

    /// Output directory for PNG frames
    pub output_dir: String,
}

impl RecordingConfig {
    pub fn new(frames: usize, fps: u32, output_dir: impl Into<String>) -> Self {
        Self {
            frames,
            frame_dt_s: 1.0 / fps.max(1) as f32,
            output_dir: output_dir.into(),
        }
    }

    /// Path of a numbered frame
    pub fn frame_path(&self, frame_num: usize) -> String {
        format!("{}/frame_{:05}.png", self.output_dir, frame_num)
    }
}
