//! Camera presets. Every preset is a pure function of simulated time.

/// Straight flight over the water at constant altitude
#[derive(Debug, Clone)]
pub struct FlyoverPath {
    /// Altitude above mean sea level (meters)
    pub altitude_m: f32,

    /// Ground speed (meters per second)
    pub speed_m_per_s: f32,

    /// Heading in the xz plane, 0 = +z, 90 = +x (degrees)
    pub heading_deg: f32,

    /// Look-ahead distance along the heading (meters)
    pub look_ahead_m: f32,
}

impl Default for FlyoverPath {
    fn default() -> Self {
        Self {
            altitude_m: 30.0,
            speed_m_per_s: 40.0,
            heading_deg: 0.0,
            look_ahead_m: 150.0,
        }
    }
}

/// Circle around a point, always looking at it.
/// Moves the camera across cell boundaries so the grid keeps re-snapping.
#[derive(Debug, Clone)]
pub struct OrbitPath {
    /// Orbit centre on the water plane (x, z, meters)
    pub center: [f32; 2],

    pub radius_m: f32,
    pub altitude_m: f32,

    /// Seconds per revolution
    pub period_s: f32,
}

impl Default for OrbitPath {
    fn default() -> Self {
        Self {
            center: [0.0, 0.0],
            radius_m: 200.0,
            altitude_m: 60.0,
            period_s: 60.0,
        }
    }
}

/// Stationary camera
#[derive(Debug, Clone)]
pub struct FixedCamera {
    /// Camera position (meters)
    pub position: [f32; 3],

    /// Look-at target (meters)
    pub target: [f32; 3],
}

impl Default for FixedCamera {
    fn default() -> Self {
        Self {
            position: [0.0, 25.0, 0.0],
            target: [0.0, 0.0, 120.0],
        }
    }
}

#[derive(Debug, Clone)]
pub enum CameraPreset {
    Flyover(FlyoverPath),
    Orbit(OrbitPath),
    Fixed(FixedCamera),
}

impl Default for CameraPreset {
    fn default() -> Self {
        Self::Fixed(FixedCamera::default())
    }
}
