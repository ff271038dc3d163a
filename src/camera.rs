//! Camera paths, per-frame view parameters and frustum planes.
//!
//! [`CameraSystem`] turns a [`CameraPreset`] and the simulated time into an
//! eye position and look-at target, then into the [`ViewParams`] the ocean
//! latches each frame:
//!
//! - `camera_position` drives grid snapping and LOD classification;
//! - `view_proj` is the right-handed perspective projection with wgpu's
//!   `[0, 1]` depth range;
//! - `frustum` holds the six normalised planes the cull pass tests tile
//!   bounds against.
//!
//! Presets are pure functions of time, so a recording replays identically.

use glam::{Mat4, Vec3, Vec4};

use crate::params::{CameraPreset, FixedCamera, FlyoverPath, OrbitPath, RenderConfig};

/// Per-frame view inputs consumed by the ocean
#[derive(Debug, Clone, Copy)]
pub struct ViewParams {
    pub camera_position: Vec3,
    pub view_proj: Mat4,
    pub frustum: Frustum,
}

impl ViewParams {
    pub fn new(camera_position: Vec3, view_proj: Mat4) -> Self {
        Self {
            camera_position,
            view_proj,
            frustum: Frustum::from_view_proj(view_proj),
        }
    }

    /// View that accepts every cell (used by tests and tooling)
    pub fn unculled(camera_position: Vec3) -> Self {
        Self {
            camera_position,
            view_proj: Mat4::IDENTITY,
            frustum: Frustum::infinite(),
        }
    }
}

/// Six inward-facing planes `(n, d)`; a point is inside when `dot(n, p) + d >= 0`.
///
/// Order: left, right, bottom, top, near, far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub planes: [Vec4; 6],
}

impl Frustum {
    /// Extract planes from a view-projection matrix with wgpu's [0, 1] clip depth.
    pub fn from_view_proj(m: Mat4) -> Self {
        let r0 = m.row(0);
        let r1 = m.row(1);
        let r2 = m.row(2);
        let r3 = m.row(3);

        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2].map(normalize_plane);
        Self { planes }
    }

    /// Frustum whose planes accept everything
    pub fn infinite() -> Self {
        Self {
            planes: [Vec4::new(0.0, 0.0, 0.0, 1.0); 6],
        }
    }

    /// Inclusive AABB test: a box touching a plane counts as visible.
    pub fn intersects_aabb(&self, min: Vec3, max: Vec3) -> bool {
        self.planes.iter().all(|plane| {
            let n = plane.truncate();
            let positive = Vec3::select(n.cmpge(Vec3::ZERO), max, min);
            n.dot(positive) + plane.w >= 0.0
        })
    }

    pub fn to_cols(&self) -> [[f32; 4]; 6] {
        self.planes.map(|p| p.to_array())
    }
}

fn normalize_plane(plane: Vec4) -> Vec4 {
    let len = plane.truncate().length();
    if len > 0.0 {
        plane / len
    } else {
        plane
    }
}

/// Drives the view from a camera preset
pub struct CameraSystem {
    preset: CameraPreset,
}

impl CameraSystem {
    pub fn new(preset: CameraPreset) -> Self {
        Self { preset }
    }

    /// Eye and look-at target at `time_s`
    pub fn compute_position_and_target(&self, time_s: f32) -> (Vec3, Vec3) {
        match &self.preset {
            CameraPreset::Flyover(params) => Self::compute_flyover(params, time_s),
            CameraPreset::Orbit(params) => Self::compute_orbit(params, time_s),
            CameraPreset::Fixed(params) => Self::compute_fixed(params),
        }
    }

    fn compute_fixed(p: &FixedCamera) -> (Vec3, Vec3) {
        (Vec3::from_array(p.position), Vec3::from_array(p.target))
    }

    fn compute_flyover(p: &FlyoverPath, time_s: f32) -> (Vec3, Vec3) {
        let heading = p.heading_deg.to_radians();
        let dir = Vec3::new(heading.sin(), 0.0, heading.cos());
        let eye = Vec3::new(0.0, p.altitude_m, 0.0) + dir * (time_s * p.speed_m_per_s);

        // Look ahead and down toward the surface
        let target = eye + dir * p.look_ahead_m - Vec3::Y * (eye.y * 0.4);

        (eye, target)
    }

    fn compute_orbit(p: &OrbitPath, time_s: f32) -> (Vec3, Vec3) {
        let angle = std::f32::consts::TAU * time_s / p.period_s.max(f32::EPSILON);
        let eye = Vec3::new(
            p.center[0] + p.radius_m * angle.cos(),
            p.altitude_m,
            p.center[1] + p.radius_m * angle.sin(),
        );
        (eye, Vec3::new(p.center[0], 0.0, p.center[1]))
    }

    /// Build the frame's view parameters
    pub fn view_params(&self, time_s: f32, render_config: &RenderConfig) -> ViewParams {
        let (eye, target) = self.compute_position_and_target(time_s);

        // Always keep Y as up vector (camera never rolls)
        let view = Mat4::look_at_rh(eye, target, Vec3::Y);
        let proj = Mat4::perspective_rh(
            render_config.fov_degrees.to_radians(),
            render_config.aspect_ratio(),
            render_config.near_plane_m,
            render_config.far_plane_m,
        );

        ViewParams::new(eye, proj * view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn looking_down_z() -> Frustum {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 10.0, 0.0), Vec3::new(0.0, 10.0, 100.0), Vec3::Y);
        let proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.5, 500.0);
        Frustum::from_view_proj(proj * view)
    }

    #[test]
    fn test_box_in_front_is_visible() {
        let frustum = looking_down_z();
        assert!(frustum.intersects_aabb(Vec3::new(-5.0, -10.0, 50.0), Vec3::new(5.0, 10.0, 60.0)));
    }

    #[test]
    fn test_box_behind_is_culled() {
        let frustum = looking_down_z();
        assert!(!frustum.intersects_aabb(Vec3::new(-5.0, -10.0, -60.0), Vec3::new(5.0, 10.0, -50.0)));
    }

    #[test]
    fn test_box_beyond_far_plane_is_culled() {
        let frustum = looking_down_z();
        assert!(!frustum.intersects_aabb(Vec3::new(-5.0, -10.0, 600.0), Vec3::new(5.0, 10.0, 610.0)));
    }

    #[test]
    fn test_touching_plane_is_inclusive() {
        let frustum = Frustum {
            planes: [Vec4::new(1.0, 0.0, 0.0, 0.0); 6],
        };
        // max.x == 0 lies exactly on the plane x = 0
        assert!(frustum.intersects_aabb(Vec3::new(-1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 1.0)));
        assert!(!frustum.intersects_aabb(Vec3::new(-2.0, 0.0, 0.0), Vec3::new(-0.5, 1.0, 1.0)));
    }

    #[test]
    fn test_infinite_frustum_accepts_everything() {
        let frustum = Frustum::infinite();
        assert!(frustum.intersects_aabb(Vec3::splat(-1e6), Vec3::splat(-1e6 + 1.0)));
    }

    #[test]
    fn test_flyover_follows_heading() {
        let params = FlyoverPath {
            heading_deg: 90.0,
            ..FlyoverPath::default()
        };
        let camera = CameraSystem::new(CameraPreset::Flyover(params.clone()));

        let (eye0, target0) = camera.compute_position_and_target(0.0);
        assert_eq!(eye0, Vec3::new(0.0, params.altitude_m, 0.0));
        assert!((target0.x - params.look_ahead_m).abs() < 1e-3);
        assert!(target0.y < eye0.y);

        let (eye1, _) = camera.compute_position_and_target(2.0);
        assert!((eye1.x - 2.0 * params.speed_m_per_s).abs() < 1e-3);
        assert!(eye1.z.abs() < 1e-3);
    }

    #[test]
    fn test_orbit_keeps_radius_and_target() {
        let params = OrbitPath::default();
        let camera = CameraSystem::new(CameraPreset::Orbit(params.clone()));
        for t in [0.0, 7.5, 21.0, 59.0] {
            let (eye, target) = camera.compute_position_and_target(t);
            let r = Vec3::new(eye.x, 0.0, eye.z).length();
            assert!((r - params.radius_m).abs() < 1e-2);
            assert_eq!(eye.y, params.altitude_m);
            assert_eq!(target, Vec3::ZERO);
        }
    }

    #[test]
    fn test_view_params_frustum_matches_matrix() {
        let camera = CameraSystem::new(CameraPreset::default());
        let view = camera.view_params(0.0, &RenderConfig::default());
        assert_ne!(view.view_proj, Mat4::IDENTITY);
        assert_eq!(view.frustum, Frustum::from_view_proj(view.view_proj));
    }
}
