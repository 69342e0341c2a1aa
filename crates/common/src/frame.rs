use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::geometry::CullingVolume;

/// Camera pose for one frame, in native coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub position: DVec3,
    /// Unit view direction.
    pub direction: DVec3,
    pub up: DVec3,
}

impl CameraState {
    pub fn new(position: DVec3, direction: DVec3, up: DVec3) -> Self {
        Self {
            position,
            direction: direction.normalize(),
            up: up.normalize(),
        }
    }
}

/// Distance fog parameters. Fogged tiles tolerate a larger screen-space error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fog {
    pub enabled: bool,
    pub density: f64,
    /// Maximum SSE reduction applied at full fog.
    pub sse_factor: f64,
}

impl Default for Fog {
    fn default() -> Self {
        Self {
            enabled: false,
            density: 2.0e-4,
            sse_factor: 2.0,
        }
    }
}

impl Fog {
    /// Fog amount in `[0, 1)` at `distance`.
    pub fn amount(&self, distance: f64) -> f64 {
        let scalar = distance * self.density;
        1.0 - (-(scalar * scalar)).exp()
    }
}

/// Perspective projection used to derive the frustum and the SSE denominator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Perspective {
    /// Vertical field of view in radians.
    pub fovy: f64,
    pub aspect: f64,
    pub near: f64,
    pub far: f64,
}

impl Default for Perspective {
    fn default() -> Self {
        Self {
            fovy: 60f64.to_radians(),
            aspect: 16.0 / 9.0,
            near: 1.0,
            far: 5.0e7,
        }
    }
}

/// Everything the tile scheduler reads about the current frame.
#[derive(Debug, Clone)]
pub struct FrameState {
    pub frame_number: u64,
    pub camera: CameraState,
    pub culling_volume: CullingVolume,
    pub fog: Fog,
    /// True when the camera pose differs from the previous frame.
    pub camera_changed: bool,
    /// Height of the drawing buffer in pixels.
    pub drawing_buffer_height: f64,
    /// `2 * tan(fovy / 2)` for perspective projections.
    pub sse_denominator: f64,
}

impl FrameState {
    pub fn perspective(
        frame_number: u64,
        camera: CameraState,
        projection: Perspective,
        drawing_buffer_height: f64,
    ) -> Self {
        let culling_volume = CullingVolume::from_perspective(
            camera.position,
            camera.direction,
            camera.up,
            projection.fovy,
            projection.aspect,
            projection.near,
            projection.far,
        );
        Self {
            frame_number,
            camera,
            culling_volume,
            fog: Fog::default(),
            camera_changed: true,
            drawing_buffer_height,
            sse_denominator: 2.0 * (projection.fovy * 0.5).tan(),
        }
    }

    pub fn with_fog(mut self, fog: Fog) -> Self {
        self.fog = fog;
        self
    }

    pub fn with_camera_changed(mut self, changed: bool) -> Self {
        self.camera_changed = changed;
        self
    }

    /// Projected error in pixels of `geometric_error` seen at `distance`.
    pub fn screen_space_error(&self, geometric_error: f64, distance: f64) -> f64 {
        if distance <= 0.0 {
            return f64::INFINITY;
        }
        let mut error =
            geometric_error * self.drawing_buffer_height / (distance * self.sse_denominator);
        if self.fog.enabled {
            error -= self.fog.amount(distance) * self.fog.sse_factor;
        }
        error
    }
}
