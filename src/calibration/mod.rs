// SPDX-License-Identifier: GPL-3.0-only

//! Geometric calibration between the depth and color cameras
//!
//! Devices report intrinsics at native sensor resolution. A
//! [`CalibrationContext`] derives the intrinsics for the active depth mode
//! and color resolution once per session, precomputes the unprojection
//! tables used every frame and is then shared read-only behind an `Arc`.

pub mod camera;

pub use camera::{BrownConrady, CameraIntrinsics, Extrinsics};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backends::camera::{ColorResolution, DepthMode};
use crate::errors::{PipelineError, PipelineResult};

/// Factory calibration as reported by a device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceCalibration {
    /// Depth camera at native sensor resolution
    pub depth: CameraIntrinsics,
    /// Color camera at native sensor resolution
    pub color: CameraIntrinsics,
    /// Depth camera space to color camera space
    pub depth_to_color: Extrinsics,
}

impl Default for DeviceCalibration {
    /// Nominal parameters of a 1024x1024 ToF depth sensor next to a 4096x3072
    /// color sensor with a 32 mm baseline
    fn default() -> Self {
        Self {
            depth: CameraIntrinsics::pinhole(1024, 1024, 806.4, 806.4, 511.5, 511.5),
            color: CameraIntrinsics::pinhole(4096, 3072, 1950.0, 1950.0, 2047.5, 1535.5),
            depth_to_color: Extrinsics::from_translation(-32.0, 0.0, 0.0),
        }
    }
}

/// Normalized ray `(x/z, y/z)` per sample of a pixel lattice
///
/// `None` marks samples outside the camera model's valid region.
#[derive(Debug, Clone, PartialEq)]
pub struct XyTable {
    width: u32,
    height: u32,
    rays: Vec<Option<[f32; 2]>>,
}

impl XyTable {
    /// Sample `width x height` points starting at pixel coordinate `origin`
    fn build(camera: &CameraIntrinsics, width: u32, height: u32, origin: f32) -> Self {
        let mut rays = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                let u = x as f32 + origin;
                let v = y as f32 + origin;
                rays.push(camera.unproject_normalized(u, v).map(|(nx, ny)| [nx, ny]));
            }
        }
        Self {
            width,
            height,
            rays,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Ray at lattice position `(x, y)`
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Option<[f32; 2]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.rays[(y * self.width + x) as usize]
    }

    /// Number of samples with a valid ray
    pub fn valid_count(&self) -> usize {
        self.rays.iter().filter(|r| r.is_some()).count()
    }
}

/// Immutable per-session mapping between depth space, color space and 3-D
/// color camera space
#[derive(Debug, Clone)]
pub struct CalibrationContext {
    depth_mode: DepthMode,
    color_resolution: ColorResolution,
    depth_camera: CameraIntrinsics,
    color_camera: CameraIntrinsics,
    depth_to_color: Extrinsics,
    /// Rays through depth pixel corners, `(w + 1) x (h + 1)`
    depth_corners: XyTable,
    /// Rays through color pixel centers, `w x h`
    color_pixels: XyTable,
}

impl CalibrationContext {
    /// Derive the context for the configured depth mode and color resolution
    ///
    /// Fails with `InvalidCalibration` if either camera is disabled or the
    /// reported parameters are unusable.
    pub fn from_device(
        calibration: &DeviceCalibration,
        depth_mode: DepthMode,
        color_resolution: ColorResolution,
    ) -> PipelineResult<Self> {
        let invalid = PipelineError::InvalidCalibration;

        let (dw, dh) = depth_mode
            .resolution()
            .filter(|_| depth_mode.produces_depth())
            .ok_or_else(|| invalid(format!("depth mode {} produces no depth", depth_mode)))?;
        let (cw, ch) = color_resolution
            .resolution()
            .ok_or_else(|| invalid("color camera is disabled".to_string()))?;

        let depth_camera = calibration
            .depth
            .for_resolution(dw, dh)
            .map_err(|e| invalid(format!("depth camera: {}", e)))?;
        let color_camera = calibration
            .color
            .for_resolution(cw, ch)
            .map_err(|e| invalid(format!("color camera: {}", e)))?;
        calibration
            .depth_to_color
            .validate()
            .map_err(|e| invalid(format!("depth to color: {}", e)))?;

        let depth_corners = XyTable::build(&depth_camera, dw + 1, dh + 1, -0.5);
        let color_pixels = XyTable::build(&color_camera, cw, ch, 0.0);

        if color_pixels.valid_count() == 0 || depth_corners.valid_count() == 0 {
            return Err(invalid(
                "no pixel can be unprojected with the reported distortion".to_string(),
            ));
        }

        debug!(
            depth_fx = depth_camera.fx,
            depth_cx = depth_camera.cx,
            color_fx = color_camera.fx,
            color_cx = color_camera.cx,
            "Derived mode intrinsics"
        );
        info!(
            %depth_mode,
            %color_resolution,
            depth_valid = depth_corners.valid_count(),
            color_valid = color_pixels.valid_count(),
            "Calibration context ready"
        );

        Ok(Self {
            depth_mode,
            color_resolution,
            depth_camera,
            color_camera,
            depth_to_color: calibration.depth_to_color,
            depth_corners,
            color_pixels,
        })
    }

    pub fn depth_mode(&self) -> DepthMode {
        self.depth_mode
    }

    pub fn color_resolution(&self) -> ColorResolution {
        self.color_resolution
    }

    /// Depth camera intrinsics at the active mode
    pub fn depth_camera(&self) -> &CameraIntrinsics {
        &self.depth_camera
    }

    /// Color camera intrinsics at the active resolution
    pub fn color_camera(&self) -> &CameraIntrinsics {
        &self.color_camera
    }

    pub fn depth_to_color(&self) -> &Extrinsics {
        &self.depth_to_color
    }

    /// Depth image size for the active mode
    pub fn depth_size(&self) -> (u32, u32) {
        (self.depth_camera.width, self.depth_camera.height)
    }

    /// Color image size for the active resolution
    pub fn color_size(&self) -> (u32, u32) {
        (self.color_camera.width, self.color_camera.height)
    }

    /// Ray through corner `(x - 0.5, y - 0.5)` of the depth pixel grid
    #[inline]
    pub fn depth_corner_ray(&self, x: u32, y: u32) -> Option<[f32; 2]> {
        self.depth_corners.get(x, y)
    }

    /// Ray through the center of color pixel `(x, y)`
    #[inline]
    pub fn color_pixel_ray(&self, x: u32, y: u32) -> Option<[f32; 2]> {
        self.color_pixels.get(x, y)
    }

    /// Move a depth camera point (mm) into color camera space
    #[inline]
    pub fn depth_point_to_color(&self, point: &Vector3<f32>) -> Vector3<f32> {
        self.depth_to_color.transform_point(point)
    }
}
