// SPDX-License-Identifier: GPL-3.0-only

//! Pinhole camera model with rational Brown-Conrady distortion
//!
//! Pixel coordinates put the center of pixel `(i, j)` at `(i, j)`, so the
//! pixel covers `[i - 0.5, i + 0.5)`. Points are in millimeters with +Z
//! looking out of the lens.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::constants::geometry::{UNDISTORT_ITERATIONS, UNDISTORT_TOLERANCE};

/// Rational Brown-Conrady distortion coefficients
///
/// Radial term `(1 + k1 r² + k2 r⁴ + k3 r⁶) / (1 + k4 r² + k5 r⁴ + k6 r⁶)`
/// plus tangential `p1`, `p2`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrownConrady {
    pub k1: f32,
    pub k2: f32,
    pub k3: f32,
    pub k4: f32,
    pub k5: f32,
    pub k6: f32,
    pub p1: f32,
    pub p2: f32,
}

impl BrownConrady {
    /// True if every coefficient is zero
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    fn coefficients(&self) -> [f32; 8] {
        [
            self.k1, self.k2, self.k3, self.k4, self.k5, self.k6, self.p1, self.p2,
        ]
    }

    /// Apply distortion to a normalized image point
    pub fn distort(&self, x: f32, y: f32) -> (f32, f32) {
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let kr = (1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6)
            / (1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6);

        let xd = x * kr + 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let yd = y * kr + self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        (xd, yd)
    }

    /// Invert [`distort`](Self::distort) by fixed-point iteration
    ///
    /// Always runs the same number of iterations so results only depend on
    /// the inputs. Returns `None` if the result does not reproject onto the
    /// distorted point.
    pub fn undistort(&self, xd: f32, yd: f32) -> Option<(f32, f32)> {
        if self.is_identity() {
            return Some((xd, yd));
        }

        let (mut x, mut y) = (xd, yd);
        for _ in 0..UNDISTORT_ITERATIONS {
            let r2 = x * x + y * y;
            let r4 = r2 * r2;
            let r6 = r4 * r2;
            let icdist = (1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6)
                / (1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6);
            let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
            x = (xd - dx) * icdist;
            y = (yd - dy) * icdist;
        }

        let (rx, ry) = self.distort(x, y);
        let residual = ((rx - xd).powi(2) + (ry - yd).powi(2)).sqrt();
        (x.is_finite() && y.is_finite() && residual <= UNDISTORT_TOLERANCE).then_some((x, y))
    }
}

/// Intrinsic parameters of one camera at a specific image resolution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Focal length X (pixels)
    pub fx: f32,
    /// Focal length Y (pixels)
    pub fy: f32,
    /// Principal point X (pixels)
    pub cx: f32,
    /// Principal point Y (pixels)
    pub cy: f32,
    #[serde(default)]
    pub distortion: BrownConrady,
    /// Largest normalized radius for which the distortion model is valid
    #[serde(default)]
    pub metric_radius: Option<f32>,
}

impl CameraIntrinsics {
    /// Undistorted pinhole camera
    pub fn pinhole(width: u32, height: u32, fx: f32, fy: f32, cx: f32, cy: f32) -> Self {
        Self {
            width,
            height,
            fx,
            fy,
            cx,
            cy,
            distortion: BrownConrady::default(),
            metric_radius: None,
        }
    }

    /// Check that the parameters describe a usable camera
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "camera resolution is zero ({}x{})",
                self.width, self.height
            ));
        }
        if !(self.fx.is_finite() && self.fy.is_finite() && self.fx > 0.0 && self.fy > 0.0) {
            return Err(format!(
                "focal length must be positive (fx={}, fy={})",
                self.fx, self.fy
            ));
        }
        if !(self.cx.is_finite() && self.cy.is_finite()) {
            return Err("principal point is not finite".to_string());
        }
        if self.distortion.coefficients().iter().any(|c| !c.is_finite()) {
            return Err("distortion coefficients are not finite".to_string());
        }
        if let Some(radius) = self.metric_radius
            && !(radius.is_finite() && radius > 0.0)
        {
            return Err(format!("metric radius must be positive, got {}", radius));
        }
        Ok(())
    }

    /// Derive intrinsics for an output mode of the same sensor
    ///
    /// The native image is scaled uniformly until it covers the requested
    /// size, then center-cropped.
    pub fn for_resolution(&self, width: u32, height: u32) -> Result<Self, String> {
        self.validate()?;
        if width == 0 || height == 0 {
            return Err(format!("target resolution is zero ({}x{})", width, height));
        }

        let (nw, nh) = (self.width as f32, self.height as f32);
        let (w, h) = (width as f32, height as f32);
        let scale = (w / nw).max(h / nh);
        let offset_x = (nw * scale - w) / 2.0;
        let offset_y = (nh * scale - h) / 2.0;

        Ok(Self {
            width,
            height,
            fx: self.fx * scale,
            fy: self.fy * scale,
            cx: (self.cx + 0.5) * scale - 0.5 - offset_x,
            cy: (self.cy + 0.5) * scale - 0.5 - offset_y,
            distortion: self.distortion,
            metric_radius: self.metric_radius,
        })
    }

    /// Project a camera-space point (mm) to pixel coordinates
    ///
    /// Returns `None` behind the camera or outside the model's valid radius.
    /// The result may lie outside the image.
    pub fn project(&self, point: &Vector3<f32>) -> Option<(f32, f32)> {
        if !(point.z > 0.0) {
            return None;
        }
        let x = point.x / point.z;
        let y = point.y / point.z;
        if let Some(radius) = self.metric_radius
            && x * x + y * y > radius * radius
        {
            return None;
        }

        let (xd, yd) = self.distortion.distort(x, y);
        let u = self.fx * xd + self.cx;
        let v = self.fy * yd + self.cy;
        (u.is_finite() && v.is_finite()).then_some((u, v))
    }

    /// Map pixel coordinates to the normalized ray `(x/z, y/z)`
    pub fn unproject_normalized(&self, u: f32, v: f32) -> Option<(f32, f32)> {
        let xd = (u - self.cx) / self.fx;
        let yd = (v - self.cy) / self.fy;
        let (x, y) = self.distortion.undistort(xd, yd)?;
        if let Some(radius) = self.metric_radius
            && x * x + y * y > radius * radius
        {
            return None;
        }
        Some((x, y))
    }

    /// Unproject a pixel with depth (mm) into a camera-space point
    pub fn unproject(&self, u: f32, v: f32, depth_mm: f32) -> Option<Vector3<f32>> {
        if !(depth_mm > 0.0) {
            return None;
        }
        let (x, y) = self.unproject_normalized(u, v)?;
        Some(Vector3::new(x * depth_mm, y * depth_mm, depth_mm))
    }
}

/// Rigid transform from one camera's coordinate system to another's
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extrinsics {
    /// Rotation matrix 3x3
    pub rotation: Matrix3<f32>,
    /// Translation in millimeters
    pub translation: Vector3<f32>,
}

impl Default for Extrinsics {
    fn default() -> Self {
        Self::identity()
    }
}

impl Extrinsics {
    /// No rotation, no translation
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Pure translation in millimeters
    pub fn from_translation(x: f32, y: f32, z: f32) -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::new(x, y, z),
        }
    }

    /// Apply the transform: `R * p + t`
    pub fn transform_point(&self, point: &Vector3<f32>) -> Vector3<f32> {
        self.rotation * point + self.translation
    }

    /// Check for a finite, proper rotation
    pub fn validate(&self) -> Result<(), String> {
        if self.rotation.iter().any(|v| !v.is_finite())
            || self.translation.iter().any(|v| !v.is_finite())
        {
            return Err("extrinsics contain non-finite values".to_string());
        }
        let orthogonality = (self.rotation.transpose() * self.rotation - Matrix3::identity()).abs().max();
        let det = self.rotation.determinant();
        if orthogonality > 1e-3 || (det - 1.0).abs() > 1e-3 {
            return Err(format!(
                "rotation is not orthonormal (det={:.4}, deviation={:.4})",
                det, orthogonality
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn distorted_camera() -> CameraIntrinsics {
        CameraIntrinsics {
            distortion: BrownConrady {
                k1: 0.5,
                k2: -0.1,
                k3: 0.01,
                k4: 0.8,
                k5: -0.05,
                k6: 0.005,
                p1: 1e-4,
                p2: -2e-4,
            },
            metric_radius: Some(1.7),
            ..CameraIntrinsics::pinhole(640, 576, 504.0, 504.0, 319.5, 287.5)
        }
    }

    #[test]
    fn test_project_center() {
        let cam = CameraIntrinsics::pinhole(640, 576, 504.0, 504.0, 319.5, 287.5);
        let (u, v) = cam.project(&Vector3::new(0.0, 0.0, 1000.0)).unwrap();
        assert_relative_eq!(u, 319.5);
        assert_relative_eq!(v, 287.5);
    }

    #[test]
    fn test_project_behind_camera() {
        let cam = CameraIntrinsics::pinhole(640, 576, 504.0, 504.0, 319.5, 287.5);
        assert!(cam.project(&Vector3::new(0.0, 0.0, -10.0)).is_none());
        assert!(cam.project(&Vector3::new(0.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn test_unproject_project_inverse() {
        let cam = distorted_camera();
        for &(u, v) in &[(10.0, 20.0), (319.5, 287.5), (600.0, 500.0)] {
            let p = cam.unproject(u, v, 1500.0).unwrap();
            assert_relative_eq!(p.z, 1500.0);
            let (pu, pv) = cam.project(&p).unwrap();
            assert_relative_eq!(pu, u, epsilon = 0.05);
            assert_relative_eq!(pv, v, epsilon = 0.05);
        }
    }

    #[test]
    fn test_metric_radius_bound() {
        let cam = distorted_camera();
        // Normalized radius 2.0 is beyond the valid model range
        assert!(cam.project(&Vector3::new(2000.0, 0.0, 1000.0)).is_none());
    }

    #[test]
    fn test_for_resolution_crop() {
        let native = CameraIntrinsics::pinhole(4096, 3072, 1950.0, 1950.0, 2047.5, 1535.5);
        let mode = native.for_resolution(1280, 720).unwrap();
        assert_eq!((mode.width, mode.height), (1280, 720));
        assert_relative_eq!(mode.fx, 609.375);
        assert_relative_eq!(mode.cx, 639.5);
        assert_relative_eq!(mode.cy, 359.5);
    }

    #[test]
    fn test_for_resolution_rejects_invalid() {
        let mut native = CameraIntrinsics::pinhole(1024, 1024, 806.4, 806.4, 511.5, 511.5);
        assert!(native.for_resolution(0, 576).is_err());
        native.fx = 0.0;
        assert!(native.for_resolution(640, 576).is_err());
    }

    #[test]
    fn test_extrinsics_transform() {
        let ext = Extrinsics::from_translation(-32.0, 0.0, 0.0);
        let p = ext.transform_point(&Vector3::new(10.0, 20.0, 1000.0));
        assert_relative_eq!(p, Vector3::new(-22.0, 20.0, 1000.0));
        assert!(ext.validate().is_ok());
    }

    #[test]
    fn test_extrinsics_rejects_scaled_rotation() {
        let ext = Extrinsics {
            rotation: Matrix3::identity() * 2.0,
            translation: Vector3::zeros(),
        };
        assert!(ext.validate().is_err());
    }
}
