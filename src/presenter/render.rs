// SPDX-License-Identifier: GPL-3.0-only

//! CPU rendering of colored point clouds
//!
//! A virtual camera orbits the cloud's centroid. Points are splatted one
//! pixel each with a depth test, and the color camera's origin is marked
//! with three axes (X red, Y green, Z blue).

use image::{Rgb, RgbImage};
use nalgebra::{Rotation3, Vector3};

use crate::constants::viewer;
use crate::media::ImageBuffer;
use crate::pipelines::PointCloud;

/// Orbit camera around the point cloud
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitView {
    /// Rotation around the vertical axis (degrees)
    pub yaw_deg: f32,
    /// Rotation around the horizontal axis (degrees), clamped to ±89
    pub pitch_deg: f32,
    /// Distance from the orbit center (mm)
    pub distance_mm: f32,
    /// Vertical field of view (degrees)
    pub fov_deg: f32,
}

impl Default for OrbitView {
    fn default() -> Self {
        Self {
            yaw_deg: 0.0,
            pitch_deg: 0.0,
            distance_mm: viewer::VIEW_DISTANCE_MM,
            fov_deg: viewer::VIEW_FOV_DEG,
        }
    }
}

impl OrbitView {
    /// Turn the view by the given angles (degrees)
    pub fn rotate(&mut self, yaw_deg: f32, pitch_deg: f32) {
        self.yaw_deg = (self.yaw_deg + yaw_deg) % 360.0;
        self.pitch_deg = (self.pitch_deg + pitch_deg).clamp(-89.0, 89.0);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn rotation(&self) -> Rotation3<f32> {
        Rotation3::from_axis_angle(&Vector3::x_axis(), self.pitch_deg.to_radians())
            * Rotation3::from_axis_angle(&Vector3::y_axis(), self.yaw_deg.to_radians())
    }
}

/// Pinhole projection from orbit-camera space into the output raster
struct Projector {
    rotation: Rotation3<f32>,
    center: Vector3<f32>,
    distance: f32,
    focal: f32,
    half_w: f32,
    half_h: f32,
    width: u32,
    height: u32,
}

impl Projector {
    fn project(&self, point: &Vector3<f32>) -> Option<(u32, u32, f32)> {
        let p = self.rotation * (point - self.center);
        let z = p.z + self.distance;
        if z <= 1.0 {
            return None;
        }
        let u = (self.half_w + self.focal * p.x / z).floor();
        let v = (self.half_h + self.focal * p.y / z).floor();
        if u < 0.0 || v < 0.0 || u >= self.width as f32 || v >= self.height as f32 {
            return None;
        }
        Some((u as u32, v as u32, z))
    }
}

/// Centroid of the valid points, or a point straight ahead if there are none
fn orbit_center(cloud: &PointCloud) -> Vector3<f32> {
    let mut sum = Vector3::<f64>::zeros();
    let mut count = 0u64;
    for p in cloud.points().iter().filter(|p| p.is_valid()) {
        sum += Vector3::new(p.x as f64, p.y as f64, p.z as f64);
        count += 1;
    }
    if count == 0 {
        return Vector3::new(0.0, 0.0, viewer::VIEW_DISTANCE_MM);
    }
    (sum / count as f64).cast::<f32>()
}

/// Render `cloud`, colored by the paired `color` image, into a new raster
pub fn render_point_cloud(
    cloud: &PointCloud,
    color: &ImageBuffer,
    view: &OrbitView,
    width: u32,
    height: u32,
) -> RgbImage {
    let mut out = RgbImage::new(width, height);
    if width == 0 || height == 0 {
        return out;
    }

    let projector = Projector {
        rotation: view.rotation(),
        center: orbit_center(cloud),
        distance: view.distance_mm,
        focal: (height as f32 / 2.0) / (view.fov_deg.to_radians() / 2.0).tan(),
        half_w: width as f32 / 2.0,
        half_h: height as f32 / 2.0,
        width,
        height,
    };
    let mut zbuf = vec![f32::INFINITY; width as usize * height as usize];

    let mut plot = |point: &Vector3<f32>, rgb: [u8; 3], out: &mut RgbImage| {
        if let Some((u, v, z)) = projector.project(point) {
            let idx = v as usize * width as usize + u as usize;
            if z < zbuf[idx] {
                zbuf[idx] = z;
                out.put_pixel(u, v, Rgb(rgb));
            }
        }
    };

    for (i, p) in cloud.points().iter().enumerate() {
        if !p.is_valid() {
            continue;
        }
        let (x, y) = (i as u32 % cloud.width(), i as u32 / cloud.width());
        let rgb = color
            .bgra_at(x, y)
            .map(|[b, g, r, _]| [r, g, b])
            .unwrap_or([255, 255, 255]);
        plot(&Vector3::new(p.x as f32, p.y as f32, p.z as f32), rgb, &mut out);
    }

    // Coordinate system marker at the color camera origin
    let axes = [
        (Vector3::x(), [255, 0, 0]),
        (Vector3::y(), [0, 255, 0]),
        (Vector3::z(), [0, 0, 255]),
    ];
    const AXIS_SAMPLES: u32 = 200;
    for (axis, rgb) in axes {
        for s in 0..=AXIS_SAMPLES {
            let t = s as f32 / AXIS_SAMPLES as f32 * viewer::ORIGIN_AXIS_MM;
            plot(&(axis * t), rgb, &mut out);
        }
    }

    out
}
