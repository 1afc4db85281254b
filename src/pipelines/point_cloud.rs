// SPDX-License-Identifier: GPL-3.0-only

//! Point cloud reprojection of aligned depth
//!
//! The cloud is a dense grid with one point per aligned depth pixel, so
//! point `i` pairs with color pixel `i`. Pixels without a measurement keep
//! their slot and hold the sentinel `(0, 0, 0)`.

use bytemuck::{Pod, Zeroable};
use tracing::trace;

use crate::calibration::CalibrationContext;
use crate::constants::{INVALID_DEPTH_MM, geometry::MAX_POINT_COORD_MM};
use crate::errors::{ImageError, PipelineError, PipelineResult};
use crate::media::{ImageBuffer, ImageFormat};

/// One point in color camera space, millimeters
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct PointXyz {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl PointXyz {
    /// Marker for pixels without a valid measurement
    pub const INVALID: PointXyz = PointXyz { x: 0, y: 0, z: 0 };

    pub fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }

    /// False for the sentinel
    pub fn is_valid(&self) -> bool {
        self.z > 0
    }
}

/// Dense point grid aligned with the color image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointCloud {
    width: u32,
    height: u32,
    points: Vec<PointXyz>,
}

impl PointCloud {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Points in row-major order
    pub fn points(&self) -> &[PointXyz] {
        &self.points
    }

    /// Point at grid position `(x, y)`
    pub fn point_at(&self, x: u32, y: u32) -> Option<PointXyz> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.points[(y * self.width + x) as usize])
    }

    /// Number of points that are not the sentinel
    pub fn valid_count(&self) -> usize {
        self.points.iter().filter(|p| p.is_valid()).count()
    }

    /// Pack into an XYZ16 image buffer
    pub fn to_image(&self) -> Result<ImageBuffer, ImageError> {
        ImageBuffer::from_raw(
            ImageFormat::CustomXyz16,
            self.width,
            self.height,
            self.width * ImageFormat::CustomXyz16.bytes_per_pixel(),
            bytemuck::cast_slice(&self.points).to_vec(),
        )
    }

    /// Unpack an XYZ16 image buffer
    pub fn from_image(img: &ImageBuffer) -> Result<Self, ImageError> {
        img.require_format(ImageFormat::CustomXyz16)?;
        let mut points = Vec::with_capacity(img.width() as usize * img.height() as usize);
        for y in 0..img.height() {
            points.extend(bytemuck::pod_collect_to_vec::<u8, PointXyz>(img.row(y)));
        }
        Ok(Self {
            width: img.width(),
            height: img.height(),
            points,
        })
    }
}

/// Converts aligned depth into a point cloud in color camera space
#[derive(Debug, Clone, Copy, Default)]
pub struct PointCloudBuilder;

impl PointCloudBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Unproject every aligned depth pixel through the color camera model
    ///
    /// Returns `Ok(None)` if there is no aligned depth this frame. The cloud
    /// always has the aligned image's dimensions.
    ///
    /// # Errors
    /// `ReprojectionFailed` if the buffer is not depth or does not match the
    /// calibrated color resolution.
    pub fn build_point_cloud(
        &self,
        aligned_depth: Option<&ImageBuffer>,
        calib: &CalibrationContext,
    ) -> PipelineResult<Option<PointCloud>> {
        let Some(aligned) = aligned_depth else {
            return Ok(None);
        };

        let values = aligned
            .depth_values()
            .map_err(|e| PipelineError::ReprojectionFailed(e.to_string()))?;
        let (width, height) = (aligned.width(), aligned.height());
        if (width, height) != calib.color_size() {
            let (ew, eh) = calib.color_size();
            return Err(PipelineError::ReprojectionFailed(format!(
                "aligned depth is {}x{} but the color camera is {}x{}",
                width, height, ew, eh
            )));
        }

        let mut points = Vec::with_capacity(values.len());
        for y in 0..height {
            for x in 0..width {
                let d = values[(y * width + x) as usize];
                points.push(unproject(x, y, d, calib));
            }
        }

        let cloud = PointCloud {
            width,
            height,
            points,
        };
        trace!(valid = cloud.valid_count(), "Built point cloud");
        Ok(Some(cloud))
    }
}

#[inline]
fn unproject(x: u32, y: u32, d: u16, calib: &CalibrationContext) -> PointXyz {
    if d == INVALID_DEPTH_MM || d as f32 > MAX_POINT_COORD_MM {
        return PointXyz::INVALID;
    }
    let Some([rx, ry]) = calib.color_pixel_ray(x, y) else {
        return PointXyz::INVALID;
    };

    let z = d as f32;
    let px = (rx * z).round();
    let py = (ry * z).round();
    if px.abs() > MAX_POINT_COORD_MM || py.abs() > MAX_POINT_COORD_MM {
        return PointXyz::INVALID;
    }
    PointXyz::new(px as i16, py as i16, d as i16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::{ColorResolution, DepthMode};
    use crate::calibration::DeviceCalibration;

    fn context() -> CalibrationContext {
        CalibrationContext::from_device(
            &DeviceCalibration::default(),
            DepthMode::NfovUnbinned,
            ColorResolution::R720p,
        )
        .unwrap()
    }

    #[test]
    fn test_absent_input_is_no_output() {
        let calib = context();
        assert!(
            PointCloudBuilder::new()
                .build_point_cloud(None, &calib)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_sentinel_and_out_of_range_depth() {
        let calib = context();
        let mut values = vec![0u16; 1280 * 720];
        values[360 * 1280 + 640] = 1000;
        values[0] = 40000;
        let aligned = ImageBuffer::from_depth_values(1280, 720, &values).unwrap();

        let cloud = PointCloudBuilder::new()
            .build_point_cloud(Some(&aligned), &calib)
            .unwrap()
            .unwrap();

        assert_eq!(cloud.point_at(0, 0), Some(PointXyz::INVALID));
        assert_eq!(cloud.point_at(1, 0), Some(PointXyz::INVALID));
        let center = cloud.point_at(640, 360).unwrap();
        assert_eq!(center.z, 1000);
        // Half a pixel right of the principal point: x = 0.5 / 609.375 * 1000
        assert_eq!(center.x, 1);
        assert_eq!(center.y, 1);
        assert_eq!(cloud.valid_count(), 1);
    }

    #[test]
    fn test_wrong_format_fails() {
        let calib = context();
        let color = ImageBuffer::new(ImageFormat::ColorBgra32, 1280, 720).unwrap();
        let err = PointCloudBuilder::new()
            .build_point_cloud(Some(&color), &calib)
            .unwrap_err();
        assert!(matches!(err, PipelineError::ReprojectionFailed(_)));
    }

    #[test]
    fn test_mismatched_size_fails() {
        let calib = context();
        let aligned = ImageBuffer::from_depth_values(640, 576, &vec![1000; 640 * 576]).unwrap();
        let err = PointCloudBuilder::new()
            .build_point_cloud(Some(&aligned), &calib)
            .unwrap_err();
        assert!(matches!(err, PipelineError::ReprojectionFailed(_)));
    }

    #[test]
    fn test_image_packing_keeps_grid() {
        let calib = context();
        let aligned = ImageBuffer::from_depth_values(1280, 720, &vec![1500; 1280 * 720]).unwrap();
        let cloud = PointCloudBuilder::new()
            .build_point_cloud(Some(&aligned), &calib)
            .unwrap()
            .unwrap();

        let img = cloud.to_image().unwrap();
        assert_eq!(img.format(), ImageFormat::CustomXyz16);
        assert_eq!(img.stride(), 1280 * 6);
        assert_eq!(PointCloud::from_image(&img).unwrap(), cloud);
    }
}
