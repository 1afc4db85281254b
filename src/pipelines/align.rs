// SPDX-License-Identifier: GPL-3.0-only

//! Depth-to-color alignment
//!
//! Every valid depth pixel is treated as a small square surface patch at
//! its measured depth. The four corners of the patch are unprojected with
//! the depth camera model, moved into color camera space and projected onto
//! the color image. The patch then covers every color pixel whose center
//! falls inside the projected corners' bounding box. Where patches overlap
//! the nearest one wins, so foreground occludes background.
//!
//! Adjacent depth pixels share their corner coordinates, so a continuous
//! surface leaves no holes in the aligned image regardless of the
//! resolution ratio between the two cameras.

use nalgebra::Vector3;
use tracing::trace;

use crate::calibration::CalibrationContext;
use crate::constants::{INVALID_DEPTH_MM, geometry::MAX_SPLAT_EXTENT_PX};
use crate::errors::{PipelineError, PipelineResult};
use crate::media::ImageBuffer;

/// Color-image bounds of one projected depth pixel
#[derive(Debug, Clone, Copy)]
struct Footprint {
    min_u: f32,
    max_u: f32,
    min_v: f32,
    max_v: f32,
    /// Depth in the color camera frame (mm)
    z: f32,
}

/// Reprojects depth images into the color camera's pixel grid
#[derive(Debug, Clone, Copy)]
pub struct Aligner {
    /// Footprints wider or taller than this (pixels) are discarded
    max_splat_extent: f32,
}

impl Default for Aligner {
    fn default() -> Self {
        Self {
            max_splat_extent: MAX_SPLAT_EXTENT_PX,
        }
    }
}

impl Aligner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce a depth image in the color camera's `color_width x color_height`
    /// grid
    ///
    /// Returns `Ok(None)` if there is no depth this frame. Values are the
    /// depth of the surface in the color camera frame in millimeters;
    /// pixels no depth pixel maps onto hold the sentinel 0.
    ///
    /// # Errors
    /// `AlignmentFailed` if the input is malformed or does not match the
    /// calibrated depth mode and color resolution.
    pub fn align(
        &self,
        depth: Option<&ImageBuffer>,
        color_width: u32,
        color_height: u32,
        calib: &CalibrationContext,
    ) -> PipelineResult<Option<ImageBuffer>> {
        let Some(depth) = depth else {
            return Ok(None);
        };

        if color_width == 0 || color_height == 0 {
            return Err(PipelineError::AlignmentFailed(format!(
                "target color size is zero ({}x{})",
                color_width, color_height
            )));
        }
        let values = depth
            .depth_values()
            .map_err(|e| PipelineError::AlignmentFailed(e.to_string()))?;

        let (dw, dh) = (depth.width(), depth.height());
        if (dw, dh) != calib.depth_size() {
            let (ew, eh) = calib.depth_size();
            return Err(PipelineError::AlignmentFailed(format!(
                "depth image is {}x{} but calibration expects {}x{}",
                dw, dh, ew, eh
            )));
        }
        if (color_width, color_height) != calib.color_size() {
            let (ew, eh) = calib.color_size();
            return Err(PipelineError::AlignmentFailed(format!(
                "color image is {}x{} but calibration expects {}x{}",
                color_width, color_height, ew, eh
            )));
        }

        let mut aligned = vec![INVALID_DEPTH_MM; color_width as usize * color_height as usize];
        let mut splatted = 0usize;

        for v in 0..dh {
            for u in 0..dw {
                let d = values[(v * dw + u) as usize];
                if d == INVALID_DEPTH_MM {
                    continue;
                }
                let Some(footprint) = footprint(u, v, d as f32, calib) else {
                    continue;
                };
                if self.splat(&footprint, &mut aligned, color_width, color_height) {
                    splatted += 1;
                }
            }
        }

        trace!(
            splatted,
            depth_pixels = values.len(),
            "Aligned depth to color"
        );

        ImageBuffer::from_depth_values(color_width, color_height, &aligned)
            .map(Some)
            .map_err(|e| PipelineError::AlignmentFailed(e.to_string()))
    }

    /// Z-buffered fill of one footprint, returns true if any pixel was covered
    fn splat(&self, fp: &Footprint, out: &mut [u16], width: u32, height: u32) -> bool {
        if fp.max_u - fp.min_u > self.max_splat_extent || fp.max_v - fp.min_v > self.max_splat_extent
        {
            return false;
        }

        let z = fp.z.round();
        if !(z >= 1.0 && z <= u16::MAX as f32) {
            return false;
        }
        let z = z as u16;

        // Pixel j is covered when min <= j < max
        let x0 = (fp.min_u.ceil().max(0.0)) as i64;
        let x1 = (fp.max_u.ceil() as i64).min(width as i64);
        let y0 = (fp.min_v.ceil().max(0.0)) as i64;
        let y1 = (fp.max_v.ceil() as i64).min(height as i64);
        if x0 >= x1 || y0 >= y1 {
            return false;
        }

        for y in y0..y1 {
            let row = y as usize * width as usize;
            for x in x0..x1 {
                let cell = &mut out[row + x as usize];
                if *cell == INVALID_DEPTH_MM || z < *cell {
                    *cell = z;
                }
            }
        }
        true
    }
}

/// Project the corners of depth pixel `(u, v)` at depth `d` into the color image
fn footprint(u: u32, v: u32, d: f32, calib: &CalibrationContext) -> Option<Footprint> {
    let color = calib.color_camera();
    let mut fp = Footprint {
        min_u: f32::INFINITY,
        max_u: f32::NEG_INFINITY,
        min_v: f32::INFINITY,
        max_v: f32::NEG_INFINITY,
        z: 0.0,
    };

    for (cx, cy) in [(u, v), (u + 1, v), (u, v + 1), (u + 1, v + 1)] {
        let [x, y] = calib.depth_corner_ray(cx, cy)?;
        let point = calib.depth_point_to_color(&Vector3::new(x * d, y * d, d));
        let (pu, pv) = color.project(&point)?;
        fp.min_u = fp.min_u.min(pu);
        fp.max_u = fp.max_u.max(pu);
        fp.min_v = fp.min_v.min(pv);
        fp.max_v = fp.max_v.max(pv);
        fp.z += point.z;
    }
    fp.z /= 4.0;
    Some(fp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::{ColorResolution, DepthMode};
    use crate::calibration::{CameraIntrinsics, DeviceCalibration, Extrinsics};

    fn context(calibration: &DeviceCalibration) -> CalibrationContext {
        CalibrationContext::from_device(calibration, DepthMode::NfovUnbinned, ColorResolution::R720p)
            .unwrap()
    }

    #[test]
    fn test_absent_depth_is_no_output() {
        let calib = context(&DeviceCalibration::default());
        let result = Aligner::new().align(None, 1280, 720, &calib).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_zero_sized_color_fails() {
        let calib = context(&DeviceCalibration::default());
        let depth = ImageBuffer::from_depth_values(640, 576, &vec![1000; 640 * 576]).unwrap();
        let err = Aligner::new().align(Some(&depth), 0, 720, &calib).unwrap_err();
        assert!(matches!(err, PipelineError::AlignmentFailed(_)));
    }

    #[test]
    fn test_mismatched_depth_size_fails() {
        let calib = context(&DeviceCalibration::default());
        let depth = ImageBuffer::from_depth_values(320, 288, &vec![1000; 320 * 288]).unwrap();
        let err = Aligner::new()
            .align(Some(&depth), 1280, 720, &calib)
            .unwrap_err();
        assert!(matches!(err, PipelineError::AlignmentFailed(_)));
    }

    #[test]
    fn test_all_invalid_depth_stays_invalid() {
        let calib = context(&DeviceCalibration::default());
        let depth = ImageBuffer::from_depth_values(640, 576, &vec![0; 640 * 576]).unwrap();
        let aligned = Aligner::new()
            .align(Some(&depth), 1280, 720, &calib)
            .unwrap()
            .unwrap();
        assert!(aligned.depth_values().unwrap().iter().all(|&d| d == 0));
    }

    #[test]
    fn test_nearest_surface_wins() {
        // Matching intrinsics with a 32 mm baseline: parallax moves the near
        // pixel 16 px and the far pixel 8 px, so both land on color pixel 632
        let calibration = DeviceCalibration {
            depth: CameraIntrinsics::pinhole(640, 576, 504.0, 504.0, 319.5, 287.5),
            color: CameraIntrinsics::pinhole(1280, 720, 504.0, 504.0, 639.5, 359.5),
            depth_to_color: Extrinsics::from_translation(-32.0, 0.0, 0.0),
        };
        let calib = CalibrationContext::from_device(
            &calibration,
            DepthMode::NfovUnbinned,
            ColorResolution::R720p,
        )
        .unwrap();

        let mut values = vec![0u16; 640 * 576];
        values[288 * 640 + 320] = 2000;
        values[288 * 640 + 328] = 1000;
        let depth = ImageBuffer::from_depth_values(640, 576, &values).unwrap();

        let aligned = Aligner::new()
            .align(Some(&depth), 1280, 720, &calib)
            .unwrap()
            .unwrap();

        assert_eq!(aligned.depth_at(632, 360), Some(1000));
        let values = aligned.depth_values().unwrap();
        assert_eq!(values.iter().filter(|&&d| d != 0).count(), 1);
    }

    #[test]
    fn test_oversized_footprint_skipped() {
        let calib = context(&DeviceCalibration::default());
        let aligner = Aligner {
            max_splat_extent: 0.5,
        };
        let depth = ImageBuffer::from_depth_values(640, 576, &vec![1000; 640 * 576]).unwrap();
        let aligned = aligner.align(Some(&depth), 1280, 720, &calib).unwrap().unwrap();
        // Every footprint is about 1.2 px wide at this scale
        assert!(aligned.depth_values().unwrap().iter().all(|&d| d == 0));
    }
}
