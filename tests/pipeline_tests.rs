// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for depth alignment and point cloud construction

use depthview::backends::camera::{ColorResolution, DepthMode};
use depthview::calibration::{CalibrationContext, DeviceCalibration};
use depthview::errors::PipelineError;
use depthview::media::{ImageBuffer, ImageFormat};
use depthview::pipelines::{Aligner, PointCloudBuilder};

const COLOR_W: u32 = 1280;
const COLOR_H: u32 = 720;
const DEPTH_W: u32 = 640;
const DEPTH_H: u32 = 576;

fn reference_calibration() -> CalibrationContext {
    CalibrationContext::from_device(
        &DeviceCalibration::default(),
        DepthMode::NfovUnbinned,
        ColorResolution::R720p,
    )
    .expect("default calibration is valid")
}

fn uniform_depth(depth_mm: u16) -> ImageBuffer {
    let values = vec![depth_mm; (DEPTH_W * DEPTH_H) as usize];
    ImageBuffer::from_depth_values(DEPTH_W, DEPTH_H, &values).unwrap()
}

#[test]
fn test_uniform_plane_aligns_into_color_frame() {
    // A wall at 1m seen by the depth camera covers the middle of the color frame
    let calib = reference_calibration();
    let aligned = Aligner::new()
        .align(Some(&uniform_depth(1000)), COLOR_W, COLOR_H, &calib)
        .unwrap()
        .unwrap();

    assert_eq!(aligned.format(), ImageFormat::Depth16);
    assert_eq!((aligned.width(), aligned.height()), (COLOR_W, COLOR_H));

    // Inside the projected footprint every pixel holds the plane depth
    for (x, y) in [(640, 360), (300, 100), (1000, 700), (240, 20)] {
        assert_eq!(aligned.depth_at(x, y), Some(1000), "pixel ({x}, {y})");
    }
    // Outside it the sentinel remains
    for (x, y) in [(0, 0), (1279, 719), (100, 360), (640, 5), (1100, 360)] {
        assert_eq!(aligned.depth_at(x, y), Some(0), "pixel ({x}, {y})");
    }

    let values = aligned.depth_values().unwrap();
    assert!(values.iter().all(|&d| d == 0 || d == 1000));
}

#[test]
fn test_point_cloud_matches_aligned_dimensions() {
    let calib = reference_calibration();
    let aligned = Aligner::new()
        .align(Some(&uniform_depth(1000)), COLOR_W, COLOR_H, &calib)
        .unwrap()
        .unwrap();
    let cloud = PointCloudBuilder::new()
        .build_point_cloud(Some(&aligned), &calib)
        .unwrap()
        .unwrap();

    assert_eq!((cloud.width(), cloud.height()), (aligned.width(), aligned.height()));
    assert_eq!(cloud.points().len(), (COLOR_W * COLOR_H) as usize);

    let nonzero = aligned
        .depth_values()
        .unwrap()
        .iter()
        .filter(|&&d| d != 0)
        .count();
    assert_eq!(cloud.valid_count(), nonzero);

    // Near the principal point the ray runs straight ahead
    let center = cloud.point_at(640, 360).unwrap();
    assert_eq!(center.z, 1000);
    assert!(center.x.abs() <= 1 && center.y.abs() <= 1);

    // Image x grows to the right, camera x too
    let left = cloud.point_at(300, 360).unwrap();
    let right = cloud.point_at(1000, 360).unwrap();
    assert!(left.x < 0 && right.x > 0);

    let image = cloud.to_image().unwrap();
    assert_eq!(image.format(), ImageFormat::CustomXyz16);
    assert_eq!((image.width(), image.height()), (COLOR_W, COLOR_H));
}

#[test]
fn test_invalid_depth_produces_no_points() {
    let calib = reference_calibration();
    let aligned = Aligner::new()
        .align(Some(&uniform_depth(0)), COLOR_W, COLOR_H, &calib)
        .unwrap()
        .unwrap();
    assert!(aligned.depth_values().unwrap().iter().all(|&d| d == 0));

    let cloud = PointCloudBuilder::new()
        .build_point_cloud(Some(&aligned), &calib)
        .unwrap()
        .unwrap();
    assert_eq!(cloud.valid_count(), 0);
    assert!(cloud.points().iter().all(|p| !p.is_valid()));
}

#[test]
fn test_alignment_is_deterministic() {
    let calib = reference_calibration();
    let mut values = vec![0u16; (DEPTH_W * DEPTH_H) as usize];
    for (i, v) in values.iter_mut().enumerate() {
        // Sparse, varied scene with holes
        if i % 7 != 0 {
            *v = 600 + (i % 1900) as u16;
        }
    }
    let depth = ImageBuffer::from_depth_values(DEPTH_W, DEPTH_H, &values).unwrap();

    let aligner = Aligner::new();
    let first = aligner
        .align(Some(&depth), COLOR_W, COLOR_H, &calib)
        .unwrap()
        .unwrap();
    let second = aligner
        .align(Some(&depth), COLOR_W, COLOR_H, &calib)
        .unwrap()
        .unwrap();
    assert_eq!(first.as_bytes(), second.as_bytes());

    let builder = PointCloudBuilder::new();
    let a = builder.build_point_cloud(Some(&first), &calib).unwrap().unwrap();
    let b = builder.build_point_cloud(Some(&second), &calib).unwrap().unwrap();
    assert_eq!(a.points(), b.points());
}

#[test]
fn test_absent_inputs_yield_absent_outputs() {
    let calib = reference_calibration();
    assert!(
        Aligner::new()
            .align(None, COLOR_W, COLOR_H, &calib)
            .unwrap()
            .is_none()
    );
    assert!(
        PointCloudBuilder::new()
            .build_point_cloud(None, &calib)
            .unwrap()
            .is_none()
    );
}

#[test]
fn test_wrong_buffers_are_rejected() {
    let calib = reference_calibration();

    let color = ImageBuffer::new(ImageFormat::ColorBgra32, DEPTH_W, DEPTH_H).unwrap();
    let err = Aligner::new()
        .align(Some(&color), COLOR_W, COLOR_H, &calib)
        .unwrap_err();
    assert!(matches!(err, PipelineError::AlignmentFailed(_)));
    assert!(err.is_per_frame());

    let small = ImageBuffer::from_depth_values(4, 4, &[1000; 16]).unwrap();
    let err = PointCloudBuilder::new()
        .build_point_cloud(Some(&small), &calib)
        .unwrap_err();
    assert!(matches!(err, PipelineError::ReprojectionFailed(_)));
}

#[test]
fn test_wide_field_mode_aligns() {
    let calib = CalibrationContext::from_device(
        &DeviceCalibration::default(),
        DepthMode::WfovUnbinned,
        ColorResolution::R720p,
    )
    .unwrap();
    assert_eq!(calib.depth_size(), (1024, 1024));

    let depth = ImageBuffer::from_depth_values(1024, 1024, &vec![1500; 1024 * 1024]).unwrap();
    let aligned = Aligner::new()
        .align(Some(&depth), COLOR_W, COLOR_H, &calib)
        .unwrap()
        .unwrap();
    assert_eq!(aligned.depth_at(640, 360), Some(1500));
}
