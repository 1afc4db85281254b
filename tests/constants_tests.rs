// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use std::time::Duration;

use depthview::constants::{
    DEFAULT_CAPTURE_TIMEOUT, DEFAULT_WAIT_KEY_DELAY, INVALID_DEPTH_MM, display, geometry, viewer,
};

#[test]
fn test_invalid_depth_is_zero() {
    // Zero is the "no measurement" marker in every depth buffer
    assert_eq!(INVALID_DEPTH_MM, 0);
}

#[test]
fn test_reference_timings() {
    assert_eq!(DEFAULT_CAPTURE_TIMEOUT, Duration::from_millis(1000));
    assert_eq!(DEFAULT_WAIT_KEY_DELAY, Duration::from_millis(30));
    assert!(DEFAULT_WAIT_KEY_DELAY < DEFAULT_CAPTURE_TIMEOUT);
}

#[test]
fn test_display_range() {
    assert_eq!(display::DEPTH_MAX_MM, 5000);
    assert!(display::COLORMAP_BANDS > 1);
}

#[test]
fn test_geometry_limits() {
    assert!(geometry::UNDISTORT_ITERATIONS > 0);
    assert!(geometry::MAX_SPLAT_EXTENT_PX >= 1.0);
    assert_eq!(geometry::MAX_POINT_COORD_MM, i16::MAX as f32);
}

#[test]
fn test_origin_axes_length() {
    assert_eq!(viewer::ORIGIN_AXIS_MM, 100.0);
    assert!(viewer::VIEW_DISTANCE_MM > 0.0);
}
