// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Depth value reserved for "no measurement" (millimeters)
pub const INVALID_DEPTH_MM: u16 = 0;

/// Default capture wait before a timeout is reported
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default number of consecutive timeouts tolerated by the retry policy
pub const DEFAULT_TIMEOUT_RETRIES: u32 = 3;

/// Delay between presenter input polls (matches a 30ms key wait)
pub const DEFAULT_WAIT_KEY_DELAY: Duration = Duration::from_millis(30);

/// Depth mapping for display
pub mod display {
    /// Depth rendered black (far end) in the grayscale view
    pub const DEPTH_MAX_MM: u16 = 5000;

    /// Number of quantization bands used by the turbo colormap
    pub const COLORMAP_BANDS: u32 = 32;
}

/// Geometry limits for reprojection
pub mod geometry {
    /// Fixed iteration count for undistortion (keeps unprojection deterministic)
    pub const UNDISTORT_ITERATIONS: usize = 20;

    /// Largest normalized reprojection residual accepted after undistortion
    pub const UNDISTORT_TOLERANCE: f32 = 1e-4;

    /// Depth pixels whose color-space footprint is wider than this are skipped
    pub const MAX_SPLAT_EXTENT_PX: f32 = 64.0;

    /// Largest coordinate representable in the XYZ16 point cloud (millimeters)
    pub const MAX_POINT_COORD_MM: f32 = i16::MAX as f32;
}

/// Point cloud view defaults
pub mod viewer {
    /// Length of each origin axis in millimeters
    pub const ORIGIN_AXIS_MM: f32 = 100.0;

    /// Default distance from the orbit camera to the cloud center (millimeters)
    pub const VIEW_DISTANCE_MM: f32 = 1500.0;

    /// Vertical field of view of the orbit camera (degrees)
    pub const VIEW_FOV_DEG: f32 = 60.0;

    /// Yaw/pitch increment per arrow key press (degrees)
    pub const ROTATION_STEP_DEG: f32 = 5.0;
}
