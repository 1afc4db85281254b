// SPDX-License-Identifier: GPL-3.0-only
// Shared types for depth camera backend abstraction

//! Shared types for depth camera backends

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::media::ImageFormat;

/// Depth sensor operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DepthMode {
    /// Depth sensor disabled
    Off,
    /// Narrow field of view, 2x2 binned (320x288)
    Nfov2x2Binned,
    /// Narrow field of view, full resolution (640x576)
    #[default]
    NfovUnbinned,
    /// Wide field of view, 2x2 binned (512x512)
    Wfov2x2Binned,
    /// Wide field of view, full resolution (1024x1024)
    WfovUnbinned,
    /// Passive infrared only, no depth (1024x1024)
    PassiveIr,
}

impl DepthMode {
    /// Output resolution of the depth image, None when the sensor is off
    pub fn resolution(&self) -> Option<(u32, u32)> {
        match self {
            DepthMode::Off => None,
            DepthMode::Nfov2x2Binned => Some((320, 288)),
            DepthMode::NfovUnbinned => Some((640, 576)),
            DepthMode::Wfov2x2Binned => Some((512, 512)),
            DepthMode::WfovUnbinned | DepthMode::PassiveIr => Some((1024, 1024)),
        }
    }

    /// Valid measurement range in millimeters, None when no depth is produced
    pub fn operating_range_mm(&self) -> Option<(u16, u16)> {
        match self {
            DepthMode::Nfov2x2Binned => Some((500, 5460)),
            DepthMode::NfovUnbinned => Some((500, 3860)),
            DepthMode::Wfov2x2Binned => Some((250, 2880)),
            DepthMode::WfovUnbinned => Some((250, 2210)),
            DepthMode::Off | DepthMode::PassiveIr => None,
        }
    }

    /// True if the mode produces depth images usable for alignment
    pub fn produces_depth(&self) -> bool {
        self.operating_range_mm().is_some()
    }
}

impl std::fmt::Display for DepthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DepthMode::Off => write!(f, "off"),
            DepthMode::Nfov2x2Binned => write!(f, "NFOV 2x2 binned"),
            DepthMode::NfovUnbinned => write!(f, "NFOV unbinned"),
            DepthMode::Wfov2x2Binned => write!(f, "WFOV 2x2 binned"),
            DepthMode::WfovUnbinned => write!(f, "WFOV unbinned"),
            DepthMode::PassiveIr => write!(f, "passive IR"),
        }
    }
}

/// Color camera resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ColorResolution {
    #[serde(rename = "off")]
    Off,
    #[default]
    #[serde(rename = "720p")]
    R720p,
    #[serde(rename = "1080p")]
    R1080p,
    #[serde(rename = "1440p")]
    R1440p,
    #[serde(rename = "1536p")]
    R1536p,
    #[serde(rename = "2160p")]
    R2160p,
    #[serde(rename = "3072p")]
    R3072p,
}

impl ColorResolution {
    /// Output resolution of the color image, None when the camera is off
    pub fn resolution(&self) -> Option<(u32, u32)> {
        match self {
            ColorResolution::Off => None,
            ColorResolution::R720p => Some((1280, 720)),
            ColorResolution::R1080p => Some((1920, 1080)),
            ColorResolution::R1440p => Some((2560, 1440)),
            ColorResolution::R1536p => Some((2048, 1536)),
            ColorResolution::R2160p => Some((3840, 2160)),
            ColorResolution::R3072p => Some((4096, 3072)),
        }
    }
}

impl std::fmt::Display for ColorResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.resolution() {
            Some((w, h)) => write!(f, "{}x{}", w, h),
            None => write!(f, "off"),
        }
    }
}

/// Color image pixel format requested from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorFormat {
    /// 32-bit BGRA, the only format the pipeline consumes
    #[default]
    Bgra32,
    /// Motion JPEG
    Mjpg,
    /// Semi-planar 4:2:0
    Nv12,
    /// Packed 4:2:2
    Yuy2,
}

/// Camera frame rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CameraFps {
    #[serde(rename = "5")]
    Fps5,
    #[serde(rename = "15")]
    Fps15,
    #[default]
    #[serde(rename = "30")]
    Fps30,
}

impl CameraFps {
    /// Frames per second as an integer
    pub fn as_int(&self) -> u32 {
        match self {
            CameraFps::Fps5 => 5,
            CameraFps::Fps15 => 15,
            CameraFps::Fps30 => 30,
        }
    }

    /// Nominal time between two captures
    pub fn frame_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.as_int() as u64)
    }
}

/// Role of the device in a wired multi-device sync chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WiredSyncMode {
    /// Free running, no sync cable
    #[default]
    Standalone,
    /// Drives the sync-out signal
    Master,
    /// Follows the sync-in signal
    Subordinate,
}

/// Device configuration bundle applied when cameras are started
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfiguration {
    pub color_format: ColorFormat,
    pub color_resolution: ColorResolution,
    pub depth_mode: DepthMode,
    pub camera_fps: CameraFps,
    /// Only deliver captures that contain both a color and a depth image
    pub synchronized_images_only: bool,
    pub wired_sync_mode: WiredSyncMode,
}

impl Default for DeviceConfiguration {
    fn default() -> Self {
        Self {
            color_format: ColorFormat::Bgra32,
            color_resolution: ColorResolution::R720p,
            depth_mode: DepthMode::NfovUnbinned,
            camera_fps: CameraFps::Fps30,
            synchronized_images_only: true,
            wired_sync_mode: WiredSyncMode::Standalone,
        }
    }
}

impl DeviceConfiguration {
    /// Check the combination against what the hardware and the pipeline accept
    pub fn validate(&self) -> Result<(), String> {
        if self.color_resolution == ColorResolution::Off && self.depth_mode == DepthMode::Off {
            return Err("both color and depth cameras are disabled".to_string());
        }
        if self.synchronized_images_only
            && (self.color_resolution == ColorResolution::Off
                || self.depth_mode == DepthMode::Off)
        {
            return Err(
                "synchronized_images_only requires both color and depth cameras".to_string(),
            );
        }
        if self.camera_fps == CameraFps::Fps30
            && (self.depth_mode == DepthMode::WfovUnbinned
                || self.color_resolution == ColorResolution::R3072p)
        {
            return Err(format!(
                "30 fps is not supported with depth mode {} / color {}",
                self.depth_mode, self.color_resolution
            ));
        }
        if self.color_resolution != ColorResolution::Off && self.color_format != ColorFormat::Bgra32
        {
            return Err(format!(
                "color format {:?} is not supported, the pipeline requires BGRA32",
                self.color_format
            ));
        }
        if self.depth_mode == DepthMode::PassiveIr {
            return Err("passive IR mode produces no depth to align".to_string());
        }
        Ok(())
    }
}

/// Device information reported by enumeration
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    /// Enumeration index
    pub index: u32,
    /// Human readable model name
    pub name: String,
    /// Serial number
    pub serial: String,
}

/// Image owned by the backend, shared until the capture is released
///
/// Consumers never read this directly; `Capture` copies it out into an
/// `ImageBuffer` so no view outlives the capture.
#[derive(Clone)]
pub struct RawImage {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    /// Bytes per row
    pub stride: u32,
    pub data: Arc<[u8]>,
}

impl std::fmt::Debug for RawImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RawImage({:?} {}x{}, {} bytes)",
            self.format,
            self.width,
            self.height,
            self.data.len()
        )
    }
}

/// Hook invoked exactly once when the backend capture handle is released
pub type ReleaseHook = Box<dyn FnOnce() + Send>;

/// One synchronized bundle as delivered by a backend
pub struct RawCapture {
    pub color: Option<RawImage>,
    pub depth: Option<RawImage>,
    /// Device timestamp of the depth (or color) exposure
    pub device_timestamp: Duration,
    release: Option<ReleaseHook>,
}

impl RawCapture {
    /// Create a capture without a release hook
    pub fn new(color: Option<RawImage>, depth: Option<RawImage>, device_timestamp: Duration) -> Self {
        Self {
            color,
            depth,
            device_timestamp,
            release: None,
        }
    }

    /// Attach a hook that runs when the capture is dropped
    pub fn with_release_hook(mut self, hook: ReleaseHook) -> Self {
        self.release = Some(hook);
        self
    }
}

impl Drop for RawCapture {
    fn drop(&mut self) {
        if let Some(hook) = self.release.take() {
            hook();
        }
    }
}

impl std::fmt::Debug for RawCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawCapture")
            .field("color", &self.color)
            .field("depth", &self.depth)
            .field("device_timestamp", &self.device_timestamp)
            .finish()
    }
}

/// Outcome of a blocking capture wait
#[derive(Debug)]
pub enum WaitResult {
    /// A capture is ready
    Ready(RawCapture),
    /// Nothing arrived within the timeout
    Timeout,
    /// The device reported a hardware fault
    Failed(String),
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// Device not found at the requested index
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    /// Device exists but is in use or refused to open
    #[error("Device busy: {0}")]
    Busy(String),
    /// Configuration rejected by the device
    #[error("Configuration not supported: {0}")]
    ConfigurationNotSupported(String),
    /// Calibration could not be read
    #[error("Calibration unavailable: {0}")]
    CalibrationUnavailable(String),
    /// Operation requires started cameras
    #[error("Cameras not started")]
    NotStarted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration_is_valid() {
        let config = DeviceConfiguration::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.color_resolution.resolution(), Some((1280, 720)));
        assert_eq!(config.depth_mode.resolution(), Some((640, 576)));
    }

    #[test]
    fn test_synchronized_requires_both_cameras() {
        let config = DeviceConfiguration {
            color_resolution: ColorResolution::Off,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_wfov_unbinned_rejects_30fps() {
        let config = DeviceConfiguration {
            depth_mode: DepthMode::WfovUnbinned,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DeviceConfiguration {
            depth_mode: DepthMode::WfovUnbinned,
            camera_fps: CameraFps::Fps15,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_non_bgra_color_rejected() {
        let config = DeviceConfiguration {
            color_format: ColorFormat::Mjpg,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_release_hook_runs_once_on_drop() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let count = Arc::new(AtomicU32::new(0));
        let count_clone = Arc::clone(&count);
        let capture = RawCapture::new(None, None, Duration::ZERO).with_release_hook(Box::new(
            move || {
                count_clone.fetch_add(1, Ordering::SeqCst);
            },
        ));
        drop(capture);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fps_interval() {
        assert_eq!(CameraFps::Fps30.frame_interval(), Duration::from_micros(33_333));
        assert_eq!(CameraFps::Fps5.frame_interval(), Duration::from_millis(200));
    }
}
