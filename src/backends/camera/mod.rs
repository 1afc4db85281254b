// SPDX-License-Identifier: GPL-3.0-only
// Depth camera backend with trait-based abstraction

//! Depth camera backend abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  DeviceSession      │  ← Capture / align / present loop
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │    FrameSource      │  ← Open, start, wait, release, close
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ DeviceBackend Trait │  ← Enumeration + SensorDevice handles
//! └──────────┬──────────┘
//!            │
//!            ▼
//!      ┌───────────┐
//!      │ Synthetic │  ← Deterministic sensor for tests and demos
//!      └───────────┘
//! ```
//!
//! Hardware drivers plug in by implementing [`DeviceBackend`] and
//! [`SensorDevice`]; nothing above this module knows which one is in use.

pub mod frame_loop;
pub mod source;
pub mod synthetic;
pub mod types;

pub use frame_loop::{CaptureLoopController, LoopAction, LoopExit};
pub use source::{Capture, FrameSource};
pub use synthetic::{SyntheticBackend, SyntheticConfig, SyntheticProbe};
pub use types::*;

use std::time::Duration;

use crate::calibration::DeviceCalibration;

/// Device enumeration and opening
///
/// All depth camera backends must implement this trait to provide:
/// - Device enumeration
/// - Exclusive handles to individual devices
pub trait DeviceBackend: Send + Sync {
    // ===== Enumeration =====

    /// Backend name for logging
    fn name(&self) -> &str;

    /// Number of devices currently connected
    fn device_count(&self) -> u32;

    /// Describe the device at `index` without opening it
    fn describe(&self, index: u32) -> BackendResult<DeviceInfo>;

    // ===== Lifecycle =====

    /// Open the device at `index` for exclusive use
    ///
    /// # Returns
    /// * `Ok(device)` - Handle ready for `start_cameras`
    /// * `Err(BackendError::DeviceNotFound)` - No device at that index
    /// * `Err(BackendError::Busy)` - Device exists but refused to open
    fn open(&self, index: u32) -> BackendResult<Box<dyn SensorDevice>>;

    /// Enumerate every connected device
    fn enumerate(&self) -> Vec<DeviceInfo> {
        (0..self.device_count())
            .filter_map(|index| self.describe(index).ok())
            .collect()
    }
}

/// An opened device
///
/// The handle is owned by exactly one capture loop. Implementations must
/// tolerate `stop_cameras` without a prior successful `start_cameras`.
pub trait SensorDevice: Send {
    /// Serial number of the opened device
    fn serial_number(&self) -> String;

    /// Factory calibration for the given mode combination
    fn calibration(
        &self,
        depth_mode: DepthMode,
        color_resolution: ColorResolution,
    ) -> BackendResult<DeviceCalibration>;

    // ===== Streaming =====

    /// Start the color and depth cameras with `config`
    fn start_cameras(&mut self, config: &DeviceConfiguration) -> BackendResult<()>;

    /// Block until a capture arrives, the timeout elapses or the device fails
    ///
    /// `None` waits forever.
    fn wait_for_capture(&mut self, timeout: Option<Duration>) -> WaitResult;

    /// Stop the cameras, a no-op if they are not running
    fn stop_cameras(&mut self);

    /// Release the device handle
    fn close(&mut self);
}
