// SPDX-License-Identifier: GPL-3.0-only

//! Frame source: one opened, streaming device
//!
//! [`FrameSource::open`] performs the whole startup sequence (enumerate,
//! open, read calibration, validate configuration, start cameras) and maps
//! backend failures onto the pipeline's startup errors. Captures are handed
//! out one at a time; images are copied out of a [`Capture`] before it is
//! released so no buffer ever aliases backend memory.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use super::{DeviceBackend, DeviceConfiguration, RawCapture, SensorDevice, WaitResult};
use crate::calibration::CalibrationContext;
use crate::errors::{ImageError, PipelineError, PipelineResult};
use crate::media::{ImageBuffer, ImageFormat};

/// An opened device with running cameras
pub struct FrameSource {
    index: u32,
    serial: String,
    calibration: Arc<CalibrationContext>,
    /// `None` once closed
    device: Option<Box<dyn SensorDevice>>,
    captures: u64,
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSource")
            .field("index", &self.index)
            .field("serial", &self.serial)
            .field("open", &self.device.is_some())
            .field("captures", &self.captures)
            .finish()
    }
}

impl FrameSource {
    /// Open device `index`, derive its calibration and start streaming
    ///
    /// # Errors
    /// * `DeviceUnavailable` - The backend reports no devices
    /// * `DeviceOpenFailed` - Bad index, or the device refused to open
    /// * `InvalidCalibration` - Calibration missing or unusable for the mode
    /// * `StreamStartFailed` - Configuration rejected or cameras failed to start
    ///
    /// On error every resource acquired so far is released again.
    pub fn open(
        backend: &dyn DeviceBackend,
        index: u32,
        config: &DeviceConfiguration,
    ) -> PipelineResult<Self> {
        let count = backend.device_count();
        if count == 0 {
            warn!(backend = backend.name(), "No devices found");
            return Err(PipelineError::DeviceUnavailable);
        }
        if index >= count {
            return Err(PipelineError::DeviceOpenFailed {
                index,
                reason: format!("only {} device(s) connected", count),
            });
        }

        info!(device = index, backend = backend.name(), "Opening device");
        let mut device = backend
            .open(index)
            .map_err(|e| PipelineError::DeviceOpenFailed {
                index,
                reason: e.to_string(),
            })?;
        let serial = device.serial_number();

        // From here on the device must be closed on every error path
        let calibration = match Self::derive_calibration(device.as_ref(), config) {
            Ok(calibration) => calibration,
            Err(e) => {
                device.close();
                return Err(e);
            }
        };

        if let Err(reason) = config.validate() {
            device.close();
            return Err(PipelineError::StreamStartFailed(reason));
        }

        if let Err(e) = device.start_cameras(config) {
            warn!(device = index, error = %e, "Failed to start cameras");
            device.stop_cameras();
            device.close();
            return Err(PipelineError::StreamStartFailed(e.to_string()));
        }

        info!(
            device = index,
            serial = %serial,
            depth_mode = %config.depth_mode,
            color_resolution = %config.color_resolution,
            fps = config.camera_fps.as_int(),
            "Cameras started"
        );

        Ok(Self {
            index,
            serial,
            calibration: Arc::new(calibration),
            device: Some(device),
            captures: 0,
        })
    }

    fn derive_calibration(
        device: &dyn SensorDevice,
        config: &DeviceConfiguration,
    ) -> PipelineResult<CalibrationContext> {
        let reported = device
            .calibration(config.depth_mode, config.color_resolution)
            .map_err(|e| PipelineError::InvalidCalibration(e.to_string()))?;
        CalibrationContext::from_device(&reported, config.depth_mode, config.color_resolution)
    }

    /// Block for the next capture
    ///
    /// `None` waits indefinitely. A timeout is reported as `CaptureTimeout`;
    /// what to do about it is the caller's policy. Hardware faults and calls
    /// after `close` are reported as `CaptureFailed`.
    pub fn next_capture(&mut self, timeout: Option<Duration>) -> PipelineResult<Capture> {
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| PipelineError::CaptureFailed("device is closed".to_string()))?;

        match device.wait_for_capture(timeout) {
            WaitResult::Ready(raw) => {
                self.captures += 1;
                trace!(
                    device = self.index,
                    capture = self.captures,
                    color = raw.color.is_some(),
                    depth = raw.depth.is_some(),
                    "Capture ready"
                );
                Ok(Capture {
                    raw,
                    sequence: self.captures,
                })
            }
            WaitResult::Timeout => Err(PipelineError::CaptureTimeout {
                timeout: timeout.unwrap_or(Duration::ZERO),
            }),
            WaitResult::Failed(reason) => Err(PipelineError::CaptureFailed(reason)),
        }
    }

    /// Stop streaming and release the device handle
    ///
    /// Safe after a failed step. A second call only logs a warning.
    pub fn close(&mut self) {
        match self.device.take() {
            Some(mut device) => {
                device.stop_cameras();
                device.close();
                info!(
                    device = self.index,
                    captures = self.captures,
                    "Device closed"
                );
            }
            None => warn!(device = self.index, "Device already closed"),
        }
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Device index this source was opened with
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn serial_number(&self) -> &str {
        &self.serial
    }

    /// Shared, immutable calibration for this session
    pub fn calibration(&self) -> &Arc<CalibrationContext> {
        &self.calibration
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        if self.device.is_some() {
            debug!(device = self.index, "FrameSource dropped while open, closing");
            self.close();
        }
    }
}

/// One synchronized capture, owned by the pipeline for one iteration
///
/// Dropping or [`release`](Capture::release)-ing the capture returns the
/// underlying handle to the backend.
#[derive(Debug)]
pub struct Capture {
    raw: RawCapture,
    sequence: u64,
}

impl Capture {
    /// 1-based position of this capture in the session
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Device clock at exposure, relative to stream start
    pub fn device_timestamp(&self) -> Duration {
        self.raw.device_timestamp
    }

    /// Copy the color image out, `Ok(None)` if the capture has none
    pub fn extract_color(&self) -> Result<Option<ImageBuffer>, ImageError> {
        self.extract(self.raw.color.as_ref(), ImageFormat::ColorBgra32)
    }

    /// Copy the depth image out, `Ok(None)` if the capture has none
    pub fn extract_depth(&self) -> Result<Option<ImageBuffer>, ImageError> {
        self.extract(self.raw.depth.as_ref(), ImageFormat::Depth16)
    }

    fn extract(
        &self,
        raw: Option<&super::RawImage>,
        expected: ImageFormat,
    ) -> Result<Option<ImageBuffer>, ImageError> {
        let Some(raw) = raw else {
            return Ok(None);
        };
        if raw.format != expected {
            return Err(ImageError::WrongFormat {
                expected: expected.name(),
                actual: raw.format.name(),
            });
        }
        ImageBuffer::copy_from(raw).map(Some)
    }

    /// Release the capture's backend resources
    pub fn release(self) {
        trace!(capture = self.sequence, "Releasing capture");
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::{SyntheticBackend, SyntheticConfig};

    fn backend() -> SyntheticBackend {
        SyntheticBackend::new(SyntheticConfig {
            realtime: false,
            ..Default::default()
        })
    }

    #[test]
    fn test_capture_copies_images_out() {
        let backend = backend();
        let probe = backend.probe();
        let mut source = FrameSource::open(&backend, 0, &DeviceConfiguration::default()).unwrap();
        assert_eq!(source.serial_number(), "SYN000000");
        assert_eq!(source.calibration().color_size(), (1280, 720));

        let capture = source.next_capture(Some(Duration::from_millis(100))).unwrap();
        assert_eq!(capture.sequence(), 1);
        let color = capture.extract_color().unwrap().unwrap();
        let depth = capture.extract_depth().unwrap().unwrap();
        capture.release();

        // The copies outlive the released capture
        assert_eq!(probe.captures_released(), 1);
        assert_eq!(color.format(), ImageFormat::ColorBgra32);
        assert_eq!(depth.depth_at(0, 0), Some(1000));
    }

    #[test]
    fn test_close_is_idempotent() {
        let backend = backend();
        let probe = backend.probe();
        let mut source = FrameSource::open(&backend, 0, &DeviceConfiguration::default()).unwrap();

        source.close();
        source.close();
        drop(source);
        assert_eq!(probe.closed(), 1);
        assert_eq!(probe.stopped(), 1);
    }

    #[test]
    fn test_capture_after_close_fails() {
        let backend = backend();
        let mut source = FrameSource::open(&backend, 0, &DeviceConfiguration::default()).unwrap();
        source.close();
        assert!(matches!(
            source.next_capture(None),
            Err(PipelineError::CaptureFailed(_))
        ));
    }
}
