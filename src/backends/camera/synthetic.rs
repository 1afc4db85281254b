// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic depth camera backend
//!
//! Produces deterministic captures without hardware: a BGRA gradient for
//! color and a configurable scene for depth, at the resolutions of the
//! started configuration. Faults (timeouts, hardware failure, missing
//! modalities, open/start failures) can be injected, and a shared
//! [`SyntheticProbe`] counts every lifecycle call so callers can check how
//! the device was driven.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    BackendError, BackendResult, ColorResolution, DepthMode, DeviceBackend, DeviceConfiguration,
    DeviceInfo, RawCapture, RawImage, SensorDevice, WaitResult,
};
use crate::calibration::DeviceCalibration;
use crate::constants::INVALID_DEPTH_MM;
use crate::media::ImageFormat;

/// Depth content generated by the synthetic sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyntheticScene {
    /// Flat wall facing the camera
    Plane { depth_mm: u16 },
    /// Vertical bands stepping from `near_mm` (left) to `far_mm` (right)
    Steps { near_mm: u16, far_mm: u16, steps: u32 },
    /// No measurement anywhere
    Empty,
}

impl Default for SyntheticScene {
    fn default() -> Self {
        SyntheticScene::Plane { depth_mm: 1000 }
    }
}

impl SyntheticScene {
    fn depth_at(&self, x: u32, width: u32) -> u16 {
        match *self {
            SyntheticScene::Plane { depth_mm } => depth_mm,
            SyntheticScene::Steps {
                near_mm,
                far_mm,
                steps,
            } => {
                let steps = steps.max(1);
                let band = (x as u64 * steps as u64 / width.max(1) as u64) as u32;
                if steps == 1 {
                    return near_mm;
                }
                let span = far_mm as i64 - near_mm as i64;
                (near_mm as i64 + span * band as i64 / (steps - 1) as i64) as u16
            }
            SyntheticScene::Empty => INVALID_DEPTH_MM,
        }
    }
}

/// Injected faults, frame counts are 1-based capture numbers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    /// Every wait after this many captures times out
    pub timeout_after_frames: Option<u64>,
    /// Every wait after this many captures reports a hardware failure
    pub fail_after_frames: Option<u64>,
    /// Omit the color image from every n-th capture
    pub drop_color_every: Option<u64>,
    /// Omit the depth image from every n-th capture
    pub drop_depth_every: Option<u64>,
    /// Deliver a half-size depth image in every n-th capture
    pub shrink_depth_every: Option<u64>,
    /// Cut the depth buffer short in every n-th capture
    pub truncate_depth_every: Option<u64>,
    /// `open` fails as if the device were busy
    pub fail_open: bool,
    /// `start_cameras` rejects the configuration
    pub fail_start: bool,
    /// The device reports no calibration
    pub missing_calibration: bool,
}

/// Synthetic backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Number of enumerable devices
    pub device_count: u32,
    pub scene: SyntheticScene,
    /// Pace captures at the configured camera frame rate
    pub realtime: bool,
    pub faults: FaultConfig,
    /// Calibration reported by every device
    pub calibration: DeviceCalibration,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            device_count: 1,
            scene: SyntheticScene::default(),
            realtime: true,
            faults: FaultConfig::default(),
            calibration: DeviceCalibration::default(),
        }
    }
}

/// Lifecycle counters shared by a backend and all devices it opened
#[derive(Debug, Default)]
pub struct SyntheticProbe {
    opened: AtomicU64,
    closed: AtomicU64,
    started: AtomicU64,
    stopped: AtomicU64,
    waits: AtomicU64,
    captures_issued: AtomicU64,
    captures_released: AtomicU64,
}

impl SyntheticProbe {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> u64 {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Calls to `wait_for_capture`, including ones that failed
    pub fn waits(&self) -> u64 {
        self.waits.load(Ordering::SeqCst)
    }

    pub fn captures_issued(&self) -> u64 {
        self.captures_issued.load(Ordering::SeqCst)
    }

    pub fn captures_released(&self) -> u64 {
        self.captures_released.load(Ordering::SeqCst)
    }
}

/// Backend serving synthetic devices
pub struct SyntheticBackend {
    config: SyntheticConfig,
    probe: Arc<SyntheticProbe>,
}

impl SyntheticBackend {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            probe: Arc::new(SyntheticProbe::default()),
        }
    }

    /// Counters for every device this backend opened
    pub fn probe(&self) -> Arc<SyntheticProbe> {
        Arc::clone(&self.probe)
    }
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new(SyntheticConfig::default())
    }
}

impl DeviceBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn device_count(&self) -> u32 {
        self.config.device_count
    }

    fn describe(&self, index: u32) -> BackendResult<DeviceInfo> {
        if index >= self.config.device_count {
            return Err(BackendError::DeviceNotFound(format!("index {}", index)));
        }
        Ok(DeviceInfo {
            index,
            name: "Synthetic depth camera".to_string(),
            serial: synthetic_serial(index),
        })
    }

    fn open(&self, index: u32) -> BackendResult<Box<dyn SensorDevice>> {
        if index >= self.config.device_count {
            return Err(BackendError::DeviceNotFound(format!("index {}", index)));
        }
        if self.config.faults.fail_open {
            return Err(BackendError::Busy(format!(
                "synthetic device {} refused to open",
                index
            )));
        }

        SyntheticProbe::bump(&self.probe.opened);
        debug!(device = index, "Opened synthetic device");
        Ok(Box::new(SyntheticDevice {
            index,
            config: self.config.clone(),
            probe: Arc::clone(&self.probe),
            stream: None,
            frames: 0,
        }))
    }
}

fn synthetic_serial(index: u32) -> String {
    format!("SYN{:06}", index)
}

/// Frames generated once per `start_cameras`
struct Stream {
    interval: Duration,
    color: Option<RawImage>,
    depth: Option<RawImage>,
    last_capture: Option<Instant>,
}

struct SyntheticDevice {
    index: u32,
    config: SyntheticConfig,
    probe: Arc<SyntheticProbe>,
    stream: Option<Stream>,
    frames: u64,
}

impl SyntheticDevice {
    fn color_image(resolution: ColorResolution) -> Option<RawImage> {
        let (width, height) = resolution.resolution()?;
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                let b = (x * 255 / width.max(2).saturating_sub(1)) as u8;
                let g = (y * 255 / height.max(2).saturating_sub(1)) as u8;
                data.extend_from_slice(&[b, g, 128, 255]);
            }
        }
        Some(RawImage {
            format: ImageFormat::ColorBgra32,
            width,
            height,
            stride: width * 4,
            data: Arc::from(data),
        })
    }

    fn depth_image(mode: DepthMode, scene: &SyntheticScene) -> Option<RawImage> {
        if !mode.produces_depth() {
            return None;
        }
        let (width, height) = mode.resolution()?;
        let mut values = Vec::with_capacity(width as usize * height as usize);
        for _ in 0..height {
            values.extend((0..width).map(|x| scene.depth_at(x, width)));
        }
        Some(RawImage {
            format: ImageFormat::Depth16,
            width,
            height,
            stride: width * 2,
            data: Arc::from(bytemuck::cast_slice::<u16, u8>(&values)),
        })
    }

    fn every(n: Option<u64>, frame: u64) -> bool {
        n.is_some_and(|n| n > 0 && frame % n == 0)
    }

    /// Same rows, half the width and height; the stride is kept
    fn shrunk(image: &RawImage) -> RawImage {
        RawImage {
            width: image.width / 2,
            height: image.height / 2,
            ..image.clone()
        }
    }

    /// Header-sized buffer that cannot hold a single row
    fn truncated(image: &RawImage) -> RawImage {
        let len = image.data.len().min(10);
        RawImage {
            data: Arc::from(&image.data[..len]),
            ..image.clone()
        }
    }
}

impl SensorDevice for SyntheticDevice {
    fn serial_number(&self) -> String {
        synthetic_serial(self.index)
    }

    fn calibration(
        &self,
        _depth_mode: DepthMode,
        _color_resolution: ColorResolution,
    ) -> BackendResult<DeviceCalibration> {
        if self.config.faults.missing_calibration {
            return Err(BackendError::CalibrationUnavailable(
                "synthetic device has no calibration".to_string(),
            ));
        }
        Ok(self.config.calibration)
    }

    fn start_cameras(&mut self, config: &DeviceConfiguration) -> BackendResult<()> {
        if self.config.faults.fail_start {
            return Err(BackendError::ConfigurationNotSupported(
                "synthetic device rejected the configuration".to_string(),
            ));
        }

        self.stream = Some(Stream {
            interval: config.camera_fps.frame_interval(),
            color: Self::color_image(config.color_resolution),
            depth: Self::depth_image(config.depth_mode, &self.config.scene),
            last_capture: None,
        });
        self.frames = 0;
        SyntheticProbe::bump(&self.probe.started);
        info!(device = self.index, scene = ?self.config.scene, "Synthetic cameras started");
        Ok(())
    }

    fn wait_for_capture(&mut self, timeout: Option<Duration>) -> WaitResult {
        SyntheticProbe::bump(&self.probe.waits);
        let faults = &self.config.faults;
        let Some(stream) = self.stream.as_mut() else {
            return WaitResult::Failed(BackendError::NotStarted.to_string());
        };

        if faults.fail_after_frames.is_some_and(|n| self.frames >= n) {
            return WaitResult::Failed("synthetic hardware fault".to_string());
        }
        if faults.timeout_after_frames.is_some_and(|n| self.frames >= n) {
            // An infinite wait on a stalled device would never return
            thread::sleep(timeout.unwrap_or(Duration::ZERO));
            return WaitResult::Timeout;
        }

        if self.config.realtime
            && let Some(last) = stream.last_capture
        {
            let elapsed = last.elapsed();
            if elapsed < stream.interval {
                thread::sleep(stream.interval - elapsed);
            }
        }
        stream.last_capture = Some(Instant::now());

        self.frames += 1;
        let frame = self.frames;
        let color = stream
            .color
            .clone()
            .filter(|_| !Self::every(faults.drop_color_every, frame));
        let depth = stream
            .depth
            .as_ref()
            .filter(|_| !Self::every(faults.drop_depth_every, frame))
            .map(|depth| {
                if Self::every(faults.truncate_depth_every, frame) {
                    Self::truncated(depth)
                } else if Self::every(faults.shrink_depth_every, frame) {
                    Self::shrunk(depth)
                } else {
                    depth.clone()
                }
            });

        SyntheticProbe::bump(&self.probe.captures_issued);
        let probe = Arc::clone(&self.probe);
        let timestamp = u32::try_from(frame)
            .ok()
            .and_then(|frame| stream.interval.checked_mul(frame))
            .unwrap_or(Duration::MAX);
        WaitResult::Ready(
            RawCapture::new(color, depth, timestamp).with_release_hook(Box::new(move || {
                SyntheticProbe::bump(&probe.captures_released);
            })),
        )
    }

    fn stop_cameras(&mut self) {
        if self.stream.take().is_some() {
            SyntheticProbe::bump(&self.probe.stopped);
            debug!(device = self.index, frames = self.frames, "Synthetic cameras stopped");
        }
    }

    fn close(&mut self) {
        SyntheticProbe::bump(&self.probe.closed);
        debug!(device = self.index, "Closed synthetic device");
    }
}
