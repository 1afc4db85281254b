// SPDX-License-Identifier: GPL-3.0-only

//! Device session: the per-device capture/process/present loop
//!
//! One session owns one [`FrameSource`] and runs strictly sequentially:
//! block for a capture, process it, present, check for a stop request,
//! repeat. A session ends on a capture timeout (subject to the
//! [`TimeoutPolicy`]), a hardware fault, a presenter stop request, a frame
//! limit or an external stop signal. Teardown is an explicit transition:
//! [`DeviceSession::finish`] closes the device exactly once and reports.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, trace, warn};

use super::frame::{FrameOutputs, FrameProcessor, PipelineState};
use crate::backends::camera::{DeviceBackend, DeviceConfiguration, FrameSource, LoopAction, LoopExit};
use crate::calibration::CalibrationContext;
use crate::constants::{DEFAULT_CAPTURE_TIMEOUT, DEFAULT_TIMEOUT_RETRIES};
use crate::errors::{PipelineError, PipelineResult};
use crate::media::{DepthDisplayOptions, scale_depth_for_display};
use crate::presenter::{FramePresenter, PresentedFrame, StopReason};

/// What to do when no capture arrives in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// End the session on the first timeout
    #[default]
    Terminate,
    /// Tolerate up to `max_consecutive` timeouts in a row
    Retry { max_consecutive: u32 },
}

impl TimeoutPolicy {
    /// Retry with the default limit
    pub fn retry() -> Self {
        TimeoutPolicy::Retry {
            max_consecutive: DEFAULT_TIMEOUT_RETRIES,
        }
    }
}

/// Session loop settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capture wait in milliseconds, 0 waits forever
    pub capture_timeout_ms: u64,
    pub timeout_policy: TimeoutPolicy,
    /// End the session after this many processed frames
    pub max_frames: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capture_timeout_ms: DEFAULT_CAPTURE_TIMEOUT.as_millis() as u64,
            timeout_policy: TimeoutPolicy::Terminate,
            max_frames: None,
        }
    }
}

impl SessionConfig {
    /// Wait passed to the device, `None` for an unbounded wait
    pub fn capture_timeout(&self) -> Option<Duration> {
        (self.capture_timeout_ms > 0).then(|| Duration::from_millis(self.capture_timeout_ms))
    }
}

/// Counters kept over a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Captures processed and presented
    pub frames: u64,
    /// Captures missing color or depth
    pub partial_captures: u64,
    /// Frames whose derived data was dropped by a fault
    pub dropped_frames: u64,
    /// Capture waits that timed out
    pub timeouts: u64,
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Timed out, and the policy did not allow another wait
    CaptureTimeout,
    /// The device reported a hardware fault
    CaptureFailed(String),
    /// The shared stop signal was raised
    StopRequested,
    /// The presenter's display went away
    PresenterClosed,
    /// The user asked to quit through the presenter
    UserQuit,
    /// The configured frame limit was reached
    FrameLimit,
    /// The presenter failed to show a frame
    PresentationFailed(String),
}

impl std::fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEnd::CaptureTimeout => write!(f, "capture timeout"),
            SessionEnd::CaptureFailed(reason) => write!(f, "capture failed: {}", reason),
            SessionEnd::StopRequested => write!(f, "stop requested"),
            SessionEnd::PresenterClosed => write!(f, "presenter closed"),
            SessionEnd::UserQuit => write!(f, "user quit"),
            SessionEnd::FrameLimit => write!(f, "frame limit reached"),
            SessionEnd::PresentationFailed(reason) => write!(f, "presentation failed: {}", reason),
        }
    }
}

impl SessionEnd {
    /// True for endings caused by a device fault
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            SessionEnd::CaptureTimeout
                | SessionEnd::CaptureFailed(_)
                | SessionEnd::PresentationFailed(_)
        )
    }
}

/// Final report of a device session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub device_index: u32,
    pub serial: String,
    pub end: SessionEnd,
    pub stats: SessionStats,
}

/// One device's live session
pub struct DeviceSession {
    source: FrameSource,
    processor: FrameProcessor,
    config: SessionConfig,
    display: DepthDisplayOptions,
    stats: SessionStats,
    consecutive_timeouts: u32,
    end: Option<SessionEnd>,
}

impl DeviceSession {
    /// Open device `index` and prepare its pipeline
    ///
    /// Startup errors from [`FrameSource::open`] are returned unchanged.
    pub fn open(
        backend: &dyn DeviceBackend,
        index: u32,
        device_config: &DeviceConfiguration,
        config: SessionConfig,
        display: DepthDisplayOptions,
    ) -> PipelineResult<Self> {
        let source = FrameSource::open(backend, index, device_config)?;
        let processor = FrameProcessor::new(std::sync::Arc::clone(source.calibration()));
        info!(
            device = index,
            serial = %source.serial_number(),
            timeout_ms = config.capture_timeout_ms,
            policy = ?config.timeout_policy,
            "Device session ready"
        );
        Ok(Self {
            source,
            processor,
            config,
            display,
            stats: SessionStats::default(),
            consecutive_timeouts: 0,
            end: None,
        })
    }

    pub fn device_index(&self) -> u32 {
        self.source.index()
    }

    pub fn calibration(&self) -> &CalibrationContext {
        self.source.calibration()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn state(&self) -> PipelineState {
        self.processor.state()
    }

    /// Ending decided so far, if any
    pub fn end(&self) -> Option<&SessionEnd> {
        self.end.as_ref()
    }

    fn stop_with(&mut self, end: SessionEnd) -> LoopAction {
        self.processor.transition(PipelineState::Idle);
        self.end = Some(end);
        LoopAction::Stop
    }

    /// Run one iteration: capture, process, present, poll for stop
    pub fn step(&mut self, presenter: &mut dyn FramePresenter) -> LoopAction {
        if self.end.is_some() {
            return LoopAction::Stop;
        }
        if self.frame_limit_reached() {
            return self.stop_with(SessionEnd::FrameLimit);
        }

        self.processor.transition(PipelineState::Capturing);
        let capture = match self.source.next_capture(self.config.capture_timeout()) {
            Ok(capture) => capture,
            Err(e) => return self.on_capture_error(e),
        };
        self.consecutive_timeouts = 0;

        let outputs = self.processor.process(capture);
        self.stats.frames += 1;
        if outputs.is_partial() {
            self.stats.partial_captures += 1;
        }
        if outputs.has_faults() {
            self.stats.dropped_frames += 1;
        }

        if let Err(e) = self.present(&outputs, presenter) {
            warn!(device = self.device_index(), error = %e, "Presenter failed");
            return self.stop_with(SessionEnd::PresentationFailed(e.to_string()));
        }
        self.processor.transition(PipelineState::Idle);

        match presenter.poll_stop() {
            Some(StopReason::UserQuit) => self.stop_with(SessionEnd::UserQuit),
            Some(StopReason::Closed) => self.stop_with(SessionEnd::PresenterClosed),
            None if self.frame_limit_reached() => self.stop_with(SessionEnd::FrameLimit),
            None => LoopAction::Continue,
        }
    }

    fn frame_limit_reached(&self) -> bool {
        self.config
            .max_frames
            .is_some_and(|max| self.stats.frames >= max)
    }

    fn on_capture_error(&mut self, error: PipelineError) -> LoopAction {
        match error {
            PipelineError::CaptureTimeout { timeout } => {
                self.stats.timeouts += 1;
                self.consecutive_timeouts += 1;
                match self.config.timeout_policy {
                    TimeoutPolicy::Retry { max_consecutive }
                        if self.consecutive_timeouts <= max_consecutive =>
                    {
                        warn!(
                            device = self.device_index(),
                            timeout_ms = timeout.as_millis() as u64,
                            attempt = self.consecutive_timeouts,
                            max_consecutive,
                            "Capture timed out, retrying"
                        );
                        self.processor.transition(PipelineState::Idle);
                        LoopAction::Continue
                    }
                    _ => {
                        warn!(
                            device = self.device_index(),
                            timeout_ms = timeout.as_millis() as u64,
                            "Capture timed out, ending session"
                        );
                        self.stop_with(SessionEnd::CaptureTimeout)
                    }
                }
            }
            other => {
                warn!(device = self.device_index(), error = %other, "Capture failed, ending session");
                let reason = match other {
                    PipelineError::CaptureFailed(reason) => reason,
                    other => other.to_string(),
                };
                self.stop_with(SessionEnd::CaptureFailed(reason))
            }
        }
    }

    fn present(
        &self,
        outputs: &FrameOutputs,
        presenter: &mut dyn FramePresenter,
    ) -> PipelineResult<()> {
        // Raw depth stands in when there is nothing aligned this frame
        let depth_source = outputs.aligned_depth.as_ref().or(outputs.depth.as_ref());
        let depth_display = depth_source.and_then(|depth| {
            scale_depth_for_display(depth, &self.display)
                .map_err(|e| warn!(frame = outputs.sequence, error = %e, "Depth view dropped"))
                .ok()
        });

        let point_cloud = if presenter.supports_point_cloud() {
            outputs.point_cloud.as_ref().zip(outputs.color.as_ref())
        } else {
            None
        };

        let frame = PresentedFrame {
            device_index: self.device_index(),
            sequence: outputs.sequence,
            color: outputs.color.as_ref(),
            depth_display: depth_display.as_ref(),
            point_cloud,
        };
        trace!(frame = outputs.sequence, views = ?frame.views(), "Presenting");
        presenter.present(&frame)
    }

    /// Tear the session down and report
    ///
    /// Closes the device exactly once. `exit` supplies the reason when the
    /// loop was stopped from outside.
    pub fn finish(mut self, exit: LoopExit) -> SessionReport {
        let end = self.end.take().unwrap_or(match exit {
            LoopExit::StopSignal | LoopExit::Finished => SessionEnd::StopRequested,
        });
        self.source.close();

        info!(
            device = self.source.index(),
            end = %end,
            frames = self.stats.frames,
            partial = self.stats.partial_captures,
            dropped = self.stats.dropped_frames,
            timeouts = self.stats.timeouts,
            "Session ended"
        );

        SessionReport {
            device_index: self.source.index(),
            serial: self.source.serial_number().to_string(),
            end,
            stats: self.stats,
        }
    }

    /// Run the loop on the current thread until it ends
    ///
    /// `stop` is checked before every iteration, never in the middle of one.
    pub fn run(mut self, presenter: &mut dyn FramePresenter, stop: &AtomicBool) -> SessionReport {
        loop {
            if stop.load(Ordering::SeqCst) {
                return self.finish(LoopExit::StopSignal);
            }
            if self.step(presenter) == LoopAction::Stop {
                return self.finish(LoopExit::Finished);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_timeout_waits_forever() {
        let config = SessionConfig {
            capture_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.capture_timeout(), None);
        assert_eq!(
            SessionConfig::default().capture_timeout(),
            Some(Duration::from_millis(1000))
        );
    }

    #[test]
    fn test_timeout_policy_serde() {
        let policy: TimeoutPolicy =
            serde_json::from_str(r#"{ "kind": "retry", "max_consecutive": 4 }"#).unwrap();
        assert_eq!(policy, TimeoutPolicy::Retry { max_consecutive: 4 });
        let policy: TimeoutPolicy = serde_json::from_str(r#"{ "kind": "terminate" }"#).unwrap();
        assert_eq!(policy, TimeoutPolicy::Terminate);
    }

    #[test]
    fn test_fault_endings() {
        assert!(SessionEnd::CaptureTimeout.is_fault());
        assert!(!SessionEnd::UserQuit.is_fault());
        assert!(!SessionEnd::FrameLimit.is_fault());
    }
}
