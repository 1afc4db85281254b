// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for device capture loops
//!
//! Each opened device runs its capture/process/present cycle on its own
//! thread. The controller owns the thread, shares a stop signal with the
//! rest of the application and hands the loop's final report back on join.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::errors::{PipelineError, PipelineResult};

/// Action returned by the capture loop callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Why the loop body stopped running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The shared stop signal was raised
    StopSignal,
    /// The loop body returned `LoopAction::Stop`
    Finished,
}

/// Controller for a capture loop running in a separate thread
///
/// # Example
///
/// ```ignore
/// let stop = Arc::new(AtomicBool::new(false));
/// let mut controller = CaptureLoopController::start_with_init(
///     "device-0",
///     Arc::clone(&stop),
///     move || {
///         let session = DeviceSession::open(&backend, 0, &device_config, session_config, display)?;
///         Ok((session, presenter))
///     },
///     |(session, presenter)| session.step(presenter),
///     |(session, _), exit| session.finish(exit),
/// );
///
/// // Later, from a signal handler
/// stop.store(true, Ordering::SeqCst);
/// let report = controller.join();
/// ```
pub struct CaptureLoopController<R> {
    /// Thread handle for joining
    thread_handle: Option<JoinHandle<PipelineResult<R>>>,
    /// Signal to stop the loop
    stop_signal: Arc<AtomicBool>,
    /// Name for logging
    name: String,
}

impl<R: Send + 'static> CaptureLoopController<R> {
    /// Start a capture loop with initialization and teardown
    ///
    /// `init_fn` runs once on the new thread. If it fails the thread exits
    /// immediately and `join` returns the error. Otherwise `loop_fn` runs
    /// until it returns `LoopAction::Stop` or `stop_signal` is raised; the
    /// signal is checked before every iteration. `teardown_fn` consumes the
    /// state exactly once and produces the loop's result.
    pub fn start_with_init<S, I, F, T>(
        name: &str,
        stop_signal: Arc<AtomicBool>,
        init_fn: I,
        mut loop_fn: F,
        teardown_fn: T,
    ) -> Self
    where
        S: 'static,
        I: FnOnce() -> PipelineResult<S> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
        T: FnOnce(S, LoopExit) -> R + Send + 'static,
    {
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, "Starting capture loop");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %name_clone, "Capture loop thread started, initializing...");

                let mut state = match init_fn() {
                    Ok(s) => {
                        debug!(name = %name_clone, "Initialization successful");
                        s
                    }
                    Err(e) => {
                        warn!(name = %name_clone, error = %e, "Initialization failed");
                        return Err(e);
                    }
                };

                let exit = loop {
                    if stop_signal_clone.load(Ordering::SeqCst) {
                        debug!(name = %name_clone, "Stop signal received");
                        break LoopExit::StopSignal;
                    }

                    match loop_fn(&mut state) {
                        LoopAction::Continue => {}
                        LoopAction::Stop => {
                            debug!(name = %name_clone, "Loop requested stop");
                            break LoopExit::Finished;
                        }
                    }
                };

                let result = teardown_fn(state, exit);
                info!(name = %name_clone, ?exit, "Capture loop thread exiting");
                Ok(result)
            });

        let thread_handle = match thread_handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(name = %name, error = %e, "Failed to spawn capture loop thread");
                None
            }
        };

        Self {
            thread_handle,
            stop_signal,
            name: name.to_string(),
        }
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Wait for the thread to finish and return the loop's result
    ///
    /// Returns `None` if the thread was already joined or never spawned.
    pub fn join(&mut self) -> Option<PipelineResult<R>> {
        let handle = self.thread_handle.take()?;
        debug!(name = %self.name, "Waiting for capture loop thread to finish");
        match handle.join() {
            Ok(result) => {
                debug!(name = %self.name, "Capture loop thread finished");
                Some(result)
            }
            Err(e) => {
                warn!(name = %self.name, "Capture loop thread panicked: {:?}", e);
                Some(Err(PipelineError::CaptureFailed(format!(
                    "capture loop '{}' panicked",
                    self.name
                ))))
            }
        }
    }
}

impl<R> Drop for CaptureLoopController<R> {
    fn drop(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "CaptureLoopController dropped, stopping loop");
            self.stop_signal.store(true, Ordering::SeqCst);
            if handle.join().is_err() {
                warn!(name = %self.name, "Capture loop thread panicked");
            }
        }
    }
}
