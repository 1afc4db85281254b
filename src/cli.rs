// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for depth camera operations
//!
//! This module provides command-line functionality for:
//! - Listing available devices
//! - Running one capture session per selected device

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Args;
use depthview::backends::camera::{CaptureLoopController, DeviceBackend, SyntheticBackend};
use depthview::config::Config;
use depthview::errors::{AppError, PipelineError, PipelineResult};
use depthview::media::DepthColormap;
use depthview::pipelines::{DeviceSession, SessionReport, TimeoutPolicy};
use depthview::presenter::{FramePresenter, HeadlessPresenter, TerminalDisplay};
use tracing::{error, info, warn};

/// Headless presenters log a summary this often
const HEADLESS_SUMMARY_FRAMES: u64 = 30;

/// What each device thread owns while its loop runs
type SessionState = (DeviceSession, Box<dyn FramePresenter>);

/// Options shared by every command, applied on top of the config file
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Device index to open (repeat for several devices)
    #[arg(short, long = "device", global = true)]
    pub devices: Vec<u32>,

    /// Capture wait in milliseconds (0 waits forever)
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Consecutive capture timeouts tolerated before a session ends
    #[arg(long, global = true)]
    pub retries: Option<u32>,

    /// Stop each session after this many frames
    #[arg(long, global = true)]
    pub frames: Option<u64>,

    /// Log frames instead of drawing them in the terminal
    #[arg(long, global = true)]
    pub headless: bool,

    /// Colormap for the depth view
    #[arg(long, value_enum, global = true)]
    pub colormap: Option<DepthColormap>,
}

impl RunArgs {
    /// Load the config file (or defaults) and apply the flags
    pub fn resolve_config(&self) -> Result<Config, AppError> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if !self.devices.is_empty() {
            config.devices = self.devices.clone();
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.session.capture_timeout_ms = timeout_ms;
        }
        if let Some(retries) = self.retries {
            config.session.timeout_policy = if retries == 0 {
                TimeoutPolicy::Terminate
            } else {
                TimeoutPolicy::Retry {
                    max_consecutive: retries,
                }
            };
        }
        if let Some(frames) = self.frames {
            config.session.max_frames = Some(frames);
        }
        if let Some(colormap) = self.colormap {
            config.display.colormap = colormap;
        }

        config.validate()?;
        Ok(config)
    }
}

/// List all available devices
pub fn list_devices(backend: &dyn DeviceBackend) -> Result<(), AppError> {
    let devices = backend.enumerate();

    if devices.is_empty() {
        println!("No devices found.");
        return Ok(());
    }

    println!("Available devices ({} backend):", backend.name());
    println!();
    for info in devices {
        println!("  [{}] {}", info.index, info.name);
        println!("      Serial: {}", info.serial);
    }

    Ok(())
}

/// Run a session on every configured device until all of them end
pub fn run(backend: Arc<dyn DeviceBackend>, config: &Config, headless: bool) -> Result<(), AppError> {
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })?;
    }

    let display = if headless {
        None
    } else {
        Some(TerminalDisplay::open(config.display.wait_key())?)
    };

    let mut controllers = Vec::with_capacity(config.devices.len());
    for &index in &config.devices {
        let presenter: Box<dyn FramePresenter> = match &display {
            Some(display) => Box::new(display.presenter(index, config.display.show_point_cloud)),
            None => Box::new(
                HeadlessPresenter::new(HEADLESS_SUMMARY_FRAMES)
                    .with_point_cloud(config.display.show_point_cloud),
            ),
        };
        controllers.push((index, spawn_session(Arc::clone(&backend), config, index, presenter, &stop)));
    }

    // Devices end independently; wait for all of them
    let results: Vec<(u32, Option<PipelineResult<SessionReport>>)> = controllers
        .iter_mut()
        .map(|(index, controller)| (*index, controller.join()))
        .collect();

    if let Some(display) = &display
        && let Err(e) = display.restore()
    {
        warn!(error = %e, "Failed to restore terminal");
    }

    let mut first_error = None;
    let mut started = 0usize;
    for (index, result) in results {
        match result {
            Some(Ok(report)) => {
                started += 1;
                println!(
                    "device {} ({}): {} after {} frames ({} partial, {} dropped, {} timeouts)",
                    report.device_index,
                    report.serial,
                    report.end,
                    report.stats.frames,
                    report.stats.partial_captures,
                    report.stats.dropped_frames,
                    report.stats.timeouts,
                );
            }
            Some(Err(e)) => {
                error!(device = index, error = %e, "Device session failed to start");
                eprintln!("device {}: {}", index, e);
                first_error.get_or_insert(e);
            }
            None => {
                error!(device = index, "Device thread could not be started");
                first_error.get_or_insert_with(|| PipelineError::DeviceOpenFailed {
                    index,
                    reason: "capture thread could not be spawned".to_string(),
                });
            }
        }
    }

    info!(started, requested = config.devices.len(), "All device sessions ended");
    match first_error {
        Some(e) if started == 0 => Err(e.into()),
        _ => Ok(()),
    }
}

fn spawn_session(
    backend: Arc<dyn DeviceBackend>,
    config: &Config,
    index: u32,
    presenter: Box<dyn FramePresenter>,
    stop: &Arc<AtomicBool>,
) -> CaptureLoopController<SessionReport> {
    let device_config = config.device.clone();
    let session_config = config.session.clone();
    let depth_options = config.display.depth_options();

    CaptureLoopController::start_with_init(
        &format!("device-{}", index),
        Arc::clone(stop),
        move || {
            let session = DeviceSession::open(
                backend.as_ref(),
                index,
                &device_config,
                session_config,
                depth_options,
            )?;
            Ok((session, presenter))
        },
        |(session, presenter): &mut SessionState| session.step(&mut **presenter),
        |(session, _presenter): SessionState, exit| session.finish(exit),
    )
}

/// Backend used when no hardware driver is compiled in
pub fn default_backend(config: &Config) -> Arc<dyn DeviceBackend> {
    Arc::new(SyntheticBackend::new(config.synthetic.clone()))
}
