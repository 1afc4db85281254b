// SPDX-License-Identifier: GPL-3.0-only

//! depthview - live viewer for combined color and depth cameras
//!
//! This library opens depth camera devices, aligns each depth frame into
//! its paired color frame, builds colored point clouds and hands the results
//! to a presenter.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Device enumeration, streaming and the synthetic sensor
//! - [`calibration`]: Camera models and per-mode calibration tables
//! - [`media`]: Image buffers and depth visualization
//! - [`pipelines`]: Alignment, point clouds and the per-device session loop
//! - [`presenter`]: Terminal and headless display of the views
//! - [`config`]: JSON configuration handling
//!
//! # Example
//!
//! ```ignore
//! // Typically run via:
//! // depthview --device 0 --device 1
//! ```

pub mod backends;
pub mod calibration;
pub mod config;
pub mod constants;
pub mod errors;
pub mod media;
pub mod pipelines;
pub mod presenter;

// Re-export commonly used types
pub use calibration::CalibrationContext;
pub use config::Config;
pub use errors::{PipelineError, PipelineResult};
pub use media::{ImageBuffer, ImageFormat};
