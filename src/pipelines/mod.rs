// SPDX-License-Identifier: GPL-3.0-only

//! Per-device processing pipeline
//!
//! Each device runs its own loop on its own thread. Nothing mutable is
//! shared between devices; only the calibration (read-only) is shared
//! within one device's pipeline.
//!
//! # Pipeline Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │   Capture    │ ──▶ │  FrameProcessor   │ ──▶ │  Presenter   │
//! │ (BGRA32 +    │     │  - Copy out       │     │  - color     │
//! │  DEPTH16)    │     │  - Align depth    │     │  - depth     │
//! │              │     │  - Point cloud    │     │  - cloud     │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`align`]: Depth-to-color geometric alignment
//! - [`point_cloud`]: Back-projection of aligned depth into 3-D points
//! - [`frame`]: Per-frame state machine tying the stages together
//! - [`session`]: Capture loop, timeout policy and teardown

pub mod align;
pub mod frame;
pub mod point_cloud;
pub mod session;

pub use align::Aligner;
pub use frame::{ExtractionFault, FrameOutputs, FrameProcessor, PipelineState};
pub use point_cloud::{PointCloud, PointCloudBuilder, PointXyz};
pub use session::{
    DeviceSession, SessionConfig, SessionEnd, SessionReport, SessionStats, TimeoutPolicy,
};
