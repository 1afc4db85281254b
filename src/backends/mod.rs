// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for depth camera capture
//!
//! The backend layer abstracts hardware access, providing a consistent API
//! regardless of the underlying sensor driver:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               Pipeline Layer                 │
//! └────────────────────┬────────────────────────┘
//!                      │  FrameSource / Capture
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                   │
//! │  ┌──────────────────┐  ┌─────────────────┐  │
//! │  │  DeviceBackend   │  │  SensorDevice   │  │
//! │  │  (enumeration)   │  │  (streaming)    │  │
//! │  └──────────────────┘  └─────────────────┘  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Device traits, frame source, capture loop threads and the
//!   synthetic sensor

pub mod camera;
