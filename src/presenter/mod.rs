// SPDX-License-Identifier: GPL-3.0-only

//! Presentation boundary
//!
//! The pipeline hands each iteration's results to a [`FramePresenter`] and
//! polls it for a stop request. Views are named per device so several
//! device loops can share one display without collisions.
//!
//! # Modules
//!
//! - [`headless`]: Logs what would be shown, for scripted runs
//! - [`render`]: CPU orbit rendering of colored point clouds
//! - [`terminal`]: Half-block terminal display shared by all devices

pub mod headless;
pub mod render;
pub mod terminal;

pub use headless::HeadlessPresenter;
pub use render::{OrbitView, render_point_cloud};
pub use terminal::{TerminalDisplay, TerminalPresenter};

use crate::errors::PipelineResult;
use crate::media::ImageBuffer;
use crate::pipelines::PointCloud;

/// Kind of view shown for one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ViewKind {
    Color,
    TransformedDepth,
    PointCloud,
}

impl ViewKind {
    pub fn label(&self) -> &'static str {
        match self {
            ViewKind::Color => "color",
            ViewKind::TransformedDepth => "transformed depth",
            ViewKind::PointCloud => "point cloud",
        }
    }
}

/// Window title for a view, unique per device
pub fn view_name(kind: ViewKind, device_index: u32) -> String {
    format!("{} (device {})", kind.label(), device_index)
}

/// Why a presenter asks the loop to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The user pressed a quit key
    UserQuit,
    /// The display went away
    Closed,
}

/// One iteration's displayable data, borrowed from the pipeline
///
/// Every part is optional; a view is only shown when its data is present.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresentedFrame<'a> {
    pub device_index: u32,
    pub sequence: u64,
    pub color: Option<&'a ImageBuffer>,
    /// Depth rescaled for display (`Gray8` or `ColorBgra32`)
    pub depth_display: Option<&'a ImageBuffer>,
    /// Point cloud with the color image it is paired with
    pub point_cloud: Option<(&'a PointCloud, &'a ImageBuffer)>,
}

impl PresentedFrame<'_> {
    /// Views that have data this iteration
    pub fn views(&self) -> Vec<ViewKind> {
        let mut views = Vec::with_capacity(3);
        if self.color.is_some() {
            views.push(ViewKind::Color);
        }
        if self.depth_display.is_some() {
            views.push(ViewKind::TransformedDepth);
        }
        if self.point_cloud.is_some() {
            views.push(ViewKind::PointCloud);
        }
        views
    }
}

/// Display collaborator driven by a device loop
pub trait FramePresenter: Send {
    /// Show whatever the frame carries
    fn present(&mut self, frame: &PresentedFrame<'_>) -> PipelineResult<()>;

    /// Non-blocking check for a stop request, called once per iteration
    fn poll_stop(&mut self) -> Option<StopReason>;

    /// Whether point clouds are rendered
    ///
    /// The pipeline always builds the cloud; presenters without 3-D
    /// rendering simply never receive it.
    fn supports_point_cloud(&self) -> bool {
        false
    }
}
