// SPDX-License-Identifier: GPL-3.0-only

//! Presenter without a display
//!
//! Logs a one-line summary of every view it receives. Stop requests only
//! come from outside (Ctrl+C or a frame limit).

use tracing::{debug, info};

use super::{FramePresenter, PresentedFrame, StopReason, view_name};
use crate::errors::PipelineResult;

/// Logs frames instead of drawing them
#[derive(Debug)]
pub struct HeadlessPresenter {
    frames: u64,
    /// Log a summary every n frames (0 logs none at info level)
    summary_every: u64,
    point_cloud: bool,
}

impl HeadlessPresenter {
    pub fn new(summary_every: u64) -> Self {
        Self {
            frames: 0,
            summary_every,
            point_cloud: true,
        }
    }

    /// Whether the pipeline should hand over point clouds
    pub fn with_point_cloud(mut self, enabled: bool) -> Self {
        self.point_cloud = enabled;
        self
    }

    /// Frames presented so far
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Default for HeadlessPresenter {
    fn default() -> Self {
        Self::new(0)
    }
}

impl FramePresenter for HeadlessPresenter {
    fn present(&mut self, frame: &PresentedFrame<'_>) -> PipelineResult<()> {
        self.frames += 1;

        for view in frame.views() {
            debug!(
                view = %view_name(view, frame.device_index),
                frame = frame.sequence,
                "Presenting view"
            );
        }

        if self.summary_every > 0 && self.frames % self.summary_every == 0 {
            let valid_points = frame
                .point_cloud
                .map(|(cloud, _)| cloud.valid_count())
                .unwrap_or(0);
            info!(
                device = frame.device_index,
                frame = frame.sequence,
                color = frame.color.is_some(),
                depth = frame.depth_display.is_some(),
                valid_points,
                "Frame summary"
            );
        }
        Ok(())
    }

    fn poll_stop(&mut self) -> Option<StopReason> {
        None
    }

    fn supports_point_cloud(&self) -> bool {
        self.point_cloud
    }
}
