// SPDX-License-Identifier: GPL-3.0-only

//! Per-frame processing: extract, release, align, reproject
//!
//! ```text
//! Idle → Capturing → Extracted → Aligning → PointBuilding → Presenting → Idle
//! ```
//!
//! Any stage may short-circuit to `Presenting` with whatever it has. Faults
//! in alignment or reprojection drop that stage's output for this frame
//! only.

use std::sync::Arc;
use std::time::Duration;

use tracing::{trace, warn};

use super::align::Aligner;
use super::point_cloud::{PointCloud, PointCloudBuilder};
use crate::backends::camera::Capture;
use crate::calibration::CalibrationContext;
use crate::errors::{ImageError, PipelineError};
use crate::media::ImageBuffer;

/// Stage of the per-frame state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    /// Blocked waiting for the device
    Capturing,
    /// Images copied out, capture released
    Extracted,
    Aligning,
    PointBuilding,
    Presenting,
}

/// A modality whose image could not be copied out of the capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionFault {
    pub modality: &'static str,
    pub error: ImageError,
}

/// Everything one iteration produced; each part is optional
#[derive(Debug, Default)]
pub struct FrameOutputs {
    /// Capture sequence number
    pub sequence: u64,
    /// Device clock at exposure
    pub device_timestamp: Duration,
    pub color: Option<ImageBuffer>,
    pub depth: Option<ImageBuffer>,
    pub aligned_depth: Option<ImageBuffer>,
    pub point_cloud: Option<PointCloud>,
    /// Images present in the capture but unusable
    pub extraction_faults: Vec<ExtractionFault>,
    /// Per-frame alignment and reprojection failures
    pub stage_faults: Vec<PipelineError>,
}

impl FrameOutputs {
    /// True if the capture lacked color or depth
    pub fn is_partial(&self) -> bool {
        self.color.is_none() || self.depth.is_none()
    }

    /// True if any derived data was dropped because of a fault
    pub fn has_faults(&self) -> bool {
        !self.extraction_faults.is_empty() || !self.stage_faults.is_empty()
    }
}

/// Runs the extract/align/reproject stages for one device
#[derive(Debug)]
pub struct FrameProcessor {
    calibration: Arc<CalibrationContext>,
    aligner: Aligner,
    builder: PointCloudBuilder,
    state: PipelineState,
}

impl FrameProcessor {
    pub fn new(calibration: Arc<CalibrationContext>) -> Self {
        Self {
            calibration,
            aligner: Aligner::new(),
            builder: PointCloudBuilder::new(),
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn calibration(&self) -> &Arc<CalibrationContext> {
        &self.calibration
    }

    /// Move to `state`, used by the session around the blocking wait and
    /// presentation
    pub fn transition(&mut self, state: PipelineState) {
        trace!(from = ?self.state, to = ?state, "Pipeline state");
        self.state = state;
    }

    /// Process one capture
    ///
    /// Both images are copied out and the capture is released before any
    /// further work. Leaves the processor in `Presenting`.
    pub fn process(&mut self, capture: Capture) -> FrameOutputs {
        let mut outputs = FrameOutputs {
            sequence: capture.sequence(),
            device_timestamp: capture.device_timestamp(),
            ..Default::default()
        };
        trace!(
            frame = outputs.sequence,
            timestamp_us = outputs.device_timestamp.as_micros() as u64,
            "Processing capture"
        );

        outputs.color = Self::extracted("color", capture.extract_color(), &mut outputs);
        outputs.depth = Self::extracted("depth", capture.extract_depth(), &mut outputs);
        capture.release();
        self.transition(PipelineState::Extracted);

        // Alignment needs the color grid; without color there is nothing to
        // align to
        let Some(color) = outputs.color.as_ref() else {
            self.transition(PipelineState::Presenting);
            return outputs;
        };
        let (color_width, color_height) = (color.width(), color.height());

        self.transition(PipelineState::Aligning);
        outputs.aligned_depth = match self.aligner.align(
            outputs.depth.as_ref(),
            color_width,
            color_height,
            &self.calibration,
        ) {
            Ok(aligned) => aligned,
            Err(e) => {
                warn!(frame = outputs.sequence, error = %e, "Dropping aligned depth");
                outputs.stage_faults.push(e);
                None
            }
        };

        if outputs.aligned_depth.is_some() {
            self.transition(PipelineState::PointBuilding);
            outputs.point_cloud = match self
                .builder
                .build_point_cloud(outputs.aligned_depth.as_ref(), &self.calibration)
            {
                Ok(cloud) => cloud,
                Err(e) => {
                    warn!(frame = outputs.sequence, error = %e, "Dropping point cloud");
                    outputs.stage_faults.push(e);
                    None
                }
            };
        }

        self.transition(PipelineState::Presenting);
        outputs
    }

    fn extracted(
        modality: &'static str,
        result: Result<Option<ImageBuffer>, ImageError>,
        outputs: &mut FrameOutputs,
    ) -> Option<ImageBuffer> {
        match result {
            Ok(image) => image,
            Err(error) => {
                warn!(frame = outputs.sequence, modality, %error, "Unusable image in capture");
                outputs
                    .extraction_faults
                    .push(ExtractionFault { modality, error });
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::synthetic::FaultConfig;
    use crate::backends::camera::{
        DeviceConfiguration, FrameSource, SyntheticBackend, SyntheticConfig,
    };

    fn source_with(faults: FaultConfig) -> (SyntheticBackend, FrameSource) {
        let backend = SyntheticBackend::new(SyntheticConfig {
            realtime: false,
            faults,
            ..Default::default()
        });
        let source = FrameSource::open(&backend, 0, &DeviceConfiguration::default()).unwrap();
        (backend, source)
    }

    fn next(source: &mut FrameSource, processor: &mut FrameProcessor) -> FrameOutputs {
        let capture = source.next_capture(None).unwrap();
        processor.process(capture)
    }

    #[test]
    fn test_complete_capture_produces_every_output() {
        let (backend, mut source) = source_with(FaultConfig::default());
        let mut processor = FrameProcessor::new(Arc::clone(source.calibration()));

        let outputs = next(&mut source, &mut processor);

        assert_eq!(outputs.sequence, 1);
        assert!(outputs.device_timestamp > Duration::ZERO);
        assert!(outputs.color.is_some());
        assert!(outputs.aligned_depth.is_some());
        assert!(outputs.point_cloud.is_some());
        assert!(!outputs.has_faults());
        assert_eq!(processor.state(), PipelineState::Presenting);
        assert_eq!(backend.probe().captures_released(), 1);
    }

    #[test]
    fn test_alignment_fault_drops_derived_data_only() {
        let (_backend, mut source) = source_with(FaultConfig {
            shrink_depth_every: Some(1),
            ..Default::default()
        });
        let mut processor = FrameProcessor::new(Arc::clone(source.calibration()));

        let outputs = next(&mut source, &mut processor);

        assert!(outputs.extraction_faults.is_empty());
        assert_eq!(outputs.stage_faults.len(), 1);
        assert!(matches!(
            outputs.stage_faults[0],
            PipelineError::AlignmentFailed(_)
        ));
        // Raw images survive the fault
        assert!(outputs.color.is_some());
        assert_eq!(outputs.depth.as_ref().map(|d| d.width()), Some(320));
        assert!(outputs.aligned_depth.is_none());
        assert!(outputs.point_cloud.is_none());
        assert!(!outputs.is_partial());
        assert_eq!(processor.state(), PipelineState::Presenting);
    }

    #[test]
    fn test_unusable_depth_is_treated_as_absent() {
        let (backend, mut source) = source_with(FaultConfig {
            truncate_depth_every: Some(1),
            ..Default::default()
        });
        let mut processor = FrameProcessor::new(Arc::clone(source.calibration()));

        let outputs = next(&mut source, &mut processor);

        assert_eq!(outputs.extraction_faults.len(), 1);
        assert_eq!(outputs.extraction_faults[0].modality, "depth");
        assert!(matches!(
            outputs.extraction_faults[0].error,
            ImageError::BufferTooSmall { .. }
        ));
        assert!(outputs.stage_faults.is_empty());
        assert!(outputs.depth.is_none());
        assert!(outputs.color.is_some());
        assert!(outputs.aligned_depth.is_none());
        assert!(outputs.is_partial());
        assert!(outputs.has_faults());
        assert_eq!(processor.state(), PipelineState::Presenting);
        assert_eq!(backend.probe().captures_released(), 1);
    }

    #[test]
    fn test_fault_does_not_carry_into_next_frame() {
        let (_backend, mut source) = source_with(FaultConfig {
            shrink_depth_every: Some(2),
            ..Default::default()
        });
        let mut processor = FrameProcessor::new(Arc::clone(source.calibration()));

        let first = next(&mut source, &mut processor);
        let second = next(&mut source, &mut processor);
        let third = next(&mut source, &mut processor);

        assert!(!first.has_faults() && first.point_cloud.is_some());
        assert!(second.has_faults() && second.point_cloud.is_none());
        assert!(!third.has_faults() && third.point_cloud.is_some());
    }
}
