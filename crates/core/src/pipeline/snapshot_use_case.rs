use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::analysis::domain::face_box::{normalize_all, FaceBox};
use crate::analysis::domain::frame_analyzer::{AnalysisError, FrameAnalyzer};
use crate::capture::domain::video_source::{wait_for_frame, VideoSource};
use crate::overlay::domain::overlay::Overlay;
use crate::overlay::domain::overlay_surface::OverlaySurface;
use crate::realtime::errors::NotReadyError;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error(transparent)]
    NotReady(#[from] NotReadyError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("failed to render snapshot: {0}")]
    Render(String),
}

/// One-shot pipeline: capture → encode → analyze → draw.
///
/// No retries: a single failure is reported to the caller.
pub struct SnapshotUseCase {
    source: Box<dyn VideoSource>,
    surface: Box<dyn OverlaySurface>,
    analyzer: Arc<dyn FrameAnalyzer>,
    jpeg_quality: u8,
    first_frame_timeout: Duration,
}

impl SnapshotUseCase {
    pub fn new(
        source: Box<dyn VideoSource>,
        surface: Box<dyn OverlaySurface>,
        analyzer: Arc<dyn FrameAnalyzer>,
        jpeg_quality: u8,
        first_frame_timeout: Duration,
    ) -> Self {
        Self {
            source,
            surface,
            analyzer,
            jpeg_quality,
            first_frame_timeout,
        }
    }

    /// Returns the faces drawn on the snapshot.
    pub fn execute(&mut self) -> Result<Vec<FaceBox>, SnapshotError> {
        if !self.surface.is_ready() {
            return Err(NotReadyError::SurfaceNotReady.into());
        }
        if !self.source.is_active() {
            return Err(NotReadyError::SourceInactive.into());
        }

        let frame = wait_for_frame(self.source.as_mut(), self.first_frame_timeout)
            .map_err(|e| AnalysisError::Capture(e.to_string()))?;
        let encoded = frame
            .encode_jpeg(self.jpeg_quality)
            .map_err(|e| AnalysisError::Encode(e.to_string()))?;
        let faces = normalize_all(&self.analyzer.analyze(&encoded)?);

        self.surface
            .render(&frame, &Overlay::from_faces(&faces))
            .map_err(|e| SnapshotError::Render(e.to_string()))?;
        Ok(faces)
    }
}
