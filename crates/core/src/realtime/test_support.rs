//! Stub collaborators shared by the loop tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::Receiver;

use crate::analysis::domain::face_box::FaceBoxInput;
use crate::analysis::domain::frame_analyzer::{AnalysisError, FrameAnalyzer};
use crate::capture::domain::video_source::{CaptureError, VideoSource};
use crate::overlay::domain::overlay::Overlay;
use crate::overlay::domain::overlay_surface::{OverlaySurface, RenderError};
use crate::shared::encoded_frame::EncodedFrame;
use crate::shared::frame::Frame;

pub(crate) fn alice() -> FaceBoxInput {
    FaceBoxInput {
        x: Some(10.0),
        y: Some(10.0),
        width: Some(50.0),
        height: Some(60.0),
        name: Some("Alice".to_string()),
        score: Some(0.93),
        ..FaceBoxInput::default()
    }
}

pub(crate) fn service_down() -> AnalysisError {
    AnalysisError::Status { status: 503 }
}

pub(crate) struct FakeSource {
    pub(crate) active: Arc<AtomicBool>,
    dimensions: Option<(u32, u32)>,
    captured: u64,
}

impl FakeSource {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(true)),
            dimensions: Some((width, height)),
            captured: 0,
        }
    }

    pub(crate) fn inactive() -> Self {
        let source = Self::new(64, 48);
        source.active.store(false, Ordering::SeqCst);
        source
    }

    pub(crate) fn without_dimensions() -> Self {
        Self {
            dimensions: None,
            ..Self::new(64, 48)
        }
    }
}

impl VideoSource for FakeSource {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    fn capture(&mut self) -> Result<Frame, CaptureError> {
        let (width, height) = self.dimensions.ok_or("no frame yet")?;
        let sequence = self.captured;
        self.captured += 1;
        Ok(Frame::new(
            vec![120u8; (width * height * 3) as usize],
            width,
            height,
            sequence,
        ))
    }
}

type Hook = Box<dyn Fn() + Send + Sync>;

/// Replays scripted results, then repeats `fallback`. Tracks how many calls
/// overlap in time.
pub(crate) struct ScriptedAnalyzer {
    script: Mutex<VecDeque<Result<Vec<FaceBoxInput>, AnalysisError>>>,
    fallback: Result<Vec<FaceBoxInput>, AnalysisError>,
    delay: Duration,
    gate: Option<Receiver<()>>,
    hook: Option<Hook>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedAnalyzer {
    pub(crate) fn always(result: Result<Vec<FaceBoxInput>, AnalysisError>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: result,
            delay: Duration::ZERO,
            gate: None,
            hook: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn then(self, result: Result<Vec<FaceBoxInput>, AnalysisError>) -> Self {
        self.script.lock().unwrap().push_back(result);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every call blocks until the gate yields a value or its sender drops.
    pub(crate) fn with_gate(mut self, gate: Receiver<()>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Runs inside every call, before the result is returned.
    pub(crate) fn with_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl FrameAnalyzer for ScriptedAnalyzer {
    fn analyze(&self, _frame: &EncodedFrame) -> Result<Vec<FaceBoxInput>, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if let Some(hook) = &self.hook {
            hook();
        }

        let result = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[derive(Default)]
pub(crate) struct SurfaceLog {
    pub(crate) renders: Vec<((u32, u32), Overlay)>,
    pub(crate) clears: usize,
}

/// Surface that records every call into a shared log.
pub(crate) struct RecordingSurface {
    pub(crate) log: Arc<Mutex<SurfaceLog>>,
    ready: bool,
    fail_renders: bool,
}

impl RecordingSurface {
    pub(crate) fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(SurfaceLog::default())),
            ready: true,
            fail_renders: false,
        }
    }

    pub(crate) fn not_ready() -> Self {
        Self {
            ready: false,
            ..Self::new()
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail_renders: true,
            ..Self::new()
        }
    }
}

impl OverlaySurface for RecordingSurface {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn render(&mut self, frame: &Frame, overlay: &Overlay) -> Result<(), RenderError> {
        if self.fail_renders {
            return Err("surface detached".into());
        }
        self.log
            .lock()
            .unwrap()
            .renders
            .push((frame.dimensions(), overlay.clone()));
        Ok(())
    }

    fn clear(&mut self) {
        self.log.lock().unwrap().clears += 1;
    }
}
