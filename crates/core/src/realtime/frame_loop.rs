use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crossbeam_channel::{select, Receiver, RecvTimeoutError};

use crate::analysis::domain::face_box::{normalize_all, FaceBox};
use crate::analysis::domain::frame_analyzer::{AnalysisError, FrameAnalyzer};
use crate::capture::domain::video_source::VideoSource;
use crate::overlay::domain::overlay::Overlay;
use crate::overlay::domain::overlay_surface::OverlaySurface;
use crate::realtime::errors::ExhaustedRetriesError;
use crate::realtime::loop_observer::{LoopEvent, LoopObserver, SkipReason};
use crate::realtime::processor_config::ProcessorConfig;
use crate::shared::frame::Frame;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopState {
    #[default]
    Idle,
    Running,
}

#[derive(Debug, Default)]
pub(crate) struct RunState {
    pub(crate) loop_state: LoopState,
    /// Bumped on every transition; a worker only acts while it matches.
    pub(crate) generation: u64,
    pub(crate) retries: u32,
    pub(crate) last_processed: Option<Instant>,
}

impl RunState {
    fn is_current(&self, generation: u64) -> bool {
        self.loop_state == LoopState::Running && self.generation == generation
    }
}

/// State shared between a processor and its workers.
///
/// Lock order: `state`, then `surface`, then `observer`.
pub(crate) struct LoopShared {
    pub(crate) state: Mutex<RunState>,
    /// Outlives runs: a request still out from a stopped run blocks the
    /// next run's ticks.
    pub(crate) in_flight: AtomicBool,
    surface: Mutex<Option<Box<dyn OverlaySurface>>>,
    observer: Mutex<Box<dyn LoopObserver>>,
}

impl LoopShared {
    pub(crate) fn new(observer: Box<dyn LoopObserver>) -> Self {
        Self {
            state: Mutex::new(RunState::default()),
            in_flight: AtomicBool::new(false),
            surface: Mutex::new(None),
            observer: Mutex::new(observer),
        }
    }

    pub(crate) fn loop_state(&self) -> LoopState {
        lock(&self.state).loop_state
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Enters Running under a fresh generation, taking ownership of
    /// `surface`. Returns `None` if already running.
    pub(crate) fn begin(&self, surface: Box<dyn OverlaySurface>) -> Option<u64> {
        let mut state = lock(&self.state);
        if state.loop_state == LoopState::Running {
            return None;
        }
        state.loop_state = LoopState::Running;
        state.generation += 1;
        state.retries = 0;
        state.last_processed = None;
        *lock(&self.surface) = Some(surface);
        lock(&self.observer).event(&LoopEvent::Started);
        Some(state.generation)
    }

    /// Returns to Idle: clears and releases the surface, resets counters and
    /// reports `event`. With `Some(generation)` only that run is halted.
    /// Returns false if there was nothing to halt.
    pub(crate) fn finish(&self, generation: Option<u64>, event: LoopEvent) -> bool {
        let mut state = lock(&self.state);
        if state.loop_state != LoopState::Running {
            return false;
        }
        if generation.is_some_and(|g| g != state.generation) {
            return false;
        }
        state.loop_state = LoopState::Idle;
        state.generation += 1;
        state.retries = 0;
        state.last_processed = None;

        if let Some(mut surface) = lock(&self.surface).take() {
            surface.clear();
        }
        let mut observer = lock(&self.observer);
        observer.event(&event);
        observer.summary();
        true
    }
}

pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    Skipped(SkipReason),
    Rendered { faces: usize },
    /// This tick halted the loop after using up its retries.
    Exhausted,
    /// This tick halted the loop because the source went inactive.
    SourceEnded,
    /// The run this worker belongs to is over.
    Cancelled,
}

struct Processed {
    frame: Frame,
    faces: Vec<FaceBox>,
    timings: [(&'static str, f64); 3],
}

/// Executes ticks for one run (one generation) of the loop.
pub(crate) struct TickRunner {
    shared: Arc<LoopShared>,
    generation: u64,
    source: Box<dyn VideoSource>,
    analyzer: Arc<dyn FrameAnalyzer>,
    config: ProcessorConfig,
    cancel: Receiver<()>,
}

impl TickRunner {
    pub(crate) fn new(
        shared: Arc<LoopShared>,
        generation: u64,
        source: Box<dyn VideoSource>,
        analyzer: Arc<dyn FrameAnalyzer>,
        config: ProcessorConfig,
        cancel: Receiver<()>,
    ) -> Self {
        Self {
            shared,
            generation,
            source,
            analyzer,
            config,
            cancel,
        }
    }

    /// Worker body: one tick per ticker message until the run ends.
    pub(crate) fn run(mut self, ticker: Receiver<Instant>) {
        let cancel = self.cancel.clone();
        loop {
            select! {
                recv(cancel) -> _ => break,
                recv(ticker) -> tick => {
                    let Ok(at) = tick else { break };
                    match self.tick(at) {
                        TickOutcome::Skipped(_) | TickOutcome::Rendered { .. } => {}
                        TickOutcome::Exhausted
                        | TickOutcome::SourceEnded
                        | TickOutcome::Cancelled => break,
                    }
                }
            }
        }
        log::debug!("Frame loop worker for run {} exiting", self.generation);
    }

    /// One scheduled tick: capture, analyze and draw, retrying the same
    /// tick up to `max_retries` times in total.
    pub(crate) fn tick(&mut self, now: Instant) -> TickOutcome {
        let shared = Arc::clone(&self.shared);
        let Some(_guard) = InFlightGuard::acquire(&shared.in_flight) else {
            return self.skip(SkipReason::InFlight);
        };

        {
            let mut state = lock(&shared.state);
            if !state.is_current(self.generation) {
                return TickOutcome::Cancelled;
            }
            if let Some(last) = state.last_processed {
                if now.saturating_duration_since(last) < self.config.frame_interval() {
                    drop(state);
                    return self.skip(SkipReason::TooSoon);
                }
            }
            state.last_processed = Some(now);
            state.retries = 0;
        }

        loop {
            if !self.source.is_active() {
                if self.shared.finish(Some(self.generation), LoopEvent::SourceEnded) {
                    log::info!("Video source ended, frame loop stopped");
                    return TickOutcome::SourceEnded;
                }
                return TickOutcome::Cancelled;
            }

            let error = match self.attempt() {
                Ok(processed) => return self.present(processed),
                Err(error) => error,
            };

            let attempt = {
                let mut state = lock(&shared.state);
                if !state.is_current(self.generation) {
                    return TickOutcome::Cancelled;
                }
                state.retries += 1;
                if state.retries < self.config.max_retries {
                    log::warn!(
                        "Frame analysis failed (attempt {}/{}): {error}",
                        state.retries,
                        self.config.max_retries
                    );
                    lock(&shared.observer).event(&LoopEvent::RetryScheduled {
                        attempt: state.retries,
                        error: error.clone(),
                    });
                }
                state.retries
            };

            if attempt >= self.config.max_retries {
                log::error!("Frame analysis failed {attempt} times in a row, stopping: {error}");
                let exhausted = LoopEvent::Exhausted(ExhaustedRetriesError {
                    attempts: attempt,
                    last_error: error,
                });
                if self.shared.finish(Some(self.generation), exhausted) {
                    return TickOutcome::Exhausted;
                }
                return TickOutcome::Cancelled;
            }

            if !self.backoff() || !self.is_current() {
                return TickOutcome::Cancelled;
            }
        }
    }

    fn is_current(&self) -> bool {
        lock(&self.shared.state).is_current(self.generation)
    }

    fn skip(&self, reason: SkipReason) -> TickOutcome {
        let state = lock(&self.shared.state);
        if state.is_current(self.generation) {
            log::trace!("Tick skipped: {reason:?}");
            lock(&self.shared.observer).event(&LoopEvent::TickSkipped(reason));
        }
        TickOutcome::Skipped(reason)
    }

    /// Pauses `retry_delay_ms`. Returns false if the run was cancelled
    /// meanwhile.
    fn backoff(&self) -> bool {
        match self.cancel.recv_timeout(self.config.retry_delay()) {
            Err(RecvTimeoutError::Timeout) => true,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    fn attempt(&mut self) -> Result<Processed, AnalysisError> {
        let started = Instant::now();
        let frame = self
            .source
            .capture()
            .map_err(|e| AnalysisError::Capture(e.to_string()))?;
        let captured = Instant::now();

        let encoded = frame
            .encode_jpeg(self.config.jpeg_quality)
            .map_err(|e| AnalysisError::Encode(e.to_string()))?;
        let encoded_at = Instant::now();

        let inputs = self.analyzer.analyze(&encoded)?;
        let analyzed = Instant::now();

        Ok(Processed {
            frame,
            faces: normalize_all(&inputs),
            timings: [
                ("capture", elapsed_ms(started, captured)),
                ("encode", elapsed_ms(captured, encoded_at)),
                ("analyze", elapsed_ms(encoded_at, analyzed)),
            ],
        })
    }

    fn present(&self, processed: Processed) -> TickOutcome {
        let overlay = Overlay::from_faces(&processed.faces);
        let faces = processed.faces.len();
        let sequence = processed.frame.sequence();

        let mut state = lock(&self.shared.state);
        if !state.is_current(self.generation) {
            log::debug!("Discarding analysis of frame {sequence} from a stopped run");
            return TickOutcome::Cancelled;
        }
        state.retries = 0;

        let render_started = Instant::now();
        if let Some(surface) = lock(&self.shared.surface).as_mut() {
            if let Err(e) = surface.render(&processed.frame, &overlay) {
                log::warn!("Failed to render overlay for frame {sequence}: {e}");
            }
        }
        let render_ms = elapsed_ms(render_started, Instant::now());

        let mut observer = lock(&self.shared.observer);
        for (stage, ms) in processed.timings {
            observer.timing(stage, ms);
        }
        observer.timing("render", render_ms);
        observer.metric("faces", faces as f64);
        observer.event(&LoopEvent::FrameAnalyzed { sequence, faces });
        log::debug!("Frame {sequence}: {faces} face(s)");
        TickOutcome::Rendered { faces }
    }
}

fn elapsed_ms(from: Instant, to: Instant) -> f64 {
    to.saturating_duration_since(from).as_secs_f64() * 1000.0
}
