use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::Sender;

use crate::analysis::domain::frame_analyzer::FrameAnalyzer;
use crate::capture::domain::video_source::VideoSource;
use crate::overlay::domain::overlay_surface::OverlaySurface;
use crate::realtime::errors::{NotReadyError, StartError};
use crate::realtime::frame_loop::{lock, LoopShared, LoopState, TickRunner};
use crate::realtime::loop_observer::{LoopEvent, LoopObserver, NullLoopObserver};
use crate::realtime::processor_config::ProcessorConfig;

struct RunHandle {
    /// Dropping it cancels the worker's ticker and any backoff pause.
    cancel: Sender<()>,
    worker: JoinHandle<()>,
}

/// Drives the live capture → analyze → overlay loop.
///
/// Each `start` spawns one worker thread that ticks every
/// `1000 / target_fps` ms. At most one analysis is in flight per processor,
/// also across a stop/start while a stopped run's request is still
/// outstanding. All methods take `&self`, so a processor can be shared with
/// a signal handler.
///
/// The loop halts on its own when one tick fails `max_retries` times in a
/// row or when the source goes inactive; the observer receives
/// [`LoopEvent::Exhausted`] or [`LoopEvent::SourceEnded`] and
/// [`is_running`](Self::is_running) turns false.
pub struct RealtimeFrameProcessor {
    shared: Arc<LoopShared>,
    run: Mutex<Option<RunHandle>>,
}

impl RealtimeFrameProcessor {
    pub fn new() -> Self {
        Self::with_observer(Box::new(NullLoopObserver))
    }

    pub fn with_observer(observer: Box<dyn LoopObserver>) -> Self {
        Self {
            shared: Arc::new(LoopShared::new(observer)),
            run: Mutex::new(None),
        }
    }

    /// Starts the loop. A no-op while already running.
    pub fn start(
        &self,
        source: Box<dyn VideoSource>,
        surface: Box<dyn OverlaySurface>,
        analyzer: Arc<dyn FrameAnalyzer>,
        config: ProcessorConfig,
    ) -> Result<(), StartError> {
        config.validate().map_err(StartError::InvalidConfig)?;

        let mut run = lock(&self.run);
        if self.shared.loop_state() == LoopState::Running {
            log::debug!("Frame loop already running, start ignored");
            return Ok(());
        }

        if !source.is_active() {
            return Err(NotReadyError::SourceInactive.into());
        }
        match source.dimensions() {
            Some((w, h)) if w > 0 && h > 0 => {}
            _ => return Err(NotReadyError::NoFrameDimensions.into()),
        }
        if !surface.is_ready() {
            return Err(NotReadyError::SurfaceNotReady.into());
        }

        if let Some(previous) = run.take() {
            reap(previous);
        }

        let Some(generation) = self.shared.begin(surface) else {
            return Ok(());
        };

        let interval = config.frame_interval();
        let (cancel, cancel_rx) = crossbeam_channel::bounded(0);
        let runner = TickRunner::new(
            Arc::clone(&self.shared),
            generation,
            source,
            analyzer,
            config,
            cancel_rx,
        );
        let ticker = crossbeam_channel::tick(interval);

        let worker = std::thread::Builder::new()
            .name("frame-loop".to_string())
            .spawn(move || runner.run(ticker));
        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => {
                self.shared.finish(Some(generation), LoopEvent::Stopped);
                return Err(StartError::Spawn(e));
            }
        };

        log::info!(
            "Frame loop started ({:.1}ms per frame)",
            interval.as_secs_f64() * 1000.0
        );
        *run = Some(RunHandle { cancel, worker });
        Ok(())
    }

    /// Halts the loop, cancels the pending tick and any backoff, clears the
    /// surface and resets counters. A no-op when idle.
    ///
    /// Does not wait for an outstanding analysis: its result is discarded
    /// when it arrives.
    pub fn stop(&self) {
        let mut run = lock(&self.run);
        if self.shared.finish(None, LoopEvent::Stopped) {
            log::info!("Frame loop stopped");
        }
        if let Some(handle) = run.take() {
            reap(handle);
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Running
    }

    pub fn state(&self) -> LoopState {
        self.shared.loop_state()
    }

    /// Whether an analysis request is outstanding, possibly from a stopped
    /// run.
    pub fn is_analysis_in_flight(&self) -> bool {
        self.shared.is_in_flight()
    }
}

impl Default for RealtimeFrameProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RealtimeFrameProcessor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Cancels a run's worker, joining it only if it has already exited.
fn reap(handle: RunHandle) {
    drop(handle.cancel);
    if handle.worker.is_finished() && handle.worker.join().is_err() {
        log::warn!("Frame loop worker panicked");
    }
}
