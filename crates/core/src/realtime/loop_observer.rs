use std::collections::HashMap;
use std::time::Instant;

use crossbeam_channel::Sender;

use crate::analysis::domain::frame_analyzer::AnalysisError;
use crate::realtime::errors::ExhaustedRetriesError;

/// Why a tick did no work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// A previous analysis has not returned yet.
    InFlight,
    /// Less than one frame interval since the last processed frame.
    TooSoon,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LoopEvent {
    Started,
    TickSkipped(SkipReason),
    FrameAnalyzed { sequence: u64, faces: usize },
    RetryScheduled { attempt: u32, error: AnalysisError },
    /// The loop halted because one tick used up its retry budget.
    Exhausted(ExhaustedRetriesError),
    /// The loop halted because the video source went inactive.
    SourceEnded,
    Stopped,
}

impl LoopEvent {
    /// Whether the loop is Idle after this event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoopEvent::Exhausted(_) | LoopEvent::SourceEnded | LoopEvent::Stopped
        )
    }
}

/// Receives everything the frame loop reports.
///
/// Callbacks run on the loop's worker thread (or the caller of `stop()`)
/// while the processor's state is locked. They must not call back into the
/// processor.
pub trait LoopObserver: Send {
    fn event(&mut self, event: &LoopEvent);

    /// How long a named stage took for one processed frame.
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}

    fn metric(&mut self, _name: &str, _value: f64) {}

    /// Emitted whenever the loop returns to Idle. Default: no-op.
    fn summary(&self) {}
}

pub struct NullLoopObserver;

impl LoopObserver for NullLoopObserver {
    fn event(&mut self, _event: &LoopEvent) {}
}

/// Running count, sum and maximum of one series of samples.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aggregate {
    pub count: usize,
    pub total: f64,
    pub max: f64,
}

impl Aggregate {
    fn record(&mut self, value: f64) {
        self.count += 1;
        self.total += value;
        self.max = if self.count == 1 {
            value
        } else {
            self.max.max(value)
        };
    }

    pub fn mean(&self) -> f64 {
        self.total / self.count.max(1) as f64
    }
}

/// Tracks per-stage timing and tick counters for the current run and logs
/// a report when the loop halts. Counters reset on every `Started`.
///
/// A progress line is logged every `throttle_frames` analyzed frames.
pub struct StatsLoopObserver {
    throttle_frames: usize,
    timings: HashMap<String, Aggregate>,
    metrics: HashMap<String, Aggregate>,
    skipped: HashMap<SkipReason, usize>,
    start_time: Instant,
    frames: usize,
    retries: usize,
}

impl StatsLoopObserver {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            skipped: HashMap::new(),
            start_time: Instant::now(),
            frames: 0,
            retries: 0,
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn retries(&self) -> usize {
        self.retries
    }

    pub fn skipped(&self, reason: SkipReason) -> usize {
        self.skipped.get(&reason).copied().unwrap_or(0)
    }

    pub fn timings_for(&self, stage: &str) -> Option<Aggregate> {
        self.timings.get(stage).copied()
    }

    pub fn metrics_for(&self, name: &str) -> Option<Aggregate> {
        self.metrics.get(name).copied()
    }

    fn reset(&mut self) {
        self.timings.clear();
        self.metrics.clear();
        self.skipped.clear();
        self.frames = 0;
        self.retries = 0;
        self.start_time = Instant::now();
    }

    /// Returns the formatted report, or `None` if no frame was analyzed and
    /// no retry happened.
    pub fn summary_string(&self) -> Option<String> {
        if self.frames == 0 && self.retries == 0 {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let mut lines = vec![format!(
            "Loop summary ({} frames, {:.1}s):",
            self.frames,
            elapsed_ms / 1000.0
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let avg_ms = durations.mean();
            let max_ms = durations.max;
            lines.push(format!(
                "  {stage:8}: avg {avg_ms:6.1}ms  max {max_ms:6.1}ms"
            ));
        }

        let mut metric_names: Vec<_> = self.metrics.keys().collect();
        metric_names.sort();
        for name in metric_names {
            let avg = self.metrics[name].mean();
            lines.push(format!("  {name}: avg {avg:.1}"));
        }

        lines.push(format!(
            "  Skipped: {} in flight, {} too soon; retries: {}",
            self.skipped(SkipReason::InFlight),
            self.skipped(SkipReason::TooSoon),
            self.retries
        ));

        if self.frames > 0 && elapsed_ms > 0.0 {
            let fps = self.frames as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }
}

impl Default for StatsLoopObserver {
    fn default() -> Self {
        Self::new(100)
    }
}

impl LoopObserver for StatsLoopObserver {
    fn event(&mut self, event: &LoopEvent) {
        match event {
            LoopEvent::Started => self.reset(),
            LoopEvent::TickSkipped(reason) => *self.skipped.entry(*reason).or_default() += 1,
            LoopEvent::FrameAnalyzed { .. } => {
                self.frames += 1;
                if self.frames % self.throttle_frames == 0 {
                    log::info!("Analyzed {} frames", self.frames);
                }
            }
            LoopEvent::RetryScheduled { .. } => self.retries += 1,
            LoopEvent::Exhausted(_) | LoopEvent::SourceEnded | LoopEvent::Stopped => {}
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .record(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .record(value);
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

/// Forwards every event to a channel. Send failures (receiver gone) are
/// ignored.
pub struct ChannelLoopObserver {
    sender: Sender<LoopEvent>,
}

impl ChannelLoopObserver {
    pub fn new(sender: Sender<LoopEvent>) -> Self {
        Self { sender }
    }
}

impl LoopObserver for ChannelLoopObserver {
    fn event(&mut self, event: &LoopEvent) {
        let _ = self.sender.send(event.clone());
    }
}

/// Fans out to several observers in order.
pub struct CompositeLoopObserver {
    observers: Vec<Box<dyn LoopObserver>>,
}

impl CompositeLoopObserver {
    pub fn new(observers: Vec<Box<dyn LoopObserver>>) -> Self {
        Self { observers }
    }
}

impl LoopObserver for CompositeLoopObserver {
    fn event(&mut self, event: &LoopEvent) {
        for observer in &mut self.observers {
            observer.event(event);
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        for observer in &mut self.observers {
            observer.timing(stage, duration_ms);
        }
    }

    fn metric(&mut self, name: &str, value: f64) {
        for observer in &mut self.observers {
            observer.metric(name, value);
        }
    }

    fn summary(&self) {
        for observer in &self.observers {
            observer.summary();
        }
    }
}
