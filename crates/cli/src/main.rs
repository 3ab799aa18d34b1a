use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;

use facewatch_core::analysis::domain::frame_analyzer::FrameAnalyzer;
use facewatch_core::analysis::infrastructure::http_frame_analyzer::HttpFrameAnalyzer;
use facewatch_core::capture::domain::video_source::{wait_for_frame, VideoSource};
use facewatch_core::capture::infrastructure::ffmpeg_video_source::FfmpegVideoSource;
use facewatch_core::capture::infrastructure::still_image_source::StillImageSource;
use facewatch_core::overlay::infrastructure::image_file_surface::ImageFileSurface;
use facewatch_core::overlay::infrastructure::raster_surface::RasterSurface;
use facewatch_core::pipeline::snapshot_use_case::SnapshotUseCase;
use facewatch_core::realtime::loop_observer::{
    ChannelLoopObserver, CompositeLoopObserver, LoopEvent, LoopObserver, StatsLoopObserver,
};
use facewatch_core::realtime::processor_config::ProcessorConfig;
use facewatch_core::realtime::realtime_frame_processor::RealtimeFrameProcessor;
use facewatch_core::shared::constants::{
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SERVICE_URL, IMAGE_EXTENSIONS,
};

/// How long a freshly opened source may take to produce its first frame.
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(10);
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Live face recognition against a remote service.
#[derive(Parser)]
#[command(name = "facewatch")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the real-time loop until interrupted or the source ends.
    Live {
        /// Video file, stream URL, or image file.
        source: String,

        /// Image file continuously updated with the annotated frame.
        #[arg(long)]
        output: PathBuf,

        /// Stop after this many seconds.
        #[arg(long)]
        duration_secs: Option<u64>,

        #[command(flatten)]
        common: CommonArgs,
    },
    /// Analyze a single frame and write the annotated image.
    Snapshot {
        /// Video file, stream URL, or image file.
        source: String,

        /// Annotated image to write.
        #[arg(long)]
        output: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// JSON file with loop settings (defaults to the user config dir).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target frames per second.
    #[arg(long)]
    fps: Option<u32>,

    /// Consecutive failures per frame before the loop stops.
    #[arg(long)]
    max_retries: Option<u32>,

    /// Pause between retries in milliseconds.
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// JPEG quality of uploaded frames (1-100).
    #[arg(long)]
    jpeg_quality: Option<u8>,

    /// Base URL of the recognition service.
    #[arg(long, default_value = DEFAULT_SERVICE_URL)]
    service_url: String,

    /// Request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// TrueType/OpenType font for face labels. Without it only boxes are drawn.
    #[arg(long)]
    font: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Live {
            source,
            output,
            duration_secs,
            common,
        } => run_live(&source, &output, duration_secs.map(Duration::from_secs), &common),
        Command::Snapshot {
            source,
            output,
            common,
        } => run_snapshot(&source, &output, &common),
    }
}

fn run_live(
    source: &str,
    output: &Path,
    duration: Option<Duration>,
    common: &CommonArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(common, default_config_path())?;
    let analyzer = build_analyzer(common)?;
    let surface = build_surface(output, common)?;
    let mut source = open_source(source)?;
    wait_for_frame(source.as_mut(), FIRST_FRAME_TIMEOUT)
        .map_err(|e| format!("No frame from source: {e}"))?;

    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let observers: Vec<Box<dyn LoopObserver>> = vec![
        Box::new(StatsLoopObserver::default()),
        Box::new(ChannelLoopObserver::new(event_tx)),
    ];
    let observer = CompositeLoopObserver::new(observers);
    let processor = Arc::new(RealtimeFrameProcessor::with_observer(Box::new(observer)));

    {
        let processor = Arc::clone(&processor);
        ctrlc::set_handler(move || processor.stop())?;
    }

    processor.start(source, Box::new(surface), analyzer, config)?;
    log::info!("Writing annotated frames to {}", output.display());

    let started = Instant::now();
    let last = loop {
        match event_rx.recv_timeout(EVENT_POLL_INTERVAL) {
            Ok(event) => {
                report(&event);
                if event.is_terminal() {
                    break Some(event);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break None,
        }
        if duration.is_some_and(|d| started.elapsed() >= d) {
            processor.stop();
        }
    };

    match last {
        Some(LoopEvent::Exhausted(e)) => Err(e.into()),
        _ => Ok(()),
    }
}

fn report(event: &LoopEvent) {
    match event {
        LoopEvent::Started => eprintln!("Live recognition started (Ctrl-C to stop)"),
        LoopEvent::FrameAnalyzed { sequence, faces } => {
            log::debug!("Frame {sequence}: {faces} face(s)");
        }
        LoopEvent::TickSkipped(_) => {}
        LoopEvent::RetryScheduled { attempt, error } => {
            eprintln!("Analysis failed (attempt {attempt}): {error}");
        }
        // Reported as the command's error.
        LoopEvent::Exhausted(_) => {}
        LoopEvent::SourceEnded => eprintln!("Video source ended"),
        LoopEvent::Stopped => eprintln!("Stopped"),
    }
}

fn run_snapshot(
    source: &str,
    output: &Path,
    common: &CommonArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(common, default_config_path())?;
    let analyzer = build_analyzer(common)?;
    let surface = build_surface(output, common)?;
    let source = open_source(source)?;

    let mut use_case = SnapshotUseCase::new(
        source,
        Box::new(surface),
        analyzer,
        config.jpeg_quality,
        FIRST_FRAME_TIMEOUT,
    );
    let faces = use_case.execute()?;

    if faces.is_empty() {
        println!("No faces found");
    }
    for face in &faces {
        println!("{}", face.label_text());
    }
    log::info!("Output written to {}", output.display());
    Ok(())
}

fn build_analyzer(common: &CommonArgs) -> Result<Arc<dyn FrameAnalyzer>, Box<dyn std::error::Error>> {
    let analyzer =
        HttpFrameAnalyzer::new(&common.service_url, Duration::from_secs(common.timeout_secs))?;
    log::info!("Using recognition service at {}", analyzer.search_url());
    Ok(Arc::new(analyzer))
}

fn build_surface(
    output: &Path,
    common: &CommonArgs,
) -> Result<ImageFileSurface, Box<dyn std::error::Error>> {
    let raster = match &common.font {
        Some(path) => RasterSurface::with_font(RasterSurface::load_font(path)?),
        None => {
            log::warn!("No --font given, face labels will not be drawn");
            RasterSurface::new()
        }
    };
    Ok(ImageFileSurface::new(output, raster)?)
}

fn open_source(source: &str) -> Result<Box<dyn VideoSource>, Box<dyn std::error::Error>> {
    let path = Path::new(source);
    if is_image(path) {
        if !path.exists() {
            return Err(format!("Input file not found: {}", path.display()).into());
        }
        Ok(Box::new(StillImageSource::open(path)?))
    } else {
        Ok(Box::new(FfmpegVideoSource::open(source)?))
    }
}

/// File settings first, then flags on top. An explicit `--config` must
/// exist; the default location is optional.
fn resolve_config(
    common: &CommonArgs,
    default_path: Option<PathBuf>,
) -> Result<ProcessorConfig, Box<dyn std::error::Error>> {
    let mut config = match (&common.config, default_path) {
        (Some(path), _) => ProcessorConfig::load(path)?,
        (None, Some(path)) if path.is_file() => {
            log::info!("Loading config from {}", path.display());
            ProcessorConfig::load(&path)?
        }
        _ => ProcessorConfig::default(),
    };

    if let Some(fps) = common.fps {
        config.target_fps = fps;
    }
    if let Some(retries) = common.max_retries {
        config.max_retries = retries;
    }
    if let Some(delay) = common.retry_delay_ms {
        config.retry_delay_ms = delay;
    }
    if let Some(quality) = common.jpeg_quality {
        config.jpeg_quality = quality;
    }
    config.validate()?;
    Ok(config)
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("facewatch").join("config.json"))
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
