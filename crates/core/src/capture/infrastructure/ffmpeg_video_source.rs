use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::capture::domain::video_source::{CaptureError, VideoSource};
use crate::shared::frame::Frame;

/// Frame rate assumed when a stream does not declare one.
const FALLBACK_FPS: f64 = 30.0;

#[derive(Error, Debug)]
pub enum FfmpegSourceError {
    #[error("failed to open {input}: {message}")]
    Open { input: String, message: String },
    #[error("decoder thread exited before reporting stream info")]
    DecoderGone,
    #[error("failed to start decoder thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct StreamInfo {
    width: u32,
    height: u32,
    fps: f64,
}

/// Plays a video file or stream URL like a live camera.
///
/// A background thread decodes at the stream's native frame rate and keeps
/// only the most recent frame; `capture` copies that frame. Frames decoded
/// while nobody captures are dropped, as with a real camera. The source goes
/// inactive at end of stream or on a decode error.
///
/// All ffmpeg state lives on the decoder thread, so the source itself is
/// `Send` without any unsafe impls.
pub struct FfmpegVideoSource {
    latest: Arc<Mutex<Option<Frame>>>,
    active: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    info: StreamInfo,
    decoder: Option<JoinHandle<()>>,
}

impl FfmpegVideoSource {
    /// Opens `input` (a path or any URL ffmpeg understands) and starts
    /// decoding. Returns once the stream header has been read.
    pub fn open(input: &str) -> Result<Self, FfmpegSourceError> {
        let latest = Arc::new(Mutex::new(None));
        let active = Arc::new(AtomicBool::new(true));
        let shutdown = Arc::new(AtomicBool::new(false));
        let (info_tx, info_rx) = crossbeam_channel::bounded::<Result<StreamInfo, String>>(1);

        let decoder = {
            let input = input.to_string();
            let latest = latest.clone();
            let active = active.clone();
            let shutdown = shutdown.clone();
            spawn_decoder(move || {
                if let Err(e) = run_decoder(&input, &info_tx, &latest, &shutdown) {
                    // Open errors were already reported through info_tx.
                    log::warn!("Video source {input} stopped: {e}");
                }
                active.store(false, Ordering::Release);
            })?
        };

        let info = match info_rx.recv() {
            Ok(Ok(info)) => info,
            Ok(Err(message)) => {
                let _ = decoder.join();
                return Err(FfmpegSourceError::Open {
                    input: input.to_string(),
                    message,
                });
            }
            Err(_) => {
                let _ = decoder.join();
                return Err(FfmpegSourceError::DecoderGone);
            }
        };

        log::info!(
            "Opened video source {input}: {}x{} @ {:.1} fps",
            info.width,
            info.height,
            info.fps
        );

        Ok(Self {
            latest,
            active,
            shutdown,
            info,
            decoder: Some(decoder),
        })
    }

    pub fn fps(&self) -> f64 {
        self.info.fps
    }
}

impl VideoSource for FfmpegVideoSource {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        let latest = self.latest.lock().ok()?;
        match latest.as_ref() {
            Some(frame) => Some(frame.dimensions()),
            None => Some((self.info.width, self.info.height)),
        }
    }

    fn capture(&mut self) -> Result<Frame, CaptureError> {
        let latest = self
            .latest
            .lock()
            .map_err(|_| "video source frame lock poisoned")?;
        latest
            .clone()
            .ok_or_else(|| "no frame decoded yet".into())
    }
}

impl Drop for FfmpegVideoSource {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.decoder.take() {
            let _ = handle.join();
        }
    }
}

fn run_decoder(
    input: &str,
    info_tx: &crossbeam_channel::Sender<Result<StreamInfo, String>>,
    latest: &Mutex<Option<Frame>>,
    shutdown: &AtomicBool,
) -> Result<(), Box<dyn std::error::Error>> {
    let opened = open_input(input);
    let (mut ictx, mut decoder, mut scaler, stream_index, info) = match opened {
        Ok(parts) => parts,
        Err(e) => {
            let _ = info_tx.send(Err(e.to_string()));
            return Ok(());
        }
    };
    let _ = info_tx.send(Ok(info));

    let frame_interval = Duration::from_secs_f64(1.0 / info.fps);
    let mut pacer = Pacer::new(frame_interval);
    let mut sequence: u64 = 0;

    let mut publish = |decoder: &mut ffmpeg_next::decoder::Video,
                       scaler: &mut ffmpeg_next::software::scaling::Context|
     -> Result<bool, Box<dyn std::error::Error>> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        while decoder.receive_frame(&mut decoded).is_ok() {
            if shutdown.load(Ordering::Acquire) {
                return Ok(false);
            }
            let mut rgb = ffmpeg_next::util::frame::video::Video::empty();
            scaler.run(&decoded, &mut rgb)?;
            let frame = Frame::new(
                extract_rgb_pixels(&rgb, info.width, info.height),
                info.width,
                info.height,
                sequence,
            );
            sequence += 1;
            if let Ok(mut slot) = latest.lock() {
                *slot = Some(frame);
            }
            pacer.wait();
        }
        Ok(true)
    };

    for (stream, packet) in ictx.packets() {
        if shutdown.load(Ordering::Acquire) {
            return Ok(());
        }
        if stream.index() != stream_index {
            continue;
        }
        if decoder.send_packet(&packet).is_err() {
            continue;
        }
        if !publish(&mut decoder, &mut scaler)? {
            return Ok(());
        }
    }

    let _ = decoder.send_eof();
    publish(&mut decoder, &mut scaler)?;
    log::debug!("Video source {input} reached end of stream after {sequence} frames");
    Ok(())
}

type OpenedInput = (
    ffmpeg_next::format::context::Input,
    ffmpeg_next::decoder::Video,
    ffmpeg_next::software::scaling::Context,
    usize,
    StreamInfo,
);

fn spawn_decoder<F>(body: F) -> Result<JoinHandle<()>, FfmpegSourceError>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name("video-decoder".to_string())
        .spawn(body)
        .map_err(FfmpegSourceError::Spawn)
}

fn open_input(input: &str) -> Result<OpenedInput, Box<dyn std::error::Error>> {
    ffmpeg_next::init()?;
    let ictx = ffmpeg_next::format::input(&input)?;

    let stream = ictx
        .streams()
        .best(ffmpeg_next::media::Type::Video)
        .ok_or("No video stream found")?;
    let stream_index = stream.index();

    let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
    let decoder = codec_ctx.decoder().video()?;

    let rate = stream.rate();
    let fps = if rate.denominator() != 0 && rate.numerator() > 0 {
        rate.numerator() as f64 / rate.denominator() as f64
    } else {
        FALLBACK_FPS
    };

    let width = decoder.width();
    let height = decoder.height();
    let scaler = ffmpeg_next::software::scaling::Context::get(
        decoder.format(),
        width,
        height,
        ffmpeg_next::format::Pixel::RGB24,
        width,
        height,
        ffmpeg_next::software::scaling::Flags::BILINEAR,
    )?;

    Ok((
        ictx,
        decoder,
        scaler,
        stream_index,
        StreamInfo { width, height, fps },
    ))
}

/// Sleeps so that successive `wait` calls return one interval apart,
/// without accumulating drift from decode time.
struct Pacer {
    interval: Duration,
    next_due: Option<Instant>,
}

impl Pacer {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    fn wait(&mut self) {
        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        if due > now {
            std::thread::sleep(due - now);
        }
        // Fall behind gracefully: never schedule in the past.
        self.next_due = Some(due.max(now) + self.interval);
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// stripping per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    fn write_test_image(dir: &Path, width: u32, height: u32) -> PathBuf {
        let path = dir.join("source.png");
        let mut img = image::RgbImage::new(width, height);
        for pixel in img.pixels_mut() {
            *pixel = image::Rgb([50, 100, 200]);
        }
        img.save(&path).unwrap();
        path
    }

    fn wait_for_frame(source: &mut FfmpegVideoSource) -> Frame {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Ok(frame) = source.capture() {
                return frame;
            }
            assert!(Instant::now() < deadline, "no frame decoded in time");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_decoder_runs_on_named_thread() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let handle = spawn_decoder(move || {
            let _ = tx.send(std::thread::current().name().map(str::to_string));
        })
        .unwrap();
        handle.join().unwrap();
        assert_eq!(rx.recv().unwrap().as_deref(), Some("video-decoder"));
    }

    #[test]
    fn test_spawn_error_keeps_io_cause() {
        let error = FfmpegSourceError::Spawn(std::io::Error::other("no threads left"));
        assert_eq!(
            error.to_string(),
            "failed to start decoder thread: no threads left"
        );
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_open_nonexistent_fails() {
        let result = FfmpegVideoSource::open("/nonexistent/source.mp4");
        assert!(matches!(result, Err(FfmpegSourceError::Open { .. })));
    }

    #[test]
    fn test_open_reports_stream_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_image(dir.path(), 64, 48);
        let source = FfmpegVideoSource::open(path.to_str().unwrap()).unwrap();
        assert_eq!(source.dimensions(), Some((64, 48)));
        assert!(source.fps() > 0.0);
    }

    #[test]
    fn test_capture_returns_decoded_rgb_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_image(dir.path(), 64, 48);
        let mut source = FfmpegVideoSource::open(path.to_str().unwrap()).unwrap();

        let frame = wait_for_frame(&mut source);
        assert_eq!(frame.dimensions(), (64, 48));
        assert_eq!(frame.data().len(), 64 * 48 * 3);
        assert_eq!(&frame.data()[..3], &[50, 100, 200]);
    }

    #[test]
    fn test_goes_inactive_at_end_of_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_image(dir.path(), 16, 16);
        let mut source = FfmpegVideoSource::open(path.to_str().unwrap()).unwrap();
        wait_for_frame(&mut source);

        let deadline = Instant::now() + Duration::from_secs(5);
        while source.is_active() {
            assert!(Instant::now() < deadline, "source never ended");
            std::thread::sleep(Duration::from_millis(10));
        }
        // The last frame stays available after the stream ends.
        assert!(source.capture().is_ok());
    }

    #[test]
    fn test_pacer_spaces_waits_by_interval() {
        let mut pacer = Pacer::new(Duration::from_millis(20));
        let start = Instant::now();
        pacer.wait();
        pacer.wait();
        pacer.wait();
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
