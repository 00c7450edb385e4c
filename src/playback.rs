//! Frame pacing: push a frame sequence to the strip at a target rate.
//!
//! Pacing is a plain cooperative timer on the calling thread. After each frame
//! the scheduler sleeps for whatever is left of the frame budget. An overrun is
//! never paid back on later frames; it shows up in the report as a lower
//! achieved frame rate instead.

use crate::error::{LightbarError, Result};
use crate::frame::LogicalFrame;
use crate::topology::FrameSink;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Frame rate used when the requested one is out of range.
pub const DEFAULT_FPS: f64 = 30.0;

/// Highest refresh rate the strip sustains.
pub const MAX_FPS: f64 = 30.0;

/// Only the first few slow frames of a session are logged individually.
const SLOW_FRAME_LOG_LIMIT: usize = 5;

/// Coerce `fps` into `(0, MAX_FPS]`; anything else becomes [`DEFAULT_FPS`].
pub fn clamp_fps(fps: f64) -> f64 {
    if fps > 0.0 && fps <= MAX_FPS {
        fps
    } else {
        DEFAULT_FPS
    }
}

// ── Cancellation & progress ─────────────────────────────────────────

/// Hooks the scheduler calls while playing.
pub trait PlaybackObserver {
    /// Checked before every frame; `true` ends playback early.
    fn should_stop(&self) -> bool {
        false
    }

    /// Called after frame `index` (counted across passes) has been written.
    fn on_frame(&mut self, _index: usize) {}
}

impl PlaybackObserver for () {}

/// Shared flag that asks a running playback to stop before its next frame.
///
/// Clones share the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl PlaybackObserver for CancelToken {
    fn should_stop(&self) -> bool {
        self.is_cancelled()
    }
}

// ── Reports ─────────────────────────────────────────────────────────

/// Timing summary of one playback, complete or not.
#[derive(Clone, Debug, Default, PartialEq, Serialize, utoipa::ToSchema)]
pub struct PlaybackReport {
    /// Frames in one pass over the sequence
    pub frame_count: usize,
    /// Passes requested (repeat count + 1)
    pub passes: usize,
    /// Frames actually put on the wire
    pub frames_written: usize,
    /// Wall time from first write to the end of the last frame slot
    pub elapsed_secs: f64,
    /// `frame_count * passes / fps`
    pub intended_secs: f64,
    pub achieved_fps: f64,
    pub intended_fps: f64,
    /// Frames whose write alone exceeded the frame budget
    pub slow_frames: usize,
    /// Longest single frame write, in milliseconds
    pub max_write_ms: f64,
    /// Playback was preempted before finishing
    pub cancelled: bool,
}

/// Result of an unpaced throughput run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ThroughputReport {
    pub frames: usize,
    pub elapsed_secs: f64,
    pub fps: f64,
}

fn rate(frames: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { frames as f64 / secs } else { 0.0 }
}

/// Per-playback bookkeeping; lives only for one `play` call.
struct PlaybackSession {
    fps: f64,
    frame_duration: Duration,
    frame_count: usize,
    passes: usize,
    started: Instant,
    frames_written: usize,
    max_write: Duration,
    slow_frames: usize,
    cancelled: bool,
}

impl PlaybackSession {
    fn new(fps: f64, frame_count: usize, passes: usize) -> Self {
        Self {
            fps,
            frame_duration: Duration::from_secs_f64(1.0 / fps),
            frame_count,
            passes,
            started: Instant::now(),
            frames_written: 0,
            max_write: Duration::ZERO,
            slow_frames: 0,
            cancelled: false,
        }
    }

    fn record(&mut self, index: usize, write_time: Duration) {
        if write_time > self.frame_duration {
            self.slow_frames += 1;
            if self.slow_frames <= SLOW_FRAME_LOG_LIMIT {
                tracing::warn!(
                    "Frame {} took {}ms (budget: {}ms)",
                    index,
                    write_time.as_millis(),
                    self.frame_duration.as_millis()
                );
            }
        }
        self.frames_written += 1;
        self.max_write = self.max_write.max(write_time);
    }

    fn report(&self) -> PlaybackReport {
        let elapsed = self.started.elapsed();
        let frames_written = self.frames_written;
        PlaybackReport {
            frame_count: self.frame_count,
            passes: self.passes,
            frames_written,
            elapsed_secs: elapsed.as_secs_f64(),
            intended_secs: self.frame_count as f64 * self.passes as f64 / self.fps,
            achieved_fps: rate(frames_written, elapsed),
            intended_fps: self.fps,
            slow_frames: self.slow_frames,
            max_write_ms: self.max_write.as_secs_f64() * 1000.0,
            cancelled: self.cancelled,
        }
    }
}

// ── Scheduler ───────────────────────────────────────────────────────

/// Blocking, single-threaded frame pacer.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlaybackScheduler;

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Play `frames` on `sink` at `fps`, `repeat + 1` times over.
    ///
    /// Blocks for the whole playback. Frame brightness is clamped to `[0, 1]`
    /// here. On a write failure the returned
    /// [`LightbarError::PlaybackAborted`] carries the partial report; the
    /// strip keeps whatever the last successful write left on it.
    pub fn play<S, I, O>(
        &self,
        sink: &mut S,
        frames: I,
        fps: f64,
        repeat: usize,
        observer: &mut O,
    ) -> Result<PlaybackReport>
    where
        S: FrameSink + ?Sized,
        I: ExactSizeIterator<Item = LogicalFrame> + Clone,
        O: PlaybackObserver + ?Sized,
    {
        let target = clamp_fps(fps);
        if target != fps {
            tracing::debug!("Requested {} fps is out of range, using {}", fps, target);
        }

        let frame_count = frames.len();
        let passes = repeat.saturating_add(1);
        let mut session = PlaybackSession::new(target, frame_count, passes);

        tracing::info!(
            "Playing {} frames x {} pass(es) @ {} fps",
            frame_count,
            passes,
            target
        );

        'passes: for pass in 0..passes {
            for (i, frame) in frames.clone().enumerate() {
                let index = pass.saturating_mul(frame_count).saturating_add(i);
                if observer.should_stop() {
                    session.cancelled = true;
                    tracing::info!("Playback cancelled at frame {}", index);
                    break 'passes;
                }

                let brightness = frame.brightness().clamp(0.0, 1.0);
                let frame = frame.with_brightness(brightness);

                let write_start = Instant::now();
                if let Err(e) = sink.write_frame(&frame) {
                    let report = session.report();
                    tracing::error!("Playback aborted at frame {}: {}", index, e);
                    return Err(LightbarError::PlaybackAborted {
                        report,
                        source: Box::new(e),
                    });
                }
                let write_time = write_start.elapsed();

                session.record(index, write_time);
                observer.on_frame(index);

                thread::sleep(session.frame_duration.saturating_sub(write_time));
            }
        }

        let report = session.report();
        if report.slow_frames > 0 {
            tracing::warn!(
                "Playback had {} slow frames out of {}",
                report.slow_frames,
                report.frames_written
            );
        }
        tracing::info!(
            "Playback finished: {:.3}s elapsed ({:.3}s intended), {:.2} fps ({} intended)",
            report.elapsed_secs,
            report.intended_secs,
            report.achieved_fps,
            report.intended_fps
        );
        Ok(report)
    }

    /// Write `n` frames back-to-back without pacing, cycling over `frames`,
    /// and measure the sustained rate. Logs the running rate every
    /// `report_every` frames (0 disables).
    pub fn measure_throughput<S, O>(
        &self,
        sink: &mut S,
        frames: &[LogicalFrame],
        n: usize,
        report_every: usize,
        observer: &O,
    ) -> Result<ThroughputReport>
    where
        S: FrameSink + ?Sized,
        O: PlaybackObserver + ?Sized,
    {
        let started = Instant::now();
        let mut written = 0;

        for (i, frame) in frames.iter().cycle().take(n).enumerate() {
            if observer.should_stop() {
                break;
            }
            if report_every > 0 && i > 0 && i % report_every == 0 {
                tracing::info!("N={}: {:.2} fps", i, rate(i, started.elapsed()));
            }
            sink.write_frame(frame)?;
            written += 1;
        }

        let elapsed = started.elapsed();
        let report = ThroughputReport {
            frames: written,
            elapsed_secs: elapsed.as_secs_f64(),
            fps: rate(written, elapsed),
        };
        tracing::info!("{} frames in {:.2}s: {:.2} fps", written, report.elapsed_secs, report.fps);
        Ok(report)
    }
}
