//! Render thread: owns the lightbar and executes commands one at a time.
//!
//! The transports cannot be shared, so every hardware write happens on this
//! thread. The async HTTP server talks to it through a [`RenderHandle`], which
//! queues a `RenderCommand` on an `mpsc` channel.
//!
//! ## Preemption
//! Every queued command counts as pending until the render thread receives
//! it. A running playback checks that count before each frame and stops as
//! soon as anything is waiting, so a new request never waits for a long
//! image to finish. When several commands pile up, only the newest runs.

use crate::error::LightbarError;
use crate::lightbar::{DisplaySettings, Lightbar};
use crate::playback::{PlaybackObserver, PlaybackReport};
use crate::sequencer::ImageSequencer;
use crate::transport::Transport;
use image::RgbImage;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

// ── Commands ─────────────────────────────────────────────────────────

/// Commands sent from the HTTP server to the render thread.
pub enum RenderCommand {
    /// Play a prepared image, one column per frame
    Display {
        name: String,
        image: RgbImage,
        settings: DisplaySettings,
    },
    /// Write one all-dark frame
    TurnOff,
    /// Stop current playback and go idle, leaving the strip as it is
    Stop,
}

// ── Status ───────────────────────────────────────────────────────────

/// What the lightbar is currently doing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DisplayState {
    Idle,
    Displaying,
}

/// Shared status: the render thread writes, HTTP handlers read.
#[derive(Clone, Debug, Serialize, utoipa::ToSchema)]
pub struct DisplayStatus {
    pub state: DisplayState,
    /// Image being displayed, if any
    pub current_image: Option<String>,
    /// Frame index across all passes
    pub frame: Option<usize>,
    /// Frames across all passes
    pub total_frames: Option<usize>,
    /// Timing of the most recent image playback
    pub last_report: Option<PlaybackReport>,
    /// Most recent hardware or playback error
    pub last_error: Option<String>,
    /// Server version
    pub version: String,
}

impl DisplayStatus {
    pub fn new() -> Self {
        Self {
            state: DisplayState::Idle,
            current_image: None,
            frame: None,
            total_frames: None,
            last_report: None,
            last_error: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn set_idle(&mut self) {
        self.state = DisplayState::Idle;
        self.current_image = None;
        self.frame = None;
        self.total_frames = None;
    }
}

impl Default for DisplayStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock the status, recovering it if a holder panicked.
pub fn lock_status(status: &Mutex<DisplayStatus>) -> MutexGuard<'_, DisplayStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Handle ───────────────────────────────────────────────────────────

/// The render thread has exited; nothing can reach the hardware any more.
#[derive(Debug, thiserror::Error)]
#[error("render thread is gone")]
pub struct RenderThreadGone;

/// Cloneable sending side of the render thread.
#[derive(Clone)]
pub struct RenderHandle {
    tx: Sender<RenderCommand>,
    pending: Arc<AtomicUsize>,
}

impl RenderHandle {
    /// Queue `cmd`, preempting whatever is playing.
    pub fn send(&self, cmd: RenderCommand) -> Result<(), RenderThreadGone> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.tx.send(cmd).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            RenderThreadGone
        })
    }
}

/// Start the render thread. It runs until every [`RenderHandle`] is dropped.
pub fn spawn<T>(lightbar: Lightbar<T>, status: Arc<Mutex<DisplayStatus>>) -> (RenderHandle, JoinHandle<()>)
where
    T: Transport + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let pending = Arc::new(AtomicUsize::new(0));
    let handle = RenderHandle {
        tx,
        pending: pending.clone(),
    };
    let join = thread::spawn(move || render_loop(lightbar, rx, pending, status));
    (handle, join)
}

/// Stops playback once a command is waiting; mirrors progress into the status.
struct RenderObserver<'a> {
    pending: &'a AtomicUsize,
    status: &'a Mutex<DisplayStatus>,
}

impl PlaybackObserver for RenderObserver<'_> {
    fn should_stop(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }

    fn on_frame(&mut self, index: usize) {
        lock_status(self.status).frame = Some(index);
    }
}

// ── Render loop ──────────────────────────────────────────────────────

/// Main render loop. Returns when the channel closes.
pub fn render_loop<T: Transport>(
    mut lightbar: Lightbar<T>,
    rx: Receiver<RenderCommand>,
    pending: Arc<AtomicUsize>,
    status: Arc<Mutex<DisplayStatus>>,
) {
    tracing::info!(
        "Render thread started ({} pixels), waiting for commands...",
        lightbar.total_pixels()
    );

    loop {
        let mut cmd = match rx.recv() {
            Ok(cmd) => cmd,
            Err(_) => {
                tracing::info!("Render thread: channel closed, shutting down.");
                break;
            }
        };
        pending.fetch_sub(1, Ordering::SeqCst);

        // Only the newest queued command matters.
        while let Ok(newer) = rx.try_recv() {
            pending.fetch_sub(1, Ordering::SeqCst);
            cmd = newer;
        }

        match cmd {
            RenderCommand::Stop => {
                lock_status(&status).set_idle();
            }

            RenderCommand::TurnOff => {
                match lightbar.turn_off() {
                    Ok(_) => tracing::info!("Lightbar turned off"),
                    Err(e) => {
                        tracing::error!("Failed to turn off lightbar: {}", e);
                        lock_status(&status).last_error = Some(e.to_string());
                    }
                }
                lock_status(&status).set_idle();
            }

            RenderCommand::Display {
                name,
                image,
                settings,
            } => {
                let sequencer = ImageSequencer::from_resized(image);
                let total = sequencer
                    .frame_count()
                    .saturating_mul(settings.repeat.saturating_add(1));
                {
                    let mut s = lock_status(&status);
                    s.state = DisplayState::Displaying;
                    s.current_image = Some(name.clone());
                    s.frame = Some(0);
                    s.total_frames = Some(total);
                }

                tracing::info!(
                    "Displaying {}: {} frames @ {} fps, brightness {}",
                    name,
                    total,
                    settings.fps,
                    settings.brightness
                );

                let mut observer = RenderObserver {
                    pending: &pending,
                    status: &status,
                };
                let outcome = lightbar.display_image(&sequencer, &settings, &mut observer);

                let mut s = lock_status(&status);
                match outcome {
                    Ok(report) => {
                        s.last_report = Some(report);
                        s.last_error = None;
                    }
                    Err(LightbarError::PlaybackAborted { report, source }) => {
                        tracing::error!(
                            "Display of {} aborted after {} frames: {}",
                            name,
                            report.frames_written,
                            source
                        );
                        s.last_report = Some(report);
                        s.last_error = Some(source.to_string());
                    }
                    Err(e) => {
                        tracing::error!("Failed to display {}: {}", name, e);
                        s.last_error = Some(e.to_string());
                    }
                }
                s.set_idle();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelMapping, Direction, LightbarConfig, SegmentConfig};
    use crate::topology::SegmentTopology;
    use crate::transport::testing::{FailingTransport, RecordingTransport};
    use image::Rgb;
    use std::time::{Duration, Instant};

    fn config(pixels: usize) -> LightbarConfig {
        LightbarConfig::new(
            pixels,
            vec![SegmentConfig {
                address: "a".to_string(),
                pixel_count: pixels,
                direction: Direction::Forward,
            }],
            1_000_000,
            ChannelMapping::rgb(),
        )
        .unwrap()
    }

    fn start(
        transport: RecordingTransport,
    ) -> (RenderHandle, JoinHandle<()>, Arc<Mutex<DisplayStatus>>) {
        let topology = SegmentTopology::new(&config(3), vec![transport]).unwrap();
        let status = Arc::new(Mutex::new(DisplayStatus::new()));
        let (handle, join) = spawn(Lightbar::new(topology), status.clone());
        (handle, join, status)
    }

    fn display(width: u32) -> RenderCommand {
        RenderCommand::Display {
            name: "test".to_string(),
            image: RgbImage::from_pixel(width, 3, Rgb([255, 255, 255])),
            settings: DisplaySettings::default(),
        }
    }

    #[test]
    fn plays_an_image_then_goes_idle() {
        let transport = RecordingTransport::new();
        let (handle, join, status) = start(transport.clone());

        handle.send(display(4)).unwrap();
        drop(handle);
        join.join().unwrap();

        assert_eq!(transport.sent().len(), 4);
        let s = lock_status(&status);
        assert_eq!(s.state, DisplayState::Idle);
        assert_eq!(s.last_report.as_ref().map(|r| r.frames_written), Some(4));
    }

    #[test]
    fn new_command_preempts_long_playback() {
        let transport = RecordingTransport::new();
        let (handle, join, status) = start(transport.clone());

        let started = Instant::now();
        handle.send(display(300)).unwrap(); // ten seconds at 30 fps
        thread::sleep(Duration::from_millis(200));
        handle.send(RenderCommand::TurnOff).unwrap();
        drop(handle);
        join.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        let sent = transport.sent();
        assert!(sent.len() < 300);
        // The last thing on the wire is the dark frame.
        let black = crate::framer::wrap(vec![[0xFF, 0, 0, 0]; 3]);
        assert_eq!(sent.last(), Some(&black));
        assert!(lock_status(&status).last_report.as_ref().unwrap().cancelled);
    }

    #[test]
    fn endless_repeat_is_preemptible() {
        let transport = RecordingTransport::new();
        let (handle, join, status) = start(transport.clone());

        handle
            .send(RenderCommand::Display {
                name: "loop".to_string(),
                image: RgbImage::from_pixel(2, 3, Rgb([255, 0, 0])),
                settings: DisplaySettings {
                    repeat: usize::MAX,
                    ..DisplaySettings::default()
                },
            })
            .unwrap();
        thread::sleep(Duration::from_millis(200));
        {
            let s = lock_status(&status);
            assert_eq!(s.state, DisplayState::Displaying);
            assert_eq!(s.total_frames, Some(usize::MAX));
        }

        handle.send(RenderCommand::TurnOff).unwrap();
        drop(handle);
        join.join().unwrap();

        assert_eq!(lock_status(&status).state, DisplayState::Idle);
        assert!(lock_status(&status).last_report.as_ref().unwrap().cancelled);
    }

    #[test]
    fn write_failure_is_recorded_in_status() {
        let topology =
            SegmentTopology::new(&config(3), vec![FailingTransport { ok_writes: 1 }]).unwrap();
        let status = Arc::new(Mutex::new(DisplayStatus::new()));
        let (handle, join) = spawn(Lightbar::new(topology), status.clone());

        handle.send(display(5)).unwrap();
        drop(handle);
        join.join().unwrap();

        let s = lock_status(&status);
        assert_eq!(s.state, DisplayState::Idle);
        assert_eq!(s.last_report.as_ref().map(|r| r.frames_written), Some(1));
        assert!(s.last_error.as_deref().unwrap().contains("segment 0"));
    }

    #[test]
    fn sending_after_shutdown_fails() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let handle = RenderHandle {
            tx,
            pending: Arc::new(AtomicUsize::new(0)),
        };
        assert!(handle.send(RenderCommand::Stop).is_err());
        assert_eq!(handle.pending.load(Ordering::SeqCst), 0);
    }
}
