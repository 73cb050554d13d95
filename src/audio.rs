//! Audio-sync gate
//!
//! Keeps the transcript and the game-over screen in step with the
//! guardian's voice:
//! - a reply with audio is shown when playback *starts*, and a terminal
//!   outcome is committed when playback *ends*
//! - a reply without audio is shown at once, and the commit waits a
//!   reading-time delay
//! - playback failure shows the text at once and commits after a grace delay
//!
//! Every wait is bounded, so a broken sink can delay the outcome but never
//! withhold it. Only one playback exists at a time; presenting a new line
//! stops the previous one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AudioConfig;

/// Lifecycle event reported by a sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started,
    Ended,
    Failed(String),
}

/// The gate's end of one playback.
pub struct Playback {
    events: mpsc::UnboundedReceiver<PlaybackEvent>,
    cancel: CancellationToken,
}

/// The sink's end of one playback: report progress, watch for stop.
#[derive(Clone)]
pub struct PlaybackControl {
    tx: mpsc::UnboundedSender<PlaybackEvent>,
    cancel: CancellationToken,
}

impl Playback {
    /// Create a connected playback pair for a sink to drive.
    pub fn channel() -> (PlaybackControl, Playback) {
        let (tx, events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        (
            PlaybackControl {
                tx,
                cancel: cancel.clone(),
            },
            Playback { events, cancel },
        )
    }

    /// A playback that failed before it began.
    pub fn failed(reason: impl Into<String>) -> Playback {
        let (control, playback) = Self::channel();
        control.failed(reason);
        playback
    }

    /// Ask the sink to stop. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Next event; a closed channel counts as failure.
    async fn next_event(&mut self) -> PlaybackEvent {
        self.events
            .recv()
            .await
            .unwrap_or_else(|| PlaybackEvent::Failed("playback channel closed".to_string()))
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl PlaybackControl {
    pub fn started(&self) {
        let _ = self.tx.send(PlaybackEvent::Started);
    }

    pub fn ended(&self) {
        let _ = self.tx.send(PlaybackEvent::Ended);
    }

    pub fn failed(&self, reason: impl Into<String>) {
        let _ = self.tx.send(PlaybackEvent::Failed(reason.into()));
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the gate stops this playback.
    pub async fn stopped(&self) {
        self.cancel.cancelled().await
    }
}

/// Something that can play a voice line from a URL.
pub trait AudioSink: Send + Sync {
    fn play(&self, url: &str) -> Playback;
}

/// Plays lines through an external command (e.g. `mpv --really-quiet`),
/// with the URL appended as the final argument.
pub struct CommandSink {
    program: String,
    args: Vec<String>,
}

impl CommandSink {
    /// Build from a configured command line; `None` if it is empty.
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl AudioSink for CommandSink {
    fn play(&self, url: &str) -> Playback {
        let (control, playback) = Playback::channel();

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .arg(url)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        let program = self.program.clone();
        tokio::spawn(async move {
            let mut child = match cmd.spawn() {
                Ok(child) => child,
                Err(e) => {
                    warn!(player = %program, error = %e, "failed to spawn audio player");
                    control.failed(format!("failed to spawn {}: {}", program, e));
                    return;
                }
            };
            control.started();

            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) if status.success() => control.ended(),
                    Ok(status) => control.failed(format!("{} exited with {}", program, status)),
                    Err(e) => control.failed(e.to_string()),
                },
                _ = control.stopped() => {
                    debug!(player = %program, "stopping playback");
                    let _ = child.kill().await;
                }
            }
        });

        playback
    }
}

/// Narration pacing limits
#[derive(Debug, Clone, Copy)]
pub struct GateTiming {
    pub start_timeout: Duration,
    pub max_playback: Duration,
    pub grace: Duration,
    pub per_char: Duration,
    pub reading_min: Duration,
    pub reading_max: Duration,
}

impl Default for GateTiming {
    fn default() -> Self {
        Self::from(&AudioConfig::default())
    }
}

impl From<&AudioConfig> for GateTiming {
    fn from(config: &AudioConfig) -> Self {
        Self {
            start_timeout: Duration::from_millis(config.start_timeout_ms),
            max_playback: Duration::from_millis(config.max_playback_ms),
            grace: Duration::from_millis(config.grace_ms),
            per_char: Duration::from_millis(config.reading_ms_per_char),
            reading_min: Duration::from_millis(config.reading_min_ms),
            reading_max: Duration::from_millis(config.reading_max_ms),
        }
    }
}

impl GateTiming {
    /// Time a reader needs for `text`, within the configured bounds.
    pub fn reading_delay(&self, text: &str) -> Duration {
        let chars = text.chars().count() as u32;
        self.per_char
            .saturating_mul(chars)
            .clamp(self.reading_min, self.reading_max)
    }
}

/// What the gate is holding
enum GateState {
    Idle,
    /// Voice is playing; the outcome waits for the end
    Narrating {
        playback: Playback,
        started_at: Instant,
    },
    /// No voice; the outcome waits for a reading delay
    Reading { until: Instant },
    /// Voice failed; the outcome waits for a grace delay
    Grace { until: Instant },
}

/// When the reply text became visible
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presented {
    /// Playback started
    OnPlaybackStart,
    /// No audio for this line
    Immediate,
    /// Audio failed or never started
    Fallback(String),
    /// The session was torn down while waiting
    Cancelled,
}

impl Presented {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Presented::Cancelled)
    }
}

/// Why the gate let a terminal outcome through
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    /// Nothing was pending
    Clear,
    /// Playback finished
    Ended,
    /// Playback ran past the maximum
    TimedOut,
    /// Reading delay elapsed
    Read,
    /// Grace delay after a failure elapsed
    Grace,
    Cancelled,
}

/// Holds terminal-state commits until narration has finished.
pub struct AudioGate {
    sink: Option<Arc<dyn AudioSink>>,
    timing: GateTiming,
    state: GateState,
}

impl AudioGate {
    pub fn new(sink: Option<Arc<dyn AudioSink>>, timing: GateTiming) -> Self {
        Self {
            sink,
            timing,
            state: GateState::Idle,
        }
    }

    /// A gate with no audio output; every line uses the reading delay.
    pub fn silent(timing: GateTiming) -> Self {
        Self::new(None, timing)
    }

    pub fn timing(&self) -> &GateTiming {
        &self.timing
    }

    pub fn state_name(&self) -> &'static str {
        match self.state {
            GateState::Idle => "idle",
            GateState::Narrating { .. } => "narrating",
            GateState::Reading { .. } => "reading",
            GateState::Grace { .. } => "grace",
        }
    }

    pub fn is_narrating(&self) -> bool {
        matches!(self.state, GateState::Narrating { .. })
    }

    /// Stop any playback and forget pending delays.
    pub fn stop(&mut self) {
        if let GateState::Narrating { playback, .. } =
            std::mem::replace(&mut self.state, GateState::Idle)
        {
            debug!("stopping previous narration");
            playback.stop();
        }
    }

    /// Wait until `text` should be shown. Replaces any previous playback.
    pub async fn present(
        &mut self,
        text: &str,
        audio_url: Option<&str>,
        cancel: &CancellationToken,
    ) -> Presented {
        self.stop();

        let (sink, url) = match (&self.sink, audio_url) {
            (Some(sink), Some(url)) => (sink.clone(), url),
            _ => {
                let delay = self.timing.reading_delay(text);
                self.state = GateState::Reading {
                    until: Instant::now() + delay,
                };
                return Presented::Immediate;
            }
        };

        let mut playback = sink.play(url);
        let first = tokio::select! {
            _ = cancel.cancelled() => {
                playback.stop();
                return Presented::Cancelled;
            }
            first = timeout(self.timing.start_timeout, playback.next_event()) => first,
        };

        match first {
            Ok(PlaybackEvent::Started) => {
                debug!(url, "narration started");
                self.state = GateState::Narrating {
                    playback,
                    started_at: Instant::now(),
                };
                Presented::OnPlaybackStart
            }
            Ok(PlaybackEvent::Ended) => {
                // Too short to observe the start; nothing left to wait for.
                Presented::OnPlaybackStart
            }
            Ok(PlaybackEvent::Failed(reason)) => {
                warn!(url, reason = %reason, "narration failed, showing text");
                self.enter_grace();
                Presented::Fallback(reason)
            }
            Err(_) => {
                playback.stop();
                warn!(url, "narration did not start in time, showing text");
                self.enter_grace();
                Presented::Fallback("playback did not start in time".to_string())
            }
        }
    }

    /// Wait until a terminal outcome may be committed.
    pub async fn settle(&mut self, cancel: &CancellationToken) -> Settled {
        match std::mem::replace(&mut self.state, GateState::Idle) {
            GateState::Idle => Settled::Clear,
            GateState::Reading { until } => {
                if wait_until(until, cancel).await {
                    Settled::Read
                } else {
                    Settled::Cancelled
                }
            }
            GateState::Grace { until } => {
                if wait_until(until, cancel).await {
                    Settled::Grace
                } else {
                    Settled::Cancelled
                }
            }
            GateState::Narrating {
                mut playback,
                started_at,
            } => {
                let deadline = started_at + self.timing.max_playback;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            playback.stop();
                            return Settled::Cancelled;
                        }
                        _ = sleep_until(deadline) => {
                            playback.stop();
                            info!("narration exceeded maximum length, committing");
                            return Settled::TimedOut;
                        }
                        event = playback.next_event() => match event {
                            PlaybackEvent::Ended => return Settled::Ended,
                            PlaybackEvent::Started => continue,
                            PlaybackEvent::Failed(reason) => {
                                warn!(reason = %reason, "narration failed mid-line");
                                let until = Instant::now() + self.timing.grace;
                                return if wait_until(until, cancel).await {
                                    Settled::Grace
                                } else {
                                    Settled::Cancelled
                                };
                            }
                        }
                    }
                }
            }
        }
    }

    fn enter_grace(&mut self) {
        self.state = GateState::Grace {
            until: Instant::now() + self.timing.grace,
        };
    }
}

/// Sleep until `deadline`; false if cancelled first.
async fn wait_until(deadline: Instant, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = sleep_until(deadline) => true,
    }
}
