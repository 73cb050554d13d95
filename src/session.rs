//! Game session state machine
//!
//! ```text
//! Idle ─start─▶ Initializing ─ok─▶ Ready ─send─▶ AwaitingResponse ─reply─▶ Committing
//!   ▲               │ err                ▲                 │ err                │
//!   └───────────────┘                    └─────────────────┴──── no outcome ────┤
//!                                                                               ▼
//!                                                                 Finished(Won | Lost)
//! ```
//!
//! One turn at a time: the phase is checked and advanced under a single
//! write lock, so a second `send_message` while a turn is in flight is a
//! no-op. Locks are never held across a network call. Each session has a
//! generation number and a cancellation token; tearing a session down
//! cancels whatever it was waiting on, and any reply that still arrives
//! for an old generation is dropped.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::audio::{AudioGate, AudioSink, GateTiming, Presented, Settled};
use crate::config::{Character, GameConfig, ScoringMode};
use crate::emotion::Emotion;
use crate::error::{GameError, Result};
use crate::events::{GameEvent, GameEventReceiver, GameEventSender};
use crate::sanitize::{contains_control_tag, sanitize, sanitize_with_hint};
use crate::service::{ConversationService, TurnReply};
use crate::stats::{compute_stats, GameStats};
use crate::streak::Momentum;
use crate::transcript::{Line, Speaker, Transcript, FALLBACK_LINE};

/// Control tag that hands over the map under local scoring
const GIVE_MAP_TAG: &str = "GIVE_MAP";

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    #[default]
    Undecided,
    Won,
    Lost,
}

impl Outcome {
    pub fn is_decided(&self) -> bool {
        !matches!(self, Outcome::Undecided)
    }
}

/// Where the session is in its turn cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Initializing,
    Ready,
    AwaitingResponse,
    Committing,
    Finished(Outcome),
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Initializing => "initializing",
            Phase::Ready => "ready",
            Phase::AwaitingResponse => "awaiting_response",
            Phase::Committing => "committing",
            Phase::Finished(Outcome::Won) => "won",
            Phase::Finished(_) => "lost",
        }
    }

    /// True while a start or a turn is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Phase::Initializing | Phase::AwaitingResponse | Phase::Committing
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Finished(_))
    }
}

/// Why `send_message` did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    EmptyInput,
    TurnInFlight,
    GameFinished,
}

/// What one completed turn produced
#[derive(Debug, Clone)]
pub struct TurnSummary {
    pub turn: u32,
    /// Sanitized reply as shown in the transcript
    pub reply: String,
    pub emotion: Emotion,
    pub score: i32,
    pub percent: u8,
    pub outcome: Outcome,
    pub presented: Presented,
    pub audio_url: Option<String>,
    pub win_phrase_detected: bool,
    pub penalties: BTreeMap<String, i32>,
    /// Set once the outcome is committed
    pub stats: Option<GameStats>,
}

/// Result of `send_message`
#[derive(Debug)]
pub enum SendOutcome {
    /// Nothing sent
    Rejected(Rejection),
    /// Turn committed, game goes on
    Continue(TurnSummary),
    /// Turn committed and the game is over
    Finished(TurnSummary),
    /// The request failed; a fallback line was added and the session is ready again
    Recovered(GameError),
    /// The session was torn down while the turn was in flight
    Discarded,
}

/// Read-only snapshot for display
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: Option<String>,
    pub character: Option<String>,
    pub phase: Phase,
    pub turn_count: u32,
    pub score: i32,
    pub display_percent: u8,
    /// Last committed emotion
    pub emotion: Emotion,
    /// A turn is in flight
    pub thinking: bool,
    pub outcome: Outcome,
    pub stats: Option<GameStats>,
    pub started_at: Option<DateTime<Utc>>,
    pub transcript: Vec<Line>,
}

impl SessionView {
    pub fn is_terminal(&self) -> bool {
        self.outcome.is_decided()
    }

    /// Mood to draw: thinking while a turn is in flight, otherwise committed.
    pub fn displayed_emotion(&self) -> Emotion {
        if self.thinking {
            Emotion::Thinking
        } else {
            self.emotion
        }
    }
}

struct ActiveSession {
    id: String,
    character: Character,
    turn_count: u32,
    score: i32,
    percent: u8,
    emotion: Emotion,
    outcome: Outcome,
    momentum: Option<Momentum>,
    stats: Option<GameStats>,
    started_at: DateTime<Utc>,
    last_activity: Instant,
}

#[derive(Default)]
struct SessionState {
    phase: Phase,
    active: Option<ActiveSession>,
    transcript: Transcript,
    thinking: bool,
    generation: u64,
    cancel: CancellationToken,
}

struct Inner {
    config: GameConfig,
    service: Arc<dyn ConversationService>,
    state: RwLock<SessionState>,
    gate: Mutex<AudioGate>,
    events: GameEventSender,
}

/// A player's negotiation with one guardian.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct GameSession {
    inner: Arc<Inner>,
}

impl GameSession {
    pub fn new(
        config: GameConfig,
        service: Arc<dyn ConversationService>,
        sink: Option<Arc<dyn AudioSink>>,
    ) -> Self {
        let gate = AudioGate::new(sink, GateTiming::from(&config.audio));
        Self {
            inner: Arc::new(Inner {
                config,
                service,
                state: RwLock::new(SessionState::default()),
                gate: Mutex::new(gate),
                events: GameEventSender::default(),
            }),
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> GameEventReceiver {
        self.inner.events.subscribe()
    }

    pub async fn view(&self) -> SessionView {
        let state = self.inner.state.read().await;
        let active = state.active.as_ref();
        SessionView {
            session_id: active.map(|a| a.id.clone()),
            character: active.map(|a| a.character.name.clone()),
            phase: state.phase,
            turn_count: active.map(|a| a.turn_count).unwrap_or(0),
            score: active.map(|a| a.score).unwrap_or(0),
            display_percent: active.map(|a| a.percent).unwrap_or(0),
            emotion: active.map(|a| a.emotion).unwrap_or_default(),
            thinking: state.thinking,
            outcome: active.map(|a| a.outcome).unwrap_or_default(),
            stats: active.and_then(|a| a.stats),
            started_at: active.map(|a| a.started_at),
            transcript: state.transcript.lines().to_vec(),
        }
    }

    pub async fn phase(&self) -> Phase {
        self.inner.state.read().await.phase
    }

    /// The guardian of the current session
    pub async fn character(&self) -> Option<Character> {
        let state = self.inner.state.read().await;
        state.active.as_ref().map(|a| a.character.clone())
    }

    /// Start a new session with the chosen character, discarding any
    /// current one.
    #[instrument(skip(self))]
    pub async fn start(&self, character_id: &str) -> Result<SessionView> {
        let character = self
            .inner
            .config
            .character(character_id)
            .cloned()
            .ok_or_else(|| GameError::UnknownCharacter(character_id.to_string()))?;

        let (generation, cancel) = {
            let mut state = self.inner.state.write().await;
            self.teardown(&mut state);
            self.set_phase(&mut state, Phase::Initializing);
            (state.generation, state.cancel.clone())
        };

        info!(character = %character.name, difficulty = character.difficulty.as_str(), "starting session");

        let request_timeout = self.inner.config.service.request_timeout();
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(GameError::StartFailed("superseded by another session".into()));
            }
            result = tokio::time::timeout(
                request_timeout,
                self.inner.service.start_session(character.difficulty.as_str(), &character.name),
            ) => result,
        };

        let mut state = self.inner.state.write().await;
        if state.generation != generation {
            return Err(GameError::StartFailed("superseded by another session".into()));
        }

        let ticket = match result {
            Ok(Ok(ticket)) => ticket,
            Ok(Err(e)) => {
                warn!(error = %e, "session start failed");
                self.set_phase(&mut state, Phase::Idle);
                return Err(match e {
                    GameError::StartFailed(_) => e,
                    other => GameError::StartFailed(other.to_string()),
                });
            }
            Err(_) => {
                warn!("session start timed out");
                self.set_phase(&mut state, Phase::Idle);
                return Err(GameError::StartFailed(format!(
                    "timed out after {}ms",
                    request_timeout.as_millis()
                )));
            }
        };

        let balance = &self.inner.config.balance;
        let (score, percent, momentum) = match balance.scoring {
            ScoringMode::Server => {
                let neutral = balance.score_range.neutral();
                (neutral, balance.score_range.to_percent(neutral), None)
            }
            ScoringMode::LocalStreak => {
                let momentum =
                    Momentum::with_magnitudes(balance.local_baseline, balance.streak_magnitudes.clone());
                let score = momentum.score();
                (score, patience_percent(score), Some(momentum))
            }
        };

        info!(session.id = %ticket.session_id, score, "session ready");
        state.active = Some(ActiveSession {
            id: ticket.session_id,
            character,
            turn_count: 0,
            score,
            percent,
            emotion: Emotion::Idle,
            outcome: Outcome::Undecided,
            momentum,
            stats: None,
            started_at: Utc::now(),
            last_activity: Instant::now(),
        });
        if let Some(greeting) = ticket.greeting {
            let clean = sanitize(&greeting).clean_text;
            self.push_line(&mut state, Speaker::Guardian, clean);
        }
        self.set_phase(&mut state, Phase::Ready);
        drop(state);

        Ok(self.view().await)
    }

    /// Start over with the same character.
    pub async fn restart(&self) -> Result<SessionView> {
        let character_id = {
            let state = self.inner.state.read().await;
            state
                .active
                .as_ref()
                .map(|a| a.character.id.clone())
                .ok_or(GameError::NoActiveSession)?
        };
        self.start(&character_id).await
    }

    /// Abandon the session and go back to the menu.
    pub async fn leave(&self) {
        let mut state = self.inner.state.write().await;
        if state.active.is_some() || state.phase != Phase::Idle {
            info!("leaving session");
        }
        self.teardown(&mut state);
        self.set_phase(&mut state, Phase::Idle);
    }

    /// Leave the session if the player has been idle too long. Turns in
    /// flight are never interrupted. Returns true if the session was ended.
    pub async fn expire_if_inactive(&self) -> bool {
        let Some(limit) = self.inner.config.session.inactivity_timeout() else {
            return false;
        };

        let mut state = self.inner.state.write().await;
        let idle = match (&state.active, state.phase) {
            (Some(active), phase) if !phase.is_busy() => active.last_activity.elapsed(),
            _ => return false,
        };
        if idle < limit {
            return false;
        }

        info!(idle_secs = idle.as_secs(), "session expired after inactivity");
        self.teardown(&mut state);
        self.set_phase(&mut state, Phase::Idle);
        true
    }

    /// Time since the player last did something, if a session is active.
    pub async fn idle_for(&self) -> Option<Duration> {
        let state = self.inner.state.read().await;
        state.active.as_ref().map(|a| a.last_activity.elapsed())
    }

    /// Send one player message and drive the turn to completion.
    #[instrument(skip(self, text), fields(len = text.len()))]
    pub async fn send_message(&self, text: &str) -> Result<SendOutcome> {
        let text = text.trim();

        let (generation, cancel, session_id, turn) = {
            let mut state = self.inner.state.write().await;
            match state.phase {
                Phase::Idle => return Err(GameError::NoActiveSession),
                Phase::Finished(_) => return Ok(SendOutcome::Rejected(Rejection::GameFinished)),
                phase if phase.is_busy() => {
                    debug!(phase = phase.as_str(), "turn already in flight");
                    return Ok(SendOutcome::Rejected(Rejection::TurnInFlight));
                }
                _ => {}
            }
            let Some(active) = state.active.as_mut() else {
                return Err(GameError::NoActiveSession);
            };
            if text.is_empty() {
                return Ok(SendOutcome::Rejected(Rejection::EmptyInput));
            }

            active.turn_count += 1;
            active.last_activity = Instant::now();
            let session_id = active.id.clone();
            let turn = active.turn_count;

            self.push_line(&mut state, Speaker::Player, text);
            state.thinking = true;
            self.inner.events.send(GameEvent::Thinking(true));
            self.set_phase(&mut state, Phase::AwaitingResponse);
            (state.generation, state.cancel.clone(), session_id, turn)
        };

        debug!(session.id = %session_id, turn, "sending turn");
        let request_timeout = self.inner.config.service.request_timeout();
        let include_audio = self.inner.config.service.include_audio;
        let result = tokio::select! {
            _ = cancel.cancelled() => return Ok(SendOutcome::Discarded),
            result = tokio::time::timeout(
                request_timeout,
                self.inner.service.send_turn(&session_id, text, include_audio),
            ) => match result {
                Ok(result) => result,
                Err(_) => Err(GameError::Timeout(request_timeout.as_millis() as u64)),
            },
        };

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => return Ok(self.recover(generation, e).await),
        };

        // Score and emotion are committed now; the outcome waits for the gate.
        let Some(mut summary) = self.commit_reply(generation, turn, reply).await else {
            return Ok(SendOutcome::Discarded);
        };

        let mut gate = self.inner.gate.lock().await;
        summary.presented = gate
            .present(&summary.reply, summary.audio_url.as_deref(), &cancel)
            .await;
        if summary.presented.is_cancelled() {
            return Ok(SendOutcome::Discarded);
        }

        {
            let mut state = self.inner.state.write().await;
            if state.generation != generation {
                return Ok(SendOutcome::Discarded);
            }
            self.push_line(&mut state, Speaker::Guardian, summary.reply.clone());
            if !summary.outcome.is_decided() {
                self.set_phase(&mut state, Phase::Ready);
                return Ok(SendOutcome::Continue(summary));
            }
        }

        let settled = gate.settle(&cancel).await;
        drop(gate);
        if settled == Settled::Cancelled {
            return Ok(SendOutcome::Discarded);
        }
        debug!(?settled, "narration settled");

        let mut state = self.inner.state.write().await;
        if state.generation != generation {
            return Ok(SendOutcome::Discarded);
        }
        let Some(active) = state.active.as_mut() else {
            return Ok(SendOutcome::Discarded);
        };

        let stats = compute_stats(active.percent, active.turn_count);
        active.outcome = summary.outcome;
        active.stats = Some(stats);
        summary.stats = Some(stats);

        info!(
            session.id = %active.id,
            outcome = ?summary.outcome,
            turns = active.turn_count,
            grade = %stats.grade,
            "session finished"
        );
        self.set_phase(&mut state, Phase::Finished(summary.outcome));
        self.inner.events.send(match summary.outcome {
            Outcome::Won => GameEvent::Victory(stats),
            _ => GameEvent::GameOver(stats),
        });

        Ok(SendOutcome::Finished(summary))
    }

    /// Apply a reply's score and emotion, decide (but don't commit) the outcome.
    async fn commit_reply(&self, generation: u64, turn: u32, reply: TurnReply) -> Option<TurnSummary> {
        let mut state = self.inner.state.write().await;
        if state.generation != generation {
            debug!("dropping reply for a torn-down session");
            return None;
        }
        let balance = &self.inner.config.balance;
        let active = state.active.as_mut()?;

        let clean = sanitize_with_hint(&reply.raw_reply, reply.emotion);
        let emotion = clean.emotion.settled();

        let outcome = if reply.is_won {
            Outcome::Won
        } else if reply.is_lost {
            Outcome::Lost
        } else {
            Outcome::Undecided
        };

        let (score, percent, outcome) = match active.momentum.as_mut() {
            None => {
                let score = balance.score_range.clamp(reply.merit_score);
                (score, balance.score_range.to_percent(score), outcome)
            }
            Some(momentum) => {
                let step = momentum.record(emotion);
                debug!(delta = step.delta, streak = step.streak, "momentum step");
                let outcome = match outcome {
                    Outcome::Undecided if contains_control_tag(&reply.raw_reply, GIVE_MAP_TAG) => {
                        Outcome::Won
                    }
                    Outcome::Undecided if momentum.is_exhausted() => Outcome::Lost,
                    decided => decided,
                };
                (step.score, patience_percent(step.score), outcome)
            }
        };

        active.score = score;
        active.percent = percent;
        active.emotion = emotion;

        info!(
            session.id = %active.id,
            turn,
            merit = reply.merit_score,
            score,
            percent,
            emotion = %emotion,
            "turn scored"
        );

        self.inner.events.send(GameEvent::ScoreChanged {
            score,
            percent,
            emotion,
        });
        state.thinking = false;
        self.inner.events.send(GameEvent::Thinking(false));
        self.set_phase(&mut state, Phase::Committing);

        Some(TurnSummary {
            turn,
            reply: clean.clean_text,
            emotion,
            score,
            percent,
            outcome,
            presented: Presented::Immediate,
            audio_url: reply.audio_url,
            win_phrase_detected: reply.win_phrase_detected,
            penalties: reply.penalties,
            stats: None,
        })
    }

    /// A failed turn keeps its turn count but changes nothing else.
    async fn recover(&self, generation: u64, error: GameError) -> SendOutcome {
        let mut state = self.inner.state.write().await;
        if state.generation != generation {
            return SendOutcome::Discarded;
        }
        if error.is_recoverable() {
            warn!(error = %error, "turn failed, recovering");
        } else {
            error!(error = %error, "unexpected turn failure, recovering");
        }
        self.push_line(&mut state, Speaker::System, FALLBACK_LINE);
        state.thinking = false;
        self.inner.events.send(GameEvent::Thinking(false));
        self.set_phase(&mut state, Phase::Ready);
        SendOutcome::Recovered(error)
    }

    /// Drop the current session and cancel anything it is waiting on.
    fn teardown(&self, state: &mut SessionState) {
        state.cancel.cancel();
        state.cancel = CancellationToken::new();
        state.generation += 1;
        state.active = None;
        state.thinking = false;
        state.transcript = Transcript::new();
        // A turn blocked in the gate releases its own playback on cancel.
        if let Ok(mut gate) = self.inner.gate.try_lock() {
            gate.stop();
        }
    }

    fn set_phase(&self, state: &mut SessionState, phase: Phase) {
        state.phase = phase;
        self.inner.events.send(GameEvent::PhaseChanged {
            session_id: state.active.as_ref().map(|a| a.id.clone()),
            phase,
        });
    }

    fn push_line(&self, state: &mut SessionState, speaker: Speaker, text: impl Into<String>) {
        let line = state.transcript.push(speaker, text).clone();
        self.inner.events.send(GameEvent::Transcript(line));
    }
}

/// Local patience is already on a 0..=100 scale.
fn patience_percent(score: i32) -> u8 {
    score.clamp(0, 100) as u8
}
