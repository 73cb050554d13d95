//! Game events for the UI.
//!
//! Uses `tokio::sync::broadcast` so any number of front ends (terminal,
//! logs, tests) can follow a session. `Victory` and `GameOver` are sent at
//! most once per session, and only after the audio gate lets the outcome
//! through.

use tokio::sync::broadcast;

use crate::emotion::Emotion;
use crate::session::{Outcome, Phase};
use crate::stats::GameStats;
use crate::transcript::Line;

/// Something the UI may want to react to.
#[derive(Debug, Clone)]
pub enum GameEvent {
    /// The session moved to a new phase.
    PhaseChanged {
        session_id: Option<String>,
        phase: Phase,
    },

    /// A line was added to the transcript.
    Transcript(Line),

    /// The guardian started or stopped thinking about a reply.
    Thinking(bool),

    /// Committed score after a turn.
    ScoreChanged {
        score: i32,
        percent: u8,
        emotion: Emotion,
    },

    /// The player won. Sent once, after narration.
    Victory(GameStats),

    /// The player lost. Sent once, after narration.
    GameOver(GameStats),
}

impl GameEvent {
    /// The committed outcome this event announces, if any.
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            GameEvent::Victory(_) => Some(Outcome::Won),
            GameEvent::GameOver(_) => Some(Outcome::Lost),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome().is_some()
    }
}

/// Broadcast sender for game events.
///
/// Clone this to share between components that emit events.
/// Sending to zero receivers silently succeeds.
#[derive(Clone)]
pub struct GameEventSender {
    tx: broadcast::Sender<GameEvent>,
}

impl GameEventSender {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Send an event to all subscribers.
    ///
    /// Silently ignores errors (no receivers, or lagged receivers).
    pub fn send(&self, event: GameEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> GameEventReceiver {
        GameEventReceiver {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for GameEventSender {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Receiver for game events.
///
/// A receiver that falls behind misses events but never blocks the sender.
pub struct GameEventReceiver {
    rx: broadcast::Receiver<GameEvent>,
}

impl GameEventReceiver {
    /// Receive the next event. `None` once the sender is gone.
    pub async fn recv(&mut self) -> Option<GameEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "event receiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive an event without waiting.
    pub fn try_recv(&mut self) -> Option<GameEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Closed) => return None,
            }
        }
    }

    /// Everything currently queued.
    pub fn drain(&mut self) -> Vec<GameEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
