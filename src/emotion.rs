//! The guardian's mood
//!
//! Discrete labels only. `Thinking` is a transient display state while a
//! turn is in flight and is never committed as the session's emotion.

use serde::{Deserialize, Serialize};

/// Emotion label detected in (or attached to) a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    #[default]
    Idle,
    Thinking,
    Happy,
    Angry,
}

impl Emotion {
    /// Happy or angry; these are the only moods that move momentum.
    pub fn is_charged(&self) -> bool {
        matches!(self, Emotion::Happy | Emotion::Angry)
    }

    /// The mood a session may keep once a turn is over; `Thinking` settles to `Idle`.
    pub fn settled(self) -> Self {
        match self {
            Emotion::Thinking => Emotion::Idle,
            other => other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Emotion::Idle => "idle",
            Emotion::Thinking => "thinking",
            Emotion::Happy => "happy",
            Emotion::Angry => "angry",
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            Emotion::Idle => "◇",
            Emotion::Thinking => "◈",
            Emotion::Happy => "☺",
            Emotion::Angry => "☠",
        }
    }

    /// Parse a service-provided label. Unknown labels (and "neutral")
    /// map to `Idle`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "happy" | "joy" => Emotion::Happy,
            "angry" | "anger" => Emotion::Angry,
            "thinking" => Emotion::Thinking,
            _ => Emotion::Idle,
        }
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
