//! Conversation transcript: who said what, in order

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Line shown when a turn fails in transit.
pub const FALLBACK_LINE: &str =
    "☠️ (The parrot bit through the speaking-tube... the captain didn't hear you.)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Player,
    Guardian,
    System,
}

/// One line of the transcript
#[derive(Debug, Clone, Serialize)]
pub struct Line {
    pub id: usize,
    pub timestamp: DateTime<Utc>,
    pub speaker: Speaker,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    lines: Vec<Line>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, speaker: Speaker, text: impl Into<String>) -> &Line {
        let id = self.lines.len();
        self.lines.push(Line {
            id,
            timestamp: Utc::now(),
            speaker,
            text: text.into(),
        });
        &self.lines[id]
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn last(&self) -> Option<&Line> {
        self.lines.last()
    }

    pub fn recent(&self, count: usize) -> &[Line] {
        let start = self.lines.len().saturating_sub(count);
        &self.lines[start..]
    }
}

/// Format a line for plain-text display
pub fn format_line(line: &Line, guardian: &str) -> String {
    match line.speaker {
        Speaker::Player => format!("you: {}", line.text),
        Speaker::Guardian => format!("{}: {}", guardian, line.text),
        Speaker::System => format!("[{}]", line.text),
    }
}
