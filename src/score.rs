//! Merit score → display percentage

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};

/// Signed range the conversation service reports merit in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRange {
    pub min: i32,
    pub max: i32,
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self { min: -100, max: 100 }
    }
}

impl ScoreRange {
    pub fn new(min: i32, max: i32) -> Result<Self> {
        let range = Self { min, max };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min >= self.max {
            return Err(GameError::Config(format!(
                "score range min ({}) must be below max ({})",
                self.min, self.max
            )));
        }
        Ok(())
    }

    pub fn clamp(&self, raw: i32) -> i32 {
        raw.clamp(self.min, self.max)
    }

    /// Midpoint of the range; the neutral starting score.
    pub fn neutral(&self) -> i32 {
        self.min + (self.max - self.min) / 2
    }

    /// Map a raw score linearly onto 0..=100, rounding half away from zero.
    pub fn to_percent(&self, raw: i32) -> u8 {
        let clamped = i64::from(self.clamp(raw));
        let span = i64::from(self.max) - i64::from(self.min);
        let offset = clamped - i64::from(self.min);
        // round(offset * 100 / span) in integers
        let percent = (offset * 200 + span) / (span * 2);
        percent.clamp(0, 100) as u8
    }
}

/// Map a score on the default [-100, 100] range to a percentage.
pub fn to_percent(raw: i32) -> u8 {
    ScoreRange::default().to_percent(raw)
}
