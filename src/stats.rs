//! End-of-game rating

use serde::Serialize;

/// Turns allowed before the style bonus starts to decay.
pub const GRACE_TURNS: u32 = 3;
/// Style bonus for finishing within the grace period.
pub const MAX_STYLE: u32 = 20;
/// Style points lost per turn beyond the grace period.
pub const STYLE_DECAY: u32 = 2;

/// Final grade, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Grade {
    Landlubber,
    Deckhand,
    Boatswain,
    FirstMate,
    Captain,
    LegendOfTheSevenSeas,
}

impl Grade {
    /// Tiers by minimum total, highest first.
    const TIERS: [(u32, Grade); 6] = [
        (115, Grade::LegendOfTheSevenSeas),
        (95, Grade::Captain),
        (80, Grade::FirstMate),
        (60, Grade::Boatswain),
        (40, Grade::Deckhand),
        (0, Grade::Landlubber),
    ];

    pub fn for_total(total: u32) -> Self {
        Self::TIERS
            .iter()
            .find(|(min, _)| total >= *min)
            .map(|(_, grade)| *grade)
            .unwrap_or(Grade::Landlubber)
    }

    pub fn title(&self) -> &'static str {
        match self {
            Grade::Landlubber => "Landlubber",
            Grade::Deckhand => "Deckhand",
            Grade::Boatswain => "Boatswain",
            Grade::FirstMate => "First Mate",
            Grade::Captain => "Captain",
            Grade::LegendOfTheSevenSeas => "Legend of the Seven Seas",
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.title())
    }
}

/// Score breakdown shown on the victory screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GameStats {
    pub technique: u32,
    pub style: u32,
    pub total: u32,
    pub grade: Grade,
}

/// Rate a finished game from its display percentage and turn count.
pub fn compute_stats(percent: u8, turns: u32) -> GameStats {
    let technique = u32::from(percent.min(100));
    let overtime = turns.saturating_sub(GRACE_TURNS);
    let style = MAX_STYLE.saturating_sub(overtime.saturating_mul(STYLE_DECAY));
    let total = technique + style;

    GameStats {
        technique,
        style,
        total,
        grade: Grade::for_total(total),
    }
}
