//! Streak momentum: locally computed patience
//!
//! Consecutive turns in the same emotional direction compound: the first
//! happy reply moves patience by 5, the next by 10, then 15, then 25 and
//! it stays there. Hostility is punished symmetrically. Any neutral reply,
//! or a change of direction, resets the streak.
//!
//! Only used with `ScoringMode::LocalStreak`; under the default server
//! scoring the service's merit score is authoritative.

use crate::emotion::Emotion;

/// Default magnitude ladder, indexed by streak.
pub const DEFAULT_MAGNITUDES: [i32; 4] = [5, 10, 15, 25];

/// Local patience scale bounds.
pub const PATIENCE_MIN: i32 = 0;
pub const PATIENCE_MAX: i32 = 100;

/// Outcome of applying one turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakStep {
    pub score: i32,
    pub streak: usize,
    pub delta: i32,
}

/// Apply one turn with the default ladder.
pub fn apply_turn(score: i32, streak: usize, last: Emotion, new: Emotion) -> StreakStep {
    apply_turn_with(&DEFAULT_MAGNITUDES, score, streak, last, new)
}

/// Apply one turn with a custom increasing ladder. The streak never
/// exceeds the ladder's last index.
pub fn apply_turn_with(
    magnitudes: &[i32],
    score: i32,
    streak: usize,
    last: Emotion,
    new: Emotion,
) -> StreakStep {
    let sign = match new {
        Emotion::Happy => 1,
        Emotion::Angry => -1,
        _ => 0,
    };

    if sign == 0 || magnitudes.is_empty() {
        return StreakStep {
            score: score.clamp(PATIENCE_MIN, PATIENCE_MAX),
            streak: 0,
            delta: 0,
        };
    }

    let top = magnitudes.len() - 1;
    let streak = if new == last && last.is_charged() {
        (streak + 1).min(top)
    } else {
        0
    };

    let delta = sign * magnitudes[streak];
    StreakStep {
        score: (score + delta).clamp(PATIENCE_MIN, PATIENCE_MAX),
        streak,
        delta,
    }
}

/// Running momentum across a session.
#[derive(Debug, Clone)]
pub struct Momentum {
    magnitudes: Vec<i32>,
    score: i32,
    streak: usize,
    last: Emotion,
}

impl Momentum {
    pub fn new(baseline: i32) -> Self {
        Self::with_magnitudes(baseline, DEFAULT_MAGNITUDES.to_vec())
    }

    pub fn with_magnitudes(baseline: i32, magnitudes: Vec<i32>) -> Self {
        Self {
            magnitudes,
            score: baseline.clamp(PATIENCE_MIN, PATIENCE_MAX),
            streak: 0,
            last: Emotion::Idle,
        }
    }

    /// Record one reply's emotion and return the step taken.
    pub fn record(&mut self, emotion: Emotion) -> StreakStep {
        let step = apply_turn_with(&self.magnitudes, self.score, self.streak, self.last, emotion);
        self.score = step.score;
        self.streak = step.streak;
        self.last = if emotion.is_charged() {
            emotion
        } else {
            Emotion::Idle
        };
        step
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn streak(&self) -> usize {
        self.streak
    }

    pub fn is_exhausted(&self) -> bool {
        self.score <= PATIENCE_MIN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_happy_turn() {
        let step = apply_turn(50, 0, Emotion::Idle, Emotion::Happy);
        assert_eq!(step, StreakStep { score: 55, streak: 0, delta: 5 });
    }

    #[test]
    fn test_compounding_sequence() {
        let mut momentum = Momentum::new(50);
        let deltas: Vec<i32> = (0..5).map(|_| momentum.record(Emotion::Happy).delta).collect();
        assert_eq!(deltas, vec![5, 10, 15, 25, 25]);
        assert_eq!(momentum.streak(), 3);
        assert_eq!(momentum.score(), 100);
    }

    #[test]
    fn test_streak_resets_on_direction_change() {
        let mut momentum = Momentum::new(50);
        momentum.record(Emotion::Happy);
        momentum.record(Emotion::Happy);
        assert_eq!(momentum.streak(), 1);

        let step = momentum.record(Emotion::Angry);
        assert_eq!(step.streak, 0);
        assert_eq!(step.delta, -5);
        assert_eq!(momentum.score(), 60);
    }

    #[test]
    fn test_neutral_resets_without_change() {
        let mut momentum = Momentum::new(50);
        momentum.record(Emotion::Angry);
        momentum.record(Emotion::Angry);
        let step = momentum.record(Emotion::Idle);
        assert_eq!(step.delta, 0);
        assert_eq!(step.streak, 0);
        assert_eq!(momentum.score(), 35);

        // next angry starts over at the bottom of the ladder
        assert_eq!(momentum.record(Emotion::Angry).delta, -5);
    }

    #[test]
    fn test_hostility_is_symmetric() {
        let mut momentum = Momentum::new(100);
        let deltas: Vec<i32> = (0..4).map(|_| momentum.record(Emotion::Angry).delta).collect();
        assert_eq!(deltas, vec![-5, -10, -15, -25]);
        assert_eq!(momentum.score(), 45);
    }

    #[test]
    fn test_clamped_to_scale() {
        assert_eq!(apply_turn(98, 3, Emotion::Happy, Emotion::Happy).score, 100);
        assert_eq!(apply_turn(3, 3, Emotion::Angry, Emotion::Angry).score, 0);

        let mut momentum = Momentum::new(10);
        momentum.record(Emotion::Angry);
        momentum.record(Emotion::Angry);
        assert!(momentum.is_exhausted());
    }

    #[test]
    fn test_thinking_is_neutral() {
        let step = apply_turn(50, 2, Emotion::Happy, Emotion::Thinking);
        assert_eq!(step, StreakStep { score: 50, streak: 0, delta: 0 });
    }

    #[test]
    fn test_custom_ladder() {
        let step = apply_turn_with(&[1, 2], 50, 5, Emotion::Happy, Emotion::Happy);
        assert_eq!(step.streak, 1);
        assert_eq!(step.delta, 2);
    }
}
