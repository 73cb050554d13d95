//! Game configuration
//!
//! Loaded once at startup from TOML and injected into the session; nothing
//! in the engine looks configuration up on its own. Precedence for the
//! service address: `--base-url` flag > `PARLEY_BASE_URL` > file > default.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::GameError;
use crate::score::ScoreRange;
use crate::streak::DEFAULT_MAGNITUDES;

/// Env var overriding the conversation service base URL
pub const BASE_URL_ENV: &str = "PARLEY_BASE_URL";

/// Top-level configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub service: ServiceConfig,
    pub balance: BalanceConfig,
    pub audio: AudioConfig,
    pub session: SessionConfig,
    pub characters: Vec<Character>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            balance: BalanceConfig::default(),
            audio: AudioConfig::default(),
            session: SessionConfig::default(),
            characters: default_characters(),
        }
    }
}

/// Conversation service endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    /// Upper bound on one request, start or turn
    pub request_timeout_ms: u64,
    /// Ask the service to synthesize voice for replies
    pub include_audio: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout_ms: 30_000,
            include_audio: true,
        }
    }
}

impl ServiceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Which side owns the score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// The service's merit score is used verbatim
    #[default]
    Server,
    /// Patience is computed locally from reply emotions
    LocalStreak,
}

/// Tunable game-balance constants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    pub scoring: ScoringMode,
    /// Starting patience for local scoring (0..=100)
    pub local_baseline: i32,
    /// Increasing ladder of patience changes, indexed by streak
    pub streak_magnitudes: Vec<i32>,
    pub score_range: ScoreRange,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringMode::Server,
            local_baseline: 50,
            streak_magnitudes: DEFAULT_MAGNITUDES.to_vec(),
            score_range: ScoreRange::default(),
        }
    }
}

/// Voice playback and narration pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// External player command; the URL is appended as the last argument.
    /// Empty disables voice playback.
    pub player: Vec<String>,
    /// How long to wait for playback to start before showing text anyway
    pub start_timeout_ms: u64,
    /// Longest a single line may hold the game-over screen
    pub max_playback_ms: u64,
    /// Delay after a playback failure before committing the outcome
    pub grace_ms: u64,
    pub reading_ms_per_char: u64,
    pub reading_min_ms: u64,
    pub reading_max_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            player: Vec::new(),
            start_timeout_ms: 5_000,
            max_playback_ms: 60_000,
            grace_ms: 3_000,
            reading_ms_per_char: 60,
            reading_min_ms: 1_500,
            reading_max_ms: 5_000,
        }
    }
}

/// Session lifetime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle seconds before the session is abandoned (0 = never)
    pub inactivity_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: 90,
        }
    }
}

impl SessionConfig {
    pub fn inactivity_timeout(&self) -> Option<Duration> {
        (self.inactivity_timeout_secs > 0).then(|| Duration::from_secs(self.inactivity_timeout_secs))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

/// A guardian the player can challenge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    /// Short id used to pick the character (e.g., "greenhorn")
    pub id: String,
    /// Name sent to the service and shown in the transcript
    pub name: String,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub blurb: String,
}

fn default_characters() -> Vec<Character> {
    vec![
        Character {
            id: "greenhorn".to_string(),
            name: "Captain Greenhorn".to_string(),
            difficulty: Difficulty::Easy,
            blurb: "Trusting and a little naive. Guards his gold more out of habit than cunning."
                .to_string(),
        },
        Character {
            id: "corsair".to_string(),
            name: "Corsair Code".to_string(),
            difficulty: Difficulty::Medium,
            blurb: "Careful but flexible. Will hear ye out, then check your story twice."
                .to_string(),
        },
        Character {
            id: "ghost".to_string(),
            name: "Ghost of the Seas".to_string(),
            difficulty: Difficulty::Hard,
            blurb: "Centuries of liars behind him. Sees through every trick but the best."
                .to_string(),
        },
    ]
}

impl GameConfig {
    /// Load config from a TOML file, falling back to defaults if absent.
    /// Environment overrides are applied and the result validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Read the file as written, without environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!("config not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: GameConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        tracing::info!(
            "loaded config from {} ({} characters)",
            path.display(),
            config.characters.len()
        );

        Ok(config)
    }

    /// Write config back as TOML, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.service.base_url = url.trim().to_string();
            }
        }
    }

    pub fn validate(&self) -> std::result::Result<(), GameError> {
        let url = self.service.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(GameError::Config(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.service.base_url
            )));
        }
        if self.service.request_timeout_ms == 0 {
            return Err(GameError::Config("request_timeout_ms must be positive".into()));
        }

        self.balance.score_range.validate()?;
        let ladder = &self.balance.streak_magnitudes;
        if ladder.is_empty() || ladder.iter().any(|m| *m <= 0) {
            return Err(GameError::Config(
                "streak_magnitudes must be non-empty and positive".into(),
            ));
        }
        if ladder.windows(2).any(|w| w[0] > w[1]) {
            return Err(GameError::Config("streak_magnitudes must be increasing".into()));
        }
        if !(0..=100).contains(&self.balance.local_baseline) {
            return Err(GameError::Config("local_baseline must be within 0..=100".into()));
        }

        if self.audio.reading_min_ms > self.audio.reading_max_ms {
            return Err(GameError::Config("reading_min_ms exceeds reading_max_ms".into()));
        }

        if self.characters.is_empty() {
            return Err(GameError::Config("at least one character is required".into()));
        }
        let mut ids: Vec<&str> = self.characters.iter().map(|c| c.id.as_str()).collect();
        ids.sort_unstable();
        if ids.windows(2).any(|w| w[0] == w[1]) {
            return Err(GameError::Config("character ids must be unique".into()));
        }
        Ok(())
    }

    pub fn character(&self, id: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.id.eq_ignore_ascii_case(id))
    }
}
