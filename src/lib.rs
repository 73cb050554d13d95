//! pirate-parley - talk a pirate guardian out of his treasure map
//!
//! This library holds the game engine: reply sanitizing, scoring, the
//! session state machine and the audio gate that paces terminal outcomes.
//! The terminal game is in `main.rs`, admin CLI in `bin/parley-admin.rs`.

pub mod audio;
pub mod config;
pub mod display;
pub mod emotion;
pub mod error;
pub mod events;
pub mod paths;
pub mod sanitize;
pub mod score;
pub mod service;
pub mod session;
pub mod stats;
pub mod streak;
pub mod transcript;

pub use error::{GameError, Result};
pub use session::{GameSession, Outcome, Phase, SendOutcome};
