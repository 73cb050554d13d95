//! Config file location
//!
//! Follows the XDG Base Directory Specification with an env var override.
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `PARLEY_CONFIG` | Config file path | `~/.config/pirate-parley/parley.toml` |
//! | `PARLEY_BASE_URL` | Conversation service URL | value from the config file |

use std::path::PathBuf;

/// Env var overriding the config file path
pub const CONFIG_ENV: &str = "PARLEY_CONFIG";

const APP_DIR: &str = "pirate-parley";

/// Get the XDG config directory for the game
///
/// Priority: `XDG_CONFIG_HOME` > `~/.config`
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join(APP_DIR);
    }

    // Last resort: current directory
    PathBuf::from(".")
}

/// Get the config file path
///
/// Priority: `PARLEY_CONFIG` env var > `config_dir()/parley.toml`
pub fn config_path() -> PathBuf {
    std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir().join("parley.toml"))
}
