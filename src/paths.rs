//! Centralized path resolution for batuta
//!
//! This module provides path resolution with environment variable support,
//! making it easy to point batuta at recipes and state kept in a dotfiles
//! or provisioning repository.
//!
//! # Environment Variables
//!
//! - `BATUTA_CONFIG_DIR` - Override config directory (e.g., `~/provisioning/batuta`)
//! - `BATUTA_STATE_DIR` - Override state directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `BATUTA_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/batuta` (if set)
//! 3. Default: `~/.config/batuta`
//!
//! For state_dir():
//! 1. `BATUTA_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/batuta` (if set)
//! 3. Default: `~/.local/state/batuta`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "BATUTA_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "BATUTA_STATE_DIR";

/// Get the batuta config directory path
///
/// Priority:
/// 1. `BATUTA_CONFIG_DIR` env var
/// 2. `XDG_CONFIG_HOME/batuta`
/// 3. Default: `~/.config/batuta`
pub fn config_dir() -> Result<PathBuf> {
    // 1. Check environment variable override
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    // 2. Check XDG_CONFIG_HOME
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("batuta");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    // 3. Default: ~/.config/batuta
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("batuta");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the batuta state directory path
///
/// Priority:
/// 1. `BATUTA_STATE_DIR` env var
/// 2. `XDG_STATE_HOME/batuta`
/// 3. Default: `~/.local/state/batuta`
pub fn state_dir() -> Result<PathBuf> {
    // 1. Check environment variable override
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    // 2. Check XDG_STATE_HOME
    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join("batuta");
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    // 3. Default: ~/.local/state/batuta
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join("batuta");
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
///
/// This is the canonical path expansion function for batuta. All modules
/// should use this instead of calling shellexpand directly.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================
