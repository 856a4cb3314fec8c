//! Persistence layer.
//!
//! Saves and loads the session snapshot to/from a JSON file. The snapshot
//! is a record of what happened, not a resume point: a new engine lifetime
//! always starts from live chain state.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::engine::accountant::SessionState;

/// Default state file path.
pub const DEFAULT_STATE_FILE: &str = "dicebot_state.json";

/// Save the session snapshot to a JSON file.
pub fn save_state(state: &SessionState, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    let json = serde_json::to_string_pretty(state)
        .context("Failed to serialise session state")?;

    std::fs::write(path, &json)
        .context(format!("Failed to write state to {path}"))?;

    debug!(path, rounds = state.stats.rounds, "State saved");
    Ok(())
}

/// Load a session snapshot from a JSON file.
/// Returns None if the file doesn't exist.
pub fn load_state(path: Option<&str>) -> Result<Option<SessionState>> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);

    if !Path::new(path).exists() {
        info!(path, "No previous session found");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .context(format!("Failed to read state from {path}"))?;

    let state: SessionState = serde_json::from_str(&json)
        .context(format!("Failed to parse state from {path}"))?;

    info!(
        path,
        session = %state.session_id,
        rounds = state.stats.rounds,
        cycles = state.stats.cycles_completed,
        "Previous session loaded"
    );

    Ok(Some(state))
}

/// Delete the state file (for testing or reset).
pub fn delete_state(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path)
            .context(format!("Failed to delete state file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
