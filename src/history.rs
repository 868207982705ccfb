//! Run history - a rolling log of past convergence runs.
//!
//! Stored as TOML under the state directory. Capped at [`MAX_RUNS`]
//! entries; the oldest runs are dropped first.

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::paths;

/// Maximum number of runs retained in the history file.
pub const MAX_RUNS: usize = 50;

/// One completed convergence run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Recipe name or path
    pub recipe: String,
    pub finished: DateTime<Utc>,
    pub duration_secs: f64,
    pub summary: converge::Summary,
    /// Notification entries fired or withheld during the run
    #[serde(default)]
    pub notifications: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunHistory {
    #[serde(default)]
    pub runs: Vec<RunRecord>,
    pub last_updated: DateTime<Utc>,
}

impl Default for RunHistory {
    fn default() -> Self {
        Self {
            runs: Vec::new(),
            last_updated: Utc::now(),
        }
    }
}

fn history_file() -> Result<PathBuf> {
    Ok(paths::state_dir()?.join("history.toml"))
}

impl RunHistory {
    /// Load history from the state directory, or an empty history if the
    /// file does not exist yet.
    pub fn load() -> Result<Self> {
        let path = history_file()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read history: {}", path.display()))?;
        let history: RunHistory = toml::from_str(&content)
            .with_context(|| format!("Failed to parse history: {}", path.display()))?;
        Ok(history)
    }

    pub fn save(&self) -> Result<()> {
        let path = history_file()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create state dir: {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize history")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write history: {}", path.display()))?;
        Ok(())
    }

    /// Append a run, dropping the oldest entries beyond [`MAX_RUNS`].
    pub fn push_trimmed(&mut self, record: RunRecord) {
        self.runs.push(record);
        if self.runs.len() > MAX_RUNS {
            let excess = self.runs.len() - MAX_RUNS;
            self.runs.drain(..excess);
        }
        self.last_updated = Utc::now();
    }

    /// The most recent `limit` runs, oldest first.
    pub fn recent(&self, limit: usize) -> &[RunRecord] {
        let start = self.runs.len().saturating_sub(limit);
        &self.runs[start..]
    }
}

/// Load, append, and persist in one step.
pub fn record(record: RunRecord) -> Result<()> {
    let mut history = RunHistory::load()?;
    history.push_trimmed(record);
    history.save()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(recipe: &str) -> RunRecord {
        RunRecord {
            recipe: recipe.to_string(),
            finished: Utc::now(),
            duration_secs: 1.5,
            summary: converge::Summary::default(),
            notifications: 0,
        }
    }

    #[test]
    fn test_push_trimmed_caps_at_max_dropping_oldest() {
        let mut history = RunHistory::default();
        for i in 0..MAX_RUNS + 5 {
            history.push_trimmed(sample(&format!("run-{i}")));
        }

        assert_eq!(history.runs.len(), MAX_RUNS);
        assert_eq!(history.runs[0].recipe, "run-5");
        assert_eq!(history.runs.last().unwrap().recipe, "run-54");
    }

    #[test]
    fn test_recent_returns_tail() {
        let mut history = RunHistory::default();
        for i in 0..4 {
            history.push_trimmed(sample(&format!("run-{i}")));
        }

        let recent = history.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].recipe, "run-2");
        assert_eq!(recent[1].recipe, "run-3");

        // Limit larger than history returns everything
        assert_eq!(history.recent(100).len(), 4);
    }

    #[test]
    fn test_toml_round_trip() {
        let mut history = RunHistory::default();
        history.push_trimmed(sample("cache-node"));

        let serialized = toml::to_string_pretty(&history).unwrap();
        let parsed: RunHistory = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.runs.len(), 1);
        assert_eq!(parsed.runs[0].recipe, "cache-node");
    }
}
