// WHY: One place for the tunables the host may override; defaults mirror the shipped editor
// Keys are camelCase so a host can pass its existing option object through unchanged

use anyhow::{Context, Result};
use regex_automata::meta::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::debug;

use crate::error::SessionError;

pub const DEFAULT_TERMINATOR_PATTERN: &str = "[.!?]";
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;
pub const DEFAULT_STEP_DELAY_MS: u64 = 300;
pub const DEFAULT_JITTER_MAX_MS: u64 = 500;

/// Recognized session options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// Regex matched against single characters; a match closes a sentence
    pub terminator_pattern: String,
    /// Quiet period after the last edit before incomplete sentences are processed
    pub idle_timeout_ms: u64,
    /// Delay before the first match of a sentence surfaces
    pub base_delay_ms: u64,
    /// Extra delay per match index within a sentence
    pub step_delay_ms: u64,
    /// Upper bound (inclusive) of the uniform jitter added to each delay
    pub jitter_max_ms: u64,
    /// Fixed RNG seed for reproducible jitter; entropy-seeded when absent
    pub jitter_seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            terminator_pattern: DEFAULT_TERMINATOR_PATTERN.to_string(),
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            step_delay_ms: DEFAULT_STEP_DELAY_MS,
            jitter_max_ms: DEFAULT_JITTER_MAX_MS,
            jitter_seed: None,
        }
    }
}

impl SessionConfig {
    /// Deterministic delivery: no jitter, so matches surface in index order
    pub fn without_jitter(mut self) -> Self {
        self.jitter_max_ms = 0;
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Parse options from JSON; missing keys keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse session config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load options from a JSON file
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        debug!("Loaded session config from {}", path.display());
        Self::from_json_str(&content)
    }

    /// Compile the terminator pattern, failing fast on a bad one
    pub fn validate(&self) -> Result<()> {
        compile_terminators(&self.terminator_pattern).map(|_| ())
    }
}

pub(crate) fn compile_terminators(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| {
        SessionError::InvalidTerminatorPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
