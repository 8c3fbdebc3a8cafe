//! Runtime configuration.
//!
//! Configuration is a plain serde struct with defaults for every field, so a
//! partial JSON document (or none at all) yields a usable runtime.

use serde::{Deserialize, Serialize};

/// How triggered render and watch jobs are flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushMode {
    /// Re-run synchronously inside the write that triggered the job.
    #[default]
    Sync,
    /// Queue the job; it runs on `flush_jobs` or `next_tick`.
    Batched,
}

/// Settings for a [`Runtime`](crate::reactive::Runtime).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Flush strategy for component render effects and watchers.
    pub flush: FlushMode,

    /// How many times a single queued job may re-run within one flush.
    pub recursion_limit: usize,

    /// Emit a warning when a readonly target is written to.
    pub warn_on_readonly: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush: FlushMode::Sync,
            recursion_limit: 100,
            warn_on_readonly: true,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Convenience for a batched runtime.
    pub fn batched() -> Self {
        Self {
            flush: FlushMode::Batched,
            ..Self::default()
        }
    }
}
