//! Pipeline configuration.
//!
//! Every section deserializes with defaults, so a partial TOML table (or none
//! at all) yields a working configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backlog::RetryPolicy;

/// Default event queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;
/// Default API host that relative backlog references resolve against.
pub const DEFAULT_API_HOST: &str = "https://www.irccloud.com";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bounded queue capacity between the transport and the event pump.
    pub queue_capacity: usize,
    pub backlog: BacklogConfig,
    pub view: ViewConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            backlog: BacklogConfig::default(),
            view: ViewConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Queue capacity, never below one.
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }
}

/// Backlog fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BacklogConfig {
    /// Base URL for relative backlog references.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Total attempts before giving up and replaying an empty batch.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub retry_initial_ms: u64,
    /// Upper bound for the retry delay.
    pub retry_max_ms: u64,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff_factor: f64,
}

impl Default for BacklogConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_HOST.to_string(),
            timeout_secs: 30,
            max_attempts: 3,
            retry_initial_ms: 500,
            retry_max_ms: 10_000,
            backoff_factor: 2.0,
        }
    }
}

impl BacklogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.retry_initial_ms),
            max_delay: Duration::from_millis(self.retry_max_ms),
            backoff_factor: self.backoff_factor,
        }
    }
}

/// Presentation model settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ViewConfig {
    /// Our nick, used for mention highlighting.
    pub own_nick: Option<String>,
    /// Channel to select after the backlog replay, when it exists.
    pub last_channel: Option<String>,
}
