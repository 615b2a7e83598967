//! Persistent configuration for cloudirc-replay.
//!
//! Config file lives at `~/.config/cloudirc/replay.toml`.
//! Session state (last viewed channel) at `~/.config/cloudirc/session.toml`.

use std::path::{Path, PathBuf};

use cloudirc_sdk::config::{BacklogConfig, PipelineConfig, ViewConfig};
use serde::{Deserialize, Serialize};

/// User configuration (persisted in replay.toml).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Session cookie value used for backlog requests.
    pub session_token: Option<String>,
    /// Our nick, for mention tracking.
    pub nick: Option<String>,
    /// Pipeline tuning; missing keys fall back to defaults.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Session state saved on exit, restored on start.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Session {
    /// Channel that was active on exit.
    pub last_channel: Option<String>,
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cloudirc")
}

fn config_path() -> PathBuf {
    config_dir().join("replay.toml")
}

fn session_path() -> PathBuf {
    config_dir().join("session.toml")
}

fn load_toml<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> T {
    if !path.exists() {
        return T::default();
    }
    match std::fs::read_to_string(path) {
        Ok(s) => match toml::from_str(&s) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("bad config file {}: {e}", path.display());
                T::default()
            }
        },
        Err(e) => {
            tracing::warn!("can't read {}: {e}", path.display());
            T::default()
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when `None`.
    pub fn load(path: Option<&Path>) -> Self {
        match path {
            Some(path) => load_toml(path),
            None => load_toml(&config_path()),
        }
    }
}

impl Session {
    pub fn load() -> Self {
        load_toml(&session_path())
    }

    pub fn save(&self) {
        let path = session_path();
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        match toml::to_string_pretty(self) {
            Ok(s) => {
                if let Err(e) = std::fs::write(&path, s) {
                    tracing::warn!("can't save session: {e}");
                }
            }
            Err(e) => tracing::warn!("can't serialize session: {e}"),
        }
    }
}

/// Effective settings after merging CLI args > config file > session state > defaults.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub session_token: String,
    pub pipeline: PipelineConfig,
}

impl Resolved {
    pub fn merge(cli: &super::Cli, config: &Config, session: &Session) -> Self {
        let session_token = cli
            .session_token
            .clone()
            .or_else(|| config.session_token.clone())
            .unwrap_or_default();

        let mut pipeline = config.pipeline.clone();
        if let Some(capacity) = cli.queue_capacity {
            pipeline.queue_capacity = capacity;
        }
        if let Some(ref url) = cli.backlog_url {
            pipeline.backlog = BacklogConfig {
                base_url: url.clone(),
                ..pipeline.backlog
            };
        }

        let own_nick = cli
            .nick
            .clone()
            .or_else(|| config.nick.clone())
            .or_else(|| pipeline.view.own_nick.clone());
        let last_channel = pipeline
            .view
            .last_channel
            .clone()
            .or_else(|| session.last_channel.clone());
        pipeline.view = ViewConfig {
            own_nick,
            last_channel,
        };

        Self {
            session_token,
            pipeline,
        }
    }
}
