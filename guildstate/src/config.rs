use anyhow::Context;
use chrono::TimeDelta;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Top-level configuration, loaded from guildstate.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
}

/// Retention limits applied to every guild the cache tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum cached messages per channel.
    pub max_messages: usize,
    /// Maximum message age in seconds, checked when a new message arrives
    /// in the same channel. Zero disables age eviction.
    pub max_message_age_secs: u64,
    /// Drop deleted messages instead of flagging them as deleted.
    pub remove_deleted_messages: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_messages: 100,
            max_message_age_secs: 0,
            remove_deleted_messages: false,
        }
    }
}

impl CacheConfig {
    /// The age cap, or `None` when age eviction is disabled.
    pub fn max_message_age(&self) -> Option<TimeDelta> {
        if self.max_message_age_secs == 0 {
            return None;
        }
        i64::try_from(self.max_message_age_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
    }
}

impl Config {
    /// Load config from a TOML file. Falls back to defaults if the file doesn't exist.
    /// Environment variables override TOML values.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {path}"))?;
            toml::from_str(&contents)
                .with_context(|| format!("failed to parse config file {path}"))?
        } else {
            info!("No config file found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("GUILDSTATE_MAX_MESSAGES")
            && let Ok(n) = v.parse()
        {
            self.cache.max_messages = n;
        }
        if let Ok(v) = std::env::var("GUILDSTATE_MAX_MESSAGE_AGE_SECS")
            && let Ok(secs) = v.parse()
        {
            self.cache.max_message_age_secs = secs;
        }
        if let Ok(v) = std::env::var("GUILDSTATE_REMOVE_DELETED_MESSAGES")
            && let Ok(flag) = v.parse()
        {
            self.cache.remove_deleted_messages = flag;
        }
    }
}
