use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

const CONFIG_FILE: &str = "staff_directory";
const ENV_PREFIX: &str = "STAFF";

/// Run settings. Layered: defaults, then `staff_directory.toml` if present,
/// then `STAFF_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_source_url")]
    pub source_url: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_seconds")]
    pub backoff_seconds: u64,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
}

fn default_source_url() -> String {
    "https://www.miles.no/vi-er-miles/ansatte".into()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_seconds() -> u64 {
    5
}

fn default_model_id() -> String {
    "llama3".into()
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data")
}

fn default_backend_url() -> String {
    "http://localhost:11434".into()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_url: default_source_url(),
            max_attempts: default_max_attempts(),
            backoff_seconds: default_backoff_seconds(),
            model_id: default_model_id(),
            storage_root: default_storage_root(),
            backend_url: default_backend_url(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sources_give_defaults() {
        let s: Settings = config::Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(s.max_attempts, 3);
        assert_eq!(s.backoff(), Duration::from_secs(5));
        assert_eq!(s.storage_root, PathBuf::from("data"));
    }

    #[test]
    fn overrides_apply() {
        let s: Settings = config::Config::builder()
            .set_override("max_attempts", "5")
            .unwrap()
            .set_override("model_id", "mistral")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(s.max_attempts, 5);
        assert_eq!(s.model_id, "mistral");
        assert_eq!(s.source_url, default_source_url());
    }
}
