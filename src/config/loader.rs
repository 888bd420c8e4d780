use std::env;
use std::path::Path;

use tokio::fs;
use tracing::{info, warn};

use crate::types::MonitorError;

use super::{paths, Config};

impl Config {
    /// Load configuration from config.json in the app directory
    /// Falls back to defaults if the file doesn't exist or can't be parsed
    pub async fn load() -> Self {
        let mut config = match Self::try_load().await {
            Ok(config) => {
                info!(
                    autoconfig = config.autoconfig,
                    uri = %config.configuration_uri,
                    service = %config.systemd_service_name,
                    "Loaded configuration"
                );
                config
            }
            Err(err) => {
                warn!(error = ?err, "Failed to load config.json, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        config
    }

    async fn try_load() -> Result<Self, MonitorError> {
        let config_path = paths::get_config_path()?;
        Self::load_from(&config_path).await
    }

    /// Reads a config.json; a missing file yields the defaults.
    pub async fn load_from(config_path: &Path) -> Result<Self, MonitorError> {
        if !config_path.exists() {
            warn!(path = %config_path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(config_path)
            .await
            .map_err(|err| MonitorError::Config(format!("Failed to read config file: {err}")))?;

        serde_json::from_str(&contents)
            .map_err(|err| MonitorError::Config(format!("Failed to parse config.json: {err}")))
    }

    /// `SYNCTHING_API_URL` and `SYNCTHING_API_KEY` pin the connection and
    /// switch off discovery through config.xml.
    fn apply_env_overrides(&mut self) {
        if let Ok(custom) = env::var("SYNCTHING_API_URL") {
            let trimmed = custom.trim();
            if !trimmed.is_empty() {
                info!(uri = %trimmed, "Using SYNCTHING_API_URL");
                self.configuration_uri = trimmed.to_string();
                self.autoconfig = false;
            }
        }
        if let Ok(value) = env::var("SYNCTHING_API_KEY") {
            if !value.trim().is_empty() {
                self.api_key = Some(value.trim().to_string());
                self.autoconfig = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntervalConfig;

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::load_from(&dir.path().join("config.json"))
            .await
            .expect("defaults");
        assert!(config.autoconfig);
        assert_eq!(config.configuration_uri, "http://127.0.0.1:8384");
        assert_eq!(config.poll_interval, IntervalConfig::normal());
        assert_eq!(config.watcher.cooldown_secs, 10);
    }

    #[tokio::test]
    async fn partial_file_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"autoconfig": false, "api_key": "abc", "fast_poll_interval": {"minimum_secs": 2, "maximum_secs": 4}}"#,
        )
        .expect("write config");

        let config = Config::load_from(&path).await.expect("parsed");
        assert!(!config.autoconfig);
        assert_eq!(config.api_key.as_deref(), Some("abc"));
        assert_eq!(config.fast_poll_interval.minimum_secs, 2);
        assert_eq!(config.systemd_service_name, "syncthing.service");
        assert_eq!(config.watcher.warmup_secs, 1);
    }

    #[tokio::test]
    async fn broken_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").expect("write config");

        let err = Config::load_from(&path).await.unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
    }

    #[test]
    fn interval_bounds_are_repaired() {
        let inverted = IntervalConfig {
            minimum_secs: 0,
            maximum_secs: 0,
        };
        let (minimum, maximum) = inverted.bounds();
        assert_eq!(minimum.as_secs(), 1);
        assert_eq!(maximum.as_secs(), 1);
    }
}
