use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the Syncthing status monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Discover URI and API key from Syncthing's own config.xml
    #[serde(default = "default_autoconfig")]
    pub autoconfig: bool,

    #[serde(default = "default_configuration_uri")]
    pub configuration_uri: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub syncthing_config_dir: Option<String>,

    #[serde(default = "default_service_name")]
    pub systemd_service_name: String,

    #[serde(default = "default_systemd_user")]
    pub systemd_user: bool,

    #[serde(default = "IntervalConfig::normal")]
    pub poll_interval: IntervalConfig,

    #[serde(default = "IntervalConfig::fast")]
    pub fast_poll_interval: IntervalConfig,

    #[serde(default)]
    pub watcher: WatcherConfig,
}

/// Bounds of a backoff schedule, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalConfig {
    pub minimum_secs: u64,
    pub maximum_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_warmup_secs")]
    pub warmup_secs: u64,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            autoconfig: default_autoconfig(),
            configuration_uri: default_configuration_uri(),
            api_key: None,
            syncthing_config_dir: None,
            systemd_service_name: default_service_name(),
            systemd_user: default_systemd_user(),
            poll_interval: IntervalConfig::normal(),
            fast_poll_interval: IntervalConfig::fast(),
            watcher: WatcherConfig::default(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            warmup_secs: default_warmup_secs(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl IntervalConfig {
    pub fn normal() -> Self {
        Self {
            minimum_secs: 1,
            maximum_secs: 64,
        }
    }

    pub fn fast() -> Self {
        Self {
            minimum_secs: 1,
            maximum_secs: 8,
        }
    }

    /// Returns `(minimum, maximum)`, with zero and inverted bounds repaired.
    pub fn bounds(&self) -> (Duration, Duration) {
        let minimum = self.minimum_secs.max(1);
        let maximum = self.maximum_secs.max(minimum);
        (Duration::from_secs(minimum), Duration::from_secs(maximum))
    }
}

impl WatcherConfig {
    pub fn warmup(&self) -> Duration {
        Duration::from_secs(self.warmup_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

fn default_autoconfig() -> bool {
    true
}

fn default_configuration_uri() -> String {
    "http://127.0.0.1:8384".to_string()
}

fn default_service_name() -> String {
    "syncthing.service".to_string()
}

fn default_systemd_user() -> bool {
    true
}

fn default_warmup_secs() -> u64 {
    1
}

fn default_cooldown_secs() -> u64 {
    10
}
