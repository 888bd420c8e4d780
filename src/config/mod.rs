mod loader;
mod paths;
mod types;

pub use paths::probe_syncthing_config;
pub use types::{Config, IntervalConfig, WatcherConfig};
