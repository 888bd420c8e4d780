//! Background monitor for a Syncthing daemon: polls its REST API, tracks the
//! folder set and throughput, and follows the daemon's own config.xml for
//! address and API key changes.

pub mod config;
pub mod filewatcher;
pub mod scheduler;
pub mod syncthing_client;
pub mod systemd;
pub mod types;
