use std::collections::HashMap;
use std::io::ErrorKind;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::Config;
use crate::types::MonitorError;

use super::types::{ServiceAction, ServiceState};

/// Start/stop/query interface to whatever manages the daemon process.
/// Commands are fire-and-forget from the session's point of view.
#[async_trait]
pub trait ServiceControl: Send + Sync + 'static {
    async fn query_state(&self) -> ServiceState;

    async fn control(&self, action: ServiceAction) -> Result<String, MonitorError>;
}

/// Drives a unit through `systemctl`, optionally on the user manager.
#[derive(Debug, Clone)]
pub struct SystemctlService {
    service_name: String,
    user: bool,
}

impl SystemctlService {
    pub fn new(service_name: impl Into<String>, user: bool) -> Self {
        Self {
            service_name: service_name.into(),
            user,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.systemd_service_name.clone(), config.systemd_user)
    }

    fn args<'a>(&'a self, command: &[&'a str]) -> Vec<&'a str> {
        let mut args = Vec::with_capacity(command.len() + 2);
        if self.user {
            args.push("--user");
        }
        args.extend_from_slice(command);
        args.push(&self.service_name);
        args
    }
}

#[async_trait]
impl ServiceControl for SystemctlService {
    async fn query_state(&self) -> ServiceState {
        let args = self.args(&["show", "-p", "LoadState", "-p", "ActiveState"]);
        match Command::new("systemctl").args(&args).output().await {
            Ok(output) if output.status.success() => match parse_systemctl_show(&output.stdout) {
                Ok(map) => service_state(&self.service_name, &map),
                Err(err) => {
                    warn!(service = %self.service_name, error = ?err, "Unreadable systemctl output");
                    ServiceState::NotLoaded
                }
            },
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                debug!(
                    service = %self.service_name,
                    status = %output.status,
                    stderr = %stderr.trim(),
                    "systemctl show failed"
                );
                ServiceState::NotAvailable
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("systemctl not found");
                ServiceState::NotAvailable
            }
            Err(err) => {
                warn!(error = ?err, "Failed to run systemctl");
                ServiceState::NotAvailable
            }
        }
    }

    async fn control(&self, action: ServiceAction) -> Result<String, MonitorError> {
        let args = self.args(&[action.as_str()]);
        execute(&args).await?;
        Ok(format!("{} {}", self.service_name, action.past_tense()))
    }
}

/// Runs systemctl, turning a non-zero exit into an error carrying stderr.
async fn execute(args: &[&str]) -> Result<(), MonitorError> {
    let output = Command::new("systemctl").args(args).output().await?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(MonitorError::Systemd(if stderr.is_empty() {
        format!(
            "systemctl {} failed with status {}",
            args.join(" "),
            output.status
        )
    } else {
        format!("systemctl {} failed: {}", args.join(" "), stderr)
    }))
}

fn service_state(service: &str, map: &HashMap<String, String>) -> ServiceState {
    match (
        map.get("LoadState").map(String::as_str),
        map.get("ActiveState").map(String::as_str),
    ) {
        (Some("loaded"), Some("active")) => ServiceState::Active,
        (Some("loaded"), Some(_)) => ServiceState::Inactive,
        (Some(_), _) => ServiceState::NotLoaded,
        (None, _) => {
            warn!(service, "systemctl output lacks LoadState");
            ServiceState::NotLoaded
        }
    }
}

fn parse_systemctl_show(bytes: &[u8]) -> Result<HashMap<String, String>, MonitorError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|err| MonitorError::Systemd(format!("Invalid UTF-8 from systemctl: {err}")))?;
    let mut map = HashMap::new();
    for line in text.lines() {
        if let Some((key, value)) = line.split_once('=') {
            map.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_of(output: &str) -> ServiceState {
        let map = parse_systemctl_show(output.as_bytes()).expect("utf-8");
        service_state("syncthing.service", &map)
    }

    #[test]
    fn maps_load_and_active_state() {
        assert_eq!(state_of("LoadState=loaded\nActiveState=active\n"), ServiceState::Active);
        assert_eq!(state_of("ActiveState=failed\nLoadState=loaded\n"), ServiceState::Inactive);
        assert_eq!(state_of("LoadState=loaded\nActiveState=inactive"), ServiceState::Inactive);
        assert_eq!(state_of("LoadState=not-found\nActiveState=inactive\n"), ServiceState::NotLoaded);
        assert_eq!(state_of(""), ServiceState::NotLoaded);
    }

    #[test]
    fn invalid_utf8_is_a_systemd_error() {
        let err = parse_systemctl_show(&[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, MonitorError::Systemd(_)));
    }

    #[test]
    fn user_scope_is_prepended() {
        let user = SystemctlService::new("syncthing.service", true);
        assert_eq!(
            user.args(&["show", "-p", "LoadState"]),
            vec!["--user", "show", "-p", "LoadState", "syncthing.service"]
        );
        let system = SystemctlService::new("syncthing@pi.service", false);
        assert_eq!(system.args(&["stop"]), vec!["stop", "syncthing@pi.service"]);
    }
}
