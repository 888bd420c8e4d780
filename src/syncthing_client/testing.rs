//! Scripted in-memory daemon for session tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::StatusCode;
use serde_json::{json, Map};
use tokio::sync::oneshot;

use super::api::{ConnectionTotals, ConnectionsResponse, FolderConfig, FolderStatus, SystemConfig};
use super::core::{DaemonApi, Endpoint};
use crate::types::MonitorError;

#[derive(Default)]
struct Script {
    config: Option<SystemConfig>,
    statuses: HashMap<String, FolderStatus>,
    status_gates: HashMap<String, VecDeque<oneshot::Receiver<FolderStatus>>>,
    connections: VecDeque<Option<ConnectionTotals>>,
    calls: Vec<String>,
}

#[derive(Default)]
pub struct FakeDaemon {
    script: Mutex<Script>,
}

pub fn totals(in_bytes: u64, out_bytes: u64, at_ms: i64) -> ConnectionTotals {
    ConnectionTotals {
        at: DateTime::from_timestamp_millis(at_ms).expect("timestamp"),
        in_bytes_total: in_bytes,
        out_bytes_total: out_bytes,
    }
}

fn unavailable(path: &str) -> MonitorError {
    MonitorError::Status {
        path: path.to_string(),
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: None,
    }
}

impl FakeDaemon {
    pub fn config(folders: &[(&str, Option<&str>, Option<&str>)]) -> SystemConfig {
        SystemConfig {
            version: json!("1"),
            folders: folders
                .iter()
                .map(|(id, label, path)| FolderConfig {
                    id: id.to_string(),
                    label: label.map(str::to_string),
                    path: path.map(str::to_string),
                })
                .collect(),
            devices: Vec::new(),
        }
    }

    /// `None` makes the configuration request fail.
    pub fn set_config(&self, config: Option<SystemConfig>) {
        self.script.lock().expect("script").config = config;
    }

    pub fn set_folders(&self, ids: &[&str]) {
        let folders: Vec<_> = ids.iter().map(|id| (*id, None, None)).collect();
        self.set_config(Some(Self::config(&folders)));
    }

    pub fn set_status(&self, folder: &str, state: &str, in_sync: u64, global: u64) {
        self.script.lock().expect("script").statuses.insert(
            folder.to_string(),
            FolderStatus {
                state: Some(state.to_string()),
                global_bytes: global,
                in_sync_bytes: in_sync,
            },
        );
    }

    /// Folders without a scripted status fail their status request.
    pub fn fail_status(&self, folder: &str) {
        self.script.lock().expect("script").statuses.remove(folder);
    }

    /// The next status request for `folder` waits for the returned sender.
    pub fn gate_status(&self, folder: &str) -> oneshot::Sender<FolderStatus> {
        let (tx, rx) = oneshot::channel();
        self.script
            .lock()
            .expect("script")
            .status_gates
            .entry(folder.to_string())
            .or_default()
            .push_back(rx);
        tx
    }

    /// Queues one connections reply; `None` fails. An empty queue answers
    /// with zeroed totals at the epoch.
    pub fn push_connections(&self, totals: Option<ConnectionTotals>) {
        self.script
            .lock()
            .expect("script")
            .connections
            .push_back(totals);
    }

    pub fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut self.script.lock().expect("script").calls)
    }
}

#[async_trait]
impl DaemonApi for FakeDaemon {
    async fn system_config(&self, _endpoint: &Endpoint) -> Result<SystemConfig, MonitorError> {
        let mut script = self.script.lock().expect("script");
        script.calls.push("config".to_string());
        script
            .config
            .clone()
            .ok_or_else(|| unavailable("/rest/system/config"))
    }

    async fn folder_status(
        &self,
        _endpoint: &Endpoint,
        folder: &str,
    ) -> Result<FolderStatus, MonitorError> {
        let (gate, scripted) = {
            let mut script = self.script.lock().expect("script");
            script.calls.push(format!("status:{folder}"));
            let gate = script
                .status_gates
                .get_mut(folder)
                .and_then(VecDeque::pop_front);
            (gate, script.statuses.get(folder).cloned())
        };
        if let Some(gate) = gate {
            return gate.await.map_err(|_| unavailable("/rest/db/status"));
        }
        scripted.ok_or_else(|| unavailable("/rest/db/status"))
    }

    async fn connections(&self, _endpoint: &Endpoint) -> Result<ConnectionsResponse, MonitorError> {
        let mut script = self.script.lock().expect("script");
        script.calls.push("connections".to_string());
        match script.connections.pop_front() {
            Some(Some(total)) => Ok(ConnectionsResponse {
                connections: Map::new(),
                total,
            }),
            Some(None) => Err(unavailable("/rest/system/connections")),
            None => Ok(ConnectionsResponse {
                connections: Map::new(),
                total: totals(0, 0, 0),
            }),
        }
    }
}
