use std::future::Future;

use tokio::sync::watch;
use tracing::warn;

use crate::syncthing_client::api::{FolderConfig, FolderStatus};
use crate::syncthing_client::core::{RequestOutcome, RequestSlot, Ticket};
use crate::types::MonitorError;

/// Canonical folder state shown to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderState {
    Idle,
    Scanning,
    Syncing,
    Error,
    Unknown,
}

impl FolderState {
    /// Maps a daemon state string, folding the transitional sub-states onto
    /// the state they lead into. `None` for strings the daemon is not known
    /// to send.
    pub fn from_daemon(raw: &str) -> Option<Self> {
        match raw {
            "idle" | "cleaning" | "clean-waiting" => Some(FolderState::Idle),
            "scanning" | "scan-waiting" => Some(FolderState::Scanning),
            "syncing" | "sync-waiting" | "sync-preparing" => Some(FolderState::Syncing),
            "error" => Some(FolderState::Error),
            "unknown" => Some(FolderState::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FolderState::Idle => "idle",
            FolderState::Scanning => "scanning",
            FolderState::Syncing => "syncing",
            FolderState::Error => "error",
            FolderState::Unknown => "unknown",
        }
    }
}

/// Read-only picture of a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderView {
    pub id: String,
    pub label: String,
    pub path: Option<String>,
    pub state: FolderState,
    /// Daemon state string as last reported, before sub-state folding.
    pub state_raw: Option<String>,
    pub percent: u8,
}

/// An edge in one folder's observable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderChange {
    Label(String),
    Path(Option<String>),
    State { state: FolderState, percent: u8 },
}

/// Consumer side of a folder: live view, no mutation.
#[derive(Debug, Clone)]
pub struct FolderHandle {
    id: String,
    view: watch::Receiver<FolderView>,
}

impl FolderHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn current(&self) -> FolderView {
        self.view.borrow().clone()
    }

    /// A receiver that is notified whenever the view changes.
    pub fn subscribe(&self) -> watch::Receiver<FolderView> {
        self.view.clone()
    }
}

/// One synchronized folder, owned by the session.
pub struct Folder {
    view: FolderView,
    publisher: watch::Sender<FolderView>,
    request: RequestSlot,
}

impl Folder {
    pub fn new(config: &FolderConfig) -> Self {
        let view = FolderView {
            id: config.id.clone(),
            label: label_for(config),
            path: config.path.clone(),
            state: FolderState::Unknown,
            state_raw: None,
            percent: 0,
        };
        let (publisher, _) = watch::channel(view.clone());
        Self {
            view,
            publisher,
            request: RequestSlot::default(),
        }
    }

    pub fn view(&self) -> &FolderView {
        &self.view
    }

    pub fn handle(&self) -> FolderHandle {
        FolderHandle {
            id: self.view.id.clone(),
            view: self.publisher.subscribe(),
        }
    }

    /// Takes label and path from a fresh configuration entry.
    pub fn apply_config(&mut self, config: &FolderConfig) -> Vec<FolderChange> {
        let mut changes = Vec::new();
        let label = label_for(config);
        if label != self.view.label {
            self.view.label = label.clone();
            changes.push(FolderChange::Label(label));
        }
        if config.path != self.view.path {
            self.view.path = config.path.clone();
            changes.push(FolderChange::Path(config.path.clone()));
        }
        self.publish();
        changes
    }

    pub fn apply_status(&mut self, status: &FolderStatus) -> Option<FolderChange> {
        let state = match status.state.as_deref() {
            Some(raw) => FolderState::from_daemon(raw).unwrap_or_else(|| {
                warn!(folder = %self.view.id, state = %raw, "Unrecognized folder state");
                FolderState::Unknown
            }),
            None => {
                warn!(folder = %self.view.id, "Folder status without state");
                FolderState::Unknown
            }
        };
        self.view.state_raw = status.state.clone();
        let percent = compute_percent(status.in_sync_bytes, status.global_bytes);
        self.set_state(state, percent)
    }

    /// The daemon lost track of this folder: state becomes unknown and the
    /// label and path fall back to the id-only default. Progress is kept.
    pub fn mark_unknown(&mut self) -> Vec<FolderChange> {
        let mut changes = Vec::new();
        if self.view.label != self.view.id {
            self.view.label = self.view.id.clone();
            changes.push(FolderChange::Label(self.view.label.clone()));
        }
        if self.view.path.is_some() {
            self.view.path = None;
            changes.push(FolderChange::Path(None));
        }
        self.view.state_raw = None;
        let percent = self.view.percent;
        changes.extend(self.set_state(FolderState::Unknown, percent));
        changes
    }

    /// Supersedes any status request still in flight for this folder.
    pub fn poll_status<F, D>(&mut self, ticket: Ticket, request: F, deliver: D)
    where
        F: Future<Output = Result<FolderStatus, MonitorError>> + Send + 'static,
        D: FnOnce(RequestOutcome<FolderStatus>) + Send + 'static,
    {
        self.request.issue(ticket, request, deliver);
    }

    pub fn settle(&mut self, ticket: Ticket) -> bool {
        self.request.settle(ticket)
    }

    pub fn cancel(&mut self) {
        self.request.cancel();
    }

    pub fn is_pending(&self) -> bool {
        self.request.is_pending()
    }

    fn set_state(&mut self, state: FolderState, percent: u8) -> Option<FolderChange> {
        let changed = state != self.view.state || percent != self.view.percent;
        self.view.state = state;
        self.view.percent = percent;
        self.publish();
        changed.then_some(FolderChange::State { state, percent })
    }

    fn publish(&self) {
        self.publisher.send_if_modified(|published| {
            if *published == self.view {
                false
            } else {
                *published = self.view.clone();
                true
            }
        });
    }
}

fn label_for(config: &FolderConfig) -> String {
    match config.label.as_deref().map(str::trim) {
        Some(label) if !label.is_empty() => label.to_string(),
        _ => config.id.clone(),
    }
}

/// An empty folder counts as complete.
pub fn compute_percent(in_sync_bytes: u64, global_bytes: u64) -> u8 {
    if global_bytes == 0 || in_sync_bytes >= global_bytes {
        return 100;
    }
    let percent = (in_sync_bytes as u128 * 100) / global_bytes as u128;
    percent.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(id: &str, label: Option<&str>, path: Option<&str>) -> FolderConfig {
        FolderConfig {
            id: id.to_string(),
            label: label.map(str::to_string),
            path: path.map(str::to_string),
        }
    }

    fn status(state: &str, in_sync: u64, global: u64) -> FolderStatus {
        FolderStatus {
            state: Some(state.to_string()),
            global_bytes: global,
            in_sync_bytes: in_sync,
        }
    }

    #[test]
    fn percent_is_floored_and_empty_is_complete() {
        assert_eq!(compute_percent(0, 0), 100);
        assert_eq!(compute_percent(5, 5), 100);
        assert_eq!(compute_percent(999, 1000), 99);
        assert_eq!(compute_percent(1, 3), 33);
        assert_eq!(compute_percent(u64::MAX - 1, u64::MAX), 99);
    }

    #[test]
    fn sub_states_fold_onto_canonical_states() {
        assert_eq!(FolderState::from_daemon("scan-waiting"), Some(FolderState::Scanning));
        assert_eq!(FolderState::from_daemon("sync-preparing"), Some(FolderState::Syncing));
        assert_eq!(FolderState::from_daemon("clean-waiting"), Some(FolderState::Idle));
        assert_eq!(FolderState::from_daemon("paused-ish"), None);
    }

    #[test]
    fn new_folder_defaults_label_to_id() {
        let folder = Folder::new(&config("abcd", Some(""), None));
        assert_eq!(folder.view().label, "abcd");
        assert_eq!(folder.view().state, FolderState::Unknown);
        assert_eq!(folder.view().percent, 0);
    }

    #[test]
    fn status_changes_are_edge_triggered() {
        let mut folder = Folder::new(&config("a", None, None));
        assert_eq!(
            folder.apply_status(&status("syncing", 50, 200)),
            Some(FolderChange::State {
                state: FolderState::Syncing,
                percent: 25
            })
        );
        assert_eq!(folder.apply_status(&status("sync-waiting", 50, 200)), None);
        assert_eq!(folder.view().state_raw.as_deref(), Some("sync-waiting"));
        assert_eq!(
            folder.apply_status(&status("idle", 200, 200)),
            Some(FolderChange::State {
                state: FolderState::Idle,
                percent: 100
            })
        );
    }

    #[test]
    fn unrecognized_state_maps_to_unknown() {
        let mut folder = Folder::new(&config("a", None, None));
        folder.apply_status(&status("idle", 1, 1));
        assert_eq!(
            folder.apply_status(&status("frobnicating", 1, 1)),
            Some(FolderChange::State {
                state: FolderState::Unknown,
                percent: 100
            })
        );
    }

    #[test]
    fn config_updates_report_only_real_changes() {
        let mut folder = Folder::new(&config("a", Some("Docs"), Some("/data/docs")));
        assert!(folder
            .apply_config(&config("a", Some("Docs"), Some("/data/docs")))
            .is_empty());
        assert_eq!(
            folder.apply_config(&config("a", Some("Papers"), Some("/data/docs"))),
            vec![FolderChange::Label("Papers".to_string())]
        );
    }

    #[test]
    fn mark_unknown_resets_identity_but_keeps_progress() {
        let mut folder = Folder::new(&config("a", Some("Docs"), Some("/data/docs")));
        folder.apply_status(&status("syncing", 30, 100));

        let changes = folder.mark_unknown();
        assert_eq!(
            changes,
            vec![
                FolderChange::Label("a".to_string()),
                FolderChange::Path(None),
                FolderChange::State {
                    state: FolderState::Unknown,
                    percent: 30
                },
            ]
        );
        assert!(folder.mark_unknown().is_empty());
    }

    #[test]
    fn handle_follows_the_folder() {
        let mut folder = Folder::new(&config("a", None, None));
        let handle = folder.handle();
        let mut updates = handle.subscribe();

        folder.apply_status(&status("scanning", 0, 10));
        assert!(updates.has_changed().expect("sender alive"));
        assert_eq!(handle.current().state, FolderState::Scanning);
        assert_eq!(handle.id(), "a");
    }
}
