use super::models::{ConnectionState, FolderHandle, FolderState, FolderView, ThroughputState};

/// Notifications emitted by a [`Session`](super::Session). Every event is
/// edge triggered: it is only sent when the value it carries differs from the
/// previous one.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    ConnectionStateChanged(ConnectionState),
    ThroughputStateChanged(ThroughputState),
    FolderAdded(FolderHandle),
    /// Carries the folder as it looked when it was dropped.
    FolderRemoved(FolderView),
    FolderStateChanged {
        id: String,
        state: FolderState,
        percent: u8,
    },
    FolderLabelChanged {
        id: String,
        label: String,
    },
    FolderPathChanged {
        id: String,
        path: Option<String>,
    },
}
