mod api;
mod core;
mod events;
mod models;
mod session;
#[cfg(test)]
mod testing;

pub use api::{ConnectionTotals, ConnectionsResponse, FolderConfig, FolderStatus, SystemConfig};
pub use core::{DaemonApi, Endpoint, HttpClient, RequestOutcome};
pub use events::SessionEvent;
pub use models::{
    ConnectionState, FolderHandle, FolderState, FolderView, ThroughputReading, ThroughputState,
};
pub use session::{Session, SessionOptions, SessionSnapshot};
