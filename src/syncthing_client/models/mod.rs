mod connection;
mod folder;
mod throughput;

pub use connection::ConnectionState;
pub use folder::{Folder, FolderChange, FolderHandle, FolderState, FolderView};
pub use throughput::{ThroughputClassifier, ThroughputReading, ThroughputState, TotalsSample};
