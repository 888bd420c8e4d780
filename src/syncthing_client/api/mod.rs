mod queries;
mod types;

pub use queries::FolderStatusQuery;
pub use types::{ConnectionTotals, ConnectionsResponse, FolderConfig, FolderStatus, SystemConfig};
