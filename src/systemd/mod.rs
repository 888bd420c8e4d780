mod client;
mod monitor;
mod types;

pub use client::{ServiceControl, SystemctlService};
pub use monitor::ServiceMonitor;
pub use types::{ServiceAction, ServiceState};
