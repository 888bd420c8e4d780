mod http;
mod request;

pub use http::{DaemonApi, Endpoint, HttpClient};
pub use request::{RequestOutcome, RequestSlot, Ticket};
