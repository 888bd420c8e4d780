use std::error::Error as _;

use reqwest::StatusCode;
use thiserror::Error;

/// Body the daemon sends when a request carries a missing or wrong API key.
pub const CSRF_ERROR_BODY: &str = "CSRF Error\n";

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("systemd error: {0}")]
    Systemd(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("tls error: {0}")]
    Tls(String),
    #[error("{path} returned {status}")]
    Status {
        path: String,
        status: StatusCode,
        body: Option<String>,
    },
    #[error("{path} rejected the request (CSRF error), verify the API key")]
    CsrfRejected { path: String },
    #[error("syncthing responded with unparseable data: {0}")]
    Protocol(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("file watch error: {0}")]
    Watch(#[from] notify::Error),
}

/// Coarse failure class used to log each kind of daemon failure distinctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transport,
    Tls,
    Status,
    Csrf,
    Protocol,
    Local,
}

impl MonitorError {
    /// Wraps a transport error, separating TLS handshake failures from the rest.
    pub fn from_transport(err: reqwest::Error) -> Self {
        let mut source = err.source();
        while let Some(inner) = source {
            let text = inner.to_string().to_ascii_lowercase();
            if text.contains("certificate") || text.contains("tls") || text.contains("handshake")
            {
                return MonitorError::Tls(inner.to_string());
            }
            source = inner.source();
        }
        MonitorError::Http(err)
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            MonitorError::Http(_) => FailureKind::Transport,
            MonitorError::Tls(_) => FailureKind::Tls,
            MonitorError::Status { .. } => FailureKind::Status,
            MonitorError::CsrfRejected { .. } => FailureKind::Csrf,
            MonitorError::Protocol(_) | MonitorError::Json(_) => FailureKind::Protocol,
            MonitorError::Systemd(_)
            | MonitorError::Io(_)
            | MonitorError::Config(_)
            | MonitorError::Watch(_) => FailureKind::Local,
        }
    }
}
