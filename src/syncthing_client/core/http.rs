use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::syncthing_client::api::{
    ConnectionsResponse, FolderStatus, FolderStatusQuery, SystemConfig,
};
use crate::types::{MonitorError, CSRF_ERROR_BODY};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

/// Address and credentials of one daemon instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    uri: String,
    api_key: Option<String>,
}

impl Endpoint {
    /// An empty API key is treated as no key at all.
    pub fn new(uri: impl Into<String>, api_key: Option<String>) -> Self {
        let uri = uri.into();
        Self {
            uri: uri.trim().trim_end_matches('/').to_string(),
            api_key: api_key
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.uri, path.trim_start_matches('/'))
    }
}

/// The slice of the daemon's REST API the monitor consumes.
#[async_trait]
pub trait DaemonApi: Send + Sync + 'static {
    async fn system_config(&self, endpoint: &Endpoint) -> Result<SystemConfig, MonitorError>;

    async fn folder_status(
        &self,
        endpoint: &Endpoint,
        folder: &str,
    ) -> Result<FolderStatus, MonitorError>;

    async fn connections(&self, endpoint: &Endpoint) -> Result<ConnectionsResponse, MonitorError>;
}

/// Handles low-level HTTP communication with the Syncthing API.
#[derive(Clone)]
pub struct HttpClient {
    http: Client,
}

impl HttpClient {
    pub fn new() -> Result<Self, MonitorError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(MonitorError::Http)?;
        Ok(Self { http })
    }

    /// Performs a GET request and deserializes the JSON response.
    pub async fn get_json<T>(&self, endpoint: &Endpoint, path: &str) -> Result<T, MonitorError>
    where
        T: DeserializeOwned,
    {
        self.get_json_with_query(endpoint, path, &()).await
    }

    /// Performs a GET request with query parameters and deserializes the JSON response.
    pub async fn get_json_with_query<T, Q>(
        &self,
        endpoint: &Endpoint,
        path: &str,
        query: &Q,
    ) -> Result<T, MonitorError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let mut request = self.http.get(endpoint.url(path)).query(query);
        if let Some(api_key) = endpoint.api_key() {
            request = request.header("X-API-Key", api_key);
        }
        let response = request.send().await.map_err(MonitorError::from_transport)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(MonitorError::from_transport)?;

        if body == CSRF_ERROR_BODY {
            return Err(MonitorError::CsrfRejected {
                path: path.to_string(),
            });
        }
        if !status.is_success() {
            let body = body.trim();
            return Err(MonitorError::Status {
                path: path.to_string(),
                status,
                body: (!body.is_empty()).then(|| body.to_string()),
            });
        }

        serde_json::from_str(&body)
            .map_err(|err| MonitorError::Protocol(format!("{path}: {err}")))
    }
}

#[async_trait]
impl DaemonApi for HttpClient {
    async fn system_config(&self, endpoint: &Endpoint) -> Result<SystemConfig, MonitorError> {
        self.get_json(endpoint, "/rest/system/config").await
    }

    async fn folder_status(
        &self,
        endpoint: &Endpoint,
        folder: &str,
    ) -> Result<FolderStatus, MonitorError> {
        let query = FolderStatusQuery { folder };
        self.get_json_with_query(endpoint, "/rest/db/status", &query)
            .await
    }

    async fn connections(&self, endpoint: &Endpoint) -> Result<ConnectionsResponse, MonitorError> {
        self.get_json(endpoint, "/rest/system/connections").await
    }
}
