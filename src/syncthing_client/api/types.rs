use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// `GET /rest/system/config`. `version`, `folders` and `devices` must all be
/// present for the body to count as a configuration; a null `version` does
/// not count.
#[derive(Debug, Deserialize, Clone)]
pub struct SystemConfig {
    #[serde(deserialize_with = "non_null")]
    pub version: Value,
    pub folders: Vec<FolderConfig>,
    pub devices: Vec<Value>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct FolderConfig {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

/// `GET /rest/db/status?folder=<id>`
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FolderStatus {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, rename = "globalBytes")]
    pub global_bytes: u64,
    #[serde(default, rename = "inSyncBytes")]
    pub in_sync_bytes: u64,
}

/// `GET /rest/system/connections`
#[derive(Debug, Deserialize, Clone)]
pub struct ConnectionsResponse {
    pub connections: Map<String, Value>,
    pub total: ConnectionTotals,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionTotals {
    pub at: DateTime<Utc>,
    #[serde(rename = "inBytesTotal")]
    pub in_bytes_total: u64,
    #[serde(rename = "outBytesTotal")]
    pub out_bytes_total: u64,
}

fn non_null<'de, D>(deserializer: D) -> Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Err(D::Error::custom("version is null")),
        value => Ok(value),
    }
}
