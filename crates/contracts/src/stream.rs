//! Host protocol types
//!
//! Request/response shapes exchanged with the host that issues queries,
//! attaches consumers to the live stream and polls health.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Frame;

/// Path of the single live stream exposed by a datasource instance
pub const STREAM_PATH: &str = "stream";

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Ok,
    Error,
}

/// Health check result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckHealthResult {
    pub status: HealthStatus,
    pub message: String,
}

/// One query inside a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQuery {
    /// Query identifier, echoed in the response map
    pub ref_id: String,

    /// Raw query payload (JSON, see `QueryModel`)
    pub json: String,
}

impl DataQuery {
    pub fn new(ref_id: impl Into<String>, json: impl Into<String>) -> Self {
        Self {
            ref_id: ref_id.into(),
            json: json.into(),
        }
    }
}

/// Batch of queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDataRequest {
    pub queries: Vec<DataQuery>,
}

/// Result of one query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataResponse {
    pub frames: Vec<Frame>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DataResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            frames: Vec::new(),
            error: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Results keyed by `ref_id`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDataResponse {
    pub responses: BTreeMap<String, DataResponse>,
}

/// Answer to a consumer asking to attach to a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscribeStreamStatus {
    Ok,
    NotFound,
    PermissionDenied,
}

/// Answer to a client trying to publish into a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStreamStatus {
    Ok,
    NotFound,
    PermissionDenied,
}
