//! RawMessage - Ingestion output
//!
//! Opaque payload as delivered by the broker callback.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Topic;

/// Message received from the inbound source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    /// Concrete topic the message was published on
    pub topic: Topic,

    /// Raw payload bytes (zero-copy)
    pub payload: Bytes,

    /// Wall-clock arrival time
    pub received_at: DateTime<Utc>,
}

impl RawMessage {
    /// Create a message stamped with the current time
    pub fn new(topic: impl Into<Topic>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
