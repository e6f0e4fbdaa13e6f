//! Server → Client payloads

use serde::{Deserialize, Serialize};

use crate::types::*;

/// Envelope every endpoint wraps its payload in.
///
/// `message` is empty on success; when set it carries a human readable
/// error together with the server-side `requestId` for correlation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
pub struct ResponseEnvelope<T> {
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub request_id: Option<String>,
}

impl<T> ResponseEnvelope<T> {
    pub fn has_message(&self) -> bool {
        !self.message.trim().is_empty()
    }
}

impl<T> Default for ResponseEnvelope<T> {
    fn default() -> Self {
        Self {
            data: None,
            message: String::new(),
            request_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorGuidesData {
    #[serde(default)]
    pub operator_guides: Vec<Guide>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusOptionsData {
    #[serde(default)]
    pub status_option: Vec<StatusOption>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorEventsData {
    #[serde(default)]
    pub events: Vec<MonitorEvent>,
}

/// One full-replacement update of the operator's guide list.
///
/// `guides` is `None` when the server pushed an error frame without data;
/// such a frame must not wipe the collection currently on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub guides: Option<Vec<Guide>>,
    pub message: String,
    pub request_id: Option<String>,
}

impl Snapshot {
    pub fn from_guides(guides: Vec<Guide>) -> Self {
        Self {
            guides: Some(guides),
            message: String::new(),
            request_id: None,
        }
    }

    /// Decode one SSE `data` payload
    pub fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        let envelope: ResponseEnvelope<OperatorGuidesData> = serde_json::from_str(payload)?;
        Ok(Self::from(envelope))
    }
}

impl From<ResponseEnvelope<OperatorGuidesData>> for Snapshot {
    fn from(envelope: ResponseEnvelope<OperatorGuidesData>) -> Self {
        Self {
            guides: envelope.data.map(|d| d.operator_guides),
            message: envelope.message,
            request_id: envelope.request_id,
        }
    }
}

/// Monitor board update (read-only feed)
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSnapshot {
    pub events: Option<Vec<MonitorEvent>>,
    pub message: String,
    pub request_id: Option<String>,
}

impl MonitorSnapshot {
    pub fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        let envelope: ResponseEnvelope<MonitorEventsData> = serde_json::from_str(payload)?;
        Ok(Self {
            events: envelope.data.map(|d| d.events),
            message: envelope.message,
            request_id: envelope.request_id,
        })
    }
}
