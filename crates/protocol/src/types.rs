//! Core types shared across the protocol

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable guide identifier.
///
/// The server emits numeric ids, older payloads and fixtures use strings.
/// Both decode to the same textual form so identity lookups never depend
/// on which one arrived.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawGuideId", into = "String")]
pub struct GuideId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawGuideId {
    Number(i64),
    Text(String),
}

impl From<RawGuideId> for GuideId {
    fn from(raw: RawGuideId) -> Self {
        match raw {
            RawGuideId::Number(n) => GuideId(n.to_string()),
            RawGuideId::Text(s) => GuideId(s),
        }
    }
}

impl From<GuideId> for String {
    fn from(id: GuideId) -> Self {
        id.0
    }
}

impl GuideId {
    pub fn new(id: impl Into<String>) -> Self {
        GuideId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for GuideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Operator a guide is assigned to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorRef {
    pub id: i64,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
}

/// A work item tracked by the operator desk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guide {
    #[serde(alias = "id")]
    pub guide_id: GuideId,
    #[serde(default)]
    pub via_guide_id: String,
    #[serde(default)]
    pub recipient: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub last_change: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payment: String,
    #[serde(default)]
    pub operator: Option<OperatorRef>,
    #[serde(default)]
    pub selectable: bool,
    #[serde(default)]
    pub highlight: bool,
}

impl Guide {
    /// Operator id the guide is assigned to, if any.
    ///
    /// The server encodes "nobody" either as a missing/null operator or as
    /// the zero-valued operator record.
    pub fn assigned_operator(&self) -> Option<i64> {
        self.operator
            .as_ref()
            .map(|op| op.id)
            .filter(|id| *id != 0)
    }

    pub fn is_unassigned(&self) -> bool {
        self.assigned_operator().is_none()
    }
}

/// A status the selected guide may move to next
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusOption {
    pub id: String,
    #[serde(default)]
    pub description: String,
}

impl StatusOption {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

/// One row of the public monitor board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorEvent {
    pub guide_id: String,
    #[serde(default)]
    pub recipient: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub highlight: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guide_id_accepts_numbers_and_strings() {
        let numeric: GuideId = serde_json::from_str("42").unwrap();
        let text: GuideId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(numeric, text);
        assert_eq!(numeric.as_str(), "42");
    }

    #[test]
    fn guide_decodes_server_payload() {
        let json = r#"{
            "guideId": 7,
            "viaGuideId": "V-0007",
            "recipient": "Ana",
            "status": "pendingPayment",
            "lastChange": "2025-03-01T10:00:00Z",
            "payment": "paidOnDestination",
            "operator": {"id": 3, "account": "op3", "name": "Op", "enabled": true},
            "selectable": true
        }"#;
        let guide: Guide = serde_json::from_str(json).unwrap();
        assert_eq!(guide.guide_id, GuideId::new("7"));
        assert_eq!(guide.assigned_operator(), Some(3));
        assert!(guide.selectable);
        assert!(!guide.highlight);
        assert!(guide.last_change.is_some());
    }

    #[test]
    fn zero_operator_counts_as_unassigned() {
        let json = r#"{"id": "G1", "operator": {"id": 0, "account": "", "name": "", "enabled": false}}"#;
        let guide: Guide = serde_json::from_str(json).unwrap();
        assert!(guide.is_unassigned());

        let json = r#"{"id": "G2", "operator": null}"#;
        let guide: Guide = serde_json::from_str(json).unwrap();
        assert!(guide.is_unassigned());
    }
}
