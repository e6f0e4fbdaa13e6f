//! Guidewatch Protocol
//!
//! Wire types shared by the operator and monitor clients.
//! Everything here is JSON, either pushed over Server-Sent Events
//! or returned by the one-shot REST endpoints.

use uuid::Uuid;

pub mod client;
pub mod server;
pub mod types;

pub use client::{AssignRequest, ChangeStatusRequest};
pub use server::{
    MonitorEventsData, MonitorSnapshot, OperatorGuidesData, ResponseEnvelope, Snapshot,
    StatusOptionsData,
};
pub use types::*;

/// Generate a correlation id for an outbound request
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}
