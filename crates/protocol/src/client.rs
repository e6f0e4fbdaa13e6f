//! Client → Server request bodies

use serde::{Deserialize, Serialize};

/// Body of `POST /guide/{id}/assign`. The server takes the operator from
/// the authenticated session, so the body is an empty object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignRequest {}

/// Body of `PUT /guide/{id}/status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
}
