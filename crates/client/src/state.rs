//! Operator context and the read model published to the console.

use clap::ValueEnum;
use guidewatch_protocol::{Guide, StatusOption};
use serde::{Deserialize, Serialize};

use crate::workflow::{Notice, PendingStatusChange, SoftError, StreamPhase, WorkflowPhase};

/// Which guides the operator may claim by selecting them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ClaimPolicy {
    /// Claim only unassigned guides; guides held by other operators open read-only.
    #[default]
    Strict,
    /// Claim every guide not already held by this operator.
    Reassign,
}

/// Order the guide collection is displayed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum DisplayOrder {
    /// Server order, untouched.
    Server,
    /// Highlighted guides first, server order otherwise.
    #[default]
    HighlightFirst,
}

/// Identity of the operator driving this console, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorContext {
    pub operator_id: i64,
    pub claim_policy: ClaimPolicy,
    pub display_order: DisplayOrder,
}

impl OperatorContext {
    pub fn new(operator_id: i64) -> Self {
        Self {
            operator_id,
            claim_policy: ClaimPolicy::default(),
            display_order: DisplayOrder::default(),
        }
    }

    /// Whether this operator already holds the guide
    pub fn owns(&self, guide: &Guide) -> bool {
        guide.assigned_operator() == Some(self.operator_id)
    }

    /// Whether selecting the guide should issue an assignment request
    pub fn should_claim(&self, guide: &Guide) -> bool {
        if self.owns(guide) {
            return false;
        }
        match self.claim_policy {
            ClaimPolicy::Strict => guide.is_unassigned(),
            ClaimPolicy::Reassign => true,
        }
    }
}

/// Immutable view of the operator state, swapped in after every event.
#[derive(Debug, Clone, Default)]
pub struct OperatorView {
    pub revision: u64,
    pub collection: Vec<Guide>,
    pub selection: Option<Guide>,
    pub read_only: bool,
    pub status_options: Vec<StatusOption>,
    pub loading_status_options: bool,
    pub pending_status_change: Option<PendingStatusChange>,
    pub phase: WorkflowPhase,
    pub stream: StreamPhase,
    pub stream_error: Option<String>,
    pub soft_error: Option<SoftError>,
    pub notice: Option<Notice>,
    pub success: bool,
    pub elapsed_time: Option<String>,
}

impl OperatorView {
    /// Whether the console should offer status changes right now
    pub fn can_propose(&self) -> bool {
        self.selection.is_some()
            && !self.read_only
            && matches!(
                self.phase,
                WorkflowPhase::OptionsReady | WorkflowPhase::ConfirmPending
            )
    }

    pub fn find_status_option(&self, status_id: &str) -> Option<&StatusOption> {
        self.status_options.iter().find(|o| o.id == status_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{assigned, guide, OPERATOR, OTHER_OPERATOR};

    #[test]
    fn strict_policy_claims_only_unassigned() {
        let ctx = OperatorContext::new(OPERATOR);
        assert!(ctx.should_claim(&guide("G1")));
        assert!(ctx.should_claim(&assigned(guide("G1"), 0)));
        assert!(!ctx.should_claim(&assigned(guide("G1"), OPERATOR)));
        assert!(!ctx.should_claim(&assigned(guide("G1"), OTHER_OPERATOR)));
    }

    #[test]
    fn reassign_policy_claims_anything_not_owned() {
        let ctx = OperatorContext {
            claim_policy: ClaimPolicy::Reassign,
            ..OperatorContext::new(OPERATOR)
        };
        assert!(ctx.should_claim(&assigned(guide("G1"), OTHER_OPERATOR)));
        assert!(!ctx.should_claim(&assigned(guide("G1"), OPERATOR)));
    }
}
