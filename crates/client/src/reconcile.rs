//! Snapshot reconciliation.
//!
//! Each snapshot replaces the collection wholesale; the selection is then
//! re-derived by identity against the new collection.

use guidewatch_protocol::{Guide, GuideId, Snapshot};

use crate::state::{DisplayOrder, OperatorContext};
use crate::workflow::{Effect, OperatorState, SoftError, WorkflowPhase};

/// Stable partition: items matching `pred` first, input order kept within
/// each group.
pub fn highlight_first<T>(items: Vec<T>, pred: impl Fn(&T) -> bool) -> Vec<T> {
    let (mut first, rest): (Vec<T>, Vec<T>) = items.into_iter().partition(|item| pred(item));
    first.extend(rest);
    first
}

pub fn order_for_display(guides: Vec<Guide>, order: DisplayOrder) -> Vec<Guide> {
    match order {
        DisplayOrder::Server => guides,
        DisplayOrder::HighlightFirst => highlight_first(guides, |g| g.highlight),
    }
}

/// Fresh copy of the selected guide from `collection`, if still present
pub fn resolve_selection(collection: &[Guide], selected: &GuideId) -> Option<Guide> {
    collection.iter().find(|g| &g.guide_id == selected).cloned()
}

pub(crate) fn reconcile(
    state: &mut OperatorState,
    snapshot: Snapshot,
    ctx: &OperatorContext,
    effects: &mut Vec<Effect>,
) {
    state.soft_error = if snapshot.message.trim().is_empty() {
        None
    } else {
        Some(SoftError {
            message: snapshot.message,
            request_id: snapshot.request_id,
        })
    };

    // An error frame without data leaves what is on screen alone.
    let Some(guides) = snapshot.guides else {
        return;
    };
    state.collection = order_for_display(guides, ctx.display_order);

    let Some(selected) = state.selected_id().cloned() else {
        return;
    };
    let Some(fresh) = resolve_selection(&state.collection, &selected) else {
        state.clear_selection();
        return;
    };

    match fresh.assigned_operator() {
        Some(id) if id == ctx.operator_id => state.read_only = false,
        Some(_) => {
            state.read_only = true;
            if state.phase == WorkflowPhase::ConfirmPending {
                state.pending_status_change = None;
                state.phase = WorkflowPhase::OptionsReady;
            }
        }
        None => {}
    }
    state.selection = Some(fresh);

    // While the assignment is in flight its completion drives the fetch.
    if !state.read_only && state.phase != WorkflowPhase::Selected {
        state.request_status_options(effects);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{assigned, delivered, guide, highlighted, OPERATOR, OTHER_OPERATOR};
    use crate::workflow::PendingStatusChange;

    fn ctx() -> OperatorContext {
        OperatorContext::new(OPERATOR)
    }

    fn selected(state: &mut OperatorState, g: Guide, phase: WorkflowPhase) {
        state.collection = vec![g.clone()];
        state.selection = Some(g);
        state.phase = phase;
    }

    fn ids(guides: &[Guide]) -> Vec<&str> {
        guides.iter().map(|g| g.guide_id.as_str()).collect()
    }

    #[test]
    fn highlighted_guides_come_first_stably() {
        let ordered = order_for_display(
            vec![
                guide("A"),
                highlighted(guide("B")),
                guide("C"),
                highlighted(guide("D")),
            ],
            DisplayOrder::HighlightFirst,
        );
        assert_eq!(ids(&ordered), vec!["B", "D", "A", "C"]);
    }

    #[test]
    fn server_order_is_kept_verbatim() {
        let ordered = order_for_display(
            vec![guide("A"), highlighted(guide("B"))],
            DisplayOrder::Server,
        );
        assert_eq!(ids(&ordered), vec!["A", "B"]);
    }

    #[test]
    fn two_guide_snapshot_shows_highlight_first() {
        let mut g1 = guide("G1");
        g1.status = "pending".into();
        let mut g2 = highlighted(guide("G2"));
        g2.status = "pending".into();

        let mut state = OperatorState::default();
        let mut effects = Vec::new();
        reconcile(&mut state, Snapshot::from_guides(vec![g1, g2]), &ctx(), &mut effects);
        assert_eq!(ids(&state.collection), vec!["G2", "G1"]);
        assert!(effects.is_empty());
    }

    #[test]
    fn resolve_selection_is_identity_lookup() {
        let collection = vec![guide("G1"), guide("G2")];
        assert_eq!(
            resolve_selection(&collection, &GuideId::new("G2")),
            Some(guide("G2"))
        );
        assert_eq!(resolve_selection(&collection, &GuideId::new("G3")), None);
    }

    #[test]
    fn missing_selection_is_cleared_with_its_options() {
        let mut state = OperatorState::default();
        selected(&mut state, assigned(guide("G1"), OPERATOR), WorkflowPhase::OptionsReady);
        state.status_options = vec![delivered()];

        let mut effects = Vec::new();
        reconcile(
            &mut state,
            Snapshot::from_guides(vec![guide("G2")]),
            &ctx(),
            &mut effects,
        );
        assert!(state.selection.is_none());
        assert!(state.status_options.is_empty());
        assert_eq!(state.phase, WorkflowPhase::Idle);
        assert!(effects.is_empty());
    }

    #[test]
    fn surviving_selection_takes_fresh_fields_and_refetches() {
        let mut state = OperatorState::default();
        selected(&mut state, assigned(guide("G1"), OPERATOR), WorkflowPhase::OptionsReady);
        state.status_options = vec![delivered()];

        let mut fresh = assigned(guide("G1"), OPERATOR);
        fresh.status = "inTransit".into();
        fresh.recipient = "Someone else".into();

        let mut effects = Vec::new();
        reconcile(
            &mut state,
            Snapshot::from_guides(vec![guide("G0"), fresh.clone()]),
            &ctx(),
            &mut effects,
        );
        assert_eq!(state.selection.as_ref(), Some(&fresh));
        assert!(state.status_options.is_empty());
        assert!(state.loading_status_options);
        assert_eq!(state.phase, WorkflowPhase::OptionsLoading);
        assert!(matches!(
            effects.as_slice(),
            [Effect::FetchStatusOptions { guide_id, .. }] if guide_id.as_str() == "G1"
        ));
    }

    #[test]
    fn pending_assignment_is_not_refetched() {
        let mut state = OperatorState::default();
        selected(&mut state, guide("G1"), WorkflowPhase::Selected);

        let mut effects = Vec::new();
        reconcile(
            &mut state,
            Snapshot::from_guides(vec![guide("G1")]),
            &ctx(),
            &mut effects,
        );
        assert_eq!(state.phase, WorkflowPhase::Selected);
        assert!(effects.is_empty());
    }

    #[test]
    fn takeover_by_other_operator_drops_unconfirmed_change() {
        let mut state = OperatorState::default();
        selected(&mut state, assigned(guide("G1"), OPERATOR), WorkflowPhase::ConfirmPending);
        state.pending_status_change = Some(PendingStatusChange {
            guide_id: GuideId::new("G1"),
            status: delivered(),
            via_guide_id: None,
        });

        let mut effects = Vec::new();
        reconcile(
            &mut state,
            Snapshot::from_guides(vec![assigned(guide("G1"), OTHER_OPERATOR)]),
            &ctx(),
            &mut effects,
        );
        assert!(state.read_only);
        assert!(state.pending_status_change.is_none());
        assert_eq!(state.phase, WorkflowPhase::OptionsReady);
        assert!(effects.is_empty());
    }

    #[test]
    fn soft_error_is_surfaced_without_touching_collection() {
        let mut state = OperatorState::default();
        state.collection = vec![guide("G1")];

        let mut effects = Vec::new();
        reconcile(
            &mut state,
            Snapshot {
                guides: None,
                message: "Servicio degradado".into(),
                request_id: Some("req-7".into()),
            },
            &ctx(),
            &mut effects,
        );
        assert_eq!(ids(&state.collection), vec!["G1"]);
        let soft = state.soft_error.clone().unwrap();
        assert_eq!(soft.message, "Servicio degradado");
        assert_eq!(soft.request_id.as_deref(), Some("req-7"));

        reconcile(
            &mut state,
            Snapshot::from_guides(vec![guide("G1"), guide("G2")]),
            &ctx(),
            &mut effects,
        );
        assert!(state.soft_error.is_none());
        assert_eq!(state.collection.len(), 2);
    }

    #[test]
    fn soft_error_with_data_still_updates_collection() {
        let mut state = OperatorState::default();
        let mut effects = Vec::new();
        reconcile(
            &mut state,
            Snapshot {
                guides: Some(vec![guide("G5")]),
                message: "partial".into(),
                request_id: None,
            },
            &ctx(),
            &mut effects,
        );
        assert_eq!(ids(&state.collection), vec!["G5"]);
        assert!(state.soft_error.is_some());
    }
}
