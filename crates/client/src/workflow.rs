//! Pure operator state transition function
//!
//! All operator logic lives here as a synchronous function:
//! `transition(state, input, ctx, now) -> (state, effects)`.
//! No IO, no async, no logging. The actor owns the state and executes
//! the returned effects.

use chrono::{DateTime, Utc};
use guidewatch_protocol::{Guide, GuideId, Snapshot, StatusOption, StatusOptionsData};
use serde_json::Value;

use crate::api::ApiResponse;
use crate::clock::format_elapsed;
use crate::probe::AuthState;
use crate::reconcile::reconcile;
use crate::state::{OperatorContext, OperatorView};

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// Confirm/commit lifecycle of the current selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkflowPhase {
    #[default]
    Idle,
    /// Waiting on the assignment request for the selected guide.
    Selected,
    OptionsLoading,
    OptionsReady,
    ConfirmPending,
    Committing,
}

/// Lifecycle of the push stream.
///
/// A break is only a signal; `Classifying` waits for the session probe
/// before deciding between `Redirecting` and `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPhase {
    #[default]
    Connecting,
    Live,
    Classifying,
    Redirecting,
    Idle,
    Closed,
}

// ---------------------------------------------------------------------------
// Records surfaced to the console
// ---------------------------------------------------------------------------

/// A proposed, not yet committed status change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingStatusChange {
    pub guide_id: GuideId,
    pub status: StatusOption,
    pub via_guide_id: Option<String>,
}

/// Error carried inline by a well-formed snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftError {
    pub message: String,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    AssignFailed,
    OptionsFailed,
    CommitFailed,
}

impl NoticeKind {
    fn default_message(self) -> &'static str {
        match self {
            NoticeKind::AssignFailed => "Failed to assign the guide to the operator",
            NoticeKind::OptionsFailed => "Failed to load status options",
            NoticeKind::CommitFailed => "Failed to change the guide status",
        }
    }
}

/// User-visible failure of a one-shot request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub status: u16,
    pub message: String,
    pub request_id: Option<String>,
}

impl Notice {
    pub fn from_response<T>(kind: NoticeKind, response: &ApiResponse<T>) -> Self {
        let message = if response.content.has_message() {
            response.content.message.clone()
        } else {
            kind.default_message().to_string()
        };
        Self {
            kind,
            status: response.status,
            message,
            request_id: response.content.request_id.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// OperatorState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct OperatorState {
    pub collection: Vec<Guide>,
    pub selection: Option<Guide>,
    pub read_only: bool,
    pub status_options: Vec<StatusOption>,
    pub loading_status_options: bool,
    /// Bumped on every options request; stale completions carry an old one.
    pub options_ticket: u64,
    pub pending_status_change: Option<PendingStatusChange>,
    /// Bumped per commit and on cancel, so a late completion is dropped.
    pub commit_ticket: u64,
    pub phase: WorkflowPhase,
    pub stream: StreamPhase,
    pub stream_error: Option<String>,
    pub soft_error: Option<SoftError>,
    pub notice: Option<Notice>,
    pub success: bool,
    pub elapsed_time: Option<String>,
}

impl OperatorState {
    pub fn to_view(&self, revision: u64) -> OperatorView {
        OperatorView {
            revision,
            collection: self.collection.clone(),
            selection: self.selection.clone(),
            read_only: self.read_only,
            status_options: self.status_options.clone(),
            loading_status_options: self.loading_status_options,
            pending_status_change: self.pending_status_change.clone(),
            phase: self.phase,
            stream: self.stream,
            stream_error: self.stream_error.clone(),
            soft_error: self.soft_error.clone(),
            notice: self.notice.clone(),
            success: self.success,
            elapsed_time: self.elapsed_time.clone(),
        }
    }

    pub fn selected_id(&self) -> Option<&GuideId> {
        self.selection.as_ref().map(|g| &g.guide_id)
    }

    fn is_selected(&self, guide_id: &GuideId) -> bool {
        self.selected_id() == Some(guide_id)
    }

    /// Drop the selection and everything derived from it.
    pub(crate) fn clear_selection(&mut self) {
        self.selection = None;
        self.read_only = false;
        self.status_options.clear();
        self.loading_status_options = false;
        self.options_ticket += 1;
        if self.phase == WorkflowPhase::Committing {
            self.commit_ticket += 1;
        }
        self.pending_status_change = None;
        self.phase = WorkflowPhase::Idle;
    }

    /// Clear options before re-fetching so the previous guide's options
    /// never show during the request window.
    pub(crate) fn request_status_options(&mut self, effects: &mut Vec<Effect>) {
        let Some(guide_id) = self.selected_id().cloned() else {
            return;
        };
        self.status_options.clear();
        self.loading_status_options = true;
        self.options_ticket += 1;
        if matches!(
            self.phase,
            WorkflowPhase::Idle | WorkflowPhase::Selected | WorkflowPhase::OptionsReady
        ) {
            self.phase = WorkflowPhase::OptionsLoading;
        }
        effects.push(Effect::FetchStatusOptions {
            guide_id,
            ticket: self.options_ticket,
        });
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Input {
    // -- Stream --
    SnapshotReceived(Snapshot),
    StreamBroken {
        reason: String,
    },
    ProbeCompleted(AuthState),
    ReconnectDue,

    // -- User --
    Select {
        guide_id: GuideId,
    },
    ProposeStatus {
        status: StatusOption,
        via_guide_id: Option<String>,
    },
    ConfirmCommit,
    Cancel,
    DismissSuccess,
    DismissNotice,

    // -- Request completions --
    AssignCompleted {
        guide_id: GuideId,
        response: ApiResponse<Value>,
    },
    OptionsLoaded {
        guide_id: GuideId,
        ticket: u64,
        response: ApiResponse<StatusOptionsData>,
    },
    CommitCompleted {
        guide_id: GuideId,
        ticket: u64,
        response: ApiResponse<Value>,
    },

    // -- Clock --
    Tick,
}

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    AssignGuide {
        guide_id: GuideId,
    },
    FetchStatusOptions {
        guide_id: GuideId,
        ticket: u64,
    },
    CommitStatus {
        guide_id: GuideId,
        status_id: String,
        ticket: u64,
    },
    Probe,
    CloseStream,
    OpenStream,
    ScheduleReconnect,
    ResetReconnect,
    Redirect {
        status: u16,
    },
    /// A user action that does not apply in the current state.
    Refused {
        action: &'static str,
        reason: &'static str,
    },
}

fn refuse(effects: &mut Vec<Effect>, action: &'static str, reason: &'static str) {
    effects.push(Effect::Refused { action, reason });
}

// ---------------------------------------------------------------------------
// transition
// ---------------------------------------------------------------------------

/// Pure, synchronous state transition.
///
/// Returns the new state and the IO the caller must perform.
pub fn transition(
    mut state: OperatorState,
    input: Input,
    ctx: &OperatorContext,
    now: DateTime<Utc>,
) -> (OperatorState, Vec<Effect>) {
    let mut effects: Vec<Effect> = Vec::new();

    match input {
        // -- Stream -----------------------------------------------------------
        Input::SnapshotReceived(snapshot) => {
            if state.stream == StreamPhase::Closed {
                return (state, effects);
            }
            if state.stream != StreamPhase::Live {
                effects.push(Effect::ResetReconnect);
            }
            state.stream = StreamPhase::Live;
            state.stream_error = None;
            reconcile(&mut state, snapshot, ctx, &mut effects);
        }

        Input::StreamBroken { reason } => {
            if matches!(
                state.stream,
                StreamPhase::Closed | StreamPhase::Classifying | StreamPhase::Redirecting
            ) {
                return (state, effects);
            }
            state.stream = StreamPhase::Classifying;
            state.stream_error = Some(reason);
            effects.push(Effect::CloseStream);
            effects.push(Effect::Probe);
        }

        Input::ProbeCompleted(auth) => {
            if state.stream != StreamPhase::Classifying {
                return (state, effects);
            }
            match auth {
                AuthState::Unauthorized => {
                    state.stream = StreamPhase::Redirecting;
                    effects.push(Effect::Redirect { status: 401 });
                }
                AuthState::Other => {
                    state.stream = StreamPhase::Idle;
                    effects.push(Effect::ScheduleReconnect);
                }
            }
        }

        Input::ReconnectDue => {
            if state.stream == StreamPhase::Idle {
                state.stream = StreamPhase::Connecting;
                effects.push(Effect::OpenStream);
            }
        }

        // -- User -------------------------------------------------------------
        Input::Select { guide_id } => {
            if state.phase == WorkflowPhase::Committing {
                refuse(&mut effects, "select", "commit in flight");
                return finish(state, effects, now);
            }
            let Some(guide) = state
                .collection
                .iter()
                .find(|g| g.guide_id == guide_id)
                .cloned()
            else {
                refuse(&mut effects, "select", "guide not in collection");
                return finish(state, effects, now);
            };
            if !guide.selectable {
                refuse(&mut effects, "select", "guide not selectable");
                return finish(state, effects, now);
            }

            state.clear_selection();
            state.notice = None;
            state.success = false;
            let claim = ctx.should_claim(&guide);
            state.read_only = !claim && !ctx.owns(&guide);
            state.selection = Some(guide);

            if claim {
                state.phase = WorkflowPhase::Selected;
                effects.push(Effect::AssignGuide { guide_id });
            } else {
                state.request_status_options(&mut effects);
            }
        }

        Input::ProposeStatus {
            status,
            via_guide_id,
        } => {
            let Some(selection) = state.selection.as_ref() else {
                refuse(&mut effects, "propose_status", "nothing selected");
                return finish(state, effects, now);
            };
            if state.read_only {
                refuse(&mut effects, "propose_status", "selection is read-only");
                return finish(state, effects, now);
            }
            if !matches!(
                state.phase,
                WorkflowPhase::OptionsReady | WorkflowPhase::ConfirmPending
            ) {
                refuse(&mut effects, "propose_status", "options not ready");
                return finish(state, effects, now);
            }
            let via_guide_id = via_guide_id
                .filter(|v| !v.trim().is_empty())
                .or_else(|| Some(selection.via_guide_id.clone()).filter(|v| !v.is_empty()));
            state.pending_status_change = Some(PendingStatusChange {
                guide_id: selection.guide_id.clone(),
                status,
                via_guide_id,
            });
            state.success = false;
            state.phase = WorkflowPhase::ConfirmPending;
        }

        Input::ConfirmCommit => {
            let can_confirm = match state.phase {
                WorkflowPhase::ConfirmPending => true,
                WorkflowPhase::OptionsReady => state.pending_status_change.is_some(),
                _ => false,
            };
            if !can_confirm || state.read_only {
                refuse(&mut effects, "confirm_commit", "no confirmable change");
                return finish(state, effects, now);
            }
            let Some(pending) = state.pending_status_change.as_ref() else {
                refuse(&mut effects, "confirm_commit", "no pending change");
                return finish(state, effects, now);
            };
            if pending.status.id.trim().is_empty()
                || pending.guide_id.is_empty()
                || !state.is_selected(&pending.guide_id)
            {
                refuse(&mut effects, "confirm_commit", "pending change is incomplete");
                return finish(state, effects, now);
            }
            let guide_id = pending.guide_id.clone();
            let status_id = pending.status.id.clone();
            state.commit_ticket += 1;
            state.notice = None;
            state.phase = WorkflowPhase::Committing;
            effects.push(Effect::CommitStatus {
                guide_id,
                status_id,
                ticket: state.commit_ticket,
            });
        }

        Input::Cancel => {
            let cancellable = match state.phase {
                WorkflowPhase::ConfirmPending | WorkflowPhase::Committing => true,
                WorkflowPhase::OptionsReady => state.pending_status_change.is_some(),
                _ => false,
            };
            if !cancellable {
                refuse(&mut effects, "cancel", "nothing to cancel");
                return finish(state, effects, now);
            }
            if state.phase == WorkflowPhase::Committing {
                state.commit_ticket += 1;
            }
            state.pending_status_change = None;
            state.phase = WorkflowPhase::OptionsReady;
        }

        Input::DismissSuccess => {
            state.success = false;
        }

        Input::DismissNotice => {
            state.notice = None;
        }

        // -- Request completions ---------------------------------------------
        Input::AssignCompleted { guide_id, response } => {
            if state.phase != WorkflowPhase::Selected || !state.is_selected(&guide_id) {
                return finish(state, effects, now);
            }
            if response.is_success() {
                state.read_only = false;
                state.request_status_options(&mut effects);
            } else {
                state.notice = Some(Notice::from_response(NoticeKind::AssignFailed, &response));
                if response.is_unauthorized() {
                    effects.push(Effect::Redirect { status: 401 });
                }
                state.clear_selection();
            }
        }

        Input::OptionsLoaded {
            guide_id,
            ticket,
            response,
        } => {
            if ticket != state.options_ticket || !state.is_selected(&guide_id) {
                return finish(state, effects, now);
            }
            state.loading_status_options = false;
            if response.is_success() {
                state.status_options = response
                    .content
                    .data
                    .map(|d| d.status_option)
                    .unwrap_or_default();
            } else {
                state.status_options.clear();
                state.notice = Some(Notice::from_response(NoticeKind::OptionsFailed, &response));
                if response.is_unauthorized() {
                    effects.push(Effect::Redirect { status: 401 });
                }
            }
            if state.phase == WorkflowPhase::OptionsLoading {
                state.phase = WorkflowPhase::OptionsReady;
            }
        }

        Input::CommitCompleted {
            guide_id,
            ticket,
            response,
        } => {
            if ticket != state.commit_ticket
                || state.phase != WorkflowPhase::Committing
                || !state.is_selected(&guide_id)
            {
                return finish(state, effects, now);
            }
            if response.is_success() {
                state.pending_status_change = None;
                state.success = true;
                state.phase = WorkflowPhase::Idle;
            } else {
                state.notice = Some(Notice::from_response(NoticeKind::CommitFailed, &response));
                if response.is_unauthorized() {
                    effects.push(Effect::Redirect { status: 401 });
                }
                state.phase = WorkflowPhase::OptionsReady;
            }
        }

        Input::Tick => {}
    }

    finish(state, effects, now)
}

/// Re-derive the elapsed display. Never touches the guide itself.
fn finish(
    mut state: OperatorState,
    effects: Vec<Effect>,
    now: DateTime<Utc>,
) -> (OperatorState, Vec<Effect>) {
    state.elapsed_time = state
        .selection
        .as_ref()
        .and_then(|g| g.last_change)
        .map(|last| format_elapsed(last, now));
    (state, effects)
}
