//! Commands sent to the operator actor from the console.

use guidewatch_protocol::{GuideId, StatusOption};
use tokio::sync::oneshot;

use crate::workflow::Input;

pub enum OperatorCommand {
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

    /// Close the stream, stop the clock, abort in-flight requests and end
    /// the actor. Replies once everything is released.
    Teardown {
        reply: oneshot::Sender<()>,
    },
}

impl OperatorCommand {
    /// Transition input for user commands, or the reply of a teardown
    pub fn into_input(self) -> Result<Input, oneshot::Sender<()>> {
        match self {
            OperatorCommand::Select { guide_id } => Ok(Input::Select { guide_id }),
            OperatorCommand::ProposeStatus {
                status,
                via_guide_id,
            } => Ok(Input::ProposeStatus {
                status,
                via_guide_id,
            }),
            OperatorCommand::ConfirmCommit => Ok(Input::ConfirmCommit),
            OperatorCommand::Cancel => Ok(Input::Cancel),
            OperatorCommand::DismissSuccess => Ok(Input::DismissSuccess),
            OperatorCommand::DismissNotice => Ok(Input::DismissNotice),
            OperatorCommand::Teardown { reply } => Err(reply),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OperatorCommand::Select { .. } => "select",
            OperatorCommand::ProposeStatus { .. } => "propose_status",
            OperatorCommand::ConfirmCommit => "confirm_commit",
            OperatorCommand::Cancel => "cancel",
            OperatorCommand::DismissSuccess => "dismiss_success",
            OperatorCommand::DismissNotice => "dismiss_notice",
            OperatorCommand::Teardown { .. } => "teardown",
        }
    }
}
