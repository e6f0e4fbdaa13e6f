//! Operator actor: owns the operator state and processes events one at a time.
//!
//! The console talks to it through `OperatorActorHandle`, which sends
//! `OperatorCommand`s over an mpsc channel. Reads are lock-free through
//! `ArcSwap`; a `watch` channel carries the revision of every publish.
//! Stream events, request completions and clock ticks are all fed through
//! the same pure `transition`, and the actor executes the effects it returns.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use guidewatch_protocol::{GuideId, Snapshot, StatusOption};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::api::{GuideApi, OPERATOR_GUIDES_PATH};
use crate::clock::{ClockHandle, TICK_PERIOD};
use crate::operator_command::OperatorCommand;
use crate::probe;
use crate::reconnect::ReconnectPolicy;
use crate::redirect::AuthRedirect;
use crate::state::{OperatorContext, OperatorView};
use crate::stream::{SnapshotFeed, StreamConnection, StreamEvent};
use crate::workflow::{transition, Effect, Input, OperatorState, StreamPhase};

/// Collaborators the actor drives
pub struct OperatorDeps<A, F, R> {
    pub api: Arc<A>,
    pub feed: F,
    pub redirect: R,
    pub reconnect: Box<dyn ReconnectPolicy>,
}

/// Handle to the running operator actor (cheap to Clone).
#[derive(Clone)]
pub struct OperatorActorHandle {
    command_tx: mpsc::Sender<OperatorCommand>,
    view: Arc<ArcSwap<OperatorView>>,
    changes: watch::Receiver<u64>,
}

impl OperatorActorHandle {
    /// Spawn the actor and open the stream.
    pub fn spawn<A, F, R>(deps: OperatorDeps<A, F, R>, ctx: OperatorContext) -> Self
    where
        A: GuideApi,
        F: SnapshotFeed,
        R: AuthRedirect,
    {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (tick_tx, tick_rx) = mpsc::channel(4);
        let view = Arc::new(ArcSwap::from_pointee(OperatorView::default()));
        let (changes_tx, changes) = watch::channel(0);

        let actor = OperatorActor {
            ctx,
            api: deps.api,
            feed: deps.feed,
            redirect: deps.redirect,
            reconnect: deps.reconnect,
            state: OperatorState::default(),
            revision: 0,
            view: view.clone(),
            changes: changes_tx,
            stream: None,
            inflight: JoinSet::new(),
            clock: None,
            tick_tx,
        };
        tokio::spawn(actor.run(command_rx, tick_rx));

        Self {
            command_tx,
            view,
            changes,
        }
    }

    /// Lock-free read of the latest published view.
    pub fn view(&self) -> Arc<OperatorView> {
        self.view.load_full()
    }

    /// Receiver that changes on every publish.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.clone()
    }

    pub async fn select(&self, guide_id: GuideId) {
        self.send(OperatorCommand::Select { guide_id }).await;
    }

    pub async fn propose_status(&self, status: StatusOption, via_guide_id: Option<String>) {
        self.send(OperatorCommand::ProposeStatus {
            status,
            via_guide_id,
        })
        .await;
    }

    pub async fn confirm_commit(&self) {
        self.send(OperatorCommand::ConfirmCommit).await;
    }

    pub async fn cancel(&self) {
        self.send(OperatorCommand::Cancel).await;
    }

    pub async fn dismiss_success(&self) {
        self.send(OperatorCommand::DismissSuccess).await;
    }

    pub async fn dismiss_notice(&self) {
        self.send(OperatorCommand::DismissNotice).await;
    }

    /// Release the stream, the clock and in-flight requests.
    /// Further calls are no-ops.
    pub async fn teardown(&self) {
        let (reply, done) = oneshot::channel();
        if self
            .command_tx
            .send(OperatorCommand::Teardown { reply })
            .await
            .is_err()
        {
            debug!(
                component = "operator_actor",
                event = "operator.teardown.already_stopped",
                "Actor already stopped"
            );
            return;
        }
        let _ = done.await;
    }

    async fn send(&self, cmd: OperatorCommand) {
        let name = cmd.name();
        if self.command_tx.send(cmd).await.is_err() {
            warn!(
                component = "operator_actor",
                event = "operator.command.dropped",
                command = name,
                "Actor channel closed, command dropped"
            );
        }
    }
}

struct OperatorActor<A, F, R> {
    ctx: OperatorContext,
    api: Arc<A>,
    feed: F,
    redirect: R,
    reconnect: Box<dyn ReconnectPolicy>,
    state: OperatorState,
    revision: u64,
    view: Arc<ArcSwap<OperatorView>>,
    changes: watch::Sender<u64>,
    stream: Option<StreamConnection<Snapshot>>,
    inflight: JoinSet<Input>,
    clock: Option<ClockHandle>,
    tick_tx: mpsc::Sender<()>,
}

enum Step {
    Command(OperatorCommand),
    Stream(Option<StreamEvent<Snapshot>>),
    Completed(Result<Input, JoinError>),
    Tick,
    Stop,
}

impl<A, F, R> OperatorActor<A, F, R>
where
    A: GuideApi,
    F: SnapshotFeed,
    R: AuthRedirect,
{
    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<OperatorCommand>,
        mut tick_rx: mpsc::Receiver<()>,
    ) {
        info!(
            component = "operator_actor",
            event = "operator.actor.started",
            operator_id = self.ctx.operator_id,
            "Operator actor started"
        );
        self.open_stream();
        self.publish();

        loop {
            let step = tokio::select! {
                cmd = command_rx.recv() => match cmd {
                    Some(cmd) => Step::Command(cmd),
                    // Every handle is gone.
                    None => Step::Stop,
                },
                event = next_stream_event(&mut self.stream) => Step::Stream(event),
                Some(joined) = self.inflight.join_next(), if !self.inflight.is_empty() => {
                    Step::Completed(joined)
                }
                Some(()) = tick_rx.recv() => Step::Tick,
            };

            match step {
                Step::Command(cmd) => match cmd.into_input() {
                    Ok(input) => self.apply(input),
                    Err(reply) => {
                        self.shutdown();
                        let _ = reply.send(());
                        break;
                    }
                },
                Step::Stream(Some(StreamEvent::Snapshot(snapshot))) => {
                    self.apply(Input::SnapshotReceived(snapshot));
                }
                Step::Stream(Some(StreamEvent::DecodeFailed { error })) => {
                    // Already logged by the reader; nothing changes.
                    debug!(
                        component = "operator_actor",
                        event = "operator.stream.decode_skipped",
                        error = %error,
                        "Skipped undecodable snapshot"
                    );
                }
                Step::Stream(Some(StreamEvent::Broken { reason })) => {
                    self.apply(Input::StreamBroken { reason });
                }
                Step::Stream(None) => {
                    self.apply(Input::StreamBroken {
                        reason: "stream closed unexpectedly".to_string(),
                    });
                }
                Step::Completed(Ok(input)) => self.apply(input),
                Step::Completed(Err(e)) => {
                    if !e.is_cancelled() {
                        warn!(
                            component = "operator_actor",
                            event = "operator.request.panicked",
                            error = %e,
                            "Request task failed"
                        );
                    }
                }
                Step::Tick => self.apply(Input::Tick),
                Step::Stop => {
                    self.shutdown();
                    break;
                }
            }
        }

        info!(
            component = "operator_actor",
            event = "operator.actor.stopped",
            revision = self.revision,
            "Operator actor stopped"
        );
    }

    fn apply(&mut self, input: Input) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = transition(state, input, &self.ctx, Utc::now());
        self.state = state;
        for effect in effects {
            self.execute(effect);
        }
        self.sync_clock();
        self.publish();
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::AssignGuide { guide_id } => {
                let api = self.api.clone();
                self.inflight.spawn(async move {
                    let response = api.assign_self(&guide_id).await;
                    Input::AssignCompleted { guide_id, response }
                });
            }
            Effect::FetchStatusOptions { guide_id, ticket } => {
                let api = self.api.clone();
                self.inflight.spawn(async move {
                    let response = api.fetch_status_options(&guide_id).await;
                    Input::OptionsLoaded {
                        guide_id,
                        ticket,
                        response,
                    }
                });
            }
            Effect::CommitStatus {
                guide_id,
                status_id,
                ticket,
            } => {
                info!(
                    component = "operator_actor",
                    event = "operator.status.commit",
                    guide_id = %guide_id,
                    status = %status_id,
                    "Committing status change"
                );
                let api = self.api.clone();
                self.inflight.spawn(async move {
                    let response = api.commit_status(&guide_id, &status_id).await;
                    Input::CommitCompleted {
                        guide_id,
                        ticket,
                        response,
                    }
                });
            }
            Effect::Probe => {
                let api = self.api.clone();
                self.inflight.spawn(async move {
                    Input::ProbeCompleted(probe::classify(api.as_ref(), OPERATOR_GUIDES_PATH).await)
                });
            }
            Effect::CloseStream => self.close_stream(),
            Effect::OpenStream => self.open_stream(),
            Effect::ScheduleReconnect => match self.reconnect.next_delay() {
                Some(delay) => {
                    info!(
                        component = "operator_actor",
                        event = "operator.stream.reconnect_scheduled",
                        delay_ms = delay.as_millis() as u64,
                        "Reconnect scheduled"
                    );
                    self.inflight.spawn(async move {
                        tokio::time::sleep(delay).await;
                        Input::ReconnectDue
                    });
                }
                None => {
                    info!(
                        component = "operator_actor",
                        event = "operator.stream.stopped",
                        "Stream stays closed"
                    );
                }
            },
            Effect::ResetReconnect => self.reconnect.reset(),
            Effect::Redirect { status } => self.redirect.redirect(status),
            Effect::Refused { action, reason } => {
                info!(
                    component = "operator_actor",
                    event = "operator.command.refused",
                    action,
                    reason,
                    phase = ?self.state.phase,
                    "Command refused"
                );
            }
        }
    }

    /// Exactly one live connection: any previous one is closed first.
    fn open_stream(&mut self) {
        self.close_stream();
        let conn = self.feed.open(OPERATOR_GUIDES_PATH);
        debug!(
            component = "operator_actor",
            event = "operator.stream.attached",
            connection_id = conn.handle.id(),
            "Stream attached"
        );
        self.stream = Some(conn);
    }

    fn close_stream(&mut self) {
        if let Some(mut conn) = self.stream.take() {
            conn.handle.close();
        }
    }

    /// The clock runs exactly while a selection exists.
    fn sync_clock(&mut self) {
        match (self.state.selection.is_some(), self.clock.is_some()) {
            (true, false) => {
                self.clock = Some(ClockHandle::spawn(TICK_PERIOD, self.tick_tx.clone()));
            }
            (false, true) => {
                if let Some(clock) = self.clock.take() {
                    clock.stop();
                }
            }
            _ => {}
        }
    }

    fn shutdown(&mut self) {
        self.close_stream();
        if let Some(clock) = self.clock.take() {
            clock.stop();
        }
        self.inflight.abort_all();
        self.state.stream = StreamPhase::Closed;
        self.publish();
    }

    fn publish(&mut self) {
        self.revision += 1;
        self.view.store(Arc::new(self.state.to_view(self.revision)));
        self.changes.send_replace(self.revision);
    }
}

/// Pending forever while no stream is open.
async fn next_stream_event(
    stream: &mut Option<StreamConnection<Snapshot>>,
) -> Option<StreamEvent<Snapshot>> {
    match stream {
        Some(conn) => conn.events.recv().await,
        None => std::future::pending().await,
    }
}
