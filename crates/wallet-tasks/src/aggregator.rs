use crate::agent::{
    AgentContext, AgentError, CredentialEventHandler, CredentialStateChanged, SubscriptionState,
};
use crate::board::{
    BoardState, EligibilityOutcome, EligibilityTicket, PendingTask, RefreshOutcome, RefreshStats,
    RefreshTicket, TaskBoard,
};
use crate::eligibility::{EligibilityFlagReader, EligibilitySource};
use crate::feed::CredentialOfferFeed;
use crate::TaskError;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wallet_core::{CredentialState, DisplayableOffer, EligibilityFlag, SchemaNamer};
use wallet_storage::ELIGIBILITY_KEY;

pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    pub eligibility_key: String,
    pub event_queue_capacity: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            eligibility_key: ELIGIBILITY_KEY.to_string(),
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
        }
    }
}

/// What the presentation layer renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSnapshot {
    pub agent_ready: bool,
    pub has_tasks: bool,
    pub state: BoardState,
    pub tasks: Vec<PendingTask>,
    pub eligibility: EligibilityFlag,
    pub eligibility_loaded: bool,
    /// Completed eligibility reads, whether or not a record was found.
    pub eligibility_reads: u64,
    /// Last offer refresh failure, cleared by the next applied refresh.
    pub offer_error: Option<String>,
    /// Last eligibility read failure, cleared by the next successful read.
    pub eligibility_error: Option<String>,
    pub stats: RefreshStats,
}

impl Default for TaskSnapshot {
    fn default() -> Self {
        Self::from_board(&TaskBoard::default(), false, 0, None, None)
    }
}

impl TaskSnapshot {
    fn from_board(
        board: &TaskBoard,
        agent_ready: bool,
        eligibility_reads: u64,
        offer_error: Option<String>,
        eligibility_error: Option<String>,
    ) -> Self {
        Self {
            agent_ready,
            has_tasks: board.presence(),
            state: board.state(),
            tasks: board.tasks(),
            eligibility: board.eligibility().clone(),
            eligibility_loaded: board.eligibility_loaded(),
            eligibility_reads,
            offer_error,
            eligibility_error,
            stats: board.stats(),
        }
    }
}

#[derive(Debug)]
enum Message {
    CredentialStateChanged {
        credential_id: String,
        state: CredentialState,
    },
    RefreshRequested,
    ReloadEligibility,
    RefreshFinished {
        ticket: RefreshTicket,
        result: Result<Vec<DisplayableOffer>, AgentError>,
    },
    EligibilityFinished {
        ticket: EligibilityTicket,
        result: Result<Option<EligibilityFlag>, TaskError>,
    },
}

/// Handle to the running aggregation task. Dropping the handle stops the
/// task, which releases the agent listener.
pub struct TaskAggregator {
    sender: mpsc::Sender<Message>,
    snapshot: watch::Receiver<TaskSnapshot>,
    shutdown: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl TaskAggregator {
    /// Starts the aggregator on the current tokio runtime.
    pub fn spawn(
        agent: AgentContext,
        eligibility: Arc<dyn EligibilitySource>,
        namer: Arc<SchemaNamer>,
        config: AggregatorConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.event_queue_capacity.max(1));
        let (snapshot_tx, snapshot) = watch::channel(TaskSnapshot::default());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let worker = AggregatorWorker {
            feed: CredentialOfferFeed::new(agent.credentials.clone(), namer),
            eligibility: EligibilityFlagReader::new(eligibility, config.eligibility_key),
            agent,
            board: TaskBoard::new(),
            subscription: SubscriptionState::default(),
            sender: sender.clone(),
            snapshot: snapshot_tx,
            agent_ready: false,
            eligibility_reads: 0,
            offer_error: None,
            eligibility_error: None,
        };
        let worker = tokio::spawn(worker.run(receiver, shutdown_rx));

        Self {
            sender,
            snapshot,
            shutdown: Some(shutdown_tx),
            worker: Some(worker),
        }
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn has_tasks(&self) -> bool {
        self.snapshot.borrow().has_tasks
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskSnapshot> {
        self.snapshot.clone()
    }

    /// Waits until the published snapshot satisfies `predicate`.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<TaskSnapshot, TaskError>
    where
        F: FnMut(&TaskSnapshot) -> bool,
    {
        let mut receiver = self.subscribe();
        let snapshot = receiver
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| TaskError::Closed)?;
        Ok(snapshot.clone())
    }

    /// Re-pulls the offer feed. Ignored while the agent is not ready.
    pub async fn refresh_now(&self) -> Result<(), TaskError> {
        self.sender
            .send(Message::RefreshRequested)
            .await
            .map_err(|_| TaskError::Closed)
    }

    /// Re-reads the persisted eligibility record.
    pub async fn reload_eligibility(&self) -> Result<(), TaskError> {
        self.sender
            .send(Message::ReloadEligibility)
            .await
            .map_err(|_| TaskError::Closed)
    }

    /// Stops the worker and waits until its listener has been released.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(worker) = self.worker.take() {
            if let Err(err) = worker.await {
                warn!(event = "task_aggregator_join_error", error = %err);
            }
        }
    }
}

impl Drop for TaskAggregator {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

struct AggregatorWorker {
    agent: AgentContext,
    feed: CredentialOfferFeed,
    eligibility: EligibilityFlagReader,
    board: TaskBoard,
    subscription: SubscriptionState,
    sender: mpsc::Sender<Message>,
    snapshot: watch::Sender<TaskSnapshot>,
    agent_ready: bool,
    eligibility_reads: u64,
    offer_error: Option<String>,
    eligibility_error: Option<String>,
}

impl AggregatorWorker {
    async fn run(
        mut self,
        mut receiver: mpsc::Receiver<Message>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let mut ready = self.agent.ready.clone();
        let mut ready_open = true;

        let initially_ready = *ready.borrow_and_update();
        self.on_ready_changed(initially_ready);
        self.publish();

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                changed = ready.changed(), if ready_open => {
                    match changed {
                        Ok(()) => {
                            let is_ready = *ready.borrow_and_update();
                            self.on_ready_changed(is_ready);
                        }
                        Err(_) => {
                            warn!(event = "agent_ready_channel_closed");
                            ready_open = false;
                            self.on_ready_changed(false);
                        }
                    }
                }
                Some(message) = receiver.recv() => self.handle(message),
            }
            self.publish();
        }

        self.subscription.release();
        info!(event = "task_aggregator_stopped", stats = ?self.board.stats());
    }

    /// Acts only on edges; repeated notifications with the same value are
    /// ignored.
    fn on_ready_changed(&mut self, ready: bool) {
        if ready == self.agent_ready {
            return;
        }
        self.agent_ready = ready;

        if ready {
            info!(event = "agent_ready");
            self.start_eligibility_read();
            self.start_refresh("agent_ready");
            self.subscribe();
        } else {
            info!(event = "agent_not_ready");
            if self.subscription.release() {
                debug!(event = "credential_listener_dropped", reason = "agent_not_ready");
            }
            self.board.invalidate_in_flight();
        }
    }

    fn subscribe(&mut self) {
        let sender = self.sender.clone();
        let handler: CredentialEventHandler = Arc::new(move |event: &CredentialStateChanged| {
            let message = Message::CredentialStateChanged {
                credential_id: event.record.id.clone(),
                state: event.record.state,
            };
            match sender.try_send(message) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        event = "credential_event_dropped",
                        reason = "queue_full",
                        credential_id = %event.record.id
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(
                        event = "credential_event_dropped",
                        reason = "aggregator_stopped",
                        credential_id = %event.record.id
                    );
                }
            }
        });
        if self
            .subscription
            .subscribe(self.agent.credentials.clone(), handler)
        {
            info!(event = "credential_listener_active");
        }
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::CredentialStateChanged {
                credential_id,
                state,
            } => {
                if !self.agent_ready {
                    debug!(
                        event = "credential_event_ignored",
                        reason = "agent_not_ready",
                        credential_id = %credential_id
                    );
                    return;
                }
                info!(
                    event = "credential_state_changed",
                    credential_id = %credential_id,
                    state = %state
                );
                self.start_refresh("state_changed");
            }
            Message::RefreshRequested => {
                if self.agent_ready {
                    self.start_refresh("manual");
                } else {
                    debug!(event = "refresh_ignored", reason = "agent_not_ready");
                }
            }
            Message::ReloadEligibility => {
                if self.agent_ready {
                    self.start_eligibility_read();
                } else {
                    debug!(event = "eligibility_reload_ignored", reason = "agent_not_ready");
                }
            }
            Message::RefreshFinished { ticket, result } => self.finish_refresh(ticket, result),
            Message::EligibilityFinished { ticket, result } => {
                self.finish_eligibility(ticket, result)
            }
        }
    }

    fn start_refresh(&mut self, trigger: &'static str) {
        let ticket = self.board.begin_refresh();
        debug!(event = "offer_refresh_started", seq = ticket.seq(), trigger);
        let feed = self.feed.clone();
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let result = feed.refresh().await;
            let _ = sender
                .send(Message::RefreshFinished { ticket, result })
                .await;
        });
    }

    fn finish_refresh(
        &mut self,
        ticket: RefreshTicket,
        result: Result<Vec<DisplayableOffer>, AgentError>,
    ) {
        match result {
            Ok(offers) => {
                let count = offers.len();
                match self.board.apply_refresh(ticket, offers) {
                    RefreshOutcome::Applied => {
                        self.offer_error = None;
                        info!(
                            event = "offer_refresh_applied",
                            seq = ticket.seq(),
                            offers = count,
                            has_tasks = self.board.presence()
                        );
                    }
                    RefreshOutcome::Stale => {
                        debug!(event = "offer_refresh_discarded", seq = ticket.seq());
                    }
                }
            }
            Err(err) => {
                if self.board.fail_refresh(ticket) {
                    warn!(event = "offer_refresh_failed", seq = ticket.seq(), error = %err);
                    self.offer_error = Some(err.to_string());
                }
            }
        }
    }

    fn start_eligibility_read(&mut self) {
        let ticket = self.board.begin_eligibility_read();
        debug!(event = "eligibility_read_started", seq = ticket.seq());
        let reader = self.eligibility.clone();
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let result = reader.read().await;
            let _ = sender
                .send(Message::EligibilityFinished { ticket, result })
                .await;
        });
    }

    fn finish_eligibility(
        &mut self,
        ticket: EligibilityTicket,
        result: Result<Option<EligibilityFlag>, TaskError>,
    ) {
        self.eligibility_reads += 1;
        match result {
            Ok(flag) => {
                let absent = flag.is_none();
                match self.board.apply_eligibility(ticket, flag) {
                    EligibilityOutcome::Stale => {
                        debug!(event = "eligibility_read_discarded", seq = ticket.seq());
                        return;
                    }
                    EligibilityOutcome::Changed => {
                        info!(
                            event = "eligibility_updated",
                            seq = ticket.seq(),
                            has_credential = self.board.eligibility().has_credential,
                            credential_type = %self.board.eligibility().credential_type
                        );
                    }
                    EligibilityOutcome::Unchanged if absent => {
                        debug!(event = "eligibility_absent", key = %self.eligibility.key());
                    }
                    EligibilityOutcome::Unchanged => {}
                }
                self.eligibility_error = None;
            }
            Err(err) => {
                if self.board.fail_eligibility(ticket) {
                    warn!(event = "eligibility_read_failed", seq = ticket.seq(), error = %err);
                    self.eligibility_error = Some(err.to_string());
                } else {
                    debug!(event = "eligibility_read_discarded", seq = ticket.seq());
                }
            }
        }
    }

    fn publish(&self) {
        let next = TaskSnapshot::from_board(
            &self.board,
            self.agent_ready,
            self.eligibility_reads,
            self.offer_error.clone(),
            self.eligibility_error.clone(),
        );
        self.snapshot.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}
