use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;
use wallet_core::{ConnectionRecord, CredentialRecord, CredentialState};

pub type ListenerId = u64;

/// Callback invoked synchronously by the agent for every credential state
/// change. Handlers must not block.
pub type CredentialEventHandler = Arc<dyn Fn(&CredentialStateChanged) + Send + Sync>;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("agent is not ready")]
    NotReady,
    #[error("agent request failed: {0}")]
    Request(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CredentialStateChanged {
    pub record: CredentialRecord,
    pub previous_state: Option<CredentialState>,
}

#[async_trait]
pub trait ConnectionsApi: Send + Sync {
    async fn find_by_id(&self, connection_id: &str)
        -> Result<Option<ConnectionRecord>, AgentError>;

    async fn get_by_id(&self, connection_id: &str) -> Result<ConnectionRecord, AgentError> {
        self.find_by_id(connection_id)
            .await?
            .ok_or_else(|| AgentError::NotFound {
                kind: "connection",
                id: connection_id.to_string(),
            })
    }
}

#[async_trait]
pub trait CredentialsApi: Send + Sync {
    /// Every credential record the agent holds, in agent order.
    async fn get_all(&self) -> Result<Vec<CredentialRecord>, AgentError>;

    fn on_state_changed(&self, handler: CredentialEventHandler) -> ListenerId;

    /// Returns whether a listener was actually removed.
    fn off_state_changed(&self, listener: ListenerId) -> bool;
}

/// Capabilities of the identity agent, passed explicitly to the components
/// that need them.
#[derive(Clone)]
pub struct AgentContext {
    pub connections: Arc<dyn ConnectionsApi>,
    pub credentials: Arc<dyn CredentialsApi>,
    pub ready: watch::Receiver<bool>,
}

impl AgentContext {
    pub fn new(
        connections: Arc<dyn ConnectionsApi>,
        credentials: Arc<dyn CredentialsApi>,
        ready: watch::Receiver<bool>,
    ) -> Self {
        Self {
            connections,
            credentials,
            ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }
}

impl fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentContext")
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

/// A registered state-change listener. Dropping it deregisters the handler.
pub struct Subscription {
    credentials: Arc<dyn CredentialsApi>,
    listener: ListenerId,
}

impl Subscription {
    pub fn register(credentials: Arc<dyn CredentialsApi>, handler: CredentialEventHandler) -> Self {
        let listener = credentials.on_state_changed(handler);
        debug!(event = "credential_listener_registered", listener);
        Self {
            credentials,
            listener,
        }
    }

    pub fn listener(&self) -> ListenerId {
        self.listener
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let removed = self.credentials.off_state_changed(self.listener);
        debug!(
            event = "credential_listener_released",
            listener = self.listener,
            removed
        );
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("listener", &self.listener)
            .finish()
    }
}

#[derive(Debug)]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribed(Subscription),
}

impl Default for SubscriptionState {
    fn default() -> Self {
        Self::Unsubscribed
    }
}

impl SubscriptionState {
    pub fn is_subscribed(&self) -> bool {
        matches!(self, SubscriptionState::Subscribed(_))
    }

    /// Registers `handler` unless a listener is already active. Returns
    /// `true` when a new listener was registered.
    pub fn subscribe(
        &mut self,
        credentials: Arc<dyn CredentialsApi>,
        handler: CredentialEventHandler,
    ) -> bool {
        if self.is_subscribed() {
            return false;
        }
        *self = SubscriptionState::Subscribed(Subscription::register(credentials, handler));
        true
    }

    /// Drops the active listener, if any. Returns `true` when one was held.
    pub fn release(&mut self) -> bool {
        matches!(
            std::mem::take(self),
            SubscriptionState::Subscribed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAgent;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(counter: Arc<AtomicUsize>) -> CredentialEventHandler {
        Arc::new(move |_event: &CredentialStateChanged| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn record(id: &str, state: CredentialState) -> CredentialRecord {
        CredentialRecord {
            id: id.to_string(),
            connection_id: "conn-1".to_string(),
            state,
            offer_message: None,
            created_at: None,
        }
    }

    #[test]
    fn subscribe_is_idempotent_while_subscribed() {
        let agent = Arc::new(MemoryAgent::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let mut state = SubscriptionState::default();

        assert!(state.subscribe(agent.clone(), counting_handler(counter.clone())));
        assert!(!state.subscribe(agent.clone(), counting_handler(counter.clone())));
        assert_eq!(agent.listener_count(), 1);

        agent.upsert_credential(record("cred-1", CredentialState::OfferReceived));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_and_drop_deregister_listener() {
        let agent = Arc::new(MemoryAgent::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let mut state = SubscriptionState::default();
        state.subscribe(agent.clone(), counting_handler(counter.clone()));
        assert!(state.release());
        assert!(!state.release());
        assert_eq!(agent.listener_count(), 0);

        {
            let _scoped = Subscription::register(agent.clone(), counting_handler(counter.clone()));
            assert_eq!(agent.listener_count(), 1);
        }
        assert_eq!(agent.listener_count(), 0);

        agent.upsert_credential(record("cred-1", CredentialState::OfferReceived));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn get_by_id_maps_missing_connection_to_not_found() {
        let agent = MemoryAgent::new();
        let err = agent
            .get_by_id("conn-missing")
            .await
            .expect_err("missing connection");
        assert!(matches!(err, AgentError::NotFound { kind: "connection", .. }));
    }
}
