//! In-process agent used by the CLI and by tests.

use crate::agent::{
    AgentContext, AgentError, ConnectionsApi, CredentialEventHandler, CredentialStateChanged,
    CredentialsApi, ListenerId,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::watch;
use tracing::debug;
use wallet_core::{ConnectionRecord, CredentialRecord, CredentialState};

/// JSON shape accepted by [`MemoryAgent::from_fixture`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentFixture {
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
    #[serde(default)]
    pub credentials: Vec<CredentialRecord>,
}

pub struct MemoryAgent {
    credentials: RwLock<Vec<CredentialRecord>>,
    connections: RwLock<BTreeMap<String, ConnectionRecord>>,
    listeners: Mutex<BTreeMap<ListenerId, CredentialEventHandler>>,
    next_listener: AtomicU64,
    get_all_calls: AtomicUsize,
    ready: watch::Sender<bool>,
}

impl Default for MemoryAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAgent {
    /// A new agent starts in the loading (not ready) state.
    pub fn new() -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            credentials: RwLock::new(Vec::new()),
            connections: RwLock::new(BTreeMap::new()),
            listeners: Mutex::new(BTreeMap::new()),
            next_listener: AtomicU64::new(0),
            get_all_calls: AtomicUsize::new(0),
            ready,
        }
    }

    pub fn from_fixture(fixture: AgentFixture) -> Self {
        let agent = Self::new();
        for connection in fixture.connections {
            agent.add_connection(connection);
        }
        *agent
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner) = fixture.credentials;
        agent
    }

    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        let fixture: AgentFixture = serde_json::from_str(input)?;
        Ok(Self::from_fixture(fixture))
    }

    pub fn fixture(&self) -> AgentFixture {
        AgentFixture {
            connections: self
                .connections
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .values()
                .cloned()
                .collect(),
            credentials: self.credentials_snapshot(),
        }
    }

    pub fn context(self: &Arc<Self>) -> AgentContext {
        AgentContext::new(self.clone(), self.clone(), self.ready.subscribe())
    }

    pub fn set_ready(&self, ready: bool) {
        let previous = self.ready.send_replace(ready);
        if previous != ready {
            debug!(event = "agent_ready_changed", ready);
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    pub fn add_connection(&self, connection: ConnectionRecord) {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(connection.id.clone(), connection);
    }

    /// Inserts or replaces a record by id and emits a state-change event.
    pub fn upsert_credential(&self, record: CredentialRecord) {
        let previous_state = {
            let mut credentials = self
                .credentials
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            match credentials.iter_mut().find(|existing| existing.id == record.id) {
                Some(existing) => {
                    let previous = existing.state;
                    *existing = record.clone();
                    Some(previous)
                }
                None => {
                    credentials.push(record.clone());
                    None
                }
            }
        };
        self.emit(&CredentialStateChanged {
            record,
            previous_state,
        });
    }

    /// Moves an existing record to `state` and emits a state-change event.
    pub fn update_state(
        &self,
        credential_id: &str,
        state: CredentialState,
    ) -> Result<CredentialRecord, AgentError> {
        let (record, previous_state) = {
            let mut credentials = self
                .credentials
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let existing = credentials
                .iter_mut()
                .find(|existing| existing.id == credential_id)
                .ok_or_else(|| AgentError::NotFound {
                    kind: "credential",
                    id: credential_id.to_string(),
                })?;
            let previous = existing.state;
            existing.state = state;
            (existing.clone(), previous)
        };
        self.emit(&CredentialStateChanged {
            record: record.clone(),
            previous_state: Some(previous_state),
        });
        Ok(record)
    }

    pub fn credentials_snapshot(&self) -> Vec<CredentialRecord> {
        self.credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }

    pub fn get_all_calls(&self) -> usize {
        self.get_all_calls.load(Ordering::SeqCst)
    }

    fn listeners(&self) -> MutexGuard<'_, BTreeMap<ListenerId, CredentialEventHandler>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: &CredentialStateChanged) {
        let handlers = self.listeners().values().cloned().collect::<Vec<_>>();
        debug!(
            event = "credential_state_changed",
            credential_id = %event.record.id,
            state = %event.record.state,
            listeners = handlers.len()
        );
        for handler in handlers {
            handler(event);
        }
    }
}

#[async_trait]
impl ConnectionsApi for MemoryAgent {
    async fn find_by_id(
        &self,
        connection_id: &str,
    ) -> Result<Option<ConnectionRecord>, AgentError> {
        Ok(self
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(connection_id)
            .cloned())
    }
}

#[async_trait]
impl CredentialsApi for MemoryAgent {
    async fn get_all(&self) -> Result<Vec<CredentialRecord>, AgentError> {
        self.get_all_calls.fetch_add(1, Ordering::SeqCst);
        if !self.is_ready() {
            return Err(AgentError::NotReady);
        }
        Ok(self.credentials_snapshot())
    }

    fn on_state_changed(&self, handler: CredentialEventHandler) -> ListenerId {
        let listener = self.next_listener.fetch_add(1, Ordering::SeqCst) + 1;
        self.listeners().insert(listener, handler);
        listener
    }

    fn off_state_changed(&self, listener: ListenerId) -> bool {
        self.listeners().remove(&listener).is_some()
    }
}
