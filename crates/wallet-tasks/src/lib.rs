pub mod activator;
pub mod agent;
pub mod aggregator;
pub mod board;
pub mod eligibility;
pub mod feed;
pub mod memory;
pub mod resolver;

use thiserror::Error;
use wallet_storage::StorageError;

pub use activator::{ChannelNavigator, Navigator, TaskActivator};
pub use agent::{
    AgentContext, AgentError, ConnectionsApi, CredentialEventHandler, CredentialStateChanged,
    CredentialsApi, ListenerId, Subscription, SubscriptionState,
};
pub use aggregator::{AggregatorConfig, TaskAggregator, TaskSnapshot};
pub use board::{
    task_presence, BoardState, EligibilityOutcome, EligibilityTicket, PendingTask, RefreshStats,
    RefreshTicket, TaskBoard,
};
pub use eligibility::{EligibilityFlagReader, EligibilitySource};
pub use feed::CredentialOfferFeed;
pub use memory::{AgentFixture, MemoryAgent};
pub use resolver::{ConnectionResolver, ResolvedConnection};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("connection {connection_id} not found")]
    ConnectionNotFound { connection_id: String },
    #[error("unrecognized eligibility type: {0}")]
    UnrecognizedEligibilityType(String),
    #[error("credential {credential_id} has a malformed offer: {reason}")]
    MalformedOffer {
        credential_id: String,
        reason: String,
    },
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("task aggregator has stopped")]
    Closed,
}
