use crate::agent::{AgentError, ConnectionsApi};
use crate::TaskError;
use std::sync::Arc;
use tracing::warn;
use wallet_core::{ConnectionRecord, ConnectionSummary};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConnection {
    pub record: ConnectionRecord,
    pub summary: ConnectionSummary,
}

/// Looks up the connection that owns a credential and derives its display
/// summary.
#[derive(Clone)]
pub struct ConnectionResolver {
    connections: Arc<dyn ConnectionsApi>,
}

impl ConnectionResolver {
    pub fn new(connections: Arc<dyn ConnectionsApi>) -> Self {
        Self { connections }
    }

    pub async fn resolve(&self, connection_id: &str) -> Result<ResolvedConnection, TaskError> {
        let record = match self.connections.get_by_id(connection_id).await {
            Ok(record) => record,
            Err(AgentError::NotFound { .. }) => {
                warn!(event = "connection_not_found", connection_id);
                return Err(TaskError::ConnectionNotFound {
                    connection_id: connection_id.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        let summary = ConnectionSummary::from(&record);
        Ok(ResolvedConnection { record, summary })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAgent;

    #[tokio::test]
    async fn resolves_summary_for_known_connection() {
        let agent = Arc::new(MemoryAgent::new());
        agent.add_connection(ConnectionRecord {
            id: "conn-1".to_string(),
            state: "complete".to_string(),
            alias: None,
            their_label: Some("Travel Authority".to_string()),
            did: Some("did:peer:me".to_string()),
            their_did: Some("did:peer:them".to_string()),
            image_url: None,
            created_at: None,
        });
        let resolver = ConnectionResolver::new(agent);

        let resolved = resolver.resolve("conn-1").await.expect("resolve");
        assert_eq!(resolved.summary.name, "Travel Authority");
        assert_eq!(resolved.summary.connection_id, "conn-1");
        assert_eq!(resolved.record.did.as_deref(), Some("did:peer:me"));
    }

    #[tokio::test]
    async fn unknown_connection_is_connection_not_found() {
        let resolver = ConnectionResolver::new(Arc::new(MemoryAgent::new()));
        let err = resolver.resolve("conn-x").await.expect_err("missing");
        assert!(matches!(
            err,
            TaskError::ConnectionNotFound { ref connection_id } if connection_id == "conn-x"
        ));
    }
}
