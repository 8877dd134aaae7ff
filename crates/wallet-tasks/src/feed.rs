use crate::agent::{AgentError, CredentialsApi};
use std::sync::Arc;
use tracing::{debug, warn};
use wallet_core::{CredentialRecord, DisplayableOffer, SchemaNamer};

/// Pulls credential records from the agent and keeps the ones waiting for
/// the holder to accept an offer.
#[derive(Clone)]
pub struct CredentialOfferFeed {
    credentials: Arc<dyn CredentialsApi>,
    namer: Arc<SchemaNamer>,
}

impl CredentialOfferFeed {
    pub fn new(credentials: Arc<dyn CredentialsApi>, namer: Arc<SchemaNamer>) -> Self {
        Self { credentials, namer }
    }

    pub async fn refresh(&self) -> Result<Vec<DisplayableOffer>, AgentError> {
        let records = self.credentials.get_all().await?;
        let total = records.len();
        let offers = select_offers(records, &self.namer);
        debug!(event = "offer_feed_fetched", total, offers = offers.len());
        Ok(offers)
    }
}

/// Filters to `offer-received` records, preserving agent order, and names
/// each one.
pub fn select_offers(records: Vec<CredentialRecord>, namer: &SchemaNamer) -> Vec<DisplayableOffer> {
    records
        .into_iter()
        .filter(|record| record.state.is_offer_received())
        .map(|record| {
            let schema_id = match record.schema_id() {
                Ok(schema_id) => Some(schema_id),
                Err(err) => {
                    warn!(
                        event = "offer_schema_unreadable",
                        credential_id = %record.id,
                        error = %err
                    );
                    None
                }
            };
            let credential_name = namer.name_for_offer(schema_id.as_deref());
            DisplayableOffer {
                record,
                schema_id,
                credential_name,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAgent;
    use serde_json::json;
    use wallet_core::{CredentialConfigs, CredentialState};

    fn record(id: &str, state: CredentialState, schema_id: Option<&str>) -> CredentialRecord {
        let offer_message = schema_id.map(|schema_id| {
            serde_json::from_value(json!({
                "@id": format!("msg-{id}"),
                "credential_preview": {"attributes": [{"name": "result", "value": "negative"}]},
                "offers~attach": [{
                    "@id": "libindy-cred-offer-0",
                    "data": {"json": {"schema_id": schema_id, "cred_def_id": "cd"}}
                }]
            }))
            .expect("offer message")
        });
        CredentialRecord {
            id: id.to_string(),
            connection_id: "conn-1".to_string(),
            state,
            offer_message,
            created_at: None,
        }
    }

    #[test]
    fn keeps_only_offer_received_in_agent_order() {
        let namer = SchemaNamer::default();
        let offers = select_offers(
            vec![
                record("c", CredentialState::OfferReceived, Some("i:2:Lab_Result:1.0")),
                record("a", CredentialState::Done, Some("i:2:Lab_Result:1.0")),
                record("b", CredentialState::OfferReceived, Some("i:2:Vaccination:1.0")),
                record("d", CredentialState::RequestSent, None),
            ],
            &namer,
        );

        let ids = offers.iter().map(DisplayableOffer::id).collect::<Vec<_>>();
        assert_eq!(ids, vec!["c", "b"]);
        assert_eq!(offers[0].credential_name, "Lab Result");
        assert_eq!(offers[1].credential_name, "Vaccination");
        assert!(offers.iter().all(|offer| !offer.credential_name.is_empty()));
    }

    #[test]
    fn configured_name_and_unreadable_offer() {
        let mut configs = CredentialConfigs::default();
        configs.insert("i:2:Lab_Result:1.0", "COVID-19 Test");
        let namer = SchemaNamer::new(configs);

        let offers = select_offers(
            vec![
                record("a", CredentialState::OfferReceived, Some("i:2:Lab_Result:1.0")),
                record("b", CredentialState::OfferReceived, None),
            ],
            &namer,
        );
        assert_eq!(offers[0].credential_name, "COVID-19 Test");
        assert_eq!(offers[0].schema_id.as_deref(), Some("i:2:Lab_Result:1.0"));
        assert_eq!(offers[1].credential_name, "Credential");
        assert_eq!(offers[1].schema_id, None);
    }

    #[tokio::test]
    async fn refresh_is_stable_and_tolerates_empty_agent() {
        let agent = Arc::new(MemoryAgent::new());
        agent.set_ready(true);
        let feed = CredentialOfferFeed::new(agent.clone(), Arc::new(SchemaNamer::default()));
        assert!(feed.refresh().await.expect("empty refresh").is_empty());

        agent.upsert_credential(record(
            "a",
            CredentialState::OfferReceived,
            Some("i:2:Lab_Result:1.0"),
        ));
        let first = feed.refresh().await.expect("first refresh");
        let second = feed.refresh().await.expect("second refresh");
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(agent.get_all_calls(), 3);
    }

    #[tokio::test]
    async fn refresh_before_ready_is_an_agent_error() {
        let agent = Arc::new(MemoryAgent::new());
        let feed = CredentialOfferFeed::new(agent.clone(), Arc::new(SchemaNamer::default()));
        assert!(matches!(feed.refresh().await, Err(AgentError::NotReady)));
    }
}
