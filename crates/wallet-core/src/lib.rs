pub mod offer;
pub mod schema_names;
pub mod workflow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use offer::{
    Attachment, AttachmentData, CredentialPreview, IndyCredentialOffer, OfferCredentialMessage,
    OfferError, PreviewAttribute,
};
pub use schema_names::{CredentialConfig, CredentialConfigs, ParsedSchema, SchemaNamer};
pub use workflow::{
    ActivatedTask, CredentialType, EligibilityFlag, Navigation, WorkflowTarget,
};

/// Lifecycle of a credential exchange as reported by the agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialState {
    ProposalSent,
    ProposalReceived,
    OfferSent,
    OfferReceived,
    Declined,
    RequestSent,
    RequestReceived,
    CredentialIssued,
    CredentialReceived,
    Done,
}

impl CredentialState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialState::ProposalSent => "proposal-sent",
            CredentialState::ProposalReceived => "proposal-received",
            CredentialState::OfferSent => "offer-sent",
            CredentialState::OfferReceived => "offer-received",
            CredentialState::Declined => "declined",
            CredentialState::RequestSent => "request-sent",
            CredentialState::RequestReceived => "request-received",
            CredentialState::CredentialIssued => "credential-issued",
            CredentialState::CredentialReceived => "credential-received",
            CredentialState::Done => "done",
        }
    }

    pub fn is_offer_received(&self) -> bool {
        matches!(self, CredentialState::OfferReceived)
    }
}

impl fmt::Display for CredentialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialState {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase().replace('_', "-");
        match normalized.as_str() {
            "proposal-sent" => Ok(CredentialState::ProposalSent),
            "proposal-received" => Ok(CredentialState::ProposalReceived),
            "offer-sent" => Ok(CredentialState::OfferSent),
            "offer-received" => Ok(CredentialState::OfferReceived),
            "declined" => Ok(CredentialState::Declined),
            "request-sent" => Ok(CredentialState::RequestSent),
            "request-received" => Ok(CredentialState::RequestReceived),
            "credential-issued" => Ok(CredentialState::CredentialIssued),
            "credential-received" => Ok(CredentialState::CredentialReceived),
            "done" => Ok(CredentialState::Done),
            other => Err(format!("Unknown credential state: {other}")),
        }
    }
}

/// A credential exchange record owned by the agent. Read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialRecord {
    pub id: String,
    #[serde(rename = "connectionId")]
    pub connection_id: String,
    pub state: CredentialState,
    #[serde(default, rename = "offerMessage", skip_serializing_if = "Option::is_none")]
    pub offer_message: Option<OfferCredentialMessage>,
    #[serde(default, rename = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl CredentialRecord {
    /// Schema id carried by the offer attachment, if the record has a
    /// decodable offer.
    pub fn schema_id(&self) -> Result<String, OfferError> {
        let offer = self
            .offer_message
            .as_ref()
            .ok_or(OfferError::MissingOfferMessage)?;
        Ok(offer.indy_credential_offer()?.schema_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, rename = "theirLabel", skip_serializing_if = "Option::is_none")]
    pub their_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
    #[serde(default, rename = "theirDid", skip_serializing_if = "Option::is_none")]
    pub their_did: Option<String>,
    #[serde(default, rename = "imageUrl", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, rename = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

pub const UNKNOWN_CONTACT: &str = "Unknown Contact";

/// Display-friendly view of a connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionSummary {
    #[serde(rename = "connectionId")]
    pub connection_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
    #[serde(default, rename = "theirDid", skip_serializing_if = "Option::is_none")]
    pub their_did: Option<String>,
    #[serde(default, rename = "imageUrl", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub state: String,
}

impl From<&ConnectionRecord> for ConnectionSummary {
    fn from(record: &ConnectionRecord) -> Self {
        let name = [record.alias.as_deref(), record.their_label.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|label| !label.is_empty())
            .unwrap_or(UNKNOWN_CONTACT)
            .to_string();
        Self {
            connection_id: record.id.clone(),
            name,
            did: record.did.clone(),
            their_did: record.their_did.clone(),
            image_url: record.image_url.clone(),
            state: record.state.clone(),
        }
    }
}

/// A credential record in `offer-received` state decorated with its
/// display name. Recomputed on every feed refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisplayableOffer {
    pub record: CredentialRecord,
    #[serde(default, rename = "schemaId", skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,
    #[serde(rename = "credentialName")]
    pub credential_name: String,
}

impl DisplayableOffer {
    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn connection_id(&self) -> &str {
        &self.record.connection_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_state_parses_agent_spellings() {
        assert_eq!(
            "offer-received".parse::<CredentialState>(),
            Ok(CredentialState::OfferReceived)
        );
        assert_eq!(
            "OFFER_RECEIVED".parse::<CredentialState>(),
            Ok(CredentialState::OfferReceived)
        );
        assert!("archived".parse::<CredentialState>().is_err());
    }

    #[test]
    fn credential_record_reads_agent_json() {
        let record: CredentialRecord = serde_json::from_str(
            r#"{"id":"cred-1","connectionId":"conn-1","state":"done"}"#,
        )
        .expect("parse record");
        assert_eq!(record.state, CredentialState::Done);
        assert!(record.offer_message.is_none());
        assert!(matches!(
            record.schema_id(),
            Err(OfferError::MissingOfferMessage)
        ));
    }

    #[test]
    fn connection_summary_prefers_alias_then_label() {
        let mut record = ConnectionRecord {
            id: "conn-1".to_string(),
            state: "complete".to_string(),
            alias: Some("  ".to_string()),
            their_label: Some("City Clinic".to_string()),
            did: None,
            their_did: Some("did:sov:clinic".to_string()),
            image_url: None,
            created_at: None,
        };
        assert_eq!(ConnectionSummary::from(&record).name, "City Clinic");

        record.alias = Some("My Doctor".to_string());
        assert_eq!(ConnectionSummary::from(&record).name, "My Doctor");

        record.alias = None;
        record.their_label = None;
        let summary = ConnectionSummary::from(&record);
        assert_eq!(summary.name, UNKNOWN_CONTACT);
        assert_eq!(summary.their_did.as_deref(), Some("did:sov:clinic"));
    }
}
