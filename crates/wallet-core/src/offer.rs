use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

pub const INDY_OFFER_ATTACHMENT_ID: &str = "libindy-cred-offer-0";

#[derive(Debug, Error)]
pub enum OfferError {
    #[error("credential record has no offer message")]
    MissingOfferMessage,
    #[error("offer message has no credential offer attachment")]
    MissingAttachment,
    #[error("attachment {id} carries no payload")]
    EmptyAttachment { id: String },
    #[error("attachment payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("attachment payload is not a credential offer: {0}")]
    Json(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreviewAttribute {
    pub name: String,
    #[serde(default, rename = "mime-type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CredentialPreview {
    #[serde(default, rename = "@type")]
    pub preview_type: String,
    #[serde(default)]
    pub attributes: Vec<PreviewAttribute>,
}

impl CredentialPreview {
    /// Flattens the ordered attribute list into a name/value map. A repeated
    /// name keeps the value that appears last.
    pub fn attribute_map(&self) -> BTreeMap<String, String> {
        let mut attributes = BTreeMap::new();
        for attribute in &self.attributes {
            attributes.insert(attribute.name.clone(), attribute.value.clone());
        }
        attributes
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AttachmentData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(default, rename = "mime-type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub data: AttachmentData,
}

/// The libindy credential offer embedded in an offer attachment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndyCredentialOffer {
    pub schema_id: String,
    pub cred_def_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OfferCredentialMessage {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub credential_preview: CredentialPreview,
    #[serde(default, rename = "offers~attach")]
    pub offer_attachments: Vec<Attachment>,
}

impl OfferCredentialMessage {
    pub fn indy_credential_offer(&self) -> Result<IndyCredentialOffer, OfferError> {
        let attachment = self
            .offer_attachments
            .iter()
            .find(|attachment| attachment.id == INDY_OFFER_ATTACHMENT_ID)
            .or_else(|| self.offer_attachments.first())
            .ok_or(OfferError::MissingAttachment)?;

        if let Some(json) = attachment.data.json.as_ref() {
            return serde_json::from_value(json.clone())
                .map_err(|err| OfferError::Json(err.to_string()));
        }

        let encoded = attachment
            .data
            .base64
            .as_deref()
            .ok_or_else(|| OfferError::EmptyAttachment {
                id: attachment.id.clone(),
            })?;
        let bytes = STANDARD.decode(encoded.trim())?;
        serde_json::from_slice(&bytes).map_err(|err| OfferError::Json(err.to_string()))
    }
}
