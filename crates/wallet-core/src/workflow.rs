use crate::{ConnectionRecord, ConnectionSummary, CredentialRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tag describing which secondary credential the eligibility record unlocks.
/// Unknown tags are kept verbatim so they can be reported.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CredentialType {
    LabResult,
    Exemption,
    Vaccination,
    Unrecognized(String),
}

impl CredentialType {
    pub fn as_str(&self) -> &str {
        match self {
            CredentialType::LabResult => "labResult",
            CredentialType::Exemption => "exemption",
            CredentialType::Vaccination => "vaccination",
            CredentialType::Unrecognized(tag) => tag.as_str(),
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "labResult" => CredentialType::LabResult,
            "exemption" => CredentialType::Exemption,
            "vaccination" => CredentialType::Vaccination,
            other => CredentialType::Unrecognized(other.to_string()),
        }
    }
}

impl Default for CredentialType {
    fn default() -> Self {
        Self::LabResult
    }
}

impl From<String> for CredentialType {
    fn from(tag: String) -> Self {
        CredentialType::from_tag(&tag)
    }
}

impl From<CredentialType> for String {
    fn from(value: CredentialType) -> Self {
        match value {
            CredentialType::Unrecognized(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted record saying whether the trusted traveler workflow can be
/// claimed. Only `has_credential` decides whether it counts as a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EligibilityFlag {
    #[serde(rename = "hasCredential")]
    pub has_credential: bool,
    #[serde(default, rename = "credentialType")]
    pub credential_type: CredentialType,
}

impl EligibilityFlag {
    pub fn eligible(credential_type: CredentialType) -> Self {
        Self {
            has_credential: true,
            credential_type,
        }
    }

    pub fn is_eligible(&self) -> bool {
        self.has_credential
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowTarget {
    Offered,
    AcceptedTestResult,
    AcceptedVaccinationExemption,
    AcceptedVaccination,
}

impl WorkflowTarget {
    pub fn route(&self) -> &'static str {
        match self {
            WorkflowTarget::Offered => "/workflow/offered",
            WorkflowTarget::AcceptedTestResult => "/workflow/accepted-test-result",
            WorkflowTarget::AcceptedVaccinationExemption => {
                "/workflow/accepted-vaccination-exemption"
            }
            WorkflowTarget::AcceptedVaccination => "/workflow/accepted-vaccination",
        }
    }

    /// Downstream workflow for an eligibility tag, `None` when the tag is not
    /// one of the known kinds.
    pub fn for_credential_type(credential_type: &CredentialType) -> Option<Self> {
        match credential_type {
            CredentialType::LabResult => Some(WorkflowTarget::AcceptedTestResult),
            CredentialType::Exemption => Some(WorkflowTarget::AcceptedVaccinationExemption),
            CredentialType::Vaccination => Some(WorkflowTarget::AcceptedVaccination),
            CredentialType::Unrecognized(_) => None,
        }
    }
}

impl fmt::Display for WorkflowTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.route())
    }
}

/// Everything the offered-credential workflow needs, resolved before
/// navigation happens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivatedTask {
    pub id: String,
    pub attributes: BTreeMap<String, String>,
    #[serde(rename = "connectionId")]
    pub connection_id: String,
    pub connection: ConnectionSummary,
    #[serde(rename = "connectionRecord")]
    pub connection_record: ConnectionRecord,
    #[serde(rename = "fullRecord")]
    pub full_record: CredentialRecord,
    #[serde(rename = "schemaId")]
    pub schema_id: String,
    #[serde(rename = "credentialName")]
    pub credential_name: String,
}

/// Directive handed to the presentation layer after a successful activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Navigation {
    pub target: WorkflowTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<Box<ActivatedTask>>,
}

impl Navigation {
    pub fn offered(task: ActivatedTask) -> Self {
        Self {
            target: WorkflowTarget::Offered,
            task: Some(Box::new(task)),
        }
    }

    pub fn workflow(target: WorkflowTarget) -> Self {
        Self { target, task: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eligibility_flag_reads_stored_json() {
        let flag: EligibilityFlag =
            serde_json::from_str(r#"{"hasCredential":true,"credentialType":"exemption"}"#)
                .expect("parse flag");
        assert!(flag.is_eligible());
        assert_eq!(flag.credential_type, CredentialType::Exemption);

        let flag: EligibilityFlag =
            serde_json::from_str(r#"{"hasCredential":false,"credentialType":"passport"}"#)
                .expect("parse flag");
        assert_eq!(
            flag.credential_type,
            CredentialType::Unrecognized("passport".to_string())
        );
        assert_eq!(
            serde_json::to_value(&flag).expect("serialize")["credentialType"],
            "passport"
        );
    }

    #[test]
    fn default_flag_is_not_eligible_lab_result() {
        let flag = EligibilityFlag::default();
        assert!(!flag.is_eligible());
        assert_eq!(flag.credential_type, CredentialType::LabResult);
    }

    #[test]
    fn credential_types_map_to_workflows() {
        assert_eq!(
            WorkflowTarget::for_credential_type(&CredentialType::LabResult),
            Some(WorkflowTarget::AcceptedTestResult)
        );
        assert_eq!(
            WorkflowTarget::for_credential_type(&CredentialType::Exemption),
            Some(WorkflowTarget::AcceptedVaccinationExemption)
        );
        assert_eq!(
            WorkflowTarget::for_credential_type(&CredentialType::Vaccination),
            Some(WorkflowTarget::AcceptedVaccination)
        );
        assert_eq!(
            WorkflowTarget::for_credential_type(&CredentialType::from_tag("other")),
            None
        );
        assert_eq!(
            WorkflowTarget::AcceptedTestResult.route(),
            "/workflow/accepted-test-result"
        );
    }
}
