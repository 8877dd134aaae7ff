use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub const DEFAULT_CREDENTIAL_NAME: &str = "Credential";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialConfig {
    #[serde(alias = "credentialName")]
    pub credential_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Static schema id to display configuration table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CredentialConfigs {
    #[serde(default)]
    pub schemas: BTreeMap<String, CredentialConfig>,
}

impl CredentialConfigs {
    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn insert(&mut self, schema_id: impl Into<String>, credential_name: impl Into<String>) {
        self.schemas.insert(
            schema_id.into(),
            CredentialConfig {
                credential_name: credential_name.into(),
                description: None,
            },
        );
    }

    pub fn get(&self, schema_id: &str) -> Option<&CredentialConfig> {
        self.schemas.get(schema_id)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSchema {
    pub name: String,
    pub version: String,
}

fn schema_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(.*?):([0-9]):([a-zA-Z .\-_0-9]+):([a-z0-9._\-]+)$")
            .expect("schema id pattern compiles")
    })
}

/// Splits an Indy schema id (`<issuer>:<n>:<name>:<version>`) into a
/// presentable name and its version.
pub fn parse_schema(schema_id: &str) -> Option<ParsedSchema> {
    let captures = schema_id_pattern().captures(schema_id.trim())?;
    let raw_name = captures.get(3)?.as_str();
    let version = captures.get(4)?.as_str().to_string();
    let name = title_case(raw_name);
    if name.is_empty() {
        return None;
    }
    Some(ParsedSchema { name, version })
}

/// Best-effort name for ids the Indy pattern rejects: the last segment between
/// the issuer and the version that is not a bare number.
pub fn derive_name(schema_id: &str) -> Option<String> {
    let segments = schema_id.trim().split(':').collect::<Vec<_>>();
    let inner = segments.get(1..segments.len().saturating_sub(1))?;
    inner
        .iter()
        .rev()
        .filter(|segment| !segment.chars().all(|c| c.is_ascii_digit()))
        .map(|segment| title_case(segment))
        .find(|name| !name.is_empty())
}

fn title_case(raw: &str) -> String {
    raw.replace(['_', '-'], " ")
        .split(' ')
        .filter(|word| !word.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Resolves human-readable credential names. Never fails: configured name
/// first, then the name parsed or derived from the schema id, then a generic
/// label.
#[derive(Debug, Clone, Default)]
pub struct SchemaNamer {
    configs: CredentialConfigs,
}

impl SchemaNamer {
    pub fn new(configs: CredentialConfigs) -> Self {
        Self { configs }
    }

    pub fn configured_name(&self, schema_id: &str) -> Option<&str> {
        self.configs
            .get(schema_id)
            .map(|config| config.credential_name.trim())
            .filter(|name| !name.is_empty())
    }

    pub fn name(&self, schema_id: &str) -> String {
        if let Some(name) = self.configured_name(schema_id) {
            return name.to_string();
        }
        parse_schema(schema_id)
            .map(|parsed| parsed.name)
            .or_else(|| derive_name(schema_id))
            .unwrap_or_else(|| DEFAULT_CREDENTIAL_NAME.to_string())
    }

    pub fn name_for_offer(&self, schema_id: Option<&str>) -> String {
        match schema_id {
            Some(schema_id) => self.name(schema_id),
            None => DEFAULT_CREDENTIAL_NAME.to_string(),
        }
    }
}
