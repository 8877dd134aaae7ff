use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use wallet_core::{CredentialConfig, CredentialConfigs, SchemaNamer};
use wallet_storage::ELIGIBILITY_KEY;
use wallet_tasks::aggregator::DEFAULT_EVENT_QUEUE_CAPACITY;
use wallet_tasks::AggregatorConfig;

const APP_DIR: &str = "pending-tasks";
const STORE_FILE: &str = "store.sqlite3";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub eligibility_key: String,
    pub event_queue_capacity: usize,
    pub schemas: BTreeMap<String, CredentialConfig>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            eligibility_key: ELIGIBILITY_KEY.to_string(),
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            schemas: BTreeMap::new(),
        }
    }
}

impl WalletConfig {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config")
    }

    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn aggregator(&self) -> AggregatorConfig {
        AggregatorConfig {
            eligibility_key: self.eligibility_key.clone(),
            event_queue_capacity: self.event_queue_capacity,
        }
    }

    pub fn namer(&self) -> SchemaNamer {
        SchemaNamer::new(CredentialConfigs {
            schemas: self.schemas.clone(),
        })
    }
}

fn app_dir(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR)
}

pub fn default_store_path() -> PathBuf {
    app_dir(dirs::data_dir()).join(STORE_FILE)
}

pub fn default_config_path() -> PathBuf {
    app_dir(dirs::config_dir()).join(CONFIG_FILE)
}
