use crate::config::WalletConfig;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use wallet_core::SchemaNamer;
use wallet_storage::KvStore;
use wallet_tasks::{MemoryAgent, TaskAggregator, TaskSnapshot};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// One CLI invocation's view of the agent, the store and the naming table.
pub struct Session {
    pub config: WalletConfig,
    pub agent: Arc<MemoryAgent>,
    pub store: Arc<KvStore>,
    pub namer: Arc<SchemaNamer>,
    fixture_path: Option<PathBuf>,
}

impl Session {
    pub fn open(config: WalletConfig, fixture: Option<&Path>, store_path: &Path) -> Result<Self> {
        let agent = match fixture {
            Some(path) => load_fixture(path)?,
            None => MemoryAgent::new(),
        };
        if let Some(parent) = store_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let store = KvStore::open(store_path)
            .with_context(|| format!("Failed to open store {}", store_path.display()))?;
        info!(
            event = "session_opened",
            store = %store_path.display(),
            fixture = fixture.map(|path| path.display().to_string()).unwrap_or_default(),
            schemas = config.schemas.len()
        );
        let namer = Arc::new(config.namer());
        Ok(Self {
            config,
            agent: Arc::new(agent),
            store: Arc::new(store),
            namer,
            fixture_path: fixture.map(Path::to_path_buf),
        })
    }

    pub fn spawn_aggregator(&self) -> TaskAggregator {
        TaskAggregator::spawn(
            self.agent.context(),
            self.store.clone(),
            self.namer.clone(),
            self.config.aggregator(),
        )
    }

    /// Marks the agent ready and waits for the first offer refresh and the
    /// first eligibility read to settle.
    pub async fn load_tasks(&self, aggregator: &TaskAggregator) -> Result<TaskSnapshot> {
        self.agent.set_ready(true);
        self.wait_for_refreshes(aggregator, 1).await
    }

    /// Waits until `count` refreshes have finished, applied or failed.
    pub async fn wait_for_refreshes(
        &self,
        aggregator: &TaskAggregator,
        count: u64,
    ) -> Result<TaskSnapshot> {
        let settled = aggregator.wait_for(|snapshot| {
            snapshot.stats.applied + snapshot.stats.failed >= count
                && snapshot.eligibility_reads >= 1
        });
        let snapshot = tokio::time::timeout(SETTLE_TIMEOUT, settled)
            .await
            .map_err(|_| anyhow!("Timed out waiting for pending tasks"))??;
        debug!(event = "tasks_settled", stats = ?snapshot.stats);
        Ok(snapshot)
    }

    pub fn fixture_path(&self) -> Option<&Path> {
        self.fixture_path.as_deref()
    }

    /// Writes the agent's current records back to the fixture file.
    pub fn save_fixture(&self) -> Result<()> {
        let path = self
            .fixture_path
            .as_deref()
            .ok_or_else(|| anyhow!("No fixture file to save"))?;
        let payload = serde_json::to_string_pretty(&self.agent.fixture())
            .context("Failed to serialize fixture")?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, payload).context("Failed to write temp fixture file")?;
        fs::rename(&tmp_path, path).context("Failed to save fixture file")?;
        Ok(())
    }
}

fn load_fixture(path: &Path) -> Result<MemoryAgent> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    MemoryAgent::from_json(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wallet_core::CredentialState;

    const FIXTURE: &str = r#"{
  "connections": [
    {"id": "conn-1", "state": "complete", "theirLabel": "Border Agency"}
  ],
  "credentials": [
    {
      "id": "cred-1",
      "connectionId": "conn-1",
      "state": "offer-received",
      "offerMessage": {
        "@id": "msg-1",
        "credential_preview": {"attributes": [{"name": "result", "value": "negative"}]},
        "offers~attach": [{
          "@id": "libindy-cred-offer-0",
          "data": {"json": {"schema_id": "Th7MpTaRZVRYnPiabds81Y:2:Lab_Result:1.0", "cred_def_id": "cd-1"}}
        }]
      }
    }
  ]
}"#;

    #[tokio::test]
    async fn loads_fixture_and_persists_state_changes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fixture = dir.path().join("agent.json");
        fs::write(&fixture, FIXTURE).expect("write fixture");
        let store_path = dir.path().join("nested/store.sqlite3");

        let session =
            Session::open(WalletConfig::default(), Some(&fixture), &store_path).expect("open");
        assert!(store_path.exists());

        let aggregator = session.spawn_aggregator();
        let snapshot = session.load_tasks(&aggregator).await.expect("load");
        assert!(snapshot.has_tasks);
        assert_eq!(snapshot.tasks[0].label(), "Claim Lab Result");

        session
            .agent
            .update_state("cred-1", CredentialState::RequestSent)
            .expect("update");
        let snapshot = session
            .wait_for_refreshes(&aggregator, 2)
            .await
            .expect("refresh");
        assert!(!snapshot.has_tasks);
        aggregator.shutdown().await;

        session.save_fixture().expect("save");
        let reopened = load_fixture(&fixture).expect("reload");
        assert_eq!(
            reopened.credentials_snapshot()[0].state,
            CredentialState::RequestSent
        );
    }

    #[test]
    fn missing_fixture_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = Session::open(
            WalletConfig::default(),
            Some(&dir.path().join("missing.json")),
            &dir.path().join("store.sqlite3"),
        );
        assert!(result.is_err());
    }
}
