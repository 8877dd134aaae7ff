use crate::TaskError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use wallet_core::EligibilityFlag;
use wallet_storage::{KvStore, StorageError};

/// Persisted storage holding the eligibility record.
#[async_trait]
pub trait EligibilitySource: Send + Sync {
    async fn read_flag(&self, key: &str) -> Result<Option<EligibilityFlag>, StorageError>;
}

#[async_trait]
impl EligibilitySource for KvStore {
    async fn read_flag(&self, key: &str) -> Result<Option<EligibilityFlag>, StorageError> {
        self.read_eligibility(key)
    }
}

#[derive(Clone)]
pub struct EligibilityFlagReader {
    source: Arc<dyn EligibilitySource>,
    key: String,
}

impl EligibilityFlagReader {
    pub fn new(source: Arc<dyn EligibilitySource>, key: impl Into<String>) -> Self {
        Self {
            source,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// `Ok(None)` means no record has been written yet; callers keep their
    /// current flag in that case.
    pub async fn read(&self) -> Result<Option<EligibilityFlag>, TaskError> {
        let flag = self.source.read_flag(&self.key).await?;
        debug!(
            event = "eligibility_read",
            key = %self.key,
            present = flag.is_some()
        );
        Ok(flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wallet_core::CredentialType;
    use wallet_storage::ELIGIBILITY_KEY;

    #[tokio::test]
    async fn reads_flag_from_kv_store() {
        let store = Arc::new(KvStore::open_in_memory().expect("open store"));
        let reader = EligibilityFlagReader::new(store.clone(), ELIGIBILITY_KEY);
        assert_eq!(reader.read().await.expect("read"), None);

        store
            .write_eligibility(
                ELIGIBILITY_KEY,
                &EligibilityFlag::eligible(CredentialType::Exemption),
            )
            .expect("write");
        let flag = reader.read().await.expect("read").expect("present");
        assert!(flag.has_credential);
        assert_eq!(flag.credential_type, CredentialType::Exemption);
    }

    #[tokio::test]
    async fn storage_failures_propagate() {
        let store = Arc::new(KvStore::open_in_memory().expect("open store"));
        store.set_json(ELIGIBILITY_KEY, &42).expect("write");
        let reader = EligibilityFlagReader::new(store, ELIGIBILITY_KEY);
        assert!(matches!(
            reader.read().await,
            Err(TaskError::Storage(StorageError::Serialization { .. }))
        ));
    }
}
