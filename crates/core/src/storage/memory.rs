use crate::storage::RecordStore;
use crate::types::{RecordId, UserRecord};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::RwLock;

/// Record store held entirely in memory, ordered by id.
pub struct InMemoryRecordStore {
    records: RwLock<BTreeMap<RecordId, UserRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_records(records: impl IntoIterator<Item = UserRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }

    /// Store seeded with the built-in sample users
    pub fn with_samples() -> Self {
        Self::with_records(sample_records())
    }

    /// Load records from a JSON file holding an array of user records
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read records file {}", path.display()))?;
        let records: Vec<UserRecord> =
            serde_json::from_str(&content).context("Failed to parse records file")?;

        let mut seen = std::collections::HashSet::new();
        for record in &records {
            if !seen.insert(record.id.clone()) {
                anyhow::bail!("Duplicate record id in {}: {}", path.display(), record.id);
            }
        }

        tracing::info!("Loaded {} records from {}", records.len(), path.display());
        Ok(Self::with_records(records))
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find(&self, query: &str) -> Result<Vec<UserRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|record| record.matches(query))
            .cloned()
            .collect())
    }

    async fn get(&self, id: &RecordId) -> Result<Option<UserRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }
}

/// Sample users served when no records file is configured
pub fn sample_records() -> Vec<UserRecord> {
    [
        ("1", "Alice Johnson", "alice@example.com"),
        ("2", "Bob Smith", "bob@example.com"),
        ("3", "Carol Brown", "carol@test.com"),
        ("4", "David Wilson", "david@demo.com"),
        ("5", "Eva Garcia", "eva@sample.com"),
        ("6", "Frank Miller", "frank@research.com"),
        ("7", "Grace Lee", "grace@academic.edu"),
        ("8", "Henry Zhang", "henry@company.org"),
    ]
    .into_iter()
    .map(|(id, name, email)| {
        UserRecord::new(id, name, email)
            .with_attribute("account_type", "standard")
            .with_attribute("status", "active")
    })
    .collect()
}
