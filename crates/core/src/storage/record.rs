use crate::types::{RecordId, UserRecord};
use anyhow::Result;

/// Read access to the user-record dataset.
///
/// The connector never writes through this trait. Implementations own the
/// matching logic behind `find`; errors are opaque to callers and must not be
/// forwarded verbatim to remote clients.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Records whose searchable attributes contain `query`, case-insensitively
    async fn find(&self, query: &str) -> Result<Vec<UserRecord>>;

    /// A single record by id
    async fn get(&self, id: &RecordId) -> Result<Option<UserRecord>>;

    /// Number of records held
    async fn count(&self) -> Result<usize>;
}
