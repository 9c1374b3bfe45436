pub mod fetch;
pub mod search;
mod registry;

pub use fetch::{FetchMetadata, FetchOutput, FetchTool};
pub use registry::{
    json_schema_array, json_schema_object, json_schema_string, validate_arguments, Tool,
    ToolRegistry,
};
pub use search::{SearchHit, SearchOutput, SearchTool};

use dossier_core::storage::RecordStore;
use dossier_core::RecordId;
use std::sync::Arc;

/// Settings shared by the record tools
#[derive(Debug, Clone)]
pub struct ToolSettings {
    /// Base URL used to build citation links for records
    pub public_url: String,
    /// Cap on the number of search hits returned
    pub max_results: usize,
}

impl ToolSettings {
    /// Citation link for a record
    pub fn record_url(&self, id: &RecordId) -> String {
        format!("{}/users/{}", self.public_url.trim_end_matches('/'), id)
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            public_url: "http://localhost:8000".to_string(),
            max_results: 10,
        }
    }
}

/// The connector's tool set: `search` then `fetch`
pub fn standard_registry(store: Arc<dyn RecordStore>, settings: ToolSettings) -> ToolRegistry {
    let settings = Arc::new(settings);
    ToolRegistry::new(vec![
        Arc::new(SearchTool::new(store.clone(), settings.clone())),
        Arc::new(FetchTool::new(store, settings)),
    ])
}
