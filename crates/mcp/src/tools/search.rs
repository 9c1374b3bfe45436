// Search tool: substring lookup over user records

use super::{json_schema_array, json_schema_object, json_schema_string, Tool, ToolSettings};
use crate::error::ToolError;
use crate::protocol::ToolSchema;
use dossier_core::storage::RecordStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Output of `search`. Field names are part of the wire contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutput {
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
}

/// Tool to search user records by name, email or any other attribute
pub struct SearchTool {
    store: Arc<dyn RecordStore>,
    settings: Arc<ToolSettings>,
}

impl SearchTool {
    pub fn new(store: Arc<dyn RecordStore>, settings: Arc<ToolSettings>) -> Self {
        Self { store, settings }
    }

    pub async fn search(&self, query: &str) -> Result<SearchOutput, ToolError> {
        if query.trim().is_empty() {
            return Ok(SearchOutput { results: vec![] });
        }

        let records = self
            .store
            .find(query)
            .await
            .map_err(|e| ToolError::upstream(&e))?;

        let results: Vec<SearchHit> = records
            .into_iter()
            .filter(|record| record.matches(query))
            .take(self.settings.max_results)
            .map(|record| SearchHit {
                url: self.settings.record_url(&record.id),
                id: record.id.0,
                title: record.name,
            })
            .collect();

        tracing::info!("Search for '{}' returned {} results", query, results.len());
        Ok(SearchOutput { results })
    }
}

#[async_trait::async_trait]
impl Tool for SearchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "search".to_string(),
            description: "Search for users in the database. Returns a list of potentially \
                          relevant users whose name, email or other details contain the query."
                .to_string(),
            input_schema: json_schema_object(
                serde_json::json!({
                    "query": json_schema_string("Search query string for user names or email addresses")
                }),
                vec!["query"],
            ),
            output_schema: json_schema_object(
                serde_json::json!({
                    "results": json_schema_array(
                        json_schema_object(
                            serde_json::json!({
                                "id": json_schema_string("Unique record identifier"),
                                "title": json_schema_string("Display name of the user"),
                                "url": json_schema_string("Citation URL for the record")
                            }),
                            vec!["id", "title", "url"],
                        ),
                        "Matching user records",
                    )
                }),
                vec!["results"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: SearchArgs = serde_json::from_value(arguments)
            .map_err(|e| ToolError::invalid_input("query", e.to_string()))?;

        let output = self.search(&args.query).await?;
        serde_json::to_value(output).map_err(|e| {
            tracing::error!("Failed to serialize search output: {}", e);
            ToolError::UpstreamError
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_core::storage::InMemoryRecordStore;
    use dossier_core::{RecordId, UserRecord};
    use serde_json::json;

    fn tool_with(records: Vec<UserRecord>, max_results: usize) -> SearchTool {
        let settings = ToolSettings {
            public_url: "https://dossier.test/".to_string(),
            max_results,
        };
        SearchTool::new(
            Arc::new(InMemoryRecordStore::with_records(records)),
            Arc::new(settings),
        )
    }

    /// Store that ignores the query, to check results are still filtered
    struct SloppyStore;

    #[async_trait::async_trait]
    impl RecordStore for SloppyStore {
        async fn find(&self, _query: &str) -> anyhow::Result<Vec<UserRecord>> {
            Ok(vec![
                UserRecord::new("1", "Alice Wong", "alice@example.com"),
                UserRecord::new("2", "Bob Smith", "bob@example.com"),
            ])
        }

        async fn get(&self, _id: &RecordId) -> anyhow::Result<Option<UserRecord>> {
            Ok(None)
        }

        async fn count(&self) -> anyhow::Result<usize> {
            Ok(2)
        }
    }

    #[tokio::test]
    async fn test_search_output_shape() {
        let tool = tool_with(vec![UserRecord::new("1", "Alice Wong", "alice@example.com")], 10);

        let output = tool.execute(json!({"query": "Alice"})).await.unwrap();
        assert_eq!(
            output,
            json!({
                "results": [
                    {"id": "1", "title": "Alice Wong", "url": "https://dossier.test/users/1"}
                ]
            })
        );
    }

    #[tokio::test]
    async fn test_search_no_match_is_empty_list() {
        let tool = tool_with(vec![UserRecord::new("1", "Alice Wong", "alice@example.com")], 10);
        let output = tool.execute(json!({"query": "zzz"})).await.unwrap();
        assert_eq!(output, json!({"results": []}));
    }

    #[tokio::test]
    async fn test_search_blank_query_is_empty_list() {
        let tool = tool_with(vec![UserRecord::new("1", "Alice Wong", "alice@example.com")], 10);
        let output = tool.execute(json!({"query": "   "})).await.unwrap();
        assert_eq!(output, json!({"results": []}));
    }

    #[tokio::test]
    async fn test_search_caps_results() {
        let records = (1..=5)
            .map(|i| UserRecord::new(RecordId::from(i as u64), format!("User {}", i), format!("u{}@example.com", i)))
            .collect();
        let tool = tool_with(records, 3);

        let output = tool.search("example").await.unwrap();
        assert_eq!(output.results.len(), 3);
    }

    #[tokio::test]
    async fn test_search_only_returns_matching_records() {
        let tool = SearchTool::new(Arc::new(SloppyStore), Arc::new(ToolSettings::default()));
        let output = tool.search("bob").await.unwrap();
        assert_eq!(output.results.len(), 1);
        assert_eq!(output.results[0].id, "2");
    }
}
