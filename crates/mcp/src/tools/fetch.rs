// Fetch tool: full profile of a single user record

use super::{json_schema_object, json_schema_string, Tool, ToolSettings};
use crate::error::ToolError;
use crate::protocol::ToolSchema;
use dossier_core::storage::RecordStore;
use dossier_core::{RecordId, UserRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Output of `fetch`. Field names are part of the wire contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchOutput {
    pub id: String,
    pub title: String,
    pub text: String,
    pub url: String,
    pub metadata: FetchMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchMetadata {
    pub name: String,
    pub email: String,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FetchArgs {
    id: String,
}

/// Tool to retrieve a complete user record by id
pub struct FetchTool {
    store: Arc<dyn RecordStore>,
    settings: Arc<ToolSettings>,
}

impl FetchTool {
    pub fn new(store: Arc<dyn RecordStore>, settings: Arc<ToolSettings>) -> Self {
        Self { store, settings }
    }

    pub async fn fetch(&self, id: &str) -> Result<FetchOutput, ToolError> {
        if id.trim().is_empty() {
            return Err(ToolError::invalid_input("id", "must not be empty"));
        }
        let record_id = RecordId::new(id);

        let record = self
            .store
            .get(&record_id)
            .await
            .map_err(|e| ToolError::upstream(&e))?
            .ok_or_else(|| ToolError::NotFound(record_id.to_string()))?;

        tracing::info!("Fetched user record {}", record.id);
        Ok(self.shape(record))
    }

    fn shape(&self, record: UserRecord) -> FetchOutput {
        let text = profile_text(&record);
        let url = self.settings.record_url(&record.id);
        let mut attributes = record.attributes;
        // name and email are fixed metadata keys
        attributes.remove("name");
        attributes.remove("email");

        FetchOutput {
            id: record.id.0,
            title: record.name.clone(),
            text,
            url,
            metadata: FetchMetadata {
                name: record.name,
                email: record.email,
                attributes,
            },
        }
    }
}

fn profile_text(record: &UserRecord) -> String {
    let mut text = format!(
        "Complete user profile for {}\n\nContact Information:\n- Email: {}\n- User ID: {}\n",
        record.name, record.email, record.id
    );
    if !record.attributes.is_empty() {
        text.push_str("\nDetails:\n");
        for (key, value) in &record.attributes {
            text.push_str(&format!("- {}: {}\n", key, value));
        }
    }
    text
}

#[async_trait::async_trait]
impl Tool for FetchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "fetch".to_string(),
            description: "Retrieve complete user details by unique identifier. Returns the full \
                          user profile with a citation URL."
                .to_string(),
            input_schema: json_schema_object(
                serde_json::json!({
                    "id": json_schema_string("Unique identifier of the user record")
                }),
                vec!["id"],
            ),
            output_schema: json_schema_object(
                serde_json::json!({
                    "id": json_schema_string("Unique record identifier"),
                    "title": json_schema_string("Display name of the user"),
                    "text": json_schema_string("Full profile text"),
                    "url": json_schema_string("Citation URL for the record"),
                    "metadata": {
                        "type": "object",
                        "description": "Structured record attributes",
                        "properties": {
                            "name": json_schema_string("Full name"),
                            "email": json_schema_string("Email address")
                        },
                        "required": ["name", "email"],
                        "additionalProperties": {"type": "string"}
                    }
                }),
                vec!["id", "title", "text", "url", "metadata"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: FetchArgs = serde_json::from_value(arguments)
            .map_err(|e| ToolError::invalid_input("id", e.to_string()))?;

        let output = self.fetch(&args.id).await?;
        serde_json::to_value(output).map_err(|e| {
            tracing::error!("Failed to serialize fetch output: {}", e);
            ToolError::UpstreamError
        })
    }
}
