//! Answer questions about the metadata schema.

use crate::get_metadata::{normalize, pretty};
use crate::schema::SchemaCache;
use async_trait::async_trait;
use dandiclaw_core::error::ToolError;
use dandiclaw_core::tool::{Tool, ToolContext, ToolOutput, parse_arguments};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub struct LookupSchemaTool {
    cache: Arc<SchemaCache>,
}

impl LookupSchemaTool {
    pub fn new(cache: Arc<SchemaCache>) -> Self {
        Self { cache }
    }

    fn failed(&self, reason: impl ToString) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LookupSchemaParams {
    #[serde(default)]
    field: Option<String>,
}

#[async_trait]
impl Tool for LookupSchemaTool {
    fn name(&self) -> &str {
        "lookup_schema"
    }

    fn description(&self) -> &str {
        "Describe a metadata field from the dandiset schema, or list the top-level fields."
    }

    fn usage_guide(&self) -> &str {
        "lookup_schema: check a field's type and whether it is required before \
         writing it. Pass `field` as a dotted path (`contributor.roleName`) or \
         omit it to list all top-level fields."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "field": {
                    "type": "string",
                    "description": "Dotted field path. Omit to list top-level fields."
                }
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: Value, _ctx: &mut dyn ToolContext) -> Result<ToolOutput, ToolError> {
        let params: LookupSchemaParams = parse_arguments(normalize(arguments))?;

        match params.field.filter(|f| !f.trim().is_empty()) {
            None => {
                let fields = self.cache.fields().await.map_err(|e| self.failed(e))?;
                let listing: Vec<String> = fields
                    .iter()
                    .map(|f| {
                        let marker = if f.required { " (required)" } else { "" };
                        format!("{}: {}{marker}", f.name, f.type_name)
                    })
                    .collect();
                Ok(ToolOutput::success(listing.join("\n")))
            }
            Some(field) => match self.cache.field(&field).await.map_err(|e| self.failed(e))? {
                Some(info) => {
                    let value = serde_json::to_value(&info).map_err(|e| self.failed(e))?;
                    Ok(ToolOutput::success(pretty(&value)))
                }
                None => Ok(ToolOutput::failure(format!("The schema has no field `{field}`"))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetadataDocument;
    use crate::schema::{SchemaError, SchemaSource, StaticSchemaSource};
    use serde_json::json;

    fn tool() -> LookupSchemaTool {
        let schema = json!({
            "type": "object",
            "required": ["name"],
            "properties": {
                "name": {"type": "string", "description": "Title"},
                "keywords": {"type": "array", "items": {"type": "string"}}
            }
        });
        LookupSchemaTool::new(Arc::new(SchemaCache::new(Box::new(StaticSchemaSource(schema)))))
    }

    #[tokio::test]
    async fn lists_top_level_fields() {
        let mut doc = MetadataDocument::new(json!({}));
        let out = tool().execute(json!({}), &mut doc).await.unwrap();
        assert!(out.success);
        assert_eq!(out.result, "keywords: array of string\nname: string (required)");
    }

    #[tokio::test]
    async fn describes_one_field() {
        let mut doc = MetadataDocument::new(json!({}));
        let out = tool().execute(json!({"field": "name"}), &mut doc).await.unwrap();
        let info: Value = serde_json::from_str(&out.result).unwrap();
        assert_eq!(
            info,
            json!({"name": "name", "type": "string", "required": true, "description": "Title"})
        );

        let out = tool().execute(json!({"field": "size"}), &mut doc).await.unwrap();
        assert!(!out.success);
    }

    #[tokio::test]
    async fn unavailable_schema_is_an_execution_error() {
        struct Offline;
        #[async_trait]
        impl SchemaSource for Offline {
            async fn fetch(&self) -> Result<Value, SchemaError> {
                Err(SchemaError::Parse("offline".into()))
            }
        }

        let tool = LookupSchemaTool::new(Arc::new(SchemaCache::new(Box::new(Offline))));
        let mut doc = MetadataDocument::new(json!({}));
        let err = tool.execute(json!({}), &mut doc).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }
}
