//! Read the document or one of its sub-trees.

use async_trait::async_trait;
use dandiclaw_core::error::ToolError;
use dandiclaw_core::tool::{Tool, ToolContext, ToolOutput, parse_arguments};
use serde::Deserialize;
use serde_json::Value;

pub struct GetMetadataTool;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GetMetadataParams {
    #[serde(default)]
    path: Option<String>,
}

#[async_trait]
impl Tool for GetMetadataTool {
    fn name(&self) -> &str {
        "get_metadata"
    }

    fn description(&self) -> &str {
        "Read the current dandiset metadata, or the value at one dotted path."
    }

    fn usage_guide(&self) -> &str {
        "get_metadata: call with no arguments for the whole document, or with \
         `path` (e.g. `contributor.0.name`) to read one value. The document in \
         this prompt is current as of the start of the turn; read again after \
         edits if you need to confirm them."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Dotted path such as `keywords` or `contributor.0.name`. Omit for the whole document."
                }
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: Value, ctx: &mut dyn ToolContext) -> Result<ToolOutput, ToolError> {
        let params: GetMetadataParams = parse_arguments(normalize(arguments))?;
        let path = params.path.unwrap_or_default();

        match dandiclaw_patch::get(ctx.document(), &path) {
            Some(value) => Ok(ToolOutput::success(pretty(value))),
            None => Ok(ToolOutput::failure(format!("No value at path `{path}`"))),
        }
    }
}

/// Models sometimes send `null` for "no arguments".
pub(crate) fn normalize(arguments: Value) -> Value {
    if arguments.is_null() {
        Value::Object(Default::default())
    } else {
        arguments
    }
}

pub(crate) fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
