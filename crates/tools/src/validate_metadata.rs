//! Run the configured validator over the working document.

use crate::validation::MetadataValidator;
use async_trait::async_trait;
use dandiclaw_core::error::ToolError;
use dandiclaw_core::tool::{Tool, ToolContext, ToolOutput, parse_arguments};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub struct ValidateMetadataTool {
    validator: Arc<dyn MetadataValidator>,
}

impl ValidateMetadataTool {
    pub fn new(validator: Arc<dyn MetadataValidator>) -> Self {
        Self { validator }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ValidateMetadataParams {}

#[async_trait]
impl Tool for ValidateMetadataTool {
    fn name(&self) -> &str {
        "validate_metadata"
    }

    fn description(&self) -> &str {
        "Check the current metadata for missing or empty required fields."
    }

    fn usage_guide(&self) -> &str {
        "validate_metadata: takes no arguments. Run it after a batch of edits and \
         before telling the user you are done."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: Value, ctx: &mut dyn ToolContext) -> Result<ToolOutput, ToolError> {
        let _: ValidateMetadataParams = parse_arguments(crate::get_metadata::normalize(arguments))?;

        let issues = self.validator.validate(ctx.document());
        if issues.is_empty() {
            return Ok(ToolOutput::success("Metadata is valid."));
        }

        let mut report = format!("Found {} issue(s):", issues.len());
        for issue in &issues {
            report.push_str("\n- ");
            report.push_str(&issue.to_string());
        }
        Ok(ToolOutput::failure(report))
    }
}
