//! Batch document mutation.
//!
//! Operations run in order, each against the document left by the previous
//! one. A failed operation is reported and skipped; earlier successes stay.

use async_trait::async_trait;
use dandiclaw_core::error::ToolError;
use dandiclaw_core::tool::{Tool, ToolContext, ToolOutput, parse_arguments};
use dandiclaw_patch::Operation;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt::Write;
use tracing::debug;

pub struct ModifyMetadataTool;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModifyMetadataParams {
    operations: Vec<OperationParams>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OperationParams {
    operation: Operation,
    path: String,
    /// Present-but-null is a real `null`, absent is `None`.
    #[serde(default, deserialize_with = "present")]
    value: Option<Value>,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

#[async_trait]
impl Tool for ModifyMetadataTool {
    fn name(&self) -> &str {
        "modify_metadata"
    }

    fn description(&self) -> &str {
        "Apply one or more set/delete/insert/append operations to the dandiset metadata."
    }

    fn usage_guide(&self) -> &str {
        "modify_metadata: pass `operations`, a list of `{operation, path, value}`.\n\
         - `set` writes `value` at `path`, creating missing objects and arrays.\n\
         - `delete` removes the array element at `path` (e.g. `keywords.2`).\n\
         - `insert` puts `value` before the element at `path`; the index may equal the length.\n\
         - `append` pushes `value` onto the array at `path`.\n\
         Operations apply in order; indices refer to the document as left by the \
         previous operation. Each operation is reported separately and failures \
         are not rolled back, so fix only the ones that failed."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operations": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "properties": {
                            "operation": {
                                "type": "string",
                                "enum": ["set", "delete", "insert", "append"]
                            },
                            "path": {
                                "type": "string",
                                "description": "Dotted path, e.g. `contributor.0.email`"
                            },
                            "value": {
                                "description": "Value for set, insert and append"
                            }
                        },
                        "required": ["operation", "path"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["operations"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: Value, ctx: &mut dyn ToolContext) -> Result<ToolOutput, ToolError> {
        let params: ModifyMetadataParams = parse_arguments(arguments)?;
        if params.operations.is_empty() {
            return Err(ToolError::InvalidArguments("`operations` must not be empty".into()));
        }

        let total = params.operations.len();
        let mut applied = 0;
        let mut report = String::new();

        for (i, op) in params.operations.into_iter().enumerate() {
            let outcome = ctx.modify(op.operation, &op.path, op.value);
            debug!(operation = %op.operation, path = %op.path, ok = outcome.is_ok(), "modify_metadata step");
            match outcome {
                Ok(()) => {
                    applied += 1;
                    let _ = writeln!(report, "{}. {} `{}`: ok", i + 1, op.operation, op.path);
                }
                Err(e) => {
                    let _ = writeln!(report, "{}. {} `{}`: failed: {e}", i + 1, op.operation, op.path);
                }
            }
        }

        let _ = write!(report, "Applied {applied} of {total} operations.");
        Ok(if applied == total {
            ToolOutput::success(report)
        } else {
            ToolOutput::failure(report)
        })
    }
}
