//! Built-in tools for DandiClaw.
//!
//! The tools let the agent read, edit and check one dandiset metadata
//! document, and look fields up in the metadata schema:
//!
//! - `get_metadata`: read the document or a sub-tree
//! - `modify_metadata`: batch set/delete/insert/append
//! - `validate_metadata`: run the configured [`MetadataValidator`]
//! - `lookup_schema`: query the schema through a [`SchemaCache`]

pub mod document;
pub mod get_metadata;
pub mod lookup_schema;
pub mod modify_metadata;
pub mod schema;
pub mod validate_metadata;
pub mod validation;

use dandiclaw_core::tool::ToolRegistry;
use std::sync::Arc;

pub use document::MetadataDocument;
pub use schema::{FieldInfo, HttpSchemaSource, SchemaCache, SchemaError, SchemaSource, StaticSchemaSource};
pub use validation::{MetadataValidator, RequiredFieldsValidator, ValidationIssue};

/// Create a registry with every built-in tool.
pub fn default_registry(schema: Arc<SchemaCache>, validator: Arc<dyn MetadataValidator>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(get_metadata::GetMetadataTool));
    registry.register(Box::new(modify_metadata::ModifyMetadataTool));
    registry.register(Box::new(validate_metadata::ValidateMetadataTool::new(validator)));
    registry.register(Box::new(lookup_schema::LookupSchemaTool::new(schema)));
    registry
}
