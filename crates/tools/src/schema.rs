//! Metadata JSON schema access.
//!
//! The schema is fetched once through a [`SchemaSource`] and kept in a
//! [`SchemaCache`] until [`SchemaCache::clear`] is called.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Failed to fetch schema from {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Schema is not valid JSON: {0}")]
    Parse(String),
}

/// Where the schema comes from.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn fetch(&self) -> Result<Value, SchemaError>;
}

/// Fetches the schema over HTTP.
pub struct HttpSchemaSource {
    url: String,
    client: reqwest::Client,
}

impl HttpSchemaSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SchemaError> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SchemaError::Fetch {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl SchemaSource for HttpSchemaSource {
    async fn fetch(&self) -> Result<Value, SchemaError> {
        let fetch_err = |reason: String| SchemaError::Fetch {
            url: self.url.clone(),
            reason,
        };

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;
        if !response.status().is_success() {
            return Err(fetch_err(format!("HTTP {}", response.status())));
        }
        let body = response.text().await.map_err(|e| fetch_err(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| SchemaError::Parse(e.to_string()))
    }
}

/// A schema known up front.
pub struct StaticSchemaSource(pub Value);

#[async_trait]
impl SchemaSource for StaticSchemaSource {
    async fn fetch(&self) -> Result<Value, SchemaError> {
        Ok(self.0.clone())
    }
}

/// What the schema says about one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Lazily populated schema cache.
pub struct SchemaCache {
    source: Box<dyn SchemaSource>,
    schema: Mutex<Option<Arc<Value>>>,
}

impl SchemaCache {
    pub fn new(source: Box<dyn SchemaSource>) -> Self {
        Self {
            source,
            schema: Mutex::new(None),
        }
    }

    /// The schema, fetched on first use.
    pub async fn get(&self) -> Result<Arc<Value>, SchemaError> {
        let mut slot = self.schema.lock().await;
        if let Some(schema) = slot.as_ref() {
            return Ok(Arc::clone(schema));
        }
        let schema = Arc::new(self.source.fetch().await?);
        info!("Metadata schema loaded");
        *slot = Some(Arc::clone(&schema));
        Ok(schema)
    }

    /// Forget the schema. The next [`get`](Self::get) fetches it again.
    pub async fn clear(&self) {
        *self.schema.lock().await = None;
        debug!("Schema cache cleared");
    }

    pub async fn is_populated(&self) -> bool {
        self.schema.lock().await.is_some()
    }

    /// Top-level fields, sorted by name.
    pub async fn fields(&self) -> Result<Vec<FieldInfo>, SchemaError> {
        let schema = self.get().await?;
        Ok(object_fields(&schema, &schema))
    }

    /// Describe the field at a dotted path such as `contributor.name`.
    /// Array indices in the path are skipped.
    pub async fn field(&self, path: &str) -> Result<Option<FieldInfo>, SchemaError> {
        let schema = self.get().await?;
        Ok(describe_path(&schema, path))
    }
}

fn describe_path(schema: &Value, path: &str) -> Option<FieldInfo> {
    let mut node = schema;
    let mut found = None;

    for segment in path
        .split(['.', '[', ']'])
        .filter(|s| !s.is_empty() && s.parse::<usize>().is_err())
    {
        let object = element_schema(schema, node);
        let property = object.get("properties")?.get(segment)?;
        found = Some(field_info(schema, object, segment, property));
        node = property;
    }
    found
}

/// Step through `$ref` and array `items` to the schema describing one element.
fn element_schema<'a>(root: &'a Value, node: &'a Value) -> &'a Value {
    let node = resolve(root, node);
    match node.get("items") {
        Some(items) => resolve(root, items),
        None => node,
    }
}

fn resolve<'a>(root: &'a Value, node: &'a Value) -> &'a Value {
    let mut node = node;
    // Bounded so a self-referencing schema cannot loop forever.
    for _ in 0..8 {
        match node.get("$ref").and_then(Value::as_str).and_then(|r| lookup_ref(root, r)) {
            Some(target) => node = target,
            None => break,
        }
    }
    node
}

fn lookup_ref<'a>(root: &'a Value, reference: &str) -> Option<&'a Value> {
    let pointer = reference.strip_prefix('#')?;
    root.pointer(pointer)
}

fn object_fields(root: &Value, object: &Value) -> Vec<FieldInfo> {
    object
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .map(|(name, property)| field_info(root, object, name, property))
                .collect()
        })
        .unwrap_or_default()
}

fn field_info(root: &Value, parent: &Value, name: &str, property: &Value) -> FieldInfo {
    let required = parent
        .get("required")
        .and_then(Value::as_array)
        .is_some_and(|r| r.iter().any(|f| f.as_str() == Some(name)));
    let description = property
        .get("description")
        .or_else(|| resolve(root, property).get("description"))
        .and_then(Value::as_str)
        .map(str::to_string);

    FieldInfo {
        name: name.to_string(),
        type_name: type_name(property),
        required,
        description,
    }
}

fn type_name(property: &Value) -> String {
    if let Some(reference) = property.get("$ref").and_then(Value::as_str) {
        return reference.rsplit('/').next().unwrap_or(reference).to_string();
    }
    match property.get("type") {
        Some(Value::String(t)) if t == "array" => match property.get("items") {
            Some(items) => format!("array of {}", type_name(items)),
            None => "array".into(),
        },
        Some(Value::String(t)) => t.clone(),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" | "),
        _ => {
            let variants = property
                .get("anyOf")
                .or_else(|| property.get("oneOf"))
                .and_then(Value::as_array);
            match variants {
                Some(variants) => variants.iter().map(type_name).collect::<Vec<_>>().join(" | "),
                None => "any".into(),
            }
        }
    }
}
