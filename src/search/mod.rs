//! Search/storage endpoint boundary
//!
//! The harness only needs five calls from the destination: create a collection
//! with a schema, read the schema back, bulk-write documents under explicit ids,
//! fetch the latest document by a sort field, and refresh visibility.
//! `OpenSearchClient` speaks the REST API; `InMemoryBackend` backs dry runs and
//! tests.

pub mod memory;
pub mod opensearch;

pub use memory::{BulkCall, InMemoryBackend};
pub use opensearch::OpenSearchClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::synthetic::record::{TIMESTAMP_FIELD, VALUE_FIELD};

// =============================================================================
// BACKEND TRAIT
// =============================================================================

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Create `name`; an existing collection is reported, not treated as an error.
    async fn create_collection(
        &self,
        name: &str,
        schema: &Schema,
    ) -> Result<CollectionStatus, BackendError>;

    async fn fetch_schema(&self, name: &str) -> Result<Schema, BackendError>;

    async fn bulk_write(
        &self,
        name: &str,
        documents: &[IndexedDocument],
    ) -> Result<BulkAck, BackendError>;

    /// Top document ordered by `sort_field`; `None` when the collection is
    /// missing or empty.
    async fn query_latest(
        &self,
        name: &str,
        sort_field: &str,
        descending: bool,
        limit: usize,
    ) -> Result<Option<LatestHit>, BackendError>;

    async fn refresh(&self, name: &str) -> Result<(), BackendError>;
}

// =============================================================================
// WIRE TYPES
// =============================================================================

/// Document plus the id it is stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    pub id: u64,
    pub source: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStatus {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkAck {
    pub items: usize,
    pub took_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LatestHit {
    pub id: String,
    pub source: Value,
}

impl LatestHit {
    /// Ids are assigned from sequence positions, so they parse as integers.
    pub fn numeric_id(&self) -> Option<u64> {
        self.id.parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    Transport(String),
    Status { status: u16, body: String },
    Decode(String),
    /// Bulk request accepted but some items failed.
    Rejected { failed: usize, first_reason: String },
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
            Self::Status { status, body } => write!(f, "endpoint returned {}: {}", status, body),
            Self::Decode(msg) => write!(f, "failed to decode response: {}", msg),
            Self::Rejected {
                failed,
                first_reason,
            } => write!(f, "{} bulk items rejected (first: {})", failed, first_reason),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

// =============================================================================
// SCHEMA
// =============================================================================

/// Index-creation body: `{"mappings": {"properties": {...}}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema(Value);

/// A requested field that is absent or typed differently in an existing collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldConflict {
    pub field: String,
    pub expected: String,
    pub found: Option<String>,
}

impl fmt::Display for FieldConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.found {
            Some(found) => write!(
                f,
                "field '{}' is '{}' (expected '{}')",
                self.field, found, self.expected
            ),
            None => write!(f, "field '{}' is missing (expected '{}')", self.field, self.expected),
        }
    }
}

impl Schema {
    pub fn from_value(body: Value) -> Self {
        Self(body)
    }

    /// Build from `(field, type)` pairs.
    pub fn from_fields<'a>(fields: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let properties: Map<String, Value> = fields
            .into_iter()
            .map(|(name, ty)| (name.to_string(), json!({ "type": ty })))
            .collect();
        Self(json!({ "mappings": { "properties": properties } }))
    }

    /// Generated single-feature data keyed by `categorical_field`.
    pub fn uniform(categorical_field: &str) -> Self {
        Self::from_fields([
            (TIMESTAMP_FIELD, "date"),
            (VALUE_FIELD, "double"),
            (categorical_field, "keyword"),
        ])
    }

    /// The two-feature `synthetic` dataset.
    pub fn synthetic() -> Self {
        Self::from_fields([
            (TIMESTAMP_FIELD, "date"),
            ("Feature1", "double"),
            ("Feature2", "double"),
        ])
    }

    /// The `rule` dataset.
    pub fn rule() -> Self {
        Self::from_fields([
            (TIMESTAMP_FIELD, "date"),
            ("transform._doc_count", "integer"),
            ("componentName", "keyword"),
        ])
    }

    pub fn body(&self) -> &Value {
        &self.0
    }

    /// Leaf field types keyed by dotted path.
    pub fn field_types(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        if let Some(props) = self.0.pointer("/mappings/properties") {
            collect_fields("", props, &mut out);
        }
        out
    }

    pub fn conflicts_with(&self, existing: &Schema) -> Vec<FieldConflict> {
        let found = existing.field_types();
        self.field_types()
            .into_iter()
            .filter_map(|(field, expected)| match found.get(&field) {
                Some(ty) if *ty == expected => None,
                other => Some(FieldConflict {
                    field,
                    expected,
                    found: other.cloned(),
                }),
            })
            .collect()
    }

    /// Every requested field exists in `existing` with the same type.
    pub fn is_compatible_with(&self, existing: &Schema) -> bool {
        self.conflicts_with(existing).is_empty()
    }
}

fn collect_fields(prefix: &str, properties: &Value, out: &mut BTreeMap<String, String>) {
    let Some(map) = properties.as_object() else {
        return;
    };
    for (name, def) in map {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };
        if let Some(ty) = def.get("type").and_then(Value::as_str) {
            out.insert(path.clone(), ty.to_string());
        }
        if let Some(nested) = def.get("properties") {
            collect_fields(&path, nested, out);
        }
    }
}
