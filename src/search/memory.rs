//! In-memory search backend
//!
//! Keeps collections in a mutex-guarded map. Failure injection and visibility
//! knobs let callers exercise the ingestion and polling paths without a server.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::{
    BackendError, BulkAck, CollectionStatus, IndexedDocument, LatestHit, Schema, SearchBackend,
};

/// One accepted bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkCall {
    pub collection: String,
    pub ids: Vec<u64>,
}

impl BulkCall {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn max_id(&self) -> Option<u64> {
        self.ids.iter().copied().max()
    }
}

struct Collection {
    schema: Schema,
    documents: BTreeMap<u64, Value>,
}

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, Collection>,
    bulk_calls: Vec<BulkCall>,
    bulk_attempts: usize,
    failing_attempts: HashSet<usize>,
    visible_id_limit: Option<u64>,
    refreshes_until_visible: usize,
    refreshes: usize,
    queries: usize,
}

#[derive(Default)]
pub struct InMemoryBackend {
    state: Mutex<MemoryState>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create a collection, as if another run had left it behind.
    pub fn with_collection(self, name: &str, schema: Schema) -> Self {
        self.state.lock().collections.insert(
            name.to_string(),
            Collection {
                schema,
                documents: BTreeMap::new(),
            },
        );
        self
    }

    /// Fail the bulk request with this zero-based attempt number.
    pub fn fail_bulk_at(&self, attempt: usize) {
        self.state.lock().failing_attempts.insert(attempt);
    }

    /// Hide documents whose id is at or above `limit` from `query_latest`.
    pub fn set_visible_id_limit(&self, limit: Option<u64>) {
        self.state.lock().visible_id_limit = limit;
    }

    /// `query_latest` returns nothing until this many refreshes happened.
    pub fn set_refreshes_until_visible(&self, refreshes: usize) {
        self.state.lock().refreshes_until_visible = refreshes;
    }

    pub fn bulk_calls(&self) -> Vec<BulkCall> {
        self.state.lock().bulk_calls.clone()
    }

    pub fn refresh_count(&self) -> usize {
        self.state.lock().refreshes
    }

    pub fn query_count(&self) -> usize {
        self.state.lock().queries
    }

    pub fn document_count(&self, name: &str) -> usize {
        self.state
            .lock()
            .collections
            .get(name)
            .map_or(0, |c| c.documents.len())
    }

    pub fn document(&self, name: &str, id: u64) -> Option<Value> {
        self.state
            .lock()
            .collections
            .get(name)
            .and_then(|c| c.documents.get(&id).cloned())
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.state.lock().collections.contains_key(name)
    }
}

fn sort_key(source: &Value, field: &str) -> Option<f64> {
    let value = source.get(field)?;
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

#[async_trait]
impl SearchBackend for InMemoryBackend {
    async fn create_collection(
        &self,
        name: &str,
        schema: &Schema,
    ) -> Result<CollectionStatus, BackendError> {
        let mut state = self.state.lock();
        if state.collections.contains_key(name) {
            return Ok(CollectionStatus::AlreadyExists);
        }
        state.collections.insert(
            name.to_string(),
            Collection {
                schema: schema.clone(),
                documents: BTreeMap::new(),
            },
        );
        Ok(CollectionStatus::Created)
    }

    async fn fetch_schema(&self, name: &str) -> Result<Schema, BackendError> {
        self.state
            .lock()
            .collections
            .get(name)
            .map(|c| c.schema.clone())
            .ok_or_else(|| BackendError::Status {
                status: 404,
                body: format!("no such index [{}]", name),
            })
    }

    async fn bulk_write(
        &self,
        name: &str,
        documents: &[IndexedDocument],
    ) -> Result<BulkAck, BackendError> {
        let mut state = self.state.lock();
        let attempt = state.bulk_attempts;
        state.bulk_attempts += 1;
        if state.failing_attempts.contains(&attempt) {
            return Err(BackendError::Transport(format!(
                "connection reset during bulk attempt {}",
                attempt
            )));
        }

        // Bulk indexing auto-creates missing indices.
        let collection = state
            .collections
            .entry(name.to_string())
            .or_insert_with(|| Collection {
                schema: Schema::from_fields([]),
                documents: BTreeMap::new(),
            });
        for doc in documents {
            collection.documents.insert(doc.id, doc.source.clone());
        }
        state.bulk_calls.push(BulkCall {
            collection: name.to_string(),
            ids: documents.iter().map(|d| d.id).collect(),
        });
        Ok(BulkAck {
            items: documents.len(),
            took_ms: Some(0),
        })
    }

    async fn query_latest(
        &self,
        name: &str,
        sort_field: &str,
        descending: bool,
        limit: usize,
    ) -> Result<Option<LatestHit>, BackendError> {
        let mut state = self.state.lock();
        state.queries += 1;
        if limit == 0 || state.refreshes < state.refreshes_until_visible {
            return Ok(None);
        }
        let limit_id = state.visible_id_limit;
        let Some(collection) = state.collections.get(name) else {
            return Ok(None);
        };

        let candidates = collection
            .documents
            .iter()
            .filter(|(id, _)| limit_id.map_or(true, |max| **id < max))
            .filter_map(|(id, source)| sort_key(source, sort_field).map(|k| (k, *id, source)));

        // Ties resolve to the higher id.
        let best = if descending {
            candidates.max_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
        } else {
            candidates.min_by(|a, b| a.0.total_cmp(&b.0).then(b.1.cmp(&a.1)))
        };

        Ok(best.map(|(_, id, source)| LatestHit {
            id: id.to_string(),
            source: source.clone(),
        }))
    }

    async fn refresh(&self, _name: &str) -> Result<(), BackendError> {
        self.state.lock().refreshes += 1;
        Ok(())
    }
}
