//! Bulk Ingestion Orchestrator
//!
//! Writes a document sequence into a collection in fixed-size batches. Every
//! document is stored under its position in the sequence, so "highest id
//! ingested" tells how far ingestion got. A failed batch is surfaced with its
//! index and never retried here.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use crate::search::{
    BackendError, CollectionStatus, FieldConflict, IndexedDocument, Schema, SearchBackend,
};

/// Default documents per bulk request.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    pub batch_size: usize,
    /// Pause between consecutive bulk requests.
    pub batch_delay: Duration,
    /// Pause after a collection is created.
    pub create_settle: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: Duration::from_secs(1),
            create_settle: Duration::from_secs(1),
        }
    }
}

impl IngestConfig {
    /// No pacing; for in-memory destinations.
    pub fn immediate(batch_size: usize) -> Self {
        Self {
            batch_size,
            batch_delay: Duration::ZERO,
            create_settle: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub index: usize,
    pub size: usize,
    pub first_id: u64,
    pub max_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub dataset: String,
    pub created: bool,
    pub documents: usize,
    pub batches: Vec<BatchReport>,
}

impl IngestReport {
    pub fn max_id(&self) -> Option<u64> {
        self.batches.last().map(|b| b.max_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestError {
    InvalidBatchSize,
    /// Collection exists with incompatible field types.
    SchemaConflict {
        dataset: String,
        conflicts: Vec<FieldConflict>,
    },
    /// Creating or inspecting the collection failed.
    Collection { dataset: String, cause: BackendError },
    Encode { position: usize, reason: String },
    /// A bulk request failed; earlier batches are already stored.
    Batch {
        batch_index: usize,
        first_position: usize,
        cause: BackendError,
    },
}

impl IngestError {
    /// Position of the first document that may not have been stored.
    pub fn resume_from(&self) -> Option<usize> {
        match self {
            Self::Batch { first_position, .. } => Some(*first_position),
            Self::Encode { position, .. } => Some(*position),
            _ => None,
        }
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBatchSize => write!(f, "batch size must be at least 1"),
            Self::SchemaConflict { dataset, conflicts } => {
                let details: Vec<String> = conflicts.iter().map(|c| c.to_string()).collect();
                write!(
                    f,
                    "collection '{}' exists with an incompatible schema: {}",
                    dataset,
                    details.join("; ")
                )
            }
            Self::Collection { dataset, cause } => {
                write!(f, "failed to prepare collection '{}': {}", dataset, cause)
            }
            Self::Encode { position, reason } => {
                write!(f, "failed to encode document {}: {}", position, reason)
            }
            Self::Batch {
                batch_index,
                first_position,
                cause,
            } => write!(
                f,
                "batch {} (documents from {}) failed: {}",
                batch_index, first_position, cause
            ),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Collection { cause, .. } | Self::Batch { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

pub struct BulkIngestor<'a, B: SearchBackend + ?Sized> {
    backend: &'a B,
    config: IngestConfig,
}

impl<'a, B: SearchBackend + ?Sized> BulkIngestor<'a, B> {
    pub fn new(backend: &'a B, config: IngestConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Create `dataset`, or confirm an existing one accepts `schema`.
    pub async fn ensure_collection(
        &self,
        dataset: &str,
        schema: &Schema,
    ) -> Result<CollectionStatus, IngestError> {
        let collection_error = |cause| IngestError::Collection {
            dataset: dataset.to_string(),
            cause,
        };

        let status = self
            .backend
            .create_collection(dataset, schema)
            .await
            .map_err(collection_error)?;

        match status {
            CollectionStatus::Created => {
                info!("created collection {}", dataset);
                if !self.config.create_settle.is_zero() {
                    tokio::time::sleep(self.config.create_settle).await;
                }
            }
            CollectionStatus::AlreadyExists => {
                let existing = self
                    .backend
                    .fetch_schema(dataset)
                    .await
                    .map_err(collection_error)?;
                let conflicts = schema.conflicts_with(&existing);
                if !conflicts.is_empty() {
                    return Err(IngestError::SchemaConflict {
                        dataset: dataset.to_string(),
                        conflicts,
                    });
                }
                debug!("reusing existing collection {}", dataset);
            }
        }
        Ok(status)
    }

    /// Write `documents[..target_count]` (all when `None`) in order.
    pub async fn ingest<T: Serialize>(
        &self,
        documents: &[T],
        dataset: &str,
        schema: &Schema,
        target_count: Option<usize>,
    ) -> Result<IngestReport, IngestError> {
        let batch_size = self.config.batch_size;
        if batch_size == 0 {
            return Err(IngestError::InvalidBatchSize);
        }

        let status = self.ensure_collection(dataset, schema).await?;

        let picked = target_count.map_or(documents.len(), |t| t.min(documents.len()));
        info!("data size {}, ingest size {}", documents.len(), picked);

        let mut batches = Vec::with_capacity(picked.div_ceil(batch_size));
        for (batch_index, chunk) in documents[..picked].chunks(batch_size).enumerate() {
            let first_position = batch_index * batch_size;
            let batch = chunk
                .iter()
                .enumerate()
                .map(|(offset, doc)| {
                    let position = first_position + offset;
                    serde_json::to_value(doc)
                        .map(|source| IndexedDocument {
                            id: position as u64,
                            source,
                        })
                        .map_err(|e| IngestError::Encode {
                            position,
                            reason: e.to_string(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            if batch_index > 0 && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }

            self.backend
                .bulk_write(dataset, &batch)
                .await
                .map_err(|cause| IngestError::Batch {
                    batch_index,
                    first_position,
                    cause,
                })?;

            let report = BatchReport {
                index: batch_index,
                size: batch.len(),
                first_id: first_position as u64,
                max_id: (first_position + batch.len() - 1) as u64,
            };
            debug!(
                "batch {} written: ids {}..={}",
                report.index, report.first_id, report.max_id
            );
            batches.push(report);
        }

        Ok(IngestReport {
            dataset: dataset.to_string(),
            created: status == CollectionStatus::Created,
            documents: picked,
            batches,
        })
    }
}
