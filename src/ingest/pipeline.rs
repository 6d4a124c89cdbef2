//! Scenario entry points: ingest, then wait for visibility.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use super::bulk::{BulkIngestor, IngestConfig, IngestError};
use super::poller::{CompletionPoller, PollConfig, PollOutcome};
use crate::search::{Schema, SearchBackend};
use crate::synthetic::{parse_train_time, read_json_array_with_limit, DatasetError, GenerationResult};

/// `<prefix>-<uuid>`, lowercase so it is a valid index name.
pub fn unique_dataset_name(prefix: &str) -> String {
    format!("{}-{}", prefix.to_lowercase(), Uuid::new_v4().simple())
}

/// Ingest the first `expected` documents and poll until they are visible.
pub async fn ingest_and_await<B, T>(
    backend: &B,
    documents: &[T],
    dataset: &str,
    schema: &Schema,
    ingest: &IngestConfig,
    poll: &PollConfig,
    expected: usize,
) -> Result<PollOutcome, IngestError>
where
    B: SearchBackend + ?Sized,
    T: Serialize,
{
    let report = BulkIngestor::new(backend, ingest.clone())
        .ingest(documents, dataset, schema, Some(expected))
        .await?;
    info!(
        "ingested {} documents into {} in {} batches",
        report.documents,
        dataset,
        report.batches.len()
    );

    Ok(CompletionPoller::new(backend, poll.clone())
        .await_count(dataset, report.documents)
        .await)
}

/// Ingest generated records; `None` or `Some(0)` ingests all of them.
pub async fn ingest_generated<B: SearchBackend + ?Sized>(
    backend: &B,
    result: &GenerationResult,
    dataset: &str,
    ingest_size: Option<usize>,
    ingest: &IngestConfig,
    poll: &PollConfig,
) -> Result<PollOutcome, IngestError> {
    let Some(first) = result.records.first() else {
        info!("no records to ingest into {}", dataset);
        return Ok(PollOutcome::Ready {
            observed_id: None,
            cycles: 0,
        });
    };
    let schema = Schema::uniform(&first.categorical_field);
    let expected = match ingest_size {
        Some(n) if n > 0 => n.min(result.records.len()),
        _ => result.records.len(),
    };
    ingest_and_await(backend, &result.records, dataset, &schema, ingest, poll, expected).await
}

#[derive(Debug)]
pub enum LoadError {
    Dataset(DatasetError),
    Ingest(IngestError),
    EmptyDataset { path: PathBuf },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dataset(e) => write!(f, "dataset error: {}", e),
            Self::Ingest(e) => write!(f, "ingestion error: {}", e),
            Self::EmptyDataset { path } => write!(f, "{:?} holds no training documents", path),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Dataset(e) => Some(e),
            Self::Ingest(e) => Some(e),
            Self::EmptyDataset { .. } => None,
        }
    }
}

impl From<DatasetError> for LoadError {
    fn from(e: DatasetError) -> Self {
        Self::Dataset(e)
    }
}

impl From<IngestError> for LoadError {
    fn from(e: IngestError) -> Self {
        Self::Ingest(e)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingLoad {
    /// Timestamp of the last training document.
    pub train_end: DateTime<Utc>,
    pub documents: usize,
    pub outcome: PollOutcome,
}

/// Ingest the first `train_test_split` documents of a JSON-array dataset file.
pub async fn load_training_data<B: SearchBackend + ?Sized>(
    backend: &B,
    path: impl AsRef<Path>,
    dataset: &str,
    schema: &Schema,
    train_test_split: usize,
    ingest: &IngestConfig,
    poll: &PollConfig,
) -> Result<TrainingLoad, LoadError> {
    let path = path.as_ref();
    let documents = read_json_array_with_limit(path, train_test_split)?;
    let Some(last) = documents.last() else {
        return Err(LoadError::EmptyDataset {
            path: path.to_path_buf(),
        });
    };
    let train_end = parse_train_time(last)?;

    let outcome = ingest_and_await(
        backend,
        &documents,
        dataset,
        schema,
        ingest,
        poll,
        documents.len(),
    )
    .await?;
    info!("loaded {} training documents ending at {}", documents.len(), train_end);

    Ok(TrainingLoad {
        train_end,
        documents: documents.len(),
        outcome,
    })
}
