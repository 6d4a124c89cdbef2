//! Ingestion into a search backend
//!
//! - `bulk`: batched writes with position ids
//! - `poller`: waits until the last position is searchable
//! - `pipeline`: ingest-then-await entry points for scenarios

pub mod bulk;
pub mod pipeline;
pub mod poller;

pub use bulk::{BatchReport, BulkIngestor, IngestConfig, IngestError, IngestReport, DEFAULT_BATCH_SIZE};
pub use pipeline::{
    ingest_and_await, ingest_generated, load_training_data, unique_dataset_name, LoadError,
    TrainingLoad,
};
pub use poller::{id_within_tolerance, CompletionPoller, IngestTimeout, PollConfig, PollOutcome};
