//! Synthetic time-series test harness
//!
//! Generates multi-entity series with controlled gaps, bulk-loads them into a
//! search endpoint, and waits until the load is visible to queries.

pub mod config;
pub mod ingest;
pub mod search;
pub mod synthetic;

pub use config::HarnessConfig;
pub use ingest::{
    ingest_and_await, ingest_generated, load_training_data, unique_dataset_name, BulkIngestor,
    CompletionPoller, IngestConfig, IngestError, PollConfig, PollOutcome, DEFAULT_BATCH_SIZE,
};
pub use search::{InMemoryBackend, OpenSearchClient, Schema, SearchBackend};
pub use synthetic::{
    GenerationResult, MissingMode, Record, SampleSeed, SampleSupply, SynthesisParams, Synthesizer,
};
