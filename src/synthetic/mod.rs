//! Synthetic multi-entity time series
//!
//! - `random`: uniform value streams (fixed seed or entropy)
//! - `missing`: per-slot drop decisions for the test window
//! - `synthesizer`: interleaved entity/interval generation with gap ledgers
//! - `record`: documents and the immutable generation result
//! - `dataset`: JSON-array dataset files and result dumps

pub mod dataset;
pub mod missing;
pub mod random;
pub mod record;
pub mod synthesizer;

#[cfg(test)]
mod synthesizer_tests;

pub use dataset::{read_json_array_with_limit, parse_train_time, write_generation, DatasetError};
pub use missing::{should_drop, DropContext, MissingMode, MissingPolicy};
pub use random::{drop_rng, uniform_samples, uniform_samples_with, SampleSeed};
pub use record::{entity_label, GenerationResult, GenerationSummary, Record};
pub use synthesizer::{
    synthesize, GenerationError, SampleSupply, SynthesisParams, Synthesizer,
};
