//! Time-Series Synthesizer
//!
//! Advances a virtual clock in fixed intervals and emits one record per entity
//! per interval (round-robin). The clock starts far enough in the past that
//! `train_test_split` records land before "now"; the first interval after "now"
//! latches the test start time and is always emitted in full (cold start).
//! Every later slot is offered to the missing-data policy.
//!
//! ```text
//!   begin = now - interval * split / entities
//!
//!   BeforeTestStart ──(clock > now)──▶ InTestWindow ──(samples exhausted)──▶ Done
//!        │ emit every slot               │ cold-start interval, then
//!        │                               │ policy decides per slot
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info};

use super::missing::{DropContext, MissingMode, MissingPolicy};
use super::random::{
    drop_rng, uniform_samples_with, SampleSeed, DEFAULT_VALUE_MAX, DEFAULT_VALUE_MIN,
    FIXED_SEED,
};
use super::record::{entity_label, GenerationResult, Record, TIMESTAMP_FIELD, VALUE_FIELD};

const MILLIS_PER_MINUTE: i64 = 60_000;

// =============================================================================
// PARAMETERS & ERRORS
// =============================================================================

/// Shape of a generated dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisParams {
    pub interval_minutes: u32,
    /// Number of records dated before the generation start.
    pub train_test_split: usize,
    pub number_of_entities: usize,
    /// Document field holding the entity label.
    pub categorical_field: String,
    pub mode: MissingMode,
    /// First dropped interval index (continuous impute only).
    #[serde(default)]
    pub impute_start: u64,
    /// Last dropped interval index, inclusive (continuous impute only).
    #[serde(default)]
    pub impute_end: u64,
}

impl SynthesisParams {
    pub fn new(
        interval_minutes: u32,
        train_test_split: usize,
        number_of_entities: usize,
        categorical_field: impl Into<String>,
        mode: MissingMode,
    ) -> Self {
        Self {
            interval_minutes,
            train_test_split,
            number_of_entities,
            categorical_field: categorical_field.into(),
            mode,
            impute_start: 0,
            impute_end: 0,
        }
    }

    pub fn with_impute_window(mut self, start: u64, end: u64) -> Self {
        self.impute_start = start;
        self.impute_end = end;
        self
    }

    pub fn interval_millis(&self) -> i64 {
        i64::from(self.interval_minutes) * MILLIS_PER_MINUTE
    }

    /// How far before "now" the clock starts: `interval * split / entities`.
    pub fn back_dated_millis(&self) -> Option<i64> {
        let split = i64::try_from(self.train_test_split).ok()?;
        let entities = i64::try_from(self.number_of_entities).ok()?;
        self.interval_millis()
            .checked_mul(split)?
            .checked_div(entities)
    }

    pub fn policy(&self) -> MissingPolicy {
        MissingPolicy::new(self.mode, self.impute_start, self.impute_end)
    }

    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.number_of_entities == 0 {
            return Err(GenerationError::NoEntities);
        }
        if self.interval_minutes == 0 {
            return Err(GenerationError::ZeroInterval);
        }
        if self.categorical_field.trim().is_empty() {
            return Err(GenerationError::EmptyCategoricalField);
        }
        if self.categorical_field == TIMESTAMP_FIELD || self.categorical_field == VALUE_FIELD {
            return Err(GenerationError::ReservedField(self.categorical_field.clone()));
        }
        if self.back_dated_millis().is_none() {
            return Err(GenerationError::TimestampOverflow);
        }
        if self.mode == MissingMode::ContinuousImpute && self.impute_start > self.impute_end {
            return Err(GenerationError::InvalidImputeWindow {
                start: self.impute_start,
                end: self.impute_end,
            });
        }
        Ok(())
    }
}

/// Rejected generation parameters. Nothing is emitted when one is returned.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationError {
    NoEntities,
    ZeroInterval,
    EmptySamples,
    EmptyCategoricalField,
    ReservedField(String),
    InvalidImputeWindow { start: u64, end: u64 },
    InvalidRange { min: f64, max: f64 },
    /// The clock would leave the `i64` millisecond range.
    TimestampOverflow,
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoEntities => write!(f, "number of entities must be at least 1"),
            Self::ZeroInterval => write!(f, "interval must be at least one minute"),
            Self::EmptySamples => write!(f, "sample sequence is empty"),
            Self::EmptyCategoricalField => write!(f, "categorical field name is empty"),
            Self::ReservedField(name) => {
                write!(f, "categorical field '{}' collides with a reserved field", name)
            }
            Self::InvalidImputeWindow { start, end } => {
                write!(f, "impute window start {} is after end {}", start, end)
            }
            Self::InvalidRange { min, max } => {
                write!(f, "invalid value range [{}, {})", min, max)
            }
            Self::TimestampOverflow => {
                write!(f, "interval and split put timestamps outside the epoch-millis range")
            }
        }
    }
}

impl std::error::Error for GenerationError {}

// =============================================================================
// GENERATION FOLD
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    BeforeTestStart,
    InTestWindow,
    Done,
}

/// Running state of one generation pass.
struct SynthesisState<'a> {
    params: &'a SynthesisParams,
    policy: MissingPolicy,
    interval_millis: i64,
    now: i64,
    begin_timestamp: i64,
    timestamp: i64,
    entity_index: usize,
    test_start_time: i64,
    records: Vec<Record>,
    missing_timestamps: BTreeSet<i64>,
    missing_entities: BTreeSet<(i64, String)>,
}

impl<'a> SynthesisState<'a> {
    fn new(params: &'a SynthesisParams, now: i64, begin: i64, capacity: usize) -> Self {
        Self {
            params,
            policy: params.policy(),
            interval_millis: params.interval_millis(),
            now,
            begin_timestamp: begin,
            timestamp: begin,
            entity_index: 0,
            test_start_time: 0,
            records: Vec::with_capacity(capacity),
            missing_timestamps: BTreeSet::new(),
            missing_entities: BTreeSet::new(),
        }
    }

    fn emit(&mut self, value: f64) {
        self.records.push(Record {
            timestamp: self.timestamp,
            entity: entity_label(self.entity_index),
            value,
            categorical_field: self.params.categorical_field.clone(),
        });
    }

    /// Move to the next entity; the clock moves once every entity was visited.
    fn advance_entity(&mut self) {
        self.entity_index = (self.entity_index + 1) % self.params.number_of_entities;
        if self.entity_index == 0 {
            self.timestamp += self.interval_millis;
        }
    }

    /// Latch the test start and emit the cold-start interval without drops.
    fn start_test_window<I: Iterator<Item = f64>>(&mut self, samples: &mut I) -> Phase {
        info!(
            "test start time {}, index {}, current time {}",
            self.timestamp,
            self.records.len(),
            self.now
        );
        self.test_start_time = self.timestamp;

        for _ in 0..self.params.number_of_entities {
            match samples.next() {
                Some(value) => {
                    self.emit(value);
                    self.advance_entity();
                }
                None => {
                    debug!("sample supply ended inside the cold-start interval");
                    return Phase::Done;
                }
            }
        }
        Phase::InTestWindow
    }

    /// Consume one sample for the current slot.
    fn visit<R: Rng + ?Sized>(&mut self, value: f64, rng: &mut R) {
        let ctx = DropContext {
            entity_index: self.entity_index,
            test_start_time: self.test_start_time,
            current_timestamp: self.timestamp,
            interval_millis: self.interval_millis,
        };

        if !self.policy.should_drop(&ctx, rng) {
            self.emit(value);
            self.advance_entity();
            return;
        }

        if self.policy.mode().drops_whole_interval() {
            self.missing_timestamps.insert(self.timestamp);
            self.timestamp += self.interval_millis;
        } else {
            self.missing_entities
                .insert((self.timestamp, entity_label(self.entity_index)));
            self.advance_entity();
        }
    }

    fn finish(self) -> GenerationResult {
        if let (Some(first), Some(last)) = (self.records.first(), self.records.last()) {
            info!(
                "generated {} records, begin timestamp: {}, end timestamp: {}",
                self.records.len(),
                first.timestamp,
                last.timestamp
            );
        }
        GenerationResult {
            records: self.records,
            missing_timestamps: self.missing_timestamps,
            missing_entities: self.missing_entities,
            test_start_time: self.test_start_time,
            begin_timestamp: self.begin_timestamp,
            end_timestamp: self.timestamp,
            end_entity_index: self.entity_index,
            interval_millis: self.interval_millis,
            number_of_entities: self.params.number_of_entities,
        }
    }
}

/// First timestamp of a run, once the whole clock range is known to fit.
///
/// Every sample moves the clock by at most one interval, so the clock never
/// passes `begin + interval * samples`.
fn clock_start(
    params: &SynthesisParams,
    now: i64,
    samples: usize,
) -> Result<i64, GenerationError> {
    let begin = params
        .back_dated_millis()
        .and_then(|back| now.checked_sub(back))
        .ok_or(GenerationError::TimestampOverflow)?;
    i64::try_from(samples)
        .ok()
        .and_then(|n| params.interval_millis().checked_mul(n))
        .and_then(|span| begin.checked_add(span))
        .ok_or(GenerationError::TimestampOverflow)?;
    Ok(begin)
}

/// Run one generation pass with `start_time_ms` as "now".
///
/// `rng` only feeds drop decisions; values come from `samples` in order.
pub fn synthesize<R: Rng + ?Sized>(
    params: &SynthesisParams,
    samples: &[f64],
    start_time_ms: i64,
    rng: &mut R,
) -> Result<GenerationResult, GenerationError> {
    params.validate()?;
    if samples.is_empty() {
        return Err(GenerationError::EmptySamples);
    }

    let begin = clock_start(params, start_time_ms, samples.len())?;
    let mut state = SynthesisState::new(params, start_time_ms, begin, samples.len());
    info!(
        "begin timestamp: {} (mode {}, {} entities, {} samples)",
        state.timestamp,
        params.mode,
        params.number_of_entities,
        samples.len()
    );

    let mut supply = samples.iter().copied().peekable();
    let mut phase = Phase::BeforeTestStart;

    while phase != Phase::Done {
        if supply.peek().is_none() {
            phase = Phase::Done;
            continue;
        }
        if phase == Phase::BeforeTestStart && state.timestamp > state.now {
            phase = state.start_test_window(&mut supply);
            continue;
        }
        if let Some(value) = supply.next() {
            state.visit(value, rng);
        }
    }

    Ok(state.finish())
}

// =============================================================================
// SYNTHESIZER FACADE
// =============================================================================

/// Where the values of a run come from.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleSupply {
    /// `count` uniform values; `seeded` selects the fixed-seed stream.
    Uniform { count: usize, seeded: bool },
    Explicit(Vec<f64>),
}

/// Parameters plus the random sources of a run.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    params: SynthesisParams,
    drop_seed: SampleSeed,
    value_seed: u64,
    value_min: f64,
    value_max: f64,
}

impl Synthesizer {
    pub fn new(params: SynthesisParams) -> Self {
        Self {
            params,
            drop_seed: SampleSeed::Entropy,
            value_seed: FIXED_SEED,
            value_min: DEFAULT_VALUE_MIN,
            value_max: DEFAULT_VALUE_MAX,
        }
    }

    /// Seed for drop decisions; unseeded by default.
    pub fn with_drop_seed(mut self, seed: SampleSeed) -> Self {
        self.drop_seed = seed;
        self
    }

    /// Seed used for `SampleSupply::Uniform { seeded: true, .. }`.
    pub fn with_value_seed(mut self, seed: u64) -> Self {
        self.value_seed = seed;
        self
    }

    pub fn with_value_range(mut self, min: f64, max: f64) -> Self {
        self.value_min = min;
        self.value_max = max;
        self
    }

    pub fn params(&self) -> &SynthesisParams {
        &self.params
    }

    /// Resolve a supply into concrete values.
    pub fn samples(&self, supply: SampleSupply) -> Result<Vec<f64>, GenerationError> {
        match supply {
            SampleSupply::Uniform { count, seeded } => {
                let seed = if seeded {
                    SampleSeed::Fixed(self.value_seed)
                } else {
                    SampleSeed::Entropy
                };
                uniform_samples_with(count, self.value_min, self.value_max, seed)
            }
            SampleSupply::Explicit(values) => Ok(values),
        }
    }

    /// Generate against the wall clock.
    pub fn run(&self, supply: SampleSupply) -> Result<GenerationResult, GenerationError> {
        self.run_at(supply, chrono::Utc::now().timestamp_millis())
    }

    /// Generate with a pinned "now".
    pub fn run_at(
        &self,
        supply: SampleSupply,
        start_time_ms: i64,
    ) -> Result<GenerationResult, GenerationError> {
        self.params.validate()?;
        let samples = self.samples(supply)?;
        let mut rng = drop_rng(self.drop_seed);
        synthesize(&self.params, &samples, start_time_ms, &mut rng)
    }

    /// `sample_count` uniform values in the configured range, then generate.
    pub fn synthesize_uniform(
        &self,
        sample_count: usize,
        seeded: bool,
    ) -> Result<GenerationResult, GenerationError> {
        self.run(SampleSupply::Uniform {
            count: sample_count,
            seeded,
        })
    }
}
