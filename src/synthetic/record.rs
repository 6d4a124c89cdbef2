//! Generated records and the result of a generation run.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::BTreeSet;

/// Field name holding the synthetic value in every document.
pub const VALUE_FIELD: &str = "data";

/// Field name holding the epoch-millis timestamp in every document.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Label for the entity at `index`.
pub fn entity_label(index: usize) -> String {
    format!("entity{}", index)
}

/// One synthesized data point.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub entity: String,
    pub value: f64,
    /// Document field that carries `entity`.
    pub categorical_field: String,
}

impl Record {
    /// Search document form: `{"timestamp": .., "<categorical_field>": .., "data": ..}`.
    pub fn to_document(&self) -> serde_json::Value {
        serde_json::json!({
            TIMESTAMP_FIELD: self.timestamp,
            self.categorical_field.as_str(): self.entity,
            VALUE_FIELD: self.value,
        })
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry(TIMESTAMP_FIELD, &self.timestamp)?;
        map.serialize_entry(&self.categorical_field, &self.entity)?;
        map.serialize_entry(VALUE_FIELD, &self.value)?;
        map.end()
    }
}

/// Output of one synthesizer run. Never mutated after generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub records: Vec<Record>,
    /// Timestamps where every entity was dropped.
    pub missing_timestamps: BTreeSet<i64>,
    /// Individually dropped `(timestamp, entity)` pairs.
    pub missing_entities: BTreeSet<(i64, String)>,
    /// First timestamp after the generation start; `0` if never reached.
    pub test_start_time: i64,
    /// Virtual clock at the start of the run.
    pub begin_timestamp: i64,
    /// Virtual clock when the sample supply ran out.
    pub end_timestamp: i64,
    /// Entity cursor when the sample supply ran out.
    pub end_entity_index: usize,
    pub interval_millis: i64,
    pub number_of_entities: usize,
}

impl GenerationResult {
    /// Slots implied by the ledgers: a missing timestamp stands for every entity.
    pub fn implied_dropped(&self) -> usize {
        self.missing_timestamps.len() * self.number_of_entities + self.missing_entities.len()
    }

    /// Intervals the virtual clock fully moved past.
    pub fn complete_intervals(&self) -> usize {
        ((self.end_timestamp - self.begin_timestamp) / self.interval_millis) as usize
    }

    /// Emitted plus dropped slots.
    pub fn accounted_slots(&self) -> usize {
        self.records.len() + self.implied_dropped()
    }

    /// Slots visited by the clock, including a trailing partial interval.
    pub fn expected_slots(&self) -> usize {
        self.complete_intervals() * self.number_of_entities + self.end_entity_index
    }

    /// Records dated before the test window.
    pub fn train_records(&self) -> &[Record] {
        &self.records[..self.test_start_index()]
    }

    /// Records dated at or after the test start.
    pub fn test_records(&self) -> &[Record] {
        &self.records[self.test_start_index()..]
    }

    fn test_start_index(&self) -> usize {
        if self.test_start_time == 0 {
            return self.records.len();
        }
        self.records
            .partition_point(|r| r.timestamp < self.test_start_time)
    }

    /// Distinct record timestamps at or after the test start, in order.
    pub fn test_timestamps(&self) -> BTreeSet<i64> {
        self.test_records().iter().map(|r| r.timestamp).collect()
    }

    pub fn summary(&self) -> GenerationSummary {
        GenerationSummary {
            records: self.records.len(),
            train_records: self.train_records().len(),
            test_records: self.test_records().len(),
            missing_timestamps: self.missing_timestamps.len(),
            missing_entities: self.missing_entities.len(),
            test_start_time: self.test_start_time,
            first_timestamp: self.records.first().map(|r| r.timestamp),
            last_timestamp: self.records.last().map(|r| r.timestamp),
        }
    }
}

/// Counts printed by the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationSummary {
    pub records: usize,
    pub train_records: usize,
    pub test_records: usize,
    pub missing_timestamps: usize,
    pub missing_entities: usize,
    pub test_start_time: i64,
    pub first_timestamp: Option<i64>,
    pub last_timestamp: Option<i64>,
}
