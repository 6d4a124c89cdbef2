//! Missing-Data Policy
//!
//! Decides whether a `(timestamp, entity)` slot of the test window is dropped.
//! The training window is never thinned: nothing is dropped until the test start
//! time has been latched.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A uniform draw strictly above this value drops the slot (~50%).
pub const DROP_THRESHOLD: f64 = 0.5;

/// How gaps are injected into the test window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissingMode {
    /// Whole intervals disappear (all entities at one timestamp).
    MissingTimestamp,
    /// Single entities disappear independently.
    MissingEntity,
    /// Nothing is dropped.
    NoMissingData,
    /// A contiguous window of intervals disappears.
    ContinuousImpute,
}

impl MissingMode {
    pub const ALL: [MissingMode; 4] = [
        MissingMode::MissingTimestamp,
        MissingMode::MissingEntity,
        MissingMode::NoMissingData,
        MissingMode::ContinuousImpute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingTimestamp => "MISSING_TIMESTAMP",
            Self::MissingEntity => "MISSING_ENTITY",
            Self::NoMissingData => "NO_MISSING_DATA",
            Self::ContinuousImpute => "CONTINUOUS_IMPUTE",
        }
    }

    /// Whether drops in this mode remove whole intervals.
    pub fn drops_whole_interval(&self) -> bool {
        matches!(self, Self::MissingTimestamp | Self::ContinuousImpute)
    }
}

impl fmt::Display for MissingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MissingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_").to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown missing mode '{}' (expected one of: {})",
                    s,
                    Self::ALL.map(|m| m.as_str()).join(", ")
                )
            })
    }
}

/// Slot being considered for dropping.
#[derive(Debug, Clone, Copy)]
pub struct DropContext {
    pub entity_index: usize,
    /// `0` until the test window has started.
    pub test_start_time: i64,
    pub current_timestamp: i64,
    pub interval_millis: i64,
}

impl DropContext {
    /// Intervals elapsed since the test start.
    pub fn intervals_since_test_start(&self) -> i64 {
        (self.current_timestamp - self.test_start_time) / self.interval_millis.max(1)
    }
}

/// Resolved policy for one generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingPolicy {
    Keep,
    DropTimestamp,
    DropEntity,
    /// Inclusive range of interval indices (relative to the test start).
    ContinuousImpute { start: u64, end: u64 },
}

impl MissingPolicy {
    pub fn new(mode: MissingMode, impute_start: u64, impute_end: u64) -> Self {
        match mode {
            MissingMode::NoMissingData => Self::Keep,
            MissingMode::MissingTimestamp => Self::DropTimestamp,
            MissingMode::MissingEntity => Self::DropEntity,
            MissingMode::ContinuousImpute => Self::ContinuousImpute {
                start: impute_start,
                end: impute_end,
            },
        }
    }

    pub fn mode(&self) -> MissingMode {
        match self {
            Self::Keep => MissingMode::NoMissingData,
            Self::DropTimestamp => MissingMode::MissingTimestamp,
            Self::DropEntity => MissingMode::MissingEntity,
            Self::ContinuousImpute { .. } => MissingMode::ContinuousImpute,
        }
    }

    pub fn should_drop<R: Rng + ?Sized>(&self, ctx: &DropContext, rng: &mut R) -> bool {
        if ctx.test_start_time == 0 {
            return false;
        }
        match *self {
            Self::Keep => false,
            Self::DropTimestamp => drop_timestamp(ctx, rng),
            Self::DropEntity => drop_entity(rng),
            Self::ContinuousImpute { start, end } => drop_in_window(ctx, start, end),
        }
    }
}

// Evaluated once per interval, on its first entity.
fn drop_timestamp<R: Rng + ?Sized>(ctx: &DropContext, rng: &mut R) -> bool {
    ctx.entity_index == 0 && rng.gen::<f64>() > DROP_THRESHOLD
}

fn drop_entity<R: Rng + ?Sized>(rng: &mut R) -> bool {
    rng.gen::<f64>() > DROP_THRESHOLD
}

fn drop_in_window(ctx: &DropContext, start: u64, end: u64) -> bool {
    if ctx.entity_index != 0 {
        return false;
    }
    let delta = ctx.intervals_since_test_start();
    delta >= 0 && (start..=end).contains(&(delta as u64))
}

/// Flat form of [`MissingPolicy::should_drop`].
#[allow(clippy::too_many_arguments)]
pub fn should_drop<R: Rng + ?Sized>(
    mode: MissingMode,
    entity_index: usize,
    test_start_time: i64,
    current_timestamp: i64,
    interval_millis: i64,
    impute_start: u64,
    impute_end: u64,
    rng: &mut R,
) -> bool {
    let ctx = DropContext {
        entity_index,
        test_start_time,
        current_timestamp,
        interval_millis,
    };
    MissingPolicy::new(mode, impute_start, impute_end).should_drop(&ctx, rng)
}
