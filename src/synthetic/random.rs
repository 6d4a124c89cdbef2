//! Random Value Source
//!
//! Uniform sample streams for the synthesizer. Seeded streams use ChaCha8 so the
//! same seed reproduces the same values on every platform and toolchain.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::synthesizer::GenerationError;

/// Seed used by `uniform_samples(.., seeded = true)`.
pub const FIXED_SEED: u64 = 0;

/// Default lower bound for synthetic values.
pub const DEFAULT_VALUE_MIN: f64 = 200.0;

/// Default upper bound (exclusive) for synthetic values.
pub const DEFAULT_VALUE_MAX: f64 = 300.0;

/// Where a generator gets its initial state from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSeed {
    /// Repeatable stream.
    Fixed(u64),
    /// Fresh OS entropy; differs across runs.
    Entropy,
}

impl SampleSeed {
    pub fn from_flag(seeded: bool) -> Self {
        if seeded {
            Self::Fixed(FIXED_SEED)
        } else {
            Self::Entropy
        }
    }
}

impl From<Option<u64>> for SampleSeed {
    fn from(seed: Option<u64>) -> Self {
        seed.map_or(Self::Entropy, Self::Fixed)
    }
}

/// Build a generator for the given seed.
pub fn seeded_rng(seed: SampleSeed) -> ChaCha8Rng {
    match seed {
        SampleSeed::Fixed(s) => ChaCha8Rng::seed_from_u64(s),
        SampleSeed::Entropy => ChaCha8Rng::from_entropy(),
    }
}

/// Generator handed to the missing-data policy.
///
/// Kept separate from the value stream so that changing the drop seed never
/// perturbs the emitted values.
pub fn drop_rng(seed: SampleSeed) -> ChaCha8Rng {
    seeded_rng(seed)
}

/// `count` values uniformly distributed in `[min, max)`.
pub fn uniform_samples(
    count: usize,
    min: f64,
    max: f64,
    seeded: bool,
) -> Result<Vec<f64>, GenerationError> {
    uniform_samples_with(count, min, max, SampleSeed::from_flag(seeded))
}

/// Same as [`uniform_samples`] with an explicit seed.
pub fn uniform_samples_with(
    count: usize,
    min: f64,
    max: f64,
    seed: SampleSeed,
) -> Result<Vec<f64>, GenerationError> {
    if !min.is_finite() || !max.is_finite() || min >= max {
        return Err(GenerationError::InvalidRange { min, max });
    }

    let mut rng = seeded_rng(seed);
    let span = max - min;
    Ok((0..count)
        .map(|_| {
            let unit: f64 = rng.gen();
            min + span * unit
        })
        .collect())
}
