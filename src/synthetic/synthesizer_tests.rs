//! Synthesizer property tests.
//!
//! "Now" is pinned so slot layouts are exact: with `split / entities = k` the
//! clock starts `k` intervals back and the interval at "now" is still training,
//! so training holds `(k + 1) * entities` records.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;

use super::missing::MissingMode;
use super::random::{uniform_samples, SampleSeed};
use super::record::entity_label;
use super::synthesizer::{synthesize, GenerationError, SampleSupply, SynthesisParams, Synthesizer};
use super::GenerationResult;

const NOW: i64 = 1_717_000_000_000;
const MINUTE: i64 = 60_000;

fn params(split: usize, entities: usize, mode: MissingMode) -> SynthesisParams {
    SynthesisParams::new(1, split, entities, "componentName", mode)
}

fn run(params: &SynthesisParams, count: usize, drop_seed: u64) -> GenerationResult {
    let samples = uniform_samples(count, 200.0, 300.0, true).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(drop_seed);
    synthesize(params, &samples, NOW, &mut rng).unwrap()
}

fn dropped_interval_indices(result: &GenerationResult) -> BTreeSet<u64> {
    result
        .missing_timestamps
        .iter()
        .map(|ts| ((ts - result.test_start_time) / result.interval_millis) as u64)
        .collect()
}

// =============================================================================
// SLOT ACCOUNTING
// =============================================================================

#[test]
fn test_slot_accounting_holds_for_every_mode() {
    let shapes = [(200, 2, 210), (40, 4, 400), (30, 3, 97), (9, 1, 50), (100, 5, 1_003)];
    for mode in MissingMode::ALL {
        for (split, entities, count) in shapes {
            for seed in 0..4 {
                let p = params(split, entities, mode).with_impute_window(2, 6);
                let result = run(&p, count, seed);
                assert_eq!(
                    result.accounted_slots(),
                    result.expected_slots(),
                    "mode {} split {} entities {} count {} seed {}",
                    mode,
                    split,
                    entities,
                    count,
                    seed
                );
            }
        }
    }
}

#[test]
fn test_records_and_drops_consume_every_sample() {
    for mode in [MissingMode::MissingEntity, MissingMode::NoMissingData] {
        let result = run(&params(40, 4, mode), 400, 9);
        assert_eq!(result.records.len() + result.missing_entities.len(), 400);
    }
    for mode in [MissingMode::MissingTimestamp, MissingMode::ContinuousImpute] {
        let p = params(40, 4, mode).with_impute_window(0, 3);
        let result = run(&p, 400, 9);
        assert_eq!(result.records.len() + result.missing_timestamps.len(), 400);
    }
}

#[test]
fn test_entities_are_round_robin() {
    let result = run(&params(30, 3, MissingMode::MissingTimestamp), 300, 1);
    let train = result.train_records();
    for (i, record) in train.iter().enumerate() {
        assert_eq!(record.entity, entity_label(i % 3));
        assert_eq!(record.timestamp, result.begin_timestamp + (i / 3) as i64 * MINUTE);
    }
    // Whole-interval drops keep every surviving interval complete and ordered.
    for chunk in result.test_records().chunks_exact(3) {
        let labels: Vec<&str> = chunk.iter().map(|r| r.entity.as_str()).collect();
        assert_eq!(labels, ["entity0", "entity1", "entity2"]);
        assert!(chunk.iter().all(|r| r.timestamp == chunk[0].timestamp));
    }
}

#[test]
fn test_records_are_time_ordered() {
    for mode in MissingMode::ALL {
        let result = run(&params(50, 5, mode).with_impute_window(1, 2), 600, 4);
        assert!(result
            .records
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
    }
}

// =============================================================================
// MODES
// =============================================================================

#[test]
fn test_no_missing_data_has_empty_ledgers() {
    for (split, entities, count) in [(200, 2, 210), (12, 4, 333), (0, 1, 5)] {
        let result = run(&params(split, entities, MissingMode::NoMissingData), count, 0);
        assert!(result.missing_timestamps.is_empty());
        assert!(result.missing_entities.is_empty());
        assert_eq!(result.records.len(), count);
    }
}

#[test]
fn test_missing_timestamp_drops_whole_intervals() {
    let result = run(&params(40, 4, MissingMode::MissingTimestamp), 600, 21);
    assert!(!result.missing_timestamps.is_empty());
    assert!(result.missing_entities.is_empty());
    let emitted: BTreeSet<i64> = result.records.iter().map(|r| r.timestamp).collect();
    assert!(result.missing_timestamps.is_disjoint(&emitted));
    assert!(result
        .missing_timestamps
        .iter()
        .all(|ts| *ts > result.test_start_time));
}

#[test]
fn test_missing_entity_drops_single_slots() {
    let result = run(&params(40, 4, MissingMode::MissingEntity), 600, 21);
    assert!(result.missing_timestamps.is_empty());
    assert!(!result.missing_entities.is_empty());
    for record in &result.records {
        assert!(!result
            .missing_entities
            .contains(&(record.timestamp, record.entity.clone())));
    }
}

#[test]
fn test_missing_entity_count_matches_seeded_draws() {
    // split 200 over 4 entities: 51 training intervals (204 records), then a
    // 4-record cold start; every later sample is one policy draw.
    let p = params(200, 4, MissingMode::MissingEntity);
    let result = run(&p, 400, 1234);

    let mut replay = ChaCha8Rng::seed_from_u64(1234);
    let expected = (0..400 - 204 - 4)
        .filter(|_| replay.gen::<f64>() > 0.5)
        .count();

    assert_eq!(result.missing_entities.len(), expected);
    assert_eq!(result.records.len(), 400 - expected);
    assert_eq!(result.train_records().len(), 204);
    assert_eq!(result, run(&p, 400, 1234));
}

#[test]
fn test_missing_entity_baseline_for_seed_42() {
    let p = params(200, 4, MissingMode::MissingEntity);
    let result = run(&p, 400, 42);
    assert_eq!(result.missing_entities.len(), 94);
    assert_eq!(result.records.len(), 306);
    assert_eq!(result.train_records().len(), 204);
}

#[test]
fn test_continuous_impute_drops_exact_window() {
    // 3 entities, split 30: 33 training records, 3 cold-start records.
    let p = params(30, 3, MissingMode::ContinuousImpute).with_impute_window(5, 9);
    let result = run(&p, 200, 0);
    assert_eq!(
        dropped_interval_indices(&result),
        (5..=9).collect::<BTreeSet<u64>>()
    );
    assert!(result.missing_entities.is_empty());

    let emitted_indices: BTreeSet<u64> = result
        .test_records()
        .iter()
        .map(|r| ((r.timestamp - result.test_start_time) / MINUTE) as u64)
        .collect();
    assert!(emitted_indices.iter().all(|k| !(5..=9).contains(k)));
    assert!((0..5).all(|k| emitted_indices.contains(&k)));
    assert!(emitted_indices.contains(&10));
}

#[test]
fn test_continuous_impute_window_clipped_by_supply() {
    // 33 training + 3 cold start + 4 full intervals (12) + 2 dropped slots = 50.
    let p = params(30, 3, MissingMode::ContinuousImpute).with_impute_window(5, 9);
    let result = run(&p, 50, 0);
    assert_eq!(
        dropped_interval_indices(&result),
        [5u64, 6].into_iter().collect::<BTreeSet<u64>>()
    );
    assert_eq!(result.end_timestamp, result.test_start_time + 7 * MINUTE);
    assert_eq!(result.end_entity_index, 0);
}

#[test]
fn test_continuous_impute_is_deterministic_without_seed() {
    let p = params(30, 3, MissingMode::ContinuousImpute).with_impute_window(1, 3);
    let a = run(&p, 120, 1);
    let b = run(&p, 120, 2);
    assert_eq!(a, b);
}

// =============================================================================
// COLD START & TEST WINDOW
// =============================================================================

#[test]
fn test_cold_start_interval_is_never_dropped() {
    for mode in MissingMode::ALL {
        for seed in 0..8 {
            let p = params(20, 4, mode).with_impute_window(0, 50);
            let result = run(&p, 200, seed);
            let cold: Vec<_> = result
                .records
                .iter()
                .filter(|r| r.timestamp == result.test_start_time)
                .collect();
            assert_eq!(cold.len(), 4, "mode {} seed {}", mode, seed);
            assert!(!result.missing_timestamps.contains(&result.test_start_time));
            assert!(result
                .missing_entities
                .iter()
                .all(|(ts, _)| *ts != result.test_start_time));
        }
    }
}

#[test]
fn test_no_missing_data_scenario_210() {
    let result = run(&params(200, 2, MissingMode::NoMissingData), 210, 0);
    assert_eq!(result.records.len(), 210);
    assert!(result.missing_timestamps.is_empty());
    assert!(result.missing_entities.is_empty());

    let first_after_now = result
        .records
        .iter()
        .map(|r| r.timestamp)
        .find(|ts| *ts > NOW)
        .unwrap();
    assert_eq!(result.test_start_time, first_after_now);
    assert_eq!(result.test_start_time, NOW + MINUTE);
    assert_eq!(result.begin_timestamp, NOW - 100 * MINUTE);
    assert_eq!(result.train_records().len(), 202);
    assert_eq!(result.test_records().len(), 8);
}

#[test]
fn test_supply_ending_in_training_never_starts_test_window() {
    let result = run(&params(200, 2, MissingMode::MissingEntity), 150, 0);
    assert_eq!(result.test_start_time, 0);
    assert_eq!(result.records.len(), 150);
    assert!(result.test_records().is_empty());
}

#[test]
fn test_truncated_cold_start() {
    // split 4 over 2 entities: 6 training records, then one cold-start record.
    let result = run(&params(4, 2, MissingMode::MissingTimestamp), 7, 0);
    assert_eq!(result.test_start_time, NOW + MINUTE);
    assert_eq!(result.records.len(), 7);
    assert_eq!(result.end_entity_index, 1);
    assert_eq!(result.end_timestamp, result.test_start_time);
    assert_eq!(result.accounted_slots(), result.expected_slots());
}

// =============================================================================
// DETERMINISM & FACADE
// =============================================================================

#[test]
fn test_identical_inputs_are_bit_identical() {
    for mode in MissingMode::ALL {
        let p = params(60, 3, mode).with_impute_window(2, 4);
        let a = run(&p, 500, 77);
        let b = run(&p, 500, 77);
        assert_eq!(a, b);
        let bits_a: Vec<u64> = a.records.iter().map(|r| r.value.to_bits()).collect();
        let bits_b: Vec<u64> = b.records.iter().map(|r| r.value.to_bits()).collect();
        assert_eq!(bits_a, bits_b);
    }
}

#[test]
fn test_facade_matches_direct_call() {
    let p = params(40, 4, MissingMode::MissingEntity);
    let synth = Synthesizer::new(p.clone()).with_drop_seed(SampleSeed::Fixed(5));
    let via_facade = synth
        .run_at(SampleSupply::Uniform { count: 300, seeded: true }, NOW)
        .unwrap();
    assert_eq!(via_facade, run(&p, 300, 5));

    let explicit = synth
        .run_at(SampleSupply::Explicit(vec![1.0, 2.0, 3.0]), NOW)
        .unwrap();
    let values: Vec<f64> = explicit.records.iter().map(|r| r.value).collect();
    assert_eq!(values, vec![1.0, 2.0, 3.0]);
}

#[test]
fn test_wall_clock_run_starts_test_window_after_now() {
    let before = chrono::Utc::now().timestamp_millis();
    let result = Synthesizer::new(params(20, 2, MissingMode::NoMissingData))
        .synthesize_uniform(40, true)
        .unwrap();
    assert!(result.test_start_time > before);
    assert_eq!(result.records.len(), 40);
}

// =============================================================================
// VALIDATION
// =============================================================================

#[test]
fn test_invalid_parameters_fail_fast() {
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let samples = [1.0, 2.0];

    let no_entities = params(10, 0, MissingMode::NoMissingData);
    assert_eq!(
        synthesize(&no_entities, &samples, NOW, &mut rng),
        Err(GenerationError::NoEntities)
    );

    let ok = params(10, 2, MissingMode::NoMissingData);
    assert_eq!(
        synthesize(&ok, &[], NOW, &mut rng),
        Err(GenerationError::EmptySamples)
    );

    let mut zero_interval = ok.clone();
    zero_interval.interval_minutes = 0;
    assert_eq!(
        synthesize(&zero_interval, &samples, NOW, &mut rng),
        Err(GenerationError::ZeroInterval)
    );

    let reversed = params(10, 2, MissingMode::ContinuousImpute).with_impute_window(5, 2);
    assert_eq!(
        synthesize(&reversed, &samples, NOW, &mut rng),
        Err(GenerationError::InvalidImputeWindow { start: 5, end: 2 })
    );

    let reserved = SynthesisParams::new(1, 10, 2, "timestamp", MissingMode::NoMissingData);
    assert!(matches!(
        synthesize(&reserved, &samples, NOW, &mut rng),
        Err(GenerationError::ReservedField(_))
    ));

    let blank = SynthesisParams::new(1, 10, 2, "  ", MissingMode::NoMissingData);
    assert_eq!(
        synthesize(&blank, &samples, NOW, &mut rng),
        Err(GenerationError::EmptyCategoricalField)
    );
}

#[test]
fn test_out_of_range_clock_rejected_before_emitting() {
    let mut rng = ChaCha8Rng::seed_from_u64(0);

    // interval * split overflows the back-dating offset.
    let huge = SynthesisParams::new(u32::MAX, 100_000, 1, "host", MissingMode::NoMissingData);
    assert_eq!(huge.validate(), Err(GenerationError::TimestampOverflow));
    assert_eq!(
        synthesize(&huge, &[1.0], NOW, &mut rng),
        Err(GenerationError::TimestampOverflow)
    );

    // The offset fits but "now" minus the offset does not.
    let back_dated = params(10, 1, MissingMode::NoMissingData);
    assert!(back_dated.validate().is_ok());
    assert_eq!(
        synthesize(&back_dated, &[1.0], i64::MIN + MINUTE, &mut rng),
        Err(GenerationError::TimestampOverflow)
    );

    // The clock would run past the end of the range.
    let forward = params(0, 1, MissingMode::NoMissingData);
    assert_eq!(
        synthesize(&forward, &[1.0; 8], i64::MAX - 3 * MINUTE, &mut rng),
        Err(GenerationError::TimestampOverflow)
    );
    assert!(synthesize(&forward, &[1.0; 3], i64::MAX - 3 * MINUTE, &mut rng).is_ok());
}

#[test]
fn test_reversed_window_ignored_outside_continuous_mode() {
    let p = params(10, 2, MissingMode::MissingEntity).with_impute_window(5, 2);
    assert!(p.validate().is_ok());
}
