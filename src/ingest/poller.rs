//! Completion Poller
//!
//! Waits until the latest visible document carries an id close enough to the
//! last position ingested. Sorting by timestamp descending and trusting the
//! id works because ids are sequence positions and generated data is time
//! ordered. Exhausting the cycle budget is a soft outcome: the caller decides
//! whether to proceed.

use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::search::SearchBackend;
use crate::synthetic::record::TIMESTAMP_FIELD;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub max_cycles: u32,
    pub cycle_delay: Duration,
    /// Accepted distance between the observed id and `expected - 1`.
    pub tolerance: u64,
    pub sort_field: String,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_cycles: 4,
            cycle_delay: Duration::from_secs(1),
            tolerance: 3,
            sort_field: TIMESTAMP_FIELD.to_string(),
        }
    }
}

impl PollConfig {
    /// Same budget, no waiting between cycles.
    pub fn immediate(max_cycles: u32) -> Self {
        Self {
            max_cycles,
            cycle_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// `observed_id` is `None` only when nothing was expected and no query ran.
    Ready { observed_id: Option<u64>, cycles: u32 },
    TimedOut { last_observed: Option<u64>, cycles: u32 },
}

impl PollOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    pub fn cycles(&self) -> u32 {
        match self {
            Self::Ready { cycles, .. } | Self::TimedOut { cycles, .. } => *cycles,
        }
    }

    pub fn last_observed(&self) -> Option<u64> {
        match self {
            Self::Ready { observed_id, .. } => *observed_id,
            Self::TimedOut { last_observed, .. } => *last_observed,
        }
    }

    /// Promote a timeout to an error for callers that cannot proceed without it.
    pub fn into_result(
        self,
        dataset: &str,
        expected: usize,
    ) -> Result<Option<u64>, IngestTimeout> {
        match self {
            Self::Ready { observed_id, .. } => Ok(observed_id),
            Self::TimedOut {
                last_observed,
                cycles,
            } => Err(IngestTimeout {
                dataset: dataset.to_string(),
                expected,
                last_observed,
                cycles,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestTimeout {
    pub dataset: String,
    pub expected: usize,
    pub last_observed: Option<u64>,
    pub cycles: u32,
}

impl fmt::Display for IngestTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.last_observed {
            Some(id) => write!(
                f,
                "'{}' not fully visible after {} cycles: expected {} documents, latest id {}",
                self.dataset, self.cycles, self.expected, id
            ),
            None => write!(
                f,
                "'{}' not visible after {} cycles: expected {} documents, nothing found",
                self.dataset, self.cycles, self.expected
            ),
        }
    }
}

impl std::error::Error for IngestTimeout {}

/// `observed` lies within `tolerance` of the last expected position.
#[inline]
pub fn id_within_tolerance(observed: u64, expected: usize, tolerance: u64) -> bool {
    let target = (expected as u64).saturating_sub(1);
    observed.abs_diff(target) <= tolerance
}

pub struct CompletionPoller<'a, B: SearchBackend + ?Sized> {
    backend: &'a B,
    config: PollConfig,
}

impl<'a, B: SearchBackend + ?Sized> CompletionPoller<'a, B> {
    pub fn new(backend: &'a B, config: PollConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Poll until `expected` documents look visible in `dataset`.
    ///
    /// Each cycle queries the latest document, then asks for a refresh when
    /// it is not close enough. Backend errors count as an unsatisfied cycle.
    pub async fn await_count(&self, dataset: &str, expected: usize) -> PollOutcome {
        if expected == 0 {
            debug!("nothing to wait for in {}", dataset);
            return PollOutcome::Ready {
                observed_id: None,
                cycles: 0,
            };
        }

        let mut last_observed = None;
        for cycle in 1..=self.config.max_cycles {
            match self
                .backend
                .query_latest(dataset, &self.config.sort_field, true, 1)
                .await
            {
                Ok(Some(hit)) => match hit.numeric_id() {
                    Some(id) => {
                        last_observed = Some(id);
                        if id_within_tolerance(id, expected, self.config.tolerance) {
                            info!(
                                "{} ready after {} cycles (latest id {}, expected {})",
                                dataset, cycle, id, expected
                            );
                            return PollOutcome::Ready {
                                observed_id: Some(id),
                                cycles: cycle,
                            };
                        }
                        debug!("{} latest id {}, expected {}", dataset, id, expected);
                    }
                    None => warn!("{} latest hit has non-numeric id {}", dataset, hit.id),
                },
                Ok(None) => debug!("{} has no visible documents yet", dataset),
                Err(e) => warn!("poll of {} failed: {}", dataset, e),
            }

            if let Err(e) = self.backend.refresh(dataset).await {
                warn!("refresh of {} failed: {}", dataset, e);
            }

            if cycle < self.config.max_cycles && !self.config.cycle_delay.is_zero() {
                tokio::time::sleep(self.config.cycle_delay).await;
            }
        }

        warn!(
            "{} not confirmed after {} cycles (expected {}, latest {:?})",
            dataset, self.config.max_cycles, expected, last_observed
        );
        PollOutcome::TimedOut {
            last_observed,
            cycles: self.config.max_cycles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{IndexedDocument, InMemoryBackend};
    use serde_json::json;

    async fn seeded(count: u64) -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        let docs: Vec<IndexedDocument> = (0..count)
            .map(|id| IndexedDocument {
                id,
                source: json!({ "timestamp": id as i64 * 60_000, "data": 1.0 }),
            })
            .collect();
        backend.bulk_write("uniform", &docs).await.unwrap();
        backend
    }

    #[test]
    fn test_tolerance_window() {
        assert!(id_within_tolerance(2499, 2500, 3));
        assert!(id_within_tolerance(2496, 2500, 3));
        assert!(!id_within_tolerance(2495, 2500, 3));
        assert!(id_within_tolerance(2502, 2500, 3));
        assert!(!id_within_tolerance(2503, 2500, 3));
        assert!(id_within_tolerance(0, 1, 0));
    }

    #[tokio::test]
    async fn test_ready_on_first_cycle() {
        let backend = seeded(2500).await;
        let poller = CompletionPoller::new(&backend, PollConfig::immediate(4));
        let outcome = poller.await_count("uniform", 2500).await;
        assert_eq!(
            outcome,
            PollOutcome::Ready {
                observed_id: Some(2499),
                cycles: 1
            }
        );
        assert_eq!(backend.refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_lagging_visibility_within_tolerance() {
        let backend = seeded(2500).await;
        backend.set_visible_id_limit(Some(2497));
        let poller = CompletionPoller::new(&backend, PollConfig::immediate(4));
        assert_eq!(poller.await_count("uniform", 2500).await.last_observed(), Some(2496));
    }

    #[tokio::test]
    async fn test_becomes_ready_after_refreshes() {
        let backend = seeded(100).await;
        backend.set_refreshes_until_visible(2);
        let poller = CompletionPoller::new(&backend, PollConfig::immediate(4));
        let outcome = poller.await_count("uniform", 100).await;
        assert_eq!(
            outcome,
            PollOutcome::Ready {
                observed_id: Some(99),
                cycles: 3
            }
        );
        assert_eq!(backend.refresh_count(), 2);
    }

    #[tokio::test]
    async fn test_never_ready_times_out_softly() {
        let backend = seeded(2500).await;
        backend.set_visible_id_limit(Some(1000));
        let poller = CompletionPoller::new(&backend, PollConfig::immediate(4));
        let outcome = poller.await_count("uniform", 2500).await;

        assert_eq!(
            outcome,
            PollOutcome::TimedOut {
                last_observed: Some(999),
                cycles: 4
            }
        );
        assert_eq!(backend.query_count(), 4);
        assert_eq!(backend.refresh_count(), 4);

        let err = outcome.into_result("uniform", 2500).unwrap_err();
        assert_eq!(err.last_observed, Some(999));
        assert!(err.to_string().contains("latest id 999"));
    }

    #[tokio::test]
    async fn test_missing_collection_times_out() {
        let backend = InMemoryBackend::new();
        let poller = CompletionPoller::new(&backend, PollConfig::immediate(2));
        let outcome = poller.await_count("absent", 10).await;
        assert_eq!(outcome.last_observed(), None);
        assert_eq!(outcome.cycles(), 2);
        assert!(!outcome.is_ready());
    }

    #[tokio::test]
    async fn test_nothing_expected_is_ready() {
        let backend = InMemoryBackend::new();
        let poller = CompletionPoller::new(&backend, PollConfig::immediate(4));
        let outcome = poller.await_count("absent", 0).await;
        assert_eq!(
            outcome,
            PollOutcome::Ready {
                observed_id: None,
                cycles: 0
            }
        );
        assert_eq!(outcome.last_observed(), None);
        assert_eq!(outcome.into_result("absent", 0), Ok(None));
        assert_eq!(backend.query_count(), 0);
    }
}
