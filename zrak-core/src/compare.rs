//! Concurrent side-by-side comparison of several cities.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::model::{CityId, Snapshot};
use crate::ports::{FailureReason, LiveSource};

/// Result cell of one distinct city; `None` until its fetch settles.
type Slot = Option<Result<Snapshot, FailureReason>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Result for one requested city.
///
/// Duplicate cities share one fetch, so `Snapshot::city` carries the spelling of
/// the first occurrence while `city` keeps the spelling at this position.
pub struct ComparisonOutcome {
    /// City as the caller spelled it.
    pub city: CityId,
    /// Reading, or why there is none.
    pub result: Result<Snapshot, FailureReason>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Summary over a set of outcomes.
pub struct ComparisonReport {
    /// Successful reading with the lowest index.
    pub cleanest: Option<Snapshot>,
    /// Successful reading with the highest index.
    pub most_polluted: Option<Snapshot>,
    /// Number of outcomes carrying a failure.
    pub failed: usize,
}

impl ComparisonReport {
    /// Summarise outcomes; ties keep the earlier city.
    #[must_use]
    pub fn from_outcomes(outcomes: &[ComparisonOutcome]) -> Self {
        let readings = outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().ok());

        let mut cleanest: Option<&Snapshot> = None;
        let mut most_polluted: Option<&Snapshot> = None;
        for reading in readings {
            if cleanest.is_none_or(|best| reading.overall_index < best.overall_index) {
                cleanest = Some(reading);
            }
            if most_polluted.is_none_or(|worst| reading.overall_index > worst.overall_index) {
                most_polluted = Some(reading);
            }
        }

        Self {
            cleanest: cleanest.cloned(),
            most_polluted: most_polluted.cloned(),
            failed: outcomes
                .iter()
                .filter(|outcome| outcome.result.is_err())
                .count(),
        }
    }
}

/// Fans a request out over several cities and merges the results in input order.
pub struct ComparisonOrchestrator {
    live: Arc<dyn LiveSource>,
    limiter: Arc<Semaphore>,
}

impl ComparisonOrchestrator {
    /// Create an orchestrator allowing at most `max_concurrency` fetches in flight.
    #[must_use]
    pub fn new(live: Arc<dyn LiveSource>, max_concurrency: usize) -> Self {
        Self {
            live,
            limiter: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// One outcome per input city, in input order.
    ///
    /// Cities equal after normalization are fetched once. When `cancel` fires, the
    /// call returns at once: finished cities keep their results and the rest are
    /// reported as [`FailureReason::Cancelled`].
    #[instrument(skip_all, fields(requested = cities.len()))]
    pub async fn compare(
        &self,
        cities: &[CityId],
        cancel: &CancellationToken,
    ) -> Vec<ComparisonOutcome> {
        let mut slot_of: HashMap<String, usize> = HashMap::new();
        let mut distinct: Vec<CityId> = Vec::new();
        let positions: Vec<usize> = cities
            .iter()
            .map(|city| {
                *slot_of.entry(city.normalized()).or_insert_with(|| {
                    distinct.push(city.clone());
                    distinct.len() - 1
                })
            })
            .collect();

        let mut results: Vec<Slot> = vec![None; distinct.len()];

        if cancel.is_cancelled() {
            debug!("comparison cancelled before dispatch");
        } else {
            self.fan_out(&distinct, &mut results, cancel).await;
        }

        positions
            .into_iter()
            .zip(cities)
            .map(|(slot, city)| ComparisonOutcome {
                city: city.clone(),
                result: results
                    .get(slot)
                    .cloned()
                    .flatten()
                    .unwrap_or(Err(FailureReason::Cancelled)),
            })
            .collect()
    }

    async fn fan_out(
        &self,
        distinct: &[CityId],
        results: &mut [Slot],
        cancel: &CancellationToken,
    ) {
        let mut tasks = JoinSet::new();
        let mut slot_of_task = HashMap::with_capacity(distinct.len());

        for (slot, city) in distinct.iter().enumerate() {
            let live = Arc::clone(&self.live);
            let limiter = Arc::clone(&self.limiter);
            let city = city.clone();
            let cancel = cancel.child_token();

            let handle = tasks.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(FailureReason::Cancelled),
                    permit = limiter.acquire_owned() => permit,
                };
                let _permit =
                    permit.map_err(|closed| FailureReason::Internal(closed.to_string()))?;
                live.fetch(&city, &cancel).await.map_err(FailureReason::from)
            });
            slot_of_task.insert(handle.id(), slot);
        }

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    // Fetches that already finished keep their results.
                    while let Some(joined) = tasks.try_join_next_with_id() {
                        settle(&slot_of_task, results, joined);
                    }
                    debug!(outstanding = tasks.len(), "comparison cancelled, abandoning fetches");
                    tasks.abort_all();
                    break;
                }
                joined = tasks.join_next_with_id() => {
                    let Some(joined) = joined else {
                        break;
                    };
                    settle(&slot_of_task, results, joined);
                }
            }
        }
    }
}

/// Store a joined task's result in its slot; a panicked or aborted task becomes `Internal`.
fn settle(
    slot_of_task: &HashMap<Id, usize>,
    results: &mut [Slot],
    joined: Result<(Id, Result<Snapshot, FailureReason>), JoinError>,
) {
    let (id, result) = match joined {
        Ok((id, result)) => (id, result),
        Err(err) => {
            warn!(error = %err, "comparison fetch task failed");
            (err.id(), Err(FailureReason::Internal(err.to_string())))
        }
    };
    if let Some(cell) = slot_of_task
        .get(&id)
        .and_then(|slot| results.get_mut(*slot))
    {
        *cell = Some(result);
    }
}
