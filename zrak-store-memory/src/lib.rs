//! In-memory snapshot history keyed by normalized city.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use zrak_core::{
    model::{CityId, Snapshot},
    ports::{HistoricalStore, PortError, SnapshotRecorder},
};

/// Process-local history; contents are lost on restart.
#[derive(Default)]
pub struct MemoryHistoryStore {
    snapshots: RwLock<HashMap<String, Vec<Snapshot>>>,
}

impl MemoryHistoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every snapshot taken before `cutoff`. Returns how many were removed.
    pub async fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut snapshots = self.snapshots.write().await;
        let mut removed = 0;
        for series in snapshots.values_mut() {
            let before = series.len();
            series.retain(|snapshot| snapshot.timestamp >= cutoff);
            removed += before - series.len();
        }
        snapshots.retain(|_, series| !series.is_empty());
        debug!(removed, %cutoff, "pruned history");
        removed
    }

    /// Number of stored snapshots across all cities.
    pub async fn len(&self) -> usize {
        self.snapshots.read().await.values().map(Vec::len).sum()
    }

    /// Whether nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl HistoricalStore for MemoryHistoryStore {
    async fn query_day(&self, city: &CityId, date: NaiveDate) -> Result<Vec<Snapshot>, PortError> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots
            .get(&city.normalized())
            .map(|series| {
                series
                    .iter()
                    .filter(|snapshot| snapshot.timestamp.date_naive() == date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl SnapshotRecorder for MemoryHistoryStore {
    async fn record(&self, snapshot: &Snapshot) -> Result<(), PortError> {
        let mut snapshots = self.snapshots.write().await;
        let series = snapshots.entry(snapshot.city.normalized()).or_default();
        // Identical timestamps are the same upstream measurement seen twice.
        if series
            .iter()
            .any(|existing| existing.timestamp == snapshot.timestamp)
        {
            return Ok(());
        }
        series.push(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn at(day: u32, hour: u32, index: u32, city: &str) -> Snapshot {
        let timestamp = Utc
            .with_ymd_and_hms(2024, 3, day, hour, 0, 0)
            .single()
            .expect("valid timestamp");
        Snapshot::new(CityId::new(city), timestamp, index, None)
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).expect("valid date")
    }

    #[tokio::test]
    async fn query_day_filters_by_city_and_utc_date() {
        let store = MemoryHistoryStore::new();
        store.record(&at(9, 23, 50, "Sarajevo")).await.expect("record");
        store.record(&at(10, 0, 60, "sarajevo")).await.expect("record");
        store.record(&at(10, 12, 70, "Sarajevo")).await.expect("record");
        store.record(&at(10, 12, 10, "Tuzla")).await.expect("record");

        let day = store
            .query_day(&CityId::new("SARAJEVO"), date(10))
            .await
            .expect("query");
        let indices: Vec<u32> = day.iter().map(|snapshot| snapshot.overall_index).collect();
        assert_eq!(indices, vec![60, 70]);

        let empty = store
            .query_day(&CityId::new("Mostar"), date(10))
            .await
            .expect("query");
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn repeated_measurement_is_stored_once() {
        let store = MemoryHistoryStore::new();
        let snapshot = at(10, 8, 42, "Zenica");
        store.record(&snapshot).await.expect("record");
        store.record(&snapshot).await.expect("record");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn prune_drops_old_snapshots() {
        let store = MemoryHistoryStore::new();
        store.record(&at(1, 0, 10, "Zenica")).await.expect("record");
        store.record(&at(9, 0, 20, "Zenica")).await.expect("record");

        let cutoff = at(9, 0, 0, "Zenica").timestamp - Duration::hours(1);
        assert_eq!(store.prune_before(cutoff).await, 1);
        assert_eq!(store.len().await, 1);
        assert!(!store.is_empty().await);
    }
}
