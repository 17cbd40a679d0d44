//! Seven-day timelines built from recorded snapshots.
//!
//! Each day is the rounded mean of the raw indices recorded that day. Empty days
//! are filled in order: a live reading for today, the nearest earlier value in the
//! window, or the no-data sentinel.

use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use futures::future::try_join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::model::{AqiCategory, CityId, DailyEntry, DayCategory, GapFill, Snapshot};
use crate::ports::{HistoricalStore, LiveSource, PortError};

/// Number of days in a timeline, today included.
pub const TIMELINE_DAYS: u64 = 7;

/// Builds daily timelines from a history store, with a live source for today.
pub struct HistoricalAggregator {
    store: Arc<dyn HistoricalStore>,
    live: Arc<dyn LiveSource>,
}

impl HistoricalAggregator {
    /// Create an aggregator over the given collaborators.
    #[must_use]
    pub fn new(store: Arc<dyn HistoricalStore>, live: Arc<dyn LiveSource>) -> Self {
        Self { store, live }
    }

    /// Timeline for the seven UTC days ending today.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::StoreUnavailable`] if the store fails and
    /// [`PortError::Cancelled`] if `cancel` fires. Missing data is never an error.
    pub async fn daily_timeline(
        &self,
        city: &CityId,
        cancel: &CancellationToken,
    ) -> Result<Vec<DailyEntry>, PortError> {
        self.daily_timeline_ending(city, Utc::now().date_naive(), cancel)
            .await
    }

    /// Timeline for the seven days ending on `today`, ascending by date.
    ///
    /// # Errors
    ///
    /// See [`HistoricalAggregator::daily_timeline`].
    #[instrument(skip(self, cancel), fields(city = %city))]
    pub async fn daily_timeline_ending(
        &self,
        city: &CityId,
        today: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<Vec<DailyEntry>, PortError> {
        let dates = window_ending(today);

        let queries = dates.iter().map(|date| self.store.query_day(city, *date));
        let days = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PortError::Cancelled),
            days = try_join_all(queries) => days?,
        };

        let mut resolved: Vec<Option<(u32, GapFill)>> = days
            .iter()
            .map(|snapshots| mean_index(snapshots).map(|aqi| (aqi, GapFill::Recorded)))
            .collect();

        if let Some(last) = resolved.last_mut()
            && last.is_none()
        {
            match self.live.fetch(city, cancel).await {
                Ok(snapshot) => *last = Some((snapshot.overall_index, GapFill::Live)),
                Err(PortError::Cancelled) => return Err(PortError::Cancelled),
                Err(err) => warn!(error = %err, "live fill for today failed, carrying forward"),
            }
        }

        let mut carried = None;
        let entries = dates
            .into_iter()
            .zip(resolved)
            .map(|(date, value)| {
                let value = value.or_else(|| carried.map(|aqi| (aqi, GapFill::CarriedForward)));
                if let Some((aqi, _)) = value {
                    carried = Some(aqi);
                }
                daily_entry(date, value)
            })
            .collect::<Vec<_>>();

        debug!(
            filled = entries
                .iter()
                .filter(|entry| entry.fill != GapFill::Missing)
                .count(),
            "timeline built"
        );
        Ok(entries)
    }
}

/// Dates of the window ending on `today`, oldest first.
fn window_ending(today: NaiveDate) -> Vec<NaiveDate> {
    (0..TIMELINE_DAYS)
        .rev()
        .filter_map(|back| today.checked_sub_days(Days::new(back)))
        .collect()
}

/// Mean of the raw indices, rounded half up. `None` for an empty day.
fn mean_index(snapshots: &[Snapshot]) -> Option<u32> {
    let count = u64::try_from(snapshots.len()).ok().filter(|count| *count > 0)?;
    let sum: u64 = snapshots
        .iter()
        .map(|snapshot| u64::from(snapshot.overall_index))
        .sum();
    let rounded = (2 * sum + count) / (2 * count);
    Some(u32::try_from(rounded).unwrap_or(u32::MAX))
}

fn daily_entry(date: NaiveDate, value: Option<(u32, GapFill)>) -> DailyEntry {
    let (aqi, category, fill) = match value {
        Some((aqi, fill)) => (
            Some(aqi),
            DayCategory::Rated(AqiCategory::from_index(aqi)),
            fill,
        ),
        None => (None, DayCategory::NoData, GapFill::Missing),
    };

    DailyEntry {
        date,
        day_name: date.format("%A").to_string(),
        short_day_name: date.format("%a").to_string(),
        aqi,
        category,
        color: category.color().to_owned(),
        fill,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::model::NO_DATA_COLOR;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).expect("valid date")
    }

    fn days_ago(back: u64) -> NaiveDate {
        today()
            .checked_sub_days(Days::new(back))
            .expect("valid date")
    }

    fn snapshot(date: NaiveDate, hour: u32, index: u32) -> Snapshot {
        let timestamp = Utc
            .from_utc_datetime(&date.and_hms_opt(hour, 0, 0).expect("valid time"));
        Snapshot::new(CityId::new("Sarajevo"), timestamp, index, None)
    }

    #[derive(Default)]
    struct FakeStore {
        days: HashMap<NaiveDate, Vec<Snapshot>>,
        offline: bool,
    }

    impl FakeStore {
        fn with(mut self, date: NaiveDate, indices: &[u32]) -> Self {
            let snapshots = indices
                .iter()
                .zip(0_u32..)
                .map(|(index, hour)| snapshot(date, hour, *index))
                .collect();
            self.days.insert(date, snapshots);
            self
        }
    }

    #[async_trait]
    impl HistoricalStore for FakeStore {
        async fn query_day(
            &self,
            _city: &CityId,
            date: NaiveDate,
        ) -> Result<Vec<Snapshot>, PortError> {
            if self.offline {
                return Err(PortError::StoreUnavailable("connection refused".into()));
            }
            Ok(self.days.get(&date).cloned().unwrap_or_default())
        }
    }

    struct FakeLive {
        index: Option<u32>,
        calls: AtomicUsize,
    }

    impl FakeLive {
        fn new(index: Option<u32>) -> Arc<Self> {
            Arc::new(Self {
                index,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LiveSource for FakeLive {
        async fn fetch(
            &self,
            city: &CityId,
            cancel: &CancellationToken,
        ) -> Result<Snapshot, PortError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if cancel.is_cancelled() {
                return Err(PortError::Cancelled);
            }
            self.index
                .map(|index| Snapshot::new(city.clone(), Utc::now(), index, None))
                .ok_or(PortError::UpstreamTimeout)
        }
    }

    async fn timeline(store: FakeStore, live: Arc<FakeLive>) -> Result<Vec<DailyEntry>, PortError> {
        let aggregator = HistoricalAggregator::new(Arc::new(store), live);
        aggregator
            .daily_timeline_ending(&CityId::new("Sarajevo"), today(), &CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn empty_history_yields_seven_no_data_days() {
        let entries = timeline(FakeStore::default(), FakeLive::new(None))
            .await
            .expect("missing data is not an error");

        assert_eq!(entries.len(), 7);
        assert!(entries.windows(2).all(|pair| pair[0].date < pair[1].date));
        assert_eq!(entries.first().map(|entry| entry.date), Some(days_ago(6)));
        assert_eq!(entries.last().map(|entry| entry.date), Some(today()));
        assert!(entries.iter().all(|entry| entry.category == DayCategory::NoData
            && entry.aqi.is_none()
            && entry.color == NO_DATA_COLOR));
    }

    #[tokio::test]
    async fn empty_today_is_filled_from_live_source() {
        let live = FakeLive::new(Some(87));
        let entries = timeline(FakeStore::default(), Arc::clone(&live))
            .await
            .expect("timeline");

        let last = entries.last().expect("seven entries");
        assert_eq!(last.aqi, Some(87));
        assert_eq!(last.fill, GapFill::Live);
        assert_eq!(last.category, DayCategory::Rated(AqiCategory::Moderate));
        assert_eq!(live.calls.load(Ordering::SeqCst), 1);
        assert!(entries.iter().take(6).all(|entry| entry.fill == GapFill::Missing));
    }

    #[tokio::test]
    async fn gaps_carry_forward_nearest_earlier_value() {
        let store = FakeStore::default()
            .with(today(), &[120])
            .with(days_ago(3), &[40, 60]);
        let live = FakeLive::new(Some(999));
        let entries = timeline(store, Arc::clone(&live)).await.expect("timeline");

        let summary: Vec<(Option<u32>, GapFill)> =
            entries.iter().map(|entry| (entry.aqi, entry.fill)).collect();
        assert_eq!(
            summary,
            vec![
                (None, GapFill::Missing),
                (None, GapFill::Missing),
                (None, GapFill::Missing),
                (Some(50), GapFill::Recorded),
                (Some(50), GapFill::CarriedForward),
                (Some(50), GapFill::CarriedForward),
                (Some(120), GapFill::Recorded),
            ]
        );
        assert_eq!(live.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_live_fill_falls_back_to_carry_forward() {
        let store = FakeStore::default().with(days_ago(1), &[33]);
        let entries = timeline(store, FakeLive::new(None)).await.expect("timeline");

        let last = entries.last().expect("seven entries");
        assert_eq!(last.aqi, Some(33));
        assert_eq!(last.fill, GapFill::CarriedForward);
    }

    #[tokio::test]
    async fn daily_value_is_rounded_mean_of_raw_indices() {
        let store = FakeStore::default()
            .with(days_ago(2), &[45, 46])
            .with(days_ago(1), &[40, 41, 42, 60]);
        let entries = timeline(store, FakeLive::new(None)).await.expect("timeline");

        let by_date: HashMap<NaiveDate, Option<u32>> =
            entries.iter().map(|entry| (entry.date, entry.aqi)).collect();
        assert_eq!(by_date.get(&days_ago(2)), Some(&Some(46)));
        assert_eq!(by_date.get(&days_ago(1)), Some(&Some(46)));
    }

    #[tokio::test]
    async fn day_names_are_english() {
        let entries = timeline(FakeStore::default(), FakeLive::new(None))
            .await
            .expect("timeline");
        let last = entries.last().expect("seven entries");
        assert_eq!(last.day_name, "Sunday");
        assert_eq!(last.short_day_name, "Sun");
    }

    #[tokio::test]
    async fn unreachable_store_is_an_error() {
        let store = FakeStore {
            offline: true,
            ..FakeStore::default()
        };
        let err = timeline(store, FakeLive::new(Some(10)))
            .await
            .expect_err("store offline");
        assert!(matches!(err, PortError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn cancelled_request_is_reported() {
        let aggregator =
            HistoricalAggregator::new(Arc::new(FakeStore::default()), FakeLive::new(Some(10)));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = aggregator
            .daily_timeline_ending(&CityId::new("Sarajevo"), today(), &cancel)
            .await
            .expect_err("cancelled");
        assert!(matches!(err, PortError::Cancelled));
    }

    #[test]
    fn mean_rounds_half_up() {
        let day = today();
        assert_eq!(mean_index(&[]), None);
        assert_eq!(
            mean_index(&[snapshot(day, 0, 10), snapshot(day, 1, 11)]),
            Some(11)
        );
        assert_eq!(
            mean_index(&[snapshot(day, 0, 10), snapshot(day, 1, 10), snapshot(day, 2, 11)]),
            Some(10)
        );
    }
}
