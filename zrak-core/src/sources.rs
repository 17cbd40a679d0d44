//! Decorators layering caching and history recording over the source ports.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::{CacheKey, ExpiringCache, TtlPolicy};
use crate::model::{CityId, ForecastDay, Snapshot};
use crate::ports::{ForecastSource, LiveSource, PortError, SnapshotRecorder};

/// Live source answering from an [`ExpiringCache`] within the live TTL.
pub struct CachedLiveSource {
    inner: Arc<dyn LiveSource>,
    cache: Arc<ExpiringCache<Snapshot>>,
    policy: TtlPolicy,
}

impl CachedLiveSource {
    /// Wrap `inner`, storing readings in `cache` for the policy's live TTL.
    #[must_use]
    pub fn new(
        inner: Arc<dyn LiveSource>,
        cache: Arc<ExpiringCache<Snapshot>>,
        policy: TtlPolicy,
    ) -> Self {
        Self {
            inner,
            cache,
            policy,
        }
    }

    /// Drop the cached reading for a city so the next fetch goes upstream.
    pub fn invalidate(&self, city: &CityId) -> bool {
        self.cache.invalidate(&CacheKey::live(city))
    }

    /// Cached reading for a city, if still fresh.
    #[must_use]
    pub fn peek(&self, city: &CityId) -> Option<Snapshot> {
        self.cache.peek(&CacheKey::live(city))
    }

    /// Underlying cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<ExpiringCache<Snapshot>> {
        &self.cache
    }
}

#[async_trait]
impl LiveSource for CachedLiveSource {
    async fn fetch(&self, city: &CityId, cancel: &CancellationToken) -> Result<Snapshot, PortError> {
        let key = CacheKey::live(city);
        let produced = self
            .cache
            .get_or_create(&key, &self.policy, || self.inner.fetch(city, cancel));

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(PortError::Cancelled),
            result = produced => result,
        }
    }
}

/// Forecast source answering from an [`ExpiringCache`] within the forecast TTL.
pub struct CachedForecastSource {
    inner: Arc<dyn ForecastSource>,
    cache: Arc<ExpiringCache<Vec<ForecastDay>>>,
    policy: TtlPolicy,
}

impl CachedForecastSource {
    /// Wrap `inner`, storing forecasts in `cache` for the policy's forecast TTL.
    #[must_use]
    pub fn new(
        inner: Arc<dyn ForecastSource>,
        cache: Arc<ExpiringCache<Vec<ForecastDay>>>,
        policy: TtlPolicy,
    ) -> Self {
        Self {
            inner,
            cache,
            policy,
        }
    }

    /// Underlying cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<ExpiringCache<Vec<ForecastDay>>> {
        &self.cache
    }
}

#[async_trait]
impl ForecastSource for CachedForecastSource {
    async fn forecast(
        &self,
        city: &CityId,
        cancel: &CancellationToken,
    ) -> Result<Vec<ForecastDay>, PortError> {
        let key = CacheKey::forecast(city);
        let produced = self
            .cache
            .get_or_create(&key, &self.policy, || self.inner.forecast(city, cancel));

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(PortError::Cancelled),
            result = produced => result,
        }
    }
}

/// Live source that writes every reading it fetches into history.
pub struct RecordingSource {
    inner: Arc<dyn LiveSource>,
    recorder: Arc<dyn SnapshotRecorder>,
}

impl RecordingSource {
    /// Wrap `inner`, recording into `recorder`.
    #[must_use]
    pub fn new(inner: Arc<dyn LiveSource>, recorder: Arc<dyn SnapshotRecorder>) -> Self {
        Self { inner, recorder }
    }
}

#[async_trait]
impl LiveSource for RecordingSource {
    async fn fetch(&self, city: &CityId, cancel: &CancellationToken) -> Result<Snapshot, PortError> {
        let snapshot = self.inner.fetch(city, cancel).await?;
        // A history write failure must not cost the caller its reading.
        match self.recorder.record(&snapshot).await {
            Ok(()) => debug!(city = %snapshot.city, index = snapshot.overall_index, "reading recorded"),
            Err(err) => warn!(city = %snapshot.city, error = %err, "failed to record reading"),
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::{NaiveDate, Utc};
    use tokio::time::{advance, sleep};

    use super::*;

    struct CountingLive {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl CountingLive {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
            })
        }
    }

    #[async_trait]
    impl LiveSource for CountingLive {
        async fn fetch(
            &self,
            city: &CityId,
            _cancel: &CancellationToken,
        ) -> Result<Snapshot, PortError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            sleep(self.delay).await;
            let index = u32::try_from(call).unwrap_or(0) + 40;
            Ok(Snapshot::new(city.clone(), Utc::now(), index, Some("pm25".into())))
        }
    }

    #[derive(Default)]
    struct VecRecorder {
        recorded: Mutex<Vec<Snapshot>>,
        broken: bool,
    }

    #[async_trait]
    impl SnapshotRecorder for VecRecorder {
        async fn record(&self, snapshot: &Snapshot) -> Result<(), PortError> {
            if self.broken {
                return Err(PortError::StoreUnavailable("disk full".into()));
            }
            self.recorded
                .lock()
                .expect("recorder lock")
                .push(snapshot.clone());
            Ok(())
        }
    }

    const POLICY: TtlPolicy = TtlPolicy {
        live: Duration::from_secs(60),
        forecast: Duration::from_secs(600),
    };

    fn cached(inner: Arc<CountingLive>) -> CachedLiveSource {
        CachedLiveSource::new(inner, Arc::new(ExpiringCache::new()), POLICY)
    }

    #[tokio::test(start_paused = true)]
    async fn cached_source_hits_upstream_once_per_ttl() {
        let upstream = CountingLive::new(Duration::from_millis(5));
        let source = cached(Arc::clone(&upstream));
        let cancel = CancellationToken::new();

        let first = source
            .fetch(&CityId::new("Sarajevo"), &cancel)
            .await
            .expect("first fetch");
        let second = source
            .fetch(&CityId::new("sarajevo"), &cancel)
            .await
            .expect("second fetch");

        assert_eq!(first, second);
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);

        assert!(source.invalidate(&CityId::new("SARAJEVO")));
        let third = source
            .fetch(&CityId::new("sarajevo"), &cancel)
            .await
            .expect("third fetch");
        assert_eq!(third.overall_index, 41);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_fetch_caches_nothing() {
        let upstream = CountingLive::new(Duration::from_secs(30));
        let source = cached(Arc::clone(&upstream));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = source.fetch(&CityId::new("tuzla"), &cancel).await;
        assert!(matches!(result, Err(PortError::Cancelled)));
        assert!(source.peek(&CityId::new("tuzla")).is_none());
    }

    #[derive(Default)]
    struct CountingForecast {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ForecastSource for CountingForecast {
        async fn forecast(
            &self,
            _city: &CityId,
            _cancel: &CancellationToken,
        ) -> Result<Vec<ForecastDay>, PortError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let date = NaiveDate::from_ymd_opt(2024, 3, 11).expect("valid date");
            Ok(vec![ForecastDay {
                date,
                pollutant: "pm25".into(),
                avg: 60,
                min: 40,
                max: 80,
            }])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn forecast_outlives_live_reading() {
        let upstream = CountingLive::new(Duration::ZERO);
        let live = cached(Arc::clone(&upstream));
        let forecasts = Arc::new(CountingForecast::default());
        let forecast = CachedForecastSource::new(
            Arc::clone(&forecasts) as Arc<dyn ForecastSource>,
            Arc::new(ExpiringCache::new()),
            POLICY,
        );
        let city = CityId::new("Mostar");
        let cancel = CancellationToken::new();

        live.fetch(&city, &cancel).await.expect("live");
        forecast.forecast(&city, &cancel).await.expect("forecast");

        advance(POLICY.live + Duration::from_secs(1)).await;
        live.fetch(&city, &cancel).await.expect("live");
        forecast.forecast(&city, &cancel).await.expect("forecast");
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 2);
        assert_eq!(forecasts.calls.load(Ordering::SeqCst), 1);

        advance(POLICY.forecast).await;
        forecast.forecast(&city, &cancel).await.expect("forecast");
        assert_eq!(forecasts.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn recording_source_stores_fetched_readings() {
        let recorder = Arc::new(VecRecorder::default());
        let source = RecordingSource::new(
            CountingLive::new(Duration::ZERO),
            Arc::clone(&recorder) as Arc<dyn SnapshotRecorder>,
        );

        let snapshot = source
            .fetch(&CityId::new("Zenica"), &CancellationToken::new())
            .await
            .expect("fetch");

        let recorded = recorder.recorded.lock().expect("recorder lock").clone();
        assert_eq!(recorded, vec![snapshot]);
    }

    #[tokio::test]
    async fn recording_failure_does_not_fail_fetch() {
        let recorder = Arc::new(VecRecorder {
            broken: true,
            ..VecRecorder::default()
        });
        let source = RecordingSource::new(CountingLive::new(Duration::ZERO), recorder);

        let result = source
            .fetch(&CityId::new("Zenica"), &CancellationToken::new())
            .await;
        assert!(result.is_ok());
    }
}
