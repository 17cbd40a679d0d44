//! High-level service facade combining sources, cache, and derived views.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheStats, ExpiringCache};
use crate::compare::{ComparisonOrchestrator, ComparisonOutcome};
use crate::config::ZrakConfig;
use crate::history::HistoricalAggregator;
use crate::model::{CityId, DailyEntry, ForecastDay, Snapshot};
use crate::ports::{ForecastSource, HistoricalStore, LiveSource, PortError, SnapshotRecorder};
use crate::sources::{CachedForecastSource, CachedLiveSource, RecordingSource};
use crate::stations::StationRegistry;

/// Upstream collaborators.
pub struct Upstream {
    /// Current readings.
    pub live: Arc<dyn LiveSource>,
    /// Daily forecasts.
    pub forecast: Arc<dyn ForecastSource>,
}

/// History collaborators; usually the same store behind both handles.
pub struct History {
    /// Read side.
    pub store: Arc<dyn HistoricalStore>,
    /// Write side.
    pub recorder: Arc<dyn SnapshotRecorder>,
}

/// Public entry point for readings, timelines, and comparisons.
pub struct ZrakService {
    registry: Arc<StationRegistry>,
    live: Arc<CachedLiveSource>,
    forecast: CachedForecastSource,
    aggregator: HistoricalAggregator,
    orchestrator: ComparisonOrchestrator,
    reclaim_interval: Duration,
}

impl ZrakService {
    /// Wire the service from configuration and collaborators.
    ///
    /// Upstream readings are recorded into history and cached for the live TTL;
    /// the timeline's live fill and comparisons both go through that cache.
    #[must_use]
    pub fn new(
        config: &ZrakConfig,
        registry: Arc<StationRegistry>,
        upstream: Upstream,
        history: History,
    ) -> Self {
        let policy = config.cache.ttl_policy();

        let recording: Arc<dyn LiveSource> =
            Arc::new(RecordingSource::new(upstream.live, history.recorder));
        let live = Arc::new(CachedLiveSource::new(
            recording,
            Arc::new(ExpiringCache::new()),
            policy,
        ));
        let forecast = CachedForecastSource::new(
            upstream.forecast,
            Arc::new(ExpiringCache::new()),
            policy,
        );

        let shared_live: Arc<dyn LiveSource> = Arc::clone(&live) as Arc<dyn LiveSource>;
        let aggregator = HistoricalAggregator::new(history.store, Arc::clone(&shared_live));
        let orchestrator =
            ComparisonOrchestrator::new(shared_live, config.compare.max_concurrency);

        Self {
            registry,
            live,
            forecast,
            aggregator,
            orchestrator,
            reclaim_interval: config.cache.reclaim_interval(),
        }
    }

    /// List all configured cities and their display names.
    #[must_use]
    pub fn cities(&self) -> Vec<(CityId, String)> {
        self.registry
            .cities_iter()
            .map(|meta| (meta.id(), meta.name.clone()))
            .collect()
    }

    /// Current reading, served from cache within the live TTL.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] if the city is unknown, upstream fails, or `cancel` fires.
    pub async fn live(
        &self,
        city: &CityId,
        cancel: &CancellationToken,
    ) -> Result<Snapshot, PortError> {
        self.registry.station(city)?;
        self.live.fetch(city, cancel).await
    }

    /// Current reading, bypassing any cached value.
    ///
    /// # Errors
    ///
    /// See [`ZrakService::live`].
    pub async fn live_fresh(
        &self,
        city: &CityId,
        cancel: &CancellationToken,
    ) -> Result<Snapshot, PortError> {
        self.registry.station(city)?;
        self.live.invalidate(city);
        self.live.fetch(city, cancel).await
    }

    /// Cached reading without contacting upstream.
    #[must_use]
    pub fn cached_live(&self, city: &CityId) -> Option<Snapshot> {
        self.live.peek(city)
    }

    /// Daily forecast, served from cache within the forecast TTL.
    ///
    /// # Errors
    ///
    /// See [`ZrakService::live`].
    pub async fn forecast(
        &self,
        city: &CityId,
        cancel: &CancellationToken,
    ) -> Result<Vec<ForecastDay>, PortError> {
        self.registry.station(city)?;
        self.forecast.forecast(city, cancel).await
    }

    /// Seven-day timeline ending today.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] if the city is unknown, the history store is
    /// unreachable, or `cancel` fires.
    pub async fn daily_timeline(
        &self,
        city: &CityId,
        cancel: &CancellationToken,
    ) -> Result<Vec<DailyEntry>, PortError> {
        self.registry.station(city)?;
        self.aggregator.daily_timeline(city, cancel).await
    }

    /// Compare cities side by side; failures are reported per city.
    pub async fn compare(
        &self,
        cities: &[CityId],
        cancel: &CancellationToken,
    ) -> Vec<ComparisonOutcome> {
        self.orchestrator.compare(cities, cancel).await
    }

    /// Counters of the live and forecast caches.
    #[must_use]
    pub fn cache_stats(&self) -> (CacheStats, CacheStats) {
        (self.live.cache().stats(), self.forecast.cache().stats())
    }

    /// Start background reclamation of both caches until `cancel` fires.
    #[must_use]
    pub fn spawn_reclaimers(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        vec![
            ExpiringCache::spawn_reclaimer(
                Arc::clone(self.live.cache()),
                self.reclaim_interval,
                cancel.child_token(),
            ),
            ExpiringCache::spawn_reclaimer(
                Arc::clone(self.forecast.cache()),
                self.reclaim_interval,
                cancel.child_token(),
            ),
        ]
    }
}
