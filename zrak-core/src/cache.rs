//! Expiring key/value cache with per-key single-flight production.
//!
//! Entries live in a `DashMap` and are checked for expiry on every read, so an
//! expired value is never returned even if the reclaimer has not run yet.
//! Misses on the same key serialize on a per-key async gate: the first caller
//! runs the factory, everyone queued behind it re-reads the freshly stored
//! value instead of calling upstream again. Failed productions store nothing.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::model::CityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Volatility class of cached data; selects the TTL.
pub enum DataClass {
    /// Current readings.
    Live,
    /// Multi-day forecasts.
    Forecast,
}

impl fmt::Display for DataClass {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::Live => "live",
            Self::Forecast => "forecast",
        };
        write!(formatter, "{tag}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Normalized city plus data class.
pub struct CacheKey {
    class: DataClass,
    city: String,
}

impl CacheKey {
    /// Build a key; the city is trimmed and case-folded.
    #[must_use]
    pub fn new(class: DataClass, city: &CityId) -> Self {
        Self {
            class,
            city: city.normalized(),
        }
    }

    /// Key for a live reading.
    #[must_use]
    pub fn live(city: &CityId) -> Self {
        Self::new(DataClass::Live, city)
    }

    /// Key for a forecast.
    #[must_use]
    pub fn forecast(city: &CityId) -> Self {
        Self::new(DataClass::Forecast, city)
    }

    /// Data class of the key.
    #[must_use]
    pub fn class(&self) -> DataClass {
        self.class
    }

    /// Normalized city part of the key.
    #[must_use]
    pub fn city(&self) -> &str {
        &self.city
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.class, self.city)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// TTL per data class.
pub struct TtlPolicy {
    /// TTL for [`DataClass::Live`].
    pub live: Duration,
    /// TTL for [`DataClass::Forecast`].
    pub forecast: Duration,
}

impl TtlPolicy {
    /// TTL applying to a class.
    #[must_use]
    pub fn ttl_for(&self, class: DataClass) -> Duration {
        match class {
            DataClass::Live => self.live,
            DataClass::Forecast => self.forecast,
        }
    }
}

#[derive(Debug, Clone)]
/// Stored value with its insertion time and TTL.
pub struct CacheEntry<V> {
    /// The cached value.
    pub value: V,
    /// When the value was stored.
    pub inserted_at: Instant,
    /// How long the value stays live.
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
            ttl,
        }
    }

    /// Whether the entry is past its TTL at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) > self.ttl
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Counters for diagnostics.
pub struct CacheStats {
    /// Reads answered from a live entry.
    pub hits: u64,
    /// Reads that ran the factory.
    pub misses: u64,
    /// Factory runs that failed.
    pub failures: u64,
}

/// Concurrent TTL cache.
pub struct ExpiringCache<V> {
    entries: DashMap<CacheKey, CacheEntry<V>>,
    gates: DashMap<CacheKey, Arc<Mutex<()>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    failures: AtomicU64,
}

impl<V> Default for ExpiringCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ExpiringCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            gates: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Return the live value for `key`, or run `factory` once and store its result for `ttl`.
    ///
    /// Concurrent callers missing on the same key wait for the running factory and then
    /// read its stored value.
    ///
    /// # Errors
    ///
    /// Returns the factory's error unchanged; nothing is cached in that case.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        factory: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.live_value(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(%key, "cache hit");
            return Ok(value);
        }

        let gate = self.gate(key);
        let _producing = gate.lock().await;

        // Whoever held the gate before us may have stored a value.
        if let Some(value) = self.live_value(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(%key, "cache hit after waiting for producer");
            return Ok(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(%key, ttl_secs = ttl.as_secs(), "cache miss, producing");

        match factory().await {
            Ok(value) => {
                self.entries
                    .insert(key.clone(), CacheEntry::new(value.clone(), ttl));
                Ok(value)
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                Err(err)
            }
        }
    }

    /// Like [`ExpiringCache::get_or_compute`], with the TTL picked from the key's data class.
    ///
    /// # Errors
    ///
    /// Returns the factory's error unchanged.
    pub async fn get_or_create<F, Fut, E>(
        &self,
        key: &CacheKey,
        policy: &TtlPolicy,
        factory: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        self.get_or_compute(key, policy.ttl_for(key.class()), factory)
            .await
    }

    /// Drop the entry for `key`. Returns whether something was stored.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let removed = self.entries.remove(key).is_some();
        debug!(%key, removed, "cache entry invalidated");
        removed
    }

    /// Live value for `key` without producing anything.
    #[must_use]
    pub fn peek(&self, key: &CacheKey) -> Option<V> {
        self.live_value(key)
    }

    /// Remove expired entries and idle gates. Returns the number of entries removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        // A gate nobody else references has no holder and no waiter.
        self.gates.retain(|_, gate| Arc::strong_count(gate) > 1);
        before.saturating_sub(self.entries.len())
    }

    /// Physically stored entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    /// Run [`ExpiringCache::purge_expired`] every `every` until `cancel` fires.
    pub fn spawn_reclaimer(
        cache: Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let period = every.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = cache.purge_expired();
                        if removed > 0 {
                            debug!(removed, "reclaimed expired cache entries");
                        }
                    }
                }
            }
        })
    }

    fn live_value(&self, key: &CacheKey) -> Option<V> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries
                .remove_if(key, |_, entry| entry.is_expired_at(now));
        }
        None
    }

    fn gate(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let gate = self.gates.entry(key.clone()).or_default();
        Arc::clone(gate.value())
    }
}
