//! Traits describing source capabilities and shared error types.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Error as ReqwestError;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::model::{CityId, ForecastDay, Snapshot};

#[derive(thiserror::Error, Debug)]
/// Errors that can occur while talking to sources and stores.
pub enum PortError {
    /// Upstream could not be reached or answered with an error status.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    /// Upstream did not answer in time.
    #[error("Upstream timed out")]
    UpstreamTimeout,
    /// Upstream answered with something that could not be interpreted.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    /// Historical store could not be queried.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    /// The city has no registered station.
    #[error("Unknown city: {0}")]
    UnknownCity(String),
    /// The caller withdrew the request.
    #[error("Request cancelled")]
    Cancelled,
}

impl From<ReqwestError> for PortError {
    fn from(err: ReqwestError) -> Self {
        if err.is_timeout() {
            Self::UpstreamTimeout
        } else if err.is_decode() {
            Self::MalformedPayload(err.to_string())
        } else {
            Self::UpstreamUnavailable(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Per-city failure carried as data inside comparison results.
pub enum FailureReason {
    /// Upstream could not be reached.
    UpstreamUnavailable(String),
    /// Upstream did not answer in time.
    UpstreamTimeout,
    /// Upstream payload could not be interpreted.
    MalformedPayload(String),
    /// Historical store could not be queried.
    StoreUnavailable(String),
    /// The city has no registered station.
    UnknownCity(String),
    /// The request was superseded before this city resolved.
    Cancelled,
    /// The fetch task died without producing a result.
    Internal(String),
}

impl From<PortError> for FailureReason {
    fn from(err: PortError) -> Self {
        match err {
            PortError::UpstreamUnavailable(msg) => Self::UpstreamUnavailable(msg),
            PortError::UpstreamTimeout => Self::UpstreamTimeout,
            PortError::MalformedPayload(msg) => Self::MalformedPayload(msg),
            PortError::StoreUnavailable(msg) => Self::StoreUnavailable(msg),
            PortError::UnknownCity(city) => Self::UnknownCity(city),
            PortError::Cancelled => Self::Cancelled,
        }
    }
}

impl FailureReason {
    /// Short description for display.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::UpstreamUnavailable(msg) => format!("upstream unavailable ({msg})"),
            Self::UpstreamTimeout => "upstream timed out".to_owned(),
            Self::MalformedPayload(msg) => format!("malformed payload ({msg})"),
            Self::StoreUnavailable(msg) => format!("store unavailable ({msg})"),
            Self::UnknownCity(city) => format!("unknown city {city}"),
            Self::Cancelled => "cancelled".to_owned(),
            Self::Internal(msg) => format!("internal error ({msg})"),
        }
    }
}

#[async_trait]
/// Trait for sources of current readings.
pub trait LiveSource: Send + Sync {
    /// Fetch the current reading for a city.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the source fails or `cancel` fires first.
    async fn fetch(&self, city: &CityId, cancel: &CancellationToken) -> Result<Snapshot, PortError>;
}

#[async_trait]
/// Trait for sources of multi-day forecasts.
pub trait ForecastSource: Send + Sync {
    /// Fetch the daily forecast series for a city.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the source fails or `cancel` fires first.
    async fn forecast(
        &self,
        city: &CityId,
        cancel: &CancellationToken,
    ) -> Result<Vec<ForecastDay>, PortError>;
}

#[async_trait]
/// Trait for stores of previously recorded readings.
pub trait HistoricalStore: Send + Sync {
    /// All snapshots recorded for the city on the given UTC calendar day.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::StoreUnavailable`] when the store cannot be queried.
    async fn query_day(&self, city: &CityId, date: NaiveDate) -> Result<Vec<Snapshot>, PortError>;
}

#[async_trait]
/// Trait for stores accepting new readings.
pub trait SnapshotRecorder: Send + Sync {
    /// Persist a reading.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::StoreUnavailable`] when the store rejects the write.
    async fn record(&self, snapshot: &Snapshot) -> Result<(), PortError>;
}
