//! Source implementation backed by the WAQI (aqicn.org) feed API.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use zrak_core::{
    config::UpstreamConfig,
    model::{CityId, ForecastDay, Snapshot},
    ports::{ForecastSource, LiveSource, PortError},
    stations::StationRegistry,
};

/// Message WAQI returns for station slugs it does not know.
const UNKNOWN_STATION: &str = "Unknown station";

/// Daily series that are not pollutants.
const NON_POLLUTANT_SERIES: &[&str] = &["uvi"];

/// Envelope of every /feed response.
#[derive(Debug, Deserialize)]
struct FeedResponse {
    status: String,
    data: FeedData,
}

/// `data` is an object on success and a message string on error.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeedData {
    Station(Box<StationFeed>),
    Message(String),
}

#[derive(Debug, Deserialize)]
struct StationFeed {
    aqi: AqiValue,

    // sic, the API spells it this way
    #[serde(rename = "dominentpol", default)]
    dominant_pollutant: Option<String>,

    #[serde(default)]
    time: Option<FeedTime>,

    #[serde(default)]
    forecast: Option<FeedForecast>,
}

/// Stations without a current value report `"-"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AqiValue {
    Number(u32),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct FeedTime {
    #[serde(default)]
    iso: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Deserialize)]
struct FeedForecast {
    #[serde(default)]
    daily: HashMap<String, Vec<DailyForecast>>,
}

#[derive(Debug, Deserialize)]
struct DailyForecast {
    day: NaiveDate,
    avg: u32,
    min: u32,
    max: u32,
}

/// Live and forecast source for the WAQI feed.
pub struct WaqiSource {
    client: Client,
    base_url: String,
    token: String,
    registry: Arc<StationRegistry>,
}

impl WaqiSource {
    /// Create a source bound to the given HTTP client and station table.
    #[must_use]
    pub fn new(client: Client, config: &UpstreamConfig, registry: Arc<StationRegistry>) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            token: config.token.clone(),
            registry,
        }
    }

    async fn feed(
        &self,
        city: &CityId,
        cancel: &CancellationToken,
    ) -> Result<StationFeed, PortError> {
        let station = &self.registry.station(city)?.station;
        let req = self
            .client
            .get(format!("{}/feed/{station}/", self.base_url))
            .query(&[("token", self.token.as_str())]);

        debug!(%city, station, "requesting feed");

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PortError::Cancelled),
            response = fetch_json::<FeedResponse>(req) => response?,
        };

        station_feed(city, response)
    }
}

#[async_trait]
impl LiveSource for WaqiSource {
    #[instrument(skip(self, cancel), fields(city = %city))]
    async fn fetch(&self, city: &CityId, cancel: &CancellationToken) -> Result<Snapshot, PortError> {
        let feed = self.feed(city, cancel).await?;
        snapshot_from_feed(city, feed)
    }
}

#[async_trait]
impl ForecastSource for WaqiSource {
    #[instrument(skip(self, cancel), fields(city = %city))]
    async fn forecast(
        &self,
        city: &CityId,
        cancel: &CancellationToken,
    ) -> Result<Vec<ForecastDay>, PortError> {
        let feed = self.feed(city, cancel).await?;
        Ok(forecast_from_feed(feed))
    }
}

/// Build the shared source for the configured station table.
#[must_use]
pub fn source(
    client: Client,
    config: &UpstreamConfig,
    registry: Arc<StationRegistry>,
) -> Arc<WaqiSource> {
    Arc::new(WaqiSource::new(client, config, registry))
}

/// Unwrap the envelope, mapping API-level errors.
fn station_feed(city: &CityId, response: FeedResponse) -> Result<StationFeed, PortError> {
    match (response.status.as_str(), response.data) {
        ("ok", FeedData::Station(feed)) => Ok(*feed),
        ("ok", FeedData::Message(msg)) => Err(PortError::MalformedPayload(format!(
            "expected station data, got message: {msg}"
        ))),
        (_, FeedData::Message(msg)) if msg == UNKNOWN_STATION => {
            Err(PortError::UnknownCity(city.0.clone()))
        }
        (status, FeedData::Message(msg)) => Err(PortError::UpstreamUnavailable(format!(
            "{status}: {msg}"
        ))),
        (status, FeedData::Station(_)) => Err(PortError::UpstreamUnavailable(format!(
            "unexpected status {status}"
        ))),
    }
}

fn snapshot_from_feed(city: &CityId, feed: StationFeed) -> Result<Snapshot, PortError> {
    let index = match feed.aqi {
        AqiValue::Number(index) => index,
        AqiValue::Text(raw) => raw.trim().parse().map_err(|_parse_err| {
            PortError::MalformedPayload(format!("station reports no index ({raw})"))
        })?,
    };

    let timestamp = feed
        .time
        .and_then(|time| time.iso)
        .map_or_else(Utc::now, |iso| iso.with_timezone(&Utc));

    let dominant_pollutant = feed
        .dominant_pollutant
        .map(|pollutant| pollutant.trim().to_lowercase())
        .filter(|pollutant| !pollutant.is_empty());

    Ok(Snapshot::new(city.clone(), timestamp, index, dominant_pollutant))
}

/// Pollutant series ordered by date, then pollutant code.
fn forecast_from_feed(feed: StationFeed) -> Vec<ForecastDay> {
    let Some(forecast) = feed.forecast else {
        return Vec::new();
    };

    let mut days: Vec<ForecastDay> = forecast
        .daily
        .into_iter()
        .filter(|(pollutant, _)| !NON_POLLUTANT_SERIES.contains(&pollutant.as_str()))
        .flat_map(|(pollutant, series)| {
            series.into_iter().map(move |entry| ForecastDay {
                date: entry.day,
                pollutant: pollutant.clone(),
                avg: entry.avg,
                min: entry.min,
                max: entry.max,
            })
        })
        .collect();

    days.sort_by(|left, right| {
        left.date
            .cmp(&right.date)
            .then_with(|| left.pollutant.cmp(&right.pollutant))
    });
    days
}

// Small helper to fetch and decode JSON with status handling.
async fn fetch_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, PortError> {
    req.send()
        .await
        .map_err(PortError::from)?
        .error_for_status()
        .map_err(PortError::from)?
        .json()
        .await
        .map_err(PortError::from)
}
