//! Domain data structures for cities, readings, and derived timelines.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Identifier for a city as supplied by a caller.
///
/// The raw spelling is kept for display; lookups go through [`CityId::normalized`].
pub struct CityId(pub String);

impl CityId {
    /// Construct an identifier from any string-like value.
    #[must_use]
    pub fn new<S: Into<String>>(raw: S) -> Self {
        Self(raw.into())
    }

    /// Trimmed, case-folded form used for cache keys, registry lookups, and de-duplication.
    #[must_use]
    pub fn normalized(&self) -> String {
        self.0.trim().to_lowercase()
    }
}

impl fmt::Display for CityId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// EPA severity classes, ordered from cleanest to worst.
pub enum AqiCategory {
    /// 0 to 50.
    Good,
    /// 51 to 100.
    Moderate,
    /// 101 to 150.
    UnhealthySensitive,
    /// 151 to 200.
    Unhealthy,
    /// 201 to 300.
    VeryUnhealthy,
    /// 301 and above.
    Hazardous,
}

/// Lower bound, category, and display colour, ascending by bound.
pub const EPA_BREAKPOINTS: [(u32, AqiCategory, &str); 6] = [
    (0, AqiCategory::Good, "#00e400"),
    (51, AqiCategory::Moderate, "#ffff00"),
    (101, AqiCategory::UnhealthySensitive, "#ff7e00"),
    (151, AqiCategory::Unhealthy, "#ff0000"),
    (201, AqiCategory::VeryUnhealthy, "#8f3f97"),
    (301, AqiCategory::Hazardous, "#7e0023"),
];

/// Colour used for days without any value.
pub const NO_DATA_COLOR: &str = "#9e9e9e";

impl AqiCategory {
    /// Classify an index using the highest breakpoint not exceeding it.
    #[must_use]
    pub fn from_index(index: u32) -> Self {
        EPA_BREAKPOINTS
            .iter()
            .rev()
            .find(|(bound, _, _)| *bound <= index)
            .map_or(Self::Good, |(_, category, _)| *category)
    }

    /// Hex colour associated with the category.
    #[must_use]
    pub fn color(self) -> &'static str {
        EPA_BREAKPOINTS
            .iter()
            .find(|(_, category, _)| *category == self)
            .map_or(NO_DATA_COLOR, |(_, _, color)| *color)
    }

    /// Human-readable label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Moderate => "Moderate",
            Self::UnhealthySensitive => "Unhealthy for sensitive groups",
            Self::Unhealthy => "Unhealthy",
            Self::VeryUnhealthy => "Very unhealthy",
            Self::Hazardous => "Hazardous",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Point-in-time air-quality reading for a city.
pub struct Snapshot {
    /// City the reading belongs to.
    pub city: CityId,
    /// Measurement time.
    pub timestamp: DateTime<Utc>,
    /// Overall air-quality index.
    pub overall_index: u32,
    /// Category derived from `overall_index`.
    pub category: AqiCategory,
    /// Pollutant driving the index, if the source reports one.
    pub dominant_pollutant: Option<String>,
}

impl Snapshot {
    /// Build a snapshot, deriving the category from the index.
    #[must_use]
    pub fn new(
        city: CityId,
        timestamp: DateTime<Utc>,
        overall_index: u32,
        dominant_pollutant: Option<String>,
    ) -> Self {
        Self {
            city,
            timestamp,
            overall_index,
            category: AqiCategory::from_index(overall_index),
            dominant_pollutant,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Category of a timeline day: rated, or the no-data sentinel.
pub enum DayCategory {
    /// A value exists and was classified.
    Rated(AqiCategory),
    /// Nothing recorded and nothing to carry forward.
    NoData,
}

impl DayCategory {
    /// Display colour for the day.
    #[must_use]
    pub fn color(self) -> &'static str {
        match self {
            Self::Rated(category) => category.color(),
            Self::NoData => NO_DATA_COLOR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Where a timeline day's value came from.
pub enum GapFill {
    /// Mean of the snapshots recorded that day.
    Recorded,
    /// Just-in-time live reading for today.
    Live,
    /// Copied from the nearest earlier day with a value.
    CarriedForward,
    /// No value available.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One calendar day of a city's timeline.
pub struct DailyEntry {
    /// Calendar day (UTC).
    pub date: NaiveDate,
    /// Full English weekday name.
    pub day_name: String,
    /// Abbreviated English weekday name.
    pub short_day_name: String,
    /// Averaged index, absent for [`DayCategory::NoData`].
    pub aqi: Option<u32>,
    /// Rated category or the no-data sentinel.
    pub category: DayCategory,
    /// Display colour matching `category`.
    pub color: String,
    /// How the value was obtained.
    pub fill: GapFill,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One day of a pollutant forecast.
pub struct ForecastDay {
    /// Forecast day.
    pub date: NaiveDate,
    /// Pollutant code, e.g. `pm25`.
    pub pollutant: String,
    /// Expected daily average.
    pub avg: u32,
    /// Expected daily minimum.
    pub min: u32,
    /// Expected daily maximum.
    pub max: u32,
}
