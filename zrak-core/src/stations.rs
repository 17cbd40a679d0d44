//! Registry resolving city identifiers to upstream monitoring stations.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::CityId;
use crate::ports::PortError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One row of the city-to-station table.
pub struct StationMeta {
    /// Display name; also the identifier callers use.
    pub name: String,
    /// Upstream station slug or `@id` reference.
    pub station: String,
}

impl StationMeta {
    /// Construct a table row.
    #[must_use]
    pub fn new<N: Into<String>, S: Into<String>>(name: N, station: S) -> Self {
        Self {
            name: name.into(),
            station: station.into(),
        }
    }

    /// Identifier callers use for this city.
    #[must_use]
    pub fn id(&self) -> CityId {
        CityId::new(self.name.clone())
    }
}

/// Immutable lookup table, built once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct StationRegistry {
    stations: Vec<StationMeta>,
    by_city: HashMap<String, usize>,
}

impl StationRegistry {
    /// Build a registry from the configured rows; later duplicates of a city are ignored.
    #[must_use]
    pub fn new(rows: Vec<StationMeta>) -> Self {
        let mut stations = Vec::with_capacity(rows.len());
        let mut by_city = HashMap::with_capacity(rows.len());

        for row in rows {
            let key = row.id().normalized();
            if by_city.contains_key(&key) {
                continue;
            }
            by_city.insert(key, stations.len());
            stations.push(row);
        }

        Self { stations, by_city }
    }

    /// Iterator over rows in configuration order.
    pub fn cities_iter(&self) -> impl Iterator<Item = &StationMeta> {
        self.stations.iter()
    }

    /// Look up the station for a city, ignoring case and surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::UnknownCity`] when no row matches.
    pub fn station(&self, city: &CityId) -> Result<&StationMeta, PortError> {
        self.by_city
            .get(&city.normalized())
            .and_then(|idx| self.stations.get(*idx))
            .ok_or_else(|| PortError::UnknownCity(city.0.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> StationRegistry {
        StationRegistry::new(vec![
            StationMeta::new("Sarajevo", "sarajevo"),
            StationMeta::new("Tuzla", "@9261"),
            StationMeta::new("SARAJEVO", "@duplicate"),
        ])
    }

    #[test]
    fn lookup_ignores_case_and_whitespace() {
        let registry = registry();
        let station = registry
            .station(&CityId::new(" tuzla "))
            .expect("tuzla registered");
        assert_eq!(station.station, "@9261");
    }

    #[test]
    fn first_row_wins_for_duplicate_cities() {
        let registry = registry();
        assert_eq!(registry.cities_iter().count(), 2);
        let station = registry
            .station(&CityId::new("sarajevo"))
            .expect("sarajevo registered");
        assert_eq!(station.station, "sarajevo");
    }

    #[test]
    fn unknown_city_is_reported() {
        let err = registry()
            .station(&CityId::new("Mostar"))
            .expect_err("mostar not registered");
        assert!(matches!(err, PortError::UnknownCity(city) if city == "Mostar"));
    }
}
