use std::{collections::BTreeSet, sync::Arc, time::Duration};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use zrak_core::{
    compare::ComparisonOutcome,
    model::{CityId, DailyEntry, ForecastDay, Snapshot},
    service::ZrakService,
};

#[derive(Debug, Clone, Copy)]
pub(crate) enum Screen {
    CitySelect,
    Timeline,
    Comparison,
}

pub(crate) struct App {
    pub service: Arc<ZrakService>,

    pub screen: Screen,
    pub cities: Vec<(CityId, String)>,
    pub city_list_index: usize,
    pub marked: BTreeSet<usize>,
    pub selected_city: Option<CityId>,

    pub live: Option<Snapshot>,
    pub timeline: Vec<DailyEntry>,
    pub forecast: Vec<ForecastDay>,
    pub comparison: Vec<ComparisonOutcome>,

    pub is_loading: bool,
    pub error_message: Option<String>,
    pub request_timeout: Duration,
}

impl App {
    pub(crate) fn new(service: Arc<ZrakService>, request_timeout: Duration) -> Self {
        let cities = service.cities();
        Self {
            service,
            screen: Screen::CitySelect,
            cities,
            city_list_index: 0,
            marked: BTreeSet::new(),
            selected_city: None,
            live: None,
            timeline: Vec::new(),
            forecast: Vec::new(),
            comparison: Vec::new(),
            is_loading: false,
            error_message: None,
            request_timeout,
        }
    }

    pub(crate) fn select_current_city(&mut self) -> Option<CityId> {
        let (id, _name) = self.cities.get(self.city_list_index)?;
        let id = id.clone();
        self.selected_city = Some(id.clone());
        self.live = None;
        self.timeline.clear();
        self.forecast.clear();
        self.screen = Screen::Timeline;
        Some(id)
    }

    pub(crate) fn toggle_mark(&mut self) {
        if !self.marked.remove(&self.city_list_index) {
            self.marked.insert(self.city_list_index);
        }
    }

    /// Marked cities, or every city when none are marked.
    pub(crate) fn comparison_cities(&self) -> Vec<CityId> {
        self.cities
            .iter()
            .enumerate()
            .filter(|(idx, _)| self.marked.is_empty() || self.marked.contains(idx))
            .map(|(_, (id, _))| id.clone())
            .collect()
    }

    /// Token that fires once the request timeout elapses; cancel it when the request is done.
    pub(crate) fn request_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let timeout = self.request_timeout;
        tokio::spawn(async move {
            tokio::select! {
                () = trigger.cancelled() => {}
                () = sleep(timeout) => trigger.cancel(),
            }
        });
        token
    }
}
