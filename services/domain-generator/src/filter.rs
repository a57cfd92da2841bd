//! Severity watch-set filter.

use std::collections::BTreeSet;

use hydro_common::SiteForecast;

/// Retains forecasts whose forecast flood category is being watched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeverityFilter {
    watched: BTreeSet<String>,
}

impl SeverityFilter {
    pub fn new<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            watched: categories
                .into_iter()
                .map(|c| normalize(c.as_ref()))
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    pub fn watched(&self) -> impl Iterator<Item = &str> {
        self.watched.iter().map(String::as_str)
    }

    pub fn retains(&self, forecast: &SiteForecast) -> bool {
        self.retains_category(&forecast.forecast_flood_category)
    }

    pub fn retains_category(&self, category: &str) -> bool {
        self.watched.contains(&normalize(category))
    }
}

fn normalize(category: &str) -> String {
    category.trim().to_ascii_lowercase()
}
