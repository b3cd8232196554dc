use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{Config, cache::WeatherCache, provider::ProviderId, service::AggregationService};

/// Point-in-time status for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub providers: Vec<ProviderId>,
    pub refresh_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub default_cities: Vec<String>,
    /// Normalized city -> last successful save.
    pub last_fetch: BTreeMap<String, DateTime<Utc>>,
}

impl HealthSnapshot {
    pub fn collect(service: &AggregationService, cache: &WeatherCache, config: &Config) -> Self {
        let providers = service.providers();
        Self {
            status: if providers.is_empty() { "degraded" } else { "ok" },
            providers,
            refresh_interval_secs: config.fetch_interval().as_secs(),
            request_timeout_secs: config.request_timeout().as_secs(),
            default_cities: config.default_cities.clone(),
            last_fetch: cache.last_fetch_times().into_iter().collect(),
        }
    }
}
