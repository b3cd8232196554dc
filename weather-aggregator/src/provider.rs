use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{convert::TryFrom, fmt::Debug, sync::Arc, time::Duration};

use crate::{
    Config,
    error::WeatherError,
    model::{CurrentWeather, Forecast, ForecastDays},
    provider::{
        openmeteo::OpenMeteoProvider, openweather::OpenWeatherProvider,
        weatherapi::WeatherApiProvider,
    },
};

pub mod openmeteo;
pub mod openweather;
pub mod weatherapi;

/// Known upstream sources. Declaration order is the canonical merge order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenMeteo,
    OpenWeather,
    WeatherApi,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenMeteo => "openmeteo",
            ProviderId::OpenWeather => "openweather",
            ProviderId::WeatherApi => "weatherapi",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenMeteo, ProviderId::OpenWeather, ProviderId::WeatherApi]
    }

    /// Whether the upstream needs an API key to be usable.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderId::OpenMeteo)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.trim().to_lowercase();

        match lower.as_str() {
            "openmeteo" => Ok(ProviderId::OpenMeteo),
            "openweather" => Ok(ProviderId::OpenWeather),
            "weatherapi" => Ok(ProviderId::WeatherApi),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: openmeteo, openweather, weatherapi."
            )),
        }
    }
}

/// A weather source normalized behind one fetch interface.
///
/// Implementations must not retry and must never return a partially populated
/// value: either every field is known, or the call fails with
/// [`WeatherError::CityNotFound`] or [`WeatherError::ProviderUnavailable`].
/// Callers bound each call with a deadline by dropping the future.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    fn id(&self) -> ProviderId;

    async fn fetch_current(&self, city: &str) -> Result<CurrentWeather, WeatherError>;

    async fn fetch_forecast(
        &self,
        city: &str,
        days: ForecastDays,
    ) -> Result<Forecast, WeatherError>;
}

pub type SharedProvider = Arc<dyn WeatherProvider>;

/// Build one HTTP client shared by every provider.
pub fn http_client(timeout: Duration) -> anyhow::Result<Client> {
    Client::builder()
        .user_agent(concat!("weather-aggregator/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(|err| anyhow::anyhow!("Failed to build HTTP client: {err}"))
}

/// Construct every provider the configuration enables.
///
/// Open-Meteo needs no credentials and is always active; the others are
/// enabled by the presence of an API key.
pub fn providers_from_config(config: &Config) -> anyhow::Result<Vec<SharedProvider>> {
    let http = http_client(config.request_timeout())?;
    let mut providers: Vec<SharedProvider> = Vec::with_capacity(ProviderId::all().len());

    for &id in ProviderId::all() {
        let provider: SharedProvider = match (id, config.provider_api_key(id)) {
            (ProviderId::OpenMeteo, _) => Arc::new(OpenMeteoProvider::new(http.clone())),
            (ProviderId::OpenWeather, Some(key)) => {
                Arc::new(OpenWeatherProvider::new(http.clone(), key.to_owned()))
            }
            (ProviderId::WeatherApi, Some(key)) => {
                Arc::new(WeatherApiProvider::new(http.clone(), key.to_owned()))
            }
            (_, None) => {
                tracing::info!(provider = %id, "no API key configured, provider disabled");
                continue;
            }
        };
        providers.push(provider);
    }

    Ok(providers)
}

/// Send a request and read the whole body. Transport failures are classified
/// as unavailable; status handling is left to the caller.
pub(crate) async fn send(
    id: ProviderId,
    request: RequestBuilder,
) -> Result<(StatusCode, String), WeatherError> {
    let res = request.send().await.map_err(|err| {
        tracing::debug!(provider = %id, error = %err, "request failed");
        WeatherError::unavailable(id, format!("request failed: {err}"))
    })?;

    let status = res.status();
    let body = res
        .text()
        .await
        .map_err(|err| WeatherError::unavailable(id, format!("failed to read body: {err}")))?;

    Ok((status, body))
}

pub(crate) fn bad_status(id: ProviderId, status: StatusCode, body: &str) -> WeatherError {
    WeatherError::unavailable(id, format!("status {status}: {}", truncate_body(body)))
}

pub(crate) fn decode<T: DeserializeOwned>(id: ProviderId, body: &str) -> Result<T, WeatherError> {
    serde_json::from_str(body)
        .map_err(|err| WeatherError::unavailable(id, format!("failed to decode response: {err}")))
}

pub(crate) fn unix_to_utc(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}

/// Parse the minute-precision local timestamps some APIs return for UTC.
pub(crate) fn parse_naive_utc(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M"))
        .ok()
        .map(|ndt| ndt.and_utc())
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
