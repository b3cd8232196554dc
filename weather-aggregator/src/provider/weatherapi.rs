use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::{
    error::WeatherError,
    model::{CurrentWeather, Forecast, ForecastDays, ForecastItem},
};

use super::{ProviderId, WeatherProvider, bad_status, decode, send, unix_to_utc};

const DEFAULT_BASE_URL: &str = "https://api.weatherapi.com";

/// WeatherAPI.com error code for "No matching location found".
const NO_MATCHING_LOCATION: u32 = 1006;

#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    http: Client,
    base_url: String,
}

impl WeatherApiProvider {
    pub fn new(http: Client, api_key: String) -> Self {
        Self::with_base_url(http, api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(http: Client, api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            api_key,
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get(&self, endpoint: &str, city: &str, extra: &[(&str, String)]) -> Result<String, WeatherError> {
        let url = format!("{}/v1/{endpoint}", self.base_url);

        let request = self
            .http
            .get(url)
            .query(&[("key", self.api_key.as_str()), ("q", city)])
            .query(extra);

        let (status, body) = send(self.id(), request).await?;

        if status == StatusCode::BAD_REQUEST && error_code(&body) == Some(NO_MATCHING_LOCATION) {
            return Err(WeatherError::not_found(city));
        }
        if !status.is_success() {
            return Err(bad_status(self.id(), status, &body));
        }
        Ok(body)
    }
}

#[derive(Debug, Deserialize)]
struct WaErrorResponse {
    error: WaError,
}

#[derive(Debug, Deserialize)]
struct WaError {
    code: u32,
}

fn error_code(body: &str) -> Option<u32> {
    serde_json::from_str::<WaErrorResponse>(body).ok().map(|r| r.error.code)
}

#[derive(Debug, Deserialize)]
struct WaCondition {
    text: String,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    last_updated_epoch: Option<i64>,
    temp_c: f64,
    humidity: u8,
    wind_kph: f64,
    condition: WaCondition,
}

#[derive(Debug, Deserialize)]
struct WaCurrentResponse {
    current: WaCurrent,
}

#[derive(Debug, Deserialize)]
struct WaHour {
    time_epoch: i64,
    temp_c: f64,
    condition: WaCondition,
}

#[derive(Debug, Deserialize)]
struct WaForecastDay {
    hour: Vec<WaHour>,
}

#[derive(Debug, Deserialize)]
struct WaForecast {
    forecastday: Vec<WaForecastDay>,
}

#[derive(Debug, Deserialize)]
struct WaForecastResponse {
    forecast: WaForecast,
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::WeatherApi
    }

    async fn fetch_current(&self, city: &str) -> Result<CurrentWeather, WeatherError> {
        let city = city.trim();
        let body = self.get("current.json", city, &[]).await?;
        let parsed: WaCurrentResponse = decode(self.id(), &body)?;
        let current = parsed.current;

        let observed_at = current
            .last_updated_epoch
            .and_then(unix_to_utc)
            .unwrap_or_else(Utc::now);

        Ok(CurrentWeather::from_provider(
            self.id(),
            city,
            current.temp_c,
            current.humidity,
            current.wind_kph / 3.6,
            current.condition.text,
            observed_at,
        ))
    }

    async fn fetch_forecast(
        &self,
        city: &str,
        days: ForecastDays,
    ) -> Result<Forecast, WeatherError> {
        let city = city.trim();
        let body = self
            .get("forecast.json", city, &[("days", days.to_string())])
            .await?;
        let parsed: WaForecastResponse = decode(self.id(), &body)?;

        let items = parsed
            .forecast
            .forecastday
            .into_iter()
            .flat_map(|day| day.hour)
            .filter_map(|hour| {
                Some(ForecastItem {
                    timestamp: unix_to_utc(hour.time_epoch)?,
                    temperature: hour.temp_c,
                    description: hour.condition.text,
                    source: ProviderId::WeatherApi,
                })
            })
            .collect();

        Ok(Forecast::from_provider(self.id(), city, days, items, Utc::now()))
    }
}
