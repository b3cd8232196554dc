use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::{
    error::WeatherError,
    model::{CurrentWeather, Forecast, ForecastDays, ForecastItem},
};

use super::{ProviderId, WeatherProvider, bad_status, decode, send, unix_to_utc};

const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

/// The free 5 day / 3 hour endpoint returns at most 40 points.
const MAX_FORECAST_POINTS: u32 = 40;
const POINTS_PER_DAY: u32 = 8;

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    http: Client,
    base_url: String,
}

impl OpenWeatherProvider {
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

    async fn get(&self, path: &str, city: &str, extra: &[(&str, String)]) -> Result<String, WeatherError> {
        let url = format!("{}/data/2.5/{path}", self.base_url);

        let request = self
            .http
            .get(url)
            .query(&[
                ("q", city),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
            ])
            .query(extra);

        let (status, body) = send(self.id(), request).await?;

        if status == StatusCode::NOT_FOUND {
            return Err(WeatherError::not_found(city));
        }
        if !status.is_success() {
            return Err(bad_status(self.id(), status, &body));
        }
        Ok(body)
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    humidity: u8,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    dt: i64,
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: OwWind,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt: i64,
    main: OwMain,
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    list: Vec<OwForecastEntry>,
}

fn first_description(weather: &[OwWeather]) -> String {
    weather
        .first()
        .map(|w| w.description.clone())
        .unwrap_or_else(|| "Unknown".to_string())
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenWeather
    }

    async fn fetch_current(&self, city: &str) -> Result<CurrentWeather, WeatherError> {
        let city = city.trim();
        let body = self.get("weather", city, &[]).await?;
        let parsed: OwCurrentResponse = decode(self.id(), &body)?;

        let observed_at = unix_to_utc(parsed.dt).unwrap_or_else(Utc::now);

        Ok(CurrentWeather::from_provider(
            self.id(),
            city,
            parsed.main.temp,
            parsed.main.humidity,
            parsed.wind.speed,
            first_description(&parsed.weather),
            observed_at,
        ))
    }

    async fn fetch_forecast(
        &self,
        city: &str,
        days: ForecastDays,
    ) -> Result<Forecast, WeatherError> {
        let city = city.trim();
        let cnt = (days.get() * POINTS_PER_DAY).min(MAX_FORECAST_POINTS);
        let body = self.get("forecast", city, &[("cnt", cnt.to_string())]).await?;
        let parsed: OwForecastResponse = decode(self.id(), &body)?;

        let items = parsed
            .list
            .iter()
            .filter_map(|entry| {
                Some(ForecastItem {
                    timestamp: unix_to_utc(entry.dt)?,
                    temperature: entry.main.temp,
                    description: first_description(&entry.weather),
                    source: ProviderId::OpenWeather,
                })
            })
            .collect();

        Ok(Forecast::from_provider(self.id(), city, days, items, Utc::now()))
    }
}
