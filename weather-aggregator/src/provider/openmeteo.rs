use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    cache::normalize_city,
    error::WeatherError,
    model::{CurrentWeather, Forecast, ForecastDays, ForecastItem},
};

use super::{ProviderId, WeatherProvider, bad_status, decode, parse_naive_utc, send};

const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com";

/// Open-Meteo has no city search on the forecast endpoint, so cities are
/// resolved through a fixed coordinate table.
const CITY_COORDS: &[(&str, f64, f64)] = &[
    ("london", 51.5074, -0.1278),
    ("paris", 48.8566, 2.3522),
    ("warsaw", 52.2297, 21.0122),
    ("berlin", 52.5200, 13.4050),
    ("madrid", 40.4168, -3.7038),
    ("rome", 41.9028, 12.4964),
    ("kyiv", 50.4501, 30.5234),
    ("new york", 40.7128, -74.0060),
    ("tokyo", 35.6762, 139.6503),
];

/// Keyless provider backed by <https://open-meteo.com>.
#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    http: Client,
    base_url: String,
}

impl OpenMeteoProvider {
    pub fn new(http: Client) -> Self {
        Self::with_base_url(http, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn coordinates(city: &str) -> Result<(f64, f64), WeatherError> {
        let key = normalize_city(city);
        CITY_COORDS
            .iter()
            .find(|(name, _, _)| *name == key)
            .map(|&(_, lat, lon)| (lat, lon))
            .ok_or_else(|| WeatherError::not_found(city))
    }

    async fn get(&self, query: &[(&str, String)]) -> Result<String, WeatherError> {
        let url = format!("{}/v1/forecast", self.base_url);
        let (status, body) = send(self.id(), self.http.get(url).query(query)).await?;

        if !status.is_success() {
            return Err(bad_status(self.id(), status, &body));
        }
        Ok(body)
    }
}

#[derive(Debug, Deserialize)]
struct OmCurrentResponse {
    current: OmCurrent,
}

#[derive(Debug, Deserialize)]
struct OmCurrent {
    time: String,
    temperature_2m: f64,
    relative_humidity_2m: f64,
    wind_speed_10m: f64,
    weather_code: i32,
}

#[derive(Debug, Deserialize)]
struct OmForecastResponse {
    hourly: OmHourly,
}

#[derive(Debug, Deserialize)]
struct OmHourly {
    time: Vec<String>,
    temperature_2m: Vec<Option<f64>>,
    weather_code: Vec<Option<i32>>,
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenMeteo
    }

    async fn fetch_current(&self, city: &str) -> Result<CurrentWeather, WeatherError> {
        let (lat, lon) = Self::coordinates(city)?;

        let body = self
            .get(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                (
                    "current",
                    "temperature_2m,relative_humidity_2m,wind_speed_10m,weather_code".to_string(),
                ),
                ("wind_speed_unit", "ms".to_string()),
                ("timezone", "UTC".to_string()),
            ])
            .await?;

        let parsed: OmCurrentResponse = decode(self.id(), &body)?;
        let current = parsed.current;

        let observed_at = parse_naive_utc(&current.time).unwrap_or_else(Utc::now);

        Ok(CurrentWeather::from_provider(
            self.id(),
            city.trim(),
            current.temperature_2m,
            current.relative_humidity_2m.round().clamp(0.0, 100.0) as u8,
            current.wind_speed_10m,
            describe_wmo_code(current.weather_code),
            observed_at,
        ))
    }

    async fn fetch_forecast(
        &self,
        city: &str,
        days: ForecastDays,
    ) -> Result<Forecast, WeatherError> {
        let (lat, lon) = Self::coordinates(city)?;

        let body = self
            .get(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("hourly", "temperature_2m,weather_code".to_string()),
                ("forecast_days", days.to_string()),
                ("timezone", "UTC".to_string()),
            ])
            .await?;

        let parsed: OmForecastResponse = decode(self.id(), &body)?;
        let hourly = parsed.hourly;

        if hourly.temperature_2m.len() != hourly.time.len()
            || hourly.weather_code.len() != hourly.time.len()
        {
            return Err(WeatherError::unavailable(
                self.id(),
                "hourly series have mismatched lengths",
            ));
        }

        // Trailing hours past the model horizon come back as nulls; skip them.
        let items = hourly
            .time
            .iter()
            .zip(hourly.temperature_2m)
            .zip(hourly.weather_code)
            .filter_map(|((time, temp), code)| {
                Some(ForecastItem {
                    timestamp: parse_naive_utc(time)?,
                    temperature: temp?,
                    description: describe_wmo_code(code?).to_string(),
                    source: ProviderId::OpenMeteo,
                })
            })
            .collect();

        Ok(Forecast::from_provider(self.id(), city.trim(), days, items, Utc::now()))
    }
}

/// Text for a WMO weather interpretation code.
/// See <https://open-meteo.com/en/docs#weathervariables>.
pub fn describe_wmo_code(code: i32) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 | 48 => "Fog",
        51 | 53 | 55 => "Drizzle",
        56 | 57 => "Freezing drizzle",
        61 | 63 | 80 => "Rain",
        65 | 81 | 82 => "Heavy rain",
        66 | 67 => "Freezing rain",
        71 | 73 | 75 | 77 | 85 | 86 => "Snow",
        95 | 96 | 99 => "Thunderstorm",
        _ => "Unknown",
    }
}
