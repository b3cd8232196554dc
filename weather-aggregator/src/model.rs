use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::WeatherError, provider::ProviderId};

/// Normalized current conditions for one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub city: String,
    /// Celsius.
    pub temperature: f64,
    /// Percent.
    pub humidity: u8,
    /// Metres per second.
    pub wind_speed: f64,
    pub description: String,
    pub source: ProviderId,
    pub observed_at: DateTime<Utc>,
    /// Every provider that contributed to this value, sorted.
    #[serde(default)]
    pub contributors: Vec<ProviderId>,
}

impl CurrentWeather {
    /// Single-provider value, as produced by a provider before merging.
    pub fn from_provider(
        source: ProviderId,
        city: impl Into<String>,
        temperature: f64,
        humidity: u8,
        wind_speed: f64,
        description: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            city: city.into(),
            temperature,
            humidity,
            wind_speed,
            description: description.into(),
            source,
            observed_at,
            contributors: vec![source],
        }
    }
}

/// One point of a forecast series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastItem {
    pub timestamp: DateTime<Utc>,
    /// Celsius.
    pub temperature: f64,
    pub description: String,
    pub source: ProviderId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub city: String,
    /// Chronological.
    pub items: Vec<ForecastItem>,
    pub days: ForecastDays,
    pub source: ProviderId,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub contributors: Vec<ProviderId>,
}

impl Forecast {
    pub fn from_provider(
        source: ProviderId,
        city: impl Into<String>,
        days: ForecastDays,
        mut items: Vec<ForecastItem>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        items.sort_by_key(|item| item.timestamp);
        Self {
            city: city.into(),
            items,
            days,
            source,
            updated_at,
            contributors: vec![source],
        }
    }
}

/// Forecast horizon expressed as a number of days, 1 through 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ForecastDays(u8);

impl ForecastDays {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 7;

    pub fn new(days: u32) -> Result<Self, WeatherError> {
        if (Self::MIN..=Self::MAX).contains(&days) {
            Ok(Self(days as u8))
        } else {
            Err(WeatherError::InvalidHorizon { days })
        }
    }

    pub fn get(self) -> u32 {
        u32::from(self.0)
    }
}

impl Default for ForecastDays {
    fn default() -> Self {
        Self(1)
    }
}

impl TryFrom<u32> for ForecastDays {
    type Error = WeatherError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ForecastDays> for u32 {
    fn from(days: ForecastDays) -> Self {
        days.get()
    }
}

impl std::fmt::Display for ForecastDays {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
