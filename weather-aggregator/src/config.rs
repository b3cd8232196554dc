use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{cache::DEFAULT_HISTORY_LIMIT, model::ForecastDays, provider::ProviderId};

/// Configuration for a single provider (e.g., API key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
}

/// Top-level configuration.
///
/// Loaded from an optional TOML file, then overridden by environment
/// variables (a `.env` file in the working directory is honoured).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub fetch_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub default_cities: Vec<String>,
    /// Horizon the scheduler keeps warm.
    pub forecast_days: ForecastDays,
    pub history_limit: usize,

    /// Example TOML:
    /// [providers.openweather]
    /// api_key = "..."
    pub providers: HashMap<String, ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            fetch_interval_secs: 15 * 60,
            request_timeout_secs: 10,
            default_cities: vec!["London".to_string()],
            forecast_days: ForecastDays::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            providers: HashMap::new(),
        }
    }
}

impl Config {
    /// File (explicit path or the platform default), then `.env`, then the
    /// process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(path) => Self::load_from(path)?,
            None => Self::load_from(&Self::config_file_path()?)?,
        };

        if let Ok(env_file) = dotenvy::dotenv() {
            tracing::debug!(path = %env_file.display(), "loaded .env file");
        }
        cfg.apply_env(|key| std::env::var(key).ok());

        Ok(cfg)
    }

    /// Load config from a TOML file, or return the defaults if it doesn't exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the default config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-aggregator", "weather-server")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Override fields from environment-style variables. Invalid values are
    /// logged and ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(raw) = get("PORT") {
            match raw.parse() {
                Ok(port) => self.port = port,
                Err(_) => invalid("PORT", &raw),
            }
        }
        if let Some(raw) = get("FETCH_INTERVAL") {
            match parse_duration(&raw) {
                Some(d) if !d.is_zero() => self.fetch_interval_secs = d.as_secs().max(1),
                _ => invalid("FETCH_INTERVAL", &raw),
            }
        }
        if let Some(raw) = get("REQUEST_TIMEOUT") {
            match parse_duration(&raw) {
                Some(d) if !d.is_zero() => self.request_timeout_secs = d.as_secs().max(1),
                _ => invalid("REQUEST_TIMEOUT", &raw),
            }
        }
        if let Some(raw) = get("DEFAULT_CITIES") {
            let cities = parse_cities(&raw);
            if cities.is_empty() {
                invalid("DEFAULT_CITIES", &raw);
            } else {
                self.default_cities = cities;
            }
        }
        if let Some(raw) = get("FORECAST_DAYS") {
            match raw.parse().ok().and_then(|d| ForecastDays::new(d).ok()) {
                Some(days) => self.forecast_days = days,
                None => invalid("FORECAST_DAYS", &raw),
            }
        }
        if let Some(raw) = get("HISTORY_LIMIT") {
            match raw.parse::<usize>() {
                Ok(limit) if limit > 0 => self.history_limit = limit,
                _ => invalid("HISTORY_LIMIT", &raw),
            }
        }
        if let Some(key) = get("OPENWEATHERMAP_API_KEY") {
            self.upsert_provider_api_key(ProviderId::OpenWeather, key);
        }
        if let Some(key) = get("WEATHER_API_KEY") {
            self.upsert_provider_api_key(ProviderId::WeatherApi, key);
        }
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Set/replace a provider API key.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers.insert(provider_id.as_str().to_string(), ProviderConfig { api_key });
    }

    /// Returns the API key for a provider, if present and non-blank.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.providers
            .get(provider_id.as_str())
            .map(|cfg| cfg.api_key.trim())
            .filter(|key| !key.is_empty())
    }

    pub fn is_provider_configured(&self, provider_id: ProviderId) -> bool {
        !provider_id.requires_api_key() || self.provider_api_key(provider_id).is_some()
    }
}

fn invalid(key: &str, value: &str) {
    tracing::warn!(key, value, "invalid configuration value, keeping default");
}

/// Comma-separated list; blanks dropped.
pub fn parse_cities(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Accepts `90s`, `15m`, `1h` or a bare number of seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => raw.split_at(idx),
        None => (raw, "s"),
    };
    let value: u64 = digits.parse().ok()?;

    let secs = match unit.trim() {
        "s" | "sec" | "secs" => value,
        "m" | "min" | "mins" => value.checked_mul(60)?,
        "h" | "hr" | "hrs" => value.checked_mul(3600)?,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}
