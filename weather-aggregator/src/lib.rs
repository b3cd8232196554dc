//! Core library for the weather aggregator.
//!
//! This crate defines:
//! - The provider abstraction and concrete upstream clients
//! - Deterministic merging of per-provider results
//! - Concurrent fan-out over all providers with a shared deadline
//! - A concurrency-safe cache with bounded history
//! - A non-overlapping periodic refresh scheduler
//! - Configuration & credentials handling
//!
//! It is used by `weather-server`, but can also be embedded in other binaries.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod model;
pub mod provider;
pub mod scheduler;
pub mod service;

#[cfg(test)]
mod testing;

pub use cache::{CurrentSnapshot, ForecastSnapshot, Snapshot, WeatherCache, normalize_city};
pub use config::{Config, ProviderConfig};
pub use error::WeatherError;
pub use health::HealthSnapshot;
pub use model::{CurrentWeather, Forecast, ForecastDays, ForecastItem};
pub use provider::{ProviderId, SharedProvider, WeatherProvider, providers_from_config};
pub use scheduler::{Scheduler, Tick};
pub use service::AggregationService;
