use std::{future::Future, sync::Arc, time::Duration};

use tokio::{sync::mpsc, task::JoinSet, time::Instant};

use crate::{
    aggregator::{merge_current, merge_forecast},
    error::WeatherError,
    model::{CurrentWeather, Forecast, ForecastDays},
    provider::{ProviderId, SharedProvider},
};

/// Fans one logical request out to every configured provider and merges
/// whatever succeeds before the deadline.
#[derive(Debug, Clone)]
pub struct AggregationService {
    providers: Vec<SharedProvider>,
}

impl AggregationService {
    pub fn new(providers: Vec<SharedProvider>) -> Self {
        Self { providers }
    }

    pub fn providers(&self) -> Vec<ProviderId> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    pub async fn current_weather(
        &self,
        city: &str,
        timeout: Duration,
    ) -> Result<CurrentWeather, WeatherError> {
        let city = city.trim();
        let successes = self
            .fan_out("current", city, timeout, |provider, city| async move {
                provider.fetch_current(&city).await
            })
            .await?;

        merge_current(city, &successes)
    }

    pub async fn forecast(
        &self,
        city: &str,
        days: ForecastDays,
        timeout: Duration,
    ) -> Result<Forecast, WeatherError> {
        let city = city.trim();
        let successes = self
            .fan_out("forecast", city, timeout, move |provider, city| async move {
                provider.fetch_forecast(&city, days).await
            })
            .await?;

        merge_forecast(city, &successes)
    }

    /// Spawn one task per provider, each bounded by the same deadline, and
    /// drain their reports from a single channel. The tasks live in a
    /// `JoinSet` owned by this future, so dropping it aborts every call
    /// still in flight.
    async fn fan_out<T, F, Fut>(
        &self,
        op: &'static str,
        city: &str,
        timeout: Duration,
        call: F,
    ) -> Result<Vec<T>, WeatherError>
    where
        T: Send + 'static,
        F: Fn(SharedProvider, String) -> Fut,
        Fut: Future<Output = Result<T, WeatherError>> + Send + 'static,
    {
        if self.providers.is_empty() {
            tracing::warn!(op, city, "no providers configured");
            return Err(WeatherError::NoProvidersConfigured);
        }

        let deadline = Instant::now() + timeout;
        let (tx, mut rx) = mpsc::channel(self.providers.len());
        let mut tasks = JoinSet::new();

        for provider in &self.providers {
            let id = provider.id();
            let tx = tx.clone();
            let fetch = call(Arc::clone(provider), city.to_string());

            tracing::info!(op, provider = %id, city, "fetching");

            tasks.spawn(async move {
                let result = tokio::time::timeout_at(deadline, fetch)
                    .await
                    .unwrap_or_else(|_| Err(WeatherError::unavailable(id, "deadline exceeded")));
                // Only fails if the caller stopped listening.
                let _ = tx.send((id, result)).await;
            });
        }
        drop(tx);

        let mut pending = self.providers();
        let mut successes = Vec::with_capacity(pending.len());
        let mut failures = Vec::new();

        while let Some((id, result)) = rx.recv().await {
            if let Some(pos) = pending.iter().position(|p| *p == id) {
                pending.swap_remove(pos);
            }
            match result {
                Ok(value) => successes.push(value),
                Err(err) => {
                    log_provider_error(op, id, city, &err);
                    failures.push(err);
                }
            }
        }

        // A task that panicked drops its sender without reporting.
        for id in pending {
            tracing::error!(op, provider = %id, city, "provider task ended without a result");
            failures.push(WeatherError::unavailable(id, "task aborted"));
        }

        if successes.is_empty() {
            if failures.iter().all(WeatherError::is_city_not_found) {
                return Err(WeatherError::not_found(city));
            }
            tracing::warn!(op, city, failed = failures.len(), "all providers failed");
            return Err(WeatherError::AllProvidersUnavailable { city: city.to_string() });
        }

        tracing::debug!(op, city, ok = successes.len(), failed = failures.len(), "aggregating");
        Ok(successes)
    }
}

fn log_provider_error(op: &str, provider: ProviderId, city: &str, err: &WeatherError) {
    match err {
        WeatherError::CityNotFound { .. } => {
            tracing::warn!(op, %provider, city, kind = err.kind(), "city not found for provider")
        }
        WeatherError::ProviderUnavailable { reason, .. } => {
            tracing::warn!(op, %provider, city, kind = err.kind(), error = %reason, "provider unavailable")
        }
        other => {
            tracing::warn!(op, %provider, city, kind = other.kind(), error = %other, "unexpected provider error")
        }
    }
}
