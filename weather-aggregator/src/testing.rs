//! Scripted provider used by unit tests.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::{
    error::WeatherError,
    model::{CurrentWeather, Forecast, ForecastDays, ForecastItem},
    provider::{ProviderId, WeatherProvider},
};

#[derive(Debug, Clone, Copy)]
enum Behaviour {
    Temperature(f64),
    Unavailable,
    NotFound,
    Panic,
}

#[derive(Debug)]
pub(crate) struct FakeProvider {
    id: ProviderId,
    behaviour: Behaviour,
    delay: Duration,
    calls: AtomicUsize,
    completed: AtomicUsize,
}

impl FakeProvider {
    fn new(id: ProviderId, behaviour: Behaviour) -> Self {
        Self {
            id,
            behaviour,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_temperature(id: ProviderId, temperature: f64) -> Self {
        Self::new(id, Behaviour::Temperature(temperature))
    }

    pub(crate) fn unavailable(id: ProviderId) -> Self {
        Self::new(id, Behaviour::Unavailable)
    }

    pub(crate) fn not_found(id: ProviderId) -> Self {
        Self::new(id, Behaviour::NotFound)
    }

    pub(crate) fn panicking(id: ProviderId) -> Self {
        Self::new(id, Behaviour::Panic)
    }

    pub(crate) fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls that got past the scripted delay.
    pub(crate) fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    async fn respond(&self, city: &str) -> Result<f64, WeatherError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Temperature(t) => Ok(t),
            Behaviour::Unavailable => Err(WeatherError::unavailable(self.id, "scripted outage")),
            Behaviour::NotFound => Err(WeatherError::not_found(city)),
            Behaviour::Panic => panic!("scripted panic in {}", self.id),
        }
    }
}

#[async_trait]
impl WeatherProvider for FakeProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn fetch_current(&self, city: &str) -> Result<CurrentWeather, WeatherError> {
        let temperature = self.respond(city).await?;
        Ok(CurrentWeather::from_provider(
            self.id,
            city,
            temperature,
            60,
            2.0,
            format!("{} sky", self.id),
            Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
        ))
    }

    async fn fetch_forecast(
        &self,
        city: &str,
        days: ForecastDays,
    ) -> Result<Forecast, WeatherError> {
        let temperature = self.respond(city).await?;
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let item = ForecastItem {
            timestamp: at,
            temperature,
            description: format!("{} sky", self.id),
            source: self.id,
        };
        Ok(Forecast::from_provider(self.id, city, days, vec![item], at))
    }
}
