//! Periodic cache refresh with at most one cycle in flight.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::Utc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{Config, cache::WeatherCache, model::ForecastDays, service::AggregationService};

const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Started,
    /// A previous cycle was still running.
    Skipped,
}

/// Work performed by one refresh cycle. Cheap to clone.
#[derive(Debug, Clone)]
struct RefreshCycle {
    service: Arc<AggregationService>,
    cache: Arc<WeatherCache>,
    cities: Arc<[String]>,
    request_timeout: Duration,
    forecast_days: ForecastDays,
}

impl RefreshCycle {
    async fn run(&self) {
        let started = Instant::now();
        tracing::info!(cities = self.cities.len(), "refresh cycle started");

        for city in self.cities.iter() {
            self.refresh_city(city).await;
        }

        tracing::info!(
            cities = self.cities.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "refresh cycle finished"
        );
    }

    async fn refresh_city(&self, city: &str) {
        match self.service.current_weather(city, self.request_timeout).await {
            Ok(current) => self.cache.save_current(city, current, Utc::now()),
            Err(err) => {
                tracing::warn!(city, kind = err.kind(), error = %err, "scheduled current weather refresh failed")
            }
        }

        let days = self.forecast_days;
        match self.service.forecast(city, days, self.request_timeout).await {
            Ok(forecast) => self.cache.save_forecast(city, days, forecast, Utc::now()),
            Err(err) => {
                tracing::warn!(city, %days, kind = err.kind(), error = %err, "scheduled forecast refresh failed")
            }
        }
    }
}

/// Clears the running flag when a cycle ends, including by panic.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct Scheduler {
    cycle: RefreshCycle,
    interval: Duration,
    running: Arc<AtomicBool>,
    skipped: AtomicU64,
    tracker: TaskTracker,
}

impl Scheduler {
    pub fn new(
        service: Arc<AggregationService>,
        cache: Arc<WeatherCache>,
        cities: Vec<String>,
        interval: Duration,
    ) -> Self {
        Self {
            cycle: RefreshCycle {
                service,
                cache,
                cities: cities.into(),
                request_timeout: Duration::from_secs(10),
                forecast_days: ForecastDays::default(),
            },
            interval: interval.max(MIN_INTERVAL),
            running: Arc::new(AtomicBool::new(false)),
            skipped: AtomicU64::new(0),
            tracker: TaskTracker::new(),
        }
    }

    pub fn from_config(
        service: Arc<AggregationService>,
        cache: Arc<WeatherCache>,
        config: &Config,
    ) -> Self {
        Self::new(service, cache, config.default_cities.clone(), config.fetch_interval())
            .with_request_timeout(config.request_timeout())
            .with_forecast_days(config.forecast_days)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.cycle.request_timeout = timeout;
        self
    }

    pub fn with_forecast_days(mut self, days: ForecastDays) -> Self {
        self.cycle.forecast_days = days;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn skipped_ticks(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Start a refresh cycle in the background unless one is already running.
    pub fn tick(&self) -> Tick {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            let skipped = self.skipped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(skipped, "previous refresh cycle still in progress, skipping tick");
            return Tick::Skipped;
        }

        let guard = RunningGuard(Arc::clone(&self.running));
        let cycle = self.cycle.clone();
        self.tracker.spawn(async move {
            let _guard = guard;
            cycle.run().await;
        });

        Tick::Started
    }

    /// Wait for the in-flight cycle, if any, to finish.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Tick on a fixed interval until `shutdown` fires, then let the
    /// in-flight cycle finish. The first tick fires immediately.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            cities = ?self.cycle.cities,
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }

        tracing::info!("scheduler stopping, waiting for in-flight cycle");
        self.drain().await;
        tracing::info!(skipped = self.skipped_ticks(), "scheduler stopped");
    }
}
