//! In-memory store of the latest aggregated values plus a bounded history.
//!
//! Uses `DashMap` so writers to different cities land on different shards;
//! the latest value and the history of one key share a map slot, so a save
//! is atomic with respect to other writers of that key. Concurrent saves to
//! the same key race and the last one to complete wins.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::model::{CurrentWeather, Forecast, ForecastDays};

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Canonical cache key for a city name.
pub fn normalize_city(city: &str) -> String {
    city.trim().to_lowercase()
}

/// A value as it was stored at `fetched_at`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot<T> {
    pub fetched_at: DateTime<Utc>,
    pub data: T,
}

pub type CurrentSnapshot = Snapshot<CurrentWeather>;
pub type ForecastSnapshot = Snapshot<Forecast>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ForecastKey {
    city: String,
    days: ForecastDays,
}

impl ForecastKey {
    fn new(city: &str, days: ForecastDays) -> Self {
        Self { city: normalize_city(city), days }
    }
}

/// History for one key; the tail is the latest value.
#[derive(Debug)]
struct Slot<T> {
    history: VecDeque<Snapshot<T>>,
}

impl<T: Clone> Slot<T> {
    fn new(limit: usize) -> Self {
        Self { history: VecDeque::with_capacity(limit) }
    }

    fn push(&mut self, snapshot: Snapshot<T>, limit: usize) {
        self.history.push_back(snapshot);
        while self.history.len() > limit {
            self.history.pop_front();
        }
    }

    fn latest(&self) -> Option<T> {
        self.history.back().map(|s| s.data.clone())
    }

    /// Newest `limit` entries in chronological order; 0 means all.
    fn recent(&self, limit: usize) -> Vec<Snapshot<T>> {
        let skip = match limit {
            0 => 0,
            n => self.history.len().saturating_sub(n),
        };
        self.history.iter().skip(skip).cloned().collect()
    }
}

#[derive(Debug)]
pub struct WeatherCache {
    history_limit: usize,
    current: DashMap<String, Slot<CurrentWeather>>,
    forecast: DashMap<ForecastKey, Slot<Forecast>>,
    last_fetch: DashMap<String, DateTime<Utc>>,
}

impl Default for WeatherCache {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl WeatherCache {
    /// `history_limit` is clamped to at least one so the latest value is
    /// always retained.
    pub fn new(history_limit: usize) -> Self {
        Self {
            history_limit: history_limit.max(1),
            current: DashMap::new(),
            forecast: DashMap::new(),
            last_fetch: DashMap::new(),
        }
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    pub fn save_current(&self, city: &str, value: CurrentWeather, fetched_at: DateTime<Utc>) {
        let key = normalize_city(city);
        let limit = self.history_limit;

        self.current
            .entry(key.clone())
            .or_insert_with(|| Slot::new(limit))
            .push(Snapshot { fetched_at, data: value }, limit);

        self.touch(key, fetched_at);
    }

    pub fn current(&self, city: &str) -> Option<CurrentWeather> {
        self.current.get(&normalize_city(city))?.latest()
    }

    pub fn save_forecast(
        &self,
        city: &str,
        days: ForecastDays,
        value: Forecast,
        fetched_at: DateTime<Utc>,
    ) {
        let key = ForecastKey::new(city, days);
        let city_key = key.city.clone();
        let limit = self.history_limit;

        self.forecast
            .entry(key)
            .or_insert_with(|| Slot::new(limit))
            .push(Snapshot { fetched_at, data: value }, limit);

        self.touch(city_key, fetched_at);
    }

    pub fn forecast(&self, city: &str, days: ForecastDays) -> Option<Forecast> {
        self.forecast.get(&ForecastKey::new(city, days))?.latest()
    }

    /// Up to `limit` most recent snapshots, oldest first. `limit == 0`
    /// returns the whole retained history.
    pub fn current_history(&self, city: &str, limit: usize) -> Vec<CurrentSnapshot> {
        self.current
            .get(&normalize_city(city))
            .map(|slot| slot.recent(limit))
            .unwrap_or_default()
    }

    pub fn forecast_history(
        &self,
        city: &str,
        days: ForecastDays,
        limit: usize,
    ) -> Vec<ForecastSnapshot> {
        self.forecast
            .get(&ForecastKey::new(city, days))
            .map(|slot| slot.recent(limit))
            .unwrap_or_default()
    }

    /// Copy of the latest successful save instant per normalized city.
    pub fn last_fetch_times(&self) -> HashMap<String, DateTime<Utc>> {
        self.last_fetch
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    fn touch(&self, city: String, fetched_at: DateTime<Utc>) {
        self.last_fetch
            .entry(city)
            .and_modify(|at| {
                if fetched_at > *at {
                    *at = fetched_at;
                }
            })
            .or_insert(fetched_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderId;
    use chrono::{Duration, TimeZone};
    use std::{sync::Arc, thread};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap()
    }

    fn weather(temp: f64) -> CurrentWeather {
        CurrentWeather::from_provider(ProviderId::OpenMeteo, "London", temp, 50, 1.0, "Clear sky", t0())
    }

    fn forecast(days: ForecastDays) -> Forecast {
        Forecast::from_provider(ProviderId::OpenMeteo, "London", days, Vec::new(), t0())
    }

    #[test]
    fn city_keys_are_normalized() {
        let cache = WeatherCache::default();
        let v = weather(7.0);

        cache.save_current("London", v.clone(), t0());

        assert_eq!(cache.current(" london "), Some(v.clone()));
        assert_eq!(cache.current("LONDON"), Some(v));
        assert_eq!(cache.current_history("London", 0).len(), 1);
        assert_eq!(cache.last_fetch_times().len(), 1);
        assert!(cache.last_fetch_times().contains_key("london"));
    }

    #[test]
    fn missing_keys_read_as_empty() {
        let cache = WeatherCache::default();
        assert!(cache.current("Nowhere").is_none());
        assert!(cache.forecast("Nowhere", ForecastDays::default()).is_none());
        assert!(cache.current_history("Nowhere", 5).is_empty());
        assert!(cache.forecast_history("Nowhere", ForecastDays::default(), 0).is_empty());
    }

    #[test]
    fn history_is_bounded_fifo() {
        let cache = WeatherCache::default();
        let n = DEFAULT_HISTORY_LIMIT + 17;

        for i in 0..n {
            cache.save_current("Paris", weather(i as f64), t0() + Duration::minutes(i as i64));
        }

        let all = cache.current_history("Paris", 0);
        assert_eq!(all.len(), DEFAULT_HISTORY_LIMIT);
        assert_eq!(all[0].data.temperature, 17.0);
        assert_eq!(all[DEFAULT_HISTORY_LIMIT - 1].data.temperature, (n - 1) as f64);
        assert!(all.windows(2).all(|w| w[0].fetched_at < w[1].fetched_at));

        assert_eq!(cache.current("paris").map(|w| w.temperature), Some((n - 1) as f64));
    }

    #[test]
    fn history_limit_returns_newest_in_order() {
        let cache = WeatherCache::new(10);
        for i in 0..5 {
            cache.save_current("Rome", weather(i as f64), t0() + Duration::seconds(i));
        }

        let temps: Vec<_> = cache
            .current_history("Rome", 2)
            .into_iter()
            .map(|s| s.data.temperature)
            .collect();
        assert_eq!(temps, vec![3.0, 4.0]);
        assert_eq!(cache.current_history("Rome", 99).len(), 5);
    }

    #[test]
    fn forecasts_are_keyed_by_horizon() {
        let cache = WeatherCache::default();
        let one = ForecastDays::new(1).unwrap();
        let three = ForecastDays::new(3).unwrap();

        cache.save_forecast("Berlin", one, forecast(one), t0());
        cache.save_forecast("berlin ", three, forecast(three), t0() + Duration::hours(1));

        assert_eq!(cache.forecast("BERLIN", one).map(|f| f.days), Some(one));
        assert_eq!(cache.forecast("Berlin", three).map(|f| f.days), Some(three));
        assert!(cache.forecast("Berlin", ForecastDays::new(7).unwrap()).is_none());
        assert_eq!(cache.forecast_history("Berlin", three, 0).len(), 1);

        // Both horizons share one last-fetch slot per city.
        let times = cache.last_fetch_times();
        assert_eq!(times.len(), 1);
        assert_eq!(times["berlin"], t0() + Duration::hours(1));
    }

    #[test]
    fn last_fetch_never_moves_backwards() {
        let cache = WeatherCache::default();
        cache.save_current("Kyiv", weather(1.0), t0() + Duration::hours(2));
        cache.save_current("Kyiv", weather(2.0), t0());

        assert_eq!(cache.last_fetch_times()["kyiv"], t0() + Duration::hours(2));
        // The latest slot still follows completion order.
        assert_eq!(cache.current("Kyiv").map(|w| w.temperature), Some(2.0));
    }

    #[test]
    fn last_fetch_times_is_a_copy() {
        let cache = WeatherCache::default();
        cache.save_current("Madrid", weather(30.0), t0());

        let mut snapshot = cache.last_fetch_times();
        snapshot.clear();

        assert_eq!(cache.last_fetch_times().len(), 1);
    }

    #[test]
    fn concurrent_saves_and_reads_on_one_key() {
        let cache = Arc::new(WeatherCache::new(8));
        let writers = 16;
        let per_writer = 50;

        thread::scope(|scope| {
            for w in 0..writers {
                let cache = Arc::clone(&cache);
                scope.spawn(move || {
                    for i in 0..per_writer {
                        let temp = (w * 1000 + i) as f64;
                        cache.save_current(if i % 2 == 0 { "Tokyo" } else { " TOKYO" }, weather(temp), t0());
                        if let Some(seen) = cache.current("tokyo") {
                            assert_eq!(seen.humidity, 50);
                        }
                    }
                });
            }
        });

        let last = cache.current("Tokyo").expect("saved").temperature as usize;
        assert!(last % 1000 < per_writer && last / 1000 < writers);
        assert_eq!(cache.current_history("Tokyo", 0).len(), 8);
    }
}
