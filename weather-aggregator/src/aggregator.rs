//! Deterministic merge of per-provider results.
//!
//! Inputs are sorted into a canonical order before anything is computed:
//! provider id first (declaration order of [`ProviderId`]), then the numeric
//! fields under a total order. Numeric fields are arithmetic means summed in
//! that order, so the result is bit-for-bit independent of completion order.
//! Text fields, the `source` tag and the city come from the first
//! contributor in canonical order.

use std::{cmp::Ordering, collections::BTreeMap};

use chrono::{DateTime, Utc};

use crate::{
    error::WeatherError,
    model::{CurrentWeather, Forecast, ForecastItem},
    provider::ProviderId,
};

pub fn merge_current(city: &str, results: &[CurrentWeather]) -> Result<CurrentWeather, WeatherError> {
    let mut sorted: Vec<&CurrentWeather> = results.iter().collect();
    sorted.sort_by(|a, b| canonical_current(a, b));

    let Some(first) = sorted.first() else {
        return Err(WeatherError::AllProvidersUnavailable { city: city.to_string() });
    };

    let humidity = mean(sorted.iter().map(|w| f64::from(w.humidity)));

    Ok(CurrentWeather {
        city: first.city.clone(),
        temperature: mean(sorted.iter().map(|w| w.temperature)),
        humidity: humidity.round().clamp(0.0, 100.0) as u8,
        wind_speed: mean(sorted.iter().map(|w| w.wind_speed)),
        description: first.description.clone(),
        source: first.source,
        observed_at: latest(sorted.iter().map(|w| w.observed_at)),
        contributors: contributors(sorted.iter().map(|w| (w.source, w.contributors.as_slice()))),
    })
}

pub fn merge_forecast(city: &str, results: &[Forecast]) -> Result<Forecast, WeatherError> {
    let mut sorted: Vec<&Forecast> = results.iter().collect();
    sorted.sort_by(|a, b| canonical_forecast(a, b));

    let Some(first) = sorted.first() else {
        return Err(WeatherError::AllProvidersUnavailable { city: city.to_string() });
    };

    let mut by_time: BTreeMap<DateTime<Utc>, Vec<&ForecastItem>> = BTreeMap::new();
    for item in sorted.iter().flat_map(|fc| fc.items.iter()) {
        by_time.entry(item.timestamp).or_default().push(item);
    }

    let items = by_time
        .into_values()
        .filter_map(|mut group| {
            group.sort_by(|a, b| canonical_item(a, b));
            let head = group.first()?;
            Some(ForecastItem {
                timestamp: head.timestamp,
                temperature: mean(group.iter().map(|i| i.temperature)),
                description: head.description.clone(),
                source: head.source,
            })
        })
        .collect();

    Ok(Forecast {
        city: first.city.clone(),
        items,
        days: first.days,
        source: first.source,
        updated_at: latest(sorted.iter().map(|fc| fc.updated_at)),
        contributors: contributors(sorted.iter().map(|fc| (fc.source, fc.contributors.as_slice()))),
    })
}

fn canonical_current(a: &CurrentWeather, b: &CurrentWeather) -> Ordering {
    a.source
        .cmp(&b.source)
        .then_with(|| a.temperature.total_cmp(&b.temperature))
        .then_with(|| a.humidity.cmp(&b.humidity))
        .then_with(|| a.wind_speed.total_cmp(&b.wind_speed))
        .then_with(|| a.observed_at.cmp(&b.observed_at))
        .then_with(|| a.description.cmp(&b.description))
        .then_with(|| a.city.cmp(&b.city))
}

fn canonical_forecast(a: &Forecast, b: &Forecast) -> Ordering {
    a.source
        .cmp(&b.source)
        .then_with(|| a.updated_at.cmp(&b.updated_at))
        .then_with(|| a.items.len().cmp(&b.items.len()))
        .then_with(|| a.city.cmp(&b.city))
        .then_with(|| {
            a.items
                .iter()
                .zip(&b.items)
                .map(|(x, y)| x.timestamp.cmp(&y.timestamp).then_with(|| canonical_item(x, y)))
                .find(|ord| ord.is_ne())
                .unwrap_or(Ordering::Equal)
        })
}

fn canonical_item(a: &ForecastItem, b: &ForecastItem) -> Ordering {
    a.source
        .cmp(&b.source)
        .then_with(|| a.temperature.total_cmp(&b.temperature))
        .then_with(|| a.description.cmp(&b.description))
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0u32), |(sum, count), v| (sum + v, count + 1));
    if count == 0 { 0.0 } else { sum / f64::from(count) }
}

fn latest(times: impl Iterator<Item = DateTime<Utc>>) -> DateTime<Utc> {
    times.max().unwrap_or_else(Utc::now)
}

fn contributors<'a>(parts: impl Iterator<Item = (ProviderId, &'a [ProviderId])>) -> Vec<ProviderId> {
    let mut ids: Vec<ProviderId> = parts
        .flat_map(|(source, listed)| std::iter::once(source).chain(listed.iter().copied()))
        .collect();
    ids.sort();
    ids.dedup();
    ids
}
