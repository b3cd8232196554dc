//! HTTP routes under `/api/v1`.
//!
//! Weather lookups are cache-first: a hit is served as-is, a miss runs one
//! aggregation with the configured request timeout and stores the result.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use chrono::Utc;
use serde::Deserialize;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use weather_aggregator::{
    AggregationService, Config, CurrentSnapshot, CurrentWeather, Forecast, ForecastDays,
    ForecastSnapshot, HealthSnapshot, WeatherCache,
};

use crate::error::{ApiError, panic_response};

/// Shared handler state. All three parts are owned by `main`.
#[derive(Debug, Clone)]
pub struct AppState {
    pub service: Arc<AggregationService>,
    pub cache: Arc<WeatherCache>,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/health", get(health))
        .route("/weather/current", get(current))
        .route("/weather/forecast", get(forecast))
        .route("/weather/history/current", get(current_history))
        .route("/weather/history/forecast", get(forecast_history));

    with_layers(Router::new().nest("/api/v1", v1).with_state(state))
}

fn with_layers(router: Router) -> Router {
    router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Raw query parameters; validated by hand so clients get stable messages.
#[derive(Debug, Default, Deserialize)]
struct WeatherQuery {
    city: Option<String>,
    days: Option<String>,
    limit: Option<String>,
}

impl WeatherQuery {
    fn city(&self) -> Result<&str, ApiError> {
        self.city
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(ApiError::BadRequest("city query parameter is required"))
    }

    fn days(&self) -> Result<ForecastDays, ApiError> {
        let raw = self
            .days
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or(ApiError::BadRequest("days query parameter is required"))?;

        let days: u32 = raw
            .parse()
            .map_err(|_| ApiError::BadRequest("invalid days parameter, expected integer"))?;

        Ok(ForecastDays::new(days)?)
    }

    /// 0 (the default) means the whole retained history.
    fn limit(&self) -> Result<usize, ApiError> {
        match self.limit.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            None => Ok(0),
            Some(raw) => raw
                .parse()
                .map_err(|_| ApiError::BadRequest("invalid limit parameter, expected integer")),
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthSnapshot> {
    Json(HealthSnapshot::collect(&state.service, &state.cache, &state.config))
}

async fn current(
    State(state): State<AppState>,
    Query(query): Query<WeatherQuery>,
) -> Result<Json<CurrentWeather>, ApiError> {
    let city = query.city()?;

    if let Some(cached) = state.cache.current(city) {
        return Ok(Json(cached));
    }

    let weather = state
        .service
        .current_weather(city, state.config.request_timeout())
        .await?;
    state.cache.save_current(city, weather.clone(), Utc::now());

    Ok(Json(weather))
}

async fn forecast(
    State(state): State<AppState>,
    Query(query): Query<WeatherQuery>,
) -> Result<Json<Forecast>, ApiError> {
    let city = query.city()?;
    let days = query.days()?;

    if let Some(cached) = state.cache.forecast(city, days) {
        return Ok(Json(cached));
    }

    let forecast = state
        .service
        .forecast(city, days, state.config.request_timeout())
        .await?;
    state.cache.save_forecast(city, days, forecast.clone(), Utc::now());

    Ok(Json(forecast))
}

async fn current_history(
    State(state): State<AppState>,
    Query(query): Query<WeatherQuery>,
) -> Result<Json<Vec<CurrentSnapshot>>, ApiError> {
    let city = query.city()?;
    let limit = query.limit()?;
    Ok(Json(state.cache.current_history(city, limit)))
}

async fn forecast_history(
    State(state): State<AppState>,
    Query(query): Query<WeatherQuery>,
) -> Result<Json<Vec<ForecastSnapshot>>, ApiError> {
    let city = query.city()?;
    let days = query.days()?;
    let limit = query.limit()?;
    Ok(Json(state.cache.forecast_history(city, days, limit)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;
    use weather_aggregator::{ForecastItem, ProviderId, SharedProvider, WeatherError, WeatherProvider};

    /// Knows a fixed set of cities; everything else is not found.
    #[derive(Debug)]
    struct StubProvider {
        id: ProviderId,
        temperature: f64,
        known: &'static [&'static str],
        down: bool,
        calls: AtomicUsize,
    }

    impl StubProvider {
        fn new(id: ProviderId, temperature: f64) -> Self {
            Self {
                id,
                temperature,
                known: &["london", "paris"],
                down: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn down(id: ProviderId) -> Self {
            Self { down: true, ..Self::new(id, 0.0) }
        }

        fn check(&self, city: &str) -> Result<(), WeatherError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down {
                return Err(WeatherError::ProviderUnavailable {
                    provider: self.id,
                    reason: "connection refused by 10.0.0.7".into(),
                });
            }
            if !self.known.contains(&city.trim().to_lowercase().as_str()) {
                return Err(WeatherError::CityNotFound { city: city.into() });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl WeatherProvider for StubProvider {
        fn id(&self) -> ProviderId {
            self.id
        }

        async fn fetch_current(&self, city: &str) -> Result<CurrentWeather, WeatherError> {
            self.check(city)?;
            Ok(CurrentWeather::from_provider(
                self.id,
                city,
                self.temperature,
                50,
                1.0,
                "Clear",
                Utc::now(),
            ))
        }

        async fn fetch_forecast(
            &self,
            city: &str,
            days: ForecastDays,
        ) -> Result<Forecast, WeatherError> {
            self.check(city)?;
            let now = Utc::now();
            let item = ForecastItem {
                timestamp: now,
                temperature: self.temperature,
                description: "Clear".into(),
                source: self.id,
            };
            Ok(Forecast::from_provider(self.id, city, days, vec![item], now))
        }
    }

    fn state(providers: Vec<Arc<StubProvider>>) -> AppState {
        AppState {
            service: Arc::new(AggregationService::new(
                providers.into_iter().map(|p| p as SharedProvider).collect(),
            )),
            cache: Arc::new(WeatherCache::default()),
            config: Arc::new(Config::default()),
        }
    }

    async fn send(state: AppState, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn current_requires_city() {
        let (status, body) = send(state(Vec::new()), "/api/v1/weather/current?city=%20").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "city query parameter is required");
    }

    #[tokio::test]
    async fn current_miss_aggregates_and_fills_cache() {
        let a = Arc::new(StubProvider::new(ProviderId::OpenMeteo, 10.0));
        let b = Arc::new(StubProvider::new(ProviderId::WeatherApi, 14.0));
        let st = state(vec![Arc::clone(&a), Arc::clone(&b)]);

        let (status, body) = send(st.clone(), "/api/v1/weather/current?city=Paris").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["temperature"], 12.0);
        assert_eq!(body["source"], "openmeteo");
        assert!(st.cache.current("paris").is_some());

        // Second request is a cache hit with a different spelling.
        let (status, _) = send(st.clone(), "/api/v1/weather/current?city=%20PARIS").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cached_value_served_without_providers() {
        let st = state(Vec::new());
        let cached = CurrentWeather::from_provider(
            ProviderId::OpenWeather,
            "London",
            4.0,
            90,
            6.0,
            "drizzle",
            Utc::now(),
        );
        st.cache.save_current("London", cached, Utc::now());

        let (status, body) = send(st, "/api/v1/weather/current?city=london").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["description"], "drizzle");
    }

    #[tokio::test]
    async fn unknown_city_is_not_found() {
        let st = state(vec![
            Arc::new(StubProvider::new(ProviderId::OpenMeteo, 1.0)),
            Arc::new(StubProvider::new(ProviderId::OpenWeather, 2.0)),
        ]);

        let (status, body) = send(st, "/api/v1/weather/forecast?city=Atlantis&days=3").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "city not found");
    }

    #[tokio::test]
    async fn outage_is_service_unavailable_without_details() {
        let st = state(vec![Arc::new(StubProvider::down(ProviderId::WeatherApi))]);

        let (status, body) = send(st, "/api/v1/weather/current?city=London").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "weather providers are unavailable");
        assert!(!body.to_string().contains("10.0.0.7"));
    }

    #[tokio::test]
    async fn no_providers_is_service_unavailable() {
        let (status, _) = send(state(Vec::new()), "/api/v1/weather/current?city=London").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn forecast_validates_days() {
        let st = state(vec![Arc::new(StubProvider::new(ProviderId::OpenMeteo, 1.0))]);

        let (status, body) = send(st.clone(), "/api/v1/weather/forecast?city=London").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "days query parameter is required");

        let (status, body) = send(st.clone(), "/api/v1/weather/forecast?city=London&days=two").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid days parameter, expected integer");

        let (status, body) = send(st, "/api/v1/weather/forecast?city=London&days=8").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "days parameter must be in the 1 - 7 limit");
    }

    #[tokio::test]
    async fn forecast_then_history() {
        let st = state(vec![Arc::new(StubProvider::new(ProviderId::OpenMeteo, 7.0))]);

        let (status, body) = send(st.clone(), "/api/v1/weather/forecast?city=London&days=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["days"], 2);
        assert_eq!(body["items"][0]["temperature"], 7.0);

        let (status, body) =
            send(st.clone(), "/api/v1/weather/history/forecast?city=london&days=2&limit=5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(1));

        let (status, body) = send(st, "/api/v1/weather/history/current?city=london").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn handler_panic_is_internal_error() {
        async fn boom() -> &'static str {
            panic!("handler bug")
        }
        let app = with_layers(Router::new().route("/boom", get(boom)));

        let response = app
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({ "error": "internal server error" }));
    }

    #[tokio::test]
    async fn health_reports_state() {
        let st = state(vec![Arc::new(StubProvider::new(ProviderId::OpenMeteo, 7.0))]);
        let _ = send(st.clone(), "/api/v1/weather/current?city=Paris").await;

        let (status, body) = send(st, "/api/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["providers"], serde_json::json!(["openmeteo"]));
        assert_eq!(body["refresh_interval_secs"], 900);
        assert!(body["last_fetch"]["paris"].is_string());
    }
}
