use std::any::Any;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use weather_aggregator::WeatherError;

/// Errors surfaced by the HTTP layer. Client-facing messages are fixed;
/// details only go to the log.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(&'static str),

    #[error(transparent)]
    Weather(#[from] WeatherError),
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, *msg),
            Self::Weather(err) => match err {
                WeatherError::CityNotFound { .. } => (StatusCode::NOT_FOUND, "city not found"),
                WeatherError::InvalidHorizon { .. } => {
                    (StatusCode::BAD_REQUEST, "days parameter must be in the 1 - 7 limit")
                }
                WeatherError::ProviderUnavailable { .. }
                | WeatherError::AllProvidersUnavailable { .. }
                | WeatherError::NoProvidersConfigured => {
                    (StatusCode::SERVICE_UNAVAILABLE, "weather providers are unavailable")
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Response for a handler that panicked. The payload is logged, never sent.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("non-string panic payload");
    tracing::error!(panic = detail, "request handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal server error" })),
    )
        .into_response()
}
