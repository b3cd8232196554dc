use thiserror::Error;

use crate::provider::ProviderId;

/// Classified failures crossing the aggregation core boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WeatherError {
    /// A provider explicitly does not recognize the city.
    #[error("city '{city}' not found")]
    CityNotFound { city: String },

    /// A provider failed transiently: network, bad status, decode failure or deadline.
    #[error("provider '{provider}' unavailable: {reason}")]
    ProviderUnavailable { provider: ProviderId, reason: String },

    /// Every dispatched provider failed for this request.
    #[error("all providers unavailable for '{city}'")]
    AllProvidersUnavailable { city: String },

    #[error("no weather providers configured")]
    NoProvidersConfigured,

    #[error("forecast days must be within 1..=7, got {days}")]
    InvalidHorizon { days: u32 },
}

impl WeatherError {
    pub(crate) fn unavailable(provider: ProviderId, reason: impl Into<String>) -> Self {
        Self::ProviderUnavailable { provider, reason: reason.into() }
    }

    pub(crate) fn not_found(city: &str) -> Self {
        Self::CityNotFound { city: city.to_string() }
    }

    /// Short, stable label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CityNotFound { .. } => "city_not_found",
            Self::ProviderUnavailable { .. } => "provider_unavailable",
            Self::AllProvidersUnavailable { .. } => "all_providers_unavailable",
            Self::NoProvidersConfigured => "no_providers_configured",
            Self::InvalidHorizon { .. } => "invalid_horizon",
        }
    }

    pub fn is_city_not_found(&self) -> bool {
        matches!(self, Self::CityNotFound { .. })
    }

    /// True for every failure a client should see as "try again later".
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable { .. }
                | Self::AllProvidersUnavailable { .. }
                | Self::NoProvidersConfigured
        )
    }
}
