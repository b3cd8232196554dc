use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use inquire::Password;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use weather_aggregator::{
    AggregationService, Config, CurrentWeather, Forecast, ForecastDays, ProviderId, Scheduler,
    WeatherCache, providers_from_config,
};

use crate::api::{self, AppState};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-server", version, about = "Multi-provider weather aggregator")]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API with the background refresher.
    Serve {
        /// Overrides the configured port.
        #[arg(long)]
        port: Option<u16>,
    },

    /// Fetch and print aggregated current weather once.
    Current {
        city: String,

        /// Print the JSON body instead of a summary.
        #[arg(long)]
        json: bool,
    },

    /// Fetch and print an aggregated forecast once.
    Forecast {
        city: String,

        #[arg(long, default_value_t = 1)]
        days: u32,

        #[arg(long)]
        json: bool,
    },

    /// Store an API key for a keyed provider.
    Configure {
        /// Provider short name, e.g. "openweather" or "weatherapi".
        provider: String,

        /// Prompted for when absent.
        #[arg(long)]
        api_key: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure { provider, api_key } => {
                configure(self.config, &provider, api_key)
            }
            Command::Serve { port } => {
                let mut config = Config::load(self.config.as_deref())?;
                if let Some(port) = port {
                    config.port = port;
                }
                serve(config).await
            }
            Command::Current { city, json } => {
                let config = Config::load(self.config.as_deref())?;
                let service = AggregationService::new(providers_from_config(&config)?);
                let weather = service
                    .current_weather(&city, config.request_timeout())
                    .await?;
                if json {
                    print_json(&weather)
                } else {
                    print_current(&weather);
                    Ok(())
                }
            }
            Command::Forecast { city, days, json } => {
                let days = ForecastDays::new(days)?;
                let config = Config::load(self.config.as_deref())?;
                let service = AggregationService::new(providers_from_config(&config)?);
                let forecast = service
                    .forecast(&city, days, config.request_timeout())
                    .await?;
                if json {
                    print_json(&forecast)
                } else {
                    print_forecast(&forecast);
                    Ok(())
                }
            }
        }
    }
}

fn configure(path: Option<PathBuf>, provider: &str, api_key: Option<String>) -> anyhow::Result<()> {
    let provider_id = ProviderId::try_from(provider)?;
    if !provider_id.requires_api_key() {
        bail!("{provider_id} does not use an API key");
    }

    let path = match path {
        Some(path) => path,
        None => Config::config_file_path()?,
    };
    // The file alone, so env overrides are not persisted.
    let mut config = Config::load_from(&path)?;

    let api_key = match api_key {
        Some(key) => key,
        None => Password::new(&format!("API key for {provider_id}:"))
            .without_confirmation()
            .prompt()
            .context("Failed to read API key")?,
    };
    let api_key = api_key.trim().to_string();
    if api_key.is_empty() {
        bail!("API key must not be empty");
    }

    config.upsert_provider_api_key(provider_id, api_key);
    config.save_to(&path)?;

    println!("Saved {provider_id} credentials to {}", path.display());
    Ok(())
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let service = Arc::new(AggregationService::new(providers_from_config(&config)?));
    let cache = Arc::new(WeatherCache::new(config.history_limit));
    let scheduler = Arc::new(Scheduler::from_config(
        Arc::clone(&service),
        Arc::clone(&cache),
        &config,
    ));

    let shutdown = CancellationToken::new();
    let refresher = tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        let shutdown = shutdown.clone();
        async move { scheduler.run(shutdown).await }
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, providers = ?service.providers(), "listening");

    let app = api::router(AppState {
        service,
        cache,
        config,
    });
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed");

    shutdown.cancel();
    if let Err(err) = refresher.await {
        tracing::error!(error = %err, "scheduler task failed");
    }

    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_current(weather: &CurrentWeather) {
    println!("{}", weather.city);
    println!("  {:.1} °C, {}", weather.temperature, weather.description);
    println!("  humidity {}%, wind {:.1} m/s", weather.humidity, weather.wind_speed);
    println!("  observed {}", weather.observed_at.format("%Y-%m-%d %H:%M UTC"));
    println!("  sources: {}", join_sources(&weather.contributors));
}

fn print_forecast(forecast: &Forecast) {
    println!("{} ({} day forecast)", forecast.city, forecast.days);
    for item in &forecast.items {
        println!(
            "  {}  {:>6.1} °C  {}",
            item.timestamp.format("%a %d %b %H:%M"),
            item.temperature,
            item.description
        );
    }
    println!("  sources: {}", join_sources(&forecast.contributors));
}

fn join_sources(ids: &[ProviderId]) -> String {
    ids.iter().map(ProviderId::as_str).collect::<Vec<_>>().join(", ")
}
