// aqi_forecast - Air quality index engine and exporter for OpenWeatherMap data
//
// Copyright 2024 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use aqi_forecast::aqi;
use aqi_forecast::client::{ClientError, Coordinates, OpenWeatherClient};
use aqi_forecast::features::RawObservation;
use aqi_forecast::forecast::{self, FORECAST_HOURS};
use aqi_forecast::http::RequestContext;
use aqi_forecast::metrics::AirQualityMetrics;
use aqi_forecast::standard::AqiStandard;
use clap::Parser;
use prometheus_client::registry::Registry;
use reqwest::{Client, Url};
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{self, SignalKind};
use tracing::{Instrument, Level};

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 9783);
const DEFAULT_REFERSH_SECS: u64 = 300;
const DEFAULT_TIMEOUT_MILLIS: u64 = 5000;
const DEFAULT_API_URL: &str = "http://api.openweathermap.org/";
const DEFAULT_LOCATION: &str = "karachi";
const DEFAULT_LAT: f64 = 24.8607;
const DEFAULT_LON: f64 = 67.0011;

#[derive(Debug, Parser)]
#[clap(name = "aqi_exporter", version = clap::crate_version!())]
struct AqiExporterApplication {
    /// OpenWeatherMap API key
    #[clap(long, env = "OPENWEATHER_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Base URL for the OpenWeatherMap API
    #[clap(long, default_value = DEFAULT_API_URL)]
    api_url: Url,

    /// Latitude of the location to fetch observations for
    #[clap(long, default_value_t = DEFAULT_LAT, allow_negative_numbers = true)]
    lat: f64,

    /// Longitude of the location to fetch observations for
    #[clap(long, default_value_t = DEFAULT_LON, allow_negative_numbers = true)]
    lon: f64,

    /// Name of the location, used as the "location" label of all metrics
    #[clap(long, default_value_t = DEFAULT_LOCATION.into())]
    location: String,

    /// Path to a JSON file of breakpoint tables to use instead of the US EPA tables
    #[clap(long)]
    standard: Option<PathBuf>,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Fetch observations and forecasts from the OpenWeatherMap API at this interval, in seconds.
    #[clap(long, default_value_t = DEFAULT_REFERSH_SECS)]
    refresh_secs: u64,

    /// Timeout for fetching observations from the OpenWeatherMap API, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// Address to bind to. By default, aqi_exporter will bind to public address since
    /// the purpose is to expose metrics to an external system (Prometheus or another
    /// agent for ingestion)
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = AqiExporterApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let standard = match &opts.standard {
        Some(path) => AqiStandard::from_path(path).unwrap_or_else(|e| {
            tracing::error!(message = "unable to load AQI standard", path = %path.display(), error = %e);
            process::exit(1)
        }),
        None => AqiStandard::us_epa(),
    };

    let timeout = Duration::from_millis(opts.timeout_millis);
    let http_client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    // Make an initial request for current air pollution. This allows us to verify that the
    // API key the user provided is valid and the API is available before starting the HTTP
    // server and running indefinitely.
    let coord = Coordinates {
        lat: opts.lat,
        lon: opts.lon,
    };
    let client = OpenWeatherClient::new(http_client, opts.api_url.clone(), opts.api_key.clone());
    match client.air_pollution(coord).await {
        Err(ClientError::Unauthorized) => {
            tracing::error!(message = "API key rejected by OpenWeatherMap");
            process::exit(1)
        }
        Err(e) => {
            tracing::warn!(message = "failed to fetch initial air pollution observation", error = %e);
        }
        Ok(res) => {
            tracing::debug!(message = "verified API key", coordinates = ?res.coord);
        }
    }

    let mut registry = Registry::default();
    let metrics = AirQualityMetrics::new(&mut registry, opts.location.clone());
    let mut interval = tokio::time::interval(Duration::from_secs(opts.refresh_secs));
    let api_url = opts.api_url.clone();
    let location = opts.location.clone();

    tokio::spawn(async move {
        tracing::info!(
            message = "air quality polling started",
            api_url = %api_url,
            location = %location,
            coordinates = %coord,
            standard = %standard.name,
        );

        loop {
            let _ = interval.tick().await;
            poll(&client, &standard, &metrics, coord)
                .instrument(tracing::span!(Level::DEBUG, "aqi_poll"))
                .await;
        }
    });

    let context = Arc::new(RequestContext::new(registry));
    let app = aqi_forecast::http::router(context);
    let server = axum::Server::try_bind(&opts.bind)
        .unwrap_or_else(|e| {
            tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
            process::exit(1)
        })
        .serve(app.into_make_service());

    tracing::info!(message = "server started", address = %server.local_addr());
    server
        .with_graceful_shutdown(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
            }
        })
        .await?;

    tracing::info!("server shutdown");
    Ok(())
}

/// Fetch current and forecast pollution along with the weather forecast and update metrics.
async fn poll(client: &OpenWeatherClient, standard: &AqiStandard, metrics: &AirQualityMetrics, coord: Coordinates) {
    let weather = match client.weather_forecast(coord).await {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!(message = "failed to fetch weather forecast", error = %e);
            None
        }
    };

    match client.air_pollution(coord).await {
        Ok(res) => {
            let obs = res.list.first().and_then(|entry| {
                let closest = weather.as_ref().and_then(|w| w.closest(entry.dt));
                RawObservation::from_entries(coord, entry, closest)
            });

            match obs {
                Some(obs) => {
                    let report = aqi::report(standard, &obs.pollutants);
                    metrics.observation(&obs, &report);
                    tracing::info!(
                        message = "fetched new observation",
                        timestamp = %obs.timestamp_utc,
                        aqi = ?report.aqi,
                        dominant = ?report.dominant,
                    );
                }
                None => {
                    tracing::warn!(message = "air pollution response did not contain a usable observation");
                }
            }
        }
        Err(e) => {
            tracing::error!(message = "failed to fetch air pollution", error = %e);
        }
    }

    match client.air_pollution_forecast(coord).await {
        Ok(res) => {
            let rows = forecast::forecast(standard, &res, weather.as_ref(), FORECAST_HOURS);
            metrics.forecast(&rows);
            tracing::debug!(
                message = "updated air quality forecast",
                num_hours = rows.len(),
                max_aqi = ?rows.iter().filter_map(|r| r.aqi).max(),
            );
        }
        Err(e) => {
            tracing::error!(message = "failed to fetch air pollution forecast", error = %e);
        }
    }
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
