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
use aqi_forecast::client::{Coordinates, OpenWeatherClient};
use aqi_forecast::features::{self, FeatureRow, RawObservation, ML_GROUP, RAW_GROUP};
use aqi_forecast::forecast::{self, ForecastRow, FORECAST_HOURS};
use aqi_forecast::standard::AqiStandard;
use aqi_forecast::store::FeatureGroup;
use clap::{Args, Parser, Subcommand};
use reqwest::{Client, Url};
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_TIMEOUT_MILLIS: u64 = 5000;
const DEFAULT_API_URL: &str = "http://api.openweathermap.org/";
const DEFAULT_STORE_DIR: &str = "feature_store";
const DEFAULT_LAT: f64 = 24.8607;
const DEFAULT_LON: f64 = 67.0011;
const GROUP_VERSION: u32 = 1;

#[derive(Debug, Parser)]
#[clap(name = "aqi_pipeline", version = clap::crate_version!())]
struct AqiPipelineApplication {
    /// Directory feature groups are read from and written to
    #[clap(long, env = "AQI_STORE_DIR", default_value = DEFAULT_STORE_DIR, global = true)]
    store_dir: PathBuf,

    /// Path to a JSON file of breakpoint tables to use instead of the US EPA tables
    #[clap(long, global = true)]
    standard: Option<PathBuf>,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL, global = true)]
    log_level: Level,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch the latest pollution and weather observation into the raw feature group
    Fetch(ApiOptions),

    /// Compute AQI labels for raw observations and write complete rows to the training feature group
    Features,

    /// Print the AQI computed from forecast pollutant concentrations
    Forecast {
        #[clap(flatten)]
        api: ApiOptions,

        /// Number of hours ahead to print
        #[clap(long, default_value_t = FORECAST_HOURS)]
        hours: usize,

        /// Print rows as JSON instead of a table
        #[clap(long)]
        json: bool,
    },
}

#[derive(Args)]
struct ApiOptions {
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

    /// Timeout for requests to the OpenWeatherMap API, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Fetch(_) => "fetch",
            Command::Features => "features",
            Command::Forecast { .. } => "forecast",
        }
    }
}

impl fmt::Debug for ApiOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiOptions")
            .field("api_key", &"<redacted>")
            .field("api_url", &self.api_url.as_str())
            .field("lat", &self.lat)
            .field("lon", &self.lon)
            .field("timeout_millis", &self.timeout_millis)
            .finish()
    }
}

impl ApiOptions {
    fn coordinates(&self) -> Coordinates {
        Coordinates {
            lat: self.lat,
            lon: self.lon,
        }
    }

    fn client(&self) -> Result<OpenWeatherClient, reqwest::Error> {
        let timeout = Duration::from_millis(self.timeout_millis);
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(OpenWeatherClient::new(http_client, self.api_url.clone(), self.api_key.clone()))
    }
}

#[tokio::main]
async fn main() {
    let opts = AqiPipelineApplication::parse();
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

    let res = match &opts.command {
        Command::Fetch(api) => fetch(api, &standard, &opts.store_dir).await,
        Command::Features => build_features(&standard, &opts.store_dir),
        Command::Forecast { api, hours, json } => print_forecast(api, &standard, *hours, *json).await,
    };

    if let Err(e) = res {
        tracing::error!(message = "pipeline failed", command = opts.command.name(), error = %e);
        process::exit(1);
    }
}

async fn fetch(api: &ApiOptions, standard: &AqiStandard, store_dir: &Path) -> Result<(), Box<dyn Error + Send + Sync>> {
    let client = api.client()?;
    let coord = api.coordinates();

    let pollution = client.air_pollution(coord).await?;
    let weather = match client.weather_forecast(coord).await {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!(message = "failed to fetch weather forecast, storing pollution only", error = %e);
            None
        }
    };

    let entry = pollution.list.first().ok_or("air pollution response was empty")?;
    let closest = weather.as_ref().and_then(|w| w.closest(entry.dt));
    let obs = RawObservation::from_entries(coord, entry, closest).ok_or("invalid observation timestamp")?;
    let report = aqi::report(standard, &obs.pollutants);

    let group: FeatureGroup<RawObservation> = FeatureGroup::new(store_dir, RAW_GROUP, GROUP_VERSION);
    let summary = group.insert(vec![obs.clone()])?;

    tracing::info!(
        message = "stored raw observation",
        group = %group.path().display(),
        timestamp = %obs.timestamp_utc,
        aqi = ?report.aqi,
        dominant = ?report.dominant,
        total = summary.total,
    );

    Ok(())
}

fn build_features(standard: &AqiStandard, store_dir: &Path) -> Result<(), Box<dyn Error + Send + Sync>> {
    let raw: FeatureGroup<RawObservation> = FeatureGroup::new(store_dir, RAW_GROUP, GROUP_VERSION);
    let observations = raw.read()?;
    let set = features::build_features(standard, &observations);

    if set.rows.is_empty() {
        tracing::warn!(
            message = "no complete feature rows to write",
            num_observations = observations.len(),
            unlabeled = set.unlabeled,
            incomplete = set.incomplete,
        );
        return Ok(());
    }

    let ml: FeatureGroup<FeatureRow> = FeatureGroup::new(store_dir, ML_GROUP, GROUP_VERSION);
    let num_rows = set.rows.len();
    let summary = ml.insert(set.rows)?;

    tracing::info!(
        message = "wrote training features",
        group = %ml.path().display(),
        num_rows = num_rows,
        unlabeled = set.unlabeled,
        incomplete = set.incomplete,
        inserted = summary.inserted,
        updated = summary.updated,
    );

    Ok(())
}

async fn print_forecast(
    api: &ApiOptions,
    standard: &AqiStandard,
    hours: usize,
    json: bool,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let client = api.client()?;
    let coord = api.coordinates();

    let pollution = client.air_pollution_forecast(coord).await?;
    let weather = match client.weather_forecast(coord).await {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!(message = "failed to fetch weather forecast", error = %e);
            None
        }
    };

    let rows = forecast::forecast(standard, &pollution, weather.as_ref(), hours);
    if rows.len() < hours {
        tracing::warn!(message = "forecast shorter than requested", requested = hours, available = rows.len());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print_table(&rows);
    }

    Ok(())
}

fn print_table(rows: &[ForecastRow]) {
    println!(
        "{:>5}  {:<16}  {:>8}  {:>8}  {:>8}  {:>6}  {:>4}  {:<6}  category",
        "hours", "time", "pm2_5", "pm10", "o3", "temp", "aqi", "driver"
    );

    for row in rows {
        println!(
            "{:>5}  {:<16}  {:>8}  {:>8}  {:>8}  {:>6}  {:>4}  {:<6}  {}",
            row.hours_ahead,
            row.time.format("%Y-%m-%d %H:%M"),
            opt(row.pm2_5),
            opt(row.pm10),
            opt(row.o3),
            opt(row.temp),
            row.aqi.map(|v| v.to_string()).unwrap_or_else(|| "-".to_owned()),
            row.dominant.map(|p| p.as_str()).unwrap_or("-"),
            row.category.map(|c| c.label()).unwrap_or("-"),
        );
    }
}

fn opt(v: Option<f64>) -> String {
    v.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_owned())
}
