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

//! Air quality index engine, feature pipeline, and Prometheus exporter for OpenWeatherMap data
//!
//! ## Features
//!
//! `aqi_forecast` fetches pollutant concentrations and weather for a location using the
//! [OpenWeatherMap] API and derives an EPA-style Air Quality Index from them. Each pollutant's
//! concentration is converted into the units of its breakpoint table, truncated, and mapped to a
//! sub-index. The overall AQI is the sub-index of the dominant (worst) pollutant.
//!
//! Two programs are included:
//!
//! * `aqi_exporter` - polls the API and emits the current and forecast AQI as Prometheus metrics.
//! * `aqi_pipeline` - fetches observations into a local feature store, builds labelled training
//!   features from them, and prints a 72 hour AQI forecast.
//!
//! The following metrics are emitted by `aqi_exporter` when available.
//!
//! * `aqi_index{location=$LOCATION}` - AQI of the dominant pollutant (0-500).
//! * `aqi_sub_index{location=$LOCATION, pollutant=$POLLUTANT}` - AQI of a single pollutant.
//! * `aqi_concentration_ugm3{location=$LOCATION, pollutant=$POLLUTANT}` - Concentration in µg/m³.
//! * `aqi_provider_index{location=$LOCATION}` - Index reported by OpenWeatherMap (1-5).
//! * `aqi_temperature_degrees{location=$LOCATION}` - Temperature, in degrees celsius.
//! * `aqi_relative_humidity{location=$LOCATION}` - Relative humidity (0-100).
//! * `aqi_pressure_hpa{location=$LOCATION}` - Atmospheric pressure, in hectopascals.
//! * `aqi_wind_speed_mps{location=$LOCATION}` - Wind speed, in meters per second.
//! * `aqi_observation_timestamp_seconds{location=$LOCATION}` - Time of the latest observation.
//! * `aqi_forecast_index{location=$LOCATION, hours_ahead=$HOURS}` - Forecast AQI, up to 72 hours.
//!
//! [OpenWeatherMap]: https://openweathermap.org/api/air-pollution
//!
//! ## Build
//!
//! `aqi_forecast` is a Rust program and must be built from source using a [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! git clone git@github.com:56quarters/aqi_forecast.git && cd aqi_forecast
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! Both programs need an OpenWeatherMap API key, passed with `--api-key` or the
//! `OPENWEATHER_API_KEY` environment variable. The location defaults to Karachi and can be
//! changed with `--lat` and `--lon`.
//!
//! ### Exporter
//!
//! ```text
//! ./aqi_exporter --location boston --lat 42.36 --lon -71.06
//! ```
//!
//! Prometheus metrics are exposed on port `9783` at `/metrics`.
//!
//! ### Pipeline
//!
//! ```text
//! ./aqi_pipeline fetch      # store the latest observation
//! ./aqi_pipeline features   # compute labels and write training features
//! ./aqi_pipeline forecast   # print the AQI for the next 72 hours
//! ```
//!
//! Feature groups are written as JSON Lines files under `--store-dir` (`feature_store` by default).
//!
//! ### Alternate standards
//!
//! The US EPA breakpoints are used by default. Breakpoints for another jurisdiction can be
//! supplied as JSON with `--standard path/to/standard.json`, in the format produced by
//! serializing a [`standard::AqiStandard`].
//!

pub mod aqi;
pub mod client;
pub mod features;
pub mod forecast;
pub mod http;
pub mod metrics;
pub mod standard;
pub mod store;
