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

//! Assembly of raw observations and the feature/label pipeline used for model training.

use crate::aqi::{self, Concentrations};
use crate::client::{Coordinates, PollutionEntry, WeatherEntry};
use crate::standard::AqiStandard;
use crate::store::Keyed;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Feature group raw observations are stored in.
pub const RAW_GROUP: &str = "aqi_weather_data_hourly";

/// Feature group training features and labels are stored in.
pub const ML_GROUP: &str = "aqi_ml_training_features";

/// Names of the model input columns, in the order returned by [`FeatureRow::features`].
pub const FEATURE_NAMES: [&str; 6] = ["pm2_5", "pm10", "o3", "temp", "hour_of_day", "day_of_month"];

/// A pollution observation combined with the weather closest to it in time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RawObservation {
    pub timestamp_int: i64,
    pub timestamp_utc: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    /// Index reported by OpenWeatherMap (1-5), not the computed AQI.
    pub aqi: Option<u8>,
    #[serde(flatten)]
    pub pollutants: Concentrations,
    pub temp: Option<f64>,
    pub feels_like: Option<f64>,
    pub pressure: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub clouds: Option<f64>,
}

impl RawObservation {
    /// Combine a pollution entry and (optionally) a weather entry. Returns `None` if the
    /// pollution timestamp can't be represented as a UTC date.
    pub fn from_entries(coord: Coordinates, pollution: &PollutionEntry, weather: Option<&WeatherEntry>) -> Option<Self> {
        let timestamp_utc = DateTime::<Utc>::from_timestamp(pollution.dt, 0)?;
        let main = weather.map(|w| w.main.clone()).unwrap_or_default();

        Some(RawObservation {
            timestamp_int: pollution.dt,
            timestamp_utc,
            latitude: coord.lat,
            longitude: coord.lon,
            aqi: pollution.provider_aqi(),
            pollutants: pollution.components,
            temp: main.temp,
            feels_like: main.feels_like,
            pressure: main.pressure,
            humidity: main.humidity,
            wind_speed: weather.and_then(|w| w.wind.as_ref()).and_then(|w| w.speed),
            clouds: weather.and_then(|w| w.clouds.as_ref()).and_then(|c| c.all),
        })
    }
}

impl Keyed for RawObservation {
    fn primary_key(&self) -> i64 {
        self.timestamp_int
    }
}

/// Model inputs for a single hour along with the AQI computed for it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub timestamp_int: i64,
    pub pm2_5: f64,
    pub pm10: f64,
    pub o3: f64,
    pub temp: f64,
    pub hour_of_day: u32,
    pub day_of_month: u32,
    pub calculated_aqi: u16,
}

impl FeatureRow {
    /// Build a row from a raw observation, `None` if the AQI is undefined or any
    /// feature column is missing. Missing values are never imputed.
    pub fn from_observation(standard: &AqiStandard, obs: &RawObservation) -> Option<Self> {
        Self::labeled(obs, aqi::overall_aqi(standard, &obs.pollutants)?)
    }

    /// Build a row using an AQI label that has already been computed.
    pub fn labeled(obs: &RawObservation, calculated_aqi: u16) -> Option<Self> {
        let defined = |v: Option<f64>| v.filter(|v| !v.is_nan());

        Some(FeatureRow {
            timestamp_int: obs.timestamp_int,
            pm2_5: defined(obs.pollutants.pm2_5)?,
            pm10: defined(obs.pollutants.pm10)?,
            o3: defined(obs.pollutants.o3)?,
            temp: defined(obs.temp)?,
            hour_of_day: obs.timestamp_utc.hour(),
            day_of_month: obs.timestamp_utc.day(),
            calculated_aqi,
        })
    }

    /// Model inputs in [`FEATURE_NAMES`] order.
    pub fn features(&self) -> [f64; 6] {
        [
            self.pm2_5,
            self.pm10,
            self.o3,
            self.temp,
            f64::from(self.hour_of_day),
            f64::from(self.day_of_month),
        ]
    }
}

impl Keyed for FeatureRow {
    fn primary_key(&self) -> i64 {
        self.timestamp_int
    }
}

/// Result of running the feature pipeline over a set of raw observations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    /// Complete rows ordered by timestamp.
    pub rows: Vec<FeatureRow>,
    /// Observations dropped because no pollutant produced a sub-index.
    pub unlabeled: usize,
    /// Observations with an AQI that were dropped for a missing feature.
    pub incomplete: usize,
}

/// Compute labels and features for each raw observation, dropping any row that isn't complete.
pub fn build_features(standard: &AqiStandard, observations: &[RawObservation]) -> FeatureSet {
    let mut sorted: Vec<&RawObservation> = observations.iter().collect();
    sorted.sort_by_key(|o| o.timestamp_int);

    let mut out = FeatureSet::default();
    for obs in sorted {
        let calculated_aqi = match aqi::overall_aqi(standard, &obs.pollutants) {
            Some(v) => v,
            None => {
                out.unlabeled += 1;
                continue;
            }
        };

        match FeatureRow::labeled(obs, calculated_aqi) {
            Some(row) => out.rows.push(row),
            None => out.incomplete += 1,
        }
    }

    tracing::debug!(
        message = "built feature rows",
        num_observations = observations.len(),
        num_rows = out.rows.len(),
        unlabeled = out.unlabeled,
        incomplete = out.incomplete,
    );

    out
}
