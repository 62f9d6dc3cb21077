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

use crate::aqi::{self, Category};
use crate::client::{PollutionResponse, WeatherResponse};
use crate::standard::{AqiStandard, Pollutant};
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::Serialize;

/// Number of hours ahead a forecast covers by default.
pub const FORECAST_HOURS: usize = 72;

/// Computed AQI for a single forecast hour.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ForecastRow {
    pub hours_ahead: usize,
    pub time: DateTime<Utc>,
    pub pm2_5: Option<f64>,
    pub pm10: Option<f64>,
    pub o3: Option<f64>,
    pub temp: Option<f64>,
    pub hour: u32,
    pub day: u32,
    pub aqi: Option<u16>,
    pub dominant: Option<Pollutant>,
    pub category: Option<Category>,
}

/// Compute the AQI for each of the next `hours` hours of a pollution forecast.
///
/// Hour `n` uses the `n`th hourly pollution entry paired with the weather entry closest
/// to it in time. Fewer than `hours` rows are returned when the forecast is shorter.
pub fn forecast(
    standard: &AqiStandard,
    pollution: &PollutionResponse,
    weather: Option<&WeatherResponse>,
    hours: usize,
) -> Vec<ForecastRow> {
    let mut rows = Vec::with_capacity(hours.min(pollution.list.len()));

    for (i, entry) in pollution.list.iter().take(hours).enumerate() {
        let time = match DateTime::<Utc>::from_timestamp(entry.dt, 0) {
            Some(t) => t,
            None => {
                tracing::warn!(message = "skipping forecast entry with invalid timestamp", dt = entry.dt);
                continue;
            }
        };

        let report = aqi::report(standard, &entry.components);
        let temp = weather.and_then(|w| w.closest(entry.dt)).and_then(|w| w.main.temp);

        rows.push(ForecastRow {
            hours_ahead: i + 1,
            time,
            pm2_5: entry.components.pm2_5,
            pm10: entry.components.pm10,
            o3: entry.components.o3,
            temp,
            hour: time.hour(),
            day: time.day(),
            aqi: report.aqi,
            dominant: report.dominant,
            category: report.category(),
        });
    }

    rows
}
