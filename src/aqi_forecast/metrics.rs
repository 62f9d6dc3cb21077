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

use crate::aqi::AqiReport;
use crate::features::RawObservation;
use crate::forecast::ForecastRow;
use crate::standard::Pollutant;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;

type FloatGauge = Gauge<f64, AtomicU64>;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct LocationLabels {
    location: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct PollutantLabels {
    location: String,
    pollutant: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ForecastLabels {
    location: String,
    hours_ahead: String,
}

/// Holder for metrics that can be set from observations and forecasts.
///
/// All metrics are created and registered upon call to `AirQualityMetrics::new()`. Metrics
/// all share the prefix "aqi_" and have a "location" label set to the name of the location
/// being observed (e.g. `{location="karachi"}`).
#[derive(Debug, Clone)]
pub struct AirQualityMetrics {
    location: String,
    index: Family<LocationLabels, FloatGauge>,
    sub_index: Family<PollutantLabels, FloatGauge>,
    concentration: Family<PollutantLabels, FloatGauge>,
    provider_index: Family<LocationLabels, FloatGauge>,
    temperature: Family<LocationLabels, FloatGauge>,
    relative_humidity: Family<LocationLabels, FloatGauge>,
    pressure: Family<LocationLabels, FloatGauge>,
    wind_speed: Family<LocationLabels, FloatGauge>,
    timestamp: Family<LocationLabels, FloatGauge>,
    forecast_index: Family<ForecastLabels, FloatGauge>,
}

impl AirQualityMetrics {
    /// Create a new `AirQualityMetrics` for `location` and register each metric with the
    /// provided `Registry`.
    pub fn new<S: Into<String>>(reg: &mut Registry, location: S) -> Self {
        let index = Family::<LocationLabels, FloatGauge>::default();
        let sub_index = Family::<PollutantLabels, FloatGauge>::default();
        let concentration = Family::<PollutantLabels, FloatGauge>::default();
        let provider_index = Family::<LocationLabels, FloatGauge>::default();
        let temperature = Family::<LocationLabels, FloatGauge>::default();
        let relative_humidity = Family::<LocationLabels, FloatGauge>::default();
        let pressure = Family::<LocationLabels, FloatGauge>::default();
        let wind_speed = Family::<LocationLabels, FloatGauge>::default();
        let timestamp = Family::<LocationLabels, FloatGauge>::default();
        let forecast_index = Family::<ForecastLabels, FloatGauge>::default();

        reg.register(
            "aqi_index",
            "Air quality index (0-500) of the dominant pollutant",
            index.clone(),
        );
        reg.register("aqi_sub_index", "Air quality index of a single pollutant", sub_index.clone());
        reg.register(
            "aqi_concentration_ugm3",
            "Pollutant concentration in micrograms per cubic meter",
            concentration.clone(),
        );
        reg.register(
            "aqi_provider_index",
            "Air quality index reported by OpenWeatherMap (1-5)",
            provider_index.clone(),
        );
        reg.register("aqi_temperature_degrees", "Temperature in celsius", temperature.clone());
        reg.register(
            "aqi_relative_humidity",
            "Relative humidity (0-100)",
            relative_humidity.clone(),
        );
        reg.register("aqi_pressure_hpa", "Atmospheric pressure in hectopascals", pressure.clone());
        reg.register("aqi_wind_speed_mps", "Wind speed in meters per second", wind_speed.clone());
        reg.register(
            "aqi_observation_timestamp_seconds",
            "Time of the most recent observation as a unix timestamp",
            timestamp.clone(),
        );
        reg.register(
            "aqi_forecast_index",
            "Air quality index computed from forecast pollutant concentrations",
            forecast_index.clone(),
        );

        Self {
            location: location.into(),
            index,
            sub_index,
            concentration,
            provider_index,
            temperature,
            relative_humidity,
            pressure,
            wind_speed,
            timestamp,
            forecast_index,
        }
    }

    /// Set metrics from the provided observation and the AQI computed from it.
    ///
    /// If the observation doesn't contain a value for a particular metric, or no AQI could
    /// be computed, the metric will not be updated.
    pub fn observation(&self, obs: &RawObservation, report: &AqiReport) {
        if let Some(aqi) = report.aqi {
            self.set(&self.index, Some(f64::from(aqi)));
        }

        for (p, v) in report.sub_indices.defined() {
            self.sub_index
                .get_or_create(&self.pollutant_labels(p))
                .set(f64::from(v));
        }

        for p in Pollutant::ALL {
            if let Some(c) = obs.pollutants.get(p).filter(|c| !c.is_nan()) {
                self.concentration.get_or_create(&self.pollutant_labels(p)).set(c);
            }
        }

        self.set(&self.provider_index, obs.aqi.map(f64::from));
        self.set(&self.temperature, obs.temp);
        self.set(&self.relative_humidity, obs.humidity);
        self.set(&self.pressure, obs.pressure);
        self.set(&self.wind_speed, obs.wind_speed);
        self.set(&self.timestamp, Some(obs.timestamp_int as f64));
    }

    /// Set the forecast AQI for each hour that has one.
    pub fn forecast(&self, rows: &[ForecastRow]) {
        for row in rows {
            if let Some(aqi) = row.aqi {
                let labels = ForecastLabels {
                    location: self.location.clone(),
                    hours_ahead: row.hours_ahead.to_string(),
                };

                self.forecast_index.get_or_create(&labels).set(f64::from(aqi));
            }
        }
    }

    fn set(&self, gauge: &Family<LocationLabels, FloatGauge>, value: Option<f64>) {
        if let Some(v) = value.filter(|v| !v.is_nan()) {
            let labels = LocationLabels {
                location: self.location.clone(),
            };

            gauge.get_or_create(&labels).set(v);
        }
    }

    fn pollutant_labels(&self, pollutant: Pollutant) -> PollutantLabels {
        PollutantLabels {
            location: self.location.clone(),
            pollutant: pollutant.as_str().to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aqi::{self, Concentrations};
    use crate::standard::AqiStandard;
    use chrono::{DateTime, Utc};
    use prometheus_client::encoding::text::encode;

    fn observation() -> RawObservation {
        RawObservation {
            timestamp_int: 1700000000,
            timestamp_utc: DateTime::<Utc>::from_timestamp(1700000000, 0).unwrap(),
            latitude: 24.8607,
            longitude: 67.0011,
            aqi: Some(5),
            pollutants: Concentrations {
                pm2_5: Some(12.0),
                pm10: Some(600.0),
                co: Some(5000.0),
                ..Default::default()
            },
            temp: Some(27.5),
            feels_like: None,
            pressure: Some(1012.0),
            humidity: None,
            wind_speed: Some(3.5),
            clouds: None,
        }
    }

    #[test]
    fn test_observation_metrics() {
        let mut registry = Registry::default();
        let metrics = AirQualityMetrics::new(&mut registry, "karachi");
        let obs = observation();
        let report = aqi::report(&AqiStandard::us_epa(), &obs.pollutants);

        metrics.observation(&obs, &report);

        let mut buf = String::new();
        encode(&mut buf, &registry).unwrap();

        assert!(buf.contains("aqi_index{location=\"karachi\"} 496"), "{}", buf);
        assert!(buf.contains("aqi_sub_index{location=\"karachi\",pollutant=\"pm2_5\"} 56"));
        assert!(buf.contains("aqi_sub_index{location=\"karachi\",pollutant=\"co\"} 49"));
        assert!(buf.contains("aqi_concentration_ugm3{location=\"karachi\",pollutant=\"pm10\"} 600"));
        assert!(buf.contains("aqi_temperature_degrees{location=\"karachi\"} 27.5"));
        assert!(buf.contains("aqi_provider_index{location=\"karachi\"} 5"));
        assert!(!buf.contains("pollutant=\"o3\""));
        assert!(!buf.contains("aqi_relative_humidity{"));
    }

    #[test]
    fn test_undefined_aqi_leaves_gauge_unset() {
        let mut registry = Registry::default();
        let metrics = AirQualityMetrics::new(&mut registry, "karachi");
        let mut obs = observation();
        obs.pollutants = Concentrations::default();
        let report = aqi::report(&AqiStandard::us_epa(), &obs.pollutants);

        metrics.observation(&obs, &report);

        let mut buf = String::new();
        encode(&mut buf, &registry).unwrap();

        assert!(!buf.contains("aqi_index{"));
        assert!(buf.contains("aqi_observation_timestamp_seconds{location=\"karachi\"} "));
    }
}
