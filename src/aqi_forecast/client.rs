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

use crate::aqi::Concentrations;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::error;
use std::fmt;

#[derive(Debug)]
pub enum ClientError {
    Internal(reqwest::Error),
    Unauthorized,
    Unexpected(StatusCode, Url),
    NoData(Url),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::Unauthorized => write!(f, "API key rejected"),
            Self::Unexpected(status, url) => write!(f, "unexpected status {} for {}", status, url),
            Self::NoData(url) => write!(f, "no entries returned for {}", url),
        }
    }
}

impl error::Error for ClientError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            _ => None,
        }
    }
}

/// Location to fetch observations and forecasts for.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lon)
    }
}

/// Client for the air pollution and weather forecast endpoints of the OpenWeatherMap API.
///
/// The API key is sent as a query parameter on every request. URLs included in errors
/// and log messages have their query string removed so the key is never emitted.
#[derive(Debug)]
pub struct OpenWeatherClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl OpenWeatherClient {
    const USER_AGENT: &'static str = "aqi_forecast (https://github.com/56quarters/aqi_forecast)";
    const JSON_RESPONSE: &'static str = "application/json";

    pub fn new<S: Into<String>>(client: Client, base_url: Url, api_key: S) -> Self {
        OpenWeatherClient {
            client,
            base_url,
            api_key: api_key.into(),
        }
    }

    /// Current pollutant concentrations at `coord`.
    pub async fn air_pollution(&self, coord: Coordinates) -> Result<PollutionResponse, ClientError> {
        let request_url = self.url(&["data", "2.5", "air_pollution"], coord, false);
        tracing::debug!(message = "making current air pollution request", url = %redact(&request_url));

        let res: PollutionResponse = self.make_request(request_url.clone()).await?;
        if res.list.is_empty() {
            return Err(ClientError::NoData(redact(&request_url)));
        }

        Ok(res)
    }

    /// Hourly forecast of pollutant concentrations at `coord`, about four days ahead.
    pub async fn air_pollution_forecast(&self, coord: Coordinates) -> Result<PollutionResponse, ClientError> {
        let request_url = self.url(&["data", "2.5", "air_pollution", "forecast"], coord, false);
        tracing::debug!(message = "making air pollution forecast request", url = %redact(&request_url));

        let res: PollutionResponse = self.make_request(request_url.clone()).await?;
        if res.list.is_empty() {
            return Err(ClientError::NoData(redact(&request_url)));
        }

        Ok(res)
    }

    /// Weather forecast in three hour steps at `coord`, in metric units.
    pub async fn weather_forecast(&self, coord: Coordinates) -> Result<WeatherResponse, ClientError> {
        let request_url = self.url(&["data", "2.5", "forecast"], coord, true);
        tracing::debug!(message = "making weather forecast request", url = %redact(&request_url));

        let res: WeatherResponse = self.make_request(request_url.clone()).await?;
        if res.list.is_empty() {
            return Err(ClientError::NoData(redact(&request_url)));
        }

        Ok(res)
    }

    async fn make_request<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
        let res = self
            .client
            .get(url.clone())
            .header(USER_AGENT, Self::USER_AGENT)
            .header(ACCEPT, Self::JSON_RESPONSE)
            .send()
            .await
            .map_err(|e| ClientError::Internal(e.without_url()))?;

        let status = res.status();
        if status == StatusCode::OK {
            res.json::<T>()
                .await
                .map_err(|e| ClientError::Internal(e.without_url()))
        } else if status == StatusCode::UNAUTHORIZED {
            Err(ClientError::Unauthorized)
        } else {
            Err(ClientError::Unexpected(status, redact(&url)))
        }
    }

    fn url(&self, path: &[&str], coord: Coordinates, metric: bool) -> Url {
        let mut url = self.base_url.clone();
        {
            url.path_segments_mut()
                .map(|mut p| {
                    p.clear().extend(path);
                })
                .expect("unable to modify URL path segments");
        }

        {
            let mut query = url.query_pairs_mut();
            query
                .clear()
                .append_pair("lat", &coord.lat.to_string())
                .append_pair("lon", &coord.lon.to_string())
                .append_pair("appid", &self.api_key);

            if metric {
                query.append_pair("units", "metric");
            }
        }

        url
    }
}

/// Copy of `url` without a query string, safe to log or include in errors.
fn redact(url: &Url) -> Url {
    let mut out = url.clone();
    out.set_query(None);
    out
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PollutionResponse {
    #[serde(default)]
    pub coord: Option<Coordinates>,
    #[serde(default)]
    pub list: Vec<PollutionEntry>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PollutionEntry {
    pub dt: i64,
    #[serde(default)]
    pub main: Option<PollutionMain>,
    #[serde(default)]
    pub components: Concentrations,
}

impl PollutionEntry {
    /// Index reported by OpenWeatherMap itself (1 = good through 5 = very poor).
    pub fn provider_aqi(&self) -> Option<u8> {
        self.main.as_ref().and_then(|m| m.aqi)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PollutionMain {
    pub aqi: Option<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WeatherResponse {
    #[serde(default)]
    pub list: Vec<WeatherEntry>,
}

impl WeatherResponse {
    /// Entry closest in time to `dt`. The earliest entry wins when two are equally close.
    pub fn closest(&self, dt: i64) -> Option<&WeatherEntry> {
        self.list.iter().min_by_key(|w| w.dt.abs_diff(dt))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WeatherEntry {
    pub dt: i64,
    #[serde(default)]
    pub main: WeatherMain,
    #[serde(default)]
    pub wind: Option<Wind>,
    #[serde(default)]
    pub clouds: Option<Clouds>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct WeatherMain {
    pub temp: Option<f64>,
    pub feels_like: Option<f64>,
    pub pressure: Option<f64>,
    pub humidity: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Wind {
    pub speed: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Clouds {
    pub all: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLLUTION: &str = r#"{
        "coord": {"lon": 67.0011, "lat": 24.8607},
        "list": [
            {
                "main": {"aqi": 3},
                "components": {
                    "co": 5000.0, "no": 0.01, "no2": 12.34, "o3": 100.0,
                    "so2": 8.1, "pm2_5": 12.0, "pm10": 600.0, "nh3": 4.2
                },
                "dt": 1700000000
            }
        ]
    }"#;

    const WEATHER: &str = r#"{
        "cod": "200",
        "list": [
            {
                "dt": 1699995600,
                "main": {"temp": 27.1, "feels_like": 28.0, "pressure": 1012, "humidity": 40},
                "wind": {"speed": 3.5, "deg": 200},
                "clouds": {"all": 0}
            },
            {
                "dt": 1700006400,
                "main": {"temp": 25.4, "feels_like": 25.9, "pressure": 1013, "humidity": 48},
                "wind": {"speed": 2.1, "deg": 180},
                "clouds": {"all": 20}
            }
        ]
    }"#;

    fn client() -> OpenWeatherClient {
        OpenWeatherClient::new(
            Client::new(),
            Url::parse("http://api.openweathermap.org/").unwrap(),
            "secret-key",
        )
    }

    #[test]
    fn test_url_pollution() {
        let coord = Coordinates { lat: 24.8607, lon: 67.0011 };
        let url = client().url(&["data", "2.5", "air_pollution", "forecast"], coord, false);

        assert_eq!(
            "http://api.openweathermap.org/data/2.5/air_pollution/forecast?lat=24.8607&lon=67.0011&appid=secret-key",
            url.as_str()
        );
    }

    #[test]
    fn test_url_weather_metric() {
        let coord = Coordinates { lat: -1.5, lon: 2.0 };
        let url = client().url(&["data", "2.5", "forecast"], coord, true);

        assert_eq!(
            "http://api.openweathermap.org/data/2.5/forecast?lat=-1.5&lon=2&appid=secret-key&units=metric",
            url.as_str()
        );
    }

    #[test]
    fn test_redact_removes_key() {
        let coord = Coordinates { lat: 1.0, lon: 2.0 };
        let url = redact(&client().url(&["data", "2.5", "air_pollution"], coord, false));

        assert_eq!("http://api.openweathermap.org/data/2.5/air_pollution", url.as_str());
    }

    #[test]
    fn test_parse_pollution() {
        let res: PollutionResponse = serde_json::from_str(POLLUTION).unwrap();
        let entry = &res.list[0];

        assert_eq!(Some(Coordinates { lat: 24.8607, lon: 67.0011 }), res.coord);
        assert_eq!(1700000000, entry.dt);
        assert_eq!(Some(3), entry.provider_aqi());
        assert_eq!(Some(12.0), entry.components.pm2_5);
        assert_eq!(Some(5000.0), entry.components.co);
    }

    #[test]
    fn test_parse_pollution_missing_fields() {
        let json = r#"{"list": [{"dt": 1, "components": {"pm10": null}}, {"dt": 2}]}"#;
        let res: PollutionResponse = serde_json::from_str(json).unwrap();

        assert_eq!(None, res.coord);
        assert_eq!(None, res.list[0].provider_aqi());
        assert!(res.list[0].components.is_empty());
        assert!(res.list[1].components.is_empty());
    }

    #[test]
    fn test_parse_weather_and_closest() {
        let res: WeatherResponse = serde_json::from_str(WEATHER).unwrap();
        assert_eq!(2, res.list.len());

        let closest = res.closest(1700000000).unwrap();
        assert_eq!(1699995600, closest.dt);
        assert_eq!(Some(27.1), closest.main.temp);
        assert_eq!(Some(1012.0), closest.main.pressure);

        let closest = res.closest(1700006000).unwrap();
        assert_eq!(1700006400, closest.dt);
        assert_eq!(Some(20.0), closest.clouds.as_ref().and_then(|c| c.all));
    }

    #[test]
    fn test_closest_tie_prefers_earliest() {
        let res: WeatherResponse = serde_json::from_str(WEATHER).unwrap();
        let midpoint = (1699995600 + 1700006400) / 2;
        assert_eq!(1699995600, res.closest(midpoint).unwrap().dt);
    }

    #[test]
    fn test_closest_extreme_timestamps() {
        let json = format!(r#"{{"list": [{{"dt": {}}}, {{"dt": 1700000000}}]}}"#, i64::MIN);
        let res: WeatherResponse = serde_json::from_str(&json).unwrap();

        assert_eq!(1700000000, res.closest(i64::MAX).unwrap().dt);
        assert_eq!(i64::MIN, res.closest(i64::MIN).unwrap().dt);
    }

    #[test]
    fn test_closest_empty() {
        let res = WeatherResponse { list: vec![] };
        assert!(res.closest(0).is_none());
    }
}
