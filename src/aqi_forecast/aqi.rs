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

//! Computation of an Air Quality Index from pollutant concentrations.
//!
//! Each pollutant concentration (in µg/m³) is converted into the units its breakpoint
//! table is tabulated in, truncated to the table's precision, and linearly interpolated
//! within the matching breakpoint row to give a sub-index. The overall AQI is the
//! largest of the sub-indices (the "dominant pollutant"), never an average.
//!
//! Missing data is never an error. Absent or NaN concentrations, concentrations below
//! the lowest breakpoint, and pollutants without a table all produce `None`. Values
//! above the highest breakpoint saturate at [`MAX_INDEX`].

use crate::standard::{AqiStandard, Pollutant, Units, MAX_INDEX, MOLAR_VOLUME};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pollutant concentrations for a single observation, in µg/m³.
///
/// Deserializes directly from the `components` object of an OpenWeatherMap air pollution
/// response. Missing keys and `null` values become `None`, unrecognized keys are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Concentrations {
    pub pm2_5: Option<f64>,
    pub pm10: Option<f64>,
    pub o3: Option<f64>,
    pub co: Option<f64>,
    pub no2: Option<f64>,
    pub so2: Option<f64>,
}

impl Concentrations {
    /// Build concentrations from `(name, value)` pairs, ignoring names that aren't
    /// one of the recognized pollutants.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let mut out = Self::default();
        for (name, value) in pairs {
            if let Some(p) = Pollutant::from_name(name.as_ref()) {
                out.set(p, Some(value));
            }
        }

        out
    }

    pub fn get(&self, pollutant: Pollutant) -> Option<f64> {
        match pollutant {
            Pollutant::Pm25 => self.pm2_5,
            Pollutant::Pm10 => self.pm10,
            Pollutant::O3 => self.o3,
            Pollutant::Co => self.co,
            Pollutant::No2 => self.no2,
            Pollutant::So2 => self.so2,
        }
    }

    pub fn set(&mut self, pollutant: Pollutant, value: Option<f64>) {
        let slot = match pollutant {
            Pollutant::Pm25 => &mut self.pm2_5,
            Pollutant::Pm10 => &mut self.pm10,
            Pollutant::O3 => &mut self.o3,
            Pollutant::Co => &mut self.co,
            Pollutant::No2 => &mut self.no2,
            Pollutant::So2 => &mut self.so2,
        };

        *slot = value;
    }

    /// True if no pollutant has a usable (non-NaN) value.
    pub fn is_empty(&self) -> bool {
        Pollutant::ALL
            .iter()
            .all(|p| self.get(*p).filter(|v| !v.is_nan()).is_none())
    }
}

/// Convert a concentration in µg/m³ to parts per billion.
///
/// Pollutants without a molar mass in `standard` (particulates) are returned unchanged.
pub fn to_ppb(standard: &AqiStandard, concentration_ugm3: f64, pollutant: Pollutant) -> f64 {
    match standard.molar_mass(pollutant) {
        Some(mw) => (concentration_ugm3 * MOLAR_VOLUME) / mw,
        None => concentration_ugm3,
    }
}

/// Convert a concentration in µg/m³ to parts per million.
pub fn to_ppm(standard: &AqiStandard, concentration_ugm3: f64, pollutant: Pollutant) -> f64 {
    to_ppb(standard, concentration_ugm3, pollutant) / 1000.0
}

fn convert(standard: &AqiStandard, units: Units, concentration_ugm3: f64, pollutant: Pollutant) -> f64 {
    match units {
        Units::Ugm3 => concentration_ugm3,
        Units::Ppb => to_ppb(standard, concentration_ugm3, pollutant),
        Units::Ppm => to_ppm(standard, concentration_ugm3, pollutant),
    }
}

/// Compute the sub-index for a single pollutant.
///
/// The concentration is converted and truncated per the pollutant's table before lookup.
/// The interpolated value is rounded half-to-even. Returns `None` when the concentration
/// is missing or NaN, when `standard` has no table for the pollutant, or when the
/// truncated value is below the table (or falls between two rows). Values above the
/// table return [`MAX_INDEX`].
pub fn sub_index(standard: &AqiStandard, pollutant: Pollutant, concentration: Option<f64>) -> Option<u16> {
    let concentration = concentration.filter(|c| !c.is_nan())?;
    let table = standard.table(pollutant)?;
    let value = table
        .truncation
        .apply(convert(standard, table.units, concentration, pollutant));

    if let Some(b) = table.find(value) {
        return Some(b.interpolate(value).round_ties_even() as u16);
    }

    match table.ceiling() {
        Some(ceiling) if value > ceiling => Some(MAX_INDEX),
        _ => None,
    }
}

/// Like [`sub_index`] but for a pollutant given by name. Unknown names produce `None`.
pub fn sub_index_by_name(standard: &AqiStandard, name: &str, concentration: Option<f64>) -> Option<u16> {
    Pollutant::from_name(name).and_then(|p| sub_index(standard, p, concentration))
}

/// Sub-index for each pollutant of a single observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubIndices {
    values: [Option<u16>; 6],
}

impl SubIndices {
    pub fn get(&self, pollutant: Pollutant) -> Option<u16> {
        self.values[pollutant as usize]
    }

    /// Every pollutant and its sub-index, in [`Pollutant::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (Pollutant, Option<u16>)> + '_ {
        Pollutant::ALL.into_iter().map(move |p| (p, self.get(p)))
    }

    /// Only pollutants that produced a sub-index.
    pub fn defined(&self) -> impl Iterator<Item = (Pollutant, u16)> + '_ {
        self.iter().filter_map(|(p, v)| v.map(|v| (p, v)))
    }

    /// Largest defined sub-index, `None` if there are none.
    pub fn max(&self) -> Option<u16> {
        self.defined().map(|(_, v)| v).max()
    }

    /// Pollutant with the largest sub-index. Ties go to the pollutant that comes first
    /// in [`Pollutant::ALL`].
    pub fn dominant(&self) -> Option<(Pollutant, u16)> {
        let mut best: Option<(Pollutant, u16)> = None;
        for (p, v) in self.defined() {
            if best.map_or(true, |(_, b)| v > b) {
                best = Some((p, v));
            }
        }

        best
    }
}

/// Compute the sub-index of every recognized pollutant in `concentrations`.
pub fn sub_indices(standard: &AqiStandard, concentrations: &Concentrations) -> SubIndices {
    let mut out = SubIndices::default();
    for p in Pollutant::ALL {
        out.values[p as usize] = sub_index(standard, p, concentrations.get(p));
    }

    out
}

/// Overall AQI: the maximum defined sub-index, or `None` when no pollutant produced one.
pub fn overall_aqi(standard: &AqiStandard, concentrations: &Concentrations) -> Option<u16> {
    sub_indices(standard, concentrations).max()
}

/// Overall AQI of an observation along with the sub-indices it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AqiReport {
    pub aqi: Option<u16>,
    pub dominant: Option<Pollutant>,
    pub sub_indices: SubIndices,
}

impl AqiReport {
    pub fn category(&self) -> Option<Category> {
        self.aqi.map(Category::from_index)
    }
}

pub fn report(standard: &AqiStandard, concentrations: &Concentrations) -> AqiReport {
    let sub_indices = sub_indices(standard, concentrations);
    let dominant = sub_indices.dominant();

    AqiReport {
        aqi: dominant.map(|(_, v)| v),
        dominant: dominant.map(|(p, _)| p),
        sub_indices,
    }
}

/// EPA category of an AQI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl Category {
    pub fn from_index(aqi: u16) -> Self {
        match aqi {
            0..=50 => Self::Good,
            51..=100 => Self::Moderate,
            101..=150 => Self::UnhealthyForSensitiveGroups,
            151..=200 => Self::Unhealthy,
            201..=300 => Self::VeryUnhealthy,
            _ => Self::Hazardous,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Moderate => "Moderate",
            Self::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            Self::Unhealthy => "Unhealthy",
            Self::VeryUnhealthy => "Very Unhealthy",
            Self::Hazardous => "Hazardous",
        }
    }

    /// Color used by the EPA for this category.
    pub fn color(&self) -> &'static str {
        match self {
            Self::Good => "green",
            Self::Moderate => "yellow",
            Self::UnhealthyForSensitiveGroups => "orange",
            Self::Unhealthy => "red",
            Self::VeryUnhealthy => "purple",
            Self::Hazardous => "maroon",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
