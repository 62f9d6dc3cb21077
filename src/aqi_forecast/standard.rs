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

//! Reference data used to compute an AQI: breakpoint tables and molar masses.
//!
//! Tables are plain data inside an [`AqiStandard`] that callers pass explicitly to the
//! functions in [`crate::aqi`]. [`AqiStandard::us_epa`] builds the default US EPA tables,
//! alternate standards can be loaded from JSON and are validated before use.

use serde::{Deserialize, Serialize};
use std::error;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Highest value any sub-index or overall AQI can take.
pub const MAX_INDEX: u16 = 500;

/// Molar volume of an ideal gas (L/mol) at 25°C and 1 atm.
pub const MOLAR_VOLUME: f64 = 24.45;

/// One of the six pollutants an AQI is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Pollutant {
    #[serde(rename = "pm2_5")]
    Pm25,
    #[serde(rename = "pm10")]
    Pm10,
    #[serde(rename = "o3")]
    O3,
    #[serde(rename = "co")]
    Co,
    #[serde(rename = "no2")]
    No2,
    #[serde(rename = "so2")]
    So2,
}

impl Pollutant {
    /// Every pollutant, in the order sub-indices are computed and reported.
    pub const ALL: [Pollutant; 6] = [
        Pollutant::Pm25,
        Pollutant::Pm10,
        Pollutant::O3,
        Pollutant::Co,
        Pollutant::No2,
        Pollutant::So2,
    ];

    /// Name of the pollutant as used by the OpenWeatherMap API and the feature store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pm25 => "pm2_5",
            Self::Pm10 => "pm10",
            Self::O3 => "o3",
            Self::Co => "co",
            Self::No2 => "no2",
            Self::So2 => "so2",
        }
    }

    /// Look up a pollutant by name, `None` for anything that isn't one of the six.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == name)
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Units a breakpoint table is tabulated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// Micrograms per cubic meter, the units concentrations are reported in.
    Ugm3,
    /// Parts per billion.
    Ppb,
    /// Parts per million.
    Ppm,
}

/// Precision concentrations are truncated (not rounded) to before lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Truncation {
    Tenths,
    Integer,
}

impl Truncation {
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            Self::Tenths => (value * 10.0).floor() / 10.0,
            Self::Integer => value.floor(),
        }
    }
}

/// A single row of a breakpoint table, mapping an inclusive concentration range
/// to an inclusive index range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub concentration: (f64, f64),
    pub index: (u16, u16),
}

impl Breakpoint {
    pub const fn new(conc_low: f64, conc_high: f64, index_low: u16, index_high: u16) -> Self {
        Breakpoint {
            concentration: (conc_low, conc_high),
            index: (index_low, index_high),
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.concentration.0 <= value && value <= self.concentration.1
    }

    /// Linear interpolation of `value` into this row's index range, not yet rounded.
    pub fn interpolate(&self, value: f64) -> f64 {
        let (cl, ch) = self.concentration;
        let (il, ih) = (f64::from(self.index.0), f64::from(self.index.1));
        ((ih - il) / (ch - cl)) * (value - cl) + il
    }
}

/// Breakpoints for a single pollutant along with how concentrations must be
/// prepared before they are looked up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollutantTable {
    pub pollutant: Pollutant,
    pub units: Units,
    pub truncation: Truncation,
    pub breakpoints: Vec<Breakpoint>,
}

impl PollutantTable {
    pub fn new(pollutant: Pollutant, units: Units, truncation: Truncation, breakpoints: &[Breakpoint]) -> Self {
        PollutantTable {
            pollutant,
            units,
            truncation,
            breakpoints: breakpoints.to_vec(),
        }
    }

    /// Row containing `value`, if any.
    pub fn find(&self, value: f64) -> Option<&Breakpoint> {
        self.breakpoints.iter().find(|b| b.contains(value))
    }

    /// Lowest concentration covered by the table.
    pub fn floor(&self) -> Option<f64> {
        self.breakpoints.first().map(|b| b.concentration.0)
    }

    /// Highest concentration covered by the table. Anything above saturates at `MAX_INDEX`.
    pub fn ceiling(&self) -> Option<f64> {
        self.breakpoints.last().map(|b| b.concentration.1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MolarMass {
    pub pollutant: Pollutant,
    pub grams_per_mole: f64,
}

#[derive(Debug)]
pub enum StandardError {
    Io(io::Error),
    Parse(serde_json::Error),
    EmptyTable(Pollutant),
    DuplicateTable(Pollutant),
    InvalidRange(Pollutant, usize),
    Overlap(Pollutant, usize),
    InvalidMolarMass(Pollutant),
}

impl fmt::Display for StandardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "unable to read standard: {}", e),
            Self::Parse(e) => write!(f, "unable to parse standard: {}", e),
            Self::EmptyTable(p) => write!(f, "breakpoint table for {} is empty", p),
            Self::DuplicateTable(p) => write!(f, "more than one breakpoint table for {}", p),
            Self::InvalidRange(p, row) => write!(f, "invalid range in row {} of {} breakpoints", row, p),
            Self::Overlap(p, row) => write!(f, "row {} of {} breakpoints overlaps the previous row", row, p),
            Self::InvalidMolarMass(p) => write!(f, "invalid molar mass for {}", p),
        }
    }
}

impl error::Error for StandardError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

const EPA_CO: [Breakpoint; 7] = [
    Breakpoint::new(0.0, 4.4, 0, 50),
    Breakpoint::new(4.5, 9.4, 51, 100),
    Breakpoint::new(9.5, 12.4, 101, 150),
    Breakpoint::new(12.5, 15.4, 151, 200),
    Breakpoint::new(15.5, 30.4, 201, 300),
    Breakpoint::new(30.5, 40.4, 301, 400),
    Breakpoint::new(40.5, 50.4, 401, 500),
];

const EPA_NO2: [Breakpoint; 7] = [
    Breakpoint::new(0.0, 53.0, 0, 50),
    Breakpoint::new(54.0, 100.0, 51, 100),
    Breakpoint::new(101.0, 360.0, 101, 150),
    Breakpoint::new(361.0, 649.0, 151, 200),
    Breakpoint::new(650.0, 1249.0, 201, 300),
    Breakpoint::new(1250.0, 1649.0, 301, 400),
    Breakpoint::new(1650.0, 2049.0, 401, 500),
];

// 8-hour ozone is only defined up to the "very unhealthy" band
const EPA_O3: [Breakpoint; 5] = [
    Breakpoint::new(0.0, 54.0, 0, 50),
    Breakpoint::new(55.0, 70.0, 51, 100),
    Breakpoint::new(71.0, 85.0, 101, 150),
    Breakpoint::new(86.0, 105.0, 151, 200),
    Breakpoint::new(106.0, 200.0, 201, 300),
];

const EPA_SO2: [Breakpoint; 7] = [
    Breakpoint::new(0.0, 35.0, 0, 50),
    Breakpoint::new(36.0, 75.0, 51, 100),
    Breakpoint::new(76.0, 185.0, 101, 150),
    Breakpoint::new(186.0, 304.0, 151, 200),
    Breakpoint::new(305.0, 604.0, 201, 300),
    Breakpoint::new(605.0, 804.0, 301, 400),
    Breakpoint::new(805.0, 1004.0, 401, 500),
];

// PM2.5 breakpoints as updated by the EPA in 2024
const EPA_PM25: [Breakpoint; 7] = [
    Breakpoint::new(0.0, 9.0, 0, 50),
    Breakpoint::new(9.1, 35.4, 51, 100),
    Breakpoint::new(35.5, 55.4, 101, 150),
    Breakpoint::new(55.5, 150.4, 151, 200),
    Breakpoint::new(150.5, 250.4, 201, 300),
    Breakpoint::new(250.5, 350.4, 301, 400),
    Breakpoint::new(350.5, 500.4, 401, 500),
];

const EPA_PM10: [Breakpoint; 7] = [
    Breakpoint::new(0.0, 54.0, 0, 50),
    Breakpoint::new(55.0, 154.0, 51, 100),
    Breakpoint::new(155.0, 254.0, 101, 150),
    Breakpoint::new(255.0, 354.0, 151, 200),
    Breakpoint::new(355.0, 424.0, 201, 300),
    Breakpoint::new(425.0, 504.0, 301, 400),
    Breakpoint::new(505.0, 604.0, 401, 500),
];

const EPA_MOLAR_MASSES: [MolarMass; 4] = [
    MolarMass {
        pollutant: Pollutant::Co,
        grams_per_mole: 28.01,
    },
    MolarMass {
        pollutant: Pollutant::O3,
        grams_per_mole: 48.00,
    },
    MolarMass {
        pollutant: Pollutant::No2,
        grams_per_mole: 46.01,
    },
    MolarMass {
        pollutant: Pollutant::So2,
        grams_per_mole: 64.07,
    },
];

/// Complete set of reference data needed to compute sub-indices for each pollutant.
///
/// Instances are immutable once built. Construct one with [`AqiStandard::us_epa`], or
/// via [`AqiStandard::new`] / [`AqiStandard::from_path`] for other jurisdictions, both of
/// which reject tables that aren't ascending and contiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AqiStandard {
    pub name: String,
    pub molar_masses: Vec<MolarMass>,
    pub tables: Vec<PollutantTable>,
}

impl AqiStandard {
    pub fn new<S: Into<String>>(
        name: S,
        molar_masses: Vec<MolarMass>,
        tables: Vec<PollutantTable>,
    ) -> Result<Self, StandardError> {
        let standard = AqiStandard {
            name: name.into(),
            molar_masses,
            tables,
        };

        standard.validate()?;
        Ok(standard)
    }

    /// US EPA breakpoints, the default standard.
    pub fn us_epa() -> Self {
        AqiStandard {
            name: "us_epa".to_owned(),
            molar_masses: EPA_MOLAR_MASSES.to_vec(),
            tables: vec![
                PollutantTable::new(Pollutant::Pm25, Units::Ugm3, Truncation::Tenths, &EPA_PM25),
                PollutantTable::new(Pollutant::Pm10, Units::Ugm3, Truncation::Integer, &EPA_PM10),
                PollutantTable::new(Pollutant::O3, Units::Ppb, Truncation::Integer, &EPA_O3),
                PollutantTable::new(Pollutant::Co, Units::Ppm, Truncation::Tenths, &EPA_CO),
                PollutantTable::new(Pollutant::No2, Units::Ppb, Truncation::Integer, &EPA_NO2),
                PollutantTable::new(Pollutant::So2, Units::Ppb, Truncation::Integer, &EPA_SO2),
            ],
        }
    }

    /// Parse and validate a standard encoded as JSON.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, StandardError> {
        let standard: AqiStandard = serde_json::from_reader(reader).map_err(StandardError::Parse)?;
        standard.validate()?;
        Ok(standard)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, StandardError> {
        let file = File::open(path).map_err(StandardError::Io)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn molar_mass(&self, pollutant: Pollutant) -> Option<f64> {
        self.molar_masses
            .iter()
            .find(|m| m.pollutant == pollutant)
            .map(|m| m.grams_per_mole)
    }

    pub fn table(&self, pollutant: Pollutant) -> Option<&PollutantTable> {
        self.tables.iter().find(|t| t.pollutant == pollutant)
    }

    pub fn validate(&self) -> Result<(), StandardError> {
        for m in self.molar_masses.iter() {
            if !m.grams_per_mole.is_finite() || m.grams_per_mole <= 0.0 {
                return Err(StandardError::InvalidMolarMass(m.pollutant));
            }
        }

        for (i, table) in self.tables.iter().enumerate() {
            if self.tables[..i].iter().any(|t| t.pollutant == table.pollutant) {
                return Err(StandardError::DuplicateTable(table.pollutant));
            }

            validate_table(table)?;
        }

        Ok(())
    }
}

impl Default for AqiStandard {
    fn default() -> Self {
        Self::us_epa()
    }
}

fn validate_table(table: &PollutantTable) -> Result<(), StandardError> {
    if table.breakpoints.is_empty() {
        return Err(StandardError::EmptyTable(table.pollutant));
    }

    let mut previous: Option<&Breakpoint> = None;
    for (row, b) in table.breakpoints.iter().enumerate() {
        let (cl, ch) = b.concentration;
        let (il, ih) = b.index;

        if !cl.is_finite() || !ch.is_finite() || cl >= ch || il > ih || ih > MAX_INDEX {
            return Err(StandardError::InvalidRange(table.pollutant, row));
        }

        if let Some(p) = previous {
            if cl <= p.concentration.1 || il <= p.index.1 {
                return Err(StandardError::Overlap(table.pollutant, row));
            }
        }

        previous = Some(b);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_us_epa_is_valid() {
        let standard = AqiStandard::us_epa();
        assert!(standard.validate().is_ok());
        for p in Pollutant::ALL {
            assert!(standard.table(p).is_some(), "missing table for {}", p);
        }
    }

    #[test]
    fn test_molar_mass_gases_only() {
        let standard = AqiStandard::us_epa();
        assert_eq!(standard.molar_mass(Pollutant::Co), Some(28.01));
        assert_eq!(standard.molar_mass(Pollutant::So2), Some(64.07));
        assert_eq!(standard.molar_mass(Pollutant::Pm25), None);
        assert_eq!(standard.molar_mass(Pollutant::Pm10), None);
    }

    #[test]
    fn test_pollutant_from_name() {
        assert_eq!(Pollutant::from_name("pm2_5"), Some(Pollutant::Pm25));
        assert_eq!(Pollutant::from_name("so2"), Some(Pollutant::So2));
        assert_eq!(Pollutant::from_name("nh3"), None);
        assert_eq!(Pollutant::from_name("PM10"), None);
    }

    #[test]
    fn test_truncation() {
        assert_eq!(Truncation::Tenths.apply(12.09), 12.0);
        assert_eq!(Truncation::Tenths.apply(4.3641), 4.3);
        assert_eq!(Truncation::Integer.apply(53.99), 53.0);
        assert_eq!(Truncation::Integer.apply(-0.5), -1.0);
    }

    #[test]
    fn test_table_floor_and_ceiling() {
        let standard = AqiStandard::us_epa();
        let o3 = standard.table(Pollutant::O3).unwrap();
        assert_eq!(o3.floor(), Some(0.0));
        assert_eq!(o3.ceiling(), Some(200.0));
        assert_eq!(o3.find(70.0), Some(&Breakpoint::new(55.0, 70.0, 51, 100)));
        assert_eq!(o3.find(70.5), None);
    }

    #[test]
    fn test_from_reader_alternate_standard() {
        let json = r#"{
            "name": "test",
            "molar_masses": [{"pollutant": "no2", "grams_per_mole": 46.01}],
            "tables": [
                {
                    "pollutant": "pm2_5",
                    "units": "ugm3",
                    "truncation": "tenths",
                    "breakpoints": [
                        {"concentration": [0.0, 10.0], "index": [0, 50]},
                        {"concentration": [10.1, 25.0], "index": [51, 100]}
                    ]
                }
            ]
        }"#;

        let standard = AqiStandard::from_reader(json.as_bytes()).unwrap();
        assert_eq!("test", standard.name);
        assert_eq!(standard.molar_mass(Pollutant::No2), Some(46.01));
        assert!(standard.table(Pollutant::Pm25).is_some());
        assert!(standard.table(Pollutant::Pm10).is_none());
    }

    #[test]
    fn test_from_reader_malformed() {
        let res = AqiStandard::from_reader("{\"name\": 1}".as_bytes());
        assert!(matches!(res, Err(StandardError::Parse(_))));
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let table = PollutantTable::new(
            Pollutant::Pm10,
            Units::Ugm3,
            Truncation::Integer,
            &[Breakpoint::new(0.0, 54.0, 0, 50), Breakpoint::new(54.0, 154.0, 51, 100)],
        );

        let res = AqiStandard::new("bad", vec![], vec![table]);
        assert!(matches!(res, Err(StandardError::Overlap(Pollutant::Pm10, 1))));
    }

    #[test]
    fn test_validate_rejects_descending_index() {
        let table = PollutantTable::new(
            Pollutant::Pm10,
            Units::Ugm3,
            Truncation::Integer,
            &[Breakpoint::new(0.0, 54.0, 51, 100), Breakpoint::new(55.0, 154.0, 0, 50)],
        );

        let res = AqiStandard::new("bad", vec![], vec![table]);
        assert!(matches!(res, Err(StandardError::Overlap(Pollutant::Pm10, 1))));
    }

    #[test]
    fn test_validate_rejects_empty_and_duplicate_tables() {
        let empty = PollutantTable::new(Pollutant::Co, Units::Ppm, Truncation::Tenths, &[]);
        let res = AqiStandard::new("bad", vec![], vec![empty]);
        assert!(matches!(res, Err(StandardError::EmptyTable(Pollutant::Co))));

        let one = PollutantTable::new(
            Pollutant::Co,
            Units::Ppm,
            Truncation::Tenths,
            &[Breakpoint::new(0.0, 4.4, 0, 50)],
        );
        let res = AqiStandard::new("bad", vec![], vec![one.clone(), one]);
        assert!(matches!(res, Err(StandardError::DuplicateTable(Pollutant::Co))));
    }

    #[test]
    fn test_validate_rejects_bad_molar_mass() {
        let masses = vec![MolarMass {
            pollutant: Pollutant::O3,
            grams_per_mole: 0.0,
        }];

        let res = AqiStandard::new("bad", masses, vec![]);
        assert!(matches!(res, Err(StandardError::InvalidMolarMass(Pollutant::O3))));
    }
}
