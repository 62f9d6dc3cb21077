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

//! Properties that must hold for every row of every breakpoint table.

use aqi_forecast::aqi::{overall_aqi, report, sub_index, Concentrations};
use aqi_forecast::standard::{
    AqiStandard, Breakpoint, Pollutant, PollutantTable, Truncation, Units, MAX_INDEX, MOLAR_VOLUME,
};

/// Convert a value in the table's units back into µg/m³ so it can be passed to `sub_index`.
fn to_ugm3(standard: &AqiStandard, table: &PollutantTable, value: f64) -> f64 {
    let mw = standard.molar_mass(table.pollutant);
    match (table.units, mw) {
        (Units::Ugm3, _) | (_, None) => value,
        (Units::Ppb, Some(mw)) => value * mw / MOLAR_VOLUME,
        (Units::Ppm, Some(mw)) => value * 1000.0 * mw / MOLAR_VOLUME,
    }
}

/// Half of the smallest step the table's truncation can distinguish. Adding this to a
/// tabulated value keeps it safely above the value after a round trip through unit conversion.
fn half_step(table: &PollutantTable) -> f64 {
    match table.truncation {
        Truncation::Tenths => 0.05,
        Truncation::Integer => 0.5,
    }
}

#[test]
fn test_inside_row_is_within_index_band() {
    let standard = AqiStandard::us_epa();

    for table in standard.tables.iter() {
        for b in table.breakpoints.iter() {
            let (cl, ch) = b.concentration;
            let (il, ih) = b.index;
            let mid = table.truncation.apply((cl + ch) / 2.0) + half_step(table);
            let conc = to_ugm3(&standard, table, mid);

            let v = sub_index(&standard, table.pollutant, Some(conc))
                .unwrap_or_else(|| panic!("no sub-index for {} at {}", table.pollutant, mid));
            assert!(
                il <= v && v <= ih,
                "{} at {} gave {} outside [{}, {}]",
                table.pollutant,
                mid,
                v,
                il,
                ih
            );
        }
    }
}

#[test]
fn test_boundaries_map_to_band_edges() {
    let standard = AqiStandard::us_epa();

    for table in standard.tables.iter() {
        for b in table.breakpoints.iter() {
            let (cl, ch) = b.concentration;
            let (il, ih) = b.index;

            let low = to_ugm3(&standard, table, cl + half_step(table));
            let high = to_ugm3(&standard, table, ch + half_step(table));

            assert_eq!(Some(il), sub_index(&standard, table.pollutant, Some(low)), "{} low {}", table.pollutant, cl);
            assert_eq!(Some(ih), sub_index(&standard, table.pollutant, Some(high)), "{} high {}", table.pollutant, ch);
        }
    }
}

#[test]
fn test_adjacent_rows_have_no_gap() {
    let standard = AqiStandard::us_epa();

    for table in standard.tables.iter() {
        for pair in table.breakpoints.windows(2) {
            let (prev, next): (&Breakpoint, &Breakpoint) = (&pair[0], &pair[1]);
            let end = to_ugm3(&standard, table, prev.concentration.1 + half_step(table));
            let start = to_ugm3(&standard, table, next.concentration.0 + half_step(table));

            let end = sub_index(&standard, table.pollutant, Some(end)).unwrap();
            let start = sub_index(&standard, table.pollutant, Some(start)).unwrap();
            assert_eq!(end + 1, start, "{} between {:?} and {:?}", table.pollutant, prev, next);
        }
    }
}

#[test]
fn test_monotonic_and_defined_from_zero() {
    let standard = AqiStandard::us_epa();

    for table in standard.tables.iter() {
        let ceiling = to_ugm3(&standard, table, table.ceiling().unwrap());
        let steps = 5000;
        let step = ceiling * 1.2 / f64::from(steps);

        let mut previous = 0;
        for i in 0..=steps {
            let conc = f64::from(i) * step;
            let v = sub_index(&standard, table.pollutant, Some(conc))
                .unwrap_or_else(|| panic!("no sub-index for {} at {} µg/m³", table.pollutant, conc));

            assert!(v >= previous, "{} decreased at {} µg/m³: {} < {}", table.pollutant, conc, v, previous);
            previous = v;
        }

        assert_eq!(MAX_INDEX, previous, "{} should saturate", table.pollutant);
    }
}

#[test]
fn test_saturates_far_above_table() {
    let standard = AqiStandard::us_epa();

    for table in standard.tables.iter() {
        let ceiling = to_ugm3(&standard, table, table.ceiling().unwrap());
        for factor in [1.5, 10.0, 1000.0] {
            assert_eq!(
                Some(MAX_INDEX),
                sub_index(&standard, table.pollutant, Some(ceiling * factor)),
                "{} at {}x ceiling",
                table.pollutant,
                factor
            );
        }
    }
}

#[test]
fn test_below_table_is_undefined() {
    let standard = AqiStandard::us_epa();

    for p in Pollutant::ALL {
        assert_eq!(None, sub_index(&standard, p, Some(-10.0)), "{}", p);
    }
}

#[test]
fn test_overall_is_max_of_sub_indices_in_any_order() {
    let standard = AqiStandard::us_epa();
    let pairs = [
        ("pm2_5", 40.0),
        ("pm10", 120.0),
        ("o3", 150.0),
        ("co", 9000.0),
        ("no2", 300.0),
        ("so2", 50.0),
    ];

    let expected = pairs
        .iter()
        .filter_map(|(name, v)| sub_index(&standard, Pollutant::from_name(name).unwrap(), Some(*v)))
        .max();

    let forward = Concentrations::from_pairs(pairs);
    let reverse = Concentrations::from_pairs(pairs.iter().rev().copied());

    assert!(expected.is_some());
    assert_eq!(expected, overall_aqi(&standard, &forward));
    assert_eq!(expected, overall_aqi(&standard, &reverse));
}

#[test]
fn test_documented_scenarios() {
    let standard = AqiStandard::us_epa();

    assert_eq!(Some(56), sub_index(&standard, Pollutant::Pm25, Some(12.0)));
    assert_eq!(Some(496), sub_index(&standard, Pollutant::Pm10, Some(600.0)));
    assert_eq!(Some(49), sub_index(&standard, Pollutant::Co, Some(5000.0)));

    let conc = Concentrations::from_pairs([("pm2_5", 12.0), ("pm10", 600.0), ("co", 5000.0)]);
    let r = report(&standard, &conc);
    assert_eq!(Some(496), r.aqi);
    assert_eq!(Some(Pollutant::Pm10), r.dominant);

    let single = Concentrations::from_pairs([("pm2_5", 12.0)]);
    assert_eq!(Some(56), overall_aqi(&standard, &single));

    assert_eq!(None, overall_aqi(&standard, &Concentrations::default()));
}

#[test]
fn test_substituted_standard() {
    let pm25 = PollutantTable::new(
        Pollutant::Pm25,
        Units::Ugm3,
        Truncation::Integer,
        &[
            Breakpoint::new(0.0, 10.0, 0, 50),
            Breakpoint::new(11.0, 20.0, 51, 100),
            Breakpoint::new(21.0, 50.0, 101, 500),
        ],
    );
    let standard = AqiStandard::new("test", vec![], vec![pm25]).unwrap();

    // 12.9 truncates to 12, in the second row: 49 / 9 * 1 + 51 = 56.4
    assert_eq!(Some(56), sub_index(&standard, Pollutant::Pm25, Some(12.9)));
    assert_eq!(Some(500), sub_index(&standard, Pollutant::Pm25, Some(51.0)));

    // No tables for anything else, so only pm2_5 contributes
    let conc = Concentrations::from_pairs([("pm2_5", 5.0), ("pm10", 600.0)]);
    assert_eq!(Some(25), overall_aqi(&standard, &conc));
}
