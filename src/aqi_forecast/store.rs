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

//! Local feature store: one JSON Lines file per versioned feature group.
//!
//! Rows are keyed by an integer primary key (a unix timestamp for every group this
//! crate writes). Inserting a row with an existing key replaces it. Files are rewritten
//! in full to a temporary path and renamed into place so readers never see a partial
//! write.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::error;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Rows that can be stored in a [`FeatureGroup`].
pub trait Keyed {
    fn primary_key(&self) -> i64;
}

#[derive(Debug)]
pub enum StoreError {
    Io(PathBuf, io::Error),
    Json(PathBuf, usize, serde_json::Error),
    Serialize(PathBuf, i64, serde_json::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(path, e) => write!(f, "{}: {}", path.display(), e),
            Self::Json(path, line, e) => write!(f, "{} line {}: {}", path.display(), line, e),
            Self::Serialize(path, key, e) => write!(f, "{} row {}: {}", path.display(), key, e),
        }
    }
}

impl error::Error for StoreError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(_, e) => Some(e),
            Self::Json(_, _, e) => Some(e),
            Self::Serialize(_, _, e) => Some(e),
        }
    }
}

/// Counts of rows written by [`FeatureGroup::insert`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertSummary {
    pub inserted: usize,
    pub updated: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct FeatureGroup<T> {
    name: String,
    version: u32,
    path: PathBuf,
    _rows: PhantomData<fn() -> T>,
}

impl<T> FeatureGroup<T>
where
    T: Keyed + Serialize + DeserializeOwned,
{
    /// Feature group `name` at `version`, stored as `<dir>/<name>_v<version>.jsonl`.
    /// Nothing is created on disk until the first insert.
    pub fn new<P: AsRef<Path>>(dir: P, name: &str, version: u32) -> Self {
        let path = dir.as_ref().join(format!("{}_v{}.jsonl", name, version));
        FeatureGroup {
            name: name.to_owned(),
            version,
            path,
            _rows: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every row in the group ordered by primary key. A group that has never been
    /// written to is empty.
    pub fn read(&self) -> Result<Vec<T>, StoreError> {
        Ok(self.load()?.into_values().collect())
    }

    /// Insert rows, replacing any existing rows with the same primary key.
    pub fn insert<I: IntoIterator<Item = T>>(&self, rows: I) -> Result<InsertSummary, StoreError> {
        let mut existing = self.load()?;
        let mut summary = InsertSummary::default();

        for row in rows {
            match existing.insert(row.primary_key(), row) {
                Some(_) => summary.updated += 1,
                None => summary.inserted += 1,
            }
        }

        summary.total = existing.len();
        self.write(&existing)?;

        tracing::debug!(
            message = "wrote feature group",
            group = %self.name,
            version = self.version,
            path = %self.path.display(),
            inserted = summary.inserted,
            updated = summary.updated,
            total = summary.total,
        );

        Ok(summary)
    }

    fn load(&self) -> Result<BTreeMap<i64, T>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(StoreError::Io(self.path.clone(), e)),
        };

        let mut rows = BTreeMap::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| StoreError::Io(self.path.clone(), e))?;
            if line.trim().is_empty() {
                continue;
            }

            let row: T = serde_json::from_str(&line).map_err(|e| StoreError::Json(self.path.clone(), i + 1, e))?;
            rows.insert(row.primary_key(), row);
        }

        Ok(rows)
    }

    fn write(&self, rows: &BTreeMap<i64, T>) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| StoreError::Io(dir.to_path_buf(), e))?;
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        if let Err(e) = Self::write_rows(&tmp, rows) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            StoreError::Io(self.path.clone(), e)
        })
    }

    fn write_rows(tmp: &Path, rows: &BTreeMap<i64, T>) -> Result<(), StoreError> {
        let io_err = |e| StoreError::Io(tmp.to_path_buf(), e);
        let mut writer = BufWriter::new(File::create(tmp).map_err(io_err)?);

        for (key, row) in rows {
            serde_json::to_writer(&mut writer, row).map_err(|e| StoreError::Serialize(tmp.to_path_buf(), *key, e))?;
            writer.write_all(b"\n").map_err(io_err)?;
        }

        writer.flush().map_err(io_err)
    }
}
