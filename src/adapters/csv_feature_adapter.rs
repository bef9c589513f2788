//! Feature builder backed by dated CSV snapshots.
//!
//! `<features_dir>/<YYYY-MM-DD>.csv`, first column `code`, every other column
//! a numeric feature score. A request for date `D` reads the latest file
//! dated on or before `D`.

use crate::domain::error::{KabuwalkError, SkipReason};
use crate::domain::features::{FeatureRow, FeatureTable};
use crate::ports::feature_port::FeatureBuilder;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub struct CsvFeatureBuilder {
    dir: PathBuf,
    /// Snapshot files by date, ascending.
    files: BTreeMap<NaiveDate, PathBuf>,
}

fn dir_error(path: &Path, reason: impl std::fmt::Display) -> KabuwalkError {
    KabuwalkError::Database {
        reason: format!("{}: {}", path.display(), reason),
    }
}

/// A bad snapshot file only costs its own date.
fn file_error(path: &Path, as_of: NaiveDate, reason: impl std::fmt::Display) -> KabuwalkError {
    KabuwalkError::FeatureBuild {
        date: as_of,
        reason: format!("{}: {}", path.display(), reason),
    }
}

impl CsvFeatureBuilder {
    pub fn open(dir: &Path) -> Result<Self, KabuwalkError> {
        let entries = fs::read_dir(dir)
            .map_err(|e| dir_error(dir, format!("failed to read directory: {e}")))?;
        let mut files = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| dir_error(dir, format!("directory entry error: {e}")))?;
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "csv") {
                continue;
            }
            let date = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
            if let Some(date) = date {
                files.insert(date, path);
            }
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            files,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot dates available on disk.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.files.keys().copied()
    }

    fn read(&self, path: &Path, as_of: NaiveDate) -> Result<FeatureTable, KabuwalkError> {
        let mut rdr = csv::Reader::from_path(path)
            .map_err(|e| file_error(path, as_of, format!("failed to read: {e}")))?;
        let headers = rdr
            .headers()
            .map_err(|e| file_error(path, as_of, format!("CSV parse error: {e}")))?
            .clone();
        if headers.get(0).map(str::trim) != Some("code") {
            return Err(file_error(path, as_of, "first column must be code"));
        }

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| file_error(path, as_of, format!("CSV parse error: {e}")))?;
            let Some(code) = record.get(0).map(str::trim).filter(|c| !c.is_empty()) else {
                continue;
            };
            let mut values = BTreeMap::new();
            for (name, cell) in headers.iter().zip(record.iter()).skip(1) {
                let cell = cell.trim();
                if cell.is_empty() {
                    continue;
                }
                let value: f64 = cell
                    .parse()
                    .map_err(|e| file_error(path, as_of, format!("invalid {name} for {code}: {e}")))?;
                values.insert(name.trim().to_string(), value);
            }
            rows.push(FeatureRow {
                code: code.to_string(),
                values,
            });
        }
        Ok(FeatureTable::new(as_of, rows))
    }
}

impl FeatureBuilder for CsvFeatureBuilder {
    fn build_features(&self, as_of: NaiveDate) -> Result<FeatureTable, KabuwalkError> {
        let Some((_, path)) = self.files.range(..=as_of).next_back() else {
            return Err(SkipReason::FeaturesUnavailable { date: as_of }.into());
        };
        let table = self.read(path, as_of)?;
        if table.is_empty() {
            return Err(SkipReason::FeaturesUnavailable { date: as_of }.into());
        }
        Ok(table)
    }
}
