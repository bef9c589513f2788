//! CSV file price store.
//!
//! Layout:
//! - `<prices_dir>/<code>.csv` with `date,open,close,adjustment_factor`
//! - a benchmark file with `date,open,close`
//! - an optional fundamentals file with `code,disclosed,<metric>...`
//!
//! Blank price cells are read as missing; a blank adjustment factor is `1.0`.
//! Everything is loaded once at open time.

use crate::domain::error::KabuwalkError;
use crate::domain::price::{BenchmarkBar, FundamentalsSnapshot, PricePoint};
use crate::ports::data_port::PriceStore;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub struct CsvPriceStore {
    prices: BTreeMap<String, Vec<PricePoint>>,
    benchmark: Vec<BenchmarkBar>,
    fundamentals: BTreeMap<String, Vec<FundamentalsSnapshot>>,
}

fn data_error(path: &Path, reason: impl std::fmt::Display) -> KabuwalkError {
    KabuwalkError::Database {
        reason: format!("{}: {}", path.display(), reason),
    }
}

fn column(headers: &csv::StringRecord, name: &str, path: &Path) -> Result<usize, KabuwalkError> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| data_error(path, format!("missing {name} column")))
}

fn parse_date(value: Option<&str>, path: &Path) -> Result<NaiveDate, KabuwalkError> {
    let value = value.ok_or_else(|| data_error(path, "missing date value"))?;
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| data_error(path, format!("invalid date '{value}': {e}")))
}

fn parse_optional(value: Option<&str>, field: &str, path: &Path) -> Result<Option<f64>, KabuwalkError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse::<f64>()
            .map(Some)
            .map_err(|e| data_error(path, format!("invalid {field} value '{s}': {e}"))),
    }
}

fn open_reader(path: &Path) -> Result<csv::Reader<fs::File>, KabuwalkError> {
    csv::Reader::from_path(path).map_err(|e| data_error(path, format!("failed to read: {e}")))
}

impl CsvPriceStore {
    pub fn open(
        prices_dir: &Path,
        benchmark_file: &Path,
        fundamentals_file: Option<&Path>,
    ) -> Result<Self, KabuwalkError> {
        let mut prices = BTreeMap::new();
        let entries = fs::read_dir(prices_dir).map_err(|e| {
            data_error(prices_dir, format!("failed to read directory: {e}"))
        })?;
        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| data_error(prices_dir, format!("directory entry error: {e}")))?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                paths.push(path);
            }
        }
        paths.sort();
        for path in paths {
            let Some(code) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };
            let points = read_prices(&code, &path)?;
            prices.insert(code, points);
        }

        let benchmark = read_benchmark(benchmark_file)?;
        let fundamentals = match fundamentals_file {
            Some(path) => read_fundamentals(path)?,
            None => BTreeMap::new(),
        };

        Ok(Self {
            prices,
            benchmark,
            fundamentals,
        })
    }
}

fn read_prices(code: &str, path: &Path) -> Result<Vec<PricePoint>, KabuwalkError> {
    let mut rdr = open_reader(path)?;
    let headers = rdr
        .headers()
        .map_err(|e| data_error(path, format!("CSV parse error: {e}")))?
        .clone();
    let date_col = column(&headers, "date", path)?;
    let open_col = column(&headers, "open", path)?;
    let close_col = column(&headers, "close", path)?;
    let factor_col = headers.iter().position(|h| h.trim() == "adjustment_factor");

    let mut points = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| data_error(path, format!("CSV parse error: {e}")))?;
        let factor = match factor_col {
            Some(i) => parse_optional(record.get(i), "adjustment_factor", path)?.unwrap_or(1.0),
            None => 1.0,
        };
        points.push(PricePoint {
            code: code.to_string(),
            date: parse_date(record.get(date_col), path)?,
            open: parse_optional(record.get(open_col), "open", path)?,
            close: parse_optional(record.get(close_col), "close", path)?,
            adjustment_factor: factor,
        });
    }
    points.sort_by_key(|p| p.date);
    Ok(points)
}

fn read_benchmark(path: &Path) -> Result<Vec<BenchmarkBar>, KabuwalkError> {
    let mut rdr = open_reader(path)?;
    let headers = rdr
        .headers()
        .map_err(|e| data_error(path, format!("CSV parse error: {e}")))?
        .clone();
    let date_col = column(&headers, "date", path)?;
    let open_col = column(&headers, "open", path)?;
    let close_col = column(&headers, "close", path)?;

    let mut bars = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| data_error(path, format!("CSV parse error: {e}")))?;
        bars.push(BenchmarkBar {
            date: parse_date(record.get(date_col), path)?,
            open: parse_optional(record.get(open_col), "open", path)?,
            close: parse_optional(record.get(close_col), "close", path)?,
        });
    }
    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

fn read_fundamentals(
    path: &Path,
) -> Result<BTreeMap<String, Vec<FundamentalsSnapshot>>, KabuwalkError> {
    let mut rdr = open_reader(path)?;
    let headers = rdr
        .headers()
        .map_err(|e| data_error(path, format!("CSV parse error: {e}")))?
        .clone();
    let code_col = column(&headers, "code", path)?;
    let disclosed_col = column(&headers, "disclosed", path)?;

    let mut out: BTreeMap<String, Vec<FundamentalsSnapshot>> = BTreeMap::new();
    for result in rdr.records() {
        let record = result.map_err(|e| data_error(path, format!("CSV parse error: {e}")))?;
        let code = record
            .get(code_col)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| data_error(path, "missing code value"))?;
        let mut values = BTreeMap::new();
        for (i, name) in headers.iter().enumerate() {
            if i == code_col || i == disclosed_col {
                continue;
            }
            if let Some(v) = parse_optional(record.get(i), name, path)? {
                values.insert(name.trim().to_string(), v);
            }
        }
        out.entry(code.clone()).or_default().push(FundamentalsSnapshot {
            code,
            disclosed: parse_date(record.get(disclosed_col), path)?,
            values,
        });
    }
    for snapshots in out.values_mut() {
        snapshots.sort_by_key(|s| s.disclosed);
    }
    Ok(out)
}

impl PriceStore for CsvPriceStore {
    fn get_prices(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, KabuwalkError> {
        Ok(self
            .prices
            .get(code)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.date >= start_date && p.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get_fundamentals(
        &self,
        code: &str,
        as_of: NaiveDate,
    ) -> Result<Option<FundamentalsSnapshot>, KabuwalkError> {
        Ok(self.fundamentals.get(code).and_then(|snapshots| {
            snapshots
                .iter()
                .rev()
                .find(|s| s.disclosed <= as_of)
                .cloned()
        }))
    }

    fn benchmark_range(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<BenchmarkBar>, KabuwalkError> {
        Ok(self
            .benchmark
            .iter()
            .filter(|b| b.date >= start_date && b.date <= end_date)
            .cloned()
            .collect())
    }

    fn list_codes(&self) -> Result<Vec<String>, KabuwalkError> {
        Ok(self.prices.keys().cloned().collect())
    }

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, KabuwalkError> {
        Ok(self.prices.get(code).and_then(|points| {
            match (points.first(), points.last()) {
                (Some(first), Some(last)) => Some((first.date, last.date, points.len())),
                _ => None,
            }
        }))
    }
}
