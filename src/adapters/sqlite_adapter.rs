//! SQLite price store.
//!
//! Tables: `prices(code, date, open, close, adjustment_factor)`,
//! `benchmark(date, open, close)` and the long-format
//! `fundamentals(code, disclosed, metric, value)`. Dates are ISO text.

use crate::domain::error::KabuwalkError;
use crate::domain::price::{BenchmarkBar, FundamentalsSnapshot, PricePoint};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::PriceStore;
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::collections::BTreeMap;

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_error(e: r2d2::Error) -> KabuwalkError {
    KabuwalkError::Database {
        reason: e.to_string(),
    }
}

fn query_error(e: rusqlite::Error) -> KabuwalkError {
    KabuwalkError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn date_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, KabuwalkError> {
        let db_path = config
            .get_string("data", "database")
            .ok_or_else(|| KabuwalkError::ConfigMissing {
                section: "data".into(),
                key: "database".into(),
            })?;

        let pool_size = config.get_int("data", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, KabuwalkError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, KabuwalkError> {
        self.pool.get().map_err(pool_error)
    }

    pub fn initialize_schema(&self) -> Result<(), KabuwalkError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS prices (
                    code TEXT NOT NULL,
                    date TEXT NOT NULL,
                    open REAL,
                    close REAL,
                    adjustment_factor REAL NOT NULL DEFAULT 1.0,
                    PRIMARY KEY (code, date)
                );
                CREATE INDEX IF NOT EXISTS idx_prices_date ON prices(date);
                CREATE TABLE IF NOT EXISTS benchmark (
                    date TEXT PRIMARY KEY,
                    open REAL,
                    close REAL
                );
                CREATE TABLE IF NOT EXISTS fundamentals (
                    code TEXT NOT NULL,
                    disclosed TEXT NOT NULL,
                    metric TEXT NOT NULL,
                    value REAL NOT NULL,
                    PRIMARY KEY (code, disclosed, metric)
                );",
            )
            .map_err(query_error)
    }

    pub fn insert_prices(&self, points: &[PricePoint]) -> Result<(), KabuwalkError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        for p in points {
            tx.execute(
                "INSERT OR REPLACE INTO prices (code, date, open, close, adjustment_factor)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![p.code, iso(p.date), p.open, p.close, p.adjustment_factor],
            )
            .map_err(query_error)?;
        }
        tx.commit().map_err(query_error)
    }

    pub fn insert_benchmark(&self, bars: &[BenchmarkBar]) -> Result<(), KabuwalkError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        for b in bars {
            tx.execute(
                "INSERT OR REPLACE INTO benchmark (date, open, close) VALUES (?1, ?2, ?3)",
                params![iso(b.date), b.open, b.close],
            )
            .map_err(query_error)?;
        }
        tx.commit().map_err(query_error)
    }

    pub fn insert_fundamentals(&self, snapshots: &[FundamentalsSnapshot]) -> Result<(), KabuwalkError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        for s in snapshots {
            for (metric, value) in &s.values {
                tx.execute(
                    "INSERT OR REPLACE INTO fundamentals (code, disclosed, metric, value)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![s.code, iso(s.disclosed), metric, value],
                )
                .map_err(query_error)?;
            }
        }
        tx.commit().map_err(query_error)
    }
}

impl PriceStore for SqliteAdapter {
    fn get_prices(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, KabuwalkError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT code, date, open, close, adjustment_factor
                 FROM prices
                 WHERE code = ?1 AND date >= ?2 AND date <= ?3
                 ORDER BY date ASC",
            )
            .map_err(query_error)?;
        let rows = stmt
            .query_map(params![code, iso(start_date), iso(end_date)], |row| {
                Ok(PricePoint {
                    code: row.get(0)?,
                    date: date_column(row, 1)?,
                    open: row.get(2)?,
                    close: row.get(3)?,
                    adjustment_factor: row.get(4)?,
                })
            })
            .map_err(query_error)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_error)
    }

    fn get_fundamentals(
        &self,
        code: &str,
        as_of: NaiveDate,
    ) -> Result<Option<FundamentalsSnapshot>, KabuwalkError> {
        let conn = self.conn()?;
        let latest: Option<String> = conn
            .query_row(
                "SELECT MAX(disclosed) FROM fundamentals WHERE code = ?1 AND disclosed <= ?2",
                params![code, iso(as_of)],
                |row| row.get(0),
            )
            .map_err(query_error)?;
        let Some(disclosed) = latest else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare("SELECT metric, value FROM fundamentals WHERE code = ?1 AND disclosed = ?2")
            .map_err(query_error)?;
        let rows = stmt
            .query_map(params![code, disclosed], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })
            .map_err(query_error)?;
        let values: BTreeMap<String, f64> =
            rows.collect::<Result<_, _>>().map_err(query_error)?;

        let disclosed = NaiveDate::parse_from_str(&disclosed, "%Y-%m-%d").map_err(|e| {
            KabuwalkError::Database {
                reason: e.to_string(),
            }
        })?;
        Ok(Some(FundamentalsSnapshot {
            code: code.to_string(),
            disclosed,
            values,
        }))
    }

    fn benchmark_range(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<BenchmarkBar>, KabuwalkError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT date, open, close FROM benchmark
                 WHERE date >= ?1 AND date <= ?2
                 ORDER BY date ASC",
            )
            .map_err(query_error)?;
        let rows = stmt
            .query_map(params![iso(start_date), iso(end_date)], |row| {
                Ok(BenchmarkBar {
                    date: date_column(row, 0)?,
                    open: row.get(1)?,
                    close: row.get(2)?,
                })
            })
            .map_err(query_error)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_error)
    }

    fn list_codes(&self) -> Result<Vec<String>, KabuwalkError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT code FROM prices ORDER BY code")
            .map_err(query_error)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_error)?;
        rows.collect::<Result<Vec<String>, _>>().map_err(query_error)
    }

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, KabuwalkError> {
        let conn = self.conn()?;
        let result: (Option<String>, Option<String>, i64) = conn
            .query_row(
                "SELECT MIN(date), MAX(date), COUNT(*) FROM prices WHERE code = ?1",
                params![code],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_error)?;

        match result {
            (Some(min_str), Some(max_str), count) if count > 0 => {
                let parse = |s: &str| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| KabuwalkError::Database {
                        reason: e.to_string(),
                    })
                };
                Ok(Some((parse(&min_str)?, parse(&max_str)?, count as usize)))
            }
            _ => Ok(None),
        }
    }
}
