//! Append-only JSON file cache of feature snapshots.
//!
//! Each entry is one file named `{version}__{start}__{end}__{n}.json`, where
//! `n` distinguishes entries written under the same range. Entries are
//! written to a temporary file and renamed into place, so a reader never sees
//! a partial entry.

use crate::domain::error::KabuwalkError;
use crate::domain::feature_cache::{CacheKey, DateSnapshot};
use crate::ports::cache_port::CacheStore;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct JsonCacheStore {
    dir: PathBuf,
}

fn cache_error(path: &Path, reason: impl std::fmt::Display) -> KabuwalkError {
    KabuwalkError::Cache {
        reason: format!("{}: {}", path.display(), reason),
    }
}

impl JsonCacheStore {
    /// Creates `dir` if needed.
    pub fn open(dir: &Path) -> Result<Self, KabuwalkError> {
        fs::create_dir_all(dir).map_err(|e| cache_error(dir, e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn stem(key: &CacheKey, n: usize) -> String {
        format!("{}__{}__{}__{}", key.version, key.start, key.end, n)
    }

    /// Entry files of `version`, in name order.
    pub fn entries(&self, version: &str) -> Result<Vec<PathBuf>, KabuwalkError> {
        let prefix = format!("{version}__");
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| cache_error(&self.dir, e))? {
            let path = entry.map_err(|e| cache_error(&self.dir, e))?.path();
            let matches = path.extension().is_some_and(|ext| ext == "json")
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix));
            if matches {
                out.push(path);
            }
        }
        out.sort();
        Ok(out)
    }
}

impl CacheStore for JsonCacheStore {
    fn load(&self, version: &str, dates: &[NaiveDate]) -> Result<Vec<DateSnapshot>, KabuwalkError> {
        let wanted: BTreeSet<NaiveDate> = dates.iter().copied().collect();
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for path in self.entries(version)? {
            let content = fs::read_to_string(&path).map_err(|e| cache_error(&path, e))?;
            let snapshots: Vec<DateSnapshot> = match serde_json::from_str(&content) {
                Ok(s) => s,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring unreadable cache entry");
                    continue;
                }
            };
            for snapshot in snapshots {
                if wanted.contains(&snapshot.date) && seen.insert(snapshot.date) {
                    out.push(snapshot);
                }
            }
        }
        debug!(version, requested = wanted.len(), found = out.len(), "loaded cached snapshots");
        Ok(out)
    }

    fn append(&self, key: &CacheKey, snapshots: &[DateSnapshot]) -> Result<(), KabuwalkError> {
        let mut n = 0;
        let path = loop {
            let candidate = self.dir.join(format!("{}.json", Self::stem(key, n)));
            if !candidate.exists() {
                break candidate;
            }
            n += 1;
        };
        let tmp = self.dir.join(format!(".{}.json.tmp", Self::stem(key, n)));
        let json = serde_json::to_string(snapshots).map_err(|e| cache_error(&path, e))?;
        fs::write(&tmp, json).map_err(|e| cache_error(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| cache_error(&path, e))?;
        Ok(())
    }
}
