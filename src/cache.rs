//! On-disk memoisation of the corpus table.
//!
//! One safetensors file per key under the cache directory. The cache never
//! looks inside the computation: a key must be derived from every parameter
//! that influences the result (see [`PipelineConfig::cache_key`](crate::PipelineConfig::cache_key)),
//! otherwise a stale table is returned without complaint.
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::io::{read_table, write_table};
use crate::table::DataTable;

#[derive(Debug, Clone)]
pub struct Cache {
    dir: PathBuf,
}

impl Cache {
    /// Open (and create if needed) a cache directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the entry for `key`. Keys must be plain file stems.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        let bad = key.is_empty()
            || key.starts_with('.')
            || key.chars().any(|c| matches!(c, '/' | '\\' | ':') || c.is_control());
        if bad {
            return Err(PipelineError::Cache { key: key.to_string(), reason: "invalid key".into() });
        }
        Ok(self.dir.join(format!("{key}.safetensors")))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.path_for(key).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Return the table stored under `key`, or compute, store and return it.
    ///
    /// `compute` runs at most once per key. If it fails, nothing is stored.
    pub fn get_or_compute<F>(&self, key: &str, compute: F) -> Result<DataTable>
    where
        F: FnOnce() -> Result<DataTable>,
    {
        let path = self.path_for(key)?;
        if path.is_file() {
            log::info!("cache hit: {}", path.display());
            return read_table(&path).map_err(|e| PipelineError::Cache {
                key: key.to_string(),
                reason: e.to_string(),
            });
        }
        log::info!("cache miss for {key}; computing");
        let table = compute()?;

        let tmp = self.dir.join(format!(".{key}.tmp"));
        let stored = write_table(&table, &tmp).and_then(|()| Ok(fs::rename(&tmp, &path)?));
        if let Err(e) = stored {
            let _ = fs::remove_file(&tmp);
            return Err(PipelineError::Cache { key: key.to_string(), reason: e.to_string() });
        }
        log::info!("cached {} rows as {}", table.len(), path.display());
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    #[test]
    fn keys_must_be_file_stems() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path()).unwrap();
        for key in ["", "../x", "a/b", ".hidden"] {
            assert!(cache.path_for(key).is_err(), "{key:?}");
            assert!(!cache.contains(key));
        }
        assert!(cache.path_for("02022024-0123abcd").is_ok());
    }

    #[test]
    fn failed_compute_stores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path()).unwrap();
        let r = cache.get_or_compute("k", || Err(PipelineError::Config("boom".into())));
        assert!(r.is_err());
        assert!(!cache.contains("k"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn second_call_reads_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path().join("nested")).unwrap();
        let mut t = DataTable::new();
        t.insert("x", Column::Float(vec![1.0, f64::NAN])).unwrap();
        let first = cache.get_or_compute("k", || Ok(t.clone())).unwrap();
        let second = cache.get_or_compute("k", || panic!("recomputed")).unwrap();
        assert_eq!(first.len(), second.len());
        assert!(second.floats("x").unwrap()[1].is_nan());
    }
}
