use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};
use crate::kv::Kv;
use crate::schema::{self, SchemaReport};

/// Handle to the tracker's database. Entity operations live in the
/// `companies`, `profiles`, `people`, `jobs`, `query`, `cascade` and
/// `backup` modules as further `impl Database` blocks.
pub struct Database {
    kv: Kv,
    path: Option<PathBuf>,
}

impl Database {
    /// Opens (creating if needed) the database file and brings its schema
    /// up to date.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Self {
            kv: Kv::open(path)?,
            path: Some(path.to_path_buf()),
        };
        db.ensure_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let db = Self {
            kv: Kv::open_in_memory()?,
            path: None,
        };
        db.ensure_schema()?;
        Ok(db)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn ensure_schema(&self) -> StoreResult<SchemaReport> {
        schema::ensure_schema(&self.kv)
    }

    pub(crate) fn kv(&self) -> &Kv {
        &self.kv
    }

    // --- Typed record helpers ---

    pub(crate) fn fetch<T: DeserializeOwned>(&self, store: &str, id: i64) -> StoreResult<Option<T>> {
        match self.kv.get(store, id)? {
            Some(value) => Ok(Some(decode(store, value)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn fetch_existing<T: DeserializeOwned>(&self, store: &str, id: i64) -> StoreResult<T> {
        self.fetch(store, id)?
            .ok_or_else(|| StoreError::not_found(store, id))
    }

    pub(crate) fn fetch_all<T: DeserializeOwned>(&self, store: &str) -> StoreResult<Vec<T>> {
        self.kv
            .get_all(store)?
            .into_iter()
            .map(|value| decode(store, value))
            .collect()
    }
}

pub(crate) fn encode<T: Serialize>(record: &T) -> StoreResult<Value> {
    Ok(serde_json::to_value(record)?)
}

pub(crate) fn decode<T: DeserializeOwned>(store: &str, value: Value) -> StoreResult<T> {
    let id = value.get("id").and_then(Value::as_i64).unwrap_or_default();
    serde_json::from_value(value).map_err(|e| {
        StoreError::StoreUnavailable(format!("unreadable record {} #{}: {}", store, id, e))
    })
}

/// Current time as an ISO 8601 UTC timestamp with millisecond precision.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `None` for absent or blank text.
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::JOBS;

    #[test]
    fn test_open_creates_parent_directories() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/tracker.db");
        let db = Database::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(db.path(), Some(path.as_path()));
    }

    #[test]
    fn test_timestamp_format() {
        let ts = now_timestamp();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2024-01-01T00:00:00.000Z".len());
    }

    #[test]
    fn test_unreadable_record_reports_store_and_id() {
        let db = Database::open_in_memory().unwrap();
        db.kv()
            .put(JOBS, serde_json::json!({"title": 42}))
            .unwrap();
        let err = db.fetch::<crate::models::Job>(JOBS, 1).unwrap_err();
        assert!(err.to_string().contains("jobs #1"));
    }
}
