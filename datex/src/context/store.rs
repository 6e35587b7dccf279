//! The persistent cross-run key/value store.
//!
//! A store is a JSON object on disk, loaded when a job context opens and
//! flushed when it closes. At most one open store may exist per path in this
//! process: opening claims the canonical path in a process-wide registry and
//! a second open fails with `PersistenceConflict` until the first store is
//! dropped. Lost updates from concurrent service runs are prevented by this
//! single-writer policy rather than by merging.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use dashmap::DashSet;
use serde_json::{Map, Value};

use crate::errors::DatexError;

fn claims() -> &'static DashSet<PathBuf> {
    static CLAIMS: OnceLock<DashSet<PathBuf>> = OnceLock::new();
    CLAIMS.get_or_init(DashSet::new)
}

/// Key/value data surviving across separate job executions.
#[derive(Debug)]
pub struct ContextStore {
    path: PathBuf,
    data: Map<String, Value>,
}

impl ContextStore {
    /// Opens the store at `path`, claiming it for this run.
    ///
    /// The parent directory is created if needed; a missing file is an empty
    /// store. Fails with [`DatexError::PersistenceConflict`] when another
    /// open store already claims the same canonical path.
    pub fn open(path: &Path) -> Result<Self, DatexError> {
        let key = claim_key(path)?;
        if !claims().insert(key.clone()) {
            return Err(DatexError::PersistenceConflict(
                path.display().to_string(),
            ));
        }
        match Self::read_data(&key) {
            Ok(data) => Ok(Self { path: key, data }),
            Err(e) => {
                claims().remove(&key);
                Err(e)
            }
        }
    }

    fn read_data(path: &Path) -> Result<Map<String, Value>, DatexError> {
        if !path.exists() {
            return Ok(Map::new());
        }
        let text = fs::read_to_string(path)?;
        if text.trim().is_empty() {
            return Ok(Map::new());
        }
        let value: Value = serde_json::from_str(&text)?;
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(DatexError::processing(
                "store",
                format!("{} does not contain a JSON object", path.display()),
            )),
        }
    }

    /// The canonical path this store claims.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the value of a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Sets a key, replacing any existing value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    /// Removes a key, returning its value if it was present.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Number of keys in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Writes the store back to disk.
    pub fn flush(&self) -> Result<(), DatexError> {
        let text = serde_json::to_string_pretty(&Value::Object(self.data.clone()))?;
        fs::write(&self.path, text)?;
        Ok(())
    }
}

impl Drop for ContextStore {
    fn drop(&mut self) {
        claims().remove(&self.path);
    }
}

fn claim_key(path: &Path) -> Result<PathBuf, DatexError> {
    let file_name = path.file_name().ok_or_else(|| {
        DatexError::processing("store", format!("{} has no file name", path.display()))
    })?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;
    Ok(parent.canonicalize()?.join(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_round_trip_across_opens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        {
            let mut store = ContextStore::open(&path).unwrap();
            assert!(store.is_empty());
            store.set("runs", 1);
            store.set("watermark", "2026-08-01");
            store.flush().unwrap();
        }

        let store = ContextStore::open(&path).unwrap();
        assert_eq!(store.get("runs"), Some(&json!(1)));
        assert_eq!(store.get("watermark"), Some(&json!("2026-08-01")));
    }

    #[test]
    fn test_second_open_conflicts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let first = ContextStore::open(&path).unwrap();
        let err = ContextStore::open(&path).unwrap_err();
        assert!(matches!(err, DatexError::PersistenceConflict(_)));

        drop(first);
        assert!(ContextStore::open(&path).is_ok());
    }

    #[test]
    fn test_conflict_detected_through_path_spelling() {
        let dir = tempdir().unwrap();
        let _first = ContextStore::open(&dir.path().join("store.json")).unwrap();

        let dotted = dir.path().join(".").join("store.json");
        let err = ContextStore::open(&dotted).unwrap_err();
        assert!(matches!(err, DatexError::PersistenceConflict(_)));
    }

    #[test]
    fn test_missing_parent_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deep").join("store.json");

        let store = ContextStore::open(&path).unwrap();
        store.flush().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_non_object_content_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "[1, 2, 3]").unwrap();

        let err = ContextStore::open(&path).unwrap_err();
        assert!(err.to_string().contains("JSON object"));
        // The failed open must not leave the path claimed.
        assert!(matches!(
            ContextStore::open(&path).unwrap_err(),
            DatexError::Processing { .. }
        ));
    }
}
