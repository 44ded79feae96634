//! # wavetap-store
//!
//! Small structured records persisted to the device's flash filesystem.
//! Each record is one JSON file under the store root. A missing file is
//! not an error: callers get the type's default, matching first-boot
//! behavior. Writes go through a temp file + rename so a power cut never
//! leaves a half-written record.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to create store directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read record {name}: {source}")]
    Read {
        name: String,
        source: std::io::Error,
    },

    #[error("Failed to write record {name}: {source}")]
    Write {
        name: String,
        source: std::io::Error,
    },

    #[error("Record {name} is malformed: {source}")]
    Malformed {
        name: String,
        source: serde_json::Error,
    },
}

/// A directory of JSON records.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::CreateDir {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load a record, falling back to the default when the file does not
    /// exist. A malformed record is an error; it means the flash holds
    /// data we would otherwise silently clobber.
    pub fn load_or_default<T>(&self, name: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let path = self.record_path(name);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Record {name} absent, using defaults");
                return Ok(T::default());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    name: name.to_string(),
                    source,
                })
            }
        };
        serde_json::from_str(&content).map_err(|source| StoreError::Malformed {
            name: name.to_string(),
            source,
        })
    }

    /// Persist a record, replacing any previous contents atomically.
    pub fn save<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let data = serde_json::to_string_pretty(value).map_err(|source| StoreError::Malformed {
            name: name.to_string(),
            source,
        })?;
        let path = self.record_path(name);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data).map_err(|source| StoreError::Write {
            name: name.to_string(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Write {
            name: name.to_string(),
            source,
        })?;
        Ok(())
    }

    /// Remove a record if present.
    pub fn remove(&self, name: &str) -> Result<()> {
        let path = self.record_path(name);
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Write {
                name: name.to_string(),
                source,
            }),
        }
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        count: u32,
        label: String,
    }

    fn temp_store(tag: &str) -> Store {
        let dir = std::env::temp_dir().join(format!("wavetap-store-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        Store::open(dir).unwrap()
    }

    #[test]
    fn missing_record_yields_default() {
        let store = temp_store("missing");
        let sample: Sample = store.load_or_default("nothing").unwrap();
        assert_eq!(sample, Sample::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let store = temp_store("roundtrip");
        let sample = Sample {
            count: 7,
            label: "seven".to_string(),
        };
        store.save("sample", &sample).unwrap();
        let loaded: Sample = store.load_or_default("sample").unwrap();
        assert_eq!(loaded, sample);
    }

    #[test]
    fn malformed_record_is_an_error() {
        let store = temp_store("malformed");
        fs::write(store.root().join("bad.json"), "{not json").unwrap();
        let result: Result<Sample> = store.load_or_default("bad");
        assert!(matches!(result, Err(StoreError::Malformed { .. })));
    }

    #[test]
    fn remove_is_idempotent() {
        let store = temp_store("remove");
        store.save("gone", &Sample::default()).unwrap();
        store.remove("gone").unwrap();
        store.remove("gone").unwrap();
        let sample: Sample = store.load_or_default("gone").unwrap();
        assert_eq!(sample, Sample::default());
    }
}
