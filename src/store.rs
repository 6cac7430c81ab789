//! Seed and guideline persistence
//!
//! Seeds live as one JSON document per trial in a flat directory, named
//! `seed_{session_id}_{option_id}.json`. Lookups never parse filenames:
//! an explicit index (`session_id → option_id → path`) is built from the
//! documents' own metadata when the store opens and maintained on every
//! write.
//!
//! Writes are atomic: the document is serialized to a temporary file in the
//! same directory and renamed into place, so a reader can never observe a
//! partially-written seed or guideline.

use crate::error::StorageError;
use crate::types::{Seed, SeedKey};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory-backed store of Seed documents with an in-memory session index
#[derive(Debug)]
pub struct SeedStore {
    root: PathBuf,
    /// session_id → option_id → document path
    index: BTreeMap<String, BTreeMap<String, PathBuf>>,
}

impl SeedStore {
    /// Open (or create) a seed directory and build the session index from
    /// the stored documents. A corrupt document fails the open rather than
    /// being silently dropped from the index.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StorageError::Write {
            path: root.clone(),
            source,
        })?;

        let mut index: BTreeMap<String, BTreeMap<String, PathBuf>> = BTreeMap::new();
        let entries = fs::read_dir(&root).map_err(|source| StorageError::Read {
            path: root.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| StorageError::Read {
                path: root.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let seed = read_seed(&path)?;
            index
                .entry(seed.meta.session_id)
                .or_default()
                .insert(seed.meta.option_id, path);
        }

        Ok(Self { root, index })
    }

    /// Directory backing this store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Atomic create-or-overwrite keyed by `(session_id, option_id)`
    pub fn put(&mut self, seed: &Seed) -> Result<(), StorageError> {
        let path = self.seed_path(&seed.key());
        write_json_atomic(&path, seed)?;
        self.index
            .entry(seed.meta.session_id.clone())
            .or_default()
            .insert(seed.meta.option_id.clone(), path);
        Ok(())
    }

    /// One Seed, or `None` when the key is unknown
    pub fn get(&self, session_id: &str, option_id: &str) -> Result<Option<Seed>, StorageError> {
        let path = match self
            .index
            .get(session_id)
            .and_then(|options| options.get(option_id))
        {
            Some(path) => path,
            None => return Ok(None),
        };
        read_seed(path).map(Some)
    }

    /// Every Seed of one session, in lexical option order (stable within a
    /// process run). Empty when the session is unknown.
    pub fn get_session(&self, session_id: &str) -> Result<Vec<Seed>, StorageError> {
        let options = match self.index.get(session_id) {
            Some(options) => options,
            None => return Ok(Vec::new()),
        };
        options.values().map(|path| read_seed(path)).collect()
    }

    /// Known session ids with their seed counts, lexically ordered
    pub fn sessions(&self) -> Vec<(String, usize)> {
        self.index
            .iter()
            .map(|(session, options)| (session.clone(), options.len()))
            .collect()
    }

    /// All labeled Seeds across every session, in lexical key order.
    /// This is the guideline-synthesis corpus.
    pub fn labeled_seeds(&self) -> Result<Vec<Seed>, StorageError> {
        let mut labeled = Vec::new();
        for options in self.index.values() {
            for path in options.values() {
                let seed = read_seed(path)?;
                if seed.is_labeled() {
                    labeled.push(seed);
                }
            }
        }
        Ok(labeled)
    }

    fn seed_path(&self, key: &SeedKey) -> PathBuf {
        self.root
            .join(format!("seed_{}_{}.json", key.session_id, key.option_id))
    }
}

/// Single active guideline document, replaced wholesale on each successful
/// synthesis. No history is kept.
#[derive(Debug, Clone)]
pub struct GuidelineStore {
    path: PathBuf,
}

impl GuidelineStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the guideline document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The active guideline, or `None` when no synthesis has succeeded yet
    pub fn load(&self) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Atomically replace the active guideline
    pub fn replace(&self, text: &str) -> Result<(), StorageError> {
        let tmp = tmp_path(&self.path);
        fs::write(&tmp, text).map_err(|source| StorageError::Write {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StorageError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

fn read_seed(path: &Path) -> Result<Seed, StorageError> {
    let bytes = fs::read(path).map_err(|source| StorageError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| StorageError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json_atomic(path: &Path, seed: &Seed) -> Result<(), StorageError> {
    let json = serde_json::to_vec_pretty(seed).map_err(|source| StorageError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = tmp_path(path);
    fs::write(&tmp, json).map_err(|source| StorageError::Write {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Temp file next to the target so the rename stays within one filesystem
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
