//! In-memory view over the durable placeholder store.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use lectern_core::PlaceholderRecord;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::store::{self, Entries};

/// Marker field written into every stand-in file.
pub const PLACEHOLDER_STUB_MARKER: &str = "lectern_placeholder";

#[derive(Serialize)]
struct Stub<'a> {
    lectern_placeholder: bool,
    identity: &'a str,
}

/// Durable mapping of stand-in paths to their records.
#[derive(Debug)]
pub struct PlaceholderRegistry {
    store_path: PathBuf,
    entries: Mutex<Entries>,
    available: AtomicBool,
}

impl PlaceholderRegistry {
    /// Load the registry from `store_path`.
    ///
    /// Never fails: an unreadable store is logged and the registry reports
    /// itself empty and unavailable.
    #[must_use]
    pub fn open(store_path: impl Into<PathBuf>) -> Self {
        let store_path = store_path.into();
        let (entries, available) = match store::load(&store_path) {
            Ok(entries) => {
                debug!(
                    path = %store_path.display(),
                    placeholders = entries.len(),
                    "placeholder registry loaded"
                );
                (entries, true)
            }
            Err(err) => {
                warn!(
                    error = %err,
                    path = %store_path.display(),
                    "placeholder registry unavailable; treating every path as real"
                );
                (Entries::new(), false)
            }
        };
        Self {
            store_path,
            entries: Mutex::new(entries),
            available: AtomicBool::new(available),
        }
    }

    /// Location of the backing store.
    #[must_use]
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Whether the backing store loaded successfully.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Whether `path` is a registered stand-in.
    #[must_use]
    pub fn is_placeholder(&self, path: &Path) -> bool {
        self.lock_entries().contains_key(path)
    }

    /// Record for `path`, if it is a stand-in.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<PlaceholderRecord> {
        self.lock_entries().get(path).cloned()
    }

    /// Every registered stand-in, ordered by path.
    #[must_use]
    pub fn list_all(&self) -> Vec<PlaceholderRecord> {
        self.lock_entries().values().cloned().collect()
    }

    /// Register a stand-in record, replacing any record at the same path.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is unavailable or cannot be written.
    pub fn register(&self, record: PlaceholderRecord) -> RegistryResult<()> {
        self.ensure_available()?;
        let mut entries = self.lock_entries();
        let mut next = entries.clone();
        let path = record.path.clone();
        next.insert(path.clone(), record);
        store::persist(&self.store_path, &next)?;
        *entries = next;
        info!(path = %path.display(), "placeholder registered");
        Ok(())
    }

    /// Write a stand-in file for `identity` at `path` and register it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::RealContent`] when a file that is not a known
    /// stand-in already exists at `path`, or an IO error when writing fails.
    pub fn materialize(&self, identity: &str, path: &Path) -> RegistryResult<PlaceholderRecord> {
        self.ensure_available()?;
        if path.exists() && !self.is_placeholder(path) {
            return Err(RegistryError::RealContent {
                path: path.to_path_buf(),
            });
        }
        let stub = Stub {
            lectern_placeholder: true,
            identity,
        };
        let body = serde_json::to_vec_pretty(&stub)
            .map_err(|err| RegistryError::json("stub.serialize", path, err))?;
        store::write_atomic(path, &body)?;

        let record = PlaceholderRecord::new(identity, path);
        self.register(record.clone())?;
        Ok(record)
    }

    /// Remove the record for `path`; returns whether one existed.
    ///
    /// Removing an unknown path is not an error and touches nothing on disk.
    ///
    /// # Errors
    ///
    /// Returns an error when the updated store cannot be written; the
    /// in-memory view is left unchanged in that case.
    pub fn remove(&self, path: &Path) -> RegistryResult<bool> {
        let mut entries = self.lock_entries();
        if !entries.contains_key(path) {
            return Ok(false);
        }
        let mut next = entries.clone();
        next.remove(path);
        store::persist(&self.store_path, &next)?;
        *entries = next;
        info!(path = %path.display(), "placeholder removed from registry");
        Ok(true)
    }

    fn ensure_available(&self) -> RegistryResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(RegistryError::Unavailable {
                path: self.store_path.clone(),
            })
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, Entries> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("placeholder registry mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}
