use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use lectern_core::PlaceholderRecord;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RegistryError, RegistryResult};

const STORE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    placeholders: Vec<PlaceholderRecord>,
}

pub(crate) type Entries = BTreeMap<PathBuf, PlaceholderRecord>;

/// Missing store means a fresh library and yields an empty map.
pub(crate) fn load(path: &Path) -> RegistryResult<Entries> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Entries::new()),
        Err(err) => return Err(RegistryError::io("store.read", path, err)),
    };
    let document: StoreDocument =
        serde_json::from_str(&raw).map_err(|err| RegistryError::json("store.parse", path, err))?;
    Ok(document
        .placeholders
        .into_iter()
        .map(|record| (record.path.clone(), record))
        .collect())
}

pub(crate) fn persist(path: &Path, entries: &Entries) -> RegistryResult<()> {
    let document = StoreDocument {
        version: STORE_VERSION,
        placeholders: entries.values().cloned().collect(),
    };
    let serialised = serde_json::to_vec_pretty(&document)
        .map_err(|err| RegistryError::json("store.serialize", path, err))?;
    write_atomic(path, &serialised)
}

pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> RegistryResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|err| RegistryError::io("store.create_dir", parent, err))?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents).map_err(|err| RegistryError::io("store.write", &tmp_path, err))?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        discard_temp(&tmp_path);
        return Err(RegistryError::io("store.rename", path, err));
    }
    Ok(())
}

fn discard_temp(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => warn!(error = %err, path = %path.display(), "failed to remove registry temp file"),
    }
}
