//! Built-in cache targets configured through `LECTERN_CACHE_TARGETS`.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use lectern_config::{CacheTargetKind, CacheTargetSpec};
use lectern_core::{CacheError, CacheResult, CacheTarget, ContentKey};
use serde_json::{Map, Value};
use tracing::debug;
use walkdir::WalkDir;

/// Build the target described by a configuration entry.
#[must_use]
pub fn build_target(spec: &CacheTargetSpec) -> Arc<dyn CacheTarget> {
    match spec.kind {
        CacheTargetKind::Directory => {
            Arc::new(DirectoryCacheTarget::new(spec.name.clone(), spec.path.clone()))
        }
        CacheTargetKind::Index => Arc::new(IndexCacheTarget::new(spec.name.clone(), spec.path.clone())),
    }
}

fn keys_for(old_path: &Path, new_path: &Path) -> Vec<ContentKey> {
    let mut keys: Vec<ContentKey> = [old_path, new_path]
        .into_iter()
        .filter_map(ContentKey::from_path)
        .collect();
    keys.dedup();
    keys
}

async fn blocking<T, F>(task: F) -> CacheResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> CacheResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| CacheError::Collaborator {
            detail: format!("cache worker failed: {err}"),
        })?
}

/// Directory of derived files (covers, thumbnails) named after the content.
///
/// Files are matched on their base name only, since the cache directory
/// does not mirror the library layout.
#[derive(Debug, Clone)]
pub struct DirectoryCacheTarget {
    name: String,
    root: PathBuf,
}

impl DirectoryCacheTarget {
    /// Target over `root`.
    #[must_use]
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }
}

#[async_trait]
impl CacheTarget for DirectoryCacheTarget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self) -> bool {
        tokio::fs::metadata(&self.root)
            .await
            .is_ok_and(|metadata| metadata.is_dir())
    }

    async fn invalidate(&self, old_path: &Path, new_path: &Path) -> CacheResult<usize> {
        let keys: Vec<ContentKey> = keys_for(old_path, new_path)
            .iter()
            .map(ContentKey::without_dir)
            .collect();
        let root = self.root.clone();
        blocking(move || purge_directory(&root, &keys)).await
    }
}

fn purge_directory(root: &Path, keys: &[ContentKey]) -> CacheResult<usize> {
    let mut removed = 0;
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(root).to_path_buf();
            CacheError::io("cache.walk", path, io::Error::from(err))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !keys.iter().any(|key| key.matches_name(name)) {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => {
                debug!(path = %entry.path().display(), "removed derived cache file");
                removed += 1;
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(CacheError::io("cache.remove", entry.path(), err)),
        }
    }
    Ok(removed)
}

/// JSON object whose keys are content paths or file names.
///
/// Full-path keys must match directory and base identity; bare file-name
/// keys match on base identity alone.
#[derive(Debug, Clone)]
pub struct IndexCacheTarget {
    name: String,
    path: PathBuf,
}

impl IndexCacheTarget {
    /// Target over the index file at `path`.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl CacheTarget for IndexCacheTarget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self) -> bool {
        tokio::fs::metadata(&self.path)
            .await
            .is_ok_and(|metadata| metadata.is_file())
    }

    async fn invalidate(&self, old_path: &Path, new_path: &Path) -> CacheResult<usize> {
        let keys = keys_for(old_path, new_path);
        let path = self.path.clone();
        blocking(move || purge_index(&path, &keys)).await
    }
}

fn purge_index(path: &Path, keys: &[ContentKey]) -> CacheResult<usize> {
    let raw = fs::read(path).map_err(|err| CacheError::io("index.read", path, err))?;
    let value: Value = serde_json::from_slice(&raw).map_err(|err| CacheError::Invalid {
        path: path.to_path_buf(),
        detail: err.to_string(),
    })?;
    let Value::Object(entries) = value else {
        return Err(CacheError::Invalid {
            path: path.to_path_buf(),
            detail: "index is not a JSON object".to_string(),
        });
    };

    let before = entries.len();
    let retained: Map<String, Value> = entries
        .into_iter()
        .filter(|(key, _)| {
            let candidate = ContentKey::from_path(Path::new(key))
                .unwrap_or_else(|| ContentKey::from_file_name(key));
            !keys.iter().any(|stale| stale.matches(&candidate))
        })
        .collect();
    let removed = before - retained.len();
    if removed == 0 {
        return Ok(0);
    }

    let body = serde_json::to_vec_pretty(&Value::Object(retained)).map_err(|err| {
        CacheError::Invalid {
            path: path.to_path_buf(),
            detail: err.to_string(),
        }
    })?;
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, body).map_err(|err| CacheError::io("index.write", &tmp_path, err))?;
    fs::rename(&tmp_path, path).map_err(|err| {
        let _ = fs::remove_file(&tmp_path);
        CacheError::io("index.rename", path, err)
    })?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult<T> = anyhow::Result<T>;

    #[tokio::test]
    async fn directory_target_removes_every_naming_variant() -> TestResult<()> {
        let dir = TempDir::new()?;
        let covers = dir.path().join("covers");
        fs::create_dir_all(covers.join("nested"))?;
        for name in ["novel.jpg", "novel.kepub.epub.png", "nested/novel.thumb.webp", "other.jpg"] {
            fs::write(covers.join(name), b"x")?;
        }
        let target = DirectoryCacheTarget::new("covers", &covers);
        assert!(target.probe().await);

        let removed = target
            .invalidate(Path::new("/lib/novel.epub"), Path::new("/lib/novel.epub"))
            .await?;
        assert_eq!(removed, 3);
        assert!(covers.join("other.jpg").exists());
        assert!(!covers.join("nested/novel.thumb.webp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn missing_directory_probes_absent() -> TestResult<()> {
        let dir = TempDir::new()?;
        let target = DirectoryCacheTarget::new("covers", dir.path().join("nope"));
        assert!(!target.probe().await);
        Ok(())
    }

    #[tokio::test]
    async fn index_target_drops_matching_keys_only() -> TestResult<()> {
        let dir = TempDir::new()?;
        let index = dir.path().join("metadata.json");
        let body = serde_json::json!({
            "/lib/shelf/novel.epub": {"title": "Novel"},
            "/lib/shelf/novel.kepub.epub": {"title": "Novel (kepub)"},
            "/lib/other/novel.epub": {"title": "Different shelf"},
            "novel.epub": {"title": "by name"},
            "/lib/shelf/sequel.epub": {"title": "Sequel"}
        });
        fs::write(&index, serde_json::to_vec(&body)?)?;
        let target = IndexCacheTarget::new("metadata", &index);

        let removed = target
            .invalidate(
                Path::new("/lib/shelf/novel.epub"),
                Path::new("/lib/shelf/novel.epub"),
            )
            .await?;
        assert_eq!(removed, 3);
        let after: Value = serde_json::from_slice(&fs::read(&index)?)?;
        let keys: Vec<&String> = after.as_object().map(|o| o.keys().collect()).unwrap_or_default();
        assert_eq!(keys, vec!["/lib/other/novel.epub", "/lib/shelf/sequel.epub"]);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_index_is_reported() -> TestResult<()> {
        let dir = TempDir::new()?;
        let index = dir.path().join("listing.json");
        fs::write(&index, b"[1, 2]")?;
        let target = IndexCacheTarget::new("listing", &index);
        let err = target
            .invalidate(Path::new("/lib/a.epub"), Path::new("/lib/a.epub"))
            .await
            .err();
        assert!(matches!(err, Some(CacheError::Invalid { .. })));
        Ok(())
    }

    #[test]
    fn specs_build_matching_targets() {
        let spec = CacheTargetSpec {
            name: "covers".into(),
            kind: CacheTargetKind::Directory,
            path: PathBuf::from("/var/cache/covers"),
        };
        assert_eq!(build_target(&spec).name(), "covers");
    }
}
