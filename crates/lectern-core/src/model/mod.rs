//! Data carriers exchanged between pipeline stages.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File name suffixes that may be stacked onto a content base name.
///
/// Matching strips these from the end of a file name, repeatedly, so
/// `novel.kepub.epub`, `novel.epub.placeholder` and `novel.jpg` all reduce
/// to `novel`.
pub const KNOWN_SUFFIXES: &[&str] = &[
    "epub",
    "kepub",
    "pdf",
    "mobi",
    "azw",
    "azw3",
    "cbz",
    "cbr",
    "fb2",
    "txt",
    "placeholder",
    "part",
    "tmp",
    "jpg",
    "jpeg",
    "png",
    "webp",
    "gif",
    "json",
    "thumb",
    "cover",
];

/// Durable record of a stand-in file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderRecord {
    /// Stable content key, e.g. a catalog id.
    pub identity: String,
    /// Location of the stand-in file.
    pub path: PathBuf,
    /// When the stand-in was registered.
    pub created_at: DateTime<Utc>,
}

impl PlaceholderRecord {
    /// Build a record stamped with the current time.
    #[must_use]
    pub fn new(identity: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            identity: identity.into(),
            path: path.into(),
            created_at: Utc::now(),
        }
    }
}

/// Artifact written to the staging directory by a fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArtifact {
    /// Staged file, outside the content tree.
    pub temp_path: PathBuf,
    /// File name announced by the source, if any.
    pub suggested_name: Option<String>,
    /// Size in bytes.
    pub bytes: u64,
}

/// Proof that a restart mechanism accepted the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartTicket {
    /// Mechanism that accepted the request.
    pub mechanism: String,
    /// Exit code the current process should terminate with.
    pub exit_code: i32,
}

/// Content identity derived from a path by stripping known suffix chains.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentKey {
    dir: Option<PathBuf>,
    base: String,
}

impl ContentKey {
    /// Key for a full path; the parent directory takes part in matching.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf);
        Some(Self {
            dir,
            base: strip_suffixes(name).to_string(),
        })
    }

    /// Key for a bare file name; matches regardless of directory.
    #[must_use]
    pub fn from_file_name(name: &str) -> Self {
        Self {
            dir: None,
            base: strip_suffixes(name).to_string(),
        }
    }

    /// Base identity with every known suffix removed.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Same key without the directory constraint.
    #[must_use]
    pub fn without_dir(&self) -> Self {
        Self {
            dir: None,
            base: self.base.clone(),
        }
    }

    /// Whether `other` names the same content.
    ///
    /// Directories are compared only when both keys carry one.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        if self.base != other.base {
            return false;
        }
        match (&self.dir, &other.dir) {
            (Some(left), Some(right)) => left == right,
            _ => true,
        }
    }

    /// Whether the file at `path` names the same content.
    #[must_use]
    pub fn matches_path(&self, path: &Path) -> bool {
        Self::from_path(path).is_some_and(|other| self.matches(&other))
    }

    /// Whether a bare file name names the same content.
    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        self.base == strip_suffixes(name)
    }
}

fn strip_suffixes(name: &str) -> &str {
    let mut base = name;
    while let Some((stem, ext)) = base.rsplit_once('.') {
        if stem.is_empty() {
            break;
        }
        let known = KNOWN_SUFFIXES
            .iter()
            .any(|suffix| suffix.eq_ignore_ascii_case(ext));
        if !known {
            break;
        }
        base = stem;
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_chains_reduce_to_the_same_base() {
        let names = [
            "novel.epub",
            "novel.kepub.epub",
            "novel.epub.placeholder",
            "novel.jpg",
            "novel.thumb.webp",
            "novel",
        ];
        for name in names {
            assert_eq!(ContentKey::from_file_name(name).base(), "novel", "{name}");
        }
    }

    #[test]
    fn unknown_segments_are_part_of_the_base() {
        let key = ContentKey::from_file_name("vol.2.epub");
        assert_eq!(key.base(), "vol.2");
        assert!(!key.matches_name("vol.epub"));
        assert_eq!(ContentKey::from_file_name(".epub").base(), ".epub");
    }

    #[test]
    fn directory_participates_only_when_both_sides_have_one() {
        let key = ContentKey::from_path(Path::new("/lib/a/novel.epub")).expect("key");
        assert!(key.matches_path(Path::new("/lib/a/novel.kepub.epub")));
        assert!(!key.matches_path(Path::new("/lib/b/novel.epub")));
        assert!(key.without_dir().matches_path(Path::new("/lib/b/novel.epub")));
        assert!(key.matches(&ContentKey::from_file_name("novel.png")));
    }

    #[test]
    fn placeholder_record_round_trips_through_json() -> anyhow::Result<()> {
        let record = PlaceholderRecord::new("42", "/lib/a.epub");
        let json = serde_json::to_string(&record)?;
        let back: PlaceholderRecord = serde_json::from_str(&json)?;
        assert_eq!(back, record);
        Ok(())
    }
}
