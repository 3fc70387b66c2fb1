//! Navigation sink that renders to a text stream.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use lectern_core::{NavigationError, NavigationResult, NavigationSink};
use tokio::fs;
use tracing::{debug, error};

/// Prints folder listings and open requests to a writer (stdout for the CLI).
pub struct ConsoleNavigation<W> {
    out: Mutex<W>,
    library_root: PathBuf,
}

impl ConsoleNavigation<io::Stdout> {
    /// Sink writing to standard output.
    #[must_use]
    pub fn stdout(library_root: impl Into<PathBuf>) -> Self {
        Self::new(io::stdout(), library_root)
    }
}

impl<W: Write + Send> ConsoleNavigation<W> {
    /// Sink writing to `out`; `library_root` must exist for the sink to be available.
    pub fn new(out: W, library_root: impl Into<PathBuf>) -> Self {
        Self {
            out: Mutex::new(out),
            library_root: library_root.into(),
        }
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn writer(&self) -> MutexGuard<'_, W> {
        match self.out.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("console navigation mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }

    fn write_lines(&self, path: &Path, lines: &[String]) -> NavigationResult<()> {
        let mut out = self.writer();
        for line in lines {
            writeln!(out, "{line}").map_err(|source| NavigationError::Io {
                operation: "navigation.write",
                path: path.to_path_buf(),
                source,
            })?;
        }
        out.flush().map_err(|source| NavigationError::Io {
            operation: "navigation.flush",
            path: path.to_path_buf(),
            source,
        })
    }
}

#[async_trait]
impl<W: Write + Send> NavigationSink for ConsoleNavigation<W> {
    async fn navigate(&self, folder: &Path) -> NavigationResult<()> {
        if !is_dir(folder).await {
            return Err(NavigationError::TargetMissing {
                path: folder.to_path_buf(),
            });
        }
        let read_failure = |source| NavigationError::Io {
            operation: "navigation.read_dir",
            path: folder.to_path_buf(),
            source,
        };
        let mut reader = fs::read_dir(folder).await.map_err(read_failure)?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(read_failure)? {
            entries.push(entry.file_name().to_string_lossy().into_owned());
        }
        entries.sort();
        debug!(folder = %folder.display(), entries = entries.len(), "navigating");

        let mut lines = Vec::with_capacity(entries.len() + 1);
        lines.push(format!("{}:", folder.display()));
        lines.extend(entries.into_iter().map(|name| format!("  {name}")));
        self.write_lines(folder, &lines)
    }

    async fn open_content(&self, path: &Path) -> NavigationResult<()> {
        let is_file = fs::metadata(path)
            .await
            .is_ok_and(|metadata| metadata.is_file());
        if !is_file {
            return Err(NavigationError::TargetMissing {
                path: path.to_path_buf(),
            });
        }
        self.write_lines(path, &[format!("Opening {}", path.display())])
    }

    async fn target_available(&self) -> bool {
        is_dir(&self.library_root).await
    }
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .is_ok_and(|metadata| metadata.is_dir())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn output(nav: ConsoleNavigation<Vec<u8>>) -> String {
        String::from_utf8_lossy(&nav.into_inner()).into_owned()
    }

    #[tokio::test]
    async fn navigate_lists_folder_entries_sorted() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("b.epub"), b"b")?;
        std::fs::write(dir.path().join("a.epub"), b"a")?;
        let nav = ConsoleNavigation::new(Vec::new(), dir.path());

        nav.navigate(dir.path()).await?;

        let printed = output(nav);
        let a = printed.find("a.epub").unwrap_or(usize::MAX);
        let b = printed.find("b.epub").unwrap_or(0);
        assert!(a < b, "entries not sorted: {printed}");
        Ok(())
    }

    #[tokio::test]
    async fn missing_targets_are_reported() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let nav = ConsoleNavigation::new(Vec::new(), dir.path());

        let folder = nav.navigate(&dir.path().join("gone")).await;
        assert!(matches!(folder, Err(NavigationError::TargetMissing { .. })));
        let file = nav.open_content(&dir.path().join("gone.epub")).await;
        assert!(matches!(file, Err(NavigationError::TargetMissing { .. })));
        let not_a_folder = dir.path().join("loose.epub");
        std::fs::write(&not_a_folder, b"x")?;
        let folder = nav.navigate(&not_a_folder).await;
        assert!(matches!(folder, Err(NavigationError::TargetMissing { .. })));
        let not_a_file = nav.open_content(dir.path()).await;
        assert!(matches!(not_a_file, Err(NavigationError::TargetMissing { .. })));
        assert!(output(nav).is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn open_content_prints_path() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let book = dir.path().join("book.epub");
        std::fs::write(&book, b"content")?;
        let nav = ConsoleNavigation::new(Vec::new(), dir.path());

        nav.open_content(&book).await?;

        assert!(output(nav).starts_with("Opening "));
        Ok(())
    }

    #[tokio::test]
    async fn availability_follows_library_root() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let present = ConsoleNavigation::new(Vec::new(), dir.path());
        let absent = ConsoleNavigation::new(Vec::new(), dir.path().join("missing"));
        assert!(present.target_available().await);
        assert!(!absent.target_available().await);
        Ok(())
    }
}
