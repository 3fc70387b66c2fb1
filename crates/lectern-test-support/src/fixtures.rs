//! Temporary library layouts.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use lectern_config::LecternConfig;
use tempfile::TempDir;

/// Stand-in body written by [`LibraryFixture::write_placeholder`].
pub const PLACEHOLDER_BODY: &[u8] = b"{\"lectern_placeholder\":true}";

/// A library root, state directory and staging directory under one temp dir.
///
/// Staging sits beside the library, never inside it.
#[derive(Debug)]
pub struct LibraryFixture {
    dir: TempDir,
    config: LecternConfig,
}

impl LibraryFixture {
    /// Create the layout on disk.
    ///
    /// # Errors
    ///
    /// Fails when the temporary directories cannot be created.
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("lectern-test-").tempdir()?;
        let library = dir.path().join("library");
        let staging = dir.path().join("staging");
        fs::create_dir_all(&library)?;
        fs::create_dir_all(&staging)?;
        let config = LecternConfig::for_library(library, staging);
        Ok(Self { dir, config })
    }

    /// Configuration pointing at this layout.
    #[must_use]
    pub const fn config(&self) -> &LecternConfig {
        &self.config
    }

    /// Root of the temporary tree.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Library root.
    #[must_use]
    pub fn library(&self) -> &Path {
        &self.config.library_root
    }

    /// Staging directory.
    #[must_use]
    pub fn staging(&self) -> &Path {
        &self.config.temp_dir
    }

    /// Path of `relative` inside the library.
    #[must_use]
    pub fn library_path(&self, relative: &str) -> PathBuf {
        self.config.library_root.join(relative)
    }

    /// Write a stand-in file (not registered) and return its path.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be written.
    pub fn write_placeholder(&self, relative: &str) -> Result<PathBuf> {
        self.write_file(relative, PLACEHOLDER_BODY)
    }

    /// Write arbitrary bytes inside the library and return the path.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be written.
    pub fn write_file(&self, relative: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.library_path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Number of entries in the staging directory.
    ///
    /// # Errors
    ///
    /// Fails when the directory cannot be read.
    pub fn staged_count(&self) -> Result<usize> {
        Ok(fs::read_dir(self.staging())?.count())
    }
}
