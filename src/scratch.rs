//! Scoped scratch directories for ingestion passes.
//!
//! A [`ScratchDir`] is removed when dropped, so every exit path of a pass
//! (including `?` returns and panics that unwind) releases it.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub enum ScratchDir {
    /// Fresh directory under the system temp dir.
    Temp(tempfile::TempDir),
    /// Caller-chosen directory, wiped on acquisition and on drop.
    Fixed(PathBuf),
}

impl ScratchDir {
    pub fn temp(prefix: &str) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .context("Failed to create scratch directory")?;
        Ok(ScratchDir::Temp(dir))
    }

    /// Use `path`, clearing anything a previous pass left there.
    pub fn fixed(path: &Path) -> Result<Self> {
        if path.exists() {
            std::fs::remove_dir_all(path)
                .with_context(|| format!("Failed to clear {}", path.display()))?;
        }
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(ScratchDir::Fixed(path.to_path_buf()))
    }

    /// `fixed` when a path is configured, `temp` otherwise.
    pub fn acquire(fixed: Option<&Path>, prefix: &str) -> Result<Self> {
        match fixed {
            Some(path) => Self::fixed(path),
            None => Self::temp(prefix),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ScratchDir::Temp(dir) => dir.path(),
            ScratchDir::Fixed(path) => path,
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let ScratchDir::Fixed(path) = self {
            if let Err(e) = std::fs::remove_dir_all(&*path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove scratch directory");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_dir_removed_on_drop() {
        let scratch = ScratchDir::temp("askdocs-test-").unwrap();
        let path = scratch.path().to_path_buf();
        std::fs::write(path.join("a.txt"), "x").unwrap();
        assert!(path.exists());
        drop(scratch);
        assert!(!path.exists());
    }

    #[test]
    fn fixed_dir_is_cleared_before_use() {
        let root = tempfile::TempDir::new().unwrap();
        let mirror = root.path().join("mirror");
        std::fs::create_dir_all(mirror.join("old")).unwrap();
        std::fs::write(mirror.join("old/stale.txt"), "stale").unwrap();

        let scratch = ScratchDir::fixed(&mirror).unwrap();
        assert!(scratch.path().exists());
        assert!(!mirror.join("old/stale.txt").exists());
        drop(scratch);
        assert!(!mirror.exists());
    }

    #[test]
    fn removed_on_early_return() {
        fn failing_pass(seen: &mut Option<PathBuf>) -> Result<()> {
            let scratch = ScratchDir::temp("askdocs-test-")?;
            *seen = Some(scratch.path().to_path_buf());
            anyhow::bail!("boom")
        }
        let mut seen = None;
        assert!(failing_pass(&mut seen).is_err());
        assert!(!seen.unwrap().exists());
    }
}
