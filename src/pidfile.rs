//! PID file exclusivity: one gateway per PID file path

use anyhow::{bail, Context, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Holds the PID file for the lifetime of the process; removed on drop
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Create `path` and write our PID into it. Fails if the file already
    /// exists, which means another gateway owns it (or a stale file was left).
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                bail!(
                    "Already a pid file at {}; is another gateway running?",
                    path.display()
                )
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to create pid file {}", path.display()))
            }
        };

        let pid_file = Self { path };
        writeln!(file, "{}", std::process::id())
            .with_context(|| format!("Failed to write pid file {}", pid_file.path.display()))?;

        Ok(pid_file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove pid file {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_writes_pid_and_removes_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gateway.pid");

        let pid_file = PidFile::create(&path).unwrap();
        let contents = fs::read_to_string(pid_file.path()).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());

        drop(pid_file);
        assert!(!path.exists());
    }

    #[test]
    fn test_second_instance_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gateway.pid");

        let _first = PidFile::create(&path).unwrap();
        let err = PidFile::create(&path).unwrap_err();
        assert!(err.to_string().contains("Already a pid file"));

        // The refused attempt must not delete the owner's file
        assert!(path.exists());
    }

    #[test]
    fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("no-such-dir").join("gateway.pid");
        assert!(PidFile::create(&path).is_err());
    }
}
