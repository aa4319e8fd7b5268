//! `.gitmem/` workspace resolution, config I/O, and the lock-file guard.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::config::GitmemConfig;
use crate::error::GitmemError;

#[derive(Debug, Clone)]
pub struct Workspace {
    /// Directory containing `.git`.
    pub repo_root: PathBuf,
    /// `<repo_root>/.gitmem`.
    pub gitmem_dir: PathBuf,
}

impl Workspace {
    /// Walks up from `start` looking for a `.git` entry, the same way
    /// `is_repo` and branch resolution treat repository boundaries.
    pub fn discover(start: impl AsRef<Path>) -> Result<Self, GitmemError> {
        let mut dir = std::fs::canonicalize(start.as_ref()).unwrap_or_else(|_| start.as_ref().to_path_buf());
        loop {
            if dir.join(".git").exists() {
                let gitmem_dir = dir.join(".gitmem");
                return Ok(Workspace {
                    repo_root: dir,
                    gitmem_dir,
                });
            }
            if !dir.pop() {
                return Err(GitmemError::NotARepo(start.as_ref().to_path_buf()));
            }
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.gitmem_dir.join("config.json")
    }

    pub fn db_path(&self) -> PathBuf {
        self.gitmem_dir.join("index.db")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.gitmem_dir.join("index.lock")
    }

    pub fn is_initialized(&self) -> bool {
        self.config_path().is_file()
    }

    pub async fn load_config(&self) -> Result<GitmemConfig, GitmemError> {
        let path = self.config_path();
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|_| GitmemError::NotInitialized(path.clone()))?;
        GitmemConfig::parse(&raw)
    }

    pub async fn save_config(&self, config: &GitmemConfig) -> Result<(), GitmemError> {
        tokio::fs::create_dir_all(&self.gitmem_dir).await?;
        let json = serde_json::to_string_pretty(&config.to_json())
            .expect("GitmemConfig::to_json always produces a serializable value");
        tokio::fs::write(self.config_path(), json).await?;
        Ok(())
    }

    /// Acquires the exclusive write lock for the duration of the returned
    /// guard. Fails immediately with `LockHeld` if another process holds it;
    /// never waits, never steals.
    pub fn acquire_lock(&self) -> Result<LockGuard, GitmemError> {
        LockGuard::acquire(self.lock_path())
    }
}

/// RAII guard over `.gitmem/index.lock`. The lock is presence-only: its
/// contents (the holder's PID) are advisory, never compared. Dropped on any
/// exit path — success, error, or panic unwind — except process death by
/// signal, which intentionally leaves the file behind (see design notes on
/// stale-lock policy; no self-heal).
pub struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    fn acquire(path: PathBuf) -> Result<Self, GitmemError> {
        use std::fs::OpenOptions;

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = write!(file, "{}", std::process::id());
                Ok(LockGuard { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(GitmemError::LockHeld(path))
            }
            Err(e) => Err(GitmemError::Io(e)),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_walks_up_to_git_dir() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join(".git")).unwrap();
        let nested = tmp.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();

        let ws = Workspace::discover(&nested).unwrap();
        assert_eq!(ws.repo_root, std::fs::canonicalize(tmp.path()).unwrap());
    }

    #[test]
    fn discover_fails_outside_a_repo() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(Workspace::discover(tmp.path()).is_err());
    }

    #[test]
    fn second_lock_acquisition_fails_without_touching_the_first() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join(".git")).unwrap();
        let ws = Workspace {
            repo_root: tmp.path().to_path_buf(),
            gitmem_dir: tmp.path().join(".gitmem"),
        };
        std::fs::create_dir_all(&ws.gitmem_dir).unwrap();

        let first = ws.acquire_lock().unwrap();
        let second = ws.acquire_lock();
        assert!(second.is_err());
        drop(first);
        assert!(ws.acquire_lock().is_ok());
    }
}
