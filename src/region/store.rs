//! Deployment document persistence.
//!
//! # Responsibilities
//! - Read the whole deployment document (missing file = empty set)
//! - Rewrite the whole document atomically (temp file + rename)
//! - Cross-process exclusion through a sidecar `.lock` file
//!
//! # Design Decisions
//! - No partial or append writes
//! - A lock file older than `STALE_LOCK_AGE` is assumed abandoned by a dead process
//! - Each lock file carries a unique owner token; a lock file is only ever
//!   deleted by the holder whose token it contains, or moved aside whole
//!   when stale

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use thiserror::Error;

use crate::region::types::DeploymentSet;

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(25);
const STALE_LOCK_AGE: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read deployment store {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("deployment store {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write deployment store {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to acquire store lock {}: {source}", .path.display())]
    Lock { path: PathBuf, source: io::Error },

    #[error("timed out after {waited:?} waiting for store lock {}", .path.display())]
    LockTimeout { path: PathBuf, waited: Duration },
}

/// JSON file holding every deployment.
#[derive(Debug, Clone)]
pub struct DeploymentStore {
    path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
}

impl DeploymentStore {
    pub fn new(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        let path = path.into();
        let lock_path = sibling(&path, ".lock");
        Self {
            path,
            lock_path,
            lock_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document. A missing file is an empty set.
    pub fn load(&self) -> Result<DeploymentSet, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(DeploymentSet::default()),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_reader(BufReader::new(file)).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the document with `set`.
    pub fn save(&self, set: &DeploymentSet) -> Result<(), StoreError> {
        let write_err = |source: io::Error| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let tmp_path = sibling(&self.path, ".tmp");
        {
            let file = File::create(&tmp_path).map_err(write_err)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, set)
                .map_err(|e| write_err(io::Error::new(ErrorKind::InvalidData, e)))?;
            writer.flush().map_err(write_err)?;
            writer.get_ref().sync_all().map_err(write_err)?;
        }
        fs::rename(&tmp_path, &self.path).map_err(write_err)?;

        tracing::debug!(
            path = %self.path.display(),
            deployments = set.deployments.len(),
            "Deployment store written"
        );
        Ok(())
    }

    /// Take the cross-process lock, waiting up to the configured timeout.
    pub async fn lock(&self) -> Result<StoreLock, StoreError> {
        let started = tokio::time::Instant::now();
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.lock_path)
            {
                Ok(mut file) => {
                    let token = format!("{}:{}", std::process::id(), uuid::Uuid::new_v4());
                    if let Err(source) = file.write_all(token.as_bytes()).and_then(|()| file.sync_all()) {
                        let _ = fs::remove_file(&self.lock_path);
                        return Err(StoreError::Lock {
                            path: self.lock_path.clone(),
                            source,
                        });
                    }
                    return Ok(StoreLock {
                        path: self.lock_path.clone(),
                        token,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if self.clear_stale_lock() {
                        continue;
                    }
                    if started.elapsed() >= self.lock_timeout {
                        return Err(StoreError::LockTimeout {
                            path: self.lock_path.clone(),
                            waited: started.elapsed(),
                        });
                    }
                    tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    // Parent directory does not exist yet.
                    if let Some(parent) = self.lock_path.parent() {
                        fs::create_dir_all(parent).map_err(|source| StoreError::Lock {
                            path: self.lock_path.clone(),
                            source,
                        })?;
                    }
                }
                Err(source) => {
                    return Err(StoreError::Lock {
                        path: self.lock_path.clone(),
                        source,
                    })
                }
            }
        }
    }

    /// Move an abandoned lock aside. Returns true if the lock path may be free.
    fn clear_stale_lock(&self) -> bool {
        match self.stale_lock_token() {
            Some(stale_token) => self.take_over(&stale_token),
            None => false,
        }
    }

    /// Rename the lock file to a unique name, then compare its token with the
    /// one judged stale. If another waiter replaced the lock in between, the
    /// live lock is linked back into place.
    fn take_over(&self, stale_token: &str) -> bool {
        let aside = sibling(&self.lock_path, &format!(".stale-{}", uuid::Uuid::new_v4()));
        if fs::rename(&self.lock_path, &aside).is_err() {
            // Free again if someone else moved or released it.
            return !self.lock_path.exists();
        }

        let moved_token = fs::read_to_string(&aside).unwrap_or_default();
        if moved_token == stale_token {
            tracing::warn!(
                path = %self.lock_path.display(),
                owner = %stale_token,
                "Removed stale deployment store lock"
            );
            let _ = fs::remove_file(&aside);
            return true;
        }

        // Took a live lock by mistake; hard_link fails if the path was taken again.
        if let Err(e) = fs::hard_link(&aside, &self.lock_path) {
            tracing::error!(
                path = %self.lock_path.display(),
                error = %e,
                "Failed to restore a live store lock moved during stale recovery"
            );
        }
        let _ = fs::remove_file(&aside);
        false
    }

    /// Token of the current lock file if it is older than `STALE_LOCK_AGE`.
    fn stale_lock_token(&self) -> Option<String> {
        let modified = fs::metadata(&self.lock_path).and_then(|m| m.modified()).ok()?;
        let age = SystemTime::now().duration_since(modified).ok()?;
        if age < STALE_LOCK_AGE {
            return None;
        }
        tracing::debug!(
            path = %self.lock_path.display(),
            age_secs = age.as_secs(),
            "Store lock looks abandoned"
        );
        fs::read_to_string(&self.lock_path).ok()
    }
}

/// Held store lock; released on drop.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    token: String,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        match fs::read_to_string(&self.path) {
            Ok(current) if current == self.token => {
                if let Err(e) = fs::remove_file(&self.path) {
                    tracing::warn!(path = %self.path.display(), error = %e, "Failed to release store lock");
                }
            }
            _ => tracing::warn!(
                path = %self.path.display(),
                "Store lock was taken over as stale before release"
            ),
        }
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
