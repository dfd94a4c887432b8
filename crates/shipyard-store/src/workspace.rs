use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

// ── StoreRoot ──

/// Parent directory of all workspaces. Created lazily on first fetch.
#[derive(Debug, Clone)]
pub struct StoreRoot {
    path: PathBuf,
}

impl StoreRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<system temp>/shipyard-repos`
    pub fn system_default() -> Self {
        Self::new(std::env::temp_dir().join("shipyard-repos"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reserve a fresh directory `<hint>_<unix-nanos>[_<n>]` under the root.
    ///
    /// `create_dir` fails on an existing entry, so two concurrent requests can
    /// never end up sharing a directory.
    pub(crate) fn reserve(&self, hint: &str) -> io::Result<Workspace> {
        std::fs::create_dir_all(&self.path)?;
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let base = format!("{hint}_{nanos}");
        for attempt in 0..1000u32 {
            let name = if attempt == 0 {
                base.clone()
            } else {
                format!("{base}_{attempt}")
            };
            let path = self.path.join(&name);
            match std::fs::create_dir(&path) {
                Ok(()) => return Ok(Workspace::new(name, path)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free workspace name for {base}"),
        ))
    }

    /// Remove the whole root. An absent root counts as success.
    pub fn purge(&self) -> io::Result<()> {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

// ── Workspace ──

/// A disposable directory holding one cloned repository.
///
/// Released exactly once: explicitly via [`Workspace::release`], or on drop.
#[derive(Debug)]
pub struct Workspace {
    name: String,
    path: PathBuf,
    released: bool,
}

impl Workspace {
    fn new(name: String, path: PathBuf) -> Self {
        Self {
            name,
            path,
            released: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Delete the directory tree. Idempotent; failures are logged, never returned.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => tracing::debug!(workspace = %self.name, "workspace released"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                workspace = %self.name,
                error = %e,
                "failed to remove workspace"
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.release();
    }
}
