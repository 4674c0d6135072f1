//! The provisioned runtime environment and its lock file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lock file written at the root of every provisioned environment.
pub const LOCK_FILE: &str = "environment.lock";

/// Directory (relative to the environment root) holding installed packages.
pub const PACKAGES_DIR: &str = "packages";

#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("no provisioned runtime at {root} (missing {LOCK_FILE})")]
    NotProvisioned { root: PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt lock file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Runtime configuration baked into the environment at provisioning time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeFlags {
    /// Flush standard output on every write.
    pub unbuffered: bool,
}

impl Default for RuntimeFlags {
    fn default() -> Self {
        Self { unbuffered: true }
    }
}

/// One entry of the installed package set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct LockFile {
    pub digest: String,
    pub runtime: RuntimeFlags,
    #[serde(default, rename = "package")]
    pub packages: Vec<InstalledPackage>,
}

/// A fully provisioned, read-only runtime environment.
///
/// Only the provisioner creates one from scratch; everything else reopens it
/// from its lock file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEnvironment {
    root: PathBuf,
    flags: RuntimeFlags,
    packages: Vec<InstalledPackage>,
    digest: String,
}

impl RuntimeEnvironment {
    pub(crate) fn new(
        root: PathBuf,
        flags: RuntimeFlags,
        mut packages: Vec<InstalledPackage>,
        digest: String,
    ) -> Self {
        packages.sort();
        Self {
            root,
            flags,
            packages,
            digest,
        }
    }

    /// Reopen an environment that a previous run provisioned.
    pub fn open(root: &Path) -> Result<Self, EnvironmentError> {
        let path = root.join(LOCK_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EnvironmentError::NotProvisioned {
                    root: root.to_path_buf(),
                });
            }
            Err(source) => return Err(EnvironmentError::Io { path, source }),
        };
        let lock: LockFile =
            toml::from_str(&text).map_err(|source| EnvironmentError::Parse { path, source })?;

        Ok(Self::new(root.to_path_buf(), lock.runtime, lock.packages, lock.digest))
    }

    pub(crate) fn lock_file(&self) -> LockFile {
        LockFile {
            digest: self.digest.clone(),
            runtime: self.flags,
            packages: self.packages.clone(),
        }
    }

    pub(crate) fn relocate(mut self, root: PathBuf) -> Self {
        self.root = root;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.root.join(PACKAGES_DIR)
    }

    pub fn flags(&self) -> RuntimeFlags {
        self.flags
    }

    /// Installed packages, sorted by name.
    pub fn packages(&self) -> &[InstalledPackage] {
        &self.packages
    }

    pub fn package(&self, name: &str) -> Option<&InstalledPackage> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// SHA-256 of the installed tree, excluding the lock file.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_lock_is_not_provisioned() {
        let dir = tempfile::tempdir().unwrap();
        let err = RuntimeEnvironment::open(dir.path()).unwrap_err();
        assert!(matches!(err, EnvironmentError::NotProvisioned { .. }));
    }

    #[test]
    fn test_lock_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let env = RuntimeEnvironment::new(
            dir.path().to_path_buf(),
            RuntimeFlags { unbuffered: true },
            vec![
                InstalledPackage { name: "tracing".into(), version: "0.1.40".into() },
                InstalledPackage { name: "axum".into(), version: "0.8.1".into() },
            ],
            "abc123".into(),
        );
        let text = toml::to_string(&env.lock_file()).unwrap();
        std::fs::write(dir.path().join(LOCK_FILE), text).unwrap();

        let reopened = RuntimeEnvironment::open(dir.path()).unwrap();
        assert_eq!(reopened, env);
        assert_eq!(reopened.packages()[0].name, "axum");
        assert_eq!(reopened.package("tracing").unwrap().version, "0.1.40");
    }
}
