//! Source tree staging.
//!
//! Copies the application source into the runtime's working location. Pure
//! copy, no transformation. Requiring a [`RuntimeEnvironment`] means staging
//! can only follow a successful (or previously committed) install.

use std::path::{Path, PathBuf};
use std::time::Instant;

use thiserror::Error;

use crate::observability::metrics;
use crate::provision::RuntimeEnvironment;
use crate::tree;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("source tree {path} does not exist")]
    SourceMissing { path: PathBuf },

    #[error("{path} is not a directory")]
    NotADirectory { path: PathBuf },

    #[error("failed to copy into {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Application source copied into its working location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedTree {
    root: PathBuf,
    files: u64,
}

impl StagedTree {
    /// Reopen a tree staged by an earlier run.
    pub fn open(root: &Path) -> Result<Self, StageError> {
        if !root.exists() {
            return Err(StageError::SourceMissing {
                path: root.to_path_buf(),
            });
        }
        if !root.is_dir() {
            return Err(StageError::NotADirectory {
                path: root.to_path_buf(),
            });
        }
        let files = tree::list_files(root).map_err(|source| StageError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        Ok(Self {
            root: root.to_path_buf(),
            files: files.len() as u64,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of files in the tree.
    pub fn files(&self) -> u64 {
        self.files
    }
}

/// Copy `source` into `workdir`, replacing whatever `workdir` held before.
///
/// The copy is built in `<workdir>.partial` and renamed into place, so files
/// removed from `source` do not survive a restage. The runtime environment
/// and `workdir` itself are never copied, even when they live inside
/// `source`.
pub async fn stage(
    source: &Path,
    workdir: &Path,
    env: &RuntimeEnvironment,
) -> Result<StagedTree, StageError> {
    if !source.exists() {
        return Err(StageError::SourceMissing {
            path: source.to_path_buf(),
        });
    }
    if !source.is_dir() {
        return Err(StageError::NotADirectory {
            path: source.to_path_buf(),
        });
    }

    let started = Instant::now();
    tracing::info!(
        source = %source.display(),
        workdir = %workdir.display(),
        "Staging source tree"
    );

    let from = source.to_path_buf();
    let target = workdir.to_path_buf();
    let partial = tree::sibling(workdir, "partial");
    let skip = vec![
        env.root().to_path_buf(),
        workdir.to_path_buf(),
        tree::sibling(workdir, "old"),
    ];
    let files = tokio::task::spawn_blocking(move || {
        tree::remove_dir_if_exists(&partial)?;
        match tree::copy_tree(&from, &partial, &skip) {
            Ok(files) => tree::replace_dir(&partial, &target).map(|()| files),
            Err(e) => {
                let _ = tree::remove_dir_if_exists(&partial);
                Err(e)
            }
        }
    })
    .await
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    .and_then(|r| r)
    .map_err(|source| StageError::Io {
        path: workdir.to_path_buf(),
        source,
    })?;

    metrics::record_stage("staging", started);
    tracing::info!(files, "Source tree staged");

    Ok(StagedTree {
        root: workdir.to_path_buf(),
        files,
    })
}
