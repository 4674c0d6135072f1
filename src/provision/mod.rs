//! Provisioning subsystem.
//!
//! # Data Flow
//! ```text
//! manifest file
//!     → manifest.rs (parse, reject duplicates)
//!     → Provisioner::install
//!         → PackageManager::self_upgrade   (always first)
//!         → PackageManager::install        (each requirement, in order)
//!         → evict cache                    (mandatory)
//!         → digest + environment.lock
//!         → rename <target>.partial → <target>
//!     → RuntimeEnvironment (read-only from here on)
//! ```
//!
//! # Design Decisions
//! - All work happens in a sibling `.partial` directory; the target only ever
//!   holds a complete environment
//! - Any failure removes the partial environment and the cache
//! - Package backends sit behind the `PackageManager` trait

pub mod command;
pub mod environment;
pub mod index;
pub mod manifest;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use semver::{Version, VersionReq};
use thiserror::Error;

use crate::config::{BackendKind, ProvisionConfig};
use crate::observability::metrics;
use crate::tree::{self, sibling};

pub use command::CommandPackageManager;
pub use environment::{InstalledPackage, RuntimeEnvironment, RuntimeFlags, LOCK_FILE, PACKAGES_DIR};
pub use index::DirectoryIndex;
pub use manifest::{DependencyManifest, ManifestError, PackageName, Requirement};

/// Provisioning failure. Always fatal; nothing partial is kept.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("failed to upgrade package manager {manager}: {reason}")]
    Upgrade { manager: String, reason: String },

    #[error("package manager {manager} used before self-upgrade")]
    NotReady { manager: String },

    #[error("package {name} not found in index")]
    NotFound { name: PackageName },

    #[error("no version of {name} satisfies {constraint} (available: {available})")]
    Unsatisfiable {
        name: PackageName,
        constraint: VersionReq,
        available: String,
    },

    #[error("{name} {version} was installed but violates {constraint}")]
    ConstraintViolated {
        name: PackageName,
        version: Version,
        constraint: VersionReq,
    },

    #[error("failed to install {requirement}: {reason}")]
    Package { requirement: String, reason: String },

    #[error("cache directory {path} still present after eviction")]
    CacheNotEvicted { path: PathBuf },

    #[error("invalid install target {path}")]
    InvalidTarget { path: PathBuf },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode lock file: {0}")]
    Lock(#[from] toml::ser::Error),
}

impl InstallError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Where a package manager should put things for one provisioning run.
#[derive(Debug, Clone)]
pub struct InstallContext {
    /// Root of the environment being assembled.
    pub root: PathBuf,
    /// `<root>/packages`.
    pub packages_dir: PathBuf,
    /// Download cache; evicted before the environment is committed.
    pub cache_dir: PathBuf,
}

/// A package installation backend.
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Short name for logs and errors.
    fn name(&self) -> &str;

    /// Bring the installer itself up to date. Called once, before any install.
    async fn self_upgrade(&self) -> Result<(), InstallError>;

    /// Install one requirement into `ctx.packages_dir`.
    async fn install(
        &self,
        requirement: &Requirement,
        ctx: &InstallContext,
    ) -> Result<InstalledPackage, InstallError>;
}

/// The package backend selected by `config`.
pub fn package_manager(config: &ProvisionConfig) -> Arc<dyn PackageManager> {
    match config.backend {
        BackendKind::Index => Arc::new(DirectoryIndex::new(&config.index_dir)),
        BackendKind::Command => Arc::new(CommandPackageManager::from_config(&config.command)),
    }
}

/// Installs a manifest into a runtime environment, all or nothing.
pub struct Provisioner {
    manager: Arc<dyn PackageManager>,
    target: PathBuf,
    flags: RuntimeFlags,
}

impl Provisioner {
    pub fn new(manager: Arc<dyn PackageManager>, target: impl Into<PathBuf>) -> Self {
        Self {
            manager,
            target: target.into(),
            flags: RuntimeFlags::default(),
        }
    }

    /// Set the runtime flags recorded in the environment.
    pub fn with_flags(mut self, flags: RuntimeFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Directory the environment is assembled in before being committed.
    pub fn partial_dir(&self) -> PathBuf {
        sibling(&self.target, "partial")
    }

    /// Download cache used during a run.
    pub fn cache_dir(&self) -> PathBuf {
        sibling(&self.target, "cache")
    }

    /// Install every requirement of `manifest` and commit the environment.
    pub async fn install(
        &self,
        manifest: &DependencyManifest,
    ) -> Result<RuntimeEnvironment, InstallError> {
        if self.target.file_name().is_none() {
            return Err(InstallError::InvalidTarget {
                path: self.target.clone(),
            });
        }

        let started = Instant::now();
        let ctx = InstallContext {
            root: self.partial_dir(),
            packages_dir: self.partial_dir().join(PACKAGES_DIR),
            cache_dir: self.cache_dir(),
        };

        // Leftovers from an interrupted run are never reused.
        self.discard(&ctx);

        tracing::info!(
            manager = self.manager.name(),
            target = %self.target.display(),
            requirements = manifest.len(),
            "Provisioning runtime"
        );

        match self.assemble(manifest, &ctx).await {
            Ok(env) => {
                metrics::record_stage("provisioning", started);
                tracing::info!(
                    packages = env.packages().len(),
                    digest = %env.digest(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Runtime provisioned"
                );
                Ok(env)
            }
            Err(e) => {
                self.discard(&ctx);
                tracing::error!(error = %e, "Provisioning failed, partial environment removed");
                Err(e)
            }
        }
    }

    async fn assemble(
        &self,
        manifest: &DependencyManifest,
        ctx: &InstallContext,
    ) -> Result<RuntimeEnvironment, InstallError> {
        tokio::fs::create_dir_all(&ctx.packages_dir)
            .await
            .map_err(InstallError::io(&ctx.packages_dir))?;
        tokio::fs::create_dir_all(&ctx.cache_dir)
            .await
            .map_err(InstallError::io(&ctx.cache_dir))?;

        tracing::info!(manager = self.manager.name(), "Upgrading package manager");
        self.manager.self_upgrade().await?;

        let mut installed = Vec::with_capacity(manifest.len());
        for requirement in manifest.requirements() {
            let package = self.manager.install(requirement, ctx).await?;
            check_constraint(requirement, &package)?;
            tracing::info!(
                package = %package.name,
                version = %package.version,
                "Installed package"
            );
            metrics::record_package_installed();
            installed.push(package);
        }

        evict_cache(&ctx.cache_dir).await?;

        let root = ctx.root.clone();
        let digest = blocking(&ctx.root, move || tree::tree_digest(&root, &[LOCK_FILE])).await?;
        let env = RuntimeEnvironment::new(ctx.root.clone(), self.flags, installed, digest);

        let lock_path = ctx.root.join(LOCK_FILE);
        let lock = toml::to_string(&env.lock_file())?;
        tokio::fs::write(&lock_path, lock)
            .await
            .map_err(InstallError::io(&lock_path))?;

        self.commit(&ctx.root).await?;
        Ok(env.relocate(self.target.clone()))
    }

    /// Move the finished environment into place, replacing any previous one
    /// only once the new one is complete.
    async fn commit(&self, partial: &Path) -> Result<(), InstallError> {
        let staged = partial.to_path_buf();
        let target = self.target.clone();
        blocking(&self.target, move || tree::replace_dir(&staged, &target)).await
    }

    fn discard(&self, ctx: &InstallContext) {
        for dir in [&ctx.root, &ctx.cache_dir] {
            if let Err(e) = tree::remove_dir_if_exists(dir) {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to remove directory");
            }
        }
    }
}

fn check_constraint(
    requirement: &Requirement,
    package: &InstalledPackage,
) -> Result<(), InstallError> {
    // Backends that cannot report an exact version are trusted as-is.
    let Ok(version) = Version::parse(&package.version) else {
        return Ok(());
    };
    if requirement.constraint.matches(&version) {
        Ok(())
    } else {
        Err(InstallError::ConstraintViolated {
            name: requirement.name.clone(),
            version,
            constraint: requirement.constraint.clone(),
        })
    }
}

async fn evict_cache(cache_dir: &Path) -> Result<(), InstallError> {
    let dir = cache_dir.to_path_buf();
    blocking(cache_dir, move || tree::remove_dir_if_exists(&dir)).await?;

    if tokio::fs::try_exists(cache_dir)
        .await
        .map_err(InstallError::io(cache_dir))?
    {
        return Err(InstallError::CacheNotEvicted {
            path: cache_dir.to_path_buf(),
        });
    }
    tracing::debug!(path = %cache_dir.display(), "Package cache evicted");
    Ok(())
}

/// Run blocking filesystem work off the async executor.
pub(crate) async fn blocking<T, F>(path: &Path, f: F) -> Result<T, InstallError>
where
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
        .and_then(|r| r)
        .map_err(InstallError::io(path))
}
