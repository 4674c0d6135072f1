//! Local directory package index.
//!
//! # Layout
//! ```text
//! <index>/
//!     axum/
//!         0.7.9/...
//!         0.8.1/...
//!     serde/
//!         1.0.200/...
//! ```
//!
//! Installing picks the highest version matching the constraint, copies it
//! into the download cache, then unpacks it into `packages/<name>/`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use semver::Version;

use crate::provision::{
    blocking, InstallContext, InstallError, InstalledPackage, PackageManager, PackageName,
    Requirement,
};
use crate::tree;

type Catalog = BTreeMap<PackageName, Vec<(Version, PathBuf)>>;

pub struct DirectoryIndex {
    root: PathBuf,
    /// Populated by `self_upgrade`; versions sorted ascending.
    catalog: RwLock<Option<Catalog>>,
}

impl DirectoryIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            catalog: RwLock::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn select(&self, requirement: &Requirement) -> Result<(Version, PathBuf), InstallError> {
        let guard = self.catalog.read().unwrap_or_else(|e| e.into_inner());
        let catalog = guard.as_ref().ok_or_else(|| InstallError::NotReady {
            manager: self.name().to_string(),
        })?;

        let versions = catalog
            .get(&requirement.name)
            .ok_or_else(|| InstallError::NotFound {
                name: requirement.name.clone(),
            })?;

        versions
            .iter()
            .rev()
            .find(|(v, _)| requirement.constraint.matches(v))
            .cloned()
            .ok_or_else(|| InstallError::Unsatisfiable {
                name: requirement.name.clone(),
                constraint: requirement.constraint.clone(),
                available: versions
                    .iter()
                    .map(|(v, _)| v.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

#[async_trait]
impl PackageManager for DirectoryIndex {
    fn name(&self) -> &str {
        "directory-index"
    }

    async fn self_upgrade(&self) -> Result<(), InstallError> {
        let root = self.root.clone();
        let catalog = blocking(&self.root, move || scan(&root))
            .await
            .map_err(|e| InstallError::Upgrade {
                manager: "directory-index".to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(
            index = %self.root.display(),
            packages = catalog.len(),
            "Package index refreshed"
        );
        *self.catalog.write().unwrap_or_else(|e| e.into_inner()) = Some(catalog);
        Ok(())
    }

    async fn install(
        &self,
        requirement: &Requirement,
        ctx: &InstallContext,
    ) -> Result<InstalledPackage, InstallError> {
        let (version, source) = self.select(requirement)?;
        let name = requirement.name.to_string();

        let cached = ctx.cache_dir.join(format!("{name}-{version}"));
        let dest = ctx.packages_dir.join(&name);

        let (from, to) = (source.clone(), cached.clone());
        blocking(&source, move || tree::copy_tree(&from, &to, &[])).await?;

        let (from, to) = (cached.clone(), dest.clone());
        blocking(&cached, move || {
            tree::remove_dir_if_exists(&to)?;
            tree::copy_tree(&from, &to, &[])
        })
        .await?;

        Ok(InstalledPackage {
            name,
            version: version.to_string(),
        })
    }
}

fn scan(root: &Path) -> std::io::Result<Catalog> {
    let mut catalog = Catalog::new();

    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(name) = PackageName::new(&entry.file_name().to_string_lossy()) else {
            tracing::warn!(path = %entry.path().display(), "Skipping invalid package directory");
            continue;
        };

        let versions = catalog.entry(name).or_default();
        for release in std::fs::read_dir(entry.path())? {
            let release = release?;
            if !release.file_type()?.is_dir() {
                continue;
            }
            match Version::parse(&release.file_name().to_string_lossy()) {
                Ok(version) => versions.push((version, release.path())),
                Err(_) => {
                    tracing::warn!(path = %release.path().display(), "Skipping non-semver release");
                }
            }
        }
    }

    for versions in catalog.values_mut() {
        versions.sort_by(|a, b| a.0.cmp(&b.0));
    }
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publish(index: &Path, name: &str, version: &str) {
        let dir = index.join(name).join(version);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("VERSION"), version).unwrap();
    }

    fn context(root: &Path) -> InstallContext {
        let ctx = InstallContext {
            root: root.to_path_buf(),
            packages_dir: root.join("packages"),
            cache_dir: root.join("cache"),
        };
        std::fs::create_dir_all(&ctx.packages_dir).unwrap();
        std::fs::create_dir_all(&ctx.cache_dir).unwrap();
        ctx
    }

    #[tokio::test]
    async fn test_install_before_upgrade_is_rejected() {
        let index_dir = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        publish(index_dir.path(), "axum", "0.8.1");

        let index = DirectoryIndex::new(index_dir.path());
        let requirement = "axum".parse::<crate::provision::DependencyManifest>().unwrap().requirements()[0].clone();
        let err = index.install(&requirement, &context(work.path())).await.unwrap_err();

        assert!(matches!(err, InstallError::NotReady { .. }));
    }

    #[tokio::test]
    async fn test_picks_highest_matching_version() {
        let index_dir = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        publish(index_dir.path(), "axum", "0.7.9");
        publish(index_dir.path(), "axum", "0.8.1");
        publish(index_dir.path(), "axum", "0.9.0");

        let index = DirectoryIndex::new(index_dir.path());
        index.self_upgrade().await.unwrap();
        let manifest: crate::provision::DependencyManifest = "axum >=0.7, <0.9".parse().unwrap();
        let ctx = context(work.path());

        let installed = index.install(&manifest.requirements()[0], &ctx).await.unwrap();

        assert_eq!(installed.version, "0.8.1");
        let body = std::fs::read_to_string(ctx.packages_dir.join("axum/VERSION")).unwrap();
        assert_eq!(body, "0.8.1");
        assert!(ctx.cache_dir.join("axum-0.8.1").exists());
    }

    #[tokio::test]
    async fn test_unsatisfiable_constraint() {
        let index_dir = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        publish(index_dir.path(), "serde", "1.0.200");

        let index = DirectoryIndex::new(index_dir.path());
        index.self_upgrade().await.unwrap();
        let manifest: crate::provision::DependencyManifest = "serde >=2".parse().unwrap();

        let err = index
            .install(&manifest.requirements()[0], &context(work.path()))
            .await
            .unwrap_err();

        match err {
            InstallError::Unsatisfiable { available, .. } => assert_eq!(available, "1.0.200"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_index_fails_upgrade() {
        let index = DirectoryIndex::new("/nonexistent/package/index");
        let err = index.self_upgrade().await.unwrap_err();
        assert!(matches!(err, InstallError::Upgrade { .. }));
    }
}
