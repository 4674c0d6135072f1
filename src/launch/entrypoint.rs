//! Entrypoint resolution.
//!
//! An entrypoint reference `module.path:object` resolves in two steps:
//! the module must exist in the staged tree (`module/path.*` or a
//! `module/path/` package directory), and the object must be registered in
//! the [`AppRegistry`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use thiserror::Error;

use crate::config::GatewayConfig;
use crate::launch::EntrypointRef;
use crate::provision::RuntimeEnvironment;
use crate::stage::StagedTree;

#[derive(Debug, Error)]
pub enum EntrypointError {
    #[error("malformed entrypoint {reference:?}: {reason}")]
    Malformed { reference: String, reason: String },

    #[error("module {module} not found under {root}")]
    ModuleNotFound { module: String, root: PathBuf },

    #[error("no application object {reference} (registered: {available})")]
    ObjectNotFound { reference: String, available: String },
}

/// Everything an application factory may need to build its router.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub env: RuntimeEnvironment,
    pub staged: StagedTree,
    pub gateway: GatewayConfig,
}

impl AppContext {
    pub fn new(env: RuntimeEnvironment, staged: StagedTree) -> Self {
        Self {
            env,
            staged,
            gateway: GatewayConfig::default(),
        }
    }

    pub fn with_gateway(mut self, gateway: GatewayConfig) -> Self {
        self.gateway = gateway;
        self
    }
}

/// Builds the server application for one entrypoint.
pub type AppFactory = Arc<dyn Fn(&AppContext) -> Router + Send + Sync>;

/// Compiled-in server applications, keyed by entrypoint reference.
#[derive(Clone, Default)]
pub struct AppRegistry {
    apps: BTreeMap<String, AppFactory>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in gateway mounted at `app.main:app`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("app.main:app", crate::gateway::router);
        registry
    }

    pub fn register<F>(&mut self, reference: &str, factory: F) -> &mut Self
    where
        F: Fn(&AppContext) -> Router + Send + Sync + 'static,
    {
        self.apps.insert(reference.to_string(), Arc::new(factory));
        self
    }

    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.apps.keys().map(String::as_str)
    }

    /// Resolve `entrypoint` against the staged tree and build its router.
    pub fn resolve(
        &self,
        entrypoint: &EntrypointRef,
        ctx: &AppContext,
    ) -> Result<Router, EntrypointError> {
        locate_module(ctx.staged.root(), entrypoint)?;

        let factory = self
            .apps
            .get(&entrypoint.to_string())
            .ok_or_else(|| EntrypointError::ObjectNotFound {
                reference: entrypoint.to_string(),
                available: self.references().collect::<Vec<_>>().join(", "),
            })?;

        Ok(factory(ctx))
    }
}

impl std::fmt::Debug for AppRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppRegistry")
            .field("apps", &self.apps.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Find the file or package directory backing `entrypoint`'s module.
pub fn locate_module(root: &Path, entrypoint: &EntrypointRef) -> Result<PathBuf, EntrypointError> {
    let not_found = || EntrypointError::ModuleNotFound {
        module: entrypoint.module().to_string(),
        root: root.to_path_buf(),
    };

    let segments: Vec<&str> = entrypoint.segments().collect();
    let (leaf, parents) = segments.split_last().ok_or_else(not_found)?;
    let parent = parents.iter().fold(root.to_path_buf(), |dir, seg| dir.join(seg));

    let package = parent.join(leaf);
    if package.is_dir() {
        return Ok(package);
    }

    let entries = std::fs::read_dir(&parent).map_err(|_| not_found())?;
    let mut matches: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.file_stem().is_some_and(|stem| stem == *leaf))
        .collect();
    matches.sort();
    matches.into_iter().next().ok_or_else(not_found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::RuntimeFlags;
    use axum::routing::get;

    fn staged_with(files: &[&str]) -> (tempfile::TempDir, AppContext) {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = dir.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "").unwrap();
        }
        let env = RuntimeEnvironment::new(dir.path().join("rt"), RuntimeFlags::default(), Vec::new(), String::new());
        let staged = StagedTree::open(dir.path()).unwrap();
        (dir, AppContext::new(env, staged))
    }

    fn registry() -> AppRegistry {
        let mut registry = AppRegistry::new();
        registry.register("app.main:app", |_| Router::new().route("/", get(|| async { "ok" })));
        registry
    }

    #[test]
    fn test_resolves_module_file() {
        let (_dir, ctx) = staged_with(&["app/main.py", "app/__init__.py"]);
        let entry: EntrypointRef = "app.main:app".parse().unwrap();
        assert!(registry().resolve(&entry, &ctx).is_ok());
    }

    #[test]
    fn test_resolves_package_directory() {
        let (_dir, ctx) = staged_with(&["app/main/mod.rs"]);
        let entry: EntrypointRef = "app.main:app".parse().unwrap();
        assert!(locate_module(ctx.staged.root(), &entry).unwrap().is_dir());
    }

    #[test]
    fn test_missing_module() {
        let (_dir, ctx) = staged_with(&["other/file.txt"]);
        let entry: EntrypointRef = "app.main:app".parse().unwrap();
        let err = registry().resolve(&entry, &ctx).unwrap_err();
        assert!(matches!(err, EntrypointError::ModuleNotFound { .. }));
    }

    #[test]
    fn test_missing_object() {
        let (_dir, ctx) = staged_with(&["app/main.py"]);
        let entry: EntrypointRef = "app.main:application".parse().unwrap();
        match registry().resolve(&entry, &ctx).unwrap_err() {
            EntrypointError::ObjectNotFound { available, .. } => assert_eq!(available, "app.main:app"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
