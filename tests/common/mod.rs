//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gateway_bootstrap::config::BootstrapConfig;
use gateway_bootstrap::provision::{DirectoryIndex, PackageManager};

/// Publish `name` at `version` into a directory index.
pub fn publish(index: &Path, name: &str, version: &str) {
    let dir = index.join(name).join(version);
    std::fs::create_dir_all(dir.join("lib")).unwrap();
    std::fs::write(dir.join("VERSION"), version).unwrap();
    std::fs::write(dir.join("lib").join(format!("{name}.py")), format!("# {name} {version}\n"))
        .unwrap();
}

/// Write `files` (relative paths) under `root` with placeholder contents.
pub fn write_tree(root: &Path, files: &[&str]) {
    for file in files {
        let path = root.join(file);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, format!("# {file}\n")).unwrap();
    }
}

pub fn index_manager(index: &Path) -> Arc<dyn PackageManager> {
    Arc::new(DirectoryIndex::new(index))
}

/// A port nothing is listening on right now.
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Client that never pools or proxies, so shutdown is not held open.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Workspace layout for one deployable unit.
pub struct Workspace {
    pub dir: tempfile::TempDir,
    pub index: PathBuf,
    pub source: PathBuf,
    pub manifest: PathBuf,
}

impl Workspace {
    pub fn new(manifest: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let index = dir.path().join("index");
        let source = dir.path().join("src");
        std::fs::create_dir_all(&index).unwrap();
        std::fs::create_dir_all(&source).unwrap();
        let manifest_path = source.join("requirements.txt");
        std::fs::write(&manifest_path, manifest).unwrap();
        Self {
            dir,
            index,
            source,
            manifest: manifest_path,
        }
    }

    pub fn target(&self) -> PathBuf {
        self.dir.path().join("runtime")
    }

    pub fn workdir(&self) -> PathBuf {
        self.dir.path().join("app-root")
    }

    /// Configuration pointing every stage into this workspace.
    pub fn config(&self, port: u16) -> BootstrapConfig {
        let mut config = BootstrapConfig::default();
        config.provision.manifest = self.manifest.clone();
        config.provision.target = self.target();
        config.provision.index_dir = self.index.clone();
        config.stage.source = self.source.clone();
        config.stage.workdir = self.workdir();
        config.launch.host = "127.0.0.1".to_string();
        config.launch.port = port;
        config.launch.shutdown_timeout_secs = 2;
        config
    }
}
