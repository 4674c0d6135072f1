//! Directory tree helpers shared by provisioning and staging.
//!
//! Walks never follow symlinks and are sorted by file name, so copies and
//! digests do not depend on the order the filesystem returns entries in.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ignore::{DirEntry, WalkBuilder};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Dir,
    File,
    Symlink,
}

/// One entry below a walk root.
struct Node {
    path: PathBuf,
    rel: PathBuf,
    kind: Kind,
}

impl Node {
    /// `/`-separated path relative to the walk root.
    fn key(&self) -> String {
        self.rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Plain walk: no hidden-file or ignore-file filtering, no link following.
fn walker(root: &Path) -> WalkBuilder {
    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b));
    builder
}

fn nodes(builder: &WalkBuilder, root: &Path) -> io::Result<Vec<Node>> {
    let mut out = Vec::new();
    for entry in builder.build() {
        let entry = entry.map_err(walk_error)?;
        if entry.depth() == 0 {
            continue;
        }
        let kind = match entry.file_type() {
            Some(t) if t.is_dir() => Kind::Dir,
            Some(t) if t.is_symlink() => Kind::Symlink,
            _ => Kind::File,
        };
        let path = entry.into_path();
        let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        out.push(Node { path, rel, kind });
    }
    Ok(out)
}

fn walk_error(e: ignore::Error) -> io::Error {
    let message = e.to_string();
    e.into_io_error().unwrap_or_else(|| io::Error::other(message))
}

/// Recursively copy `src` into `dst`, creating `dst` if needed.
///
/// Directories listed in `skip` (compared after canonicalization) are not
/// descended into; `dst` itself is always skipped. Symlinks are copied as
/// links. Returns the number of files and links copied.
pub fn copy_tree(src: &Path, dst: &Path, skip: &[PathBuf]) -> io::Result<u64> {
    fs::create_dir_all(dst)?;
    let mut skip: Vec<PathBuf> = skip.iter().filter_map(|p| p.canonicalize().ok()).collect();
    skip.push(dst.canonicalize()?);

    let mut builder = walker(src);
    builder.filter_entry(move |entry| !is_skipped(entry, &skip));

    let mut copied = 0;
    for node in nodes(&builder, src)? {
        let to = dst.join(&node.rel);
        match node.kind {
            Kind::Dir => fs::create_dir_all(&to)?,
            Kind::Symlink => {
                copy_symlink(&node.path, &to)?;
                copied += 1;
            }
            Kind::File => {
                fs::copy(&node.path, &to)?;
                copied += 1;
            }
        }
    }
    Ok(copied)
}

fn is_skipped(entry: &DirEntry, skip: &[PathBuf]) -> bool {
    entry.depth() > 0
        && entry.file_type().is_some_and(|t| t.is_dir())
        && entry
            .path()
            .canonicalize()
            .is_ok_and(|canonical| skip.contains(&canonical))
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    let target = fs::read_link(from)?;
    if to.symlink_metadata().is_ok() {
        fs::remove_file(to)?;
    }
    std::os::unix::fs::symlink(target, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    fs::copy(from, to).map(|_| ())
}

/// Sorted, `/`-separated relative paths of every file and symlink below
/// `root`.
pub fn list_files(root: &Path) -> io::Result<Vec<String>> {
    Ok(nodes(&walker(root), root)?
        .iter()
        .filter(|n| n.kind != Kind::Dir)
        .map(Node::key)
        .collect())
}

/// SHA-256 over every file's relative path and contents, skipping the
/// top-level entries named in `exclude`.
///
/// Symlinks contribute their target path; they are never read through.
pub fn tree_digest(root: &Path, exclude: &[&str]) -> io::Result<String> {
    let mut hasher = Sha256::new();
    for node in nodes(&walker(root), root)? {
        let key = node.key();
        if exclude.contains(&key.as_str()) {
            continue;
        }
        let (tag, contents) = match node.kind {
            Kind::Dir => continue,
            Kind::Symlink => (
                b'L',
                fs::read_link(&node.path)?
                    .to_string_lossy()
                    .into_owned()
                    .into_bytes(),
            ),
            Kind::File => (b'F', fs::read(&node.path)?),
        };
        hasher.update([tag]);
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update((contents.len() as u64).to_le_bytes());
        hasher.update(&contents);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// `<dir>/<name>.<suffix>` for a target `<dir>/<name>`.
pub fn sibling(target: &Path, suffix: &str) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!("{name}.{suffix}"))
}

/// Move the finished tree at `staged` to `target`.
///
/// A previous `target` is parked at `<target>.old` and restored if the move
/// fails, so `target` only ever holds a complete tree.
pub fn replace_dir(staged: &Path, target: &Path) -> io::Result<()> {
    let previous = sibling(target, "old");
    let had_previous = target.exists();

    if had_previous {
        remove_dir_if_exists(&previous)?;
        fs::rename(target, &previous)?;
    }

    if let Err(e) = fs::rename(staged, target) {
        if had_previous {
            let _ = fs::rename(&previous, target);
        }
        return Err(e);
    }

    if had_previous {
        remove_dir_if_exists(&previous)?;
    }
    Ok(())
}

/// Remove a directory tree, treating "already gone" as success.
pub fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn test_copy_tree_preserves_layout() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write(src.path(), "app/main.py", "app = 1");
        write(src.path(), "app/__init__.py", "");
        write(src.path(), ".env", "hidden");
        write(src.path(), "README", "hello");

        let copied = copy_tree(src.path(), dst.path(), &[]).unwrap();

        assert_eq!(copied, 4);
        assert_eq!(list_files(src.path()).unwrap(), list_files(dst.path()).unwrap());
        assert_eq!(fs::read_to_string(dst.path().join("README")).unwrap(), "hello");
    }

    #[test]
    fn test_ignore_files_are_not_honoured() {
        let src = tempfile::tempdir().unwrap();
        write(src.path(), ".gitignore", "*.log\n");
        write(src.path(), "server.log", "kept");

        assert_eq!(
            list_files(src.path()).unwrap(),
            vec![".gitignore".to_string(), "server.log".to_string()]
        );
    }

    #[test]
    fn test_copy_tree_skips_destination_nested_in_source() {
        let src = tempfile::tempdir().unwrap();
        write(src.path(), "app/main.rs", "fn main() {}");
        let dst = src.path().join("staged");

        copy_tree(src.path(), &dst, &[]).unwrap();

        assert_eq!(list_files(&dst).unwrap(), vec!["app/main.rs".to_string()]);
    }

    #[test]
    fn test_digest_is_stable_and_content_sensitive() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        write(a.path(), "x/y.txt", "same");
        write(b.path(), "x/y.txt", "same");
        assert_eq!(tree_digest(a.path(), &[]).unwrap(), tree_digest(b.path(), &[]).unwrap());

        write(b.path(), "x/y.txt", "different");
        assert_ne!(tree_digest(a.path(), &[]).unwrap(), tree_digest(b.path(), &[]).unwrap());
    }

    #[test]
    fn test_digest_ignores_excluded_entries() {
        let a = tempfile::tempdir().unwrap();
        write(a.path(), "pkg/file", "data");
        let before = tree_digest(a.path(), &["environment.lock"]).unwrap();
        write(a.path(), "environment.lock", "anything");
        assert_eq!(before, tree_digest(a.path(), &["environment.lock"]).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_hashed_and_copied_as_links() {
        let src = tempfile::tempdir().unwrap();
        write(src.path(), "lib/libpkg.so", "elf");
        std::os::unix::fs::symlink("lib", src.path().join("lib64")).unwrap();
        std::os::unix::fs::symlink("missing", src.path().join("dangling")).unwrap();

        let before = tree_digest(src.path(), &[]).unwrap();
        assert_eq!(
            list_files(src.path()).unwrap(),
            vec!["dangling".to_string(), "lib/libpkg.so".to_string(), "lib64".to_string()]
        );

        let dst = tempfile::tempdir().unwrap();
        assert_eq!(copy_tree(src.path(), dst.path(), &[]).unwrap(), 3);
        assert!(dst.path().join("lib64").symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(tree_digest(dst.path(), &[]).unwrap(), before);

        fs::remove_file(src.path().join("lib64")).unwrap();
        std::os::unix::fs::symlink("lib/libpkg.so", src.path().join("lib64")).unwrap();
        assert_ne!(tree_digest(src.path(), &[]).unwrap(), before);
    }

    #[test]
    fn test_replace_dir_swaps_whole_tree() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("app-root");
        write(&target, "stale.py", "old");
        let staged = sibling(&target, "partial");
        write(&staged, "fresh.py", "new");

        replace_dir(&staged, &target).unwrap();

        assert_eq!(list_files(&target).unwrap(), vec!["fresh.py".to_string()]);
        assert!(!staged.exists());
        assert!(!sibling(&target, "old").exists());
    }

    #[test]
    fn test_sibling_paths() {
        assert_eq!(
            sibling(Path::new("/opt/runtime"), "partial"),
            PathBuf::from("/opt/runtime.partial")
        );
    }
}
