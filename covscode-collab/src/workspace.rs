//! [`Workspace`] over a directory on the local filesystem.
//!
//! File I/O goes through `tokio::fs`; tree walks and the zip codec run on
//! the blocking pool.

use std::io::{Cursor, Read, Write};
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::host::{HostError, NodeKind, Workspace};

/// The repository root on disk.
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    root: PathBuf,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute path for `relative`, refusing anything that leaves the root.
    fn resolve(&self, relative: &str) -> Result<PathBuf, HostError> {
        let mut path = self.root.clone();
        for part in relative.split(['/', '\\']).filter(|p| !p.is_empty()) {
            if part == "." {
                continue;
            }
            if part == ".." || Path::new(part).is_absolute() {
                return Err(HostError::InvalidPath(relative.to_string()));
            }
            path.push(part);
        }
        Ok(path)
    }
}

fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

/// Deepest path first; equal lengths in reverse lexical order.
fn sort_deepest_first(paths: &mut [String]) {
    paths.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| b.cmp(a)));
}

fn zip_tree(root: &Path) -> Result<Vec<u8>, HostError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let Some(name) = relative_name(root, entry.path()) else {
            continue;
        };
        if entry.file_type().is_dir() {
            zip.add_directory(format!("{name}/"), options)?;
        } else if entry.file_type().is_file() {
            zip.start_file(name, options)?;
            zip.write_all(&std::fs::read(entry.path())?)?;
        }
    }

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

fn unzip_tree(root: &Path, data: &[u8]) -> Result<(), HostError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;
    std::fs::create_dir_all(root)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(name) = entry.enclosed_name() else {
            return Err(HostError::Archive(format!("entry escapes the workspace: {}", entry.name())));
        };
        let target = root.join(name);

        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        std::fs::write(&target, bytes)?;
    }
    Ok(())
}

#[async_trait]
impl Workspace for LocalWorkspace {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn stat(&self, relative: &str) -> Option<NodeKind> {
        let path = self.resolve(relative).ok()?;
        let metadata = tokio::fs::metadata(path).await.ok()?;
        Some(if metadata.is_dir() { NodeKind::Folder } else { NodeKind::File })
    }

    async fn read_file(&self, relative: &str) -> Result<String, HostError> {
        Ok(tokio::fs::read_to_string(self.resolve(relative)?).await?)
    }

    async fn write_file(&self, relative: &str, content: &str) -> Result<(), HostError> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    async fn create_node(&self, relative: &str, is_file: bool) -> Result<(), HostError> {
        let path = self.resolve(relative)?;
        if !is_file {
            tokio::fs::create_dir_all(&path).await?;
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, "").await?;
        Ok(())
    }

    async fn delete_node(&self, relative: &str, is_file: bool) -> Result<(), HostError> {
        let path = self.resolve(relative)?;
        if path == self.root {
            return Err(HostError::InvalidPath(relative.to_string()));
        }
        let result = if is_file {
            tokio::fs::remove_file(&path).await
        } else {
            tokio::fs::remove_dir_all(&path).await
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("Delete of missing {relative} skipped");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn rename_node(&self, relative: &str, new_name: &str) -> Result<(), HostError> {
        if new_name.is_empty() || new_name.contains(['/', '\\']) || new_name == ".." {
            return Err(HostError::InvalidPath(new_name.to_string()));
        }
        let from = self.resolve(relative)?;
        let parent = from
            .parent()
            .ok_or_else(|| HostError::InvalidPath(relative.to_string()))?
            .to_path_buf();
        tokio::fs::create_dir_all(&parent).await?;
        tokio::fs::rename(&from, parent.join(new_name)).await?;
        Ok(())
    }

    async fn list_files(&self, relative: &str) -> Result<Vec<String>, HostError> {
        let dir = self.resolve(relative)?;
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            for entry in WalkDir::new(&dir).min_depth(1) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        log::warn!("Skipping unreadable entry under {}: {e}", dir.display());
                        continue;
                    }
                };
                if entry.file_type().is_file() {
                    if let Some(name) = relative_name(&root, entry.path()) {
                        files.push(name);
                    }
                }
            }
            sort_deepest_first(&mut files);
            Ok(files)
        })
        .await?
    }

    async fn archive(&self) -> Result<Vec<u8>, HostError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || zip_tree(&root)).await?
    }

    async fn unarchive(&self, data: &[u8]) -> Result<(), HostError> {
        let root = self.root.clone();
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || unzip_tree(&root, &data)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_read_write() {
        let dir = tempfile::tempdir().unwrap();
        let ws = LocalWorkspace::new(dir.path());

        ws.create_node("notes/a.txt", true).await.unwrap();
        assert_eq!(ws.stat("notes").await, Some(NodeKind::Folder));
        assert_eq!(ws.stat("notes/a.txt").await, Some(NodeKind::File));
        assert_eq!(ws.read_file("notes/a.txt").await.unwrap(), "");

        ws.write_file("notes/a.txt", "hello").await.unwrap();
        assert_eq!(ws.read_file("notes/a.txt").await.unwrap(), "hello");
        assert_eq!(ws.stat("missing").await, None);
    }

    #[tokio::test]
    async fn test_paths_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let ws = LocalWorkspace::new(dir.path());

        assert!(matches!(ws.read_file("../etc/passwd").await, Err(HostError::InvalidPath(_))));
        assert!(matches!(ws.delete_node("", false).await, Err(HostError::InvalidPath(_))));
        assert!(matches!(ws.rename_node("a", "../b").await, Err(HostError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_rename_within_parent() {
        let dir = tempfile::tempdir().unwrap();
        let ws = LocalWorkspace::new(dir.path());
        ws.write_file("src/old.rs", "fn main() {}").await.unwrap();

        ws.rename_node("src/old.rs", "new.rs").await.unwrap();

        assert_eq!(ws.stat("src/old.rs").await, None);
        assert_eq!(ws.read_file("src/new.rs").await.unwrap(), "fn main() {}");
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let ws = LocalWorkspace::new(dir.path());
        ws.write_file("d/x.txt", "x").await.unwrap();

        ws.delete_node("d", false).await.unwrap();
        assert_eq!(ws.stat("d").await, None);
        ws.delete_node("d", false).await.unwrap();
        ws.delete_node("gone.txt", true).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_files_deepest_first() {
        let dir = tempfile::tempdir().unwrap();
        let ws = LocalWorkspace::new(dir.path());
        ws.write_file("f/a.txt", "a").await.unwrap();
        ws.write_file("f/b/c.txt", "c").await.unwrap();
        ws.create_node("f/empty", false).await.unwrap();

        let files = ws.list_files("f").await.unwrap();
        assert_eq!(files, vec!["f/b/c.txt".to_string(), "f/a.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_archive_roundtrip_keeps_tree() {
        let src = tempfile::tempdir().unwrap();
        let ws = LocalWorkspace::new(src.path());
        ws.write_file("a.txt", "hello").await.unwrap();
        ws.write_file("b/c.txt", "nested").await.unwrap();
        ws.create_node("empty", false).await.unwrap();

        let archive = ws.archive().await.unwrap();

        let dst = tempfile::tempdir().unwrap();
        let target = LocalWorkspace::new(dst.path());
        target.write_file("a.txt", "stale").await.unwrap();
        target.unarchive(&archive).await.unwrap();

        assert_eq!(target.read_file("a.txt").await.unwrap(), "hello");
        assert_eq!(target.read_file("b/c.txt").await.unwrap(), "nested");
        assert_eq!(target.stat("empty").await, Some(NodeKind::Folder));
    }

    #[tokio::test]
    async fn test_corrupt_archive_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ws = LocalWorkspace::new(dir.path());
        assert!(matches!(ws.unarchive(b"not a zip").await, Err(HostError::Archive(_))));
    }

    #[test]
    fn test_relative_path_default() {
        let ws = LocalWorkspace::new("/repo");
        assert_eq!(ws.relative_path(Path::new("/repo/src/main.rs")), "src/main.rs");
        assert_eq!(ws.absolute_path("src/main.rs"), PathBuf::from("/repo/src/main.rs"));
    }
}
