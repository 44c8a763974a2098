// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! In-memory storage.
//!
//! Keeps an entire file tree in memory. Useful for embedding, and for
//! exercising synchronization logic without touching the file system.
//!
//! The in-memory tree behaves like a strict backend:
//!
//! - Writing a file requires its parent directory to already exist.
//! - Paths can be marked as __denied__ to simulate permission problems. Every
//!   operation on a denied path fails, and its checksum and mode are
//!   unavailable.
//! - Every successful mutation is recorded in a journal, so callers can
//!   inspect the exact order of operations that were applied.
//!
//! A [`MemoryFiles`] value is a handle. Cloning it yields another handle to
//! the same tree.

use crate::{
    exclude::ExcludeSet,
    storage::{FileMode, Location, Result, Source, StorageError, Target},
    tree::TreeListing,
};

use std::{
    collections::{BTreeMap, BTreeSet},
    io::{Error as IoError, ErrorKind},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// Handle to in-memory file tree.
#[derive(Debug, Clone)]
pub struct MemoryFiles {
    name: String,
    tree: Arc<Mutex<MemoryTree>>,
}

impl MemoryFiles {
    /// Construct new empty in-memory tree.
    ///
    /// Uses a umask of `022`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: format!("memory:{}", name.into()),
            tree: Arc::new(Mutex::new(MemoryTree {
                umask: 0o022,
                ..MemoryTree::default()
            })),
        }
    }

    /// Insert file with given mode, creating its ancestors as needed.
    pub fn with_file(self, file: &str, content: impl AsRef<[u8]>, mode: u32) -> Self {
        self.insert_file(file, content, mode);
        self
    }

    /// Insert file with given mode, creating its ancestors as needed.
    ///
    /// Bypasses denied paths, and is not recorded in the journal.
    pub fn insert_file(&self, file: &str, content: impl AsRef<[u8]>, mode: u32) {
        let file = crate::tree::normalize(file);
        let mut tree = self.lock();
        tree.add_ancestors(&file);
        tree.files.insert(
            file,
            MemoryFile {
                content: content.as_ref().to_vec(),
                mode: mode & 0o7777,
            },
        );
    }

    /// Mark path as denied.
    pub fn deny(&self, path: &str) {
        self.lock().denied.insert(crate::tree::normalize(path));
    }

    /// Set umask applied to modes of written files and created directories.
    pub fn set_umask(&self, umask: u32) {
        self.lock().umask = umask & 0o777;
    }

    /// Content of file, if it exists.
    pub fn content(&self, file: &str) -> Option<Vec<u8>> {
        self.lock().files.get(file).map(|entry| entry.content.clone())
    }

    /// Content of file as UTF-8 text, if it exists.
    pub fn text(&self, file: &str) -> Option<String> {
        self.content(file)
            .map(|content| String::from_utf8_lossy(&content).into_owned())
    }

    /// Check if file exists.
    pub fn has_file(&self, file: &str) -> bool {
        self.lock().files.contains_key(file)
    }

    /// Check if directory exists.
    pub fn has_directory(&self, name: &str) -> bool {
        self.lock().directories.contains(name)
    }

    /// All file paths in lexical order.
    pub fn file_paths(&self) -> Vec<String> {
        self.lock().files.keys().cloned().collect()
    }

    /// Journal of successful mutations in order of application.
    pub fn journal(&self) -> Vec<Operation> {
        self.lock().journal.clone()
    }

    /// Forget journal entries recorded so far.
    pub fn clear_journal(&self) {
        self.lock().journal.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MemoryTree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Location for MemoryFiles {
    fn name(&self) -> &str {
        &self.name
    }

    fn list(&self, excludes: &ExcludeSet) -> Result<TreeListing> {
        Ok(self
            .lock()
            .files
            .keys()
            .filter(|file| !excludes.is_excluded(file))
            .collect())
    }
}

impl Source for MemoryFiles {
    fn read(&self, file: &str) -> Result<Vec<u8>> {
        let tree = self.lock();
        tree.check_access(file)
            .and_then(|_| {
                tree.files
                    .get(file)
                    .map(|entry| entry.content.clone())
                    .ok_or_else(|| IoError::from(ErrorKind::NotFound))
            })
            .map_err(|err| StorageError::Read {
                source: err,
                file: file.to_owned(),
            })
    }

    fn mode(&self, file: &str) -> FileMode {
        let tree = self.lock();
        if tree.denied.contains(file) {
            return FileMode::Unavailable;
        }

        tree.files
            .get(file)
            .map(|entry| FileMode::Bits(entry.mode))
            .unwrap_or(FileMode::Unavailable)
    }
}

impl Target for MemoryFiles {
    fn write(&self, file: &str, content: &[u8], mode: FileMode) -> Result<()> {
        let mut tree = self.lock();
        let result = tree.check_access(file).and_then(|_| {
            let parent = file.rsplit_once('/').map(|(parent, _)| parent);
            match parent {
                Some(parent) if !tree.directories.contains(parent) => {
                    Err(IoError::from(ErrorKind::NotFound))
                }
                _ => Ok(()),
            }
        });

        if let Err(err) = result {
            return Err(StorageError::Write {
                source: err,
                file: file.to_owned(),
            });
        }

        let bits = mode.bits().unwrap_or(0o666) & !tree.umask;
        tree.files.insert(
            file.to_owned(),
            MemoryFile {
                content: content.to_vec(),
                mode: bits,
            },
        );
        tree.journal.push(Operation::Write(file.to_owned()));

        Ok(())
    }

    fn chmod(&self, file: &str, mode: FileMode) -> Result<()> {
        let mut tree = self.lock();
        let result = tree.check_access(file).and_then(|_| {
            if tree.files.contains_key(file) {
                Ok(())
            } else {
                Err(IoError::from(ErrorKind::NotFound))
            }
        });

        if let Err(err) = result {
            return Err(StorageError::Chmod {
                source: err,
                file: file.to_owned(),
                mode,
            });
        }

        if let (Some(bits), Some(entry)) = (mode.bits(), tree.files.get_mut(file)) {
            entry.mode = bits;
        }
        tree.journal.push(Operation::Chmod(file.to_owned()));

        Ok(())
    }

    fn delete_file(&self, file: &str) -> Result<()> {
        let mut tree = self.lock();
        tree.check_access(file)
            .map_err(|err| StorageError::DeleteFile {
                source: err,
                file: file.to_owned(),
            })?;

        if tree.files.remove(file).is_some() {
            tree.journal.push(Operation::DeleteFile(file.to_owned()));
        }

        Ok(())
    }

    fn create_directory(&self, name: &str, _mode: FileMode) -> Result<()> {
        let mut tree = self.lock();
        let result = tree.check_access(name).and_then(|_| {
            if tree.files.contains_key(name) {
                Err(IoError::from(ErrorKind::AlreadyExists))
            } else {
                Ok(())
            }
        });

        if let Err(err) = result {
            return Err(StorageError::CreateDirectory {
                source: err,
                name: name.to_owned(),
            });
        }

        tree.directories.insert(name.to_owned());
        tree.add_ancestors(name);
        tree.journal.push(Operation::CreateDirectory(name.to_owned()));

        Ok(())
    }

    fn delete_directory(&self, name: &str) -> Result<()> {
        let mut tree = self.lock();
        tree.check_access(name)
            .map_err(|err| StorageError::DeleteDirectory {
                source: err,
                name: name.to_owned(),
            })?;

        if !tree.directories.contains(name) {
            return Ok(());
        }

        let prefix = format!("{name}/");
        tree.files.retain(|file, _| !file.starts_with(&prefix));
        tree.directories
            .retain(|directory| directory != name && !directory.starts_with(&prefix));
        tree.journal.push(Operation::DeleteDirectory(name.to_owned()));

        Ok(())
    }
}

/// Mutation applied to an in-memory tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Write(String),
    Chmod(String),
    DeleteFile(String),
    CreateDirectory(String),
    DeleteDirectory(String),
}

#[derive(Debug, Default)]
struct MemoryTree {
    files: BTreeMap<String, MemoryFile>,
    directories: BTreeSet<String>,
    denied: BTreeSet<String>,
    umask: u32,
    journal: Vec<Operation>,
}

impl MemoryTree {
    fn add_ancestors(&mut self, path: &str) {
        let mut ancestor = path;
        while let Some((parent, _)) = ancestor.rsplit_once('/') {
            self.directories.insert(parent.to_owned());
            ancestor = parent;
        }
    }

    fn check_access(&self, path: &str) -> std::io::Result<()> {
        if self.denied.contains(path) {
            return Err(IoError::from(ErrorKind::PermissionDenied));
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
struct MemoryFile {
    content: Vec<u8>,
    mode: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn write_requires_parent_directory() {
        let files = MemoryFiles::new("test");

        let result = files.write("sub/a.txt", b"a", FileMode::DEFAULT);
        assert!(matches!(result, Err(StorageError::Write { .. })));

        files.create_directory("sub", FileMode::DEFAULT).unwrap();
        files.write("sub/a.txt", b"a", FileMode::DEFAULT).unwrap();
        assert_eq!(files.text("sub/a.txt"), Some("a".to_string()));
        assert_eq!(files.mode("sub/a.txt"), FileMode::Bits(0o755));
    }

    #[test]
    fn denied_path_fails_every_operation() {
        let files = MemoryFiles::new("test").with_file("secret.txt", "psst", 0o600);
        files.deny("secret.txt");

        assert!(files.read("secret.txt").is_err());
        assert!(files.hash("secret.txt").is_unavailable());
        assert_eq!(files.mode("secret.txt"), FileMode::Unavailable);
        assert!(files.write("secret.txt", b"x", FileMode::DEFAULT).is_err());
        assert!(files.chmod("secret.txt", FileMode::Bits(0o644)).is_err());
        assert!(files.delete_file("secret.txt").is_err());
        assert!(files.journal().is_empty());
    }

    #[test]
    fn delete_directory_removes_descendants() {
        let files = MemoryFiles::new("test")
            .with_file("keep.txt", "k", 0o644)
            .with_file("old/a.txt", "a", 0o644)
            .with_file("old/deep/b.txt", "b", 0o644);

        files.delete_directory("old").unwrap();
        files.delete_directory("old/deep").unwrap();
        assert_eq!(files.file_paths(), vec!["keep.txt".to_string()]);
        assert!(!files.has_directory("old/deep"));
        assert_eq!(
            files.journal(),
            vec![Operation::DeleteDirectory("old".into())]
        );
    }

    #[test]
    fn clones_share_tree() {
        let files = MemoryFiles::new("test");
        let handle = files.clone();

        files.write("a.txt", b"a", FileMode::DEFAULT).unwrap();
        assert!(handle.has_file("a.txt"));
    }
}
