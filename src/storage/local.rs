// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Local file system storage.
//!
//! Serves a directory on the local file system as both source and target.
//! Files are addressed relative to the directory root. Writes go through a
//! temporary sibling file that is renamed into place, so a reader never sees
//! a half written file.

use crate::{
    config::{ConfigError, LocationSettings},
    exclude::ExcludeSet,
    storage::{FileHash, FileMode, Location, Result, Source, StorageError, Target},
    tree::TreeListing,
};

use ignore::WalkBuilder;
use std::{
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Directory on local file system.
#[derive(Debug, Clone)]
pub struct LocalFiles {
    root: PathBuf,
    name: String,
}

impl LocalFiles {
    /// Construct new local location from settings.
    ///
    /// Relative `dir` settings are resolved against the current working
    /// directory.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError`] if `dir` setting is missing or malformed.
    #[instrument(skip(settings), level = "debug")]
    pub fn new(settings: &LocationSettings) -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir().map_err(ConfigError::WorkingDirectory)?;
        Ok(Self::with_root(settings.resolve(cwd)?))
    }

    /// Construct new local location at already resolved root.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = format!("local:{}", root.display());
        debug!("open {name}");

        Self { root, name }
    }

    /// Absolute path of location root.
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    /// Translate relative file path into absolute path under root.
    pub fn real_path(&self, file: &str) -> PathBuf {
        file.split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    fn relative_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut segments = Vec::new();
        for component in relative.components() {
            segments.push(component.as_os_str().to_str()?);
        }

        Some(segments.join("/"))
    }
}

impl Location for LocalFiles {
    fn name(&self) -> &str {
        &self.name
    }

    fn exists(&self) -> bool {
        self.root.is_dir()
    }

    #[instrument(skip(self, excludes), fields(root = %self.root.display()), level = "debug")]
    fn list(&self, excludes: &ExcludeSet) -> Result<TreeListing> {
        if !self.root.is_dir() {
            return Err(StorageError::MissingRoot {
                root: self.root.clone(),
            });
        }

        let mut listing = TreeListing::new();

        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(false)
            .build();

        for entry in walker {
            let entry = entry.map_err(|err| StorageError::List {
                source: err,
                root: self.root.clone(),
            })?;

            // INVARIANT: Only regular files, or links that resolve to them.
            if !entry.path().is_file() {
                continue;
            }

            let Some(relative) = self.relative_path(entry.path()) else {
                warn!("skip non UTF-8 path {:?}", entry.path().display());
                continue;
            };

            if excludes.is_excluded(&relative) {
                debug!("exclude {relative}");
                continue;
            }

            listing.insert(relative);
        }

        Ok(listing)
    }
}

impl Source for LocalFiles {
    fn read(&self, file: &str) -> Result<Vec<u8>> {
        fs::read(self.real_path(file)).map_err(|err| StorageError::Read {
            source: err,
            file: file.to_owned(),
        })
    }

    fn hash(&self, file: &str) -> FileHash {
        match File::open(self.real_path(file)) {
            Ok(handle) => FileHash::of_reader(handle),
            Err(_) => FileHash::Unavailable,
        }
    }

    fn mode(&self, file: &str) -> FileMode {
        match fs::metadata(self.real_path(file)) {
            Ok(metadata) => mode_of(&metadata),
            Err(_) => FileMode::Unavailable,
        }
    }
}

impl Target for LocalFiles {
    #[instrument(skip(self, content), level = "debug")]
    fn write(&self, file: &str, content: &[u8], mode: FileMode) -> Result<()> {
        let path = self.real_path(file);
        write_replace(&path, content, mode).map_err(|err| StorageError::Write {
            source: err,
            file: file.to_owned(),
        })
    }

    fn chmod(&self, file: &str, mode: FileMode) -> Result<()> {
        set_mode(&self.real_path(file), mode).map_err(|err| StorageError::Chmod {
            source: err,
            file: file.to_owned(),
            mode,
        })
    }

    fn delete_file(&self, file: &str) -> Result<()> {
        match fs::remove_file(self.real_path(file)) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(StorageError::DeleteFile {
                source: err,
                file: file.to_owned(),
            }),
            _ => Ok(()),
        }
    }

    fn create_directory(&self, name: &str, mode: FileMode) -> Result<()> {
        let path = self.real_path(name);
        let result = mkdirp::mkdirp(&path).and_then(|_| {
            // INVARIANT: Default mode is left to the umask, like mkdir(1).
            if mode != FileMode::DEFAULT {
                set_mode(&path, mode)?;
            }
            Ok(())
        });

        result.map_err(|err| StorageError::CreateDirectory {
            source: err,
            name: name.to_owned(),
        })
    }

    fn delete_directory(&self, name: &str) -> Result<()> {
        match fs::remove_dir_all(self.real_path(name)) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(StorageError::DeleteDirectory {
                source: err,
                name: name.to_owned(),
            }),
            _ => Ok(()),
        }
    }
}

fn write_replace(path: &Path, content: &[u8], mode: FileMode) -> std::io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::other(format!("{:?} has no parent", path.display())))?;
    mkdirp::mkdirp(parent)?;

    let file_name = path
        .file_name()
        .ok_or_else(|| std::io::Error::other(format!("{:?} has no file name", path.display())))?;
    let mut temp_name = std::ffi::OsString::from(".");
    temp_name.push(file_name);
    temp_name.push(".treesync-tmp");
    let temp_path = parent.join(temp_name);

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    request_mode(&mut options, mode);

    let result = options
        .open(&temp_path)
        .and_then(|mut handle| {
            handle.write_all(content)?;
            handle.sync_all()
        })
        .and_then(|_| fs::rename(&temp_path, path));

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }

    result
}

#[cfg(unix)]
fn request_mode(options: &mut OpenOptions, mode: FileMode) {
    use std::os::unix::fs::OpenOptionsExt;
    if let Some(bits) = mode.bits() {
        options.mode(bits);
    }
}

#[cfg(not(unix))]
fn request_mode(_: &mut OpenOptions, _: FileMode) {}

#[cfg(unix)]
fn mode_of(metadata: &fs::Metadata) -> FileMode {
    use std::os::unix::fs::PermissionsExt;
    FileMode::from_bits(metadata.permissions().mode())
}

#[cfg(not(unix))]
fn mode_of(_: &fs::Metadata) -> FileMode {
    FileMode::Unsupported
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: FileMode) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    match mode.bits() {
        Some(bits) => fs::set_permissions(path, fs::Permissions::from_mode(bits)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn set_mode(_: &Path, _: FileMode) -> std::io::Result<()> {
    Ok(())
}
