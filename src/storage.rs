// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Storage abstractions.
//!
//! Treesync never touches storage directly. Instead, every tree it works with
//! is reached through a __location__, which knows how to list the files under
//! its root. A location that can also hand out file content, checksums, and
//! permissions is a __source__. A source that can also be mutated is a
//! __target__. Since every target is a source, a target can always serve as
//! the reference side of a comparison.
//!
//! All file arguments are relative paths using `/` as the separator.
//!
//! # Unavailable Data
//!
//! Checksum and permission queries never fail. If the underlying file cannot
//! be read, the query yields an __unavailable__ sentinel instead. The
//! sentinel never matches anything, not even another sentinel, so an
//! unreadable file is always treated as diverged rather than up to date.

pub mod local;
pub mod memory;

pub use local::LocalFiles;
pub use memory::MemoryFiles;

use crate::{exclude::ExcludeSet, tree::TreeListing};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    io::Read,
    path::PathBuf,
    str::FromStr,
};

/// Root of a file tree.
pub trait Location: Send + Sync {
    /// Human readable name of location for logging.
    fn name(&self) -> &str;

    /// Check if location root exists.
    ///
    /// A target whose root does not exist yet is compared as an empty tree.
    fn exists(&self) -> bool {
        true
    }

    /// List all files under location root that survive exclusion rules.
    ///
    /// # Errors
    ///
    /// - Return [`StorageError::MissingRoot`] if location root does not exist.
    /// - Return [`StorageError`] if the tree cannot be walked.
    fn list(&self, excludes: &ExcludeSet) -> Result<TreeListing>;
}

/// Location whose files can be read.
pub trait Source: Location {
    /// Read full content of file.
    ///
    /// # Errors
    ///
    /// - Return [`StorageError::Read`] if file cannot be read.
    fn read(&self, file: &str) -> Result<Vec<u8>>;

    /// Checksum of file content.
    ///
    /// Yields [`FileHash::Unavailable`] when file cannot be read.
    fn hash(&self, file: &str) -> FileHash {
        self.read(file)
            .map(|content| FileHash::of_bytes(&content))
            .unwrap_or(FileHash::Unavailable)
    }

    /// Permission bits of file.
    fn mode(&self, file: &str) -> FileMode;
}

/// Source that can be mutated.
pub trait Target: Source {
    /// Write file content, creating or replacing the file.
    ///
    /// The mode is a request. Backends apply their own umask on top of it.
    ///
    /// # Errors
    ///
    /// - Return [`StorageError::Write`] if file cannot be written.
    fn write(&self, file: &str, content: &[u8], mode: FileMode) -> Result<()>;

    /// Change permission bits of file.
    ///
    /// # Errors
    ///
    /// - Return [`StorageError::Chmod`] if permissions cannot be changed.
    fn chmod(&self, file: &str, mode: FileMode) -> Result<()>;

    /// Delete file. Deleting an absent file succeeds.
    ///
    /// # Errors
    ///
    /// - Return [`StorageError::DeleteFile`] if file cannot be removed.
    fn delete_file(&self, file: &str) -> Result<()>;

    /// Create directory along with any missing ancestors.
    ///
    /// # Errors
    ///
    /// - Return [`StorageError::CreateDirectory`] if directory cannot be
    ///   created.
    fn create_directory(&self, name: &str, mode: FileMode) -> Result<()>;

    /// Delete directory with everything inside of it. Deleting an absent
    /// directory succeeds.
    ///
    /// Everything inside means everything. Files hidden from the listing by
    /// exclusion rules go along with their directory.
    ///
    /// # Errors
    ///
    /// - Return [`StorageError::DeleteDirectory`] if directory cannot be
    ///   removed.
    fn delete_directory(&self, name: &str) -> Result<()>;
}

/// Checksum of file content.
#[derive(Debug, Clone)]
pub enum FileHash {
    /// Hex encoded BLAKE3 digest.
    Digest(String),

    /// File could not be read.
    Unavailable,
}

impl FileHash {
    /// Checksum in-memory content.
    pub fn of_bytes(content: &[u8]) -> Self {
        Self::Digest(blake3::hash(content).to_hex().to_string())
    }

    /// Checksum content of reader until EOF.
    ///
    /// Yields [`FileHash::Unavailable`] if reading fails midway.
    pub fn of_reader(reader: impl Read) -> Self {
        let mut hasher = blake3::Hasher::new();
        match hasher.update_reader(reader) {
            Ok(hasher) => Self::Digest(hasher.finalize().to_hex().to_string()),
            Err(_) => Self::Unavailable,
        }
    }

    /// Check if two checksums denote identical content.
    ///
    /// Unavailable checksums never match, not even each other.
    pub fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Digest(lhs), Self::Digest(rhs)) => lhs == rhs,
            _ => false,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

impl Display for FileHash {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Digest(digest) => fmt.write_str(digest),
            Self::Unavailable => fmt.write_str("<unavailable>"),
        }
    }
}

/// Permission bits of file.
///
/// Displayed and parsed as octal strings, e.g., `"755"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// POSIX permission bits, including setuid, setgid, and sticky bits.
    Bits(u32),

    /// Platform has no POSIX permissions. Matches every mode.
    Unsupported,

    /// Permissions could not be determined. Matches no mode.
    Unavailable,
}

impl FileMode {
    /// Mode requested for newly written files and directories.
    pub const DEFAULT: Self = Self::Bits(0o777);

    /// Construct new mode from raw permission bits.
    pub fn from_bits(bits: u32) -> Self {
        Self::Bits(bits & 0o7777)
    }

    /// Raw permission bits, if known.
    pub fn bits(&self) -> Option<u32> {
        match self {
            Self::Bits(bits) => Some(*bits),
            _ => None,
        }
    }

    /// Check if two modes are considered equal for comparison purposes.
    pub fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unavailable, _) | (_, Self::Unavailable) => false,
            (Self::Unsupported, _) | (_, Self::Unsupported) => true,
            (Self::Bits(lhs), Self::Bits(rhs)) => lhs == rhs,
        }
    }
}

impl Display for FileMode {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Bits(bits) => write!(fmt, "{bits:o}"),
            Self::Unsupported => fmt.write_str("<unsupported>"),
            Self::Unavailable => fmt.write_str("<unavailable>"),
        }
    }
}

impl FromStr for FileMode {
    type Err = StorageError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        u32::from_str_radix(data, 8)
            .ok()
            .filter(|bits| *bits <= 0o7777)
            .map(Self::Bits)
            .ok_or_else(|| StorageError::InvalidMode(data.to_owned()))
    }
}

/// Storage error types.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Location root does not exist, or is not a directory.
    #[error("root directory {:?} does not exist", root.display())]
    MissingRoot { root: PathBuf },

    /// Tree under location root cannot be walked.
    #[error("failed to list files under {:?}", root.display())]
    List {
        #[source]
        source: ignore::Error,
        root: PathBuf,
    },

    /// File cannot be read.
    #[error("failed to read {file:?}")]
    Read {
        #[source]
        source: std::io::Error,
        file: String,
    },

    /// File cannot be written.
    #[error("failed to write {file:?}")]
    Write {
        #[source]
        source: std::io::Error,
        file: String,
    },

    /// File permissions cannot be changed.
    #[error("failed to change mode of {file:?} to {mode}")]
    Chmod {
        #[source]
        source: std::io::Error,
        file: String,
        mode: FileMode,
    },

    /// File cannot be removed.
    #[error("failed to delete file {file:?}")]
    DeleteFile {
        #[source]
        source: std::io::Error,
        file: String,
    },

    /// Directory cannot be created.
    #[error("failed to create directory {name:?}")]
    CreateDirectory {
        #[source]
        source: std::io::Error,
        name: String,
    },

    /// Directory cannot be removed.
    #[error("failed to delete directory {name:?}")]
    DeleteDirectory {
        #[source]
        source: std::io::Error,
        name: String,
    },

    /// Octal permission string cannot be parsed.
    #[error("invalid file mode {0:?}")]
    InvalidMode(String),
}

/// Friendly result alias :3
pub type Result<T, E = StorageError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test]
    fn unavailable_hash_never_matches() {
        let digest = FileHash::of_bytes(b"hello");
        assert!(digest.matches(&FileHash::of_bytes(b"hello")));
        assert!(!digest.matches(&FileHash::of_bytes(b"world")));
        assert!(!digest.matches(&FileHash::Unavailable));
        assert!(!FileHash::Unavailable.matches(&digest));
        assert!(!FileHash::Unavailable.matches(&FileHash::Unavailable));
    }

    #[test]
    fn reader_hash_agrees_with_bytes_hash() {
        let content = b"some file content".to_vec();
        let lhs = FileHash::of_reader(content.as_slice());
        let rhs = FileHash::of_bytes(&content);
        assert!(lhs.matches(&rhs));
    }

    #[test_case(FileMode::Bits(0o755), FileMode::Bits(0o755), true; "same bits")]
    #[test_case(FileMode::Bits(0o755), FileMode::Bits(0o644), false; "different bits")]
    #[test_case(FileMode::Unsupported, FileMode::Bits(0o644), true; "unsupported matches bits")]
    #[test_case(FileMode::Unsupported, FileMode::Unsupported, true; "unsupported matches itself")]
    #[test_case(FileMode::Unavailable, FileMode::Unsupported, false; "unavailable beats unsupported")]
    #[test_case(FileMode::Unavailable, FileMode::Unavailable, false; "unavailable matches nothing")]
    #[test]
    fn mode_matching(lhs: FileMode, rhs: FileMode, expect: bool) {
        pretty_assertions::assert_eq!(lhs.matches(&rhs), expect);
        pretty_assertions::assert_eq!(rhs.matches(&lhs), expect);
    }

    #[test]
    fn mode_octal_round_trip() -> anyhow::Result<()> {
        let mode: FileMode = "755".parse()?;
        assert_eq!(mode, FileMode::Bits(0o755));
        assert_eq!(mode.to_string(), "755");
        assert_eq!(FileMode::from_bits(0o100644).to_string(), "644");
        assert!("9".parse::<FileMode>().is_err());
        assert!("77777".parse::<FileMode>().is_err());

        Ok(())
    }
}
