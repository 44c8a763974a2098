// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Tree comparison.
//!
//! The comparer lines up the listing of a source tree against the listing of
//! a target tree, and sorts every difference into one of five sets:
//!
//! - __Outdated files__ exist on both sides, but their checksums or modes
//!   differ.
//! - __Missing files__ exist only in the source.
//! - __Missing directories__ exist only in the source.
//! - __Obsolete files__ exist only in the target.
//! - __Obsolete directories__ exist only in the target.
//!
//! Directory existence comes from the listings alone. A directory exists on a
//! side if at least one listed file lives beneath it. Comparison never
//! mutates either side.

use crate::{
    exclude::ExcludeSet,
    storage::{Source, StorageError},
    tree::TreeListing,
};

use std::collections::BTreeSet;
use tracing::{debug, instrument};

/// Difference between source and target trees.
///
/// # Invariant
///
/// - No path is both outdated and missing.
/// - No path is both missing and obsolete.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Comparer {
    outdated_files: BTreeSet<String>,
    missing_files: BTreeSet<String>,
    missing_directories: BTreeSet<String>,
    obsolete_files: BTreeSet<String>,
    obsolete_directories: BTreeSet<String>,
}

impl Comparer {
    /// Compare source tree against target tree.
    ///
    /// Both sides are listed with the same exclusion rules. Files present on
    /// both sides are checked by checksum and mode. A target whose root does
    /// not exist yet counts as an empty tree. A source root must exist.
    ///
    /// # Errors
    ///
    /// - Return [`CompareError::Listing`] if either tree cannot be listed, or
    ///   if source root does not exist.
    #[instrument(skip_all, fields(source = source.name(), target = target.name()), level = "debug")]
    pub fn new<S, T>(source: &S, target: &T, excludes: &ExcludeSet) -> Result<Self>
    where
        S: Source + ?Sized,
        T: Source + ?Sized,
    {
        let source_listing = source.list(excludes)?;

        // INVARIANT: Only the target may be absent, the first sync creates it.
        let target_listing = if target.exists() {
            target.list(excludes)?
        } else {
            debug!("{} does not exist, treat as empty", target.name());
            TreeListing::new()
        };

        let mut comparer = Self::from_listings(&source_listing, &target_listing);
        comparer.outdated_files = source_listing
            .files()
            .filter(|file| target_listing.contains_file(file))
            .filter(|file| is_outdated(source, target, file))
            .map(str::to_owned)
            .collect();

        debug!(
            outdated = comparer.outdated_files.len(),
            missing = comparer.missing_files.len(),
            obsolete = comparer.obsolete_files.len(),
            "comparison done"
        );

        Ok(comparer)
    }

    /// Compare presence of files and directories between two listings.
    ///
    /// Does not check file content, so the outdated set stays empty.
    pub fn from_listings(source: &TreeListing, target: &TreeListing) -> Self {
        Self {
            outdated_files: BTreeSet::new(),
            missing_files: only_in(source.files(), |file| target.contains_file(file)),
            missing_directories: only_in(source.directories(), |directory| {
                target.contains_directory(directory)
            }),
            obsolete_files: only_in(target.files(), |file| source.contains_file(file)),
            obsolete_directories: only_in(target.directories(), |directory| {
                source.contains_directory(directory)
            }),
        }
    }

    pub fn outdated_files(&self) -> impl Iterator<Item = &str> {
        self.outdated_files.iter().map(String::as_str)
    }

    pub fn missing_files(&self) -> impl Iterator<Item = &str> {
        self.missing_files.iter().map(String::as_str)
    }

    pub fn missing_directories(&self) -> impl Iterator<Item = &str> {
        self.missing_directories.iter().map(String::as_str)
    }

    pub fn obsolete_files(&self) -> impl Iterator<Item = &str> {
        self.obsolete_files.iter().map(String::as_str)
    }

    pub fn obsolete_directories(&self) -> impl Iterator<Item = &str> {
        self.obsolete_directories.iter().map(String::as_str)
    }

    /// Check if trees are already in sync, ignoring obsolete entries when
    /// `preserve` is set.
    pub fn is_in_sync(&self, preserve: bool) -> bool {
        self.outdated_files.is_empty()
            && self.missing_files.is_empty()
            && self.missing_directories.is_empty()
            && (preserve || self.is_obsolete_empty())
    }

    /// Check if there is no difference at all.
    pub fn is_empty(&self) -> bool {
        self.is_in_sync(false)
    }

    fn is_obsolete_empty(&self) -> bool {
        self.obsolete_files.is_empty() && self.obsolete_directories.is_empty()
    }

    /// Amount of storage operations needed to apply this difference.
    pub fn operation_count(&self, preserve: bool) -> usize {
        let mut count =
            self.outdated_files.len() + self.missing_files.len() + self.missing_directories.len();
        if !preserve {
            count += self.obsolete_files.len() + self.obsolete_directories.len();
        }

        count
    }
}

fn only_in<'a>(
    paths: impl Iterator<Item = &'a str>,
    other_contains: impl Fn(&str) -> bool,
) -> BTreeSet<String> {
    paths
        .filter(|path| !other_contains(path))
        .map(str::to_owned)
        .collect()
}

fn is_outdated<S, T>(source: &S, target: &T, file: &str) -> bool
where
    S: Source + ?Sized,
    T: Source + ?Sized,
{
    // INVARIANT: Unavailable checksum on either side always means outdated.
    if !source.hash(file).matches(&target.hash(file)) {
        debug!("{file} content differs");
        return true;
    }

    if !source.mode(file).matches(&target.mode(file)) {
        debug!("{file} mode differs");
        return true;
    }

    false
}

/// Comparison error types.
#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    /// Source or target tree cannot be listed.
    #[error(transparent)]
    Listing(#[from] StorageError),
}

/// Friendly result alias :3
type Result<T, E = CompareError> = std::result::Result<T, E>;
