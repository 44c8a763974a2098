// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! File tree listing.
//!
//! A __tree listing__ is the normalized view of every file that lives under
//! the root of a location. All paths are relative to that root and always use
//! `/` as their separator, no matter what platform produced them.
//!
//! Directories are never listed on their own. A directory exists in a listing
//! if and only if at least one listed file lives somewhere beneath it. Thus, a
//! directory that is empty, or that only contains excluded files, is invisible
//! to the listing.

use std::collections::{BTreeMap, BTreeSet};

/// Normalized listing of files under a location root.
///
/// # Invariant
///
/// - Every ancestor directory of every listed file is present in the
///   directory index.
/// - The root directory itself is never part of the directory index.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TreeListing {
    files: BTreeSet<String>,
    directories: BTreeSet<String>,
}

impl TreeListing {
    /// Construct new empty listing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert file path into listing.
    ///
    /// Leading and trailing separators are stripped, and empty path segments
    /// are dropped. Inserting an empty path does nothing.
    pub fn insert(&mut self, file: impl AsRef<str>) {
        let file = normalize(file.as_ref());
        if file.is_empty() {
            return;
        }

        // INVARIANT: Register every ancestor directory of the new file.
        let mut ancestor = file.as_str();
        while let Some((parent, _)) = ancestor.rsplit_once('/') {
            if !self.directories.insert(parent.to_owned()) {
                break;
            }
            ancestor = parent;
        }

        self.files.insert(file);
    }

    /// Iterate over listed file paths in lexical order.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(String::as_str)
    }

    /// Iterate over implied directory paths in lexical order.
    pub fn directories(&self) -> impl Iterator<Item = &str> {
        self.directories.iter().map(String::as_str)
    }

    pub fn contains_file(&self, file: &str) -> bool {
        self.files.contains(file)
    }

    pub fn contains_directory(&self, directory: &str) -> bool {
        self.directories.contains(directory)
    }

    /// Amount of listed files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Group listed files by their parent directory.
    ///
    /// Maps each directory that directly holds files to a mapping of base name
    /// to full relative path. Files at the top-level are keyed by the empty
    /// string.
    pub fn by_directory(&self) -> BTreeMap<&str, BTreeMap<&str, &str>> {
        let mut groups: BTreeMap<&str, BTreeMap<&str, &str>> = BTreeMap::new();
        for file in &self.files {
            let (parent, name) = file.rsplit_once('/').unwrap_or(("", file.as_str()));
            groups.entry(parent).or_default().insert(name, file.as_str());
        }

        groups
    }
}

impl<S> FromIterator<S> for TreeListing
where
    S: AsRef<str>,
{
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut listing = Self::new();
        listing.extend(iter);
        listing
    }
}

impl<S> Extend<S> for TreeListing
where
    S: AsRef<str>,
{
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for file in iter {
            self.insert(file);
        }
    }
}

/// Strip redundant separators from relative path.
pub(crate) fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Amount of path segments in relative path.
pub(crate) fn depth(path: &str) -> usize {
    path.split('/').count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn insert_registers_every_ancestor() {
        let listing = TreeListing::from_iter(["a.txt", "sub/deeper/b.txt", "sub/c.txt"]);

        let files = listing.files().collect::<Vec<_>>();
        assert_eq!(files, vec!["a.txt", "sub/c.txt", "sub/deeper/b.txt"]);

        let directories = listing.directories().collect::<Vec<_>>();
        assert_eq!(directories, vec!["sub", "sub/deeper"]);
        assert!(!listing.contains_directory(""));
    }

    #[test]
    fn insert_normalizes_separators() {
        let mut listing = TreeListing::new();
        listing.insert("/sub//b.txt/");
        listing.insert("");
        listing.insert("///");

        assert_eq!(listing.len(), 1);
        assert!(listing.contains_file("sub/b.txt"));
        assert!(listing.contains_directory("sub"));
    }

    #[test]
    fn by_directory_groups_files_under_parent() {
        let listing = TreeListing::from_iter(["a.txt", "sub/b.txt", "sub/c.txt", "x/y/z.txt"]);

        let mut expect: BTreeMap<&str, BTreeMap<&str, &str>> = BTreeMap::new();
        expect.entry("").or_default().insert("a.txt", "a.txt");
        expect.entry("sub").or_default().insert("b.txt", "sub/b.txt");
        expect.entry("sub").or_default().insert("c.txt", "sub/c.txt");
        expect.entry("x/y").or_default().insert("z.txt", "x/y/z.txt");

        assert_eq!(listing.by_directory(), expect);
    }

    #[test]
    fn depth_counts_segments() {
        assert_eq!(depth("a"), 1);
        assert_eq!(depth("a/b/c"), 3);
    }
}
