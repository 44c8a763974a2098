// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Tree synchronization.
//!
//! The synchronizer mutates a target tree until it mirrors a source tree. It
//! compares both trees, and then applies the difference in three phases:
//!
//! 1. __Update__: rewrite every outdated file.
//! 2. __Add__: create every missing directory, then write every missing file.
//! 3. __Remove__: delete every obsolete file, then every obsolete directory.
//!    This phase is skipped when obsolete entries are preserved.
//!
//! Each storage operation stands on its own. A failed operation is recorded
//! and the rest of the run carries on. Nothing is rolled back, and nothing is
//! retried. Running the synchronizer again compares the trees anew, so it only
//! attempts what is still left to do.

use crate::{
    compare::{CompareError, Comparer},
    exclude::ExcludeSet,
    storage::{FileMode, Source, StorageError, Target},
    tree::depth,
};

use indicatif::ProgressBar;
use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::{debug, info, instrument, warn};

/// One-way tree synchronizer.
pub struct Synchronizer {
    source: Option<Box<dyn Source>>,
    target: Option<Box<dyn Target>>,
    excludes: ExcludeSet,
    progress: ProgressBar,
}

impl Synchronizer {
    /// Construct new synchronizer without source or target.
    pub fn new() -> Self {
        Self {
            source: None,
            target: None,
            excludes: ExcludeSet::none(),
            progress: ProgressBar::hidden(),
        }
    }

    /// Attach source tree.
    pub fn with_source(mut self, source: impl Source + 'static) -> Self {
        self.set_source(source);
        self
    }

    /// Attach target tree.
    pub fn with_target(mut self, target: impl Target + 'static) -> Self {
        self.set_target(target);
        self
    }

    /// Use exclusion rules on both trees.
    pub fn with_excludes(mut self, excludes: ExcludeSet) -> Self {
        self.excludes = excludes;
        self
    }

    /// Report progress through progress bar.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn set_source(&mut self, source: impl Source + 'static) {
        self.source = Some(Box::new(source));
    }

    pub fn set_target(&mut self, target: impl Target + 'static) {
        self.target = Some(Box::new(target));
    }

    pub fn set_excludes(&mut self, excludes: ExcludeSet) {
        self.excludes = excludes;
    }

    /// Compare attached trees without touching either of them.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::MissingSource`] if no source is attached.
    /// - Return [`SyncError::MissingTarget`] if no target is attached.
    /// - Return [`SyncError::Compare`] if either tree cannot be listed.
    pub fn compare(&self) -> Result<Comparer> {
        let (source, target) = self.endpoints()?;
        Ok(Comparer::new(source, target, &self.excludes)?)
    }

    /// Synchronize target with source.
    ///
    /// Obsolete files and directories in target are kept if `preserve` is
    /// set. Failed storage operations do not abort the run. They are listed
    /// in the returned report instead.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::MissingSource`] if no source is attached.
    /// - Return [`SyncError::MissingTarget`] if no target is attached.
    /// - Return [`SyncError::Compare`] if either tree cannot be listed.
    #[instrument(skip(self), level = "debug")]
    pub fn synchronize(&self, preserve: bool) -> Result<SyncReport> {
        let (source, target) = self.endpoints()?;
        info!("synchronize {} into {}", source.name(), target.name());

        let diff = Comparer::new(source, target, &self.excludes)?;
        self.progress.set_length(diff.operation_count(preserve) as u64);
        self.progress.set_position(0);

        let mut run = Run {
            source,
            target,
            progress: &self.progress,
            report: SyncReport::default(),
        };

        run.update_outdated(&diff);
        run.add_missing(&diff);
        if preserve {
            debug!("preserve obsolete entries");
        } else {
            run.remove_obsolete(&diff);
        }

        self.progress.finish_and_clear();
        let report = run.report;
        if report.is_success() {
            info!("{report}");
        } else {
            warn!("{report}");
        }

        Ok(report)
    }

    fn endpoints(&self) -> Result<(&dyn Source, &dyn Target)> {
        let source = self.source.as_deref().ok_or(SyncError::MissingSource)?;
        let target = self.target.as_deref().ok_or(SyncError::MissingTarget)?;

        Ok((source, target))
    }
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single synchronization run.
struct Run<'a> {
    source: &'a dyn Source,
    target: &'a dyn Target,
    progress: &'a ProgressBar,
    report: SyncReport,
}

impl Run<'_> {
    #[instrument(skip_all, level = "debug")]
    fn update_outdated(&mut self, diff: &Comparer) {
        for file in diff.outdated_files() {
            if self.transfer(file) {
                self.report.updated += 1;
            }
        }
    }

    #[instrument(skip_all, level = "debug")]
    fn add_missing(&mut self, diff: &Comparer) {
        // INVARIANT: Every missing directory exists before any missing file
        // gets written, and parents are created before their children.
        let mut directories = diff.missing_directories().collect::<Vec<_>>();
        directories.sort_by_key(|directory| depth(directory));

        for directory in directories {
            self.progress.set_message(directory.to_owned());
            debug!("create directory {directory}");
            match self.target.create_directory(directory, FileMode::DEFAULT) {
                Ok(()) => self.report.created_directories += 1,
                Err(err) => self.fail(Operation::CreateDirectory, directory, err),
            }
            self.progress.inc(1);
        }

        for file in diff.missing_files() {
            if self.transfer(file) {
                self.report.added += 1;
            }
        }
    }

    #[instrument(skip_all, level = "debug")]
    fn remove_obsolete(&mut self, diff: &Comparer) {
        for file in diff.obsolete_files() {
            self.progress.set_message(file.to_owned());
            debug!("delete file {file}");
            match self.target.delete_file(file) {
                Ok(()) => self.report.removed_files += 1,
                Err(err) => self.fail(Operation::DeleteFile, file, err),
            }
            self.progress.inc(1);
        }

        // INVARIANT: Children go before their parents.
        let mut directories = diff.obsolete_directories().collect::<Vec<_>>();
        directories.sort_by_key(|directory| std::cmp::Reverse(depth(directory)));

        for directory in directories {
            self.progress.set_message(directory.to_owned());
            debug!("delete directory {directory}");
            match self.target.delete_directory(directory) {
                Ok(()) => self.report.removed_directories += 1,
                Err(err) => self.fail(Operation::DeleteDirectory, directory, err),
            }
            self.progress.inc(1);
        }
    }

    /// Copy file from source to target, and carry over its mode.
    ///
    /// Returns true if the content made it into the target.
    fn transfer(&mut self, file: &str) -> bool {
        self.progress.set_message(file.to_owned());
        debug!("write file {file}");

        let written = match self.source.read(file) {
            Ok(content) => match self.target.write(file, &content, FileMode::DEFAULT) {
                Ok(()) => true,
                Err(err) => {
                    self.fail(Operation::Write, file, err);
                    false
                }
            },
            Err(err) => {
                self.fail(Operation::Read, file, err);
                false
            }
        };

        if written {
            let mode = self.source.mode(file);
            if mode.bits().is_some() {
                if let Err(err) = self.target.chmod(file, mode) {
                    self.fail(Operation::Chmod, file, err);
                }
            }
        }

        self.progress.inc(1);
        written
    }

    fn fail(&mut self, operation: Operation, path: &str, error: StorageError) {
        warn!("{operation} {path:?} failed: {error}");
        self.report.failures.push(Failure {
            operation,
            path: path.to_owned(),
            error,
        });
    }
}

/// Outcome of a synchronization run.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Outdated files rewritten in target.
    pub updated: usize,

    /// Missing files written to target.
    pub added: usize,

    /// Missing directories created in target.
    pub created_directories: usize,

    /// Obsolete files deleted from target.
    pub removed_files: usize,

    /// Obsolete directories deleted from target.
    pub removed_directories: usize,

    /// Storage operations that failed.
    pub failures: Vec<Failure>,
}

impl SyncReport {
    /// Check if no storage operation failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Amount of failed storage operations.
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Paths of failed storage operations.
    pub fn failed_paths(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|failure| failure.path.as_str())
    }

    /// Amount of files whose content was written to target.
    pub fn writes(&self) -> usize {
        self.updated + self.added
    }
}

impl Display for SyncReport {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(
            fmt,
            "updated {}, added {}, created {} directories, removed {} files and {} directories, {} failures",
            self.updated,
            self.added,
            self.created_directories,
            self.removed_files,
            self.removed_directories,
            self.failures.len()
        )
    }
}

/// Storage operation that failed during a run.
#[derive(Debug)]
pub struct Failure {
    pub operation: Operation,
    pub path: String,
    pub error: StorageError,
}

/// Kinds of storage operation a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    Chmod,
    CreateDirectory,
    DeleteFile,
    DeleteDirectory,
}

impl Display for Operation {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Chmod => "chmod",
            Self::CreateDirectory => "create directory",
            Self::DeleteFile => "delete file",
            Self::DeleteDirectory => "delete directory",
        };

        fmt.write_str(name)
    }
}

/// Synchronization error types.
///
/// Only covers problems that prevent a run from starting. Failed storage
/// operations during a run end up in the [`SyncReport`].
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Synchronizer has no source attached.
    #[error("cannot synchronize without source")]
    MissingSource,

    /// Synchronizer has no target attached.
    #[error("cannot synchronize without target")]
    MissingTarget,

    /// Trees cannot be compared.
    #[error(transparent)]
    Compare(#[from] CompareError),
}

/// Friendly result alias :3
type Result<T, E = SyncError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{memory::Operation as Journal, MemoryFiles};
    use pretty_assertions::assert_eq;

    fn scenario() -> (MemoryFiles, MemoryFiles) {
        let source = MemoryFiles::new("source")
            .with_file("a.txt", "hi", 0o644)
            .with_file("sub/b.txt", "x", 0o644);
        let target = MemoryFiles::new("target").with_file("a.txt", "bye", 0o644);

        (source, target)
    }

    fn synchronizer(source: &MemoryFiles, target: &MemoryFiles) -> Synchronizer {
        Synchronizer::new()
            .with_source(source.clone())
            .with_target(target.clone())
    }

    #[test]
    fn mirrors_source_into_target() -> anyhow::Result<()> {
        let (source, target) = scenario();

        let report = synchronizer(&source, &target).synchronize(true)?;
        assert!(report.is_success());
        assert_eq!(report.updated, 1);
        assert_eq!(report.added, 1);
        assert_eq!(report.created_directories, 1);
        assert_eq!(target.text("a.txt"), Some("hi".into()));
        assert_eq!(target.text("sub/b.txt"), Some("x".into()));
        assert!(target.has_directory("sub"));
        assert_eq!(target.file_paths(), vec!["a.txt", "sub/b.txt"]);

        Ok(())
    }

    #[test]
    fn obsolete_files_follow_preserve_flag() -> anyhow::Result<()> {
        let (source, target) = scenario();
        target.insert_file("old.txt", "old", 0o644);

        let report = synchronizer(&source, &target).synchronize(true)?;
        assert!(report.is_success());
        assert!(target.has_file("old.txt"));

        let report = synchronizer(&source, &target).synchronize(false)?;
        assert!(report.is_success());
        assert_eq!(report.removed_files, 1);
        assert!(!target.has_file("old.txt"));
        assert_eq!(target.file_paths(), vec!["a.txt", "sub/b.txt"]);

        Ok(())
    }

    #[test]
    fn second_run_writes_nothing() -> anyhow::Result<()> {
        let (source, target) = scenario();
        source.insert_file("bin/run.sh", "#!/bin/sh", 0o700);
        let sync = synchronizer(&source, &target);

        sync.synchronize(true)?;
        target.clear_journal();

        let report = sync.synchronize(true)?;
        assert!(report.is_success());
        assert_eq!(report.writes(), 0);
        assert!(target.journal().is_empty());
        assert!(sync.compare()?.is_in_sync(true));

        Ok(())
    }

    #[test]
    fn mode_only_change_is_applied() -> anyhow::Result<()> {
        let source = MemoryFiles::new("source").with_file("run.sh", "echo", 0o750);
        let target = MemoryFiles::new("target").with_file("run.sh", "echo", 0o644);

        let report = synchronizer(&source, &target).synchronize(true)?;
        assert_eq!(report.updated, 1);
        assert_eq!(target.mode("run.sh"), FileMode::Bits(0o750));

        Ok(())
    }

    #[test]
    fn directories_are_created_before_their_files() -> anyhow::Result<()> {
        let source = MemoryFiles::new("source")
            .with_file("a/b/c/deep.txt", "d", 0o644)
            .with_file("a/top.txt", "t", 0o644)
            .with_file("z/last.txt", "l", 0o644);
        let target = MemoryFiles::new("target");

        let report = synchronizer(&source, &target).synchronize(true)?;
        assert!(report.is_success());

        let journal = target.journal();
        let position = |entry: Journal| journal.iter().position(|op| *op == entry).unwrap();
        let last_mkdir = ["a", "a/b", "a/b/c", "z"]
            .into_iter()
            .map(|dir| position(Journal::CreateDirectory(dir.into())))
            .max()
            .unwrap();
        let first_write = ["a/b/c/deep.txt", "a/top.txt", "z/last.txt"]
            .into_iter()
            .map(|file| position(Journal::Write(file.into())))
            .min()
            .unwrap();
        assert!(last_mkdir < first_write);
        assert!(
            position(Journal::CreateDirectory("a".into()))
                < position(Journal::CreateDirectory("a/b/c".into()))
        );

        Ok(())
    }

    #[test]
    fn files_are_removed_before_their_directories() -> anyhow::Result<()> {
        let source = MemoryFiles::new("source").with_file("keep.txt", "k", 0o644);
        let target = MemoryFiles::new("target")
            .with_file("keep.txt", "k", 0o644)
            .with_file("old/a.txt", "a", 0o644)
            .with_file("old/deep/b.txt", "b", 0o644);

        let report = synchronizer(&source, &target).synchronize(false)?;
        assert!(report.is_success());
        assert_eq!(report.removed_files, 2);
        assert_eq!(report.removed_directories, 2);
        assert_eq!(
            target.journal(),
            vec![
                Journal::DeleteFile("old/a.txt".into()),
                Journal::DeleteFile("old/deep/b.txt".into()),
                Journal::DeleteDirectory("old/deep".into()),
                Journal::DeleteDirectory("old".into()),
            ]
        );

        Ok(())
    }

    #[test]
    fn failed_write_does_not_stop_the_run() -> anyhow::Result<()> {
        let source = MemoryFiles::new("source")
            .with_file("one.txt", "1", 0o644)
            .with_file("two.txt", "2", 0o644)
            .with_file("three.txt", "3", 0o644);
        let target = MemoryFiles::new("target");
        target.deny("two.txt");

        let report = synchronizer(&source, &target).synchronize(true)?;
        assert!(!report.is_success());
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.failed_paths().collect::<Vec<_>>(), vec!["two.txt"]);
        assert_eq!(report.failures[0].operation, Operation::Write);
        assert_eq!(report.added, 2);
        assert!(target.has_file("one.txt"));
        assert!(target.has_file("three.txt"));
        assert!(!target.has_file("two.txt"));

        Ok(())
    }

    #[test]
    fn failed_directory_is_counted_per_operation() -> anyhow::Result<()> {
        let source = MemoryFiles::new("source")
            .with_file("locked/a.txt", "a", 0o644)
            .with_file("open/b.txt", "b", 0o644);
        let target = MemoryFiles::new("target");
        target.deny("locked");

        let report = synchronizer(&source, &target).synchronize(true)?;
        let failed = report
            .failures
            .iter()
            .map(|failure| (failure.operation, failure.path.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            failed,
            vec![
                (Operation::CreateDirectory, "locked"),
                (Operation::Write, "locked/a.txt"),
            ]
        );
        assert!(target.has_file("open/b.txt"));

        Ok(())
    }

    #[test]
    fn unreadable_source_file_is_a_failure() -> anyhow::Result<()> {
        let source = MemoryFiles::new("source").with_file("secret.txt", "s", 0o600);
        let target = MemoryFiles::new("target");
        source.deny("secret.txt");

        let report = synchronizer(&source, &target).synchronize(true)?;
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.failures[0].operation, Operation::Read);
        assert!(target.journal().is_empty());

        Ok(())
    }

    #[test]
    fn missing_endpoints_are_rejected_before_any_mutation() {
        let target = MemoryFiles::new("target");
        let result = Synchronizer::new().with_target(target.clone()).synchronize(false);
        assert!(matches!(result, Err(SyncError::MissingSource)));

        let source = MemoryFiles::new("source").with_file("a.txt", "a", 0o644);
        let result = Synchronizer::new().with_source(source).synchronize(false);
        assert!(matches!(result, Err(SyncError::MissingTarget)));

        assert!(target.journal().is_empty());
    }

    #[test]
    fn excludes_apply_to_both_sides() -> anyhow::Result<()> {
        let (source, target) = scenario();
        source.insert_file("debug.log", "new", 0o644);
        target.insert_file("trace.log", "old", 0o644);

        let report = synchronizer(&source, &target)
            .with_excludes(ExcludeSet::new(["*.log"])?)
            .synchronize(false)?;
        assert!(report.is_success());
        assert!(!target.has_file("debug.log"));
        assert!(target.has_file("trace.log"));

        Ok(())
    }
}
