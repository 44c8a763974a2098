// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! One-way file tree synchronization.
//!
//! Treesync mirrors a __source__ file tree into a __target__ file tree. Files
//! that changed in the source are rewritten in the target, files that the
//! target lacks are created, and, if requested, files and directories that
//! only the target has are removed.
//!
//! Both sides are reached through storage traits, see [`storage`], so that
//! neither side has to be a local directory. The [`compare::Comparer`] works
//! out what differs between both trees, and the [`sync::Synchronizer`] applies
//! that difference to the target.
//!
//! # Example
//!
//! ```no_run
//! use treesync::{ExcludeSet, LocalFiles, Synchronizer};
//!
//! let report = Synchronizer::new()
//!     .with_source(LocalFiles::with_root("/srv/public"))
//!     .with_target(LocalFiles::with_root("/var/www/site"))
//!     .with_excludes(ExcludeSet::new(["*.log"])?)
//!     .synchronize(false)?;
//! assert!(report.is_success());
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod compare;
pub mod config;
pub mod exclude;
pub mod path;
pub mod storage;
pub mod sync;
pub mod tree;

pub use compare::Comparer;
pub use config::{ExcludeSpec, LocationSettings, ProfileFile, SyncProfile};
pub use exclude::ExcludeSet;
pub use storage::{FileHash, FileMode, LocalFiles, Location, MemoryFiles, Source, Target};
pub use sync::{SyncReport, Synchronizer};
pub use tree::TreeListing;
