// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for configuration files that Treesync uses to simplify
//! the process of serialization and deserialization. File I/O is left to the
//! caller to figure out.

use crate::exclude::{ExcludeError, ExcludeSet};

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Profile file layout.
///
/// A __profile__ names one synchronization job: which tree to copy from,
/// which tree to copy into, what to leave out, and whether files that only
/// exist in the target should survive.
///
/// # General Layout
///
/// ```toml
/// [profile.site]
/// preserve = false
/// exclude = ["*.log", "!*.keep"]
///
/// [profile.site.source]
/// dir = "public"
///
/// [profile.site.target]
/// dir = "~/www/site"
/// ```
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ProfileFile {
    /// Listing of profiles by name.
    #[serde(rename = "profile", default)]
    pub profiles: BTreeMap<String, SyncProfile>,
}

impl ProfileFile {
    /// Look up profile by name.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::UnknownProfile`] if no profile has that name.
    pub fn profile(&self, name: &str) -> Result<&SyncProfile> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_owned()))
    }
}

impl FromStr for ProfileFile {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        toml::de::from_str(data).map_err(ConfigError::Deserialize)
    }
}

impl Display for ProfileFile {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Synchronization job settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SyncProfile {
    /// Files to leave out on both sides.
    #[serde(default)]
    pub exclude: ExcludeSpec,

    /// Keep files and directories that only exist in target.
    #[serde(default = "default_preserve")]
    pub preserve: bool,

    /// Tree to copy from.
    pub source: LocationSettings,

    /// Tree to copy into.
    pub target: LocationSettings,
}

fn default_preserve() -> bool {
    true
}

/// Location settings.
///
/// The only setting is `dir`, the root directory of the location. It is
/// optional at the layout level so that a missing `dir` can be reported as a
/// proper configuration error at resolution time.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct LocationSettings {
    /// Root directory, absolute or relative to working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

impl LocationSettings {
    /// Construct new location settings for directory.
    pub fn new(dir: impl Into<String>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// Resolve root directory to absolute path.
    ///
    /// Performs shell expansion on `dir`, and joins relative results onto
    /// `cwd`. Existing directories are canonicalized.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::MissingDir`] if `dir` is absent or empty.
    /// - Return [`ConfigError::ShellExpansion`] if expansion fails.
    pub fn resolve(&self, cwd: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = self
            .dir
            .as_deref()
            .filter(|dir| !dir.trim().is_empty())
            .ok_or(ConfigError::MissingDir)?;

        // INVARIANT: Perform shell expansion on directory setting.
        let expanded = PathBuf::from(shellexpand::full(dir)?.into_owned());
        let path = if expanded.is_absolute() {
            expanded
        } else {
            cwd.as_ref().join(expanded)
        };

        Ok(path.canonicalize().unwrap_or(path))
    }
}

/// Exclusion setting.
///
/// Either `false` to disable exclusion, a single glob rule, or an ordered
/// list of glob rules.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ExcludeSpec {
    Flag(bool),
    Single(String),
    List(Vec<String>),
}

impl ExcludeSpec {
    /// Compile into exclusion rule set.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ExcludeFlag`] if set to `true`.
    /// - Return [`ConfigError::Exclude`] if a rule is not a valid glob.
    pub fn to_exclude_set(&self) -> Result<ExcludeSet> {
        match self {
            Self::Flag(false) => Ok(ExcludeSet::none()),
            Self::Flag(true) => Err(ConfigError::ExcludeFlag),
            Self::Single(rule) => Ok(ExcludeSet::new([rule])?),
            Self::List(rules) => Ok(ExcludeSet::new(rules)?),
        }
    }
}

impl Default for ExcludeSpec {
    fn default() -> Self {
        Self::Flag(false)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Location does not define a `dir` setting.
    #[error("location does not define \"dir\" setting")]
    MissingDir,

    /// Current working directory cannot be determined.
    #[error("cannot determine current working directory")]
    WorkingDirectory(#[source] std::io::Error),

    /// Exclusion setting is `true`, which means nothing.
    #[error("exclusion setting must be false, a rule, or a list of rules")]
    ExcludeFlag,

    /// Exclusion rule is invalid.
    #[error(transparent)]
    Exclude(#[from] ExcludeError),

    /// No profile exists under requested name.
    #[error("no profile named {0:?}")]
    UnknownProfile(String),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
