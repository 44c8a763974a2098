// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with, or managed in some way.

use std::path::PathBuf;

/// Determine default absolute path to profile file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/treesync/profiles.toml` as
/// the default absolute path for the profile file. Does not check if the path
/// returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if configuration directory cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_profile_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("treesync").join("profiles.toml"))
        .ok_or(NoWayHome)
}

/// No way to determine user's configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use sealed_test::prelude::*;

    #[cfg(target_os = "linux")]
    #[sealed_test(env = [("XDG_CONFIG_HOME", "/home/blah/.config")])]
    fn default_profile_path_follows_xdg() -> anyhow::Result<()> {
        let result = default_profile_path()?;
        assert_eq!(
            result,
            PathBuf::from("/home/blah/.config/treesync/profiles.toml")
        );

        Ok(())
    }
}
