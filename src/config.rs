// SPDX-FileCopyrightText: 2026 Dotup Contributors
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for the optional machine profile that dotup uses to
//! simplify serialization and deserialization. File I/O is kept to
//! [`Profile::load`]; everything else works on strings.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Machine profile layout.
///
/// A profile names the subset of application directories that one target
/// machine should set up, so the same dotfiles root can serve several
/// machines without running every application's setup script on each of
/// them.
///
/// # General Layout
///
/// A profile is a flat TOML document:
///
/// ```toml
/// description = "Linux CLI"
/// operating_systems = ["linux"]
/// apps = ["bash", "nvim", "starship", "zsh"]
/// root = "~/dotfiles"
/// ```
///
/// The `operating_systems` list gates the whole profile: when the current
/// operating system is absent from it, the profile refuses to run anything.
/// The `root` field overrides the default dotfiles root, and undergoes
/// shell expansion on parse.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Brief description of what the profile targets.
    pub description: Option<String>,

    /// Operating systems this profile applies to, matched against
    /// [`std::env::consts::OS`] names. Empty or absent means any.
    pub operating_systems: Option<Vec<String>>,

    /// Names of application directories to set up, matched exactly against
    /// discovered entry names.
    pub apps: Vec<String>,

    /// Dotfiles root override. Shell-expanded on parse.
    pub root: Option<PathBuf>,
}

impl Profile {
    /// Load profile from target file.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if target file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if profile parsing fails.
    /// - Return [`ConfigError::ShellExpansion`] if shell expansion of the
    ///   root override fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = read_to_string(path.as_ref()).map_err(|source| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        data.parse()
    }

    /// Check if profile selects target application name.
    pub fn selects(&self, name: impl AsRef<str>) -> bool {
        self.apps.iter().any(|app| app == name.as_ref())
    }

    /// Check if profile applies to target operating system.
    ///
    /// Matching is case-insensitive against [`std::env::consts::OS`] style
    /// names, e.g., "linux", "macos", "windows".
    pub fn supports_os(&self, os: impl AsRef<str>) -> bool {
        match &self.operating_systems {
            Some(list) if !list.is_empty() => list
                .iter()
                .any(|entry| entry.eq_ignore_ascii_case(os.as_ref())),
            _ => true,
        }
    }
}

impl FromStr for Profile {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut profile: Profile = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on root override field.
        if let Some(root) = profile.root.take() {
            profile.root = Some(PathBuf::from(
                shellexpand::full(root.to_string_lossy().as_ref())
                    .map_err(ConfigError::ShellExpansion)?
                    .into_owned(),
            ));
        }

        Ok(profile)
    }
}

impl Display for Profile {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read profile file.
    #[error("cannot read profile {path:?}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
