// SPDX-FileCopyrightText: 2026 Dotup Contributors
// SPDX-License-Identifier: MIT

//! Dotfiles root discovery.
//!
//! Dotup groups application directories together into one place called the
//! __dotfiles root__. The dotfiles root houses all application directories
//! that the user wants orchestrated on a target machine.
//!
//! # Dotfiles Root Layout
//!
//! The dotfiles root can generally be placed anywhere on the user's file
//! system. However, the default location is `$HOME/dotfiles`. Each immediate
//! subdirectory of the root is treated as one application directory whose
//! name is the name of the directory itself. So `$HOME/dotfiles/nvim` means
//! that the root contains an application named "nvim".
//!
//! Dotup only evaluates the top-level of the dotfiles root. It is not
//! possible to nest application directories inside one another.
//!
//! # Convention Markers
//!
//! An application directory signals its role through the presence of
//! specific file names rather than through any manifest:
//!
//! - `dots/` houses the dotfile configurations themselves.
//! - `install.sh` installs the application. Dotup never invokes it; its
//!   presence is reported for the user's benefit only.
//! - `setup.sh` materializes the contents of `dots/` into their runtime
//!   locations. This is the sole entry point dotup executes.
//!
//! Discovery centralizes all of these existence probes into one
//! [`AppEntry`] value per directory, so execution logic never touches the
//! file system to answer "does this application have a setup script?".

use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// A validated dotfiles root.
///
/// Constructed through [`Root::open`], which guarantees that the wrapped
/// path exists and is a directory. Discovery itself is side-effect free, so
/// callers may re-run it at will.
#[derive(Clone, Debug)]
pub struct Root {
    path: PathBuf,
}

impl Root {
    /// Open dotfiles root at target path.
    ///
    /// The path is resolved to its canonical absolute form, so every
    /// discovered entry carries an absolute location no matter how the
    /// root was spelled.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::InvalidRoot`] if target path does not exist,
    ///   cannot be resolved, or is not a directory.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        match fs::canonicalize(&path) {
            Ok(resolved) if resolved.is_dir() => Ok(Self { path: resolved }),
            _ => Err(StoreError::InvalidRoot { path }),
        }
    }

    /// Path to the dotfiles root itself.
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Discover application directories at the top-level of the root.
    ///
    /// Lists immediate subdirectories only. Non-directory children are
    /// ignored silently, as are children whose type cannot be determined
    /// and directories the current user cannot read. Each surviving
    /// directory is probed for its convention markers and recorded as one
    /// [`AppEntry`].
    ///
    /// Entries come back sorted lexicographically by name, ascending, so
    /// repeated invocations over an unmodified root produce identical
    /// sequences.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Io`] if the root directory listing fails
    ///   mid-scan.
    #[instrument(skip(self), level = "debug")]
    pub fn discover(&self) -> Result<Vec<AppEntry>> {
        let listing = fs::read_dir(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        let mut entries = Vec::new();
        for child in listing {
            let child = child.map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })?;

            let file_type = match child.file_type() {
                Ok(file_type) => file_type,
                Err(error) => {
                    warn!("cannot determine type of {:?}: {error}", child.path());
                    continue;
                }
            };
            if !file_type.is_dir() {
                debug!("ignore non-directory child {:?}", child.path());
                continue;
            }

            // INVARIANT: Only readable directories become entries.
            //   - An unreadable directory would answer every marker probe
            //     with false and masquerade as a skip.
            if let Err(error) = fs::read_dir(child.path()) {
                warn!("exclude unreadable directory {:?}: {error}", child.path());
                continue;
            }

            entries.push(AppEntry::probe(child.path()));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        debug!("discovered {} application directories", entries.len());
        Ok(entries)
    }
}

/// One discovered application directory.
///
/// Captures the directory's convention markers at discovery time. Immutable
/// after construction, and rebuilt from scratch on every discovery pass; no
/// state persists across invocations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppEntry {
    /// Application name, derived from the directory's base name.
    pub name: String,

    /// Absolute location of the application directory.
    pub path: PathBuf,

    /// True if a `dots/` subdirectory exists.
    pub has_dots: bool,

    /// True if `install.sh` exists. Informational only; never invoked.
    pub has_install: bool,

    /// True if `setup.sh` exists. An entry is runnable only when this is
    /// set; entries without a setup script are skipped, never errors.
    pub has_setup: bool,
}

impl AppEntry {
    fn probe(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            has_dots: path.join("dots").is_dir(),
            has_install: path.join("install.sh").is_file(),
            has_setup: path.join("setup.sh").is_file(),
            name,
            path,
        }
    }

    /// Absolute path to the entry's setup script.
    ///
    /// The script is not guaranteed to exist unless [`AppEntry::has_setup`]
    /// is set.
    pub fn setup_script(&self) -> PathBuf {
        self.path.join("setup.sh")
    }
}

/// All possible error types for dotfiles root interaction.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Root path missing, or not a directory.
    #[error("invalid dotfiles root {path:?}: not an existing directory")]
    InvalidRoot { path: PathBuf },

    /// Unexpected filesystem failure during discovery.
    #[error("cannot scan dotfiles root {path:?}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Friendly result alias :3
type Result<T, E = StoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;
    use std::fs::{create_dir, create_dir_all, write};

    fn scaffold_app(root: &Path, name: &str, markers: &[&str]) {
        let app = root.join(name);
        create_dir_all(&app).unwrap();
        for marker in markers {
            if let Some(dir) = marker.strip_suffix('/') {
                create_dir(app.join(dir)).unwrap();
            } else {
                write(app.join(marker), "#!/bin/sh\n").unwrap();
            }
        }
    }

    #[test]
    fn open_rejects_missing_root() {
        let temp = tempfile::tempdir().unwrap();
        let result = Root::open(temp.path().join("no-such-root"));
        assert!(matches!(result, Err(StoreError::InvalidRoot { .. })));
    }

    #[test]
    fn open_rejects_file_root() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("plain-file");
        write(&file, "not a directory").unwrap();
        let result = Root::open(&file);
        assert!(matches!(result, Err(StoreError::InvalidRoot { .. })));
    }

    #[test]
    fn discover_orders_lexicographically() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        for name in ["zsh", "bash", "nvim", "tmux"] {
            scaffold_app(temp.path(), name, &["setup.sh"]);
        }

        let entries = Root::open(temp.path())?.discover()?;
        let names: Vec<&str> = entries.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, vec!["bash", "nvim", "tmux", "zsh"]);

        Ok(())
    }

    #[test]
    fn discover_ignores_non_directories() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        scaffold_app(temp.path(), "vim", &["setup.sh"]);
        write(temp.path().join("README.md"), "# my dotfiles")?;
        write(temp.path().join("stray.sh"), "#!/bin/sh\n")?;

        let entries = Root::open(temp.path())?.discover()?;
        let names: Vec<&str> = entries.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, vec!["vim"]);

        Ok(())
    }

    #[test_case(&[], false, false, false; "bare directory")]
    #[test_case(&["dots/"], true, false, false; "dots only")]
    #[test_case(&["dots/", "install.sh"], true, true, false; "dots and install")]
    #[test_case(&["dots/", "install.sh", "setup.sh"], true, true, true; "full convention")]
    #[test_case(&["setup.sh"], false, false, true; "setup only")]
    #[test]
    fn discover_probes_convention_markers(
        markers: &[&str],
        has_dots: bool,
        has_install: bool,
        has_setup: bool,
    ) {
        use pretty_assertions::assert_eq;

        let temp = tempfile::tempdir().unwrap();
        scaffold_app(temp.path(), "app", markers);

        let entries = Root::open(temp.path()).unwrap().discover().unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.name, "app");
        assert_eq!(entry.has_dots, has_dots);
        assert_eq!(entry.has_install, has_install);
        assert_eq!(entry.has_setup, has_setup);
    }

    #[test]
    fn discover_is_deterministic() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        for name in ["starship", "bash", "zsh"] {
            scaffold_app(temp.path(), name, &["dots/", "setup.sh"]);
        }

        let root = Root::open(temp.path())?;
        let first = root.discover()?;
        let second = root.discover()?;
        assert_eq!(first, second);

        Ok(())
    }

    #[test]
    fn discover_excludes_unreadable_directories() -> anyhow::Result<()> {
        use std::fs::{metadata, set_permissions};
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir()?;
        scaffold_app(temp.path(), "bash", &["setup.sh"]);
        scaffold_app(temp.path(), "locked", &["setup.sh"]);
        let locked = temp.path().join("locked");
        let mut perms = metadata(&locked)?.permissions();
        perms.set_mode(0o000);
        set_permissions(&locked, perms.clone())?;

        // Privileged users bypass permission checks entirely, so the
        // exclusion cannot be observed; nothing to assert then.
        if std::fs::read_dir(&locked).is_ok() {
            perms.set_mode(0o755);
            set_permissions(&locked, perms)?;
            return Ok(());
        }

        let entries = Root::open(temp.path())?.discover()?;
        let names: Vec<&str> = entries.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, vec!["bash"]);

        // Restore so the temp dir can be cleaned up.
        perms.set_mode(0o755);
        set_permissions(&locked, perms)?;

        Ok(())
    }

    #[sealed_test]
    fn open_resolves_relative_roots() -> anyhow::Result<()> {
        create_dir("dotfiles")?;
        scaffold_app(Path::new("dotfiles"), "bash", &["dots/", "setup.sh"]);

        let root = Root::open("dotfiles")?;
        assert!(root.path().is_absolute());

        let entries = root.discover()?;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].path.is_absolute());
        assert!(entries[0].setup_script().is_absolute());

        Ok(())
    }

    #[test]
    fn probe_treats_setup_directory_as_missing_script() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let app = temp.path().join("weird");
        create_dir_all(app.join("setup.sh"))?;

        let entries = Root::open(temp.path())?.discover()?;
        assert!(!entries[0].has_setup);

        Ok(())
    }
}
