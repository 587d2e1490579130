// SPDX-FileCopyrightText: 2026 Dotup Contributors
// SPDX-License-Identifier: MIT

//! Dotfiles orchestration.
//!
//! Dotup operates on a __dotfiles root__: a directory that contains one
//! subdirectory per application. Each application directory packages that
//! application's dotfile configurations under `dots/`, and provides a
//! `setup.sh` script that materializes those dotfiles into their runtime
//! locations, usually through symlinks. An application directory may also
//! carry a `README.md` and an `install.sh`, both of which are informational
//! as far as dotup is concerned.
//!
//! Dotup discovers application directories through [`store::Root`], then
//! drives each discovered entry's `setup.sh` through [`runner::Runner`],
//! producing one [`runner::RunResult`] per entry. Discovery is side-effect
//! free and deterministic. Execution isolates failures per entry, enforces
//! per-entry timeouts, and honors run-level cancellation.
//!
//! # See Also
//!
//! 1. [ArchWiki - dotfiles](https://wiki.archlinux.org/title/Dotfiles)

pub mod config;
pub mod path;
pub mod report;
pub mod runner;
pub mod store;

pub use config::Profile;
pub use runner::{RunOptions, RunResult, RunStatus, Runner, SkipReason};
pub use store::{AppEntry, Root};
