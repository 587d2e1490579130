// SPDX-FileCopyrightText: 2026 Dotup Contributors
// SPDX-License-Identifier: MIT

//! Setup script execution.
//!
//! Spawns an application directory's `setup.sh` as a child process and
//! settles it into an [`ExecOutcome`]. The script is an opaque external
//! collaborator with an unconstrained side-effect contract; the only
//! promises kept here are: invoke it with its own directory as the working
//! directory, pass no arguments, inject caller environment additively,
//! capture its exit status and output, and guarantee termination on
//! timeout or cancellation.

use crate::{runner::RunOptions, store::AppEntry};

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{Child, Command},
    sync::watch,
    time::{error::Elapsed, timeout},
};
use tracing::{debug, warn};

/// Maximum bytes captured per output stream.
///
/// Output past this limit is dropped so a runaway script cannot exhaust
/// memory.
const MAX_OUTPUT_BYTES: u64 = 10 * 1024 * 1024;

/// Number of trailing output lines kept as failure detail.
const TAIL_LINES: usize = 20;

/// Layer of indirection for setup script execution.
///
/// The orchestrator decides _whether_ an entry runs; implementations of
/// this trait decide _how_. Swapping the implementation out lets tests
/// verify skip logic without ever spawning a process.
pub trait Execution: Send + Sync {
    /// Execute target entry's setup script to completion.
    ///
    /// Implementations must resolve every expected condition (exit status,
    /// timeout, cancellation) into an [`ExecOutcome`]; only unexpected I/O
    /// failures may error.
    fn run_setup(
        &self,
        entry: &AppEntry,
        opts: &RunOptions,
        cancel: watch::Receiver<bool>,
    ) -> impl std::future::Future<Output = Result<ExecOutcome>> + Send;
}

/// How one setup script invocation settled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Process terminated on its own.
    Exited {
        /// Exit status code. Termination by signal maps to -1.
        exit_code: i32,

        /// Trailing captured output, stderr preferred over stdout.
        detail: String,
    },

    /// Process exceeded its time limit and was forcibly terminated.
    TimedOut { limit: Duration },

    /// Run-level cancellation fired and the process was forcibly
    /// terminated.
    Cancelled,
}

/// Setup script execution through `tokio::process`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SetupExecutor;

impl Execution for SetupExecutor {
    /// Execute target entry's setup script to completion.
    ///
    /// The script runs with working directory set to the entry's own path,
    /// so relative references inside it, e.g., to its own `dots/`, resolve
    /// correctly. No arguments are passed. Environment variables from
    /// [`RunOptions::env`] are injected on top of the inherited
    /// environment.
    ///
    /// The child is terminated on timeout expiry or on cancellation, and
    /// `kill_on_drop` backs both paths, so no orphan process survives this
    /// call.
    ///
    /// # Errors
    ///
    /// - Return [`ExecError::Spawn`] if the script cannot be spawned.
    /// - Return [`ExecError::Wait`] if waiting on the child fails.
    async fn run_setup(
        &self,
        entry: &AppEntry,
        opts: &RunOptions,
        cancel: watch::Receiver<bool>,
    ) -> Result<ExecOutcome> {
        let script = entry.setup_script();
        debug!("spawn {:?} in {:?}", script, entry.path);

        let mut command = Command::new(&script);
        command
            .current_dir(&entry.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &opts.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|source| ExecError::Spawn {
            script: script.clone(),
            source,
        })?;

        let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

        let waited = tokio::select! {
            waited = wait_with_timeout(&mut child, opts.timeout) => Some(waited),
            _ = cancelled(cancel) => None,
        };

        match waited {
            Some(Ok(Ok(status))) => {
                let stdout = stdout_task.await.unwrap_or_default();
                let stderr = stderr_task.await.unwrap_or_default();
                Ok(ExecOutcome::Exited {
                    exit_code: status.code().unwrap_or(-1),
                    detail: output_tail(&stdout, &stderr),
                })
            }
            Some(Ok(Err(source))) => Err(ExecError::Wait { script, source }),
            Some(Err(_elapsed)) => {
                terminate(&mut child, &script).await;
                Ok(ExecOutcome::TimedOut {
                    limit: opts.timeout.unwrap_or_default(),
                })
            }
            None => {
                terminate(&mut child, &script).await;
                Ok(ExecOutcome::Cancelled)
            }
        }
    }
}

async fn wait_with_timeout(
    child: &mut Child,
    limit: Option<Duration>,
) -> Result<std::io::Result<std::process::ExitStatus>, Elapsed> {
    match limit {
        Some(limit) => timeout(limit, child.wait()).await,
        None => Ok(child.wait().await),
    }
}

/// Resolve once run-level cancellation fires.
///
/// A dropped sender means no cancellation can ever arrive, so that case
/// pends forever instead of resolving.
async fn cancelled(mut cancel: watch::Receiver<bool>) {
    if cancel.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn terminate(child: &mut Child, script: &Path) {
    if let Err(error) = child.kill().await {
        // INVARIANT: kill_on_drop still reaps the child if kill fails.
        warn!("cannot kill {:?}: {error}", script);
    }
}

/// Read an entire output stream into a byte buffer, capped at
/// [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buffer = Vec::new();
    if let Some(mut handle) = handle {
        let _ = (&mut handle)
            .take(MAX_OUTPUT_BYTES)
            .read_to_end(&mut buffer)
            .await;
    }
    buffer
}

/// Trailing lines of captured output, preferring stderr over stdout.
fn output_tail(stdout: &[u8], stderr: &[u8]) -> String {
    let source = if stderr.is_empty() { stdout } else { stderr };
    let text = String::from_utf8_lossy(source);
    let lines: Vec<&str> = text.trim_end().lines().collect();
    lines[lines.len().saturating_sub(TAIL_LINES)..].join("\n")
}

/// Unexpected setup script execution failures.
///
/// Expected conditions (nonzero exit, timeout, cancellation) never surface
/// here; they settle into [`ExecOutcome`] instead.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// Setup script cannot be spawned at all.
    #[error("cannot spawn setup script {script:?}")]
    Spawn {
        script: PathBuf,
        source: std::io::Error,
    },

    /// Waiting on the child process fails.
    #[error("cannot wait on setup script {script:?}")]
    Wait {
        script: PathBuf,
        source: std::io::Error,
    },
}

/// Friendly result alias :3
type Result<T, E = ExecError> = std::result::Result<T, E>;
