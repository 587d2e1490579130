// SPDX-FileCopyrightText: 2026 Dotup Contributors
// SPDX-License-Identifier: MIT

//! Setup orchestration.
//!
//! The runner turns an ordered list of discovered [`AppEntry`] values into
//! an ordered list of [`RunResult`] values by driving each runnable entry's
//! `setup.sh` to completion, one outcome per entry.
//!
//! # Failure Isolation
//!
//! One entry's failure never halts the rest of the run. A nonzero exit,
//! a timeout, or a cancellation kill all settle into a `Failed` status on
//! that entry's own result, and the run proceeds to the next entry. Only
//! unexpected I/O failures abort the run early, and even then the results
//! collected so far are handed back for reporting.
//!
//! # Ordering
//!
//! Results always come back in discovery order. The default execution mode
//! is strictly sequential, because setup scripts may carry ordering
//! dependencies implied by naming, and because interleaved output from
//! concurrent scripts is unreadable. Bounded parallelism is opt-in through
//! [`RunOptions::jobs`]; it still reports results in discovery order, but
//! gives no ordering guarantee between concurrently executing scripts'
//! side effects, so it is unsafe for entries with cross-application
//! dependencies.

pub mod exec;

use crate::{
    runner::exec::{ExecError, ExecOutcome, Execution, SetupExecutor},
    store::AppEntry,
};

use futures::{stream, StreamExt};
use indicatif::ProgressBar;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    time::{Duration, Instant},
};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Recognized options for a setup run.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    /// Validate and report without executing anything.
    pub dry_run: bool,

    /// Additional environment variables injected into every setup script.
    pub env: Vec<(String, String)>,

    /// Maximum duration one setup script may run before forced
    /// termination. Unlimited when absent.
    pub timeout: Option<Duration>,

    /// Number of entries allowed to run concurrently. Zero and one both
    /// mean sequential.
    pub jobs: usize,
}

/// Outcome of attempting one entry's setup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunResult {
    /// The entry this result corresponds to.
    pub entry: AppEntry,

    /// Final status of the attempt.
    pub status: RunStatus,

    /// Wall time spent on the attempt. Zero for skips.
    pub duration: Duration,
}

impl RunResult {
    /// Construct a result for an entry that was never executed.
    pub fn skipped(entry: AppEntry, reason: SkipReason) -> Self {
        Self {
            entry,
            status: RunStatus::Skipped { reason },
            duration: Duration::ZERO,
        }
    }
}

/// Final status of one entry's setup attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunStatus {
    /// Entry was never executed.
    Skipped { reason: SkipReason },

    /// Setup script terminated with exit status zero.
    Succeeded { exit_code: i32 },

    /// Setup script exited nonzero, timed out, or was cancelled.
    Failed {
        /// Present for nonzero exits; absent when the process was killed
        /// by timeout or cancellation.
        exit_code: Option<i32>,

        /// Captured output tail, or a timeout/cancellation note.
        detail: String,
    },
}

impl RunStatus {
    /// Check if status counts against the run's exit code.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl Display for RunStatus {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Skipped { reason } => write!(fmt, "skipped ({reason})"),
            Self::Succeeded { .. } => write!(fmt, "ok"),
            Self::Failed {
                exit_code: Some(code),
                ..
            } => write!(fmt, "failed (exit {code})"),
            Self::Failed { detail, .. } => write!(fmt, "failed ({detail})"),
        }
    }
}

/// Why an entry was never executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Entry carries no `setup.sh`.
    NoSetupScript,

    /// Dry-run mode suppressed execution.
    DryRun,

    /// Run-level cancellation fired before the entry started.
    Cancelled,

    /// User declined the entry at the interactive confirmation prompt.
    Declined,
}

impl Display for SkipReason {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::NoSetupScript => write!(fmt, "no setup.sh"),
            Self::DryRun => write!(fmt, "dry-run"),
            Self::Cancelled => write!(fmt, "cancelled"),
            Self::Declined => write!(fmt, "declined"),
        }
    }
}

/// Orchestrates setup script runs over discovered entries.
///
/// Whether an entry runs at all is decided here: entries without a setup
/// script, dry runs, and entries reached after cancellation are skipped
/// without ever touching the executor. Everything that does run is
/// delegated to the [`Execution`] implementation.
#[derive(Clone, Debug, Default)]
pub struct Runner<E = SetupExecutor>
where
    E: Execution,
{
    executor: E,
}

impl Runner {
    /// Construct runner over the real setup script executor.
    pub fn new() -> Self {
        Self::with_executor(SetupExecutor)
    }
}

impl<E> Runner<E>
where
    E: Execution,
{
    /// Construct runner over target executor.
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }

    /// Attempt one entry's setup.
    ///
    /// Never errors for expected conditions; missing script, nonzero exit,
    /// timeout, and cancellation all settle into the returned
    /// [`RunResult`].
    ///
    /// # Errors
    ///
    /// - Return [`ExecError`] if the script cannot be spawned or waited
    ///   on.
    #[instrument(skip_all, fields(app = %entry.name), level = "debug")]
    pub async fn run_one(
        &self,
        entry: &AppEntry,
        opts: &RunOptions,
        cancel: watch::Receiver<bool>,
    ) -> Result<RunResult, ExecError> {
        if *cancel.borrow() {
            debug!("cancelled before start");
            return Ok(RunResult::skipped(entry.clone(), SkipReason::Cancelled));
        }
        if !entry.has_setup {
            debug!("no setup script");
            return Ok(RunResult::skipped(entry.clone(), SkipReason::NoSetupScript));
        }
        if opts.dry_run {
            info!("dry-run: would execute {:?}", entry.setup_script());
            return Ok(RunResult::skipped(entry.clone(), SkipReason::DryRun));
        }

        info!("run setup script of {}", entry.name);
        let start = Instant::now();
        let outcome = self.executor.run_setup(entry, opts, cancel).await?;
        let duration = start.elapsed();

        let status = match outcome {
            ExecOutcome::Exited { exit_code: 0, .. } => {
                info!("{} finished in {duration:.2?}", entry.name);
                RunStatus::Succeeded { exit_code: 0 }
            }
            ExecOutcome::Exited { exit_code, detail } => {
                warn!("{} exited with status {exit_code}", entry.name);
                RunStatus::Failed {
                    exit_code: Some(exit_code),
                    detail,
                }
            }
            ExecOutcome::TimedOut { limit } => {
                warn!("{} timed out after {limit:?}", entry.name);
                RunStatus::Failed {
                    exit_code: None,
                    detail: format!("timed out after {limit:?}"),
                }
            }
            ExecOutcome::Cancelled => {
                warn!("{} cancelled mid-run", entry.name);
                RunStatus::Failed {
                    exit_code: None,
                    detail: "cancelled".into(),
                }
            }
        };

        Ok(RunResult {
            entry: entry.clone(),
            status,
            duration,
        })
    }

    /// Attempt every entry's setup, in discovery order.
    ///
    /// Runs at most [`RunOptions::jobs`] entries concurrently; the default
    /// of one gives strictly sequential execution. Results are reported in
    /// input order either way. One entry's failure never halts subsequent
    /// entries, and failed entries are not retried.
    ///
    /// # Errors
    ///
    /// - Return [`Aborted`] if an entry hits an unexpected I/O failure.
    ///   The results collected before the abort ride along for reporting.
    #[instrument(skip_all, level = "debug")]
    pub async fn run_all(
        &self,
        entries: &[AppEntry],
        opts: &RunOptions,
        cancel: watch::Receiver<bool>,
        bar: &ProgressBar,
    ) -> Result<Vec<RunResult>, Aborted> {
        let width = opts.jobs.max(1);
        debug!("run {} entries with width {width}", entries.len());

        let mut attempts = stream::iter(entries.iter().map(|entry| {
            let cancel = cancel.clone();
            async move {
                bar.set_message(entry.name.clone());
                self.run_one(entry, opts, cancel).await
            }
        }))
        .buffered(width);

        let mut completed = Vec::with_capacity(entries.len());
        while let Some(attempt) = attempts.next().await {
            match attempt {
                Ok(result) => {
                    bar.inc(1);
                    completed.push(result);
                }
                Err(source) => {
                    drop(attempts);
                    return Err(Aborted { completed, source });
                }
            }
        }

        Ok(completed)
    }
}

/// Setup run aborted by an unexpected failure.
///
/// Carries the results collected before the abort so callers can still
/// report everything that completed.
#[derive(Debug, thiserror::Error)]
#[error("setup run aborted")]
pub struct Aborted {
    /// Results collected before the abort, in discovery order.
    pub completed: Vec<RunResult>,

    /// The failure that forced the abort.
    pub source: ExecError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{collections::HashMap, path::PathBuf, sync::Mutex};

    fn entry(name: &str) -> AppEntry {
        AppEntry {
            name: name.into(),
            path: PathBuf::from("/dotfiles").join(name),
            has_dots: true,
            has_install: false,
            has_setup: true,
        }
    }

    fn no_cancel() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    /// Executor that replays scripted exit codes and records every
    /// invocation, so skip logic can be checked for zero process spawns.
    #[derive(Default)]
    struct ScriptedExecutor {
        exit_codes: HashMap<String, i32>,
        invocations: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        fn with_exit_codes(codes: &[(&str, i32)]) -> Self {
            Self {
                exit_codes: codes
                    .iter()
                    .map(|(name, code)| (name.to_string(), *code))
                    .collect(),
                invocations: Mutex::new(Vec::new()),
            }
        }

        fn invocations(&self) -> Vec<String> {
            self.invocations.lock().unwrap().clone()
        }
    }

    impl Execution for ScriptedExecutor {
        async fn run_setup(
            &self,
            entry: &AppEntry,
            _opts: &RunOptions,
            _cancel: watch::Receiver<bool>,
        ) -> Result<ExecOutcome, ExecError> {
            self.invocations.lock().unwrap().push(entry.name.clone());
            let exit_code = self.exit_codes.get(&entry.name).copied().unwrap_or(0);
            let detail = if exit_code == 0 {
                String::new()
            } else {
                "boom".into()
            };

            Ok(ExecOutcome::Exited { exit_code, detail })
        }
    }

    /// Executor that parks until cancellation arrives.
    struct BlockUntilCancelled;

    impl Execution for BlockUntilCancelled {
        async fn run_setup(
            &self,
            _entry: &AppEntry,
            _opts: &RunOptions,
            mut cancel: watch::Receiver<bool>,
        ) -> Result<ExecOutcome, ExecError> {
            let _ = cancel.wait_for(|cancelled| *cancelled).await;
            Ok(ExecOutcome::Cancelled)
        }
    }

    /// Executor that sleeps a per-entry duration before succeeding.
    struct StaggeredExecutor {
        delays: HashMap<String, Duration>,
    }

    impl Execution for StaggeredExecutor {
        async fn run_setup(
            &self,
            entry: &AppEntry,
            _opts: &RunOptions,
            _cancel: watch::Receiver<bool>,
        ) -> Result<ExecOutcome, ExecError> {
            if let Some(delay) = self.delays.get(&entry.name) {
                tokio::time::sleep(*delay).await;
            }

            Ok(ExecOutcome::Exited {
                exit_code: 0,
                detail: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn missing_setup_script_skips_without_spawning() -> anyhow::Result<()> {
        let executor = ScriptedExecutor::default();
        let runner = Runner::with_executor(executor);
        let mut entry = entry("bash");
        entry.has_setup = false;

        let result = runner
            .run_one(&entry, &RunOptions::default(), no_cancel())
            .await?;
        assert_eq!(
            result.status,
            RunStatus::Skipped {
                reason: SkipReason::NoSetupScript,
            }
        );
        assert!(runner.executor.invocations().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn dry_run_skips_every_entry_without_spawning() -> anyhow::Result<()> {
        let runner = Runner::with_executor(ScriptedExecutor::default());
        let entries = vec![entry("bash"), entry("nvim"), entry("zsh")];
        let opts = RunOptions {
            dry_run: true,
            ..RunOptions::default()
        };

        let results = runner
            .run_all(&entries, &opts, no_cancel(), &ProgressBar::hidden())
            .await?;
        assert_eq!(results.len(), 3);
        for result in &results {
            assert_eq!(
                result.status,
                RunStatus::Skipped {
                    reason: SkipReason::DryRun,
                }
            );
        }
        assert!(runner.executor.invocations().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn one_failure_never_halts_later_entries() -> anyhow::Result<()> {
        let runner = Runner::with_executor(ScriptedExecutor::with_exit_codes(&[("alacritty", 1)]));
        let entries = vec![entry("alacritty"), entry("bash"), entry("zsh")];

        let results = runner
            .run_all(
                &entries,
                &RunOptions::default(),
                no_cancel(),
                &ProgressBar::hidden(),
            )
            .await?;

        let names: Vec<&str> = results
            .iter()
            .map(|result| result.entry.name.as_str())
            .collect();
        assert_eq!(names, vec!["alacritty", "bash", "zsh"]);
        assert_eq!(
            results[0].status,
            RunStatus::Failed {
                exit_code: Some(1),
                detail: "boom".into(),
            }
        );
        assert_eq!(results[1].status, RunStatus::Succeeded { exit_code: 0 });
        assert_eq!(results[2].status, RunStatus::Succeeded { exit_code: 0 });
        assert_eq!(
            runner.executor.invocations(),
            vec!["alacritty", "bash", "zsh"]
        );

        Ok(())
    }

    #[tokio::test]
    async fn cancellation_before_start_skips_everything() -> anyhow::Result<()> {
        let runner = Runner::with_executor(ScriptedExecutor::default());
        let entries = vec![entry("bash"), entry("zsh")];
        let (tx, rx) = watch::channel(true);

        let results = runner
            .run_all(&entries, &RunOptions::default(), rx, &ProgressBar::hidden())
            .await?;
        drop(tx);

        for result in &results {
            assert_eq!(
                result.status,
                RunStatus::Skipped {
                    reason: SkipReason::Cancelled,
                }
            );
        }
        assert!(runner.executor.invocations().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn cancellation_mid_run_fails_running_and_skips_rest() -> anyhow::Result<()> {
        let runner = Runner::with_executor(BlockUntilCancelled);
        let entries = vec![entry("alacritty"), entry("bash"), entry("zsh")];
        let (tx, rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });

        let results = runner
            .run_all(&entries, &RunOptions::default(), rx, &ProgressBar::hidden())
            .await?;

        assert_eq!(
            results[0].status,
            RunStatus::Failed {
                exit_code: None,
                detail: "cancelled".into(),
            }
        );
        assert_eq!(
            results[1].status,
            RunStatus::Skipped {
                reason: SkipReason::Cancelled,
            }
        );
        assert_eq!(
            results[2].status,
            RunStatus::Skipped {
                reason: SkipReason::Cancelled,
            }
        );

        Ok(())
    }

    #[tokio::test]
    async fn parallel_results_keep_discovery_order() -> anyhow::Result<()> {
        let delays = [
            ("alacritty", Duration::from_millis(150)),
            ("bash", Duration::from_millis(50)),
            ("zsh", Duration::from_millis(5)),
        ]
        .into_iter()
        .map(|(name, delay)| (name.to_string(), delay))
        .collect();
        let runner = Runner::with_executor(StaggeredExecutor { delays });
        let entries = vec![entry("alacritty"), entry("bash"), entry("zsh")];
        let opts = RunOptions {
            jobs: 3,
            ..RunOptions::default()
        };

        let results = runner
            .run_all(&entries, &opts, no_cancel(), &ProgressBar::hidden())
            .await?;
        let names: Vec<&str> = results
            .iter()
            .map(|result| result.entry.name.as_str())
            .collect();
        assert_eq!(names, vec!["alacritty", "bash", "zsh"]);

        Ok(())
    }
}
