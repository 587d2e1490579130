// SPDX-FileCopyrightText: 2026 Dotup Contributors
// SPDX-License-Identifier: MIT

use dotup::{
    config::Profile,
    path::default_dotfiles_root,
    report,
    runner::{RunOptions, RunResult, Runner, SkipReason},
    store::Root,
};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;
use std::{path::PathBuf, process::exit, time::Duration};
use tokio::sync::watch;
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  dotup run [options] [root]\n  dotup list [options] [root]",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<u8> {
        match self.command {
            Command::Run(opts) => run_setup(opts).await,
            Command::List(opts) => run_list(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Execute the setup script of each discovered application directory.
    #[command(override_usage = "dotup run [options] [root]")]
    Run(SetupOptions),

    /// Show discovered application directories and their convention markers.
    #[command(override_usage = "dotup list [options] [root]")]
    List(ListOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SetupOptions {
    /// Dotfiles root to discover application directories under.
    #[arg(value_name = "root")]
    pub root: Option<PathBuf>,

    /// Validate and report without executing anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Maximum seconds one setup script may run before forced termination.
    #[arg(short, long, value_name = "seconds")]
    pub timeout: Option<u64>,

    /// Number of setup scripts allowed to run concurrently.
    ///
    /// Parallel runs give no ordering guarantee between scripts' side
    /// effects; keep the default when applications depend on one another.
    #[arg(short = 'j', long, value_name = "jobs", default_value_t = 1)]
    pub parallel: usize,

    /// Only run the named application directories.
    #[arg(short, long, value_name = "names", value_delimiter = ',')]
    pub only: Vec<String>,

    /// Additional environment variable to inject, as KEY=VALUE.
    #[arg(short, long, value_name = "key=value", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Machine profile that selects application directories.
    #[arg(short, long, value_name = "file")]
    pub profile: Option<PathBuf>,

    /// Confirm each entry interactively before running it.
    #[arg(short, long)]
    pub ask: bool,

    /// Emit line-delimited records instead of human output.
    #[arg(long)]
    pub porcelain: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ListOptions {
    /// Dotfiles root to discover application directories under.
    #[arg(value_name = "root")]
    pub root: Option<PathBuf>,

    /// Emit line-delimited records instead of human output.
    #[arg(long)]
    pub porcelain: bool,
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.into(), value.into())),
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    match run().await {
        Ok(code) => exit(code.into()),
        Err(error) => {
            error!("{error:?}");
            exit(2);
        }
    }
}

async fn run() -> Result<u8> {
    Cli::parse().run().await
}

async fn run_setup(opts: SetupOptions) -> Result<u8> {
    let profile = opts.profile.map(Profile::load).transpose()?;
    if let Some(profile) = &profile {
        let os = std::env::consts::OS;
        if !profile.supports_os(os) {
            bail!("profile does not apply to operating system {os:?}");
        }
    }

    let profile_root = profile.as_ref().and_then(|profile| profile.root.clone());
    let root_path = match opts.root.or(profile_root) {
        Some(path) => path,
        None => default_dotfiles_root()?,
    };
    let root = Root::open(root_path)?;
    let mut entries = root.discover()?;

    if let Some(profile) = &profile {
        entries.retain(|entry| profile.selects(&entry.name));
    }
    if !opts.only.is_empty() {
        entries.retain(|entry| opts.only.iter().any(|name| name == &entry.name));
    }

    let mut declined = Vec::new();
    if opts.ask && !opts.dry_run {
        let mut confirmed = Vec::new();
        for entry in entries {
            if !entry.has_setup {
                confirmed.push(entry);
                continue;
            }

            let answer = Confirm::new(&format!("run setup script of {}?", entry.name))
                .with_default(true)
                .prompt()?;
            if answer {
                confirmed.push(entry);
            } else {
                declined.push(RunResult::skipped(entry, SkipReason::Declined));
            }
        }
        entries = confirmed;
    }

    let run_opts = RunOptions {
        dry_run: opts.dry_run,
        env: opts.env,
        timeout: opts.timeout.map(Duration::from_secs),
        jobs: opts.parallel,
    };

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            let _ = cancel_tx.send(true);
        }
    });

    let bar = if opts.porcelain {
        ProgressBar::hidden()
    } else {
        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<20}  [{wide_bar:.yellow/blue}] {pos}/{len}",
        )?
        .progress_chars("-Cco.");
        let bar = ProgressBar::new(entries.len() as u64);
        bar.set_style(style);
        bar
    };

    let runner = Runner::new();
    let (mut results, fatal) = match runner.run_all(&entries, &run_opts, cancel_rx, &bar).await {
        Ok(results) => (results, None),
        Err(aborted) => (aborted.completed, Some(aborted.source)),
    };
    bar.finish_and_clear();

    // INVARIANT: Discovery order is lexicographic by name, so merging the
    // declined entries back reduces to one sort by name.
    results.extend(declined);
    results.sort_by(|a, b| a.entry.name.cmp(&b.entry.name));

    if opts.porcelain {
        print!("{}", report::render_results_porcelain(&results));
    } else {
        print!("{}", report::render_results_human(&results));
    }

    // INVARIANT: Summary above is printed even when the run aborted early.
    if let Some(fatal) = fatal {
        return Err(fatal.into());
    }

    Ok(report::run_exit_code(&results))
}

fn run_list(opts: ListOptions) -> Result<u8> {
    let root_path = match opts.root {
        Some(path) => path,
        None => default_dotfiles_root()?,
    };
    let entries = Root::open(root_path)?.discover()?;

    if opts.porcelain {
        print!("{}", report::render_entries_porcelain(&entries));
    } else {
        print!("{}", report::render_entries_human(&entries));
    }

    Ok(0)
}
