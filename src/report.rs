// SPDX-FileCopyrightText: 2026 Dotup Contributors
// SPDX-License-Identifier: MIT

//! Run reporting.
//!
//! Renders discovery listings and run outcomes for two consumers: humans
//! reading a terminal, and scripts reading line-delimited records
//! (porcelain mode). Rendering is pure string production; printing is left
//! to the caller, so the final summary can always be emitted even after an
//! aborted run.

use crate::{
    runner::{RunResult, RunStatus},
    store::AppEntry,
};

use std::fmt::Write;

/// Render run results as a human-readable summary.
///
/// Lists every entry with its final status in discovery order, followed by
/// aggregate counts and the captured detail of each failure.
pub fn render_results_human(results: &[RunResult]) -> String {
    let width = name_width(results.iter().map(|result| &result.entry));
    let mut out = String::new();

    for result in results {
        let _ = writeln!(
            out,
            "  {:width$}  {}",
            result.entry.name,
            result.status,
            width = width
        );
    }

    let succeeded = results
        .iter()
        .filter(|result| matches!(result.status, RunStatus::Succeeded { .. }))
        .count();
    let failed = results
        .iter()
        .filter(|result| result.status.is_failed())
        .count();
    let skipped = results
        .iter()
        .filter(|result| matches!(result.status, RunStatus::Skipped { .. }))
        .count();
    let _ = writeln!(
        out,
        "\n{succeeded} succeeded, {failed} failed, {skipped} skipped"
    );

    let failures: Vec<&RunResult> = results
        .iter()
        .filter(|result| result.status.is_failed())
        .collect();
    if !failures.is_empty() {
        let _ = writeln!(out, "\nfailures:");
        for result in failures {
            if let RunStatus::Failed { detail, .. } = &result.status {
                let _ = writeln!(out, "  {}: {}", result.entry.name, detail.replace('\n', " | "));
            }
        }
    }

    out
}

/// Render run results as line-delimited records.
///
/// One record per entry, tab-separated:
/// `name<TAB>status<TAB>exit_code<TAB>detail`. The exit code field holds
/// `-` when no exit status exists (skips, timeout and cancellation kills).
/// Newlines inside the detail field are flattened.
pub fn render_results_porcelain(results: &[RunResult]) -> String {
    let mut out = String::new();
    for result in results {
        let (status, exit_code, detail) = match &result.status {
            RunStatus::Skipped { reason } => ("skipped", None, reason.to_string()),
            RunStatus::Succeeded { exit_code } => ("ok", Some(*exit_code), String::new()),
            RunStatus::Failed { exit_code, detail } => {
                ("failed", *exit_code, flatten_detail(detail))
            }
        };
        let exit_code = exit_code.map_or("-".to_string(), |code| code.to_string());
        let _ = writeln!(
            out,
            "{}\t{status}\t{exit_code}\t{detail}",
            result.entry.name
        );
    }

    out
}

/// Render discovered entries as a human-readable listing.
///
/// Shows each entry's convention markers without executing anything.
pub fn render_entries_human(entries: &[AppEntry]) -> String {
    let width = name_width(entries.iter());
    let mut out = String::new();

    for entry in entries {
        let mut markers = Vec::new();
        if entry.has_dots {
            markers.push("dots/");
        }
        if entry.has_install {
            markers.push("install.sh");
        }
        if entry.has_setup {
            markers.push("setup.sh");
        }
        let markers = if markers.is_empty() {
            "(empty)".to_string()
        } else {
            markers.join(" ")
        };

        let _ = writeln!(out, "  {:width$}  {markers}", entry.name, width = width);
    }

    out
}

/// Render discovered entries as line-delimited records.
///
/// One record per entry, tab-separated:
/// `name<TAB>dots<TAB>install<TAB>setup`, with `yes`/`no` marker fields.
pub fn render_entries_porcelain(entries: &[AppEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(
            out,
            "{}\t{}\t{}\t{}",
            entry.name,
            yes_no(entry.has_dots),
            yes_no(entry.has_install),
            yes_no(entry.has_setup),
        );
    }

    out
}

/// Process exit code communicated to scripting callers.
///
/// Zero when every entry succeeded or was skipped; one when any entry
/// failed. Fatal aborts map to two at the binary seam.
pub fn run_exit_code(results: &[RunResult]) -> u8 {
    if results.iter().any(|result| result.status.is_failed()) {
        1
    } else {
        0
    }
}

/// Flatten captured detail into one record field.
///
/// Newlines and tabs both carry structure in porcelain output, so neither
/// may survive inside a field.
fn flatten_detail(detail: &str) -> String {
    detail.replace('\n', " | ").replace('\t', " ")
}

fn name_width<'a>(entries: impl Iterator<Item = &'a AppEntry>) -> usize {
    entries.map(|entry| entry.name.len()).max().unwrap_or(0)
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}
