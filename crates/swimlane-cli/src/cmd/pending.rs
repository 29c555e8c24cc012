//! `swl pending` and `swl retry`: taxonomy edits waiting on migrations.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;

use crate::context::Board;
use crate::output::{CliError, OutputMode, Renderable, pretty_kv, render_list};
use swimlane_core::coordinator::{CommitReport, CoordinatorError, PendingCommit};
use swimlane_core::model::{ItemId, StageId, Status};

#[derive(Args, Debug)]
pub struct PendingArgs {}

#[derive(Args, Debug)]
pub struct RetryArgs {}

#[derive(Debug, Serialize)]
struct PendingRow {
    id: u64,
    base_version: u64,
    removes: Vec<(Status, StageId)>,
    edits: usize,
    outstanding: Vec<ItemId>,
    queued_at: i64,
    attempts: u32,
}

impl From<&PendingCommit> for PendingRow {
    fn from(commit: &PendingCommit) -> Self {
        Self {
            id: commit.id,
            base_version: commit.base_version,
            removes: commit
                .removed_stages()
                .map(|(status, stage)| (status, stage.clone()))
                .collect(),
            edits: commit.edits.len(),
            outstanding: commit.outstanding.iter().cloned().collect(),
            queued_at: commit.queued_at,
            attempts: commit.attempts,
        }
    }
}

impl PendingRow {
    fn removes_label(&self) -> String {
        self.removes
            .iter()
            .map(|(status, stage)| format!("{status}/{stage}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Renderable for PendingRow {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "Pending #{}", self.id)?;
        pretty_kv(w, "removes", self.removes_label())?;
        pretty_kv(w, "edits", self.edits.to_string())?;
        pretty_kv(w, "base", format!("v{}", self.base_version))?;
        pretty_kv(w, "attempts", self.attempts.to_string())?;
        let waiting: Vec<&str> = self.outstanding.iter().map(ItemId::as_str).collect();
        pretty_kv(w, "waiting on", waiting.join(", "))?;
        writeln!(w)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}  {}  {}  {}",
            self.id,
            self.removes_label(),
            self.outstanding.len(),
            self.attempts
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["id", "removes", "outstanding", "attempts"]
    }
}

pub fn run_pending(_args: &PendingArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let board = Board::open(project_root)?;
    let rows: Vec<PendingRow> = board
        .coordinator
        .pending_commits()
        .iter()
        .map(PendingRow::from)
        .collect();
    if rows.is_empty() && !output.is_json() {
        println!("No pending commits.");
        return Ok(());
    }
    render_list(&rows, output)
}

#[derive(Debug, Serialize)]
struct RetryResult {
    #[serde(flatten)]
    report: Option<CommitReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<CliError>,
}

impl Renderable for RetryResult {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        match (&self.report, &self.error) {
            (Some(report), _) if report.committed => writeln!(
                w,
                "✓ Pending #{} committed as v{}",
                report.pending_id.unwrap_or_default(),
                report.version.unwrap_or_default()
            ),
            (Some(report), _) if report.discarded => writeln!(
                w,
                "Pending #{} no longer applies and was dropped",
                report.pending_id.unwrap_or_default()
            ),
            (Some(report), _) => writeln!(
                w,
                "! Pending #{} still waiting on {} item(s)",
                report.pending_id.unwrap_or_default(),
                report.outstanding.len()
            ),
            (None, Some(error)) => writeln!(w, "✗ {}", error.message),
            (None, None) => Ok(()),
        }
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        match (&self.report, &self.error) {
            (Some(report), _) => {
                let state = if report.committed {
                    "committed"
                } else if report.discarded {
                    "discarded"
                } else {
                    "pending"
                };
                writeln!(
                    w,
                    "{}  {state}  {}",
                    report.pending_id.unwrap_or_default(),
                    report.outstanding.len()
                )
            }
            (None, Some(error)) => writeln!(w, "-  error  {}", error.message),
            (None, None) => Ok(()),
        }
    }

    fn table_headers() -> &'static [&'static str] {
        &["id", "state", "outstanding"]
    }
}

pub fn run_retry(_args: &RetryArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let board = Board::open(project_root)?;
    if board.coordinator.pending_commits().is_empty() {
        if !output.is_json() {
            println!("No pending commits.");
            return Ok(());
        }
        return render_list::<RetryResult>(&[], output);
    }

    let total = board.coordinator.pending_commits().len();
    let (results, first_failure) = collect_retries(board.coordinator.retry_pending());
    board.save_pending()?;

    render_list(&results, output)?;
    match first_failure {
        Some(err) => {
            let failed = results.iter().filter(|r| r.error.is_some()).count();
            Err(err.context(format!(
                "{failed} of {total} pending commit(s) could not be retried"
            )))
        }
        None => Ok(()),
    }
}

/// Turn retry outcomes into rows, keeping the first failure to report.
fn collect_retries(
    outcomes: Vec<Result<CommitReport, CoordinatorError>>,
) -> (Vec<RetryResult>, Option<anyhow::Error>) {
    let mut first_failure = None;
    let rows = outcomes
        .into_iter()
        .map(|outcome| match outcome {
            Ok(report) => RetryResult {
                report: Some(report),
                error: None,
            },
            Err(err) => {
                let err = anyhow::Error::from(err);
                let row = RetryResult {
                    report: None,
                    error: Some(CliError::from(&err)),
                };
                if first_failure.is_none() {
                    first_failure = Some(err);
                }
                row
            }
        })
        .collect();
    (rows, first_failure)
}
