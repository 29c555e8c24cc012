pub mod board;
pub mod completions;
pub mod group;
pub mod init;
pub mod item;
pub mod pending;
pub mod stage;

use anyhow::{Result, bail};
use std::io::{self, Write};
use std::path::Path;

use crate::context::Board;
use crate::output::{OutputMode, pretty_kv, render_mode};
use swimlane_core::coordinator::{Command, CommitReport, Outcome};

/// Run one taxonomy command, persist the pending queue and report.
pub(crate) fn run_taxonomy_command(
    command: Command,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let board = Board::open(project_root)?;
    let outcome = board.coordinator.execute(command);
    board.save_pending()?;
    let Outcome::Taxonomy(report) = outcome? else {
        bail!("expected a taxonomy commit report");
    };
    render_commit(output, &report)
}

pub(crate) fn render_commit(output: OutputMode, report: &CommitReport) -> Result<()> {
    render_mode(output, report, commit_text, commit_pretty)
}

fn commit_text(report: &CommitReport, w: &mut dyn Write) -> io::Result<()> {
    if report.committed {
        write!(w, "committed v{}", report.version.unwrap_or_default())?;
    } else if report.discarded {
        write!(w, "discarded pending #{}", report.pending_id.unwrap_or_default())?;
    } else if let Some(id) = report.pending_id {
        write!(w, "pending #{id}")?;
    } else {
        write!(w, "unchanged")?;
    }
    if let Some(stage) = &report.added_stage {
        write!(w, " stage={stage}")?;
    }
    if !report.migrated.is_empty() {
        write!(w, " migrated={}", report.migrated.len())?;
    }
    if !report.outstanding.is_empty() {
        write!(w, " outstanding={}", report.outstanding.len())?;
    }
    writeln!(w)
}

fn commit_pretty(report: &CommitReport, w: &mut dyn Write) -> io::Result<()> {
    if report.committed {
        writeln!(
            w,
            "✓ Committed taxonomy v{}",
            report.version.unwrap_or_default()
        )?;
    } else if report.discarded {
        writeln!(w, "Pending commit no longer applies and was dropped.")?;
    } else if report.pending_id.is_some() {
        writeln!(
            w,
            "! Some items could not be migrated; the edit is pending. Run `swl retry` later."
        )?;
    } else {
        writeln!(w, "Nothing to change.")?;
    }
    if let Some(stage) = &report.added_stage {
        pretty_kv(w, "new stage", stage.as_str())?;
    }
    if let Some(id) = report.pending_id {
        pretty_kv(w, "pending", format!("#{id}"))?;
    }
    for plan in &report.plans {
        let target = plan
            .new_subcategory_id
            .as_ref()
            .map_or("(none)", |id| id.as_str());
        pretty_kv(
            w,
            "migration",
            format!(
                "{} item(s) {} -> {target}",
                plan.affected_item_ids.len(),
                plan.removed_stage_id
            ),
        )?;
    }
    for item in &report.outstanding {
        pretty_kv(w, "outstanding", item.as_str())?;
    }
    Ok(())
}
