//! `swl item`: place, move and inspect work items.

use anyhow::{Context as _, Result, bail};
use clap::{Args, Subcommand};
use std::io::{self, Write};
use std::path::Path;

use crate::context::Board;
use crate::output::{OutputMode, pretty_kv, render, render_mode};
use swimlane_core::clock::{Clock, SystemClock};
use swimlane_core::coordinator::{MoveReport, Outcome, parse_status};
use swimlane_core::model::{ItemId, StageId, WorkItem};
use swimlane_core::{Command, SyncError};

#[derive(Args, Debug)]
pub struct ItemArgs {
    #[command(subcommand)]
    pub command: ItemCommand,
}

#[derive(Subcommand, Debug)]
pub enum ItemCommand {
    /// Put a new work item on the board.
    Add {
        /// Item id.
        id: String,
        /// Status literal (DRAFT, IN_PROGRESS, COMPLETED, CANCELLED).
        #[arg(long, default_value = "DRAFT")]
        status: String,
        /// Stage id within the status. Omit to leave the item without a phase.
        #[arg(long)]
        stage: Option<String>,
        /// Extra document field as key=value (value parsed as JSON when possible).
        #[arg(long = "field", value_name = "KEY=VALUE")]
        fields: Vec<String>,
    },
    /// Move an item to a status and optional stage.
    #[command(alias = "move")]
    Mv {
        id: String,
        status: String,
        #[arg(long)]
        stage: Option<String>,
        /// Validate and print the write without performing it.
        #[arg(long)]
        dry_run: bool,
    },
    /// Show one item document.
    Show { id: String },
}

pub fn run_item(args: ItemArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    match args.command {
        ItemCommand::Add {
            id,
            status,
            stage,
            fields,
        } => add(&id, &status, stage, &fields, output, project_root),
        ItemCommand::Mv {
            id,
            status,
            stage,
            dry_run,
        } => move_item(id, status, stage, dry_run, output, project_root),
        ItemCommand::Show { id } => show(&id, output, project_root),
    }
}

fn parse_field(raw: &str) -> Result<(String, serde_json::Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("invalid --field '{raw}': expected KEY=VALUE");
    };
    if key.is_empty() {
        bail!("invalid --field '{raw}': empty key");
    }
    if matches!(key, "id" | "status" | "subcategoryId" | "lastUpdated") {
        bail!("--field cannot set '{key}'; use the dedicated flag");
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn add(
    id: &str,
    status: &str,
    stage: Option<String>,
    fields: &[String],
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let board = Board::open(project_root)?;
    let status = parse_status(status)?;
    let stage = stage.map(StageId::new);
    if let Some(stage) = &stage {
        board
            .coordinator
            .store()
            .read(|taxonomy| taxonomy.require_stage(status, stage).map(drop))?;
    }

    let item_id = ItemId::new(id);
    match board.store.read_item(&item_id) {
        Ok(_) => bail!("item '{id}' already exists; use `swl item mv` to move it"),
        Err(SyncError::NotFound(_)) => {}
        Err(err) => return Err(err.into()),
    }

    let mut item = WorkItem::new(id, status, stage);
    item.last_updated = Some(SystemClock::new().now_ms());
    for raw in fields {
        let (key, value) = parse_field(raw)?;
        item.extra.insert(key, value);
    }
    board
        .store
        .put_item(&item)
        .with_context(|| format!("Failed to write item '{id}'"))?;
    tracing::info!(item = id, status = %item.status, "added item");

    render(output, &item, |item, w| {
        writeln!(w, "✓ Added {} to {}", item.id, placement(item))
    })
}

fn move_item(
    id: String,
    status: String,
    stage: Option<String>,
    dry_run: bool,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let board = Board::open(project_root)?;
    let report = if dry_run {
        board.coordinator.plan_move(&id, &status, stage.as_deref())?
    } else {
        let outcome = board.coordinator.execute(Command::Move {
            item_id: id,
            status,
            stage_id: stage,
        })?;
        let Outcome::Moved(report) = outcome else {
            bail!("expected a move report");
        };
        report
    };
    render_mode(output, &report, move_text, |report, w| {
        move_pretty(report, dry_run, w)
    })
}

fn move_text(report: &MoveReport, w: &mut dyn Write) -> io::Result<()> {
    if report.is_noop() {
        return writeln!(w, "unchanged");
    }
    for mutation in &report.mutations {
        let status = mutation
            .patch
            .status
            .map_or_else(String::new, |status| status.to_string());
        writeln!(w, "{}  {status}  {:?}", mutation.item_id, mutation.patch.subcategory)?;
    }
    Ok(())
}

fn move_pretty(report: &MoveReport, dry_run: bool, w: &mut dyn Write) -> io::Result<()> {
    if report.is_noop() {
        return writeln!(w, "Item is already there; nothing to write.");
    }
    let verb = if dry_run { "Would move" } else { "✓ Moved" };
    for mutation in &report.mutations {
        writeln!(w, "{verb} {}", mutation.item_id)?;
        if let Some(status) = mutation.patch.status {
            pretty_kv(w, "status", status.as_str())?;
        }
        pretty_kv(w, "phase", format!("{:?}", mutation.patch.subcategory))?;
    }
    Ok(())
}

fn placement(item: &WorkItem) -> String {
    match &item.subcategory_id {
        Some(stage) => format!("{} / {stage}", item.status),
        None => item.status.to_string(),
    }
}

fn show(id: &str, output: OutputMode, project_root: &Path) -> Result<()> {
    let board = Board::open(project_root)?;
    let item = board.store.read_item(&ItemId::new(id))?;
    let stage_title = item.subcategory_id.as_ref().and_then(|stage| {
        board.coordinator.store().read(|taxonomy| {
            taxonomy
                .find_stage(stage.as_str())
                .map(|(_, stage)| stage.title.clone())
        })
    });

    render(output, &item, |item, w| {
        pretty_kv(w, "id", item.id.as_str())?;
        pretty_kv(w, "status", item.status.as_str())?;
        match (&item.subcategory_id, &stage_title) {
            (Some(stage), Some(title)) => pretty_kv(w, "phase", format!("{title} <{stage}>"))?,
            (Some(stage), None) => pretty_kv(w, "phase", format!("<{stage}> (unknown stage)"))?,
            (None, _) => pretty_kv(w, "phase", "(none)")?,
        }
        if let Some(ts) = item.last_updated {
            pretty_kv(w, "updated", ts.to_string())?;
        }
        for (key, value) in &item.extra {
            pretty_kv(w, key, value.to_string())?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_values_parse_as_json_when_possible() {
        assert_eq!(parse_field("budget=12").unwrap().1, serde_json::json!(12));
        assert_eq!(
            parse_field("name=Barn roof").unwrap().1,
            serde_json::json!("Barn roof")
        );
    }

    #[test]
    fn reserved_fields_are_rejected() {
        assert!(parse_field("status=DRAFT").is_err());
        assert!(parse_field("noequals").is_err());
        assert!(parse_field("=x").is_err());
    }
}
