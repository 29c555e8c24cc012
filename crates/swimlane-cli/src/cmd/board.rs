//! `swl board`: render the projected board.

use anyhow::Result;
use clap::Args;
use std::io::{self, Write};
use std::path::Path;

use crate::context::Board;
use crate::output::{OutputMode, pretty_section, render_mode};
use swimlane_core::board::{BoardProjection, Column};
use swimlane_core::coordinator::parse_status;
use swimlane_core::model::WorkItem;

#[derive(Args, Debug)]
pub struct BoardArgs {
    /// Show only this status column (e.g. IN_PROGRESS).
    #[arg(long)]
    pub status: Option<String>,
}

pub fn run_board(args: &BoardArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let board = Board::open(project_root)?;
    let mut projection = board.coordinator.board();
    if let Some(raw) = &args.status {
        let status = parse_status(raw)?;
        projection.columns.retain(|column| column.status == status);
    }
    render_mode(output, &projection, render_text, render_pretty)
}

fn item_ids(items: &[WorkItem]) -> String {
    items
        .iter()
        .map(|item| item.id.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

fn render_text(board: &BoardProjection, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "status  stage  order  count  items")?;
    for column in &board.columns {
        for bucket in &column.phases {
            let stage = if bucket.pending_removal {
                format!("{}*", bucket.stage_id)
            } else {
                bucket.stage_id.to_string()
            };
            writeln!(
                w,
                "{}  {}  {}  {}  {}",
                column.status,
                stage,
                bucket.order,
                bucket.items.len(),
                item_ids(&bucket.items)
            )?;
        }
        if !column.unassigned.is_empty() {
            writeln!(
                w,
                "{}  -  -  {}  {}",
                column.status,
                column.unassigned.len(),
                item_ids(&column.unassigned)
            )?;
        }
    }
    Ok(())
}

fn render_column(column: &Column, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(
        w,
        &format!("{} ({}) · {} item(s)", column.title, column.status, column.total),
    )?;
    for bucket in &column.phases {
        let flag = if bucket.pending_removal {
            "  [removal pending]"
        } else {
            ""
        };
        writeln!(
            w,
            "  {}. {} <{}>{flag}",
            bucket.order, bucket.title, bucket.stage_id
        )?;
        for item in &bucket.items {
            writeln!(w, "       - {}", item.id)?;
        }
    }
    if !column.unassigned.is_empty() {
        writeln!(w, "  (no phase)")?;
        for item in &column.unassigned {
            writeln!(w, "       - {}", item.id)?;
        }
    }
    writeln!(w)
}

fn render_pretty(board: &BoardProjection, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "Board (taxonomy v{})", board.version)?;
    writeln!(w)?;
    for column in &board.columns {
        render_column(column, w)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use swimlane_core::project;
    use swimlane_core::model::Status;
    use swimlane_core::taxonomy::seed::default_seed;

    fn rendered(f: fn(&BoardProjection, &mut dyn Write) -> io::Result<()>) -> String {
        let board = project(
            &default_seed(),
            &[
                WorkItem::new("a", Status::Draft, Some("draft-1".into())),
                WorkItem::new("b", Status::Draft, None),
            ],
        );
        let mut buf = Vec::new();
        f(&board, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn text_has_one_row_per_stage_plus_unassigned() {
        let out = rendered(render_text);
        assert!(out.lines().any(|line| line == "DRAFT  draft-1  1  1  a"));
        assert!(out.lines().any(|line| line == "DRAFT  -  -  1  b"));
    }

    #[test]
    fn pretty_lists_items_under_their_stage() {
        let out = rendered(render_pretty);
        assert!(out.contains("Board (taxonomy v0)"));
        assert!(out.contains("       - a"));
        assert!(out.contains("(no phase)"));
    }
}
