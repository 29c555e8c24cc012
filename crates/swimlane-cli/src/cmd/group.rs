//! `swl group`: column-level edits.

use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::Path;

use crate::output::OutputMode;
use swimlane_core::Command;

#[derive(Args, Debug)]
pub struct GroupArgs {
    #[command(subcommand)]
    pub command: GroupCommand,
}

#[derive(Subcommand, Debug)]
pub enum GroupCommand {
    /// Change a column's display title.
    Rename {
        /// Status literal (DRAFT, IN_PROGRESS, COMPLETED, CANCELLED).
        status: String,
        /// New title.
        title: String,
    },
}

pub fn run_group(args: GroupArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let command = match args.command {
        GroupCommand::Rename { status, title } => Command::RenameGroup { status, title },
    };
    super::run_taxonomy_command(command, output, project_root)
}
