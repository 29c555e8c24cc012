//! `swl stage`: add, remove, reorder and edit phases of a column.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use std::path::Path;

use crate::output::OutputMode;
use swimlane_core::Command;

#[derive(Args, Debug)]
pub struct StageArgs {
    #[command(subcommand)]
    pub command: StageCommand,
}

#[derive(Subcommand, Debug)]
pub enum StageCommand {
    /// Append a stage to a column.
    Add {
        /// Status literal (DRAFT, IN_PROGRESS, COMPLETED, CANCELLED).
        status: String,
        /// Stage title.
        title: String,
    },
    /// Remove a stage, moving its items to the neighbouring stage.
    #[command(alias = "remove")]
    Rm {
        status: String,
        stage_id: String,
    },
    /// Reorder a column's stages. List every stage id once, in the new order.
    Reorder {
        status: String,
        #[arg(required = true, num_args = 1..)]
        stage_ids: Vec<String>,
    },
    /// Edit a stage's title.
    Edit {
        status: String,
        stage_id: String,
        /// New title.
        #[arg(long)]
        title: Option<String>,
    },
}

pub fn run_stage(args: StageArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let command = match args.command {
        StageCommand::Add { status, title } => Command::AddStage { status, title },
        StageCommand::Rm { status, stage_id } => Command::RemoveStage { status, stage_id },
        StageCommand::Reorder { status, stage_ids } => Command::Reorder { status, stage_ids },
        StageCommand::Edit {
            status,
            stage_id,
            title,
        } => {
            if title.is_none() {
                bail!("nothing to edit: pass --title");
            }
            Command::EditStage {
                status,
                stage_id,
                title,
            }
        }
    };
    super::run_taxonomy_command(command, output, project_root)
}
