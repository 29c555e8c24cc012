//! swimlane-core library.
//!
//! Stage taxonomy, migration resolver, board projector and transition
//! coordinator for a kanban board whose four status columns are split into
//! user-configurable phases.
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums per concern, each mapping to an
//!   [`error::ErrorCode`]; `anyhow::Result` only in [`config`].
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod board;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod lock;
pub mod migrate;
pub mod model;
pub mod sync;
pub mod taxonomy;

/// Store directory under a project root.
pub const DATA_DIR: &str = ".swimlane";

pub use board::{BoardProjection, LiveBoard, project};
pub use coordinator::{Command, Coordinator, CoordinatorError, Outcome};
pub use model::{ItemId, StageId, Status, WorkItem};
pub use sync::{SyncAdapter, SyncError};
pub use taxonomy::{Taxonomy, TaxonomyDraft, TaxonomyError, TaxonomyStore};
