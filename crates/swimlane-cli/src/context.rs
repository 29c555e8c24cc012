//! Opening the board under a project root.

use anyhow::{Context as _, Result};
use std::path::Path;
use std::sync::Arc;

use swimlane_core::config::{ProjectConfig, load_project_config};
use swimlane_core::coordinator::{Coordinator, PendingCommit};
use swimlane_core::sync::{FileStore, SyncAdapter};
use swimlane_core::{DATA_DIR, TaxonomyStore};

/// A file-backed store with a coordinator attached.
///
/// Pending commits saved by earlier invocations are restored on open; call
/// [`Board::save_pending`] after anything that may have changed them.
pub struct Board {
    pub store: Arc<FileStore>,
    pub coordinator: Coordinator,
}

/// The file store for `project_root`, configured from `config`.
pub fn file_store(project_root: &Path, config: &ProjectConfig) -> FileStore {
    FileStore::open(project_root.join(DATA_DIR))
        .with_mode(config.concurrency.mode)
        .with_lock_timeout(config.store.lock_timeout())
}

impl Board {
    pub fn open(project_root: &Path) -> Result<Self> {
        let config = load_project_config(project_root)?;
        let store = Arc::new(file_store(project_root, &config));
        let taxonomy = store.read_taxonomy()?;

        let adapter: Arc<dyn SyncAdapter> = store.clone();
        let coordinator = Coordinator::new(TaxonomyStore::new(taxonomy), adapter)?
            .with_retry(config.retry.policy());

        let pending: Vec<PendingCommit> = store
            .read_pending()
            .context("Failed to read saved pending commits")?;
        if !pending.is_empty() {
            tracing::debug!(count = pending.len(), "restored pending commits");
            coordinator.restore_pending(pending);
        }

        Ok(Self { store, coordinator })
    }

    pub fn save_pending(&self) -> Result<()> {
        self.store
            .write_pending(&self.coordinator.pending_commits())
            .context("Failed to save pending commits")
    }
}
