//! Shared handle to the committed taxonomy.
//!
//! A [`TaxonomyStore`] is cloned and passed to whoever needs it; all clones
//! see the same taxonomy. Readers get snapshots, writers either swap in a
//! whole taxonomy or run an edit closure against a copy.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Taxonomy, TaxonomyDraft};

#[derive(Debug, Clone)]
pub struct TaxonomyStore {
    inner: Arc<RwLock<Taxonomy>>,
}

impl TaxonomyStore {
    #[must_use]
    pub fn new(taxonomy: Taxonomy) -> Self {
        Self {
            inner: Arc::new(RwLock::new(taxonomy)),
        }
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, Taxonomy> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Taxonomy> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Owned copy of the current taxonomy.
    #[must_use]
    pub fn snapshot(&self) -> Taxonomy {
        self.read_guard().clone()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.read_guard().version()
    }

    /// Borrow the current taxonomy for the duration of `f`.
    pub fn read<R>(&self, f: impl FnOnce(&Taxonomy) -> R) -> R {
        f(&self.read_guard())
    }

    /// Install `taxonomy` unconditionally.
    pub fn replace(&self, taxonomy: Taxonomy) {
        let mut guard = self.write_guard();
        if guard.version() > taxonomy.version() {
            tracing::debug!(
                current = guard.version(),
                incoming = taxonomy.version(),
                "replacing taxonomy with an older version"
            );
        }
        *guard = taxonomy;
    }

    /// Run `f` against a copy and install the copy only if `f` succeeds.
    pub fn edit<R, E>(&self, f: impl FnOnce(&mut Taxonomy) -> Result<R, E>) -> Result<R, E> {
        let mut guard = self.write_guard();
        let mut copy = guard.clone();
        let out = f(&mut copy)?;
        *guard = copy;
        Ok(out)
    }

    /// Start a draft from the current taxonomy.
    #[must_use]
    pub fn draft(&self) -> TaxonomyDraft {
        TaxonomyDraft::new(self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StageId, Status};
    use crate::taxonomy::TaxonomyError;
    use crate::taxonomy::seed::default_seed;

    #[test]
    fn clones_share_state() {
        let store = TaxonomyStore::new(default_seed());
        let other = store.clone();
        store
            .edit(|t| t.rename_group_title(Status::Draft, "Leads"))
            .unwrap();
        assert_eq!(
            other.read(|t| t.group(Status::Draft).map(|g| g.title.clone())),
            Some("Leads".to_string())
        );
    }

    #[test]
    fn failed_edit_leaves_store_untouched() {
        let store = TaxonomyStore::new(default_seed());
        let before = store.snapshot();
        let err = store
            .edit(|t| {
                t.rename_group_title(Status::Draft, "half-applied")?;
                t.remove_stage(Status::Draft, &StageId::new("nope"))
            })
            .unwrap_err();
        assert!(matches!(err, TaxonomyError::UnknownStage { .. }));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn draft_does_not_leak_into_store() {
        let store = TaxonomyStore::new(default_seed());
        let mut draft = store.draft();
        draft.rename_group_title(Status::Completed, "Won").unwrap();
        assert_eq!(store.snapshot(), default_seed());

        store.replace(draft.commit());
        assert_eq!(store.version(), 1);
    }
}
