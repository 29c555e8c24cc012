//! Transition coordinator: the single path by which items move and the
//! taxonomy changes.
//!
//! # Moves
//!
//! A move is validated against the current taxonomy and item set, then
//! written as one item patch (`status`, `subcategoryId`, `lastUpdated`).
//! Moving an item to where it already is writes nothing.
//!
//! # Taxonomy edits
//!
//! Every edit goes through a [`TaxonomyDraft`]. On commit the draft's stage
//! removals are resolved against the current items, the resulting item
//! migrations are written first, and only when all of them succeeded is
//! the new taxonomy written. If any migration still fails after retries the
//! draft is queued as a [`PendingCommit`]: the committed taxonomy is left as
//! it was, the doomed stage is shown as pending removal, and
//! [`Coordinator::retry_pending`] finishes the job later.
//!
//! Before resolving removals the adapter is asked to refresh, so items moved
//! by other writers are seen. Each migration is written as a conditional
//! patch that expects the item where it was resolved. An item that moved in
//! the meantime is re-resolved from its new position, or left alone if it
//! is no longer on a removed stage.
//!
//! A commit that removes stages reserves their statuses for as long as it
//! runs. A second removal in the same status is refused until the first has
//! committed or been queued and retried.
//!
//! # Locking
//!
//! The coordinator's own state (taxonomy handle, item cache, pending queue)
//! is only locked for copies and swaps, never across an adapter call.
//! Adapters may therefore notify subscribers synchronously from inside a
//! write.

pub mod command;
pub mod pending;
pub mod retry;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use crate::board::{self, BoardProjection, LiveBoard, LiveShared};
use crate::clock::{Clock, SystemClock};
use crate::error::ErrorCode;
use crate::migrate::{self, MigrationPlan};
use crate::model::{ItemId, ItemPatch, Placement, StageId, StagePatch, Status, WorkItem};
use crate::sync::{ItemFilter, SubscriptionId, SyncAdapter, SyncError};
use crate::taxonomy::{
    StageIdGenerator, StageRemoval, Taxonomy, TaxonomyDraft, TaxonomyError, TaxonomyStore,
};

pub use command::{Command, CommitReport, ItemMutation, MoveReport, Outcome, parse_status};
pub use pending::PendingCommit;
pub use retry::{RetryFailure, RetryPolicy};

use pending::PendingQueue;

/// How often one migration is re-resolved after the item moved under it.
const MAX_MIGRATION_ROUNDS: u32 = 3;

enum Migration {
    Written,
    Skipped,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Taxonomy(#[from] TaxonomyError),

    #[error("work item '{0}' is not on the board")]
    UnknownItem(ItemId),

    #[error("stage '{stage_id}' in {status} is waiting for its removal to finish")]
    RemovalPending { status: Status, stage_id: StageId },

    #[error("taxonomy is stale: the store expected version {expected}, the edit carried {found}")]
    StaleTaxonomy { expected: u64, found: u64 },

    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: SyncError,
    },

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl CoordinatorError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Taxonomy(err) => err.code(),
            Self::UnknownItem(_) => ErrorCode::UnknownItem,
            Self::RemovalPending { .. } => ErrorCode::RemovalPending,
            Self::StaleTaxonomy { .. } => ErrorCode::StaleTaxonomy,
            Self::RetriesExhausted { .. } => ErrorCode::RetriesExhausted,
            Self::Sync(err) => err.code(),
        }
    }
}

impl From<RetryFailure> for CoordinatorError {
    fn from(failure: RetryFailure) -> Self {
        match failure.error {
            SyncError::Conflict { expected, found } => Self::StaleTaxonomy { expected, found },
            error if error.is_retryable() => Self::RetriesExhausted {
                operation: failure.operation,
                attempts: failure.attempts,
                source: error,
            },
            error => Self::Sync(error),
        }
    }
}

pub struct Coordinator {
    store: TaxonomyStore,
    adapter: Arc<dyn SyncAdapter>,
    items: Arc<RwLock<Vec<WorkItem>>>,
    pending: Arc<Mutex<PendingQueue>>,
    live: Mutex<Vec<Weak<LiveShared>>>,
    subscriptions: Vec<SubscriptionId>,
    clock: Arc<dyn Clock>,
    ids: StageIdGenerator,
    retry: RetryPolicy,
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("version", &self.store.version())
            .field("subscriptions", &self.subscriptions)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Subscribe `store` and an item cache to `adapter`.
    ///
    /// The adapter pushes its current taxonomy immediately, so `store` ends
    /// up holding whatever the adapter has.
    pub fn new(store: TaxonomyStore, adapter: Arc<dyn SyncAdapter>) -> Result<Self, SyncError> {
        let items = Arc::new(RwLock::new(Vec::new()));

        let taxonomy_sub = {
            let store = store.clone();
            adapter.subscribe_taxonomy(Arc::new(move |taxonomy: &Taxonomy| {
                store.replace(taxonomy.clone());
            }))?
        };
        let items_sub = {
            let items = Arc::clone(&items);
            adapter.subscribe_items(
                ItemFilter::all(),
                Arc::new(move |snapshot: &[WorkItem]| {
                    *items.write().unwrap_or_else(PoisonError::into_inner) = snapshot.to_vec();
                }),
            )
        };
        let items_sub = match items_sub {
            Ok(id) => id,
            Err(err) => {
                adapter.unsubscribe(taxonomy_sub);
                return Err(err);
            }
        };

        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        Ok(Self {
            store,
            adapter,
            items,
            pending: Arc::new(Mutex::new(PendingQueue::default())),
            live: Mutex::new(Vec::new()),
            subscriptions: vec![taxonomy_sub, items_sub],
            ids: StageIdGenerator::new(Arc::clone(&clock)),
            clock,
            retry: RetryPolicy::default(),
        })
    }

    /// Use `clock` for `lastUpdated` stamps and new stage ids.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.ids = StageIdGenerator::new(Arc::clone(&clock));
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn store(&self) -> &TaxonomyStore {
        &self.store
    }

    /// Generator to use with [`TaxonomyDraft::add_stage`].
    #[must_use]
    pub const fn stage_ids(&self) -> &StageIdGenerator {
        &self.ids
    }

    /// Snapshot of the subscribed items.
    #[must_use]
    pub fn items(&self) -> Vec<WorkItem> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn item(&self, item_id: &str) -> Option<WorkItem> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|item| item.id.as_str() == item_id)
            .cloned()
    }

    fn queue(&self) -> MutexGuard<'_, PendingQueue> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the pending queue, then re-project every live board.
    fn update_queue<T>(&self, change: impl FnOnce(&mut PendingQueue) -> T) -> T {
        let out = change(&mut self.queue());
        self.pending_changed();
        out
    }

    fn pending_changed(&self) {
        let boards: Vec<Arc<LiveShared>> = {
            let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
            live.retain(|board| board.strong_count() > 0);
            live.iter().filter_map(Weak::upgrade).collect()
        };
        for board in boards {
            board.refresh();
        }
    }

    /// A board that follows the adapter and flags stages awaiting removal
    /// in this coordinator's queue.
    pub fn live_board(
        &self,
        on_change: impl Fn(&BoardProjection) + Send + Sync + 'static,
    ) -> Result<LiveBoard, SyncError> {
        let queue = Arc::clone(&self.pending);
        let board = LiveBoard::attach_with_pending(
            Arc::clone(&self.adapter),
            Arc::new(move || {
                queue
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .stage_ids()
            }),
            on_change,
        )?;
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(board.watcher());
        Ok(board)
    }

    /// The current board, with stages awaiting removal flagged.
    #[must_use]
    pub fn board(&self) -> BoardProjection {
        let mut board = board::project(&self.store.snapshot(), &self.items());
        board.mark_pending(&self.pending_stage_ids());
        board
    }

    /// Dispatch a command object.
    pub fn execute(&self, command: Command) -> Result<Outcome, CoordinatorError> {
        tracing::debug!(?command, "executing command");
        let report = match command {
            Command::Move {
                item_id,
                status,
                stage_id,
            } => {
                return self
                    .move_item(&item_id, &status, stage_id.as_deref())
                    .map(Outcome::Moved);
            }
            Command::RenameGroup { status, title } => {
                self.rename_group_title(parse_status(&status)?, title)?
            }
            Command::AddStage { status, title } => self.add_stage(parse_status(&status)?, title)?,
            Command::RemoveStage { status, stage_id } => {
                self.remove_stage(parse_status(&status)?, &StageId::new(stage_id))?
            }
            Command::Reorder { status, stage_ids } => {
                let ids: Vec<StageId> = stage_ids.into_iter().map(StageId::new).collect();
                self.reorder_stages(parse_status(&status)?, &ids)?
            }
            Command::EditStage {
                status,
                stage_id,
                title,
            } => self.edit_stage(
                parse_status(&status)?,
                &StageId::new(stage_id),
                StagePatch { title },
            )?,
        };
        Ok(Outcome::Taxonomy(report))
    }

    /// Validate a move and return the mutation it would write.
    pub fn plan_move(
        &self,
        item_id: &str,
        status: &str,
        stage_id: Option<&str>,
    ) -> Result<MoveReport, CoordinatorError> {
        let status = parse_status(status)?;
        let stage = stage_id.map(StageId::from);
        if let Some(stage) = &stage {
            self.store
                .read(|taxonomy| taxonomy.require_stage(status, stage).map(drop))?;
            if self.is_pending_removal(stage) {
                return Err(CoordinatorError::RemovalPending {
                    status,
                    stage_id: stage.clone(),
                });
            }
        }

        let item = self
            .item(item_id)
            .ok_or_else(|| CoordinatorError::UnknownItem(ItemId::new(item_id)))?;
        if item.is_at(status, stage.as_ref()) {
            return Ok(MoveReport::default());
        }

        Ok(MoveReport {
            mutations: vec![ItemMutation {
                item_id: item.id,
                patch: ItemPatch::moved_to(status, stage, self.clock.now_ms()),
            }],
        })
    }

    /// Move an item to `(status, stage_id)`.
    pub fn move_item(
        &self,
        item_id: &str,
        status: &str,
        stage_id: Option<&str>,
    ) -> Result<MoveReport, CoordinatorError> {
        let report = self.plan_move(item_id, status, stage_id)?;
        if report.is_noop() {
            tracing::debug!(item = item_id, "item already in place, nothing to write");
            return Ok(report);
        }
        for mutation in &report.mutations {
            self.retry.run("write item fields", || {
                self.adapter
                    .write_item_fields(&mutation.item_id, &mutation.patch)
            })?;
            tracing::info!(
                item = %mutation.item_id,
                status = ?mutation.patch.status,
                subcategory = ?mutation.patch.subcategory,
                "moved item"
            );
        }
        Ok(report)
    }

    /// Start an editing session on the current taxonomy.
    #[must_use]
    pub fn begin_edit(&self) -> TaxonomyDraft {
        self.store.draft()
    }

    pub fn rename_group_title(
        &self,
        status: Status,
        title: impl Into<String>,
    ) -> Result<CommitReport, CoordinatorError> {
        let mut draft = self.begin_edit();
        draft.rename_group_title(status, title)?;
        self.commit_draft(draft)
    }

    pub fn add_stage(
        &self,
        status: Status,
        title: impl Into<String>,
    ) -> Result<CommitReport, CoordinatorError> {
        let mut draft = self.begin_edit();
        let stage_id = draft.add_stage(status, title, &self.ids)?;
        let mut report = self.commit_draft(draft)?;
        report.added_stage = Some(stage_id);
        Ok(report)
    }

    /// Remove a stage, migrating its items to the neighbouring stage first.
    pub fn remove_stage(
        &self,
        status: Status,
        stage_id: &StageId,
    ) -> Result<CommitReport, CoordinatorError> {
        let mut draft = self.begin_edit();
        draft.remove_stage(status, stage_id)?;
        self.commit_draft(draft)
    }

    pub fn reorder_stages(
        &self,
        status: Status,
        stage_ids: &[StageId],
    ) -> Result<CommitReport, CoordinatorError> {
        let mut draft = self.begin_edit();
        draft.reorder_stages(status, stage_ids)?;
        self.commit_draft(draft)
    }

    pub fn edit_stage(
        &self,
        status: Status,
        stage_id: &StageId,
        patch: StagePatch,
    ) -> Result<CommitReport, CoordinatorError> {
        let mut draft = self.begin_edit();
        draft.edit_stage(status, stage_id, patch)?;
        self.commit_draft(draft)
    }

    /// Commit a draft: migrate items off removed stages, then write the
    /// taxonomy.
    ///
    /// The draft is committed as-is on top of its own base, so in versioned
    /// mode a draft started before someone else's commit is rejected as
    /// stale.
    pub fn commit_draft(&self, draft: TaxonomyDraft) -> Result<CommitReport, CoordinatorError> {
        if draft.is_empty() {
            return Ok(CommitReport::default());
        }
        if draft.removals().is_empty() {
            return self.run_commit(draft, None);
        }

        let token = self
            .update_queue(|queue| queue.reserve(draft.removals()))
            .map_err(|(status, stage_id)| CoordinatorError::RemovalPending { status, stage_id })?;
        let result = self.run_commit(draft, None);
        self.update_queue(|queue| queue.release(token));
        result
    }

    fn run_commit(
        &self,
        draft: TaxonomyDraft,
        pending_id: Option<u64>,
    ) -> Result<CommitReport, CoordinatorError> {
        if !draft.removals().is_empty() {
            self.retry
                .run("refresh documents", || self.adapter.refresh())?;
        }
        let items = self.items();
        let plans = migrate::resolve_removals(draft.removals(), &items);
        let (migrated, outstanding) = self.migrate_items(draft.removals(), &items, &plans);

        if !outstanding.is_empty() {
            let id = self.update_queue(|queue| {
                queue.upsert(
                    pending_id,
                    draft.base().version(),
                    draft.edits(),
                    outstanding.iter().cloned().collect(),
                    self.clock.now_ms(),
                )
            });
            tracing::warn!(
                pending = id,
                outstanding = outstanding.len(),
                "item migrations failed, taxonomy edit queued as pending"
            );
            return Ok(CommitReport {
                pending_id: Some(id),
                plans,
                migrated,
                outstanding,
                ..CommitReport::default()
            });
        }

        let has_removals = !draft.removals().is_empty();
        let base_version = draft.base().version();
        let edits = draft.edits().to_vec();
        let next = draft.commit();
        let version = next.version();

        match self
            .retry
            .run("write taxonomy", || self.adapter.write_taxonomy(&next))
        {
            Ok(()) => {}
            Err(failure) if has_removals && failure.error.is_retryable() => {
                let id = self.update_queue(|queue| {
                    queue.upsert(
                        pending_id,
                        base_version,
                        &edits,
                        BTreeSet::new(),
                        self.clock.now_ms(),
                    )
                });
                tracing::warn!(
                    pending = id,
                    error = %failure.error,
                    "items migrated but taxonomy write failed, queued as pending"
                );
                return Ok(CommitReport {
                    pending_id: Some(id),
                    plans,
                    migrated,
                    ..CommitReport::default()
                });
            }
            Err(failure) => return Err(failure.into()),
        }

        self.store.replace(next);
        if let Some(id) = pending_id {
            self.update_queue(|queue| queue.remove(id));
        }
        tracing::info!(
            version,
            edits = edits.len(),
            migrated = migrated.len(),
            "committed taxonomy edit"
        );
        Ok(CommitReport {
            committed: true,
            version: Some(version),
            plans,
            migrated,
            ..CommitReport::default()
        })
    }

    /// Write every migration in `plans`, each conditional on the item still
    /// being where `items` had it. A failing item never stops the others.
    /// Returns (migrated, outstanding).
    fn migrate_items(
        &self,
        removals: &[StageRemoval],
        items: &[WorkItem],
        plans: &[MigrationPlan],
    ) -> (Vec<ItemId>, Vec<ItemId>) {
        let placements: BTreeMap<&ItemId, Placement> = items
            .iter()
            .map(|item| (&item.id, item.placement()))
            .collect();
        let now = self.clock.now_ms();
        let mut migrated = Vec::new();
        let mut outstanding = Vec::new();

        for (item_id, target) in migrate::final_assignments(plans) {
            let Some(from) = placements.get(&item_id).cloned() else {
                continue;
            };
            match self.migrate_item(removals, &item_id, from, target, now) {
                Migration::Written => migrated.push(item_id),
                Migration::Skipped => {}
                Migration::Failed => outstanding.push(item_id),
            }
        }

        if !migrated.is_empty() {
            tracing::info!(count = migrated.len(), "migrated items off removed stages");
        }
        (migrated, outstanding)
    }

    fn migrate_item(
        &self,
        removals: &[StageRemoval],
        item_id: &ItemId,
        mut from: Placement,
        mut target: Option<StageId>,
        now: i64,
    ) -> Migration {
        for _ in 0..MAX_MIGRATION_ROUNDS {
            let patch = ItemPatch::migrated_to(target, now).expecting(from);
            let current = match self
                .retry
                .run("migrate item", || self.adapter.write_item_fields(item_id, &patch))
            {
                Ok(()) => return Migration::Written,
                Err(RetryFailure {
                    error: SyncError::NotFound(_),
                    ..
                }) => {
                    tracing::debug!(item = %item_id, "item gone before migration, skipping");
                    return Migration::Skipped;
                }
                Err(RetryFailure {
                    error: SyncError::Moved(current),
                    ..
                }) => current,
                Err(failure) => {
                    tracing::warn!(
                        item = %item_id,
                        attempts = failure.attempts,
                        error = %failure.error,
                        "item migration failed"
                    );
                    return Migration::Failed;
                }
            };

            let plans = migrate::resolve_removals(removals, std::slice::from_ref(&*current));
            let Some(next) = migrate::final_assignments(&plans).remove(item_id) else {
                tracing::debug!(
                    item = %item_id,
                    status = %current.status,
                    subcategory = ?current.subcategory_id,
                    "item moved off the removed stages, leaving it"
                );
                return Migration::Skipped;
            };
            tracing::debug!(item = %item_id, target = ?next, "item moved during migration, re-resolved");
            from = current.placement();
            target = next;
        }

        tracing::warn!(item = %item_id, "item kept moving during migration");
        Migration::Failed
    }

    /// Queued pending commits, oldest first.
    #[must_use]
    pub fn pending_commits(&self) -> Vec<PendingCommit> {
        self.queue().list()
    }

    /// Replace the pending queue, e.g. with commits saved by a previous
    /// process.
    pub fn restore_pending(&self, commits: Vec<PendingCommit>) {
        self.update_queue(|queue| queue.restore(commits));
    }

    /// Stages whose removal is waiting on migrations.
    #[must_use]
    pub fn pending_stage_ids(&self) -> BTreeSet<StageId> {
        self.queue().stage_ids()
    }

    #[must_use]
    pub fn is_pending_removal(&self, stage_id: &StageId) -> bool {
        self.pending_stage_ids().contains(stage_id)
    }

    /// Retry every pending commit against the current taxonomy and items.
    ///
    /// Each commit's edits are replayed on the current taxonomy and its
    /// migrations re-resolved, so items moved in the meantime are honoured.
    /// A commit whose edits no longer apply is dropped.
    pub fn retry_pending(&self) -> Vec<Result<CommitReport, CoordinatorError>> {
        let queued = self.pending_commits();
        let mut results = Vec::with_capacity(queued.len());
        for commit in queued {
            let current = self.store.snapshot();
            let draft = match TaxonomyDraft::replay(current, &commit.edits) {
                Ok(draft) => draft,
                Err(err) => {
                    self.update_queue(|queue| queue.remove(commit.id));
                    tracing::warn!(
                        pending = commit.id,
                        error = %err,
                        "pending commit no longer applies, discarding"
                    );
                    results.push(Ok(CommitReport {
                        pending_id: Some(commit.id),
                        discarded: true,
                        ..CommitReport::default()
                    }));
                    continue;
                }
            };
            tracing::debug!(pending = commit.id, attempts = commit.attempts, "retrying pending commit");
            results.push(self.run_commit(draft, Some(commit.id)));
        }
        results
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.adapter.unsubscribe(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::StageGroup;
    use crate::sync::{ConcurrencyMode, FaultPlan, ItemsCallback, MemoryStore, TaxonomyCallback};
    use crate::taxonomy::Taxonomy;
    use crate::taxonomy::seed::default_seed;

    type Hook = Box<dyn FnOnce(&MemoryStore) + Send>;

    /// Memory store that runs a hook just before the next item write, to
    /// stand in for another writer acting mid-commit.
    struct Interposed {
        inner: Arc<MemoryStore>,
        hook: Mutex<Option<Hook>>,
    }

    impl Interposed {
        fn before_next_item_write(&self, hook: impl FnOnce(&MemoryStore) + Send + 'static) {
            *self.hook.lock().unwrap() = Some(Box::new(hook));
        }
    }

    impl SyncAdapter for Interposed {
        fn subscribe_taxonomy(
            &self,
            callback: TaxonomyCallback,
        ) -> Result<SubscriptionId, SyncError> {
            self.inner.subscribe_taxonomy(callback)
        }

        fn subscribe_items(
            &self,
            filter: ItemFilter,
            callback: ItemsCallback,
        ) -> Result<SubscriptionId, SyncError> {
            self.inner.subscribe_items(filter, callback)
        }

        fn unsubscribe(&self, subscription: SubscriptionId) {
            self.inner.unsubscribe(subscription);
        }

        fn write_taxonomy(&self, taxonomy: &Taxonomy) -> Result<(), SyncError> {
            self.inner.write_taxonomy(taxonomy)
        }

        fn write_item_fields(&self, item_id: &ItemId, patch: &ItemPatch) -> Result<(), SyncError> {
            let hook = self.hook.lock().unwrap().take();
            if let Some(hook) = hook {
                hook(&self.inner);
            }
            self.inner.write_item_fields(item_id, patch)
        }
    }

    fn setup_interposed(items: Vec<WorkItem>) -> (Arc<MemoryStore>, Arc<Interposed>, Coordinator) {
        let inner = Arc::new(MemoryStore::new(abc()).with_items(items));
        let adapter = Arc::new(Interposed {
            inner: Arc::clone(&inner),
            hook: Mutex::new(None),
        });
        let coordinator = Coordinator::new(TaxonomyStore::new(abc()), adapter.clone())
            .unwrap()
            .with_clock(Arc::new(ManualClock::new(1_000)))
            .with_retry(RetryPolicy::immediate(3));
        (inner, adapter, coordinator)
    }

    /// DRAFT = [A, B, C]; one stage in every other status.
    fn abc() -> Taxonomy {
        let group = |status: Status, names: &[&str]| {
            StageGroup::from_titles(status, status.as_str(), names.iter().copied(), |idx| {
                StageId::new(names[idx])
            })
        };
        Taxonomy::new(
            0,
            vec![
                group(Status::Draft, &["A", "B", "C"]),
                group(Status::InProgress, &["P"]),
                group(Status::Completed, &["D"]),
                group(Status::Cancelled, &["X"]),
            ],
        )
        .unwrap()
    }

    fn setup(taxonomy: Taxonomy, items: Vec<WorkItem>) -> (Arc<MemoryStore>, Coordinator) {
        let adapter = Arc::new(MemoryStore::new(taxonomy.clone()).with_items(items));
        let coordinator = Coordinator::new(TaxonomyStore::new(taxonomy), adapter.clone())
            .unwrap()
            .with_clock(Arc::new(ManualClock::new(1_000)))
            .with_retry(RetryPolicy::immediate(3));
        (adapter, coordinator)
    }

    fn p123() -> Vec<WorkItem> {
        vec![
            WorkItem::new("P1", Status::Draft, Some("A".into())),
            WorkItem::new("P2", Status::Draft, Some("B".into())),
            WorkItem::new("P3", Status::Draft, Some("C".into())),
        ]
    }

    #[test]
    fn move_writes_one_mutation() {
        let (adapter, coordinator) = setup(abc(), p123());
        let report = coordinator.move_item("P1", "IN_PROGRESS", Some("P")).unwrap();
        assert_eq!(report.mutations.len(), 1);
        assert_eq!(report.mutations[0].patch.last_updated, 1_000);
        let item = adapter.item("P1").unwrap();
        assert!(item.is_at(Status::InProgress, Some(&"P".into())));
        assert_eq!(coordinator.item("P1").unwrap(), item);
    }

    #[test]
    fn move_to_current_position_is_a_noop() {
        let (adapter, coordinator) = setup(abc(), p123());
        let report = coordinator.move_item("P2", "DRAFT", Some("B")).unwrap();
        assert!(report.is_noop());
        assert_eq!(adapter.item_writes(), 0);
    }

    #[test]
    fn move_validation_leaves_item_untouched() {
        let (adapter, coordinator) = setup(abc(), p123());
        let err = coordinator
            .move_item("P1", "IN_PROGRESS", Some("nonexistent"))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownStage);

        let err = coordinator.move_item("P1", "in_progress", None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownStatus);

        let err = coordinator.move_item("ghost", "DRAFT", None).unwrap_err();
        assert!(matches!(err, CoordinatorError::UnknownItem(_)));

        assert_eq!(adapter.item_writes(), 0);
        assert!(adapter.item("P1").unwrap().is_at(Status::Draft, Some(&"A".into())));
    }

    #[test]
    fn move_to_stage_of_another_status_is_rejected() {
        let (_, coordinator) = setup(abc(), p123());
        let err = coordinator.move_item("P1", "COMPLETED", Some("A")).unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Taxonomy(TaxonomyError::UnknownStage {
                status: Status::Completed,
                ..
            })
        ));
    }

    #[test]
    fn remove_stage_migrates_before_writing_taxonomy() {
        let (adapter, coordinator) = setup(abc(), p123());
        let report = coordinator.remove_stage(Status::Draft, &"B".into()).unwrap();
        assert!(report.committed);
        assert_eq!(report.version, Some(1));
        assert_eq!(report.migrated, vec![ItemId::new("P2")]);
        assert!(adapter.item("P2").unwrap().is_at(Status::Draft, Some(&"A".into())));
        assert!(!adapter.taxonomy().contains_stage("B"));
        assert!(!coordinator.store().snapshot().contains_stage("B"));
    }

    #[test]
    fn remove_first_stage_migrates_to_successor() {
        let (adapter, coordinator) = setup(abc(), p123());
        coordinator.remove_stage(Status::Draft, &"A".into()).unwrap();
        assert!(adapter.item("P1").unwrap().is_at(Status::Draft, Some(&"B".into())));
    }

    #[test]
    fn removing_last_stage_is_rejected() {
        let (adapter, coordinator) = setup(abc(), p123());
        let err = coordinator.remove_stage(Status::Completed, &"D".into()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::LastStageViolation);
        assert_eq!(adapter.taxonomy_writes(), 0);
    }

    #[test]
    fn failing_migration_queues_a_pending_commit() {
        let (adapter, coordinator) = setup(abc(), p123());
        adapter.set_faults(FaultPlan::default().fail_item("P2", crate::sync::memory::ALWAYS));

        let report = coordinator.remove_stage(Status::Draft, &"B".into()).unwrap();
        assert!(!report.committed);
        assert_eq!(report.outstanding, vec![ItemId::new("P2")]);
        assert!(report.pending_id.is_some());
        assert_eq!(adapter.taxonomy_writes(), 0);
        assert!(adapter.taxonomy().contains_stage("B"));

        let board = coordinator.board();
        assert!(board.bucket(Status::Draft, "B").unwrap().pending_removal);

        let err = coordinator.move_item("P1", "DRAFT", Some("B")).unwrap_err();
        assert!(matches!(err, CoordinatorError::RemovalPending { .. }));
        let err = coordinator.remove_stage(Status::Draft, &"C".into()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::RemovalPending);

        adapter.clear_faults();
        let results = coordinator.retry_pending();
        assert_eq!(results.len(), 1);
        let report = results[0].as_ref().unwrap();
        assert!(report.committed);
        assert!(coordinator.pending_commits().is_empty());
        assert!(!adapter.taxonomy().contains_stage("B"));
        assert!(adapter.item("P2").unwrap().is_at(Status::Draft, Some(&"A".into())));
    }

    #[test]
    fn retry_honours_moves_made_while_pending() {
        let (adapter, coordinator) = setup(abc(), p123());
        adapter.set_faults(FaultPlan::default().fail_item("P2", crate::sync::memory::ALWAYS));
        coordinator.remove_stage(Status::Draft, &"B".into()).unwrap();
        adapter.clear_faults();

        coordinator.move_item("P2", "DRAFT", Some("C")).unwrap();
        let report = coordinator.retry_pending().remove(0).unwrap();
        assert!(report.committed);
        assert!(report.migrated.is_empty());
        assert!(adapter.item("P2").unwrap().is_at(Status::Draft, Some(&"C".into())));
    }

    #[test]
    fn stale_pending_commit_is_discarded() {
        let (adapter, coordinator) = setup(abc(), p123());
        adapter.set_faults(FaultPlan::default().fail_item("P2", crate::sync::memory::ALWAYS));
        coordinator.remove_stage(Status::Draft, &"B".into()).unwrap();

        let mut other = adapter.taxonomy();
        other.remove_stage(Status::Draft, &"B".into()).unwrap();
        other.set_version(1);
        adapter.write_taxonomy(&other).unwrap();

        let report = coordinator.retry_pending().remove(0).unwrap();
        assert!(report.discarded);
        assert!(coordinator.pending_commits().is_empty());
    }

    #[test]
    fn taxonomy_write_failure_after_migration_is_pending() {
        let (adapter, coordinator) = setup(abc(), p123());
        adapter.set_faults(FaultPlan::default().fail_taxonomy(crate::sync::memory::ALWAYS));
        let report = coordinator.remove_stage(Status::Draft, &"B".into()).unwrap();
        assert!(!report.committed);
        assert!(report.outstanding.is_empty());
        assert_eq!(report.migrated, vec![ItemId::new("P2")]);

        adapter.clear_faults();
        assert!(coordinator.retry_pending()[0].as_ref().unwrap().committed);
    }

    #[test]
    fn failed_plain_edit_surfaces_retries_exhausted() {
        let (adapter, coordinator) = setup(abc(), p123());
        adapter.set_faults(FaultPlan::default().fail_taxonomy(crate::sync::memory::ALWAYS));
        let err = coordinator
            .rename_group_title(Status::Draft, "Leads")
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::RetriesExhausted { attempts: 3, .. }));
        assert!(coordinator.pending_commits().is_empty());
        assert_eq!(coordinator.store().snapshot(), abc());
    }

    #[test]
    fn versioned_mode_rejects_stale_drafts() {
        let adapter = Arc::new(MemoryStore::new(abc()).with_mode(ConcurrencyMode::Versioned));
        let coordinator = Coordinator::new(TaxonomyStore::new(abc()), adapter.clone())
            .unwrap()
            .with_retry(RetryPolicy::none());

        let stale = coordinator.begin_edit();
        coordinator.rename_group_title(Status::Draft, "Leads").unwrap();

        let mut stale = stale;
        stale.rename_group_title(Status::Completed, "Won").unwrap();
        let err = coordinator.commit_draft(stale).unwrap_err();
        assert!(matches!(err, CoordinatorError::StaleTaxonomy { expected: 2, found: 1 }));
        assert_eq!(coordinator.store().version(), 1);
    }

    #[test]
    fn add_stage_reports_the_new_id() {
        let (adapter, coordinator) = setup(default_seed(), Vec::new());
        let report = coordinator.add_stage(Status::Completed, "Archived").unwrap();
        let id = report.added_stage.unwrap();
        assert!(id.as_str().starts_with("stg-"));
        let group = adapter.taxonomy().group(Status::Completed).unwrap().clone();
        assert_eq!(group.stages.last().unwrap().id, id);
    }

    #[test]
    fn execute_dispatches_commands() {
        let (_, coordinator) = setup(abc(), p123());
        let outcome = coordinator
            .execute(Command::Reorder {
                status: "DRAFT".into(),
                stage_ids: vec!["C".into(), "A".into(), "B".into()],
            })
            .unwrap();
        assert!(matches!(outcome, Outcome::Taxonomy(ref r) if r.committed));

        let outcome = coordinator
            .execute(Command::Move {
                item_id: "P3".into(),
                status: "CANCELLED".into(),
                stage_id: Some("X".into()),
            })
            .unwrap();
        assert!(matches!(outcome, Outcome::Moved(ref r) if r.mutations.len() == 1));

        let err = coordinator
            .execute(Command::EditStage {
                status: "Draft".into(),
                stage_id: "A".into(),
                title: Some("x".into()),
            })
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownStatus);
    }

    #[test]
    fn batched_draft_commits_once() {
        let (adapter, coordinator) = setup(abc(), p123());
        let mut draft = coordinator.begin_edit();
        draft.rename_group_title(Status::Draft, "Leads").unwrap();
        draft.remove_stage(Status::Draft, &"B".into()).unwrap();
        draft.remove_stage(Status::Draft, &"A".into()).unwrap();
        let report = coordinator.commit_draft(draft).unwrap();
        assert!(report.committed);
        assert_eq!(adapter.taxonomy_writes(), 1);
        for id in ["P1", "P2", "P3"] {
            assert!(adapter.item(id).unwrap().is_at(Status::Draft, Some(&"C".into())));
        }
    }

    #[test]
    fn empty_draft_writes_nothing() {
        let (adapter, coordinator) = setup(abc(), p123());
        let report = coordinator.commit_draft(coordinator.begin_edit()).unwrap();
        assert!(!report.committed);
        assert_eq!(adapter.taxonomy_writes(), 0);
    }

    #[test]
    fn item_moved_off_a_removed_stage_mid_commit_is_left_alone() {
        let (store, adapter, coordinator) = setup_interposed(p123());
        adapter.before_next_item_write(|store| {
            store
                .write_item_fields(
                    &"P2".into(),
                    &ItemPatch::moved_to(Status::InProgress, Some("P".into()), 500),
                )
                .unwrap();
        });

        let report = coordinator.remove_stage(Status::Draft, &"B".into()).unwrap();
        assert!(report.committed);
        assert!(report.migrated.is_empty());
        assert!(report.outstanding.is_empty());
        assert!(!store.taxonomy().contains_stage("B"));

        let p2 = store.item("P2").unwrap();
        assert!(p2.is_at(Status::InProgress, Some(&"P".into())));
        assert_eq!(p2.last_updated, Some(500));
    }

    #[test]
    fn item_moved_onto_another_removed_stage_is_re_resolved() {
        let (store, adapter, coordinator) = setup_interposed(p123());
        adapter.before_next_item_write(|store| {
            store
                .write_item_fields(
                    &"P2".into(),
                    &ItemPatch::moved_to(Status::Draft, Some("C".into()), 500),
                )
                .unwrap();
        });

        let mut draft = coordinator.begin_edit();
        draft.remove_stage(Status::Draft, &"B".into()).unwrap();
        draft.remove_stage(Status::Draft, &"C".into()).unwrap();
        let report = coordinator.commit_draft(draft).unwrap();

        assert!(report.committed);
        assert_eq!(report.migrated, vec![ItemId::new("P2"), ItemId::new("P3")]);
        for id in ["P1", "P2", "P3"] {
            assert!(store.item(id).unwrap().is_at(Status::Draft, Some(&"A".into())));
        }
    }

    #[test]
    fn removal_in_flight_blocks_a_second_removal_in_the_status() {
        let (store, adapter, coordinator) = setup_interposed(p123());
        let coordinator = Arc::new(coordinator);
        let blocked = Arc::new(Mutex::new(None));

        let handle = Arc::downgrade(&coordinator);
        let sink = Arc::clone(&blocked);
        adapter.before_next_item_write(move |_| {
            let coordinator = handle.upgrade().unwrap();
            assert!(coordinator.is_pending_removal(&"B".into()));
            let err = coordinator
                .remove_stage(Status::Draft, &"C".into())
                .unwrap_err();
            *sink.lock().unwrap() = Some(err.code());
        });

        assert!(coordinator.remove_stage(Status::Draft, &"B".into()).unwrap().committed);
        assert_eq!(*blocked.lock().unwrap(), Some(ErrorCode::RemovalPending));
        assert!(store.taxonomy().contains_stage("C"));

        assert!(coordinator.pending_stage_ids().is_empty());
        assert!(coordinator.remove_stage(Status::Draft, &"C".into()).unwrap().committed);
        assert!(store.item("P3").unwrap().is_at(Status::Draft, Some(&"A".into())));
    }

    #[test]
    fn live_board_flags_stages_while_their_removal_is_pending() {
        let (adapter, coordinator) = setup(abc(), p123());
        let live = coordinator.live_board(|_| {}).unwrap();
        assert!(!live.current().unwrap().bucket(Status::Draft, "B").unwrap().pending_removal);

        adapter.set_faults(FaultPlan::default().fail_item("P2", crate::sync::memory::ALWAYS));
        coordinator.remove_stage(Status::Draft, &"B".into()).unwrap();
        let board = live.current().unwrap();
        assert!(board.bucket(Status::Draft, "B").unwrap().pending_removal);
        assert!(!board.bucket(Status::Draft, "A").unwrap().pending_removal);

        adapter.clear_faults();
        assert!(coordinator.retry_pending()[0].as_ref().unwrap().committed);
        let board = live.current().unwrap();
        assert!(board.bucket(Status::Draft, "B").is_none());
        assert!(board.columns.iter().flat_map(|c| &c.phases).all(|b| !b.pending_removal));
    }
}
