//! A board that re-projects itself whenever the adapter pushes a change.
//!
//! Stages awaiting removal are flagged on every projection from a pending
//! source, normally the coordinator's queue. Whoever owns that source calls
//! [`LiveBoard::refresh`] (or the crate-internal watcher handle) when it
//! changes without a store write.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use super::{BoardProjection, project};
use crate::model::{StageId, WorkItem};
use crate::sync::{ItemFilter, SubscriptionId, SyncAdapter, SyncError};
use crate::taxonomy::Taxonomy;

type ChangeCallback = Arc<dyn Fn(&BoardProjection) + Send + Sync>;

/// Stages to flag as pending removal, read on every re-projection.
pub type PendingSource = Arc<dyn Fn() -> BTreeSet<StageId> + Send + Sync>;

#[derive(Default)]
struct LiveState {
    taxonomy: Option<Taxonomy>,
    items: Vec<WorkItem>,
    board: Option<BoardProjection>,
}

/// State shared between the board handle and its subscriptions.
pub(crate) struct LiveShared {
    state: Mutex<LiveState>,
    pending: PendingSource,
    on_change: ChangeCallback,
}

impl LiveShared {
    /// Apply `edit` to the state, re-project and report the new board.
    /// `on_change` runs after the state lock is released.
    fn update(&self, edit: impl FnOnce(&mut LiveState)) {
        let board = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            edit(&mut state);
            let Some(taxonomy) = state.taxonomy.as_ref() else {
                return;
            };
            let mut board = project(taxonomy, &state.items);
            board.mark_pending(&(self.pending)());
            state.board = Some(board.clone());
            board
        };
        (self.on_change)(&board);
    }

    pub(crate) fn refresh(&self) {
        self.update(|_| {});
    }
}

/// Subscribed projection. Unsubscribes when dropped.
pub struct LiveBoard {
    adapter: Arc<dyn SyncAdapter>,
    subscriptions: Vec<SubscriptionId>,
    shared: Arc<LiveShared>,
}

impl fmt::Debug for LiveBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveBoard")
            .field("subscriptions", &self.subscriptions)
            .finish_non_exhaustive()
    }
}

impl LiveBoard {
    /// Subscribe to taxonomy and items; `on_change` receives every new board.
    pub fn attach(
        adapter: Arc<dyn SyncAdapter>,
        on_change: impl Fn(&BoardProjection) + Send + Sync + 'static,
    ) -> Result<Self, SyncError> {
        Self::attach_with_pending(adapter, Arc::new(BTreeSet::new), on_change)
    }

    /// Like [`LiveBoard::attach`], flagging the stages `pending` returns on
    /// every projection.
    pub fn attach_with_pending(
        adapter: Arc<dyn SyncAdapter>,
        pending: PendingSource,
        on_change: impl Fn(&BoardProjection) + Send + Sync + 'static,
    ) -> Result<Self, SyncError> {
        let shared = Arc::new(LiveShared {
            state: Mutex::new(LiveState::default()),
            pending,
            on_change: Arc::new(on_change),
        });

        let taxonomy_sub = {
            let shared = Arc::downgrade(&shared);
            adapter.subscribe_taxonomy(Arc::new(move |taxonomy: &Taxonomy| {
                if let Some(shared) = shared.upgrade() {
                    shared.update(|state| state.taxonomy = Some(taxonomy.clone()));
                }
            }))?
        };

        let items_sub = {
            let shared = Arc::downgrade(&shared);
            adapter.subscribe_items(
                ItemFilter::all(),
                Arc::new(move |items: &[WorkItem]| {
                    if let Some(shared) = shared.upgrade() {
                        shared.update(|state| state.items = items.to_vec());
                    }
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

        Ok(Self {
            adapter,
            subscriptions: vec![taxonomy_sub, items_sub],
            shared,
        })
    }

    /// The latest projection, once a taxonomy has been received.
    #[must_use]
    pub fn current(&self) -> Option<BoardProjection> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .board
            .clone()
    }

    /// Re-project from the last pushed documents, e.g. after the pending
    /// source changed.
    pub fn refresh(&self) {
        self.shared.refresh();
    }

    pub(crate) fn watcher(&self) -> Weak<LiveShared> {
        Arc::downgrade(&self.shared)
    }
}

impl Drop for LiveBoard {
    fn drop(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.adapter.unsubscribe(id);
        }
    }
}
