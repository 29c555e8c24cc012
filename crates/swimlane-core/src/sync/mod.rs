//! The adapter between the board engine and the documents it persists.
//!
//! A [`SyncAdapter`] owns two kinds of document: the single taxonomy and
//! one document per work item. Readers subscribe and are pushed a full
//! snapshot immediately and after every change; writers replace the
//! taxonomy or patch a few fields of one item.
//!
//! Adapters call subscribers synchronously from the writing thread, after
//! releasing their own locks. Callers must not hold locks of their own
//! across a write either.

pub mod file;
pub mod memory;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::ErrorCode;
use crate::lock::LockError;
use crate::model::{ItemId, ItemPatch, Status, WorkItem};
use crate::taxonomy::{DocumentError, Taxonomy};

pub use file::FileStore;
pub use memory::{FaultPlan, MemoryStore};

pub type TaxonomyCallback = Arc<dyn Fn(&Taxonomy) + Send + Sync>;
pub type ItemsCallback = Arc<dyn Fn(&[WorkItem]) + Send + Sync>;

/// Handle returned by the subscribe calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Which items an item subscription receives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    statuses: Option<BTreeSet<Status>>,
}

impl ItemFilter {
    /// Every item.
    #[must_use]
    pub const fn all() -> Self {
        Self { statuses: None }
    }

    /// Items whose status is in `statuses`.
    pub fn statuses(statuses: impl IntoIterator<Item = Status>) -> Self {
        Self {
            statuses: Some(statuses.into_iter().collect()),
        }
    }

    #[must_use]
    pub fn matches(&self, item: &WorkItem) -> bool {
        self.statuses
            .as_ref()
            .is_none_or(|set| set.contains(&item.status))
    }

    fn select(&self, items: &[WorkItem]) -> Vec<WorkItem> {
        items
            .iter()
            .filter(|item| self.matches(item))
            .cloned()
            .collect()
    }
}

/// How taxonomy writes from different writers are reconciled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConcurrencyMode {
    /// The last write replaces whatever is stored.
    #[default]
    LastWriterWins,
    /// A write must carry exactly `stored.version + 1`.
    Versioned,
}

/// Persistence failure reported by an adapter.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Lock(#[from] LockError),

    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("taxonomy version conflict: expected {expected}, got {found}")]
    Conflict { expected: u64, found: u64 },

    #[error("work item '{0}' not found")]
    NotFound(ItemId),

    /// A conditional patch found the item somewhere else. Carries the item
    /// as stored.
    #[error("work item '{}' moved to {} since it was read", .0.id, .0.status)]
    Moved(Box<WorkItem>),

    #[error("no board found at {}", .0.display())]
    NotInitialized(PathBuf),
}

impl SyncError {
    /// Transient failures worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Io(_) | Self::Lock(_))
    }

    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Unavailable(_) => ErrorCode::StoreUnavailable,
            Self::Io(_) => ErrorCode::StoreWriteFailed,
            Self::Lock(err) => err.code(),
            Self::Json(_) => ErrorCode::InvalidDocument,
            Self::Document(err) => err.code(),
            Self::Conflict { .. } => ErrorCode::StaleTaxonomy,
            Self::NotFound(_) => ErrorCode::UnknownItem,
            Self::Moved(_) => ErrorCode::ItemMoved,
            Self::NotInitialized(_) => ErrorCode::NotInitialized,
        }
    }
}

/// Persistence and change notification for taxonomy and items.
pub trait SyncAdapter: Send + Sync {
    /// Receive the current taxonomy now and after every change.
    fn subscribe_taxonomy(&self, callback: TaxonomyCallback) -> Result<SubscriptionId, SyncError>;

    /// Receive the items matching `filter` now and after every change.
    fn subscribe_items(
        &self,
        filter: ItemFilter,
        callback: ItemsCallback,
    ) -> Result<SubscriptionId, SyncError>;

    /// Stop a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, subscription: SubscriptionId);

    fn write_taxonomy(&self, taxonomy: &Taxonomy) -> Result<(), SyncError>;

    /// Patch `status`, `subcategoryId` and `lastUpdated` of one item.
    ///
    /// A patch with an `expected` placement fails with
    /// [`SyncError::Moved`] and writes nothing when the stored item is
    /// elsewhere.
    fn write_item_fields(&self, item_id: &ItemId, patch: &ItemPatch) -> Result<(), SyncError>;

    /// Pick up changes made by other writers and push them to subscribers.
    fn refresh(&self) -> Result<(), SyncError> {
        Ok(())
    }
}

/// Apply `patch` to a stored item, honouring its expected placement.
pub(crate) fn patch_item(item: &mut WorkItem, patch: &ItemPatch) -> Result<(), SyncError> {
    if !patch.applies_to(item) {
        return Err(SyncError::Moved(Box::new(item.clone())));
    }
    item.apply(patch);
    Ok(())
}

/// Reject `incoming` unless it is the next version after `stored`.
pub fn check_version(mode: ConcurrencyMode, stored: u64, incoming: u64) -> Result<(), SyncError> {
    match mode {
        ConcurrencyMode::Versioned if incoming != stored + 1 => Err(SyncError::Conflict {
            expected: stored + 1,
            found: incoming,
        }),
        _ => Ok(()),
    }
}

/// Subscriber registry shared by the store implementations.
#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: AtomicU64,
    taxonomy: Mutex<Vec<(SubscriptionId, TaxonomyCallback)>>,
    items: Mutex<Vec<(SubscriptionId, ItemFilter, ItemsCallback)>>,
}

impl fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("taxonomy", &self.taxonomy_list().len())
            .field("items", &self.item_list().len())
            .finish()
    }
}

impl Subscribers {
    fn next(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn taxonomy_list(&self) -> Vec<(SubscriptionId, TaxonomyCallback)> {
        self.taxonomy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn item_list(&self) -> Vec<(SubscriptionId, ItemFilter, ItemsCallback)> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn add_taxonomy(&self, callback: TaxonomyCallback) -> SubscriptionId {
        let id = self.next();
        self.taxonomy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
        id
    }

    pub(crate) fn add_items(&self, filter: ItemFilter, callback: ItemsCallback) -> SubscriptionId {
        let id = self.next();
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, filter, callback));
        id
    }

    pub(crate) fn remove(&self, id: SubscriptionId) {
        self.taxonomy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(sub, _)| *sub != id);
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(sub, _, _)| *sub != id);
    }

    /// Push `taxonomy` to every taxonomy subscriber. No lock is held while
    /// callbacks run.
    pub(crate) fn notify_taxonomy(&self, taxonomy: &Taxonomy) {
        for (_, callback) in self.taxonomy_list() {
            callback(taxonomy);
        }
    }

    /// Push the filtered view of `items` to every item subscriber.
    pub(crate) fn notify_items(&self, items: &[WorkItem]) {
        for (_, filter, callback) in self.item_list() {
            callback(&filter.select(items));
        }
    }

    pub(crate) fn deliver_items(filter: &ItemFilter, items: &[WorkItem], callback: &ItemsCallback) {
        callback(&filter.select(items));
    }
}
