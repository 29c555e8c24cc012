//! In-process document store with scriptable faults.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{
    ConcurrencyMode, ItemFilter, ItemsCallback, SubscriptionId, Subscribers, SyncAdapter,
    SyncError, TaxonomyCallback, check_version, patch_item,
};
use crate::model::{ItemId, ItemPatch, WorkItem};
use crate::taxonomy::Taxonomy;

/// Fault count meaning "fail until cleared".
pub const ALWAYS: u32 = u32::MAX;

/// Injected write failures. Every injected failure is reported as
/// [`SyncError::Unavailable`], which callers treat as transient.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    /// Fail every write.
    pub unavailable: bool,
    /// Fail this many taxonomy writes.
    pub taxonomy_writes: u32,
    /// Fail this many writes of each listed item.
    pub item_writes: BTreeMap<ItemId, u32>,
}

impl FaultPlan {
    /// Fail the next `times` writes of `item` ([`ALWAYS`] for every write).
    #[must_use]
    pub fn fail_item(mut self, item: impl Into<ItemId>, times: u32) -> Self {
        self.item_writes.insert(item.into(), times);
        self
    }

    #[must_use]
    pub const fn fail_taxonomy(mut self, times: u32) -> Self {
        self.taxonomy_writes = times;
        self
    }

    #[must_use]
    pub const fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    fn take(count: &mut u32) -> bool {
        match *count {
            0 => false,
            ALWAYS => true,
            _ => {
                *count -= 1;
                true
            }
        }
    }

    fn trip_taxonomy(&mut self) -> Option<SyncError> {
        if self.unavailable || Self::take(&mut self.taxonomy_writes) {
            return Some(SyncError::Unavailable("injected taxonomy write fault".into()));
        }
        None
    }

    fn trip_item(&mut self, item: &ItemId) -> Option<SyncError> {
        let hit = self.unavailable
            || self
                .item_writes
                .get_mut(item)
                .is_some_and(Self::take);
        hit.then(|| SyncError::Unavailable(format!("injected write fault for item '{item}'")))
    }
}

#[derive(Debug)]
struct State {
    taxonomy: Taxonomy,
    items: Vec<WorkItem>,
    faults: FaultPlan,
    taxonomy_writes: u64,
    item_writes: u64,
}

/// A [`SyncAdapter`] holding every document in memory.
///
/// Items keep insertion order. Subscribers are called on the writing
/// thread once the store's own lock has been released.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    subscribers: Subscribers,
    mode: ConcurrencyMode,
}

impl MemoryStore {
    #[must_use]
    pub fn new(taxonomy: Taxonomy) -> Self {
        Self {
            state: Mutex::new(State {
                taxonomy,
                items: Vec::new(),
                faults: FaultPlan::default(),
                taxonomy_writes: 0,
                item_writes: 0,
            }),
            subscribers: Subscribers::default(),
            mode: ConcurrencyMode::default(),
        }
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: ConcurrencyMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_items(self, items: impl IntoIterator<Item = WorkItem>) -> Self {
        self.lock().items.extend(items);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn taxonomy(&self) -> Taxonomy {
        self.lock().taxonomy.clone()
    }

    #[must_use]
    pub fn items(&self) -> Vec<WorkItem> {
        self.lock().items.clone()
    }

    #[must_use]
    pub fn item(&self, id: &str) -> Option<WorkItem> {
        self.lock()
            .items
            .iter()
            .find(|item| item.id.as_str() == id)
            .cloned()
    }

    /// Add or replace a whole item document, as an outside collaborator would.
    pub fn put_item(&self, item: WorkItem) {
        let items = {
            let mut state = self.lock();
            match state.items.iter_mut().find(|existing| existing.id == item.id) {
                Some(existing) => *existing = item,
                None => state.items.push(item),
            }
            state.items.clone()
        };
        self.subscribers.notify_items(&items);
    }

    pub fn set_faults(&self, faults: FaultPlan) {
        self.lock().faults = faults;
    }

    pub fn clear_faults(&self) {
        self.set_faults(FaultPlan::default());
    }

    /// Successful taxonomy writes so far.
    #[must_use]
    pub fn taxonomy_writes(&self) -> u64 {
        self.lock().taxonomy_writes
    }

    /// Successful item writes so far.
    #[must_use]
    pub fn item_writes(&self) -> u64 {
        self.lock().item_writes
    }
}

impl SyncAdapter for MemoryStore {
    fn subscribe_taxonomy(&self, callback: TaxonomyCallback) -> Result<SubscriptionId, SyncError> {
        let (id, taxonomy) = {
            let state = self.lock();
            (
                self.subscribers.add_taxonomy(callback.clone()),
                state.taxonomy.clone(),
            )
        };
        callback(&taxonomy);
        Ok(id)
    }

    fn subscribe_items(
        &self,
        filter: ItemFilter,
        callback: ItemsCallback,
    ) -> Result<SubscriptionId, SyncError> {
        let (id, items) = {
            let state = self.lock();
            (
                self.subscribers.add_items(filter.clone(), callback.clone()),
                state.items.clone(),
            )
        };
        Subscribers::deliver_items(&filter, &items, &callback);
        Ok(id)
    }

    fn unsubscribe(&self, subscription: SubscriptionId) {
        self.subscribers.remove(subscription);
    }

    fn write_taxonomy(&self, taxonomy: &Taxonomy) -> Result<(), SyncError> {
        {
            let mut state = self.lock();
            if let Some(err) = state.faults.trip_taxonomy() {
                return Err(err);
            }
            check_version(self.mode, state.taxonomy.version(), taxonomy.version())?;
            state.taxonomy = taxonomy.clone();
            state.taxonomy_writes += 1;
        }
        tracing::debug!(version = taxonomy.version(), "memory store wrote taxonomy");
        self.subscribers.notify_taxonomy(taxonomy);
        Ok(())
    }

    fn write_item_fields(&self, item_id: &ItemId, patch: &ItemPatch) -> Result<(), SyncError> {
        let items = {
            let mut state = self.lock();
            if let Some(err) = state.faults.trip_item(item_id) {
                return Err(err);
            }
            let item = state
                .items
                .iter_mut()
                .find(|item| item.id == *item_id)
                .ok_or_else(|| SyncError::NotFound(item_id.clone()))?;
            patch_item(item, patch)?;
            state.item_writes += 1;
            state.items.clone()
        };
        tracing::debug!(item = %item_id, "memory store wrote item fields");
        self.subscribers.notify_items(&items);
        Ok(())
    }
}
