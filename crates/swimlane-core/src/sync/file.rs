//! Directory-backed store.
//!
//! Layout under the store root (normally `.swimlane/`):
//!
//! ```text
//! taxonomy.json         the taxonomy document
//! items/<digest>.json   one document per work item
//! pending.json          queued pending commits
//! config.toml           project config (read by `config`, not here)
//! lock                  advisory lock file
//! ```
//!
//! Every write goes to a temp file and is renamed into place while the
//! exclusive store lock is held. Subscribers are notified in-process only;
//! call [`SyncAdapter::refresh`] to pick up changes made by other processes.
//!
//! A malformed item document is skipped with a warning when items are
//! listed, so one bad file cannot hide the rest of the board. Once a write
//! is on disk it is reported as done even if the snapshot pushed to
//! subscribers afterwards cannot be read.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{
    ConcurrencyMode, ItemFilter, ItemsCallback, SubscriptionId, Subscribers, SyncAdapter,
    SyncError, TaxonomyCallback, check_version, patch_item,
};
use crate::lock::{LockMode, StoreLock};
use crate::model::{ItemId, ItemPatch, WorkItem};
use crate::taxonomy::{Taxonomy, TaxonomyDocument, parse_taxonomy};

const TAXONOMY_FILE: &str = "taxonomy.json";
const ITEMS_DIR: &str = "items";
const PENDING_FILE: &str = "pending.json";
const LOCK_FILE: &str = "lock";

/// Default time to wait for the store lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    mode: ConcurrencyMode,
    lock_timeout: Duration,
    subscribers: Subscribers,
}

impl FileStore {
    /// Open the store rooted at `root`. Nothing is read until needed.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mode: ConcurrencyMode::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            subscribers: Subscribers::default(),
        }
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: ConcurrencyMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn taxonomy_path(&self) -> PathBuf {
        self.root.join(TAXONOMY_FILE)
    }

    fn items_dir(&self) -> PathBuf {
        self.root.join(ITEMS_DIR)
    }

    fn item_path(&self, id: &ItemId) -> PathBuf {
        self.items_dir().join(format!("{}.json", item_digest(id)))
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    fn lock(&self, mode: LockMode) -> Result<StoreLock, SyncError> {
        Ok(StoreLock::acquire(&self.lock_path(), mode, self.lock_timeout)?)
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.taxonomy_path().is_file()
    }

    /// Write `taxonomy` as the first taxonomy document. Returns `false`
    /// without writing if one already exists.
    pub fn initialize(&self, taxonomy: &Taxonomy) -> Result<bool, SyncError> {
        fs::create_dir_all(self.items_dir())?;
        {
            let _lock = self.lock(LockMode::Exclusive)?;
            if self.is_initialized() {
                return Ok(false);
            }
            write_json(&self.taxonomy_path(), &TaxonomyDocument::from(taxonomy))?;
        }
        tracing::info!(root = %self.root.display(), "initialized board store");
        self.subscribers.notify_taxonomy(taxonomy);
        Ok(true)
    }

    /// Read and validate the taxonomy document, upgrading legacy shapes.
    pub fn read_taxonomy(&self) -> Result<Taxonomy, SyncError> {
        if !self.is_initialized() {
            return Err(SyncError::NotInitialized(self.root.clone()));
        }
        let _lock = self.lock(LockMode::Shared)?;
        self.load_taxonomy()
    }

    fn load_taxonomy(&self) -> Result<Taxonomy, SyncError> {
        let path = self.taxonomy_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(SyncError::NotInitialized(self.root.clone()));
            }
            Err(err) => return Err(err.into()),
        };
        Ok(parse_taxonomy(&raw)?)
    }

    /// Every item document, sorted by id.
    pub fn read_items(&self) -> Result<Vec<WorkItem>, SyncError> {
        let _lock = self.lock(LockMode::Shared)?;
        self.load_items()
    }

    fn load_items(&self) -> Result<Vec<WorkItem>, SyncError> {
        let dir = self.items_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut items = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let raw = fs::read_to_string(&path)?;
            match serde_json::from_str::<WorkItem>(&raw) {
                Ok(item) => items.push(item),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping malformed item document");
                }
            }
        }
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    pub fn read_item(&self, id: &ItemId) -> Result<WorkItem, SyncError> {
        let _lock = self.lock(LockMode::Shared)?;
        self.load_item(id)
    }

    fn load_item(&self, id: &ItemId) -> Result<WorkItem, SyncError> {
        match fs::read_to_string(self.item_path(id)) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(SyncError::NotFound(id.clone())),
            Err(err) => Err(err.into()),
        }
    }

    /// Create or replace a whole item document.
    pub fn put_item(&self, item: &WorkItem) -> Result<(), SyncError> {
        let snapshot = {
            let _lock = self.lock(LockMode::Exclusive)?;
            fs::create_dir_all(self.items_dir())?;
            write_json(&self.item_path(&item.id), item)?;
            self.load_items()
        };
        tracing::debug!(item = %item.id, "file store wrote item document");
        self.publish_items(snapshot);
        Ok(())
    }

    /// Queued pending commits, empty when none were saved.
    pub fn read_pending<T: DeserializeOwned>(&self) -> Result<Vec<T>, SyncError> {
        let _lock = self.lock(LockMode::Shared)?;
        match fs::read_to_string(self.root.join(PENDING_FILE)) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    /// Replace the saved pending commits; an empty list removes the file.
    pub fn write_pending<T: Serialize>(&self, pending: &[T]) -> Result<(), SyncError> {
        let _lock = self.lock(LockMode::Exclusive)?;
        let path = self.root.join(PENDING_FILE);
        if pending.is_empty() {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
            return Ok(());
        }
        write_json(&path, pending)
    }

    /// Push an item snapshot taken after a write. The write already
    /// happened, so a failed snapshot is only logged.
    fn publish_items(&self, snapshot: Result<Vec<WorkItem>, SyncError>) {
        match snapshot {
            Ok(items) => self.subscribers.notify_items(&items),
            Err(err) => tracing::warn!(
                root = %self.root.display(),
                error = %err,
                "write is on disk but the item snapshot could not be read; subscribers not notified"
            ),
        }
    }
}

impl SyncAdapter for FileStore {
    fn subscribe_taxonomy(&self, callback: TaxonomyCallback) -> Result<SubscriptionId, SyncError> {
        let taxonomy = self.read_taxonomy()?;
        let id = self.subscribers.add_taxonomy(callback.clone());
        callback(&taxonomy);
        Ok(id)
    }

    fn subscribe_items(
        &self,
        filter: ItemFilter,
        callback: ItemsCallback,
    ) -> Result<SubscriptionId, SyncError> {
        let items = self.read_items()?;
        let id = self.subscribers.add_items(filter.clone(), callback.clone());
        Subscribers::deliver_items(&filter, &items, &callback);
        Ok(id)
    }

    fn unsubscribe(&self, subscription: SubscriptionId) {
        self.subscribers.remove(subscription);
    }

    fn write_taxonomy(&self, taxonomy: &Taxonomy) -> Result<(), SyncError> {
        {
            let _lock = self.lock(LockMode::Exclusive)?;
            let stored = self.load_taxonomy()?;
            check_version(self.mode, stored.version(), taxonomy.version())?;
            write_json(&self.taxonomy_path(), &TaxonomyDocument::from(taxonomy))?;
        }
        tracing::debug!(version = taxonomy.version(), "file store wrote taxonomy");
        self.subscribers.notify_taxonomy(taxonomy);
        Ok(())
    }

    fn write_item_fields(&self, item_id: &ItemId, patch: &ItemPatch) -> Result<(), SyncError> {
        let snapshot = {
            let _lock = self.lock(LockMode::Exclusive)?;
            let mut item = self.load_item(item_id)?;
            patch_item(&mut item, patch)?;
            write_json(&self.item_path(item_id), &item)?;
            self.load_items()
        };
        tracing::debug!(item = %item_id, "file store wrote item fields");
        self.publish_items(snapshot);
        Ok(())
    }

    /// Re-read both document kinds from disk and push them to subscribers.
    fn refresh(&self) -> Result<(), SyncError> {
        if !self.is_initialized() {
            return Err(SyncError::NotInitialized(self.root.clone()));
        }
        let (taxonomy, items) = {
            let _lock = self.lock(LockMode::Shared)?;
            (self.load_taxonomy()?, self.load_items()?)
        };
        self.subscribers.notify_taxonomy(&taxonomy);
        self.subscribers.notify_items(&items);
        Ok(())
    }
}

/// File-name-safe digest of an item id.
fn item_digest(id: &ItemId) -> String {
    blake3::hash(id.as_str().as_bytes()).to_hex()[..32].to_string()
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), SyncError> {
    let mut encoded = serde_json::to_vec_pretty(value)?;
    encoded.push(b'\n');
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &encoded)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
