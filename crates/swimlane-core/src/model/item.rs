use serde::{Deserialize, Serialize};
use std::{borrow::Borrow, collections::BTreeMap, fmt};

use super::stage::StageId;
use super::status::Status;

/// Opaque work item (project) identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Borrow<str> for ItemId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// The board-relevant view of a work item document.
///
/// Items are owned by other collaborators; fields this crate does not know
/// about are carried in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub id: ItemId,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory_id: Option<StageId>,
    /// Milliseconds since the Unix epoch of the last board write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<i64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, status: Status, subcategory_id: Option<StageId>) -> Self {
        Self {
            id: ItemId::new(id),
            status,
            subcategory_id,
            last_updated: None,
            extra: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn placement(&self) -> Placement {
        Placement {
            status: self.status,
            subcategory_id: self.subcategory_id.clone(),
        }
    }

    /// True when the item sits at exactly `(status, stage)`.
    #[must_use]
    pub fn is_at(&self, status: Status, stage: Option<&StageId>) -> bool {
        self.status == status && self.subcategory_id.as_ref() == stage
    }

    /// Apply a board patch in place. Fields outside the patch are untouched.
    pub fn apply(&mut self, patch: &ItemPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        match &patch.subcategory {
            SubcategoryUpdate::Keep => {}
            SubcategoryUpdate::Clear => self.subcategory_id = None,
            SubcategoryUpdate::Set(stage_id) => self.subcategory_id = Some(stage_id.clone()),
        }
        self.last_updated = Some(patch.last_updated);
    }
}

/// Where an item sits on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory_id: Option<StageId>,
}

/// How a patch treats `subcategoryId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "stageId", rename_all = "lowercase")]
pub enum SubcategoryUpdate {
    Keep,
    Clear,
    Set(StageId),
}

impl From<Option<StageId>> for SubcategoryUpdate {
    fn from(value: Option<StageId>) -> Self {
        value.map_or(Self::Clear, Self::Set)
    }
}

/// The partial fields written for one item by a move or a migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    pub subcategory: SubcategoryUpdate,
    pub last_updated: i64,
    /// Where the item must still be for the patch to apply. Stores check
    /// this under their own lock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Placement>,
}

impl ItemPatch {
    /// Patch for a user move: status and phase are both written.
    #[must_use]
    pub fn moved_to(status: Status, stage_id: Option<StageId>, now_ms: i64) -> Self {
        Self {
            status: Some(status),
            subcategory: stage_id.into(),
            last_updated: now_ms,
            expected: None,
        }
    }

    /// Patch for a migration: only the phase changes.
    #[must_use]
    pub fn migrated_to(stage_id: Option<StageId>, now_ms: i64) -> Self {
        Self {
            status: None,
            subcategory: stage_id.into(),
            last_updated: now_ms,
            expected: None,
        }
    }

    /// Only apply while the item is still at `placement`.
    #[must_use]
    pub fn expecting(mut self, placement: Placement) -> Self {
        self.expected = Some(placement);
        self
    }

    /// False when the patch expects the item somewhere else.
    #[must_use]
    pub fn applies_to(&self, item: &WorkItem) -> bool {
        self.expected
            .as_ref()
            .is_none_or(|expected| item.is_at(expected.status, expected.subcategory_id.as_ref()))
    }
}
