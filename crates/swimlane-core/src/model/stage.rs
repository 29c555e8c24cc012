use serde::{Deserialize, Serialize};
use std::{borrow::Borrow, fmt};

use super::status::Status;

/// Opaque stage identifier, unique across the whole taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(String);

impl StageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for StageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for StageId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// One phase inside a status column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Stage {
    pub id: StageId,
    pub title: String,
    /// Dense 1-based rank within the owning group.
    pub order: u32,
}

/// Partial update applied by `edit_stage`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl StagePatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
        }
    }
}

/// A status column and its ordered stages.
///
/// `stages` is always kept sorted by `order`, so a stage's index is
/// `order - 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageGroup {
    pub status: Status,
    pub title: String,
    pub stages: Vec<Stage>,
}

impl StageGroup {
    /// Build a group from titles, assigning ids with `id_for(position)`.
    pub fn from_titles<I, S>(
        status: Status,
        title: impl Into<String>,
        titles: I,
        mut id_for: impl FnMut(usize) -> StageId,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut group = Self {
            status,
            title: title.into(),
            stages: titles
                .into_iter()
                .enumerate()
                .map(|(idx, title)| Stage {
                    id: id_for(idx),
                    title: title.into(),
                    order: 0,
                })
                .collect(),
        };
        group.repack();
        group
    }

    #[must_use]
    pub fn stage(&self, id: &str) -> Option<&Stage> {
        self.stages.iter().find(|stage| stage.id.as_str() == id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.stage(id).is_some()
    }

    /// Zero-based position of `id` in display order.
    #[must_use]
    pub fn position(&self, id: &str) -> Option<usize> {
        self.stages.iter().position(|stage| stage.id.as_str() == id)
    }

    pub fn stage_ids(&self) -> impl Iterator<Item = &StageId> {
        self.stages.iter().map(|stage| &stage.id)
    }

    /// True when `order` values are exactly `1..=len` in sequence.
    #[must_use]
    pub fn is_dense(&self) -> bool {
        self.stages
            .iter()
            .enumerate()
            .all(|(idx, stage)| usize::try_from(stage.order).is_ok_and(|order| order == idx + 1))
    }

    /// Rewrite `order` from position.
    pub(crate) fn repack(&mut self) {
        for (rank, stage) in (1u32..).zip(self.stages.iter_mut()) {
            stage.order = rank;
        }
    }
}
