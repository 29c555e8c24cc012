//! The stage taxonomy: one [`StageGroup`] per [`Status`], each holding an
//! ordered, non-empty list of stages.
//!
//! # Invariants
//!
//! - Every status has exactly one group; group sequence order is column order.
//! - Every group has at least one stage.
//! - Stage ids are unique across the whole taxonomy.
//! - Within a group, `order` is `1..=N` with no gaps or duplicates.
//!
//! Every editing method checks its preconditions before touching anything,
//! so a returned error means the taxonomy is unchanged.

pub mod document;
pub mod draft;
pub mod ids;
pub mod seed;
pub mod store;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::ErrorCode;
use crate::model::{Stage, StageGroup, StageId, StagePatch, Status};

pub use document::{DocumentError, TaxonomyDocument, parse_taxonomy};
pub use draft::{StageEdit, TaxonomyDraft};
pub use ids::StageIdGenerator;
pub use store::TaxonomyStore;

/// Validation failure of a taxonomy edit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaxonomyError {
    #[error("unknown status '{got}'")]
    UnknownStatus { got: String },

    #[error("stage '{stage_id}' does not exist in {status}")]
    UnknownStage { status: Status, stage_id: StageId },

    #[error("cannot remove '{stage_id}': it is the last stage of {status}")]
    LastStageViolation { status: Status, stage_id: StageId },

    #[error("invalid stage order for {status}: {reason}")]
    InvalidPermutation { status: Status, reason: String },

    #[error("invalid taxonomy state: {0}")]
    InvalidState(String),
}

impl TaxonomyError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownStatus { .. } => ErrorCode::UnknownStatus,
            Self::UnknownStage { .. } => ErrorCode::UnknownStage,
            Self::LastStageViolation { .. } => ErrorCode::LastStageViolation,
            Self::InvalidPermutation { .. } => ErrorCode::InvalidPermutation,
            Self::InvalidState(_) => ErrorCode::InvalidState,
        }
    }
}

/// Record of a stage removal, enough for the migration resolver to pick a
/// replacement without seeing the pre-removal taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRemoval {
    pub status: Status,
    pub removed: Stage,
    /// Stage immediately before the removed one, in pre-removal order.
    pub predecessor: Option<StageId>,
    /// Stage immediately after the removed one, in pre-removal order.
    pub successor: Option<StageId>,
}

/// The validated taxonomy.
///
/// Serializes through [`TaxonomyDocument`], so deserializing a `Taxonomy`
/// runs the full boundary validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "TaxonomyDocument", try_from = "TaxonomyDocument")]
pub struct Taxonomy {
    version: u64,
    groups: Vec<StageGroup>,
}

impl Taxonomy {
    /// Validate `groups` and wrap them at `version`.
    pub fn new(version: u64, groups: Vec<StageGroup>) -> Result<Self, DocumentError> {
        document::validate_groups(&groups)?;
        Ok(Self { version, groups })
    }

    /// Monotonic edit counter; bumped by one on each committed edit.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    #[must_use]
    pub fn groups(&self) -> &[StageGroup] {
        &self.groups
    }

    #[must_use]
    pub fn group(&self, status: Status) -> Option<&StageGroup> {
        self.groups.iter().find(|group| group.status == status)
    }

    fn group_mut(&mut self, status: Status) -> Result<&mut StageGroup, TaxonomyError> {
        self.groups
            .iter_mut()
            .find(|group| group.status == status)
            .ok_or_else(|| TaxonomyError::InvalidState(format!("no stage group for {status}")))
    }

    /// Locate a stage anywhere in the taxonomy.
    #[must_use]
    pub fn find_stage(&self, stage_id: &str) -> Option<(Status, &Stage)> {
        self.groups.iter().find_map(|group| {
            group
                .stage(stage_id)
                .map(|stage| (group.status, stage))
        })
    }

    #[must_use]
    pub fn contains_stage(&self, stage_id: &str) -> bool {
        self.find_stage(stage_id).is_some()
    }

    /// True when `(status, stage)` names an existing stage of that status, or
    /// `stage` is `None`.
    #[must_use]
    pub fn resolves(&self, status: Status, stage: Option<&StageId>) -> bool {
        stage.is_none_or(|id| self.group(status).is_some_and(|group| group.contains(id.as_str())))
    }

    /// Require that `stage_id` exists in `status`'s group.
    pub fn require_stage(&self, status: Status, stage_id: &StageId) -> Result<&Stage, TaxonomyError> {
        self.group(status)
            .and_then(|group| group.stage(stage_id.as_str()))
            .ok_or_else(|| TaxonomyError::UnknownStage {
                status,
                stage_id: stage_id.clone(),
            })
    }

    /// Change a column's display title. Stages are untouched.
    pub fn rename_group_title(
        &mut self,
        status: Status,
        title: impl Into<String>,
    ) -> Result<(), TaxonomyError> {
        self.group_mut(status)?.title = title.into();
        Ok(())
    }

    /// Append a stage with a freshly generated id.
    pub fn add_stage(
        &mut self,
        status: Status,
        title: impl Into<String>,
        ids: &StageIdGenerator,
    ) -> Result<StageId, TaxonomyError> {
        let title = title.into();
        self.group_mut(status)?;
        let stage_id = ids.next(&title, |candidate| self.contains_stage(candidate));
        self.insert_stage(status, stage_id.clone(), title)?;
        Ok(stage_id)
    }

    /// Append a stage with a caller-chosen id.
    pub fn insert_stage(
        &mut self,
        status: Status,
        stage_id: StageId,
        title: impl Into<String>,
    ) -> Result<(), TaxonomyError> {
        if stage_id.as_str().is_empty() {
            return Err(TaxonomyError::InvalidState("stage id must not be empty".into()));
        }
        if let Some((owner, _)) = self.find_stage(stage_id.as_str()) {
            return Err(TaxonomyError::InvalidState(format!(
                "stage id '{stage_id}' already exists in {owner}"
            )));
        }
        let group = self.group_mut(status)?;
        let order = u32::try_from(group.stages.len() + 1)
            .map_err(|_| TaxonomyError::InvalidState(format!("too many stages in {status}")))?;
        group.stages.push(Stage {
            id: stage_id,
            title: title.into(),
            order,
        });
        Ok(())
    }

    /// Remove a stage and re-pack the remaining orders.
    ///
    /// Rejects removal of a group's only stage. Work items are not touched;
    /// feed the returned [`StageRemoval`] to [`crate::migrate::resolve`].
    pub fn remove_stage(
        &mut self,
        status: Status,
        stage_id: &StageId,
    ) -> Result<StageRemoval, TaxonomyError> {
        let group = self.group_mut(status)?;
        let idx = group
            .position(stage_id.as_str())
            .ok_or_else(|| TaxonomyError::UnknownStage {
                status,
                stage_id: stage_id.clone(),
            })?;
        if group.stages.len() == 1 {
            return Err(TaxonomyError::LastStageViolation {
                status,
                stage_id: stage_id.clone(),
            });
        }

        let predecessor = idx
            .checked_sub(1)
            .map(|prev| group.stages[prev].id.clone());
        let successor = group.stages.get(idx + 1).map(|next| next.id.clone());
        let removed = group.stages.remove(idx);
        group.repack();

        Ok(StageRemoval {
            status,
            removed,
            predecessor,
            successor,
        })
    }

    /// Reorder a group's stages to match `stage_ids`, which must be a
    /// permutation of the group's current ids.
    pub fn reorder_stages(
        &mut self,
        status: Status,
        stage_ids: &[StageId],
    ) -> Result<(), TaxonomyError> {
        let group = self.group_mut(status)?;
        if stage_ids.len() != group.stages.len() {
            return Err(TaxonomyError::InvalidPermutation {
                status,
                reason: format!(
                    "expected {} stage ids, got {}",
                    group.stages.len(),
                    stage_ids.len()
                ),
            });
        }

        let mut seen = HashSet::with_capacity(stage_ids.len());
        let mut reordered = Vec::with_capacity(stage_ids.len());
        for id in stage_ids {
            if !seen.insert(id.as_str()) {
                return Err(TaxonomyError::InvalidPermutation {
                    status,
                    reason: format!("stage '{id}' listed more than once"),
                });
            }
            let stage = group
                .stage(id.as_str())
                .ok_or_else(|| TaxonomyError::InvalidPermutation {
                    status,
                    reason: format!("stage '{id}' is not in {status}"),
                })?;
            reordered.push(stage.clone());
        }

        group.stages = reordered;
        group.repack();
        Ok(())
    }

    /// Edit a stage's text fields in place.
    pub fn edit_stage(
        &mut self,
        status: Status,
        stage_id: &StageId,
        patch: &StagePatch,
    ) -> Result<(), TaxonomyError> {
        let group = self.group_mut(status)?;
        let stage = group
            .stages
            .iter_mut()
            .find(|stage| stage.id == *stage_id)
            .ok_or_else(|| TaxonomyError::UnknownStage {
                status,
                stage_id: stage_id.clone(),
            })?;
        if let Some(title) = &patch.title {
            stage.title.clone_from(title);
        }
        Ok(())
    }
}
