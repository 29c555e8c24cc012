//! Two-phase taxonomy editing.
//!
//! A [`TaxonomyDraft`] pairs the committed taxonomy it started from with a
//! working copy and the log of [`StageEdit`]s applied to it. Nothing is
//! visible to other readers until the draft is committed; `discard` throws
//! the working copy away.
//!
//! Because the log is kept, a draft can be replayed on top of a newer
//! taxonomy ([`TaxonomyDraft::rebase`]). Add-stage edits carry the id they
//! were given, so a replay produces the same ids.

use serde::{Deserialize, Serialize};

use super::{StageIdGenerator, StageRemoval, Taxonomy, TaxonomyError};
use crate::model::{StageId, StagePatch, Status};

/// One taxonomy edit, as recorded in a draft log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "edit", rename_all = "snake_case")]
pub enum StageEdit {
    RenameGroup {
        status: Status,
        title: String,
    },
    AddStage {
        status: Status,
        stage_id: StageId,
        title: String,
    },
    RemoveStage {
        status: Status,
        stage_id: StageId,
    },
    Reorder {
        status: Status,
        stage_ids: Vec<StageId>,
    },
    EditStage {
        status: Status,
        stage_id: StageId,
        patch: StagePatch,
    },
}

impl StageEdit {
    #[must_use]
    pub const fn status(&self) -> Status {
        match self {
            Self::RenameGroup { status, .. }
            | Self::AddStage { status, .. }
            | Self::RemoveStage { status, .. }
            | Self::Reorder { status, .. }
            | Self::EditStage { status, .. } => *status,
        }
    }

    /// Apply to `taxonomy`. Returns the removal record for `RemoveStage`.
    pub fn apply_to(&self, taxonomy: &mut Taxonomy) -> Result<Option<StageRemoval>, TaxonomyError> {
        match self {
            Self::RenameGroup { status, title } => {
                taxonomy.rename_group_title(*status, title.clone())?;
            }
            Self::AddStage {
                status,
                stage_id,
                title,
            } => taxonomy.insert_stage(*status, stage_id.clone(), title.clone())?,
            Self::RemoveStage { status, stage_id } => {
                return taxonomy.remove_stage(*status, stage_id).map(Some);
            }
            Self::Reorder { status, stage_ids } => taxonomy.reorder_stages(*status, stage_ids)?,
            Self::EditStage {
                status,
                stage_id,
                patch,
            } => taxonomy.edit_stage(*status, stage_id, patch)?,
        }
        Ok(None)
    }
}

/// Uncommitted working copy of the taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonomyDraft {
    base: Taxonomy,
    working: Taxonomy,
    edits: Vec<StageEdit>,
    removals: Vec<StageRemoval>,
}

impl TaxonomyDraft {
    #[must_use]
    pub fn new(base: Taxonomy) -> Self {
        Self {
            working: base.clone(),
            base,
            edits: Vec::new(),
            removals: Vec::new(),
        }
    }

    /// Rebuild a draft by applying `edits` to `base` in order.
    pub fn replay(base: Taxonomy, edits: &[StageEdit]) -> Result<Self, TaxonomyError> {
        let mut draft = Self::new(base);
        for edit in edits {
            draft.apply(edit.clone())?;
        }
        Ok(draft)
    }

    /// The committed taxonomy this draft started from.
    #[must_use]
    pub const fn base(&self) -> &Taxonomy {
        &self.base
    }

    /// The taxonomy as it would look if committed now.
    #[must_use]
    pub const fn working(&self) -> &Taxonomy {
        &self.working
    }

    #[must_use]
    pub fn edits(&self) -> &[StageEdit] {
        &self.edits
    }

    /// Stages removed by this draft, in the order they were removed.
    #[must_use]
    pub fn removals(&self) -> &[StageRemoval] {
        &self.removals
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Apply one edit to the working copy. A failed edit is not logged and
    /// leaves the working copy as it was.
    pub fn apply(&mut self, edit: StageEdit) -> Result<Option<StageRemoval>, TaxonomyError> {
        let removal = edit.apply_to(&mut self.working)?;
        if let Some(removal) = &removal {
            self.removals.push(removal.clone());
        }
        self.edits.push(edit);
        Ok(removal)
    }

    pub fn rename_group_title(
        &mut self,
        status: Status,
        title: impl Into<String>,
    ) -> Result<(), TaxonomyError> {
        self.apply(StageEdit::RenameGroup {
            status,
            title: title.into(),
        })
        .map(drop)
    }

    /// Add a stage, generating its id against the working copy.
    pub fn add_stage(
        &mut self,
        status: Status,
        title: impl Into<String>,
        ids: &StageIdGenerator,
    ) -> Result<StageId, TaxonomyError> {
        let title = title.into();
        if self.working.group(status).is_none() {
            return Err(TaxonomyError::InvalidState(format!(
                "no stage group for {status}"
            )));
        }
        let stage_id = ids.next(&title, |candidate| {
            self.working.contains_stage(candidate) || self.base.contains_stage(candidate)
        });
        self.apply(StageEdit::AddStage {
            status,
            stage_id: stage_id.clone(),
            title,
        })?;
        Ok(stage_id)
    }

    pub fn remove_stage(
        &mut self,
        status: Status,
        stage_id: &StageId,
    ) -> Result<StageRemoval, TaxonomyError> {
        let removal = self.apply(StageEdit::RemoveStage {
            status,
            stage_id: stage_id.clone(),
        })?;
        removal.ok_or_else(|| TaxonomyError::InvalidState("removal produced no record".into()))
    }

    pub fn reorder_stages(
        &mut self,
        status: Status,
        stage_ids: &[StageId],
    ) -> Result<(), TaxonomyError> {
        self.apply(StageEdit::Reorder {
            status,
            stage_ids: stage_ids.to_vec(),
        })
        .map(drop)
    }

    pub fn edit_stage(
        &mut self,
        status: Status,
        stage_id: &StageId,
        patch: StagePatch,
    ) -> Result<(), TaxonomyError> {
        self.apply(StageEdit::EditStage {
            status,
            stage_id: stage_id.clone(),
            patch,
        })
        .map(drop)
    }

    /// Replay this draft's edits on top of `onto`.
    pub fn rebase(&self, onto: Taxonomy) -> Result<Self, TaxonomyError> {
        Self::replay(onto, &self.edits)
    }

    /// Finish the draft: the working copy, one version past the base.
    #[must_use]
    pub fn commit(self) -> Taxonomy {
        let mut next = self.working;
        next.set_version(self.base.version() + 1);
        next
    }

    /// Abandon the draft and get the untouched base back.
    #[must_use]
    pub fn discard(self) -> Taxonomy {
        self.base
    }
}
