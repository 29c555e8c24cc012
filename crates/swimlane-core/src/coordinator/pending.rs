//! Taxonomy edits waiting on item migrations.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{ItemId, StageId, Status};
use crate::taxonomy::{StageEdit, StageRemoval};

/// A taxonomy edit that has not been written because some of its item
/// migrations are still failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCommit {
    pub id: u64,
    /// Taxonomy version the edits were last applied to.
    pub base_version: u64,
    pub edits: Vec<StageEdit>,
    /// Items whose migration has not been written yet.
    pub outstanding: BTreeSet<ItemId>,
    pub queued_at: i64,
    #[serde(default)]
    pub attempts: u32,
}

impl PendingCommit {
    /// Stages this commit removes.
    pub fn removed_stages(&self) -> impl Iterator<Item = (Status, &StageId)> {
        self.edits.iter().filter_map(|edit| match edit {
            StageEdit::RemoveStage { status, stage_id } => Some((*status, stage_id)),
            _ => None,
        })
    }
}

/// Queued commits plus the removals of commits still in flight.
///
/// A reservation holds a status from the moment a removing commit starts
/// until it finishes, so two removals in one status never overlap.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    next_id: u64,
    commits: Vec<PendingCommit>,
    next_token: u64,
    reserved: BTreeMap<u64, Vec<(Status, StageId)>>,
}

impl PendingQueue {
    pub(crate) fn list(&self) -> Vec<PendingCommit> {
        self.commits.clone()
    }

    #[cfg(test)]
    pub(crate) fn get(&self, id: u64) -> Option<&PendingCommit> {
        self.commits.iter().find(|commit| commit.id == id)
    }

    /// Queue a new commit or refresh an existing one; returns its id.
    pub(crate) fn upsert(
        &mut self,
        id: Option<u64>,
        base_version: u64,
        edits: &[StageEdit],
        outstanding: BTreeSet<ItemId>,
        now_ms: i64,
    ) -> u64 {
        if let Some(existing) = id.and_then(|id| self.commits.iter_mut().find(|c| c.id == id)) {
            existing.base_version = base_version;
            existing.edits = edits.to_vec();
            existing.outstanding = outstanding;
            existing.attempts += 1;
            return existing.id;
        }

        self.next_id += 1;
        let id = self.next_id;
        self.commits.push(PendingCommit {
            id,
            base_version,
            edits: edits.to_vec(),
            outstanding,
            queued_at: now_ms,
            attempts: 1,
        });
        id
    }

    pub(crate) fn remove(&mut self, id: u64) -> Option<PendingCommit> {
        let idx = self.commits.iter().position(|commit| commit.id == id)?;
        Some(self.commits.remove(idx))
    }

    /// Replace the queue with restored commits.
    pub(crate) fn restore(&mut self, commits: Vec<PendingCommit>) {
        self.next_id = commits.iter().map(|c| c.id).max().unwrap_or(0).max(self.next_id);
        self.commits = commits;
    }

    /// Claim the statuses of `removals` for an in-flight commit.
    ///
    /// Fails with the blocking removal if a queued or in-flight commit
    /// already removes a stage in one of them.
    pub(crate) fn reserve(&mut self, removals: &[StageRemoval]) -> Result<u64, (Status, StageId)> {
        for removal in removals {
            if let Some(stage_id) = self.removal_in(removal.status) {
                return Err((removal.status, stage_id.clone()));
            }
        }
        self.next_token += 1;
        let token = self.next_token;
        self.reserved.insert(
            token,
            removals
                .iter()
                .map(|removal| (removal.status, removal.removed.id.clone()))
                .collect(),
        );
        Ok(token)
    }

    pub(crate) fn release(&mut self, token: u64) {
        self.reserved.remove(&token);
    }

    fn removals(&self) -> impl Iterator<Item = (Status, &StageId)> {
        self.commits
            .iter()
            .flat_map(PendingCommit::removed_stages)
            .chain(
                self.reserved
                    .values()
                    .flatten()
                    .map(|(status, stage_id)| (*status, stage_id)),
            )
    }

    pub(crate) fn stage_ids(&self) -> BTreeSet<StageId> {
        self.removals().map(|(_, id)| id.clone()).collect()
    }

    /// A pending or in-flight removal in `status`, if any.
    pub(crate) fn removal_in(&self, status: Status) -> Option<&StageId> {
        self.removals()
            .find(|(s, _)| *s == status)
            .map(|(_, id)| id)
    }
}
