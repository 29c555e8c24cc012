//! Migration resolver: where do items go when their stage disappears?
//!
//! Every item sitting on a removed stage is sent to a single target: the
//! stage that preceded it, or the one that followed it if the removed stage
//! was first. Plans are data; writing them is the coordinator's job.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{ItemId, ItemPatch, StageId, Status, WorkItem};
use crate::taxonomy::StageRemoval;

/// Reassignment of the items left on one removed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub status: Status,
    pub removed_stage_id: StageId,
    pub affected_item_ids: BTreeSet<ItemId>,
    /// `None` only if the removed stage had no neighbours.
    pub new_subcategory_id: Option<StageId>,
}

impl MigrationPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.affected_item_ids.is_empty()
    }

    /// The item write this plan asks for, stamped `now_ms`.
    #[must_use]
    pub fn patch(&self, now_ms: i64) -> ItemPatch {
        ItemPatch::migrated_to(self.new_subcategory_id.clone(), now_ms)
    }
}

/// Resolve a single removal against `items`.
#[must_use]
pub fn resolve(removal: &StageRemoval, items: &[WorkItem]) -> MigrationPlan {
    let removed = &removal.removed.id;
    let affected_item_ids: BTreeSet<ItemId> = items
        .iter()
        .filter(|item| item.is_at(removal.status, Some(removed)))
        .map(|item| item.id.clone())
        .collect();

    let new_subcategory_id = if affected_item_ids.is_empty() {
        None
    } else {
        removal
            .predecessor
            .clone()
            .or_else(|| removal.successor.clone())
    };

    if !affected_item_ids.is_empty() {
        tracing::debug!(
            status = %removal.status,
            removed = %removed,
            target = ?new_subcategory_id,
            affected = affected_item_ids.len(),
            "resolved stage migration"
        );
    }

    MigrationPlan {
        status: removal.status,
        removed_stage_id: removed.clone(),
        affected_item_ids,
        new_subcategory_id,
    }
}

/// Resolve a sequence of removals, applying each plan to a scratch copy of
/// `items` before resolving the next.
///
/// An item pushed onto a stage that a later removal takes away follows that
/// removal too, so the plans compose to a final position on a surviving
/// stage. Returns one plan per removal, in order.
#[must_use]
pub fn resolve_removals(removals: &[StageRemoval], items: &[WorkItem]) -> Vec<MigrationPlan> {
    let mut scratch: Vec<WorkItem> = items
        .iter()
        .filter(|item| removals.iter().any(|r| r.status == item.status))
        .cloned()
        .collect();

    let mut plans = Vec::with_capacity(removals.len());
    for removal in removals {
        let plan = resolve(removal, &scratch);
        for item in &mut scratch {
            if plan.affected_item_ids.contains(&item.id) {
                item.subcategory_id.clone_from(&plan.new_subcategory_id);
            }
        }
        plans.push(plan);
    }
    plans
}

/// Collapse ordered plans into one target per item; later plans win.
#[must_use]
pub fn final_assignments(plans: &[MigrationPlan]) -> BTreeMap<ItemId, Option<StageId>> {
    let mut out = BTreeMap::new();
    for plan in plans {
        for id in &plan.affected_item_ids {
            out.insert(id.clone(), plan.new_subcategory_id.clone());
        }
    }
    out
}
