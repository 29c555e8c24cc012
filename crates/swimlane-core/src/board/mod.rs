//! Board projection: taxonomy + items → columns of phase buckets.
//!
//! Projection is a pure function recomputed from scratch on every change.
//! Items are distributed in a single pass and keep their input order inside
//! each bucket.

pub mod live;

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use crate::model::{StageId, Status, WorkItem};
use crate::taxonomy::Taxonomy;

pub use live::{LiveBoard, PendingSource};
pub(crate) use live::LiveShared;

/// Items on one stage of a column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseBucket {
    pub stage_id: StageId,
    pub title: String,
    pub order: u32,
    /// The stage is being removed and waits on item migrations.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub pending_removal: bool,
    pub items: Vec<WorkItem>,
}

/// One status column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub status: Status,
    pub title: String,
    /// Every item with this status, whatever its phase.
    pub total: usize,
    pub phases: Vec<PhaseBucket>,
    /// Items of this status with no phase or a phase not in this column.
    pub unassigned: Vec<WorkItem>,
}

/// A renderable board. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardProjection {
    pub version: u64,
    pub columns: Vec<Column>,
}

/// Build the board for `taxonomy` and `items`.
#[must_use]
pub fn project(taxonomy: &Taxonomy, items: &[WorkItem]) -> BoardProjection {
    let mut columns: Vec<Column> = taxonomy
        .groups()
        .iter()
        .map(|group| Column {
            status: group.status,
            title: group.title.clone(),
            total: 0,
            phases: group
                .stages
                .iter()
                .map(|stage| PhaseBucket {
                    stage_id: stage.id.clone(),
                    title: stage.title.clone(),
                    order: stage.order,
                    pending_removal: false,
                    items: Vec::new(),
                })
                .collect(),
            unassigned: Vec::new(),
        })
        .collect();

    let column_of: HashMap<Status, usize> = columns
        .iter()
        .enumerate()
        .map(|(idx, column)| (column.status, idx))
        .collect();
    let bucket_of: HashMap<(Status, &str), usize> = taxonomy
        .groups()
        .iter()
        .flat_map(|group| {
            group
                .stages
                .iter()
                .enumerate()
                .map(move |(idx, stage)| ((group.status, stage.id.as_str()), idx))
        })
        .collect();

    for item in items {
        let Some(&col) = column_of.get(&item.status) else {
            continue;
        };
        let column = &mut columns[col];
        column.total += 1;
        let bucket = item
            .subcategory_id
            .as_ref()
            .and_then(|id| bucket_of.get(&(item.status, id.as_str())));
        match bucket {
            Some(&idx) => column.phases[idx].items.push(item.clone()),
            None => column.unassigned.push(item.clone()),
        }
    }

    tracing::debug!(
        version = taxonomy.version(),
        items = items.len(),
        "projected board"
    );

    BoardProjection {
        version: taxonomy.version(),
        columns,
    }
}

impl BoardProjection {
    #[must_use]
    pub fn column(&self, status: Status) -> Option<&Column> {
        self.columns.iter().find(|column| column.status == status)
    }

    #[must_use]
    pub fn bucket(&self, status: Status, stage_id: &str) -> Option<&PhaseBucket> {
        self.column(status)?
            .phases
            .iter()
            .find(|bucket| bucket.stage_id.as_str() == stage_id)
    }

    /// Where an item is shown: its column and, if placed, its stage.
    #[must_use]
    pub fn locate(&self, item_id: &str) -> Option<(Status, Option<&StageId>)> {
        self.columns.iter().find_map(|column| {
            column
                .phases
                .iter()
                .find(|bucket| bucket.items.iter().any(|item| item.id.as_str() == item_id))
                .map(|bucket| (column.status, Some(&bucket.stage_id)))
                .or_else(|| {
                    column
                        .unassigned
                        .iter()
                        .any(|item| item.id.as_str() == item_id)
                        .then_some((column.status, None))
                })
        })
    }

    /// Flag the buckets of stages awaiting removal.
    pub fn mark_pending(&mut self, pending: &BTreeSet<StageId>) {
        if pending.is_empty() {
            return;
        }
        for bucket in self.columns.iter_mut().flat_map(|column| &mut column.phases) {
            bucket.pending_removal = pending.contains(&bucket.stage_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::seed::default_seed;

    fn items() -> Vec<WorkItem> {
        vec![
            WorkItem::new("w1", Status::Draft, Some("draft-1".into())),
            WorkItem::new("w2", Status::Draft, Some("draft-2".into())),
            WorkItem::new("w3", Status::Draft, Some("draft-1".into())),
            WorkItem::new("w4", Status::Draft, None),
            WorkItem::new("w5", Status::Completed, Some("draft-1".into())),
        ]
    }

    fn item_ids(items: &[WorkItem]) -> Vec<&str> {
        items.iter().map(|item| item.id.as_str()).collect()
    }

    #[test]
    fn buckets_keep_input_order() {
        let board = project(&default_seed(), &items());
        let bucket = board.bucket(Status::Draft, "draft-1").unwrap();
        assert_eq!(item_ids(&bucket.items), vec!["w1", "w3"]);
        assert_eq!(board.column(Status::Draft).unwrap().total, 4);
    }

    #[test]
    fn unplaced_items_are_surfaced_in_their_column() {
        let board = project(&default_seed(), &items());
        assert_eq!(
            item_ids(&board.column(Status::Draft).unwrap().unassigned),
            vec!["w4"]
        );
        // A phase from another column does not place the item.
        let done = board.column(Status::Completed).unwrap();
        assert_eq!(done.total, 1);
        assert_eq!(item_ids(&done.unassigned), vec!["w5"]);
        assert!(done.phases.iter().all(|bucket| bucket.items.is_empty()));
    }

    #[test]
    fn projection_is_idempotent() {
        let t = default_seed();
        let items = items();
        assert_eq!(project(&t, &items), project(&t, &items));
    }

    #[test]
    fn columns_follow_group_order() {
        let board = project(&default_seed(), &[]);
        let statuses: Vec<Status> = board.columns.iter().map(|c| c.status).collect();
        assert_eq!(statuses, Status::ALL.to_vec());
        assert_eq!(board.version, 0);
    }

    #[test]
    fn locate_finds_bucket_or_unassigned() {
        let board = project(&default_seed(), &items());
        assert_eq!(
            board.locate("w2"),
            Some((Status::Draft, Some(&StageId::new("draft-2"))))
        );
        assert_eq!(board.locate("w4"), Some((Status::Draft, None)));
        assert_eq!(board.locate("nope"), None);
    }

    #[test]
    fn mark_pending_flags_matching_buckets() {
        let mut board = project(&default_seed(), &items());
        board.mark_pending(&BTreeSet::from([StageId::new("draft-2")]));
        assert!(board.bucket(Status::Draft, "draft-2").unwrap().pending_removal);
        assert!(!board.bucket(Status::Draft, "draft-1").unwrap().pending_removal);
    }
}
