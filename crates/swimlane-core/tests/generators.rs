//! Shared proptest strategies for taxonomies, item sets and edit sequences.

#![allow(dead_code)]

use proptest::prelude::*;
use proptest::sample::Index;

use swimlane_core::model::{StageGroup, StageId, Status, WorkItem};
use swimlane_core::taxonomy::Taxonomy;

pub const MAX_STAGES: usize = 6;

/// A valid taxonomy with 1..=6 stages per status and ids `<slug>-<n>`.
pub fn arb_taxonomy() -> impl Strategy<Value = Taxonomy> {
    proptest::collection::vec(1usize..=MAX_STAGES, 4).prop_map(|sizes| {
        let groups = Status::ALL
            .into_iter()
            .zip(sizes)
            .map(|(status, n)| {
                StageGroup::from_titles(
                    status,
                    status.as_str(),
                    (1..=n).map(|i| format!("Stage {i}")),
                    |idx| StageId::new(format!("{}-{}", status.slug(), idx + 1)),
                )
            })
            .collect();
        Taxonomy::new(0, groups).expect("generated taxonomy is valid")
    })
}

/// Items placed on random stages of `taxonomy`, some without a phase.
pub fn arb_items(taxonomy: Taxonomy, max: usize) -> impl Strategy<Value = Vec<WorkItem>> {
    proptest::collection::vec((0usize..4, any::<Index>(), any::<bool>()), 0..max).prop_map(
        move |specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(n, (status_idx, stage, placed))| {
                    let status = Status::ALL[status_idx];
                    let group = taxonomy.group(status).expect("every status has a group");
                    let stage_id = placed.then(|| stage.get(&group.stages).id.clone());
                    WorkItem::new(format!("item-{n}"), status, stage_id)
                })
                .collect()
        },
    )
}

/// A taxonomy together with items placed on it.
pub fn arb_board(max_items: usize) -> impl Strategy<Value = (Taxonomy, Vec<WorkItem>)> {
    arb_taxonomy().prop_flat_map(move |taxonomy| {
        let items = arb_items(taxonomy.clone(), max_items);
        (Just(taxonomy), items)
    })
}

/// One taxonomy edit, resolved against whatever the taxonomy looks like
/// when it is applied.
#[derive(Debug, Clone)]
pub enum EditOp {
    Add { status: usize, title: String },
    Remove { status: usize, stage: Index },
    Rotate { status: usize, by: usize },
    Rename { status: usize, stage: Index, title: String },
}

impl EditOp {
    pub fn status(&self) -> Status {
        let idx = match self {
            Self::Add { status, .. }
            | Self::Remove { status, .. }
            | Self::Rotate { status, .. }
            | Self::Rename { status, .. } => *status,
        };
        Status::ALL[idx]
    }
}

pub fn arb_edit() -> impl Strategy<Value = EditOp> {
    prop_oneof![
        (0usize..4, "[A-Z][a-z]{1,8}").prop_map(|(status, title)| EditOp::Add { status, title }),
        (0usize..4, any::<Index>()).prop_map(|(status, stage)| EditOp::Remove { status, stage }),
        (0usize..4, 0usize..MAX_STAGES).prop_map(|(status, by)| EditOp::Rotate { status, by }),
        (0usize..4, any::<Index>(), "[a-z]{1,8}")
            .prop_map(|(status, stage, title)| EditOp::Rename { status, stage, title }),
    ]
}

/// Stage ids of `status`, in display order.
pub fn ids_of(taxonomy: &Taxonomy, status: Status) -> Vec<StageId> {
    taxonomy
        .group(status)
        .expect("every status has a group")
        .stage_ids()
        .cloned()
        .collect()
}
