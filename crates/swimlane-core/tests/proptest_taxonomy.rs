use proptest::prelude::*;
use std::sync::Arc;

use swimlane_core::board::project;
use swimlane_core::clock::ManualClock;
use swimlane_core::coordinator::{Coordinator, RetryPolicy};
use swimlane_core::model::{StagePatch, Status};
use swimlane_core::sync::MemoryStore;
use swimlane_core::taxonomy::{StageIdGenerator, Taxonomy, TaxonomyError, TaxonomyStore};

#[path = "generators.rs"]
mod generators;
use generators::*;

fn apply(taxonomy: &mut Taxonomy, op: &EditOp, ids: &StageIdGenerator) -> Result<(), TaxonomyError> {
    let status = op.status();
    let current = ids_of(taxonomy, status);
    match op {
        EditOp::Add { title, .. } => taxonomy.add_stage(status, title.clone(), ids).map(drop),
        EditOp::Remove { stage, .. } => taxonomy
            .remove_stage(status, stage.get(&current))
            .map(drop),
        EditOp::Rotate { by, .. } => {
            let mut order = current;
            let len = order.len();
            order.rotate_left(by % len);
            taxonomy.reorder_stages(status, &order)
        }
        EditOp::Rename { stage, title, .. } => {
            taxonomy.edit_stage(status, stage.get(&current), &StagePatch::title(title.clone()))
        }
    }
}

fn assert_invariants(taxonomy: &Taxonomy) -> Result<(), TestCaseError> {
    prop_assert_eq!(taxonomy.groups().len(), 4);
    let mut seen = std::collections::HashSet::new();
    for group in taxonomy.groups() {
        prop_assert!(!group.stages.is_empty(), "{} has no stages", group.status);
        prop_assert!(group.is_dense(), "{} orders are not 1..N", group.status);
        for id in group.stage_ids() {
            prop_assert!(seen.insert(id.clone()), "duplicate stage id {}", id);
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn edits_preserve_structural_invariants(
        taxonomy in arb_taxonomy(),
        ops in proptest::collection::vec(arb_edit(), 0..40),
    ) {
        let ids = StageIdGenerator::new(Arc::new(ManualClock::new(1_700_000_000_000)));
        let mut taxonomy = taxonomy;
        for op in &ops {
            let before = taxonomy.clone();
            if let Err(err) = apply(&mut taxonomy, op, &ids) {
                prop_assert!(matches!(err, TaxonomyError::LastStageViolation { .. }), "{err}");
                prop_assert_eq!(&taxonomy, &before);
            }
            assert_invariants(&taxonomy)?;
        }
    }

    #[test]
    fn removing_a_singleton_stage_is_always_rejected(taxonomy in arb_taxonomy()) {
        let mut taxonomy = taxonomy;
        for status in Status::ALL {
            let ids = ids_of(&taxonomy, status);
            for id in ids.iter().skip(1) {
                taxonomy.remove_stage(status, id).unwrap();
            }
            let before = taxonomy.clone();
            let err = taxonomy.remove_stage(status, &ids[0]).unwrap_err();
            let is_last_stage = matches!(err, TaxonomyError::LastStageViolation { .. });
            prop_assert!(is_last_stage);
            prop_assert_eq!(&taxonomy, &before);
        }
    }

    #[test]
    fn reorder_round_trip_restores_orders(taxonomy in arb_taxonomy(), by in 0usize..MAX_STAGES) {
        let mut taxonomy = taxonomy;
        let original = taxonomy.clone();
        for status in Status::ALL {
            let ids = ids_of(&taxonomy, status);
            let mut rotated = ids.clone();
            let len = rotated.len();
            rotated.rotate_left(by % len);
            taxonomy.reorder_stages(status, &rotated).unwrap();
            prop_assert_eq!(ids_of(&taxonomy, status), rotated);
            taxonomy.reorder_stages(status, &ids).unwrap();
        }
        prop_assert_eq!(taxonomy, original);
    }

    #[test]
    fn projection_accounts_for_every_item((taxonomy, items) in arb_board(40)) {
        let board = project(&taxonomy, &items);
        prop_assert_eq!(&board, &project(&taxonomy, &items));

        let mut shown = 0;
        for column in &board.columns {
            let placed: usize = column.phases.iter().map(|bucket| bucket.items.len()).sum();
            prop_assert_eq!(placed + column.unassigned.len(), column.total);
            for bucket in &column.phases {
                for item in &bucket.items {
                    prop_assert!(item.is_at(column.status, Some(&bucket.stage_id)));
                }
            }
            shown += column.total;
        }
        prop_assert_eq!(shown, items.len());
    }

    #[test]
    fn stage_removal_leaves_no_dangling_references(
        (taxonomy, items) in arb_board(30),
        removals in proptest::collection::vec((0usize..4, any::<proptest::sample::Index>()), 1..8),
    ) {
        let adapter = Arc::new(MemoryStore::new(taxonomy.clone()).with_items(items));
        let coordinator = Coordinator::new(TaxonomyStore::new(taxonomy), adapter.clone())
            .unwrap()
            .with_retry(RetryPolicy::none());

        for (status_idx, pick) in removals {
            let status = Status::ALL[status_idx];
            let ids = ids_of(&coordinator.store().snapshot(), status);
            let result = coordinator.remove_stage(status, pick.get(&ids));
            if ids.len() == 1 {
                prop_assert!(result.is_err());
            } else {
                prop_assert!(result.unwrap().committed);
            }

            let current = adapter.taxonomy();
            for item in adapter.items() {
                prop_assert!(
                    current.resolves(item.status, item.subcategory_id.as_ref()),
                    "{} points at missing stage {:?}",
                    item.id,
                    item.subcategory_id
                );
            }
        }
    }
}
