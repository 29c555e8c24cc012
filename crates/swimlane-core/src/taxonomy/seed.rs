//! Initial taxonomy for a new board.

use serde::{Deserialize, Serialize};

use super::{DocumentError, Taxonomy};
use crate::model::{StageGroup, StageId, Status};

/// One column of a seed: status, title and stage titles in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedGroup {
    pub status: Status,
    pub title: String,
    pub stages: Vec<String>,
}

/// Column layout used when no seed is configured.
#[must_use]
pub fn default_groups() -> Vec<SeedGroup> {
    let group = |status, title: &str, stages: &[&str]| SeedGroup {
        status,
        title: title.to_string(),
        stages: stages.iter().map(ToString::to_string).collect(),
    };
    vec![
        group(Status::Draft, "Draft", &["Lead", "Qualification", "Proposal"]),
        group(
            Status::InProgress,
            "In progress",
            &["Planning", "Execution", "Review", "Invoicing"],
        ),
        group(Status::Completed, "Completed", &["Delivered", "Paid"]),
        group(Status::Cancelled, "Cancelled", &["Lost", "Withdrawn"]),
    ]
}

/// Build a version-0 taxonomy from seed groups.
///
/// Stage ids are `<status-slug>-<position>` (`draft-1`, `in-progress-3`),
/// stable across boards created from the same seed.
pub fn seed_taxonomy(groups: &[SeedGroup]) -> Result<Taxonomy, DocumentError> {
    let groups = groups
        .iter()
        .map(|seed| {
            StageGroup::from_titles(seed.status, seed.title.clone(), seed.stages.iter().cloned(), |idx| {
                StageId::new(format!("{}-{}", seed.status.slug(), idx + 1))
            })
        })
        .collect();
    Taxonomy::new(0, groups)
}

/// The default seed taxonomy.
#[must_use]
pub fn default_seed() -> Taxonomy {
    match seed_taxonomy(&default_groups()) {
        Ok(taxonomy) => taxonomy,
        Err(err) => unreachable!("built-in seed is valid: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_seed_has_four_columns_of_two_to_six_stages() {
        let t = default_seed();
        assert_eq!(t.version(), 0);
        let statuses: Vec<Status> = t.groups().iter().map(|g| g.status).collect();
        assert_eq!(statuses, Status::ALL.to_vec());
        for group in t.groups() {
            assert!((2..=6).contains(&group.stages.len()), "{}", group.status);
            assert!(group.is_dense());
        }
    }

    #[test]
    fn seed_ids_are_status_slugs() {
        let t = default_seed();
        let ids: Vec<&str> = t
            .group(Status::InProgress)
            .unwrap()
            .stage_ids()
            .map(StageId::as_str)
            .collect();
        assert_eq!(
            ids,
            vec!["in-progress-1", "in-progress-2", "in-progress-3", "in-progress-4"]
        );
    }

    #[test]
    fn custom_seed_must_cover_every_status() {
        let mut groups = default_groups();
        groups.retain(|g| g.status != Status::Cancelled);
        assert!(matches!(
            seed_taxonomy(&groups),
            Err(DocumentError::MissingStatus(Status::Cancelled))
        ));
    }

    #[test]
    fn custom_seed_rejects_empty_columns() {
        let mut groups = default_groups();
        groups[2].stages.clear();
        assert!(matches!(
            seed_taxonomy(&groups),
            Err(DocumentError::EmptyGroup(Status::Completed))
        ));
    }
}
