//! Command objects accepted by [`super::Coordinator::execute`], and the
//! reports it returns.
//!
//! Commands carry raw strings as they arrive from a UI or the CLI; status
//! literals are parsed, and stage ids checked, by the coordinator.

use serde::{Deserialize, Serialize};

use crate::migrate::MigrationPlan;
use crate::model::{ItemId, ItemPatch, StageId, Status};
use crate::taxonomy::TaxonomyError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    RenameGroup {
        status: String,
        title: String,
    },
    AddStage {
        status: String,
        title: String,
    },
    RemoveStage {
        status: String,
        stage_id: String,
    },
    Reorder {
        status: String,
        stage_ids: Vec<String>,
    },
    EditStage {
        status: String,
        stage_id: String,
        #[serde(default)]
        title: Option<String>,
    },
    Move {
        item_id: String,
        status: String,
        #[serde(default)]
        stage_id: Option<String>,
    },
}

/// Parse a case-sensitive status literal.
pub fn parse_status(raw: &str) -> Result<Status, TaxonomyError> {
    raw.parse().map_err(|_| TaxonomyError::UnknownStatus {
        got: raw.to_string(),
    })
}

/// One item write produced by a move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemMutation {
    pub item_id: ItemId,
    pub patch: ItemPatch,
}

/// Result of a move. Empty when the item was already in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MoveReport {
    pub mutations: Vec<ItemMutation>,
}

impl MoveReport {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// Result of a taxonomy commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    /// The taxonomy was written.
    pub committed: bool,
    /// Version written, when committed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Queued as this pending commit instead of being written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_id: Option<u64>,
    /// A pending commit that no longer applies was dropped.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub discarded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_stage: Option<StageId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plans: Vec<MigrationPlan>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub migrated: Vec<ItemId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub outstanding: Vec<ItemId>,
}

/// What [`super::Coordinator::execute`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Taxonomy(CommitReport),
    Moved(MoveReport),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn commands_deserialize_from_tagged_json() {
        let cmd: Command = serde_json::from_value(json!({
            "command": "move",
            "item_id": "p-1",
            "status": "IN_PROGRESS"
        }))
        .unwrap();
        assert_eq!(
            cmd,
            Command::Move {
                item_id: "p-1".into(),
                status: "IN_PROGRESS".into(),
                stage_id: None,
            }
        );

        let cmd: Command = serde_json::from_value(json!({
            "command": "reorder",
            "status": "DRAFT",
            "stage_ids": ["b", "a"]
        }))
        .unwrap();
        assert!(matches!(cmd, Command::Reorder { stage_ids, .. } if stage_ids == ["b", "a"]));
    }

    #[test]
    fn status_parsing_is_case_sensitive() {
        assert_eq!(parse_status("COMPLETED"), Ok(Status::Completed));
        assert_eq!(
            parse_status("completed"),
            Err(TaxonomyError::UnknownStatus {
                got: "completed".into()
            })
        );
    }

    #[test]
    fn empty_report_serializes_compactly() {
        let value = serde_json::to_value(CommitReport::default()).unwrap();
        assert_eq!(value, json!({"committed": false}));
        let outcome = serde_json::to_value(Outcome::Moved(MoveReport::default())).unwrap();
        assert_eq!(outcome, json!({"kind": "moved", "mutations": []}));
    }
}
