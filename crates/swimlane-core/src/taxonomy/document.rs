//! Taxonomy document format and boundary validation.
//!
//! Current format (schema 1):
//!
//! ```json
//! { "schema": 1, "version": 4, "groups": [ { "status": "DRAFT", "title": "Draft",
//!   "stages": [ { "id": "draft-1", "title": "Lead", "order": 1 } ] } ] }
//! ```
//!
//! Documents written before the schema field existed are either a bare
//! array of groups or an object without `schema`, and their stages may lack
//! `order`. [`upgrade_document`] converts those explicitly: stages are
//! sorted by their `order` when present (position otherwise) and re-packed.
//! Unknown fields and unknown schema numbers are rejected, never ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use super::Taxonomy;
use crate::error::ErrorCode;
use crate::model::{Stage, StageGroup, StageId, Status};

/// Schema number written by this version.
pub const CURRENT_SCHEMA: u64 = 1;

/// Why a taxonomy document was rejected.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("malformed taxonomy document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported taxonomy schema {0}")]
    UnsupportedSchema(u64),

    #[error("no stage group for {0}")]
    MissingStatus(Status),

    #[error("more than one stage group for {0}")]
    DuplicateStatus(Status),

    #[error("stage group {0} has no stages")]
    EmptyGroup(Status),

    #[error("stage id '{0}' is used more than once")]
    DuplicateStageId(StageId),

    #[error("stage group {0} contains an empty stage id")]
    EmptyStageId(Status),

    #[error("stage orders in {0} are not 1..N")]
    NonDenseOrder(Status),
}

impl DocumentError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedSchema(_) => ErrorCode::UnsupportedSchema,
            _ => ErrorCode::InvalidDocument,
        }
    }
}

/// Wire form of [`Taxonomy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaxonomyDocument {
    pub schema: u64,
    pub version: u64,
    pub groups: Vec<StageGroup>,
}

impl From<Taxonomy> for TaxonomyDocument {
    fn from(taxonomy: Taxonomy) -> Self {
        Self {
            schema: CURRENT_SCHEMA,
            version: taxonomy.version,
            groups: taxonomy.groups,
        }
    }
}

impl From<&Taxonomy> for TaxonomyDocument {
    fn from(taxonomy: &Taxonomy) -> Self {
        taxonomy.clone().into()
    }
}

impl TryFrom<TaxonomyDocument> for Taxonomy {
    type Error = DocumentError;

    fn try_from(doc: TaxonomyDocument) -> Result<Self, Self::Error> {
        if doc.schema != CURRENT_SCHEMA {
            return Err(DocumentError::UnsupportedSchema(doc.schema));
        }
        Self::new(doc.version, doc.groups)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LegacyDocument {
    #[serde(default)]
    version: u64,
    groups: Vec<LegacyGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LegacyGroup {
    status: Status,
    title: String,
    stages: Vec<LegacyStage>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LegacyStage {
    id: StageId,
    title: String,
    #[serde(default)]
    order: Option<u32>,
}

impl LegacyGroup {
    fn upgrade(self) -> StageGroup {
        let mut ranked: Vec<(u32, usize, LegacyStage)> = self
            .stages
            .into_iter()
            .enumerate()
            .map(|(idx, stage)| {
                let fallback = u32::try_from(idx + 1).unwrap_or(u32::MAX);
                (stage.order.unwrap_or(fallback), idx, stage)
            })
            .collect();
        ranked.sort_by_key(|(order, idx, _)| (*order, *idx));

        let mut group = StageGroup {
            status: self.status,
            title: self.title,
            stages: ranked
                .into_iter()
                .map(|(_, _, stage)| Stage {
                    id: stage.id,
                    title: stage.title,
                    order: 0,
                })
                .collect(),
        };
        group.repack();
        group
    }
}

/// Bring any supported document shape up to the current schema.
pub fn upgrade_document(value: Value) -> Result<TaxonomyDocument, DocumentError> {
    let schema = match &value {
        Value::Object(map) => match map.get("schema") {
            None => None,
            Some(raw) => Some(raw.as_u64().ok_or(DocumentError::UnsupportedSchema(0))?),
        },
        _ => None,
    };

    match schema {
        Some(CURRENT_SCHEMA) => Ok(serde_json::from_value(value)?),
        Some(other) => Err(DocumentError::UnsupportedSchema(other)),
        None => {
            let legacy = if value.is_array() {
                LegacyDocument {
                    version: 0,
                    groups: serde_json::from_value(value)?,
                }
            } else {
                serde_json::from_value(value)?
            };
            tracing::info!(
                groups = legacy.groups.len(),
                "upgrading legacy taxonomy document to schema {CURRENT_SCHEMA}"
            );
            Ok(TaxonomyDocument {
                schema: CURRENT_SCHEMA,
                version: legacy.version,
                groups: legacy.groups.into_iter().map(LegacyGroup::upgrade).collect(),
            })
        }
    }
}

/// Parse and validate a taxonomy from JSON text, upgrading legacy shapes.
pub fn parse_taxonomy(json: &str) -> Result<Taxonomy, DocumentError> {
    let value: Value = serde_json::from_str(json)?;
    Taxonomy::try_from(upgrade_document(value)?)
}

pub(crate) fn validate_groups(groups: &[StageGroup]) -> Result<(), DocumentError> {
    let mut statuses = HashSet::new();
    let mut stage_ids = HashSet::new();

    for group in groups {
        if !statuses.insert(group.status) {
            return Err(DocumentError::DuplicateStatus(group.status));
        }
        if group.stages.is_empty() {
            return Err(DocumentError::EmptyGroup(group.status));
        }
        if !group.is_dense() {
            return Err(DocumentError::NonDenseOrder(group.status));
        }
        for stage in &group.stages {
            if stage.id.as_str().is_empty() {
                return Err(DocumentError::EmptyStageId(group.status));
            }
            if !stage_ids.insert(stage.id.as_str()) {
                return Err(DocumentError::DuplicateStageId(stage.id.clone()));
            }
        }
    }

    if let Some(missing) = Status::ALL.into_iter().find(|s| !statuses.contains(s)) {
        return Err(DocumentError::MissingStatus(missing));
    }
    Ok(())
}
