use std::fmt;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    UnknownStatus,
    UnknownStage,
    UnknownItem,
    LastStageViolation,
    InvalidPermutation,
    InvalidState,
    RemovalPending,
    InvalidDocument,
    UnsupportedSchema,
    StaleTaxonomy,
    ItemMoved,
    StoreUnavailable,
    StoreWriteFailed,
    LockContention,
    RetriesExhausted,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::UnknownStatus => "E2001",
            Self::UnknownStage => "E2002",
            Self::UnknownItem => "E2003",
            Self::LastStageViolation => "E2004",
            Self::InvalidPermutation => "E2005",
            Self::InvalidState => "E2006",
            Self::RemovalPending => "E2007",
            Self::InvalidDocument => "E3001",
            Self::UnsupportedSchema => "E3002",
            Self::StaleTaxonomy => "E4001",
            Self::ItemMoved => "E4002",
            Self::StoreUnavailable => "E5001",
            Self::StoreWriteFailed => "E5002",
            Self::LockContention => "E5003",
            Self::RetriesExhausted => "E5004",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Board not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::UnknownStatus => "Unknown status",
            Self::UnknownStage => "Unknown stage",
            Self::UnknownItem => "Unknown work item",
            Self::LastStageViolation => "Cannot remove the last stage of a status",
            Self::InvalidPermutation => "Stage order is not a permutation of the current stages",
            Self::InvalidState => "Taxonomy is in an invalid state",
            Self::RemovalPending => "A stage removal is still migrating items",
            Self::InvalidDocument => "Invalid taxonomy or item document",
            Self::UnsupportedSchema => "Unsupported taxonomy schema version",
            Self::StaleTaxonomy => "Taxonomy changed since it was read",
            Self::ItemMoved => "Work item moved since it was read",
            Self::StoreUnavailable => "Backing store unavailable",
            Self::StoreWriteFailed => "Backing store write failed",
            Self::LockContention => "Lock contention",
            Self::RetriesExhausted => "Write retries exhausted",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `swl init` to create the board."),
            Self::ConfigParseError => Some("Fix syntax in .swimlane/config.toml and retry."),
            Self::UnknownStatus => {
                Some("Use one of DRAFT, IN_PROGRESS, COMPLETED, CANCELLED (case-sensitive).")
            }
            Self::UnknownStage => Some("Run `swl board` to list the stage ids of each status."),
            Self::UnknownItem => None,
            Self::LastStageViolation => {
                Some("Add another stage to the status before removing this one.")
            }
            Self::InvalidPermutation => {
                Some("List every stage id of the status exactly once, in the new order.")
            }
            Self::InvalidState => None,
            Self::RemovalPending => Some("Run `swl retry` to finish the pending migration."),
            Self::InvalidDocument => Some("Repair or restore .swimlane/taxonomy.json."),
            Self::UnsupportedSchema => Some("Upgrade swimlane to read this document."),
            Self::StaleTaxonomy => Some("Reload the board and apply the edit again."),
            Self::ItemMoved => Some("Reload the board; the item is already somewhere else."),
            Self::StoreUnavailable => Some("Retry once the backing store is reachable."),
            Self::StoreWriteFailed => Some("Check disk space and write permissions."),
            Self::LockContention => Some("Retry after the other `swl` process releases its lock."),
            Self::RetriesExhausted => {
                Some("The previous state is still authoritative; retry the operation.")
            }
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCode;
    use std::collections::HashSet;

    const ALL: [ErrorCode; 18] = [
        ErrorCode::NotInitialized,
        ErrorCode::ConfigParseError,
        ErrorCode::UnknownStatus,
        ErrorCode::UnknownStage,
        ErrorCode::UnknownItem,
        ErrorCode::LastStageViolation,
        ErrorCode::InvalidPermutation,
        ErrorCode::InvalidState,
        ErrorCode::RemovalPending,
        ErrorCode::InvalidDocument,
        ErrorCode::UnsupportedSchema,
        ErrorCode::StaleTaxonomy,
        ErrorCode::ItemMoved,
        ErrorCode::StoreUnavailable,
        ErrorCode::StoreWriteFailed,
        ErrorCode::LockContention,
        ErrorCode::RetriesExhausted,
        ErrorCode::InternalUnexpected,
    ];

    #[test]
    fn all_codes_are_unique() {
        let mut seen = HashSet::new();
        for code in ALL {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        for code in ALL {
            let rendered = code.code();
            assert_eq!(rendered.len(), 5);
            assert!(rendered.starts_with('E'));
            assert!(rendered.chars().skip(1).all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn display_matches_code() {
        assert_eq!(ErrorCode::LastStageViolation.to_string(), "E2004");
    }
}
