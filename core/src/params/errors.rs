use std::path::PathBuf;

use thiserror::Error;

use crate::types::ParamKind;

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    /// Source text is not valid JSON.
    #[error("invalid JSON parameter source: {0}")]
    Json(#[from] serde_json::Error),

    /// Source text is not valid YAML.
    #[error("invalid YAML parameter source: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Source parsed, but is not an object of objects.
    #[error("malformed parameter source: {0}")]
    MalformedSource(String),

    /// A leaf value is not a bool, number, or string.
    #[error("parameter {name} in block {block} is illegal: found {found}")]
    MalformedParameter {
        block: String,
        name: String,
        found: &'static str,
    },

    #[error("block {0} doesn't exist")]
    BlockNotFound(String),

    #[error("{name} isn't in block {block}")]
    ParameterNotFound { block: String, name: String },

    #[error("parameter {name} in block {block} is a {found}, expected {expected}")]
    WrongKind {
        block: String,
        name: String,
        expected: ParamKind,
        found: ParamKind,
    },

    #[error("cannot access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no input file or restart file is specified")]
    NoSource,

    /// Output blocks that cannot be scheduled, reported by a caller that
    /// validates before scheduling.
    #[error("cannot schedule outputs: {0}")]
    Schedule(#[from] ScheduleViolation),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Scheduler precondition violations
// ---------------------------------------------------------------------------

/// A breach of the output scheduler's contract: the caller must have
/// validated `dt` (and `next_time` for a rewind) before scheduling.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleViolation {
    #[error("\"{key}\" isn't in block {block}")]
    MissingKey { block: String, key: &'static str },

    #[error("\"{key}\" in block {block} is a {found}, expected number")]
    NotANumber {
        block: String,
        key: &'static str,
        found: ParamKind,
    },
}
