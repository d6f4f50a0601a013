use thiserror::Error;

/// Typed failures raised where raw text enters the engine (CSV rows, CLI
/// flags, database enums). Aggregation itself never fails.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OversightError {
    #[error("unknown point kind `{0}` (expected positive or negative)")]
    UnknownKind(String),

    #[error("unknown sector `{0}` (expected calls or telegram)")]
    UnknownSector(String),

    #[error("invalid date `{0}` (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("quantity must be at least 1, got {0}")]
    InvalidQuantity(i64),
}
