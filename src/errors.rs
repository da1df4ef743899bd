use bson::Document;
use std::fmt;
use thiserror::Error;

/// Store-side operation an error surfaced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Session,
    Count,
    Find,
    Pipeline,
    Insert,
    Update,
    Delete,
    Save,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Session => "session",
            Self::Count => "count",
            Self::Find => "find",
            Self::Pipeline => "pipeline",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Save => "save",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Filter build error: {0}")]
    FilterBuild(String),

    #[error("Unsupported aggregate operator: {0}")]
    UnsupportedAggregate(String),

    #[error("Store error ({op}): {message}")]
    Store { op: StoreOp, message: String, filter: Option<Document> },

    #[error("BSON decode: {0}")]
    Deserialize(#[from] bson::de::Error),

    #[error("BSON encode: {0}")]
    Serialize(#[from] bson::ser::Error),
}

impl DbError {
    pub(crate) fn store(op: StoreOp, err: &DriverError) -> Self {
        Self::Store { op, message: err.to_string(), filter: None }
    }

    /// Wraps a driver failure and appends the resolved filter to the message.
    pub(crate) fn store_with_filter(op: StoreOp, err: &DriverError, filter: &Document) -> Self {
        Self::Store { op, message: format!("{err} [{filter}]"), filter: Some(filter.clone()) }
    }

    #[must_use]
    pub const fn store_op(&self) -> Option<StoreOp> {
        match self {
            Self::Store { op, .. } => Some(*op),
            _ => None,
        }
    }
}

/// Failures reported by a store driver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("session closed")]
    SessionClosed,

    #[error("not found")]
    NotFound,

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("invalid: {0}")]
    Invalid(String),
}
