use bson::Bson;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// A declarative predicate. The query engine only collects and forwards these; the
/// connection's filter builder gives them meaning.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    True,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Exists { path: String, exists: bool },
    In { path: String, values: Vec<Bson> },
    Nin { path: String, values: Vec<Bson> },
    Cmp { path: String, op: CmpOp, value: Bson },
    #[cfg(feature = "regex")]
    Regex { path: String, pattern: String, case_insensitive: bool },
}

impl Filter {
    pub fn field_eq(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::Cmp { path: path.into(), op: CmpOp::Eq, value: value.into() }
    }

    pub fn cmp(path: impl Into<String>, op: CmpOp, value: impl Into<Bson>) -> Self {
        Self::Cmp { path: path.into(), op, value: value.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggrOp {
    Sum,
    Avg,
    Min,
    Max,
    Median,
}

impl fmt::Display for AggrOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
            Self::Median => "median",
        };
        f.write_str(s)
    }
}

/// One aggregation projection term: `alias = op(field)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggrInfo {
    pub op: AggrOp,
    pub field: String,
    pub alias: String,
}

impl AggrInfo {
    pub fn new(op: AggrOp, field: impl Into<String>, alias: impl Into<String>) -> Self {
        Self { op, field: field.into(), alias: alias.into() }
    }
}

/// Payload-free tag of a [`QueryPart`]. The declaration order is the order
/// [`super::classify`] reports groups in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PartKind {
    From,
    Select,
    Where,
    Order,
    Skip,
    Take,
    Aggregate,
    Insert,
    Update,
    Delete,
    Save,
}

impl PartKind {
    #[must_use]
    pub const fn is_mutation(self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Delete | Self::Save)
    }
}

impl fmt::Display for PartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One declarative clause of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPart {
    From(String),
    Select(Vec<String>),
    Where(Vec<Filter>),
    /// Field names; `-field` sorts descending.
    Order(Vec<String>),
    Skip(usize),
    Take(usize),
    Aggregate(AggrInfo),
    Insert,
    Update,
    Delete,
    /// Upsert.
    Save,
}

impl QueryPart {
    #[must_use]
    pub const fn kind(&self) -> PartKind {
        match self {
            Self::From(_) => PartKind::From,
            Self::Select(_) => PartKind::Select,
            Self::Where(_) => PartKind::Where,
            Self::Order(_) => PartKind::Order,
            Self::Skip(_) => PartKind::Skip,
            Self::Take(_) => PartKind::Take,
            Self::Aggregate(_) => PartKind::Aggregate,
            Self::Insert => PartKind::Insert,
            Self::Update => PartKind::Update,
            Self::Delete => PartKind::Delete,
            Self::Save => PartKind::Save,
        }
    }

    pub fn source(table: impl Into<String>) -> Self {
        Self::From(table.into())
    }

    pub fn select<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Select(fields.into_iter().map(Into::into).collect())
    }

    pub fn order<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Order(fields.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn filter(f: Filter) -> Self {
        Self::Where(vec![f])
    }
}
