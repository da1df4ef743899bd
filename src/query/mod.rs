//! Part-based queries: classification, compilation, execution and cursors.

pub mod classify;
pub mod config;
mod cursor;
mod exec;
pub mod filter;
pub mod part;
pub mod plan;

pub use classify::{GroupedParts, MUTATION_PRECEDENCE, classify};
pub use config::QueryConfig;
pub use cursor::{Cursor, ResultType};
pub use exec::Query;
pub use filter::{BsonFilterBuilder, FilterBuilder, FilterBuilderFactory};
pub use part::{AggrInfo, AggrOp, CmpOp, Filter, PartKind, QueryPart};
pub use plan::{ExecReport, MutationKind, QueryPlan, ReadKind, ReadPlan, WritePlan, WriteScope};
