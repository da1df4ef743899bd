//! Translation of part-based queries into document store operations.
//!
//! A caller describes a query as a bag of [`QueryPart`]s and hands it to a [`Query`]
//! bound to a [`Connection`]. Reads come back as a lazy [`Cursor`], writes as an
//! [`ExecReport`]. The store itself sits behind the [`store::StoreSession`] and
//! [`store::StoreCollection`] traits; [`store::MemoryStore`] implements them in process.

pub mod connection;
pub mod errors;
pub mod logger;
pub mod query;
pub mod session;
pub mod store;
pub mod types;
pub mod utils;


pub use connection::{Connection, ConnectionInfo};
pub use errors::{DbError, DriverError, StoreOp};
pub use query::{
    AggrInfo, AggrOp, CmpOp, Cursor, ExecReport, Filter, Query, QueryConfig, QueryPart,
    ResultType,
};
pub use session::SessionLease;
pub use types::SessionId;
