//! Store driver boundary.
//!
//! The engine talks to a document store only through [`StoreSession`] and
//! [`StoreCollection`]. The [`memory`] module provides an in-process driver that
//! understands the native filter, sort, projection, update and pipeline documents the
//! query compiler produces.

pub mod eval;
pub mod memory;
mod pipeline;
mod update;

use crate::errors::DriverError;
use crate::types::SessionId;
use bson::{Bson, Document};
use std::sync::Arc;

pub use memory::{MemorySession, MemoryStore, StoreStats};

/// Lazily produced documents coming back from a find or a pipeline.
pub type DocIter = Box<dyn Iterator<Item = Result<Document, DriverError>> + Send>;

/// A simple find request. `skip` and `limit` of zero mean "not set".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindSpec {
    pub filter: Document,
    pub projection: Option<Document>,
    /// Field names; a leading `-` sorts descending, a leading `+` or none ascending.
    pub sort: Vec<String>,
    pub skip: usize,
    pub limit: usize,
}

/// An aggregation pipeline request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineSpec {
    pub stages: Vec<Document>,
    /// Allow the store to spill to disk when a stage exceeds its memory limit.
    pub allow_disk_use: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub matched: u64,
    pub modified: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: u64,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct UpsertReport {
    pub matched: u64,
    pub modified: u64,
    pub upserted_id: Option<Bson>,
}

/// A connection-level session with the store.
///
/// Pooled sessions are shared between queries, so implementations must be safe for
/// concurrent use.
pub trait StoreSession: Send + Sync {
    fn id(&self) -> SessionId;

    /// Opens a new private session against the same store.
    ///
    /// # Errors
    /// Fails when the store cannot hand out another session.
    fn clone_session(&self) -> Result<Arc<dyn StoreSession>, DriverError>;

    /// Closes the session. Later operations through it fail with `SessionClosed`.
    fn close(&self);

    fn is_closed(&self) -> bool;

    /// Binds a collection of `database` to this session.
    ///
    /// # Errors
    /// Fails when the session is closed.
    fn collection(
        &self,
        database: &str,
        name: &str,
    ) -> Result<Arc<dyn StoreCollection>, DriverError>;
}

/// Collection handle bound to one session.
pub trait StoreCollection: Send + Sync {
    fn name(&self) -> &str;

    fn count(&self, filter: &Document) -> Result<usize, DriverError>;

    fn find(&self, spec: &FindSpec) -> Result<DocIter, DriverError>;

    fn aggregate(&self, spec: &PipelineSpec) -> Result<DocIter, DriverError>;

    /// Inserts one document and returns its `_id`.
    fn insert(&self, doc: Document) -> Result<Bson, DriverError>;

    fn update_one(&self, filter: &Document, update: &Document)
    -> Result<UpdateReport, DriverError>;

    fn update_many(
        &self,
        filter: &Document,
        update: &Document,
    ) -> Result<UpdateReport, DriverError>;

    fn remove_one(&self, filter: &Document) -> Result<DeleteReport, DriverError>;

    fn remove_many(&self, filter: &Document) -> Result<DeleteReport, DriverError>;

    fn upsert(&self, filter: &Document, update: &Document) -> Result<UpsertReport, DriverError>;
}
