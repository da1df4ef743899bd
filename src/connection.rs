use crate::query::filter::{BsonFilterBuilder, FilterBuilder, FilterBuilderFactory};
use crate::query::{Query, QueryPart};
use crate::store::StoreSession;
use std::sync::Arc;

/// Where a connection points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub database: String,
}

impl ConnectionInfo {
    pub fn new(database: impl Into<String>) -> Self {
        Self { database: database.into() }
    }
}

/// A live connection: the shared session plus the filter builder queries use.
///
/// Shared across queries and threads for the lifetime of the process.
pub struct Connection {
    info: ConnectionInfo,
    session: Arc<dyn StoreSession>,
    filter_builder: FilterBuilderFactory,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("info", &self.info)
            .field("session", &self.session.id())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wraps an open store session; filters are built with [`BsonFilterBuilder`].
    pub fn new(info: ConnectionInfo, session: Arc<dyn StoreSession>) -> Self {
        log::info!("connection opened on database {}", info.database);
        Self {
            info,
            session,
            filter_builder: Arc::new(|| Box::new(BsonFilterBuilder::new()) as Box<dyn FilterBuilder>),
        }
    }

    /// Replaces the filter builder factory.
    #[must_use]
    pub fn with_filter_builder(mut self, factory: FilterBuilderFactory) -> Self {
        self.filter_builder = factory;
        self
    }

    #[must_use]
    pub const fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// The session pooled queries share.
    #[must_use]
    pub fn session(&self) -> &Arc<dyn StoreSession> {
        &self.session
    }

    /// A fresh filter builder.
    #[must_use]
    pub fn fb(&self) -> Box<dyn FilterBuilder> {
        (self.filter_builder)()
    }

    pub fn query(&self, parts: impl IntoIterator<Item = QueryPart>) -> Query<'_> {
        Query::new(self, parts)
    }

    /// Closes the shared session. Private sessions already cloned stay open.
    pub fn close(&self) {
        log::info!("connection closed on database {}", self.info.database);
        self.session.close();
    }
}
