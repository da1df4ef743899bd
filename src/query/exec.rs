use crate::connection::Connection;
use crate::errors::{DbError, DriverError, StoreOp};
use crate::session::SessionLease;
use crate::store::StoreCollection;
use crate::utils::devlog::elapsed_us;
use bson::Document;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use super::classify::classify;
use super::config::QueryConfig;
use super::cursor::Cursor;
use super::part::QueryPart;
use super::plan::{
    ExecReport, MutationKind, QueryPlan, ReadKind, WritePlan, WriteScope, compile_read,
    compile_write,
};

/// One unit of work against a connection: a read through [`Query::cursor`] or a write
/// through [`Query::exec`].
pub struct Query<'c> {
    conn: &'c Connection,
    parts: Vec<QueryPart>,
    config: QueryConfig,
    session: Option<Arc<SessionLease>>,
}

impl std::fmt::Debug for Query<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("parts", &self.parts)
            .field("config", &self.config)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl<'c> Query<'c> {
    pub fn new(conn: &'c Connection, parts: impl IntoIterator<Item = QueryPart>) -> Self {
        Self {
            conn,
            parts: parts.into_iter().collect(),
            config: QueryConfig::default(),
            session: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: QueryConfig) -> Self {
        self.config = config;
        self
    }

    /// Applies options from a configuration map.
    ///
    /// # Errors
    /// Returns `DbError::Deserialize` when an option has the wrong type.
    pub fn configure(&mut self, settings: &Document) -> Result<(), DbError> {
        self.config = QueryConfig::from_document(settings)?;
        Ok(())
    }

    #[must_use]
    pub fn parts(&self) -> &[QueryPart] {
        &self.parts
    }

    #[must_use]
    pub const fn config(&self) -> QueryConfig {
        self.config
    }

    /// The session this query runs on, opened on first use.
    ///
    /// Pooled queries get the connection's shared session. Otherwise a private session
    /// is cloned once and kept until the query releases it.
    ///
    /// # Errors
    /// Returns `DbError::Store` when a private session cannot be cloned.
    pub fn session(&mut self) -> Result<Arc<SessionLease>, DbError> {
        if let Some(lease) = &self.session {
            return Ok(Arc::clone(lease));
        }
        let lease = if self.config.pooling {
            SessionLease::pooled(Arc::clone(self.conn.session()))
        } else {
            SessionLease::cloned(self.conn.session().as_ref())?
        };
        self.session = Some(Arc::clone(&lease));
        Ok(lease)
    }

    /// Compiles the query without touching the store. Queries with a mutation part
    /// compile as writes carrying `data`, everything else as reads.
    ///
    /// # Errors
    /// The validation errors of [`Query::cursor`] and [`Query::exec`].
    pub fn prepare(&self, data: Option<Document>) -> Result<QueryPlan, DbError> {
        let grouped = classify(&self.parts);
        let mut fb = self.conn.fb();
        if grouped.mutation().is_some() {
            Ok(QueryPlan::Write(compile_write(&grouped, fb.as_mut(), data)?))
        } else {
            Ok(QueryPlan::Read(compile_read(&grouped, fb.as_mut())?))
        }
    }

    /// Runs the query as a read.
    ///
    /// A simple find counts its matches first unless counting is disabled; aggregates
    /// run as a pipeline.
    ///
    /// # Errors
    /// `InvalidQuery`, `InvalidOperation`, `FilterBuild`, `UnsupportedAggregate` before
    /// any store call; `Store` when the session or the count fails.
    pub fn cursor(&mut self) -> Result<Cursor, DbError> {
        let start = Instant::now();
        let plan = compile_read(&classify(&self.parts), self.conn.fb().as_mut())?;
        let lease = self.session()?;
        let collection = lease.collection(&self.conn.info().database, &plan.collection)?;
        let cursor = match plan.kind {
            ReadKind::Find(spec) => {
                let count = if self.config.count {
                    collection.count(&spec.filter).map_err(|e| DbError::store(StoreOp::Count, &e))?
                } else {
                    0
                };
                Cursor::find(collection, spec, lease, count)
            }
            ReadKind::Pipeline(spec) => {
                log::debug!("{}: pipeline with {} stages", plan.collection, spec.stages.len());
                Cursor::pipeline(collection, spec, lease)
            }
        };
        crate::dev6!({
            "bench": "query",
            "op": "cursor",
            "collection": plan.collection,
            "pipeline": cursor.result_type() == super::cursor::ResultType::Pipeline,
            "count": cursor.count(),
            "pooled": cursor.is_pooled(),
            "duration_us": elapsed_us(start),
        });
        Ok(cursor)
    }

    /// Runs the query's mutation.
    ///
    /// `data` carrying an `_id` targets that one document; otherwise the `Where` parts
    /// scope the write. A private session is released afterwards unless `multiexec` is
    /// set.
    ///
    /// # Errors
    /// `InvalidQuery` or `InvalidOperation` before any store call, `FilterBuild`, and
    /// `Store` for driver failures. A single-document update or delete that matches
    /// nothing fails with the filter in the message.
    pub fn exec(&mut self, data: Option<Document>) -> Result<ExecReport, DbError> {
        let start = Instant::now();
        let plan = compile_write(&classify(&self.parts), self.conn.fb().as_mut(), data)?;
        let result = self.session().and_then(|lease| {
            let collection = lease.collection(&self.conn.info().database, &plan.collection)?;
            dispatch(collection.as_ref(), &plan)
        });
        if !self.config.multiexec {
            self.release();
        }
        match &result {
            Ok(report) => crate::dev6!({
                "bench": "query",
                "op": "exec",
                "collection": plan.collection,
                "kind": report.kind,
                "single": plan.scope.is_single(),
                "matched": report.matched,
                "modified": report.modified,
                "deleted": report.deleted,
                "duration_us": elapsed_us(start),
            }),
            Err(e) => log::warn!("{}: {:?} failed: {e}", plan.collection, plan.kind),
        }
        result
    }

    /// Serializes `data` and runs [`Query::exec`] with it.
    ///
    /// # Errors
    /// `DbError::Serialize` when `data` is not a document, then as [`Query::exec`].
    pub fn exec_with<T: Serialize>(&mut self, data: &T) -> Result<ExecReport, DbError> {
        let doc = bson::to_document(data)?;
        self.exec(Some(doc))
    }

    /// Releases this query's share of its session. A no-op when pooled or never opened.
    pub fn close(&mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(lease) = self.session.take()
            && !lease.is_pooled()
        {
            log::debug!("query released session {}", lease.id());
        }
    }
}

impl Drop for Query<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

fn single_or_multi(
    plan: &WritePlan,
    op: StoreOp,
    res: Result<ExecReport, DriverError>,
) -> Result<ExecReport, DbError> {
    match (&plan.scope, res) {
        (_, Ok(r)) => Ok(r),
        (WriteScope::Single(filter), Err(e)) => Err(DbError::store_with_filter(op, &e, filter)),
        (WriteScope::Multi(_), Err(e)) => Err(DbError::store(op, &e)),
    }
}

fn dispatch(col: &dyn StoreCollection, plan: &WritePlan) -> Result<ExecReport, DbError> {
    let op = plan.kind.store_op();
    let filter = plan.scope.filter();
    let payload = plan.data.as_ref();
    let mut report = ExecReport::new(plan.kind);
    let res = match (plan.kind, &plan.scope, payload) {
        (MutationKind::Insert, _, Some(d)) => col.insert(d.clone()).map(|id| {
            report.upserted = Some(id);
            report
        }),
        (MutationKind::Update, WriteScope::Single(_), Some(d)) => {
            col.update_one(filter, d).and_then(|r| {
                if r.matched == 0 {
                    return Err(DriverError::NotFound);
                }
                report.matched = r.matched;
                report.modified = r.modified;
                Ok(report)
            })
        }
        (MutationKind::Update, WriteScope::Multi(_), Some(d)) => col.update_many(filter, d).map(|r| {
            report.matched = r.matched;
            report.modified = r.modified;
            report
        }),
        (MutationKind::Delete, WriteScope::Single(_), _) => col.remove_one(filter).and_then(|r| {
            if r.deleted == 0 {
                return Err(DriverError::NotFound);
            }
            report.deleted = r.deleted;
            Ok(report)
        }),
        (MutationKind::Delete, WriteScope::Multi(_), _) => col.remove_many(filter).map(|r| {
            report.deleted = r.deleted;
            report
        }),
        (MutationKind::Save, _, Some(d)) => col.upsert(filter, d).map(|r| {
            report.matched = r.matched;
            report.modified = r.modified;
            report.upserted = r.upserted_id;
            report
        }),
        (kind, _, None) => return Err(DbError::InvalidQuery(format!("{kind:?} requires a document"))),
    };
    single_or_multi(plan, op, res)
}
