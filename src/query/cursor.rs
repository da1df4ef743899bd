use crate::errors::{DbError, StoreOp};
use crate::session::SessionLease;
use crate::store::{DocIter, FindSpec, PipelineSpec, StoreCollection};
use bson::Document;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// What produced a cursor's documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultType {
    SimpleFind,
    Pipeline,
}

impl ResultType {
    const fn store_op(self) -> StoreOp {
        match self {
            Self::SimpleFind => StoreOp::Find,
            Self::Pipeline => StoreOp::Pipeline,
        }
    }
}

enum Handle {
    Find(FindSpec),
    Pipeline(PipelineSpec),
}

enum State {
    /// Store iterator not opened yet.
    Pending(Handle),
    Open(DocIter),
    Done,
}

/// Lazy result set of a read.
///
/// The store iterator is opened on the first fetch. Documents come back once, in store
/// order; after exhaustion or [`Cursor::close`] every fetch returns `Ok(None)`.
pub struct Cursor {
    result_type: ResultType,
    collection: Arc<dyn StoreCollection>,
    state: State,
    lease: Option<Arc<SessionLease>>,
    count: usize,
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("result_type", &self.result_type)
            .field("collection", &self.collection.name())
            .field("count", &self.count)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Cursor {
    pub(crate) fn find(
        collection: Arc<dyn StoreCollection>,
        spec: FindSpec,
        lease: Arc<SessionLease>,
        count: usize,
    ) -> Self {
        Self {
            result_type: ResultType::SimpleFind,
            collection,
            state: State::Pending(Handle::Find(spec)),
            lease: Some(lease),
            count,
        }
    }

    pub(crate) fn pipeline(
        collection: Arc<dyn StoreCollection>,
        spec: PipelineSpec,
        lease: Arc<SessionLease>,
    ) -> Self {
        Self {
            result_type: ResultType::Pipeline,
            collection,
            state: State::Pending(Handle::Pipeline(spec)),
            lease: Some(lease),
            count: 0,
        }
    }

    #[must_use]
    pub const fn result_type(&self) -> ResultType {
        self.result_type
    }

    /// Total matches of a simple find, ignoring skip and limit. Zero for pipelines and
    /// when eager counting is off.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn is_pooled(&self) -> bool {
        self.lease.as_ref().is_some_and(|l| l.is_pooled())
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.lease.is_none()
    }

    fn open(&self, handle: &Handle) -> Result<DocIter, DbError> {
        let opened = match handle {
            Handle::Find(spec) => self.collection.find(spec),
            Handle::Pipeline(spec) => self.collection.aggregate(spec),
        };
        opened.map_err(|e| DbError::store(self.result_type.store_op(), &e))
    }

    /// Next document, or `None` once the results are exhausted.
    ///
    /// # Errors
    /// Returns `DbError::Store` when the store fails to open or advance the results.
    /// The cursor is finished afterwards.
    pub fn fetch(&mut self) -> Result<Option<Document>, DbError> {
        if let State::Pending(handle) = &self.state {
            match self.open(handle) {
                Ok(iter) => self.state = State::Open(iter),
                Err(e) => {
                    self.state = State::Done;
                    return Err(e);
                }
            }
        }
        let State::Open(iter) = &mut self.state else {
            return Ok(None);
        };
        match iter.next() {
            Some(Ok(doc)) => Ok(Some(doc)),
            Some(Err(e)) => {
                self.state = State::Done;
                Err(DbError::store(self.result_type.store_op(), &e))
            }
            None => {
                self.state = State::Done;
                Ok(None)
            }
        }
    }

    /// Up to `n` further documents.
    ///
    /// # Errors
    /// See [`Cursor::fetch`].
    pub fn fetch_n(&mut self, n: usize) -> Result<Vec<Document>, DbError> {
        let mut out = Vec::with_capacity(n.min(1024));
        while out.len() < n {
            match self.fetch()? {
                Some(d) => out.push(d),
                None => break,
            }
        }
        Ok(out)
    }

    /// Every remaining document.
    ///
    /// # Errors
    /// See [`Cursor::fetch`].
    pub fn fetch_all(&mut self) -> Result<Vec<Document>, DbError> {
        let mut out = Vec::new();
        while let Some(d) = self.fetch()? {
            out.push(d);
        }
        Ok(out)
    }

    /// Next document decoded into `T`.
    ///
    /// # Errors
    /// Store failures as in [`Cursor::fetch`], or `DbError::Deserialize` when the document
    /// does not fit `T`.
    pub fn fetch_as<T: DeserializeOwned>(&mut self) -> Result<Option<T>, DbError> {
        match self.fetch()? {
            Some(doc) => Ok(Some(bson::from_document(doc)?)),
            None => Ok(None),
        }
    }

    /// Borrowing iterator over the remaining documents.
    /// [`Cursor::count`] still reports the eager total afterwards.
    pub fn iter(&mut self) -> impl Iterator<Item = Result<Document, DbError>> + '_ {
        std::iter::from_fn(move || self.fetch().transpose())
    }

    /// Drops the store iterator and releases this cursor's share of the session.
    /// Safe to call repeatedly.
    pub fn close(&mut self) {
        self.state = State::Done;
        if let Some(lease) = self.lease.take() {
            log::debug!("cursor on {} released session {}", self.collection.name(), lease.id());
        }
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        self.close();
    }
}
