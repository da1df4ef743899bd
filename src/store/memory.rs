//! In-process store driver.
//!
//! Documents live in insertion order per `(database, collection)`. Collections are
//! created on first write, as document stores usually do.

use crate::errors::DriverError;
use crate::types::SessionId;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::eval::{bson_eq, compare_docs, matches, parse_sort_keys, project};
use super::update::{apply, check_field_names, is_operator_update};
use super::{
    DeleteReport, DocIter, FindSpec, PipelineSpec, StoreCollection, StoreSession, UpdateReport,
    UpsertReport,
};

type CollectionKey = (String, String);

/// Counters for observing how the engine drives the store.
#[derive(Debug, Default)]
pub struct StoreStats {
    pub sessions_opened: AtomicU64,
    /// Every call to `close` on an open or closed session.
    pub close_calls: AtomicU64,
    pub counts: AtomicU64,
    pub finds: AtomicU64,
    pub pipelines: AtomicU64,
    pub writes: AtomicU64,
}

impl StoreStats {
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.counts.load(Ordering::Relaxed)
            + self.finds.load(Ordering::Relaxed)
            + self.pipelines.load(Ordering::Relaxed)
            + self.writes.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<CollectionKey, Vec<Document>>>,
    stats: StoreStats,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Opens a root session, typically the one a connection shares across queries.
    #[must_use]
    pub fn connect(self: &Arc<Self>) -> Arc<MemorySession> {
        self.stats.sessions_opened.fetch_add(1, Ordering::Relaxed);
        Arc::new(MemorySession {
            id: SessionId::new(),
            store: Arc::clone(self),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    #[must_use]
    pub const fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Snapshot of a collection in natural order.
    #[must_use]
    pub fn documents(&self, database: &str, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .get(&(database.to_string(), collection.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Loads documents directly, bypassing sessions. Missing `_id`s are generated.
    pub fn seed(&self, database: &str, collection: &str, docs: impl IntoIterator<Item = Document>) {
        let mut cols = self.collections.write();
        let col = cols.entry((database.to_string(), collection.to_string())).or_default();
        col.extend(docs.into_iter().map(with_id));
    }
}

fn with_id(doc: Document) -> Document {
    if doc.contains_key("_id") {
        return doc;
    }
    let mut out = Document::new();
    out.insert("_id", ObjectId::new());
    for (k, v) in doc {
        out.insert(k, v);
    }
    out
}

pub struct MemorySession {
    id: SessionId,
    store: Arc<MemoryStore>,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySession")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl StoreSession for MemorySession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn clone_session(&self) -> Result<Arc<dyn StoreSession>, DriverError> {
        if self.is_closed() {
            return Err(DriverError::SessionClosed);
        }
        Ok(self.store.connect())
    }

    fn close(&self) {
        self.store.stats.close_calls.fetch_add(1, Ordering::Relaxed);
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn collection(
        &self,
        database: &str,
        name: &str,
    ) -> Result<Arc<dyn StoreCollection>, DriverError> {
        if self.is_closed() {
            return Err(DriverError::SessionClosed);
        }
        Ok(Arc::new(MemoryCollection {
            store: Arc::clone(&self.store),
            closed: Arc::clone(&self.closed),
            key: (database.to_string(), name.to_string()),
        }))
    }
}

struct MemoryCollection {
    store: Arc<MemoryStore>,
    closed: Arc<AtomicBool>,
    key: CollectionKey,
}

impl MemoryCollection {
    fn check(&self) -> Result<(), DriverError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DriverError::SessionClosed);
        }
        Ok(())
    }

    fn matching(&self, filter: &Document) -> Result<Vec<Document>, DriverError> {
        let cols = self.store.collections.read();
        let mut out = Vec::new();
        for d in cols.get(&self.key).map(Vec::as_slice).unwrap_or_default() {
            if matches(d, filter)? {
                out.push(d.clone());
            }
        }
        Ok(out)
    }

    // Iteration fails once the owning session is closed.
    fn stream(&self, docs: Vec<Document>) -> DocIter {
        let closed = Arc::clone(&self.closed);
        Box::new(docs.into_iter().map(move |d| {
            if closed.load(Ordering::Acquire) { Err(DriverError::SessionClosed) } else { Ok(d) }
        }))
    }

    fn update(
        &self,
        filter: &Document,
        update: &Document,
        multi: bool,
    ) -> Result<UpdateReport, DriverError> {
        let mut cols = self.store.collections.write();
        let Some(col) = cols.get_mut(&self.key) else {
            return Ok(UpdateReport::default());
        };
        let mut report = UpdateReport::default();
        for d in col.iter_mut() {
            if !matches(d, filter)? {
                continue;
            }
            report.matched += 1;
            if apply(d, update)? {
                report.modified += 1;
            }
            if !multi {
                break;
            }
        }
        Ok(report)
    }

    fn remove(&self, filter: &Document, multi: bool) -> Result<DeleteReport, DriverError> {
        let mut cols = self.store.collections.write();
        let Some(col) = cols.get_mut(&self.key) else {
            return Ok(DeleteReport::default());
        };
        let mut hits = Vec::new();
        for (i, d) in col.iter().enumerate() {
            if matches(d, filter)? {
                hits.push(i);
                if !multi {
                    break;
                }
            }
        }
        for &i in hits.iter().rev() {
            col.remove(i);
        }
        let deleted = hits.len() as u64;
        Ok(DeleteReport { deleted })
    }

    fn insert_locked(col: &mut Vec<Document>, doc: Document) -> Result<Bson, DriverError> {
        check_field_names(&doc)?;
        let doc = with_id(doc);
        let id = doc.get("_id").cloned().unwrap_or(Bson::Null);
        if col.iter().any(|d| d.get("_id").is_some_and(|x| bson_eq(x, &id))) {
            return Err(DriverError::DuplicateKey(id.to_string()));
        }
        col.push(doc);
        Ok(id)
    }
}

/// Top-level equality clauses of a filter, used to seed an upserted document.
fn equality_seed(filter: &Document) -> Document {
    let mut seed = Document::new();
    for (k, v) in filter {
        if k.starts_with('$') {
            continue;
        }
        match v {
            Bson::Document(d) if d.keys().next().is_some_and(|x| x.starts_with('$')) => {
                if let Some(eq) = d.get("$eq") {
                    seed.insert(k.clone(), eq.clone());
                }
            }
            other => {
                seed.insert(k.clone(), other.clone());
            }
        }
    }
    seed
}

impl StoreCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.key.1
    }

    fn count(&self, filter: &Document) -> Result<usize, DriverError> {
        self.check()?;
        self.store.stats.counts.fetch_add(1, Ordering::Relaxed);
        Ok(self.matching(filter)?.len())
    }

    fn find(&self, spec: &FindSpec) -> Result<DocIter, DriverError> {
        self.check()?;
        self.store.stats.finds.fetch_add(1, Ordering::Relaxed);
        let mut docs = self.matching(&spec.filter)?;
        if !spec.sort.is_empty() {
            let keys = parse_sort_keys(&spec.sort);
            docs.sort_by(|a, b| compare_docs(a, b, &keys));
        }
        let limit = if spec.limit == 0 { usize::MAX } else { spec.limit };
        let docs: Vec<Document> = docs
            .into_iter()
            .skip(spec.skip)
            .take(limit)
            .map(|d| match &spec.projection {
                Some(p) => project(&d, p),
                None => d,
            })
            .collect();
        Ok(self.stream(docs))
    }

    fn aggregate(&self, spec: &PipelineSpec) -> Result<DocIter, DriverError> {
        self.check()?;
        self.store.stats.pipelines.fetch_add(1, Ordering::Relaxed);
        let docs = self.matching(&Document::new())?;
        let out = super::pipeline::run(docs, &spec.stages)?;
        Ok(self.stream(out))
    }

    fn insert(&self, doc: Document) -> Result<Bson, DriverError> {
        self.check()?;
        self.store.stats.writes.fetch_add(1, Ordering::Relaxed);
        let mut cols = self.store.collections.write();
        Self::insert_locked(cols.entry(self.key.clone()).or_default(), doc)
    }

    fn update_one(
        &self,
        filter: &Document,
        update: &Document,
    ) -> Result<UpdateReport, DriverError> {
        self.check()?;
        self.store.stats.writes.fetch_add(1, Ordering::Relaxed);
        self.update(filter, update, false)
    }

    fn update_many(
        &self,
        filter: &Document,
        update: &Document,
    ) -> Result<UpdateReport, DriverError> {
        self.check()?;
        if !is_operator_update(update) {
            return Err(DriverError::Invalid("multi update requires update operators".into()));
        }
        self.store.stats.writes.fetch_add(1, Ordering::Relaxed);
        self.update(filter, update, true)
    }

    fn remove_one(&self, filter: &Document) -> Result<DeleteReport, DriverError> {
        self.check()?;
        self.store.stats.writes.fetch_add(1, Ordering::Relaxed);
        self.remove(filter, false)
    }

    fn remove_many(&self, filter: &Document) -> Result<DeleteReport, DriverError> {
        self.check()?;
        self.store.stats.writes.fetch_add(1, Ordering::Relaxed);
        self.remove(filter, true)
    }

    fn upsert(&self, filter: &Document, update: &Document) -> Result<UpsertReport, DriverError> {
        self.check()?;
        self.store.stats.writes.fetch_add(1, Ordering::Relaxed);
        let mut cols = self.store.collections.write();
        let col = cols.entry(self.key.clone()).or_default();
        for d in col.iter_mut() {
            if matches(d, filter)? {
                let modified = u64::from(apply(d, update)?);
                return Ok(UpsertReport { matched: 1, modified, upserted_id: None });
            }
        }
        let mut fresh = equality_seed(filter);
        if is_operator_update(update) {
            apply(&mut fresh, update)?;
        } else {
            for (k, v) in update {
                fresh.insert(k.clone(), v.clone());
            }
        }
        let id = Self::insert_locked(col, fresh)?;
        Ok(UpsertReport { matched: 0, modified: 0, upserted_id: Some(id) })
    }
}
