//! Read and write compilers.
//!
//! Both are pure: they turn grouped query parts into a store request without opening a
//! session, so every validation error surfaces before the store is touched.

use crate::errors::{DbError, StoreOp};
use crate::store::{FindSpec, PipelineSpec};
use bson::{Bson, Document, doc};
use serde::Serialize;

use super::classify::GroupedParts;
use super::filter::{FilterBuilder, resolve};
use super::part::{AggrInfo, AggrOp, PartKind};

/// Which shape a read compiled to.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadKind {
    Find(FindSpec),
    Pipeline(PipelineSpec),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadPlan {
    pub collection: String,
    pub kind: ReadKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MutationKind {
    Insert,
    Update,
    Delete,
    Save,
}

impl MutationKind {
    #[must_use]
    pub const fn from_part(kind: PartKind) -> Option<Self> {
        match kind {
            PartKind::Insert => Some(Self::Insert),
            PartKind::Update => Some(Self::Update),
            PartKind::Delete => Some(Self::Delete),
            PartKind::Save => Some(Self::Save),
            _ => None,
        }
    }

    #[must_use]
    pub const fn store_op(self) -> StoreOp {
        match self {
            Self::Insert => StoreOp::Insert,
            Self::Update => StoreOp::Update,
            Self::Delete => StoreOp::Delete,
            Self::Save => StoreOp::Save,
        }
    }
}

/// Documents a write targets.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteScope {
    /// One document, addressed by `{_id: value}`.
    Single(Document),
    /// Every document matching the filter.
    Multi(Document),
}

impl WriteScope {
    #[must_use]
    pub const fn filter(&self) -> &Document {
        match self {
            Self::Single(f) | Self::Multi(f) => f,
        }
    }

    #[must_use]
    pub const fn is_single(&self) -> bool {
        matches!(self, Self::Single(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WritePlan {
    pub collection: String,
    pub kind: MutationKind,
    pub scope: WriteScope,
    /// Payload as it is sent to the store.
    pub data: Option<Document>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryPlan {
    Read(ReadPlan),
    Write(WritePlan),
}

/// Outcome of `Query::exec`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecReport {
    pub kind: MutationKind,
    pub matched: u64,
    pub modified: u64,
    pub deleted: u64,
    /// `_id` of a document the write created.
    pub upserted: Option<Bson>,
}

impl ExecReport {
    pub(crate) const fn new(kind: MutationKind) -> Self {
        Self { kind, matched: 0, modified: 0, deleted: 0, upserted: None }
    }
}

fn source<'a>(grouped: &GroupedParts<'a>) -> Result<&'a str, DbError> {
    match grouped.sources().as_slice() {
        [] => Err(DbError::InvalidQuery("missing source".into())),
        [one] => Ok(*one),
        _ => Err(DbError::InvalidQuery("multiple sources".into())),
    }
}

const fn accumulator(op: AggrOp) -> Option<&'static str> {
    match op {
        AggrOp::Sum => Some("$sum"),
        AggrOp::Avg => Some("$avg"),
        AggrOp::Min => Some("$min"),
        AggrOp::Max => Some("$max"),
        AggrOp::Median => None,
    }
}

fn group_stage(aggregates: &[&AggrInfo]) -> Result<Document, DbError> {
    let mut group = doc! {"_id": Bson::Null};
    for a in aggregates {
        let acc = accumulator(a.op).ok_or_else(|| DbError::UnsupportedAggregate(a.op.to_string()))?;
        if a.alias.is_empty() || a.alias == "_id" || a.alias.contains('.') {
            return Err(DbError::InvalidQuery(format!("invalid aggregate alias {:?}", a.alias)));
        }
        if a.field.is_empty() {
            return Err(DbError::InvalidQuery(format!("aggregate {} has no field", a.alias)));
        }
        if group.contains_key(&a.alias) {
            return Err(DbError::InvalidQuery(format!("duplicate aggregate alias {}", a.alias)));
        }
        group.insert(a.alias.clone(), doc! {acc: format!("${}", a.field)});
    }
    Ok(group)
}

/// Restricts grouped rows to the selected aliases. `_id` stays only when selected.
fn project_stage(group: &Document, select: &[&str]) -> Result<Document, DbError> {
    let mut project = doc! {"_id": i32::from(select.contains(&"_id"))};
    for f in select.iter().filter(|f| **f != "_id") {
        if !group.contains_key(*f) {
            return Err(DbError::InvalidQuery(format!(
                "selected field {f} is not an aggregate alias"
            )));
        }
        project.insert(*f, 1);
    }
    Ok(project)
}

/// Splits `-field` / `+field` / `field` into the field name and a direction.
fn sort_key(raw: &str) -> Result<(&str, i32), DbError> {
    let (name, dir) = match raw.as_bytes().first() {
        Some(b'-') => (&raw[1..], -1),
        Some(b'+') => (&raw[1..], 1),
        _ => (raw, 1),
    };
    if name.is_empty() {
        return Err(DbError::InvalidQuery(format!("invalid sort field {raw:?}")));
    }
    Ok((name, dir))
}

fn sort_stage(fields: &[&str]) -> Result<Document, DbError> {
    let mut sort = Document::new();
    for f in fields {
        let (name, dir) = sort_key(f)?;
        if !sort.contains_key(name) {
            sort.insert(name, dir);
        }
    }
    Ok(sort)
}

fn as_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Compiles a read: a simple find, or a pipeline when aggregates are present.
///
/// # Errors
/// `InvalidQuery` for a missing or repeated source, a duplicate aggregate alias or a
/// selected field that is not an alias; `InvalidOperation` when mutation parts are
/// present; `UnsupportedAggregate`; and filter builder failures.
pub fn compile_read(
    grouped: &GroupedParts<'_>,
    fb: &mut dyn FilterBuilder,
) -> Result<ReadPlan, DbError> {
    let collection = source(grouped)?.to_string();
    if let Some(kind) = grouped.mutation() {
        return Err(DbError::InvalidOperation(format!(
            "read query must not contain a {kind} part"
        )));
    }
    let filters = grouped.filters();
    let order = grouped.order_fields();
    let skip = grouped.skip().unwrap_or(0);
    let take = grouped.take().unwrap_or(0);

    let aggregates = grouped.aggregates();
    if !aggregates.is_empty() {
        let group = group_stage(&aggregates)?;
        let sort = sort_stage(&order)?;
        let select = grouped.select_fields();
        let project = (!select.is_empty()).then(|| project_stage(&group, &select)).transpose()?;
        let mut stages = Vec::new();
        if grouped.has(PartKind::Where) {
            stages.push(doc! {"$match": resolve(fb, &filters)?});
        }
        stages.push(doc! {"$group": group});
        if !sort.is_empty() {
            stages.push(doc! {"$sort": sort});
        }
        if skip > 0 {
            stages.push(doc! {"$skip": as_i64(skip)});
        }
        if take > 0 {
            stages.push(doc! {"$limit": as_i64(take)});
        }
        if let Some(project) = project {
            stages.push(doc! {"$project": project});
        }
        return Ok(ReadPlan {
            collection,
            kind: ReadKind::Pipeline(PipelineSpec { stages, allow_disk_use: true }),
        });
    }

    for f in &order {
        sort_key(f)?;
    }
    let select = grouped.select_fields();
    let projection = (!select.is_empty()).then(|| {
        let mut p = Document::new();
        for f in select {
            p.insert(f, 1);
        }
        p
    });
    let spec = FindSpec {
        filter: resolve(fb, &filters)?,
        projection,
        sort: order.into_iter().map(str::to_string).collect(),
        skip,
        limit: take,
    };
    Ok(ReadPlan { collection, kind: ReadKind::Find(spec) })
}

fn is_operator_doc(d: &Document) -> bool {
    d.keys().any(|k| k.starts_with('$'))
}

// Operator documents may carry `_id` only as the identity; every other key is an operator.
fn operator_payload(kind: MutationKind, mut d: Document) -> Result<Document, DbError> {
    if kind == MutationKind::Insert {
        return Err(DbError::InvalidQuery(format!("{kind:?} does not accept update operators")));
    }
    d.remove("_id");
    if let Some(plain) = d.keys().find(|k| !k.starts_with('$')) {
        return Err(DbError::InvalidQuery(format!(
            "cannot mix update operators with plain field {plain}"
        )));
    }
    Ok(d)
}

/// Compiles a write.
///
/// # Errors
/// `InvalidQuery` for a missing or repeated source, a missing payload, or a payload that
/// mixes update operators with plain fields. `InvalidOperation` without a mutation part,
/// and filter builder failures.
pub fn compile_write(
    grouped: &GroupedParts<'_>,
    fb: &mut dyn FilterBuilder,
    data: Option<Document>,
) -> Result<WritePlan, DbError> {
    let collection = source(grouped)?.to_string();
    let mutations = grouped.mutation_kinds();
    let Some(kind) = mutations.first().copied().and_then(MutationKind::from_part) else {
        return Err(DbError::InvalidOperation("exec requires a mutation part".into()));
    };
    if mutations.len() > 1 {
        log::warn!("{collection}: {kind:?} takes precedence, ignoring {:?}", &mutations[1..]);
    }
    if data.is_none() && kind != MutationKind::Delete {
        return Err(DbError::InvalidQuery(format!("{kind:?} requires a document")));
    }

    let identity = data.as_ref().and_then(|d| d.get("_id")).filter(|v| !matches!(v, Bson::Null));
    let scope = match identity {
        Some(id) => WriteScope::Single(doc! {"_id": id.clone()}),
        None => WriteScope::Multi(resolve(fb, &grouped.filters())?),
    };

    let data = match (kind, &scope, data) {
        (MutationKind::Delete, _, d) => d,
        (_, _, Some(d)) if is_operator_doc(&d) => Some(operator_payload(kind, d)?),
        (MutationKind::Update, WriteScope::Multi(_), Some(d)) => {
            let mut set = d;
            set.remove("_id");
            Some(doc! {"$set": set})
        }
        (_, _, d) => d,
    };
    Ok(WritePlan { collection, kind, scope, data })
}
