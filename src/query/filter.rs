//! Translation of [`Filter`] predicates into native filter documents.

use crate::errors::DbError;
use bson::{Bson, Document, doc};

use super::part::{CmpOp, Filter};

pub(crate) const MAX_PATH_DEPTH: usize = 32;
pub(crate) const MAX_IN_SET: usize = 1000;

/// Accumulates predicates and turns them into one native filter expression.
pub trait FilterBuilder: Send {
    fn add_filter(&mut self, filter: &Filter);

    /// Builds the conjunction of every added predicate. No predicates builds the
    /// match-all filter.
    ///
    /// # Errors
    /// Returns `DbError::FilterBuild` when a predicate cannot be expressed.
    fn build(&mut self) -> Result<Document, DbError>;
}

/// Produces a fresh builder per query.
pub type FilterBuilderFactory = std::sync::Arc<dyn Fn() -> Box<dyn FilterBuilder> + Send + Sync>;

/// Builds bson filter documents in the `{field: {$op: value}}` dialect.
#[derive(Debug, Default, Clone)]
pub struct BsonFilterBuilder {
    filters: Vec<Filter>,
}

impl BsonFilterBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl FilterBuilder for BsonFilterBuilder {
    fn add_filter(&mut self, filter: &Filter) {
        self.filters.push(filter.clone());
    }

    fn build(&mut self) -> Result<Document, DbError> {
        let parts = self
            .filters
            .drain(..)
            .map(|f| translate(&f))
            .collect::<Result<Vec<_>, _>>()?;
        let mut parts: Vec<Document> = parts.into_iter().filter(|d| !d.is_empty()).collect();
        Ok(match parts.len() {
            0 => Document::new(),
            1 => parts.remove(0),
            _ => doc! {"$and": parts},
        })
    }
}

fn check_path(path: &str) -> Result<(), DbError> {
    if path.is_empty() {
        return Err(DbError::FilterBuild("empty field path".into()));
    }
    if path.starts_with('$') {
        return Err(DbError::FilterBuild(format!("field path {path} must not start with $")));
    }
    if path.split('.').count() > MAX_PATH_DEPTH {
        return Err(DbError::FilterBuild(format!("field path {path} is too deep")));
    }
    Ok(())
}

fn check_set(path: &str, values: &[Bson]) -> Result<(), DbError> {
    if values.len() > MAX_IN_SET {
        return Err(DbError::FilterBuild(format!(
            "set for {path} has {} values, limit is {MAX_IN_SET}",
            values.len()
        )));
    }
    Ok(())
}

const fn op_name(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Eq => "$eq",
        CmpOp::Ne => "$ne",
        CmpOp::Gt => "$gt",
        CmpOp::Gte => "$gte",
        CmpOp::Lt => "$lt",
        CmpOp::Lte => "$lte",
    }
}

fn translate_all(op: &str, fs: &[Filter]) -> Result<Document, DbError> {
    if fs.is_empty() {
        return Err(DbError::FilterBuild(format!("{op} requires at least one filter")));
    }
    let docs = fs.iter().map(translate).collect::<Result<Vec<_>, _>>()?;
    Ok(doc! {op: docs})
}

fn translate(f: &Filter) -> Result<Document, DbError> {
    Ok(match f {
        Filter::True => Document::new(),
        Filter::And(fs) => translate_all("$and", fs)?,
        Filter::Or(fs) => translate_all("$or", fs)?,
        Filter::Not(inner) => doc! {"$nor": [translate(inner)?]},
        Filter::Exists { path, exists } => {
            check_path(path)?;
            doc! {path: {"$exists": *exists}}
        }
        Filter::In { path, values } => {
            check_path(path)?;
            check_set(path, values)?;
            doc! {path: {"$in": values.clone()}}
        }
        Filter::Nin { path, values } => {
            check_path(path)?;
            check_set(path, values)?;
            doc! {path: {"$nin": values.clone()}}
        }
        Filter::Cmp { path, op, value } => {
            check_path(path)?;
            doc! {path: {op_name(*op): value.clone()}}
        }
        #[cfg(feature = "regex")]
        Filter::Regex { path, pattern, case_insensitive } => {
            check_path(path)?;
            regex::Regex::new(pattern).map_err(|e| DbError::FilterBuild(e.to_string()))?;
            let options = if *case_insensitive { "i" } else { "" };
            doc! {path: {"$regex": pattern.clone(), "$options": options}}
        }
    })
}

/// Feeds every predicate to a builder and builds once.
///
/// # Errors
/// Propagates the builder's failure.
pub fn resolve(builder: &mut dyn FilterBuilder, filters: &[&Filter]) -> Result<Document, DbError> {
    for f in filters {
        builder.add_filter(f);
    }
    builder.build()
}
