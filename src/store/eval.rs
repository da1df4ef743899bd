//! Evaluation of native filter, sort and projection documents against stored documents.

use super::update::{set_path, unset_path};
use crate::errors::DriverError;
use bson::{Bson, Document};
use std::cmp::Ordering;

pub(crate) const MAX_PATH_DEPTH: usize = 32;

/// Returns true when `doc` satisfies every clause of the native `filter` document.
///
/// # Errors
/// Fails on operators the memory driver does not understand.
pub fn matches(doc: &Document, filter: &Document) -> Result<bool, DriverError> {
    for (key, cond) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for f in clause_list(key, cond)? {
                    if !matches(doc, f)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for f in clause_list(key, cond)? {
                    if matches(doc, f)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for f in clause_list(key, cond)? {
                    if matches(doc, f)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            op if op.starts_with('$') => {
                return Err(DriverError::Unsupported(format!("top-level operator {op}")));
            }
            path => match_field(get_path(doc, path), cond)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clause_list<'a>(op: &str, cond: &'a Bson) -> Result<Vec<&'a Document>, DriverError> {
    let Bson::Array(items) = cond else {
        return Err(DriverError::Invalid(format!("{op} expects an array")));
    };
    items
        .iter()
        .map(|b| match b {
            Bson::Document(d) => Ok(d),
            _ => Err(DriverError::Invalid(format!("{op} expects documents"))),
        })
        .collect()
}

fn is_operator_doc(cond: &Bson) -> Option<&Document> {
    match cond {
        Bson::Document(d) if d.keys().next().is_some_and(|k| k.starts_with('$')) => Some(d),
        _ => None,
    }
}

fn match_field(value: Option<&Bson>, cond: &Bson) -> Result<bool, DriverError> {
    let Some(ops) = is_operator_doc(cond) else {
        return Ok(value.is_some_and(|v| equals_or_contains(v, cond)));
    };
    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$eq" => value.is_some_and(|v| equals_or_contains(v, arg)),
            "$ne" => !value.is_some_and(|v| equals_or_contains(v, arg)),
            "$gt" => value.is_some_and(|v| comparable(v, arg) && compare_bson(v, arg).is_gt()),
            "$gte" => value.is_some_and(|v| comparable(v, arg) && compare_bson(v, arg).is_ge()),
            "$lt" => value.is_some_and(|v| comparable(v, arg) && compare_bson(v, arg).is_lt()),
            "$lte" => value.is_some_and(|v| comparable(v, arg) && compare_bson(v, arg).is_le()),
            "$in" => {
                let set = set_of(op, arg)?;
                value.is_some_and(|v| in_set(v, set))
            }
            "$nin" => {
                let set = set_of(op, arg)?;
                !value.is_some_and(|v| in_set(v, set))
            }
            "$exists" => value.is_some() == arg.as_bool().unwrap_or(true),
            "$not" => !match_field(value, arg)?,
            "$regex" => regex_match(value, arg, ops.get_str("$options").unwrap_or(""))?,
            "$options" => true,
            other => return Err(DriverError::Unsupported(format!("field operator {other}"))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn set_of<'a>(op: &str, arg: &'a Bson) -> Result<&'a [Bson], DriverError> {
    match arg {
        Bson::Array(items) => Ok(items.as_slice()),
        _ => Err(DriverError::Invalid(format!("{op} expects an array"))),
    }
}

fn in_set(v: &Bson, set: &[Bson]) -> bool {
    set.iter().any(|x| equals_or_contains(v, x))
}

#[cfg(feature = "regex")]
fn regex_match(value: Option<&Bson>, pattern: &Bson, options: &str) -> Result<bool, DriverError> {
    let Bson::String(pattern) = pattern else {
        return Err(DriverError::Invalid("$regex expects a string".into()));
    };
    let re = regex::RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .build()
        .map_err(|e| DriverError::Invalid(e.to_string()))?;
    Ok(matches!(value, Some(Bson::String(s)) if re.is_match(s)))
}

#[cfg(not(feature = "regex"))]
fn regex_match(_value: Option<&Bson>, _pattern: &Bson, _options: &str) -> Result<bool, DriverError> {
    Err(DriverError::Unsupported("$regex requires the regex feature".into()))
}

/// Equality with numeric widening; an array value matches when any element is equal.
fn equals_or_contains(v: &Bson, target: &Bson) -> bool {
    if bson_eq(v, target) {
        return true;
    }
    match v {
        Bson::Array(items) => items.iter().any(|x| bson_eq(x, target)),
        _ => false,
    }
}

pub(crate) fn bson_eq(a: &Bson, b: &Bson) -> bool {
    if is_num(a) && is_num(b) {
        return as_f64(a) == as_f64(b);
    }
    a == b
}

fn comparable(a: &Bson, b: &Bson) -> bool {
    (is_num(a) && is_num(b)) || type_rank(a) == type_rank(b)
}

/// Resolves a dotted path such as `address.city`.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    if path.is_empty() {
        return None;
    }
    let mut cur = doc;
    let mut segs = path.split('.').enumerate().peekable();
    while let Some((depth, seg)) = segs.next() {
        if depth >= MAX_PATH_DEPTH {
            return None;
        }
        let v = cur.get(seg)?;
        if segs.peek().is_none() {
            return Some(v);
        }
        match v {
            Bson::Document(d) => cur = d,
            _ => return None,
        }
    }
    None
}

pub(crate) fn is_num(x: &Bson) -> bool {
    matches!(x, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn as_f64(x: &Bson) -> f64 {
    match x {
        Bson::Int32(i) => f64::from(*i),
        Bson::Int64(i) => *i as f64,
        Bson::Double(f) => *f,
        _ => f64::NAN,
    }
}

pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    if is_num(a) && is_num(b) {
        return as_f64(a).total_cmp(&as_f64(b));
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

// Numbers share one rank so mixed numeric types compare by value.
fn type_rank(v: &Bson) -> u8 {
    match v {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::Symbol(_) | Bson::String(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::DbPointer(_) => 12,
        Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => 13,
        Bson::MaxKey => 255,
    }
}

/// Parses `-field` / `+field` / `field` sort keys into `(field, descending)`.
pub fn parse_sort_keys(keys: &[String]) -> Vec<(String, bool)> {
    keys.iter()
        .filter(|k| !k.is_empty())
        .map(|k| {
            if let Some(f) = k.strip_prefix('-') {
                (f.to_string(), true)
            } else {
                (k.strip_prefix('+').unwrap_or(k).to_string(), false)
            }
        })
        .collect()
}

/// Orders two documents by the parsed sort keys; a missing field sorts first.
pub fn compare_docs(a: &Document, b: &Document, sort: &[(String, bool)]) -> Ordering {
    for (field, desc) in sort {
        let ord = match (get_path(a, field), get_path(b, field)) {
            (Some(x), Some(y)) => compare_bson(x, y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return if *desc { ord.reverse() } else { ord };
        }
    }
    Ordering::Equal
}

/// Applies a projection document. `{f: 1}` keeps `f` (and `_id` unless `{_id: 0}`),
/// a projection of only zeros removes the listed fields.
pub fn project(doc: &Document, projection: &Document) -> Document {
    let truthy = |b: &Bson| match b {
        Bson::Boolean(x) => *x,
        other if is_num(other) => as_f64(other) != 0.0,
        _ => true,
    };
    // `{_id: 1}` alone is an inclusion; `{_id: 0}` alone is an exclusion.
    let inclusive = projection.iter().any(|(k, v)| k != "_id" && truthy(v))
        || (projection.len() == 1 && projection.get("_id").is_some_and(truthy));
    if !inclusive {
        let mut out = doc.clone();
        for (k, v) in projection {
            if !truthy(v) {
                unset_path(&mut out, k);
            }
        }
        return out;
    }
    let keep_id = projection.get("_id").is_none_or(truthy);
    let mut out = Document::new();
    if keep_id && let Some(id) = doc.get("_id") {
        out.insert("_id", id.clone());
    }
    for (k, v) in projection {
        if k == "_id" || !truthy(v) {
            continue;
        }
        if let Some(val) = get_path(doc, k) {
            set_path(&mut out, k, val.clone());
        }
    }
    out
}
