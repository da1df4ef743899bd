use crate::errors::DriverError;
use bson::{Bson, Document};

use super::eval::{as_f64, is_num};

/// True when the update document is made of `$`-operators rather than a replacement.
pub(crate) fn is_operator_update(update: &Document) -> bool {
    update.keys().any(|k| k.starts_with('$'))
}

/// Rejects top-level field names a stored document may not carry.
pub(crate) fn check_field_names(doc: &Document) -> Result<(), DriverError> {
    match doc.keys().find(|k| k.starts_with('$')) {
        Some(k) => Err(DriverError::Invalid(format!("field name {k} may not start with '$'"))),
        None => Ok(()),
    }
}

/// Applies an update document to `doc` in place and reports whether it changed.
///
/// Operator updates support `$set`, `$inc` and `$unset`. A plain document replaces
/// every field except `_id`, which is immutable.
pub(crate) fn apply(doc: &mut Document, update: &Document) -> Result<bool, DriverError> {
    if is_operator_update(update) {
        apply_operators(doc, update)
    } else {
        replace(doc, update)
    }
}

fn replace(doc: &mut Document, replacement: &Document) -> Result<bool, DriverError> {
    check_field_names(replacement)?;
    let id = doc.get("_id").cloned();
    if let (Some(old), Some(new)) = (&id, replacement.get("_id"))
        && !super::eval::bson_eq(old, new)
    {
        return Err(DriverError::Invalid("_id is immutable".into()));
    }
    let mut out = Document::new();
    if let Some(id) = id {
        out.insert("_id", id);
    }
    for (k, v) in replacement {
        if k != "_id" {
            out.insert(k.clone(), v.clone());
        }
    }
    let changed = out != *doc;
    *doc = out;
    Ok(changed)
}

fn apply_operators(doc: &mut Document, update: &Document) -> Result<bool, DriverError> {
    if let Some(plain) = update.keys().find(|k| !k.starts_with('$')) {
        return Err(DriverError::Invalid(format!(
            "cannot mix update operators with plain field {plain}"
        )));
    }
    let mut changed = false;
    for (op, arg) in update {
        let Bson::Document(fields) = arg else {
            return Err(DriverError::Invalid(format!("{op} expects a document")));
        };
        for (path, value) in fields {
            if path == "_id" {
                return Err(DriverError::Invalid("_id is immutable".into()));
            }
            changed |= match op.as_str() {
                "$set" => set_path(doc, path, value.clone()),
                "$inc" => {
                    if !is_num(value) {
                        return Err(DriverError::Invalid("$inc requires numeric".into()));
                    }
                    inc_path(doc, path, value)?
                }
                "$unset" => unset_path(doc, path),
                other if other.starts_with('$') => {
                    return Err(DriverError::Unsupported(format!("update operator {other}")));
                }
                other => {
                    return Err(DriverError::Invalid(format!(
                        "cannot mix field {other} with update operators"
                    )));
                }
            };
        }
    }
    Ok(changed)
}

fn ensure_subdoc<'a>(root: &'a mut Document, key: &str) -> &'a mut Document {
    if !matches!(root.get(key), Some(Bson::Document(_))) {
        root.insert(key.to_string(), Bson::Document(Document::new()));
    }
    match root.get_mut(key) {
        Some(Bson::Document(d)) => d,
        _ => unreachable!("sub-document inserted above"),
    }
}

fn traverse_to_parent<'a>(root: &'a mut Document, path: &str) -> (&'a mut Document, String) {
    let mut cur = root;
    let mut iter = path.split('.').peekable();
    let mut last = String::new();
    while let Some(seg) = iter.next() {
        if iter.peek().is_none() {
            last = seg.to_string();
            break;
        }
        cur = ensure_subdoc(cur, seg);
    }
    (cur, last)
}

/// Writes `value` at a dotted path, creating intermediate sub-documents.
pub(crate) fn set_path(root: &mut Document, path: &str, value: Bson) -> bool {
    let (parent, last) = traverse_to_parent(root, path);
    let old = parent.insert(last, value.clone());
    old.as_ref() != Some(&value)
}

/// Removes a dotted path. Missing intermediate documents are left alone.
pub(crate) fn unset_path(root: &mut Document, path: &str) -> bool {
    let (parents, last) = match path.rsplit_once('.') {
        Some((p, l)) => (Some(p), l),
        None => (None, path),
    };
    let mut cur = root;
    for seg in parents.into_iter().flat_map(|p| p.split('.')) {
        match cur.get_mut(seg) {
            Some(Bson::Document(d)) => cur = d,
            _ => return false,
        }
    }
    cur.remove(last).is_some()
}

// Integer plus integer stays integral; anything involving a double becomes a double.
fn inc_path(root: &mut Document, path: &str, by: &Bson) -> Result<bool, DriverError> {
    let cur = super::eval::get_path(root, path).cloned().unwrap_or(Bson::Int32(0));
    if !is_num(&cur) {
        return Err(DriverError::Invalid(format!("cannot $inc non-numeric field {path}")));
    }
    let next = match (&cur, by) {
        (Bson::Int32(a), Bson::Int32(b)) => {
            a.checked_add(*b).map_or(Bson::Int64(i64::from(*a) + i64::from(*b)), Bson::Int32)
        }
        (Bson::Int32(_) | Bson::Int64(_), Bson::Int32(_) | Bson::Int64(_)) => {
            let a = int_of(&cur);
            let b = int_of(by);
            Bson::Int64(a.saturating_add(b))
        }
        _ => Bson::Double(as_f64(&cur) + as_f64(by)),
    };
    Ok(set_path(root, path, next))
}

fn int_of(v: &Bson) -> i64 {
    match v {
        Bson::Int32(i) => i64::from(*i),
        Bson::Int64(i) => *i,
        _ => 0,
    }
}
