use crate::errors::DriverError;
use bson::{Bson, Document};
use std::cmp::Ordering;

use super::eval::{as_f64, compare_bson, compare_docs, get_path, is_num, matches, project};

/// Runs `stages` over `docs` in order.
pub(crate) fn run(mut docs: Vec<Document>, stages: &[Document]) -> Result<Vec<Document>, DriverError> {
    for stage in stages {
        let mut it = stage.iter();
        let (Some((name, arg)), None) = (it.next(), it.next()) else {
            return Err(DriverError::Invalid("a stage must have exactly one operator".into()));
        };
        docs = match (name.as_str(), arg) {
            ("$match", Bson::Document(filter)) => {
                let mut out = Vec::with_capacity(docs.len());
                for d in docs {
                    if matches(&d, filter)? {
                        out.push(d);
                    }
                }
                out
            }
            ("$group", Bson::Document(spec)) => group(&docs, spec)?,
            ("$sort", Bson::Document(spec)) => {
                let keys: Vec<(String, bool)> = spec
                    .iter()
                    .map(|(k, v)| (k.clone(), is_num(v) && as_f64(v) < 0.0))
                    .collect();
                docs.sort_by(|a, b| compare_docs(a, b, &keys));
                docs
            }
            ("$skip", n) => {
                let n = count_arg(name, n)?;
                docs.into_iter().skip(n).collect()
            }
            ("$limit", n) => {
                let n = count_arg(name, n)?;
                docs.truncate(n);
                docs
            }
            ("$project", Bson::Document(spec)) => docs.iter().map(|d| project(d, spec)).collect(),
            (other, _) => {
                return Err(DriverError::Unsupported(format!("pipeline stage {other}")));
            }
        };
    }
    Ok(docs)
}

fn count_arg(stage: &str, v: &Bson) -> Result<usize, DriverError> {
    let n = match v {
        Bson::Int32(i) => i64::from(*i),
        Bson::Int64(i) => *i,
        _ => return Err(DriverError::Invalid(format!("{stage} expects an integer"))),
    };
    usize::try_from(n).map_err(|_| DriverError::Invalid(format!("{stage} must not be negative")))
}

/// Resolves a `$field` reference or returns the literal value.
fn operand<'a>(doc: &'a Document, expr: &'a Bson) -> Option<&'a Bson> {
    match expr {
        Bson::String(s) if s.starts_with('$') => get_path(doc, &s[1..]),
        other => Some(other),
    }
}

#[derive(Default)]
struct Acc {
    int_sum: i64,
    float_sum: f64,
    floats: bool,
    n: u64,
    min: Option<Bson>,
    max: Option<Bson>,
}

impl Acc {
    fn push(&mut self, v: &Bson) {
        match v {
            Bson::Int32(i) => self.int_sum = self.int_sum.saturating_add(i64::from(*i)),
            Bson::Int64(i) => self.int_sum = self.int_sum.saturating_add(*i),
            Bson::Double(f) => {
                self.float_sum += f;
                self.floats = true;
            }
            _ => {}
        }
        if is_num(v) {
            self.n += 1;
        }
        if !matches!(v, Bson::Null) {
            if self.min.as_ref().is_none_or(|m| compare_bson(v, m) == Ordering::Less) {
                self.min = Some(v.clone());
            }
            if self.max.as_ref().is_none_or(|m| compare_bson(v, m) == Ordering::Greater) {
                self.max = Some(v.clone());
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(&self, op: &str) -> Bson {
        match op {
            "$sum" if self.floats => Bson::Double(self.float_sum + self.int_sum as f64),
            "$sum" => i32::try_from(self.int_sum).map_or(Bson::Int64(self.int_sum), Bson::Int32),
            "$avg" if self.n == 0 => Bson::Null,
            "$avg" => Bson::Double((self.float_sum + self.int_sum as f64) / self.n as f64),
            "$min" => self.min.clone().unwrap_or(Bson::Null),
            _ => self.max.clone().unwrap_or(Bson::Null),
        }
    }
}

fn group(docs: &[Document], spec: &Document) -> Result<Vec<Document>, DriverError> {
    let key_expr = spec.get("_id").ok_or_else(|| DriverError::Invalid("$group requires _id".into()))?;

    let mut fields: Vec<(String, String, Bson)> = Vec::new();
    for (alias, acc) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
        let Bson::Document(acc) = acc else {
            return Err(DriverError::Invalid(format!("accumulator for {alias} must be a document")));
        };
        let Some((op, expr)) = acc.iter().next() else {
            return Err(DriverError::Invalid(format!("empty accumulator for {alias}")));
        };
        if !matches!(op.as_str(), "$sum" | "$avg" | "$min" | "$max") {
            return Err(DriverError::Unsupported(format!("accumulator {op}")));
        }
        fields.push((alias.clone(), op.clone(), expr.clone()));
    }

    // Groups keep first-seen order.
    let mut groups: Vec<(Bson, Vec<Acc>)> = Vec::new();
    for d in docs {
        let key = operand(d, key_expr).cloned().unwrap_or(Bson::Null);
        let idx = match groups.iter().position(|(k, _)| super::eval::bson_eq(k, &key)) {
            Some(i) => i,
            None => {
                groups.push((key, fields.iter().map(|_| Acc::default()).collect()));
                groups.len() - 1
            }
        };
        for ((_, _, expr), acc) in fields.iter().zip(groups[idx].1.iter_mut()) {
            if let Some(v) = operand(d, expr) {
                acc.push(v);
            }
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, accs)| {
            let mut out = Document::new();
            out.insert("_id", key);
            for ((alias, op, _), acc) in fields.iter().zip(accs.iter()) {
                out.insert(alias.clone(), acc.finish(op));
            }
            out
        })
        .collect())
}
