use std::collections::BTreeMap;

use super::part::{AggrInfo, Filter, PartKind, QueryPart};

/// Mutation kinds in the order `Query::exec` picks them when several are present.
pub const MUTATION_PRECEDENCE: [PartKind; 4] =
    [PartKind::Delete, PartKind::Insert, PartKind::Update, PartKind::Save];

/// Query parts bucketed by kind. Each bucket keeps the parts in their original order;
/// absent kinds have no bucket.
#[derive(Debug, Default, Clone)]
pub struct GroupedParts<'a> {
    groups: BTreeMap<PartKind, Vec<&'a QueryPart>>,
}

#[must_use]
pub fn classify(parts: &[QueryPart]) -> GroupedParts<'_> {
    let mut groups: BTreeMap<PartKind, Vec<&QueryPart>> = BTreeMap::new();
    for p in parts {
        groups.entry(p.kind()).or_default().push(p);
    }
    GroupedParts { groups }
}

impl<'a> GroupedParts<'a> {
    #[must_use]
    pub fn has(&self, kind: PartKind) -> bool {
        self.groups.contains_key(&kind)
    }

    #[must_use]
    pub fn get(&self, kind: PartKind) -> Option<&[&'a QueryPart]> {
        self.groups.get(&kind).map(Vec::as_slice)
    }

    pub fn kinds(&self) -> impl Iterator<Item = PartKind> + '_ {
        self.groups.keys().copied()
    }

    /// Every `From` table name, in order.
    #[must_use]
    pub fn sources(&self) -> Vec<&'a str> {
        self.iter_kind(PartKind::From)
            .filter_map(|p| match p {
                QueryPart::From(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Union of every `Select` field, first occurrence wins the position.
    #[must_use]
    pub fn select_fields(&self) -> Vec<&'a str> {
        let mut out: Vec<&str> = Vec::new();
        for p in self.iter_kind(PartKind::Select) {
            if let QueryPart::Select(fields) = p {
                for f in fields {
                    if !out.contains(&f.as_str()) {
                        out.push(f);
                    }
                }
            }
        }
        out
    }

    /// Concatenation of every `Order` field list.
    #[must_use]
    pub fn order_fields(&self) -> Vec<&'a str> {
        self.iter_kind(PartKind::Order)
            .filter_map(|p| match p {
                QueryPart::Order(fields) => Some(fields),
                _ => None,
            })
            .flatten()
            .map(String::as_str)
            .collect()
    }

    /// Every predicate of every `Where` part, flattened in order.
    #[must_use]
    pub fn filters(&self) -> Vec<&'a Filter> {
        self.iter_kind(PartKind::Where)
            .filter_map(|p| match p {
                QueryPart::Where(fs) => Some(fs),
                _ => None,
            })
            .flatten()
            .collect()
    }

    #[must_use]
    pub fn aggregates(&self) -> Vec<&'a AggrInfo> {
        self.iter_kind(PartKind::Aggregate)
            .filter_map(|p| match p {
                QueryPart::Aggregate(a) => Some(a),
                _ => None,
            })
            .collect()
    }

    /// First `Skip` value.
    #[must_use]
    pub fn skip(&self) -> Option<usize> {
        self.iter_kind(PartKind::Skip).find_map(|p| match p {
            QueryPart::Skip(n) => Some(*n),
            _ => None,
        })
    }

    /// First `Take` value.
    #[must_use]
    pub fn take(&self) -> Option<usize> {
        self.iter_kind(PartKind::Take).find_map(|p| match p {
            QueryPart::Take(n) => Some(*n),
            _ => None,
        })
    }

    /// Mutation kinds present, highest precedence first.
    #[must_use]
    pub fn mutation_kinds(&self) -> Vec<PartKind> {
        MUTATION_PRECEDENCE.into_iter().filter(|k| self.has(*k)).collect()
    }

    #[must_use]
    pub fn mutation(&self) -> Option<PartKind> {
        MUTATION_PRECEDENCE.into_iter().find(|k| self.has(*k))
    }

    fn iter_kind(&self, kind: PartKind) -> impl Iterator<Item = &'a QueryPart> + '_ {
        self.groups.get(&kind).into_iter().flatten().copied()
    }
}
