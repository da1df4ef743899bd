use docbridge::query::{PartKind, classify};
use docbridge::{Filter, QueryPart};
use proptest::prelude::*;

fn part() -> impl Strategy<Value = QueryPart> {
    prop_oneof![
        "[a-z]{1,6}".prop_map(QueryPart::From),
        proptest::collection::vec("[a-z]{1,4}", 0..3).prop_map(QueryPart::select::<Vec<String>, String>),
        (any::<i32>(), "[a-z]{1,4}").prop_map(|(v, p)| QueryPart::filter(Filter::field_eq(p, v))),
        proptest::collection::vec("-?[a-z]{1,4}", 0..3).prop_map(QueryPart::order::<Vec<String>, String>),
        (0usize..100).prop_map(QueryPart::Skip),
        (0usize..100).prop_map(QueryPart::Take),
        Just(QueryPart::Insert),
        Just(QueryPart::Update),
        Just(QueryPart::Delete),
        Just(QueryPart::Save),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn prop_classify_keeps_every_part_in_order(parts in proptest::collection::vec(part(), 0..24)) {
        let grouped = classify(&parts);
        let mut total = 0;
        for kind in grouped.kinds() {
            let bucket = grouped.get(kind).unwrap_or_default();
            prop_assert!(!bucket.is_empty());
            let expected: Vec<&QueryPart> = parts.iter().filter(|p| p.kind() == kind).collect();
            prop_assert_eq!(bucket, expected.as_slice());
            total += bucket.len();
        }
        prop_assert_eq!(total, parts.len());
        for p in &parts {
            prop_assert!(grouped.has(p.kind()));
        }
    }

    #[test]
    fn prop_mutation_follows_precedence(parts in proptest::collection::vec(part(), 0..24)) {
        let grouped = classify(&parts);
        let present = |k: PartKind| parts.iter().any(|p| p.kind() == k);
        let expected = [PartKind::Delete, PartKind::Insert, PartKind::Update, PartKind::Save]
            .into_iter()
            .find(|k| present(*k));
        prop_assert_eq!(grouped.mutation(), expected);
    }
}
