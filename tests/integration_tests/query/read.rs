use crate::integration_tests::_support::{opened, setup};
use bson::{Bson, doc};
use docbridge::query::{ReadKind, ReadPlan};
use docbridge::{
    AggrInfo, AggrOp, CmpOp, DbError, Filter, QueryConfig, QueryPart, ResultType, StoreOp,
};
use serde::Deserialize;

#[test]
fn missing_source_fails_before_store() {
    let (store, conn) = setup();
    let err = conn.query([QueryPart::filter(Filter::field_eq("_id", 5))]).cursor().unwrap_err();
    assert!(matches!(err, DbError::InvalidQuery(_)));
    let err = conn.query([QueryPart::Delete]).exec(None).unwrap_err();
    assert!(matches!(err, DbError::InvalidQuery(_)));
    assert_eq!(store.stats().total_calls(), 0);
    assert_eq!(opened(&store), 1);
}

#[test]
fn read_with_mutation_is_invalid_operation() {
    let (store, conn) = setup();
    for m in [QueryPart::Insert, QueryPart::Update, QueryPart::Delete, QueryPart::Save] {
        let err = conn.query([QueryPart::source("users"), m]).cursor().unwrap_err();
        assert!(matches!(err, DbError::InvalidOperation(_)));
    }
    assert_eq!(store.stats().total_calls(), 0);
    assert_eq!(opened(&store), 1);
}

#[test]
fn find_by_id_returns_exact_match() {
    let (_store, conn) = setup();
    let mut cur = conn
        .query([QueryPart::source("users"), QueryPart::filter(Filter::field_eq("_id", 5))])
        .cursor()
        .unwrap();
    assert_eq!(cur.result_type(), ResultType::SimpleFind);
    assert_eq!(cur.count(), 1);
    let all = cur.fetch_all().unwrap();
    assert_eq!(all, vec![doc! {"_id": 5, "name": "erin", "age": 35, "tier": "gold"}]);
    assert!(cur.fetch().unwrap().is_none());
}

#[test]
fn count_ignores_skip_and_take() {
    let (_store, conn) = setup();
    let mut cur = conn
        .query([
            QueryPart::source("users"),
            QueryPart::filter(Filter::field_eq("tier", "gold")),
            QueryPart::order(["-age"]),
            QueryPart::Skip(1),
            QueryPart::Take(1),
        ])
        .cursor()
        .unwrap();
    assert_eq!(cur.count(), 3);
    let page = cur.fetch_all().unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].get_str("name").unwrap(), "alice");
}

#[test]
fn count_stays_total_while_paging() {
    let (_store, conn) = setup();
    let mut cur = conn
        .query([QueryPart::source("users"), QueryPart::order(["_id"]), QueryPart::Take(2)])
        .cursor()
        .unwrap();
    assert_eq!(cur.count(), 5);
    let first = cur.fetch().unwrap().unwrap();
    assert_eq!(first.get_i32("_id").unwrap(), 1);
    assert_eq!(cur.count(), 5);
    let rest: Vec<_> = cur.iter().collect::<Result<_, _>>().unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(cur.count(), 5);
}

#[test]
fn where_parts_are_conjunctive_and_select_projects() {
    let (_store, conn) = setup();
    let mut cur = conn
        .query([
            QueryPart::source("users"),
            QueryPart::filter(Filter::field_eq("tier", "gold")),
            QueryPart::Where(vec![Filter::cmp("age", CmpOp::Gte, 30)]),
            QueryPart::select(["name"]),
            QueryPart::order(["name"]),
        ])
        .cursor()
        .unwrap();
    let names: Vec<String> =
        cur.iter().map(|d| d.unwrap().get_str("name").unwrap().to_string()).collect();
    assert_eq!(names, vec!["alice", "erin"]);
}

#[test]
fn select_handles_id_only_and_nested_fields() {
    let (store, conn) = setup();
    store.seed("shop", "profiles", [doc! {"_id": 1, "name": "u1", "a": {"b": 1, "c": 0}}]);

    let mut cur = conn
        .query([QueryPart::source("profiles"), QueryPart::select(["_id"]), QueryPart::Take(1)])
        .cursor()
        .unwrap();
    assert_eq!(cur.fetch_all().unwrap(), vec![doc! {"_id": 1}]);

    let mut cur =
        conn.query([QueryPart::source("profiles"), QueryPart::select(["a.b"])]).cursor().unwrap();
    assert_eq!(cur.fetch_all().unwrap(), vec![doc! {"_id": 1, "a": {"b": 1}}]);
}

#[test]
fn count_can_be_disabled() {
    let (store, conn) = setup();
    let mut q = conn.query([QueryPart::source("users")]);
    q.configure(&doc! {"count": false}).unwrap();
    let mut cur = q.cursor().unwrap();
    assert_eq!(cur.count(), 0);
    assert_eq!(cur.fetch_n(10).unwrap().len(), 5);
    assert_eq!(store.stats().counts.load(std::sync::atomic::Ordering::Relaxed), 0);
}

#[test]
fn typed_fetch() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        name: String,
        age: i32,
    }
    let (_store, conn) = setup();
    let mut cur = conn
        .query([QueryPart::source("users"), QueryPart::order(["age"]), QueryPart::Take(2)])
        .cursor()
        .unwrap();
    let first: Option<User> = cur.fetch_as().unwrap();
    assert_eq!(first, Some(User { name: "carol".into(), age: 27 }));
}

#[test]
fn aggregation_sum_through_pipeline() {
    let (_store, conn) = setup();
    let mut cur = conn
        .query([
            QueryPart::source("orders"),
            QueryPart::filter(Filter::field_eq("status", "paid")),
            QueryPart::Aggregate(AggrInfo::new(AggrOp::Sum, "amount", "total")),
        ])
        .cursor()
        .unwrap();
    assert_eq!(cur.result_type(), ResultType::Pipeline);
    assert_eq!(cur.count(), 0);
    let row = cur.fetch().unwrap().unwrap();
    assert_eq!(row.get("_id"), Some(&Bson::Null));
    assert_eq!(row.get_f64("total").unwrap(), 17.5);
    assert!(cur.fetch().unwrap().is_none());
}

#[test]
fn several_accumulators_in_one_group() {
    let (_store, conn) = setup();
    let rows = conn
        .query([
            QueryPart::source("users"),
            QueryPart::Aggregate(AggrInfo::new(AggrOp::Min, "age", "youngest")),
            QueryPart::Aggregate(AggrInfo::new(AggrOp::Max, "age", "oldest")),
            QueryPart::Aggregate(AggrInfo::new(AggrOp::Avg, "age", "mean")),
        ])
        .cursor()
        .unwrap()
        .fetch_all()
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_i32("youngest").unwrap(), 27);
    assert_eq!(rows[0].get_i32("oldest").unwrap(), 52);
    assert_eq!(rows[0].get_f64("mean").unwrap(), 37.0);
}

#[test]
fn select_narrows_aggregate_rows() {
    let (_store, conn) = setup();
    let rows = conn
        .query([
            QueryPart::source("users"),
            QueryPart::Aggregate(AggrInfo::new(AggrOp::Min, "age", "youngest")),
            QueryPart::Aggregate(AggrInfo::new(AggrOp::Max, "age", "oldest")),
            QueryPart::select(["oldest"]),
        ])
        .cursor()
        .unwrap()
        .fetch_all()
        .unwrap();
    assert_eq!(rows, vec![doc! {"oldest": 52}]);
}

#[test]
fn duplicate_alias_fails_before_store() {
    let (store, conn) = setup();
    let err = conn
        .query([
            QueryPart::source("users"),
            QueryPart::Aggregate(AggrInfo::new(AggrOp::Min, "age", "a")),
            QueryPart::Aggregate(AggrInfo::new(AggrOp::Max, "age", "a")),
        ])
        .cursor()
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidQuery(_)));
    assert_eq!(store.stats().total_calls(), 0);
}

#[test]
fn median_is_rejected_without_store_call() {
    let (store, conn) = setup();
    let err = conn
        .query([
            QueryPart::source("orders"),
            QueryPart::Aggregate(AggrInfo::new(AggrOp::Median, "amount", "m")),
        ])
        .cursor()
        .unwrap_err();
    assert!(matches!(err, DbError::UnsupportedAggregate(_)));
    assert_eq!(store.stats().total_calls(), 0);
}

#[test]
fn filter_build_failure_aborts() {
    let (store, conn) = setup();
    let err = conn
        .query([QueryPart::source("users"), QueryPart::filter(Filter::Or(vec![]))])
        .cursor()
        .unwrap_err();
    assert!(matches!(err, DbError::FilterBuild(_)));
    assert_eq!(store.stats().total_calls(), 0);
}

#[test]
fn prepare_exposes_compiled_read() {
    let (_store, conn) = setup();
    let q = conn.query([
        QueryPart::source("users"),
        QueryPart::select(["name", "age"]),
        QueryPart::select(["age"]),
        QueryPart::Take(3),
    ]);
    let docbridge::query::QueryPlan::Read(ReadPlan { collection, kind: ReadKind::Find(spec) }) =
        q.prepare(None).unwrap()
    else {
        panic!("expected a find plan");
    };
    assert_eq!(collection, "users");
    assert_eq!(spec.projection, Some(doc! {"name": 1, "age": 1}));
    assert_eq!(spec.limit, 3);
}

#[test]
fn closed_connection_surfaces_store_error() {
    let (_store, conn) = setup();
    conn.close();
    let err = conn
        .query([QueryPart::source("users")])
        .with_config(QueryConfig::default().pooling(true))
        .cursor()
        .unwrap_err();
    assert_eq!(err.store_op(), Some(StoreOp::Session));
}

#[test]
fn custom_filter_builder_is_used() {
    use docbridge::query::FilterBuilder;
    use std::sync::Arc;

    // Ignores every predicate and only lets gold users through.
    struct GoldOnly;
    impl FilterBuilder for GoldOnly {
        fn add_filter(&mut self, _filter: &Filter) {}
        fn build(&mut self) -> Result<bson::Document, DbError> {
            Ok(doc! {"tier": "gold"})
        }
    }

    let (store, _conn) = setup();
    let conn = docbridge::Connection::new(
        docbridge::ConnectionInfo::new(crate::integration_tests::_support::DB),
        store.connect(),
    )
    .with_filter_builder(Arc::new(|| Box::new(GoldOnly) as Box<dyn FilterBuilder>));
    let cur = conn
        .query([QueryPart::source("users"), QueryPart::filter(Filter::field_eq("_id", 2))])
        .cursor()
        .unwrap();
    assert_eq!(cur.count(), 3);
}
