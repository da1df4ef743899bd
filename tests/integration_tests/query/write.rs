use crate::integration_tests::_support::{closed, docs, opened, setup};
use bson::{Bson, doc};
use docbridge::query::MutationKind;
use docbridge::{CmpOp, DbError, Filter, QueryConfig, QueryPart, StoreOp};
use serde::Serialize;

#[test]
fn insert_adds_document() {
    let (store, conn) = setup();
    let report = conn
        .query([QueryPart::source("users"), QueryPart::Insert])
        .exec(Some(doc! {"name": "frank", "age": 19}))
        .unwrap();
    assert_eq!(report.kind, MutationKind::Insert);
    assert!(matches!(report.upserted, Some(Bson::ObjectId(_))));
    let users = docs(&store, "users");
    assert_eq!(users.len(), 6);
    assert_eq!(users[5].get_str("name").unwrap(), "frank");
}

#[test]
fn insert_duplicate_id_is_store_error() {
    let (_store, conn) = setup();
    let err = conn
        .query([QueryPart::source("users"), QueryPart::Insert])
        .exec(Some(doc! {"_id": 1, "name": "again"}))
        .unwrap_err();
    assert_eq!(err.store_op(), Some(StoreOp::Insert));
}

#[test]
fn identity_update_ignores_where() {
    let (store, conn) = setup();
    let report = conn
        .query([
            QueryPart::source("users"),
            QueryPart::filter(Filter::field_eq("tier", "gold")),
            QueryPart::Update,
        ])
        .exec(Some(doc! {"_id": 2, "name": "bobby", "age": 42}))
        .unwrap();
    assert_eq!((report.matched, report.modified), (1, 1));
    let users = docs(&store, "users");
    assert_eq!(users[1], doc! {"_id": 2, "name": "bobby", "age": 42});
    assert_eq!(users[0].get_str("tier").unwrap(), "gold");
}

#[test]
fn filter_scoped_update_sets_fields() {
    let (store, conn) = setup();
    let report = conn
        .query([
            QueryPart::source("users"),
            QueryPart::filter(Filter::field_eq("tier", "gold")),
            QueryPart::Update,
        ])
        .exec(Some(doc! {"tier": "platinum"}))
        .unwrap();
    assert_eq!(report.matched, 3);
    let plat = docs(&store, "users")
        .iter()
        .filter(|d| d.get_str("tier").is_ok_and(|t| t == "platinum"))
        .count();
    assert_eq!(plat, 3);
}

#[test]
fn operator_update_passes_through() {
    let (store, conn) = setup();
    conn.query([
        QueryPart::source("users"),
        QueryPart::filter(Filter::cmp("age", CmpOp::Gt, 40)),
        QueryPart::Update,
    ])
    .exec(Some(doc! {"$inc": {"age": 1}}))
    .unwrap();
    let ages: Vec<i32> = docs(&store, "users").iter().map(|d| d.get_i32("age").unwrap()).collect();
    assert_eq!(ages, vec![30, 42, 27, 53, 35]);
}

#[test]
fn identity_scoped_operator_update_is_applied() {
    let (store, conn) = setup();
    let report = conn
        .query([QueryPart::source("users"), QueryPart::Update])
        .exec(Some(doc! {"_id": 2, "$set": {"name": "zed"}}))
        .unwrap();
    assert_eq!((report.matched, report.modified), (1, 1));
    assert_eq!(docs(&store, "users")[1], doc! {"_id": 2, "name": "zed", "age": 41, "tier": "silver"});

    let err = conn
        .query([QueryPart::source("users"), QueryPart::Update])
        .exec(Some(doc! {"_id": 2, "$set": {"name": "amy"}, "age": 3}))
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidQuery(_)));
    assert_eq!(docs(&store, "users")[1].get_str("name").unwrap(), "zed");
}

#[test]
fn insert_with_operator_field_is_rejected() {
    let (store, conn) = setup();
    let err = conn
        .query([QueryPart::source("users"), QueryPart::Insert])
        .exec(Some(doc! {"name": "x", "$where": 1}))
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidQuery(_)));
    assert_eq!(docs(&store, "users").len(), 5);
}

#[test]
fn update_requires_data() {
    let (store, conn) = setup();
    let err = conn.query([QueryPart::source("users"), QueryPart::Update]).exec(None).unwrap_err();
    assert!(matches!(err, DbError::InvalidQuery(_)));
    assert_eq!(store.stats().total_calls(), 0);
}

#[test]
fn delete_many_with_zero_matches_is_ok() {
    let (store, conn) = setup();
    let report = conn
        .query([
            QueryPart::source("users"),
            QueryPart::filter(Filter::cmp("age", CmpOp::Gt, 100)),
            QueryPart::Delete,
        ])
        .exec(None)
        .unwrap();
    assert_eq!(report.deleted, 0);
    assert_eq!(docs(&store, "users").len(), 5);
}

#[test]
fn delete_scoped_by_filter_and_by_identity() {
    let (store, conn) = setup();
    let report = conn
        .query([
            QueryPart::source("users"),
            QueryPart::filter(Filter::field_eq("tier", "gold")),
            QueryPart::Delete,
        ])
        .exec(None)
        .unwrap();
    assert_eq!(report.deleted, 3);

    let report = conn
        .query([QueryPart::source("users"), QueryPart::Delete])
        .exec(Some(doc! {"_id": 4}))
        .unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(
        docs(&store, "users"),
        vec![doc! {"_id": 2, "name": "bob", "age": 41, "tier": "silver"}]
    );

    let err = conn
        .query([QueryPart::source("users"), QueryPart::Delete])
        .exec(Some(doc! {"_id": 4}))
        .unwrap_err();
    assert_eq!(err.store_op(), Some(StoreOp::Delete));
    assert!(err.to_string().contains("_id"));
}

#[test]
fn save_upserts() {
    let (store, conn) = setup();
    let mut q = conn.query([QueryPart::source("users"), QueryPart::Save]);
    let created = q.exec(Some(doc! {"_id": 9, "name": "gus"})).unwrap();
    assert_eq!(created.upserted, Some(Bson::Int32(9)));
    let updated = q.exec(Some(doc! {"_id": 9, "name": "gus", "age": 60})).unwrap();
    assert_eq!((updated.matched, updated.upserted), (1, None));
    assert_eq!(docs(&store, "users").last().unwrap(), &doc! {"_id": 9, "name": "gus", "age": 60});
}

#[test]
fn delete_takes_precedence() {
    let (store, conn) = setup();
    let report = conn
        .query([
            QueryPart::source("users"),
            QueryPart::Save,
            QueryPart::Update,
            QueryPart::Insert,
            QueryPart::Delete,
        ])
        .exec(Some(doc! {"_id": 1}))
        .unwrap();
    assert_eq!(report.kind, MutationKind::Delete);
    assert_eq!(docs(&store, "users").len(), 4);

    let report = conn
        .query([QueryPart::source("users"), QueryPart::Save, QueryPart::Update, QueryPart::Insert])
        .exec(Some(doc! {"_id": 1, "name": "back"}))
        .unwrap();
    assert_eq!(report.kind, MutationKind::Insert);

    let report = conn
        .query([QueryPart::source("users"), QueryPart::Save, QueryPart::Update])
        .exec(Some(doc! {"_id": 1, "name": "again"}))
        .unwrap();
    assert_eq!(report.kind, MutationKind::Update);
}

#[test]
fn exec_without_mutation_is_invalid_operation() {
    let (store, conn) = setup();
    let err = conn.query([QueryPart::source("users")]).exec(None).unwrap_err();
    assert!(matches!(err, DbError::InvalidOperation(_)));
    assert_eq!(store.stats().total_calls(), 0);
}

#[test]
fn exec_with_serializes_payload() {
    #[derive(Serialize)]
    struct NewUser<'a> {
        #[serde(rename = "_id")]
        id: i32,
        name: &'a str,
    }
    let (store, conn) = setup();
    conn.query([QueryPart::source("users"), QueryPart::Insert])
        .exec_with(&NewUser { id: 77, name: "hal" })
        .unwrap();
    assert_eq!(docs(&store, "users").last().unwrap(), &doc! {"_id": 77, "name": "hal"});

    let err =
        conn.query([QueryPart::source("users"), QueryPart::Insert]).exec_with(&5).unwrap_err();
    assert!(matches!(err, DbError::Serialize(_)));
}

#[test]
fn multiexec_keeps_session_open() {
    let (store, conn) = setup();
    let mut q = conn
        .query([QueryPart::source("users"), QueryPart::Insert])
        .with_config(QueryConfig::default().multiexec(true));
    for id in 20..23 {
        q.exec(Some(doc! {"_id": id})).unwrap();
    }
    assert_eq!(opened(&store), 2);
    assert_eq!(closed(&store), 0);
    q.close();
    assert_eq!(closed(&store), 1);
}

#[test]
fn without_multiexec_each_exec_releases() {
    let (store, conn) = setup();
    let mut q = conn.query([QueryPart::source("users"), QueryPart::Insert]);
    for id in 20..23 {
        q.exec(Some(doc! {"_id": id})).unwrap();
    }
    assert_eq!(opened(&store), 4);
    assert_eq!(closed(&store), 3);
    q.close();
    assert_eq!(closed(&store), 3);
}
