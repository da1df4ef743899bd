use bson::{Document, doc};
use docbridge::store::MemoryStore;
use docbridge::{Connection, ConnectionInfo};
use std::sync::Arc;
use std::sync::atomic::Ordering;

pub const DB: &str = "shop";

pub fn setup() -> (Arc<MemoryStore>, Connection) {
    let store = MemoryStore::new();
    store.seed(
        DB,
        "users",
        [
            doc! {"_id": 1, "name": "alice", "age": 30, "tier": "gold"},
            doc! {"_id": 2, "name": "bob", "age": 41, "tier": "silver"},
            doc! {"_id": 3, "name": "carol", "age": 27, "tier": "gold"},
            doc! {"_id": 4, "name": "dave", "age": 52, "tier": "bronze"},
            doc! {"_id": 5, "name": "erin", "age": 35, "tier": "gold"},
        ],
    );
    store.seed(
        DB,
        "orders",
        [
            doc! {"_id": 10, "user": 1, "amount": 12.5, "status": "paid"},
            doc! {"_id": 11, "user": 2, "amount": 5, "status": "paid"},
            doc! {"_id": 12, "user": 1, "amount": 40, "status": "open"},
        ],
    );
    let conn = Connection::new(ConnectionInfo::new(DB), store.connect());
    (store, conn)
}

pub fn docs(store: &MemoryStore, collection: &str) -> Vec<Document> {
    store.documents(DB, collection)
}

pub fn opened(store: &MemoryStore) -> u64 {
    store.stats().sessions_opened.load(Ordering::Relaxed)
}

pub fn closed(store: &MemoryStore) -> u64 {
    store.stats().close_calls.load(Ordering::Relaxed)
}
