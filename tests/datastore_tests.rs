#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Tests for the in-memory datastore shared between worker threads

use brrtdispatch::datastore::{ColumnKind, ColumnSpec, Datastore, MemoryDatastore, Row};
use brrtdispatch::error::DatastoreError;
use serde_json::json;
use std::sync::Arc;
use std::thread;

fn counters() -> Arc<MemoryDatastore> {
    let store = Arc::new(MemoryDatastore::new());
    store.start().unwrap();
    store
        .create_table(
            "events",
            &["id"],
            &[
                ColumnSpec::new("id", ColumnKind::Integer),
                ColumnSpec::new("payload", ColumnKind::Json),
            ],
        )
        .unwrap();
    store
}

#[test]
fn test_concurrent_inserts_respect_unique_column() {
    let store = counters();
    let threads: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let mut rejected = 0;
                // Every thread tries the same ids; each id may land once.
                for id in 0..100 {
                    let row = Row::from([
                        ("id".to_string(), json!(id)),
                        ("payload".to_string(), json!({ "thread": t })),
                    ]);
                    if let Err(DatastoreError::UniqueViolation { .. }) = store.add_row("events", row) {
                        rejected += 1;
                    }
                }
                rejected
            })
        })
        .collect();

    let rejected: usize = threads.into_iter().map(|t| t.join().unwrap()).sum();
    assert_eq!(rejected, 300);

    for id in 0..100 {
        let row = store
            .get_row("events", &[], &Row::from([("id".to_string(), json!(id))]))
            .unwrap();
        assert!(row.is_some(), "id {id} missing");
    }
}

#[test]
fn test_stopped_store_refuses_operations() {
    let store = counters();
    store.stop(true);
    assert!(store.is_stopped());
    assert_eq!(
        store.add_row("events", Row::new()),
        Err(DatastoreError::Stopped)
    );
    assert_eq!(
        store.get_row("events", &[], &Row::new()),
        Err(DatastoreError::Stopped)
    );
    store.start().unwrap();
    assert!(store.get_row("events", &[], &Row::new()).unwrap().is_none());
}
