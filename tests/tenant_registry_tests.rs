//! Concurrent tenant resolution
//!
//! Run with: cargo test --test tenant_registry_tests

use memgate::{QueryExecutor, TenantRegistry, Value, WriteRequest};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_concurrent_first_access_creates_one_database() {
    let registry = Arc::new(TenantRegistry::new());
    let num_threads = 16;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                registry.resolve("fresh").unwrap()
            })
        })
        .collect();

    let dbs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(registry.len().unwrap(), 1);
    for db in &dbs[1..] {
        assert!(Arc::ptr_eq(&dbs[0], db), "two handles created for one tenant");
    }
}

#[test]
fn test_concurrent_writers_see_each_other() {
    let registry = Arc::new(TenantRegistry::new());
    let setup = registry.resolve("shared").unwrap();
    QueryExecutor::execute_write(
        &setup,
        &WriteRequest::new("CREATE TABLE hits (thread_id INTEGER)"),
    )
    .unwrap();

    let num_threads = 8;
    let writes_per_thread = 25;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|thread_id| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..writes_per_thread {
                    let db = registry.resolve("shared").unwrap();
                    QueryExecutor::execute_write(
                        &db,
                        &WriteRequest::new("INSERT INTO hits VALUES (?)").arg(thread_id as i64),
                    )
                    .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let db = registry.resolve("shared").unwrap();
    let rows = QueryExecutor::execute_read(
        &db,
        &WriteRequest::new("SELECT COUNT(*) AS n, COUNT(DISTINCT thread_id) AS writers FROM hits"),
    )
    .unwrap();

    assert_eq!(
        rows[0].get("n"),
        Some(&Value::Integer((num_threads * writes_per_thread) as i64))
    );
    assert_eq!(rows[0].get("writers"), Some(&Value::Integer(num_threads as i64)));
}
