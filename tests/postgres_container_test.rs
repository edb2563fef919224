//! Runs the book store against a real Postgres container.
//!
//! Requires a Docker daemon; run with `cargo test -- --ignored`.

use bookstore::config::ProvisionConfig;
use bookstore::db::{apply_migrations, Backend, IdStrategy};
use bookstore::provision::{PostgresContainer, TestEnvironment};
use bookstore::{harness, Book, BookRepository, Decimal, PersistenceError, Provisioner};
use std::collections::HashMap;
use std::path::PathBuf;

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

fn postgres_config() -> ProvisionConfig {
    let mut env_map = HashMap::new();
    env_map.insert("DB_BACKEND".to_string(), "postgres".to_string());
    env_map.insert(
        "MIGRATIONS_DIR".to_string(),
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("migrations")
            .to_string_lossy()
            .to_string(),
    );
    ProvisionConfig::from_env_map(env_map).expect("config")
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a Docker daemon"]
async fn test_book_store_against_postgres() {
    let config = postgres_config();
    let provisioned = Provisioner::new(config.clone())
        .provision()
        .await
        .expect("provision failed");
    let db = provisioned.database().clone();
    assert_eq!(db.backend(), Backend::Postgres);

    let dir = config.backend_migrations_dir();
    assert_eq!(apply_migrations(&db, &dir).await.unwrap(), 1);
    assert_eq!(apply_migrations(&db, &dir).await.unwrap(), 0);

    let repo = BookRepository::new(db.clone());
    let input = Book::new("gtc", "Osagie", d("20.29"));
    let inserted = repo.insert_book(&input).await.expect("insert failed");
    let id = inserted.id.expect("Expected book ID to be set");
    assert!(!id.is_nil());

    let fetched = repo.get_book(id).await.unwrap().expect("book should exist");
    assert_eq!(fetched, inserted);

    let again = repo.insert_book(&input).await.unwrap();
    assert_ne!(again.id, inserted.id);

    let client_repo = repo.clone().with_id_strategy(IdStrategy::ClientGenerated);
    let client = client_repo.insert_book(&input).await.unwrap();
    assert!(client.is_persisted());

    let rejected = repo.insert_book(&Book::new("gtc", "Osagie", d("-1"))).await;
    assert!(matches!(rejected, Err(PersistenceError::Database(_))));

    provisioned.dispose().await.expect("dispose failed");
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a Docker daemon"]
async fn test_harness_against_postgres() {
    let report = harness::run(&postgres_config(), &Book::new("gtc", "Osagie", d("20.29")))
        .await
        .expect("run failed");
    assert_eq!(report.migrations_applied, 1);
    assert!(report.book.is_persisted());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a Docker daemon"]
async fn test_container_is_removed_on_stop() {
    let mut env = PostgresContainer::from_config(&postgres_config());
    env.start().await.expect("start failed");
    assert!(env.container_id().is_some());
    assert!(env.connection_info().is_ok());

    env.stop().await.expect("stop failed");
    assert!(env.container_id().is_none());
    env.stop().await.expect("second stop should be a no-op");
}
