//! Postgres durable store tests.
//!
//! Require a reachable database via `DATABASE_URL`; run with
//! `cargo test -- --ignored`.

use rendercache::cache::{CacheEntry, DurableStore, normalize};
use rendercache::infra::db::PostgresDurableStore;
use sqlx::PgPool;

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn set_get_delete_round_trip(pool: PgPool) {
    let store = PostgresDurableStore::new(pool);
    let key = normalize("/foo/bar");

    assert!(!store.get(&key).await.expect("get").exists());

    store
        .set(&key, &CacheEntry::new("<p>one</p>", "/foo/bar"))
        .await
        .expect("set");
    let record = store.get(&key).await.expect("get");
    assert_eq!(record.content(), Some("<p>one</p>"));
    assert_eq!(record.source_url(), Some("/foo/bar"));
    assert!(record.timestamp().is_some());

    store
        .set(&key, &CacheEntry::new("<p>two</p>", "/foo/bar"))
        .await
        .expect("overwrite");
    assert_eq!(
        store.get(&key).await.expect("get").content(),
        Some("<p>two</p>")
    );

    store.delete(&key).await.expect("delete");
    store.delete(&key).await.expect("delete absent key");
    assert!(!store.get(&key).await.expect("get").exists());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn malformed_payload_is_not_a_hit(pool: PgPool) {
    sqlx::query("INSERT INTO page_cache (key, payload) VALUES ($1, $2)")
        .bind("_odd")
        .bind(serde_json::json!({ "content": 7 }))
        .execute(&pool)
        .await
        .expect("insert");

    let store = PostgresDurableStore::new(pool);
    let record = store.get(&normalize("/odd")).await.expect("get");

    assert!(record.exists());
    assert!(record.is_malformed());
    assert!(record.content().is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn scan_treats_underscore_literally(pool: PgPool) {
    let store = PostgresDurableStore::new(pool);
    for path in ["/a/b", "/axb", "/c/a/b"] {
        store
            .set(&normalize(path), &CacheEntry::new("x", path))
            .await
            .expect("set");
    }

    let keys: Vec<String> = store
        .scan_keys("a_b")
        .await
        .expect("scan")
        .into_iter()
        .map(|key| key.into_string())
        .collect();

    assert_eq!(keys, vec!["_a_b".to_string(), "_c_a_b".to_string()]);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn health_check_succeeds(pool: PgPool) {
    let store = PostgresDurableStore::new(pool);
    store.health_check().await.expect("healthy");
}
