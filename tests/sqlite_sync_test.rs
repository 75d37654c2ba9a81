// ABOUTME: End-to-end synchronization tests against SQLite database files
// ABOUTME: Covers inserts, updates, untouched target rows, skips, and idempotency

use refsync::filters::TableFilter;
use refsync::sync::{SyncOptions, Synchronizer, TableStatus};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn create_db(dir: &TempDir, name: &str, sql: &str) -> PathBuf {
    let path = dir.path().join(name);
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(sql).unwrap();
    path
}

fn url(path: &Path) -> String {
    path.to_str().unwrap().to_string()
}

fn query_pairs(path: &Path, sql: &str) -> Vec<(i64, Option<String>)> {
    let conn = Connection::open(path).unwrap();
    let mut stmt = conn.prepare(sql).unwrap();
    let rows = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    rows
}

fn query_text_pairs(path: &Path, sql: &str) -> Vec<(Option<String>, Option<String>)> {
    let conn = Connection::open(path).unwrap();
    let mut stmt = conn.prepare(sql).unwrap();
    let rows = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    rows
}

fn table_exists(path: &Path, table: &str) -> bool {
    let conn = Connection::open(path).unwrap();
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |r| r.get::<_, i64>(0),
    )
    .unwrap()
        > 0
}

async fn run(reference: &Path, target: &Path, options: SyncOptions) -> refsync::SyncReport {
    let mut synchronizer = Synchronizer::connect(&url(reference), &url(target), options)
        .await
        .unwrap();
    synchronizer.synchronize().await.unwrap()
}

const USERS: &str = "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);";

#[tokio::test]
async fn test_users_example() {
    let dir = tempfile::tempdir().unwrap();
    let reference = create_db(
        &dir,
        "reference.db",
        &format!("{USERS} INSERT INTO users VALUES (1, 'a'), (2, 'b');"),
    );
    let target = create_db(
        &dir,
        "target.db",
        &format!("{USERS} INSERT INTO users VALUES (1, 'x');"),
    );

    let report = run(&reference, &target, SyncOptions::default()).await;

    assert_eq!(
        query_pairs(&target, "SELECT id, name FROM users ORDER BY id"),
        vec![(1, Some("a".to_string())), (2, Some("b".to_string()))]
    );
    let users = report.table("users").unwrap();
    assert_eq!(users.status, TableStatus::Synced);
    assert_eq!(users.inserted, 1);
    assert_eq!(users.updated, 1);
    assert_eq!(users.reference_rows, 2);
    assert_eq!(users.target_rows, 1);
    assert!(report.is_success());
}

#[tokio::test]
async fn test_target_only_rows_are_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let reference = create_db(
        &dir,
        "reference.db",
        &format!("{USERS} INSERT INTO users VALUES (1, 'a');"),
    );
    let target = create_db(
        &dir,
        "target.db",
        &format!("{USERS} INSERT INTO users VALUES (1, 'a'), (5, 'local'), (6, NULL);"),
    );

    let report = run(&reference, &target, SyncOptions::default()).await;

    assert_eq!(
        query_pairs(&target, "SELECT id, name FROM users ORDER BY id"),
        vec![
            (1, Some("a".to_string())),
            (5, Some("local".to_string())),
            (6, None)
        ]
    );
    let users = report.table("users").unwrap();
    assert_eq!(users.target_only, 2);
    assert_eq!(users.unchanged, 1);
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let reference = create_db(
        &dir,
        "reference.db",
        "CREATE TABLE items (
            id INTEGER PRIMARY KEY,
            label TEXT,
            price REAL,
            qty INTEGER,
            active BOOLEAN,
            payload BLOB
         );
         INSERT INTO items VALUES (1, 'pen', 1.5, 10, 1, x'00ff');
         INSERT INTO items VALUES (2, NULL, 2.0, NULL, 0, NULL);
         INSERT INTO items VALUES (3, 'cap', NULL, 3, NULL, x'01');",
    );
    let target = create_db(
        &dir,
        "target.db",
        "CREATE TABLE items (
            id INTEGER PRIMARY KEY,
            label TEXT,
            price REAL,
            qty INTEGER,
            active BOOLEAN,
            payload BLOB
         );
         INSERT INTO items VALUES (2, 'stale', 9.0, 1, 1, NULL);",
    );

    let first = run(&reference, &target, SyncOptions::default()).await;
    assert_eq!(first.total_inserted(), 2);
    assert_eq!(first.total_updated(), 1);

    let second = run(&reference, &target, SyncOptions::default()).await;
    assert_eq!(second.total_inserted(), 0);
    assert_eq!(second.total_updated(), 0);
    assert_eq!(second.table("items").unwrap().unchanged, 3);
}

#[tokio::test]
async fn test_reference_only_table_is_skipped_not_created() {
    let dir = tempfile::tempdir().unwrap();
    let reference = create_db(
        &dir,
        "reference.db",
        &format!(
            "{USERS} INSERT INTO users VALUES (1, 'a');
             CREATE TABLE archive (id INTEGER PRIMARY KEY, note TEXT);
             INSERT INTO archive VALUES (1, 'old');"
        ),
    );
    let target = create_db(&dir, "target.db", USERS);

    let report = run(&reference, &target, SyncOptions::default()).await;

    assert!(!table_exists(&target, "archive"));
    assert_eq!(
        report.table("archive").unwrap().status,
        TableStatus::MissingInTarget
    );
    assert_eq!(report.table("users").unwrap().inserted, 1);
    assert!(report.is_success());
}

#[tokio::test]
async fn test_composite_primary_key() {
    let dir = tempfile::tempdir().unwrap();
    let schema = "CREATE TABLE order_items (
        order_id INTEGER,
        item_id INTEGER,
        qty INTEGER,
        PRIMARY KEY (order_id, item_id)
    );";
    let reference = create_db(
        &dir,
        "reference.db",
        &format!("{schema} INSERT INTO order_items VALUES (1, 1, 5), (1, 2, 1), (2, 1, 7);"),
    );
    let target = create_db(
        &dir,
        "target.db",
        &format!("{schema} INSERT INTO order_items VALUES (1, 1, 4), (2, 1, 7), (3, 3, 3);"),
    );

    let report = run(&reference, &target, SyncOptions::default()).await;

    let conn = Connection::open(&target).unwrap();
    let rows: Vec<(i64, i64, i64)> = conn
        .prepare("SELECT order_id, item_id, qty FROM order_items ORDER BY order_id, item_id")
        .unwrap()
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(rows, vec![(1, 1, 5), (1, 2, 1), (2, 1, 7), (3, 3, 3)]);

    let items = report.table("order_items").unwrap();
    assert_eq!(items.inserted, 1);
    assert_eq!(items.updated, 1);
    assert_eq!(items.unchanged, 1);
    assert_eq!(items.target_only, 1);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let reference = create_db(
        &dir,
        "reference.db",
        &format!("{USERS} INSERT INTO users VALUES (1, 'a'), (2, 'b');"),
    );
    let target = create_db(
        &dir,
        "target.db",
        &format!("{USERS} INSERT INTO users VALUES (1, 'x');"),
    );

    let options = SyncOptions {
        dry_run: true,
        ..Default::default()
    };
    let report = run(&reference, &target, options).await;

    assert!(report.dry_run);
    assert_eq!(report.total_inserted(), 1);
    assert_eq!(report.total_updated(), 1);
    assert_eq!(
        query_pairs(&target, "SELECT id, name FROM users ORDER BY id"),
        vec![(1, Some("x".to_string()))]
    );
}

#[tokio::test]
async fn test_table_without_primary_key_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let reference = create_db(
        &dir,
        "reference.db",
        "CREATE TABLE events (seq INTEGER, body TEXT);
         INSERT INTO events VALUES (1, 'boot');",
    );
    let target = create_db(&dir, "target.db", "CREATE TABLE events (seq INTEGER, body TEXT);");

    let report = run(&reference, &target, SyncOptions::default()).await;

    let events = report.table("events").unwrap();
    assert_eq!(events.status, TableStatus::NoPrimaryKey);
    assert!(events.message.as_deref().unwrap().contains("no primary key"));
    assert!(query_pairs(&target, "SELECT seq, body FROM events").is_empty());
    assert!(report.is_success());
}

#[tokio::test]
async fn test_differing_column_sets() {
    let dir = tempfile::tempdir().unwrap();
    let reference = create_db(
        &dir,
        "reference.db",
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, nickname TEXT);
         INSERT INTO users VALUES (1, 'a', 'al'), (2, 'b', 'bo');",
    );
    let target = create_db(
        &dir,
        "target.db",
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, tier TEXT DEFAULT 'free');
         INSERT INTO users VALUES (1, 'x', 'gold');",
    );

    let report = run(&reference, &target, SyncOptions::default()).await;

    assert_eq!(
        query_pairs(&target, "SELECT id, tier FROM users ORDER BY id"),
        vec![(1, Some("gold".to_string())), (2, Some("free".to_string()))]
    );
    assert_eq!(
        query_pairs(&target, "SELECT id, name FROM users ORDER BY id"),
        vec![(1, Some("a".to_string())), (2, Some("b".to_string()))]
    );
    assert_eq!(
        report.table("users").unwrap().ignored_columns,
        vec!["nickname".to_string()]
    );
}

#[tokio::test]
async fn test_values_compared_after_target_affinity() {
    let dir = tempfile::tempdir().unwrap();
    let reference = create_db(
        &dir,
        "reference.db",
        "CREATE TABLE stock (sku TEXT PRIMARY KEY, qty TEXT);
         INSERT INTO stock VALUES ('a', '5'), ('b', 'unknown');",
    );
    let target = create_db(
        &dir,
        "target.db",
        "CREATE TABLE stock (sku TEXT PRIMARY KEY, qty INTEGER);
         INSERT INTO stock VALUES ('a', 5);",
    );

    let first = run(&reference, &target, SyncOptions::default()).await;
    assert_eq!(first.total_updated(), 0);
    assert_eq!(first.total_inserted(), 1);

    let second = run(&reference, &target, SyncOptions::default()).await;
    assert_eq!(second.total_inserted(), 0);
    assert_eq!(second.total_updated(), 0);
}

#[tokio::test]
async fn test_null_key_rows_are_never_matched() {
    let dir = tempfile::tempdir().unwrap();
    let reference = create_db(
        &dir,
        "reference.db",
        "CREATE TABLE t (k TEXT PRIMARY KEY, v TEXT);
         INSERT INTO t VALUES (NULL, 'a'), ('b', 'b');",
    );
    let target = create_db(
        &dir,
        "target.db",
        "CREATE TABLE t (k TEXT PRIMARY KEY, v TEXT);
         INSERT INTO t VALUES (NULL, 'x');",
    );

    for _ in 0..2 {
        let report = run(&reference, &target, SyncOptions::default()).await;
        let t = report.table("t").unwrap();
        assert_eq!(t.status, TableStatus::Synced);
        assert_eq!(t.updated, 0);
        assert_eq!(t.null_keys, 1);
        assert_eq!(t.target_only, 1);
        assert!(report.is_success());
    }

    assert_eq!(
        query_text_pairs(&target, "SELECT k, v FROM t ORDER BY k"),
        vec![
            (None, Some("x".to_string())),
            (Some("b".to_string()), Some("b".to_string()))
        ]
    );
}

#[tokio::test]
async fn test_several_null_key_rows_are_not_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let reference = create_db(
        &dir,
        "reference.db",
        "CREATE TABLE t (k TEXT PRIMARY KEY, v TEXT);
         INSERT INTO t VALUES (NULL, 'a'), (NULL, 'b'), ('c', 'c');",
    );
    let target = create_db(&dir, "target.db", "CREATE TABLE t (k TEXT PRIMARY KEY, v TEXT);");

    let report = run(&reference, &target, SyncOptions::default()).await;

    let t = report.table("t").unwrap();
    assert_eq!(t.inserted, 1);
    assert_eq!(t.null_keys, 2);
    assert_eq!(
        query_text_pairs(&target, "SELECT k, v FROM t"),
        vec![(Some("c".to_string()), Some("c".to_string()))]
    );
}

#[tokio::test]
async fn test_sqlite_names_match_regardless_of_case() {
    let dir = tempfile::tempdir().unwrap();
    let reference = create_db(
        &dir,
        "reference.db",
        "CREATE TABLE Users (ID INTEGER PRIMARY KEY, Name TEXT);
         INSERT INTO Users VALUES (1, 'a'), (2, 'b');",
    );
    let target = create_db(
        &dir,
        "target.db",
        &format!("{USERS} INSERT INTO users VALUES (1, 'x');"),
    );

    let report = run(&reference, &target, SyncOptions::default()).await;

    let users = report.table("Users").unwrap();
    assert_eq!(users.status, TableStatus::Synced);
    assert_eq!(users.inserted, 1);
    assert_eq!(users.updated, 1);
    assert!(users.ignored_columns.is_empty());
    assert_eq!(
        query_pairs(&target, "SELECT id, name FROM users ORDER BY id"),
        vec![(1, Some("a".to_string())), (2, Some("b".to_string()))]
    );
}

#[tokio::test]
async fn test_include_filter_limits_tables() {
    let dir = tempfile::tempdir().unwrap();
    let sql = "CREATE TABLE a (id INTEGER PRIMARY KEY, v TEXT);
               CREATE TABLE b (id INTEGER PRIMARY KEY, v TEXT);";
    let reference = create_db(
        &dir,
        "reference.db",
        &format!("{sql} INSERT INTO a VALUES (1, 'x'); INSERT INTO b VALUES (1, 'y');"),
    );
    let target = create_db(&dir, "target.db", sql);

    let options = SyncOptions {
        filter: TableFilter::new(Some(vec!["b".to_string()]), None).unwrap(),
        ..Default::default()
    };
    let report = run(&reference, &target, options).await;

    assert_eq!(report.tables.len(), 1);
    assert!(query_pairs(&target, "SELECT id, v FROM a").is_empty());
    assert_eq!(
        query_pairs(&target, "SELECT id, v FROM b"),
        vec![(1, Some("y".to_string()))]
    );
}

const FAILING_TABLES: &str = "
    CREATE TABLE a_accounts (id INTEGER PRIMARY KEY, name TEXT);
    CREATE TABLE b_notes (id INTEGER PRIMARY KEY, body TEXT);";

fn failing_setup(dir: &TempDir) -> (PathBuf, PathBuf) {
    let reference = create_db(
        dir,
        "reference.db",
        &format!(
            "{FAILING_TABLES}
             INSERT INTO a_accounts VALUES (1, 'ok'), (2, NULL);
             INSERT INTO b_notes VALUES (1, 'hello');"
        ),
    );
    let target = create_db(
        dir,
        "target.db",
        "CREATE TABLE a_accounts (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
         CREATE TABLE b_notes (id INTEGER PRIMARY KEY, body TEXT);",
    );
    (reference, target)
}

#[tokio::test]
async fn test_table_failure_aborts_and_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let (reference, target) = failing_setup(&dir);

    let mut synchronizer =
        Synchronizer::connect(&url(&reference), &url(&target), SyncOptions::default())
            .await
            .unwrap();
    let err = synchronizer.synchronize().await.unwrap_err();

    assert!(format!("{:#}", err).contains("a_accounts"));
    assert!(query_pairs(&target, "SELECT id, name FROM a_accounts").is_empty());
    assert!(query_pairs(&target, "SELECT id, body FROM b_notes").is_empty());
}

#[tokio::test]
async fn test_continue_on_error_records_failure() {
    let dir = tempfile::tempdir().unwrap();
    let (reference, target) = failing_setup(&dir);

    let options = SyncOptions {
        continue_on_error: true,
        ..Default::default()
    };
    let report = run(&reference, &target, options).await;

    assert!(!report.is_success());
    assert_eq!(
        report.table("a_accounts").unwrap().status,
        TableStatus::Failed
    );
    assert!(query_pairs(&target, "SELECT id, name FROM a_accounts").is_empty());
    assert_eq!(
        query_pairs(&target, "SELECT id, body FROM b_notes"),
        vec![(1, Some("hello".to_string()))]
    );
}

#[tokio::test]
async fn test_same_database_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_db(&dir, "app.db", USERS);

    let result = Synchronizer::connect(
        &url(&path),
        &format!("sqlite://{}", url(&path)),
        SyncOptions::default(),
    )
    .await;

    let err = result.err().unwrap();
    assert!(err.to_string().contains("point to the same database"));
}

#[tokio::test]
async fn test_missing_target_file_is_not_created() {
    let dir = tempfile::tempdir().unwrap();
    let reference = create_db(&dir, "reference.db", USERS);
    let target = dir.path().join("absent.db");

    let result = Synchronizer::connect(&url(&reference), &url(&target), SyncOptions::default()).await;

    assert!(result.is_err());
    assert!(!target.exists());
}
