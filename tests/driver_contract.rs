use std::sync::Arc;

use palaver_db::drivers::{InMemoryDriver, ResponseBuilder};
use palaver_db::{
    DatabaseDriver, DbClient, DbError, InsertMethod, PlaceholderKind, QueryContext, TransactionOp,
    Value,
};

fn client_with(driver: &Arc<InMemoryDriver>) -> DbClient {
    let dyn_driver: Arc<dyn DatabaseDriver> = Arc::clone(driver) as Arc<dyn DatabaseDriver>;
    DbClient::with_driver(dyn_driver, QueryContext::new("forum_"))
}

#[tokio::test]
async fn test_quote_substitutes_without_executing() {
    let driver = Arc::new(InMemoryDriver::new());
    let client = client_with(&driver);

    let sql = client
        .quote(
            "SELECT id_member FROM {db_prefix}members WHERE member_name = {string:name}",
            &[("name", Value::from("Bob"))],
        )
        .unwrap();

    assert_eq!(
        sql,
        "SELECT id_member FROM forum_members WHERE member_name = 'Bob'"
    );
    driver.assert_statement_count(0);
}

#[tokio::test]
async fn test_quote_escapes_user_strings() {
    let driver = Arc::new(InMemoryDriver::new());
    let client = client_with(&driver);

    let sql = client
        .quote(
            "DELETE FROM {db_prefix}members WHERE member_name = {string:name}",
            &[("name", Value::from("'; DROP TABLE members; --"))],
        )
        .unwrap();

    // the quote stays inside the literal
    assert_eq!(
        sql,
        "DELETE FROM forum_members WHERE member_name = '''; DROP TABLE members; --'"
    );
}

#[tokio::test]
async fn test_quote_rejects_type_mismatch() {
    let driver = Arc::new(InMemoryDriver::new());
    let client = client_with(&driver);

    let err = client
        .quote(
            "SELECT 1 FROM {db_prefix}members WHERE id_member = {int:id}",
            &[("id", Value::from("eleven"))],
        )
        .unwrap_err();
    assert!(matches!(err, DbError::Placeholder { .. }));
}

#[tokio::test]
async fn test_query_executes_and_returns_rows() {
    let driver = Arc::new(
        InMemoryDriver::new().with_response(
            ResponseBuilder::new()
                .columns(&["id_member", "member_name"])
                .row(&["1", "Alice"])
                .row(&["2", "Bob"])
                .build(),
        ),
    );
    let client = client_with(&driver);

    let result = client
        .query(
            "member_list",
            "SELECT id_member, member_name FROM {db_prefix}members WHERE id_member IN ({array_int:ids})",
            &[("ids", Value::from(vec![1i64, 2]))],
        )
        .await
        .unwrap();

    driver.assert_last_statement(
        "SELECT id_member, member_name FROM forum_members WHERE id_member IN (1, 2)",
    );
    driver.assert_statement_count(1);

    let rows = result.rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("member_name").unwrap(), "Alice");
    assert_eq!(rows[1].get("member_name").unwrap(), "Bob");
}

#[tokio::test]
async fn test_query_failure_surfaces_database_error() {
    let driver = Arc::new(InMemoryDriver::new().fail_on_statement(1));
    let client = client_with(&driver);

    let err = client
        .query("boom", "SELECT 1 FROM {db_prefix}members", &[])
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::Database(_)));
    // the backend error string is retained for inspection
    assert!(client.last_error().unwrap().contains("injected failure"));
}

#[tokio::test]
async fn test_commit_without_begin_is_a_state_error() {
    let driver = Arc::new(InMemoryDriver::new());
    let client = client_with(&driver);

    let err = client.transaction(TransactionOp::Commit).await.unwrap_err();
    assert!(matches!(err, DbError::TransactionState(_)));

    let err = client.transaction(TransactionOp::Rollback).await.unwrap_err();
    assert!(matches!(err, DbError::TransactionState(_)));
}

#[tokio::test]
async fn test_nested_begin_is_a_state_error() {
    let driver = Arc::new(InMemoryDriver::new());
    let client = client_with(&driver);

    client.transaction(TransactionOp::Begin).await.unwrap();
    let err = client.transaction(TransactionOp::Begin).await.unwrap_err();
    assert!(matches!(err, DbError::TransactionState(_)));

    client.transaction(TransactionOp::Rollback).await.unwrap();
}

#[tokio::test]
async fn test_insert_wraps_batch_in_transaction() {
    let driver = Arc::new(InMemoryDriver::new().with_responses([
        ResponseBuilder::new().affected(1).build(),
        ResponseBuilder::new().affected(1).build(),
    ]));
    let client = client_with(&driver);

    let affected = client
        .insert(
            InsertMethod::Insert,
            "{db_prefix}members",
            &[
                ("member_name", PlaceholderKind::String),
                ("posts", PlaceholderKind::Int),
            ],
            &[
                vec![Value::from("Alice"), Value::from(3)],
                vec![Value::from("Bob"), Value::from(0)],
            ],
            &[],
            false,
        )
        .await
        .unwrap();

    assert_eq!(affected, 2);
    let recorded = driver.recorded_statements();
    assert_eq!(recorded.len(), 4);
    assert_eq!(recorded[0], "BEGIN");
    assert_eq!(
        recorded[1],
        "INSERT INTO forum_members (\"member_name\", \"posts\") VALUES ('Alice', 3)"
    );
    assert_eq!(
        recorded[2],
        "INSERT INTO forum_members (\"member_name\", \"posts\") VALUES ('Bob', 0)"
    );
    assert_eq!(recorded[3], "COMMIT");

    // both rows are visible after the commit
    assert_eq!(driver.applied_statements().len(), 2);
}

#[tokio::test]
async fn test_insert_rolls_back_on_mid_batch_failure() {
    let driver = Arc::new(InMemoryDriver::new().fail_on_statement(2));
    let client = client_with(&driver);

    let err = client
        .insert(
            InsertMethod::Insert,
            "{db_prefix}members",
            &[("member_name", PlaceholderKind::String)],
            &[
                vec![Value::from("Alice")],
                vec![Value::from("Bob")],
                vec![Value::from("Carol")],
            ],
            &[],
            false,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::Database(_)));
    // no partial rows are visible after the rollback
    assert!(driver.applied_statements().is_empty());
    assert_eq!(driver.last_statement().unwrap(), "ROLLBACK");
}

#[tokio::test]
async fn test_insert_with_transactions_disabled() {
    let driver = Arc::new(
        InMemoryDriver::new()
            .with_response(ResponseBuilder::new().affected(1).build())
            .fail_on_statement(2),
    );
    let client = client_with(&driver);

    let err = client
        .insert(
            InsertMethod::Insert,
            "{db_prefix}members",
            &[("member_name", PlaceholderKind::String)],
            &[vec![Value::from("Alice")], vec![Value::from("Bob")]],
            &[],
            true,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::Database(_)));
    // no transaction steps, and the first row stays visible
    let recorded = driver.recorded_statements();
    assert!(recorded.iter().all(|sql| sql != "BEGIN" && sql != "ROLLBACK"));
    assert_eq!(driver.applied_statements().len(), 1);
}

#[tokio::test]
async fn test_insert_replace_builds_conflict_clause() {
    let driver = Arc::new(InMemoryDriver::new().with_response(
        ResponseBuilder::new().affected(1).build(),
    ));
    let client = client_with(&driver);

    client
        .insert(
            InsertMethod::Replace,
            "{db_prefix}settings",
            &[
                ("variable", PlaceholderKind::String),
                ("value", PlaceholderKind::String),
            ],
            &[vec![Value::from("maintenance"), Value::from("1")]],
            &["variable"],
            false,
        )
        .await
        .unwrap();

    let recorded = driver.recorded_statements();
    assert_eq!(
        recorded[1],
        "INSERT INTO forum_settings (\"variable\", \"value\") VALUES ('maintenance', '1') \
         ON CONFLICT (\"variable\") DO UPDATE SET \"value\" = EXCLUDED.\"value\""
    );
}

#[tokio::test]
async fn test_insert_ignore_requires_backend_support() {
    let driver = Arc::new(InMemoryDriver::new().without_ignore_support());
    let client = client_with(&driver);

    assert!(!client.support_ignore());

    let err = client
        .insert(
            InsertMethod::Ignore,
            "{db_prefix}members",
            &[("member_name", PlaceholderKind::String)],
            &[vec![Value::from("Alice")]],
            &["member_name"],
            false,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::Unsupported(_)));
    // rejected before anything ran
    driver.assert_statement_count(0);
}

#[tokio::test]
async fn test_insert_ignore_builds_do_nothing_clause() {
    let driver = Arc::new(InMemoryDriver::new().with_response(
        ResponseBuilder::new().affected(1).build(),
    ));
    let client = client_with(&driver);

    client
        .insert(
            InsertMethod::Ignore,
            "{db_prefix}members",
            &[("member_name", PlaceholderKind::String)],
            &[vec![Value::from("Alice")]],
            &["member_name"],
            false,
        )
        .await
        .unwrap();

    let recorded = driver.recorded_statements();
    assert_eq!(
        recorded[1],
        "INSERT INTO forum_members (\"member_name\") VALUES ('Alice') \
         ON CONFLICT (\"member_name\") DO NOTHING"
    );
}

#[tokio::test]
async fn test_support_ignore_is_pure() {
    let driver = Arc::new(InMemoryDriver::new());
    let client = client_with(&driver);

    let first = client.support_ignore();
    let second = client.support_ignore();
    assert_eq!(first, second);
    driver.assert_statement_count(0);
}

#[tokio::test]
async fn test_affected_rows_tracks_last_write() {
    let driver = Arc::new(InMemoryDriver::new().with_response(
        ResponseBuilder::new().affected(3).build(),
    ));
    let client = client_with(&driver);

    assert_eq!(client.affected_rows(), 0);
    client
        .query(
            "prune",
            "DELETE FROM {db_prefix}log_online WHERE log_time < {int:cutoff}",
            &[("cutoff", Value::from(1_400_000_000i64))],
        )
        .await
        .unwrap();
    assert_eq!(client.affected_rows(), 3);
}

#[tokio::test]
async fn test_insert_id_sequence() {
    let driver = Arc::new(InMemoryDriver::new());
    let client = client_with(&driver);

    assert_eq!(client.insert_id("{db_prefix}members", "id_member").await.unwrap(), 1);
    assert_eq!(client.insert_id("{db_prefix}members", "id_member").await.unwrap(), 2);
}

#[tokio::test]
async fn test_qualify_prefix() {
    let driver = Arc::new(InMemoryDriver::new());
    let mut client = client_with(&driver);

    client.qualify_prefix("main");
    assert_eq!(client.context().prefix(), "\"main\".forum_");

    let sql = client.quote("SELECT 1 FROM {db_prefix}members", &[]).unwrap();
    assert_eq!(sql, "SELECT 1 FROM \"main\".forum_members");

    // already qualified, a second fixup leaves it alone
    client.qualify_prefix("main");
    assert_eq!(client.context().prefix(), "\"main\".forum_");
}

#[tokio::test]
async fn test_session_fragment_expansion() {
    let driver = Arc::new(InMemoryDriver::new());
    let dyn_driver: Arc<dyn DatabaseDriver> = Arc::clone(&driver) as Arc<dyn DatabaseDriver>;
    let ctx = QueryContext::new("forum_")
        .with_fragment("query_see_board", "b.id_board NOT IN (5)");
    let client = DbClient::with_driver(dyn_driver, ctx);

    let sql = client
        .quote(
            "SELECT id_topic FROM {db_prefix}topics AS t, {db_prefix}boards AS b \
             WHERE b.id_board = t.id_board AND {query_see_board}",
            &[],
        )
        .unwrap();
    assert_eq!(
        sql,
        "SELECT id_topic FROM forum_topics AS t, forum_boards AS b \
         WHERE b.id_board = t.id_board AND b.id_board NOT IN (5)"
    );

    // a fragment that was never registered must not slip through
    let err = client
        .quote("SELECT 1 WHERE {query_wanna_see_board}", &[])
        .unwrap_err();
    assert!(matches!(err, DbError::Placeholder { .. }));
}

#[tokio::test]
async fn test_escape_wildcard_string_via_client() {
    let driver = Arc::new(InMemoryDriver::new());
    let client = client_with(&driver);

    assert_eq!(client.escape_wildcard_string("50%_done", false), "50\\%\\_done");
    assert_eq!(client.escape_wildcard_string("a*b?c", true), "a%b_c");

    // idempotent on already-escaped input
    let once = client.escape_wildcard_string("50%_done", false);
    assert_eq!(client.escape_wildcard_string(&once, false), once);
}
