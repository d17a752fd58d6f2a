use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::drivers::on_conflict_clause;
use crate::error::{DbError, Result};
use crate::template::PlaceholderKind;
use crate::traits::{DatabaseDriver, InsertMethod, TransactionOp};
use crate::types::QueryResult;

/// An in-memory driver for exercising the contract without a server.
///
/// Responses are scripted in FIFO order, every statement is recorded for
/// verification, and failures can be injected at a chosen statement. The
/// driver keeps a simple visibility model: statements executed inside a
/// transaction stay pending until commit, and are discarded on rollback.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use palaver_db::drivers::{InMemoryDriver, ResponseBuilder};
///
/// let driver = Arc::new(
///     InMemoryDriver::new().with_response(
///         ResponseBuilder::new()
///             .columns(&["id", "name"])
///             .row(&["1", "Alice"])
///             .build(),
///     ),
/// );
/// ```
pub struct InMemoryDriver {
    responses: Mutex<VecDeque<QueryResult>>,
    recorded: Mutex<Vec<String>>,
    applied: Mutex<Vec<String>>,
    pending: Mutex<Vec<String>>,
    executed: AtomicU64,
    fail_on: Mutex<Option<u64>>,
    txn_active: AtomicBool,
    last_error: Mutex<Option<String>>,
    affected: AtomicU64,
    supports_ignore: bool,
    next_insert_id: AtomicU64,
    default_response: QueryResult,
}

impl InMemoryDriver {
    /// Create a new in-memory driver with no pre-configured responses.
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            recorded: Mutex::new(Vec::new()),
            applied: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            executed: AtomicU64::new(0),
            fail_on: Mutex::new(None),
            txn_active: AtomicBool::new(false),
            last_error: Mutex::new(None),
            affected: AtomicU64::new(0),
            supports_ignore: true,
            next_insert_id: AtomicU64::new(1),
            default_response: QueryResult::empty(),
        }
    }

    /// Add a response to be returned by the next statement.
    /// Responses are returned in FIFO order.
    pub fn with_response(self, response: QueryResult) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    /// Add multiple responses to be returned by subsequent statements.
    pub fn with_responses(self, responses: impl IntoIterator<Item = QueryResult>) -> Self {
        let mut queue = self.responses.lock().unwrap();
        for response in responses {
            queue.push_back(response);
        }
        drop(queue);
        self
    }

    /// Set a default response to use when no queued responses remain.
    pub fn with_default_response(mut self, response: QueryResult) -> Self {
        self.default_response = response;
        self
    }

    /// Report no support for ignore-on-conflict semantics.
    pub fn without_ignore_support(mut self) -> Self {
        self.supports_ignore = false;
        self
    }

    /// Make the `n`-th executed statement fail (1-indexed). Transaction
    /// control steps are not counted.
    pub fn fail_on_statement(self, n: u64) -> Self {
        *self.fail_on.lock().unwrap() = Some(n);
        self
    }

    /// Every statement seen by the driver, including transaction steps,
    /// in execution order.
    pub fn recorded_statements(&self) -> Vec<String> {
        self.recorded.lock().unwrap().clone()
    }

    /// Statements whose effects are visible: executed outside a transaction,
    /// or inside one that committed.
    pub fn applied_statements(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }

    /// The most recently executed statement, if any.
    pub fn last_statement(&self) -> Option<String> {
        self.recorded.lock().unwrap().last().cloned()
    }

    /// Assert that the last statement matches the expected SQL.
    pub fn assert_last_statement(&self, expected_sql: &str) {
        let last = self.last_statement().expect("No statements were recorded");
        assert_eq!(
            last, expected_sql,
            "SQL mismatch.\nExpected: {}\nActual: {}",
            expected_sql, last
        );
    }

    /// Assert that exactly n statements were seen, transaction steps included.
    pub fn assert_statement_count(&self, expected: usize) {
        let actual = self.recorded.lock().unwrap().len();
        assert_eq!(
            actual, expected,
            "Statement count mismatch. Expected: {}, Actual: {}",
            expected, actual
        );
    }
}

impl Default for InMemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for InMemoryDriver {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    fn fix_prefix(&self, prefix: &str, db_name: &str) -> String {
        if db_name.is_empty() || prefix.contains('.') {
            prefix.to_string()
        } else {
            format!("{}.{prefix}", self.quote_identifier(db_name))
        }
    }

    fn escape_string(&self, s: &str) -> String {
        s.replace('\'', "''")
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn support_ignore(&self) -> bool {
        self.supports_ignore
    }

    fn conflict_clause(
        &self,
        method: InsertMethod,
        columns: &[(&str, PlaceholderKind)],
        keys: &[&str],
    ) -> Result<Option<String>> {
        on_conflict_clause(method, columns, keys, self.supports_ignore)
    }

    async fn execute_raw(&self, sql: &str) -> Result<QueryResult> {
        let call = self.executed.fetch_add(1, Ordering::SeqCst) + 1;
        self.recorded.lock().unwrap().push(sql.to_string());

        if *self.fail_on.lock().unwrap() == Some(call) {
            let message = format!("injected failure on statement {call}");
            *self.last_error.lock().unwrap() = Some(message.clone());
            return Err(DbError::Database(message));
        }

        if self.txn_active.load(Ordering::SeqCst) {
            self.pending.lock().unwrap().push(sql.to_string());
        } else {
            self.applied.lock().unwrap().push(sql.to_string());
        }

        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_response.clone());
        self.affected.store(response.rows_affected(), Ordering::SeqCst);

        Ok(response)
    }

    fn affected_rows(&self) -> u64 {
        self.affected.load(Ordering::SeqCst)
    }

    async fn insert_id(&self, _table: &str, _field: &str) -> Result<u64> {
        Ok(self.next_insert_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn transaction(&self, op: TransactionOp) -> Result<()> {
        match op {
            TransactionOp::Begin => {
                if self.txn_active.load(Ordering::SeqCst) {
                    return Err(DbError::TransactionState(
                        "transaction already active".to_string(),
                    ));
                }
                self.txn_active.store(true, Ordering::SeqCst);
                self.recorded.lock().unwrap().push("BEGIN".to_string());
            }
            TransactionOp::Commit => {
                if !self.txn_active.load(Ordering::SeqCst) {
                    return Err(DbError::TransactionState(
                        "commit without an active transaction".to_string(),
                    ));
                }
                let mut pending = self.pending.lock().unwrap();
                self.applied.lock().unwrap().append(&mut pending);
                drop(pending);
                self.txn_active.store(false, Ordering::SeqCst);
                self.recorded.lock().unwrap().push("COMMIT".to_string());
            }
            TransactionOp::Rollback => {
                if !self.txn_active.load(Ordering::SeqCst) {
                    return Err(DbError::TransactionState(
                        "rollback without an active transaction".to_string(),
                    ));
                }
                self.pending.lock().unwrap().clear();
                self.txn_active.store(false, Ordering::SeqCst);
                self.recorded.lock().unwrap().push("ROLLBACK".to_string());
            }
        }
        Ok(())
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }

    async fn try_recover(&self) -> bool {
        false
    }
}

/// Builder for creating scripted responses easily.
pub struct ResponseBuilder {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    rows_affected: u64,
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected: 0,
        }
    }

    /// Set the column names for the response.
    pub fn columns(mut self, cols: &[&str]) -> Self {
        self.columns = cols.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Add a row of string values.
    pub fn row(mut self, values: &[&str]) -> Self {
        self.rows
            .push(values.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Set the affected-row count the statement reports.
    pub fn affected(mut self, count: u64) -> Self {
        self.rows_affected = count;
        self
    }

    /// Build the QueryResult.
    pub fn build(self) -> QueryResult {
        QueryResult::new(self.columns, self.rows, self.rows_affected)
    }
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}
