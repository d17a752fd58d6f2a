use std::fmt;

use async_trait::async_trait;

use crate::error::{error_backtrace, DbError, Result, Severity};
use crate::template::{self, PlaceholderKind, QueryContext, Value};
use crate::types::QueryResult;

/// A transaction control step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOp {
    Begin,
    Commit,
    Rollback,
}

impl fmt::Display for TransactionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionOp::Begin => "begin",
            TransactionOp::Commit => "commit",
            TransactionOp::Rollback => "rollback",
        })
    }
}

/// How a bulk insert resolves rows that collide with existing keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMethod {
    /// Plain insert; conflicts are errors.
    Insert,
    /// Replace the existing row on conflict.
    Replace,
    /// Silently skip conflicting rows, if the backend supports it.
    Ignore,
}

impl fmt::Display for InsertMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InsertMethod::Insert => "insert",
            InsertMethod::Replace => "replace",
            InsertMethod::Ignore => "ignore",
        })
    }
}

/// The contract every database backend adapter implements.
///
/// Backend-specific primitives (escaping, execution, transaction control,
/// bookkeeping) are required methods; the template-driven operations
/// (`quote`, `query`, `insert`) are shared and built on top of them, so
/// calling code stays backend-agnostic.
///
/// An adapter instance doubles as the connection handle: it wraps one open
/// session whose lifetime is managed by the underlying client library, and
/// serves one logical request path at a time.
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Backend tag used in log output.
    fn name(&self) -> &'static str;

    /// Rewrite the table-name prefix so queries do not require the target
    /// database to be pre-selected, qualifying it with `db_name`.
    fn fix_prefix(&self, prefix: &str, db_name: &str) -> String;

    /// Escape a string for use inside a single-quoted SQL literal.
    fn escape_string(&self, s: &str) -> String;

    /// Quote an identifier (table or column name).
    fn quote_identifier(&self, ident: &str) -> String;

    /// Whether the backend honors ignore-on-conflict semantics.
    /// Pure capability query; no side effects.
    fn support_ignore(&self) -> bool;

    /// The clause implementing `method`'s conflict resolution over `keys`,
    /// or `None` for a plain insert. Fails when `method` asks for ignore
    /// semantics the backend does not support.
    fn conflict_clause(
        &self,
        method: InsertMethod,
        columns: &[(&str, PlaceholderKind)],
        keys: &[&str],
    ) -> Result<Option<String>>;

    /// Execute finished SQL. No substitution, no error-path recovery.
    async fn execute_raw(&self, sql: &str) -> Result<QueryResult>;

    /// Rows changed by the most recent write on this connection, or zero
    /// when no write has happened yet.
    fn affected_rows(&self) -> u64;

    /// The last auto-generated id for `table`.`field`. Backend-specific
    /// behavior if the table has no auto-increment column.
    async fn insert_id(&self, table: &str, field: &str) -> Result<u64>;

    /// Perform a transaction step. Commit or rollback without an active
    /// transaction is a transaction-state error, as is a nested begin.
    async fn transaction(&self, op: TransactionOp) -> Result<()>;

    /// The most recent error string reported by the backend driver.
    fn last_error(&self) -> Option<String>;

    /// Attempt in-place recovery of a broken connection (e.g. reconnect).
    /// Returns whether the connection is usable again.
    async fn try_recover(&self) -> bool;

    /// Substitute and escape a query template without executing it, and
    /// return the finished SQL string.
    fn quote(&self, template: &str, values: &[(&str, Value)], ctx: &QueryContext) -> Result<String> {
        crate::template::substitute(template, values, ctx, self)
    }

    /// Substitute, execute, and take care of errors: a failed statement is
    /// logged with a backtrace and re-surfaced after one recovery attempt.
    /// `identifier` tags the query in log output.
    async fn query(
        &self,
        identifier: &str,
        template: &str,
        values: &[(&str, Value)],
        ctx: &QueryContext,
    ) -> Result<QueryResult> {
        let sql = self.quote(template, values, ctx)?;
        tracing::debug!(identifier, backend = self.name(), sql = %sql, "executing query");

        match self.execute_raw(&sql).await {
            Ok(result) => Ok(result),
            Err(first) => {
                let detail = self.last_error().unwrap_or_else(|| first.to_string());
                if self.try_recover().await {
                    tracing::warn!(
                        identifier,
                        backend = self.name(),
                        "connection recovered, retrying query"
                    );
                    if let Ok(result) = self.execute_raw(&sql).await {
                        return Ok(result);
                    }
                }
                Err(error_backtrace(
                    first,
                    &format!("query `{identifier}` failed: {detail}"),
                    Severity::Critical,
                ))
            }
        }
    }

    /// Bulk-write `rows` into `table`, with `method` deciding how key
    /// conflicts resolve. The batch runs inside a transaction unless
    /// `disable_trans` is set, and rolls back fully when any row fails.
    /// Returns the total affected-row count.
    #[allow(clippy::too_many_arguments)]
    async fn insert(
        &self,
        method: InsertMethod,
        table: &str,
        columns: &[(&str, PlaceholderKind)],
        rows: &[Vec<Value>],
        keys: &[&str],
        disable_trans: bool,
        ctx: &QueryContext,
    ) -> Result<u64> {
        if columns.is_empty() {
            return Err(DbError::Malformed(
                "insert requires at least one column".to_string(),
            ));
        }
        if rows.is_empty() {
            return Ok(0);
        }
        for (name, _) in columns {
            if !template::is_valid_placeholder_name(name) {
                return Err(DbError::Malformed(format!(
                    "column name `{name}` is not usable as a placeholder"
                )));
            }
        }

        // fail fast on unsupported method before any statement runs
        let conflict = self.conflict_clause(method, columns, keys)?;

        let table_sql = self.quote(table, &[], ctx)?;
        let column_list = columns
            .iter()
            .map(|(name, _)| self.quote_identifier(name))
            .collect::<Vec<_>>()
            .join(", ");
        let row_template = format!(
            "({})",
            columns
                .iter()
                .map(|(name, kind)| format!("{{{}:{}}}", kind.token(), name))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let mut statements = Vec::with_capacity(rows.len());
        for row in rows {
            if row.len() != columns.len() {
                return Err(DbError::Malformed(format!(
                    "insert row has {} values, expected {}",
                    row.len(),
                    columns.len()
                )));
            }
            let bindings: Vec<(&str, Value)> = columns
                .iter()
                .map(|(name, _)| *name)
                .zip(row.iter().cloned())
                .collect();
            let tuple = self.quote(&row_template, &bindings, ctx)?;

            let mut sql = format!("INSERT INTO {table_sql} ({column_list}) VALUES {tuple}");
            if let Some(clause) = &conflict {
                sql.push(' ');
                sql.push_str(clause);
            }
            statements.push(sql);
        }

        tracing::debug!(
            table,
            backend = self.name(),
            method = %method,
            rows = rows.len(),
            "bulk insert"
        );

        let wrap = !disable_trans;
        if wrap {
            self.transaction(TransactionOp::Begin).await?;
        }

        let mut affected = 0;
        for sql in &statements {
            match self.execute_raw(sql).await {
                Ok(_) => affected += self.affected_rows(),
                Err(err) => {
                    let detail = self.last_error().unwrap_or_else(|| err.to_string());
                    if wrap {
                        self.transaction(TransactionOp::Rollback).await?;
                    }
                    return Err(error_backtrace(
                        err,
                        &format!("insert into `{table}` failed: {detail}"),
                        Severity::Critical,
                    ));
                }
            }
        }

        if wrap {
            self.transaction(TransactionOp::Commit).await?;
        }
        Ok(affected)
    }
}
