use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};

use crate::drivers::on_conflict_clause;
use crate::error::{DbError, Result};
use crate::template::PlaceholderKind;
use crate::traits::{DatabaseDriver, InsertMethod, TransactionOp};
use crate::types::QueryResult;

/// PostgreSQL adapter backed by tokio-postgres.
///
/// Templates are rendered to finished SQL before execution, so statements go
/// over the simple-query protocol. String escaping assumes the server default
/// of `standard_conforming_strings = on`.
pub struct PostgresDriver {
    client: RwLock<Client>,
    url: String,
    last_error: Mutex<Option<String>>,
    affected: AtomicU64,
    txn_active: AtomicBool,
}

impl PostgresDriver {
    /// Connect to a PostgreSQL database using the provided connection string.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Self::open(url).await?;
        Ok(Self {
            client: RwLock::new(client),
            url: url.to_string(),
            last_error: Mutex::new(None),
            affected: AtomicU64::new(0),
            txn_active: AtomicBool::new(false),
        })
    }

    async fn open(url: &str) -> Result<Client> {
        let (client, connection) = tokio_postgres::connect(url, NoTls)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        // Drive the connection until it closes
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "postgres connection task ended with error");
            }
        });

        Ok(client)
    }

    fn record_error(&self, message: String) -> DbError {
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(message.clone());
        DbError::Database(message)
    }
}

#[async_trait]
impl DatabaseDriver for PostgresDriver {
    fn name(&self) -> &'static str {
        "postgres"
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
        true
    }

    fn conflict_clause(
        &self,
        method: InsertMethod,
        columns: &[(&str, PlaceholderKind)],
        keys: &[&str],
    ) -> Result<Option<String>> {
        on_conflict_clause(method, columns, keys, self.support_ignore())
    }

    async fn execute_raw(&self, sql: &str) -> Result<QueryResult> {
        let client = self.client.read().await;
        let messages = client
            .simple_query(sql)
            .await
            .map_err(|e| self.record_error(e.to_string()))?;
        drop(client);

        let mut columns: Vec<String> = Vec::new();
        let mut rows: Vec<Vec<String>> = Vec::new();
        let mut rows_affected = 0;

        for message in messages {
            match message {
                SimpleQueryMessage::RowDescription(description) => {
                    columns = description.iter().map(|c| c.name().to_string()).collect();
                }
                SimpleQueryMessage::Row(row) => {
                    if columns.is_empty() {
                        columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                    }
                    rows.push(
                        (0..row.len())
                            .map(|i| row.get(i).unwrap_or("NULL").to_string())
                            .collect(),
                    );
                }
                SimpleQueryMessage::CommandComplete(count) => rows_affected = count,
                _ => {}
            }
        }

        self.affected.store(rows_affected, Ordering::SeqCst);
        Ok(QueryResult::new(columns, rows, rows_affected))
    }

    fn affected_rows(&self) -> u64 {
        self.affected.load(Ordering::SeqCst)
    }

    async fn insert_id(&self, table: &str, field: &str) -> Result<u64> {
        let sql = format!(
            "SELECT currval(pg_get_serial_sequence('{}', '{}'))",
            self.escape_string(table),
            self.escape_string(field)
        );
        let id = self.execute_raw(&sql).await?.single_row()?.get_int("currval")?;
        u64::try_from(id).map_err(|_| DbError::ColumnDecode {
            column: "currval".to_string(),
            reason: "negative sequence value".to_string(),
        })
    }

    async fn transaction(&self, op: TransactionOp) -> Result<()> {
        match op {
            TransactionOp::Begin => {
                if self.txn_active.load(Ordering::SeqCst) {
                    return Err(DbError::TransactionState(
                        "transaction already active".to_string(),
                    ));
                }
                self.execute_raw("BEGIN").await?;
                self.txn_active.store(true, Ordering::SeqCst);
            }
            TransactionOp::Commit | TransactionOp::Rollback => {
                if !self.txn_active.load(Ordering::SeqCst) {
                    return Err(DbError::TransactionState(format!(
                        "{op} without an active transaction"
                    )));
                }
                let sql = if op == TransactionOp::Commit {
                    "COMMIT"
                } else {
                    "ROLLBACK"
                };
                self.execute_raw(sql).await?;
                self.txn_active.store(false, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn try_recover(&self) -> bool {
        if !self.client.read().await.is_closed() {
            return false;
        }
        match Self::open(&self.url).await {
            Ok(fresh) => {
                *self.client.write().await = fresh;
                // whatever was in flight is gone with the old session
                self.txn_active.store(false, Ordering::SeqCst);
                tracing::warn!(backend = self.name(), "reconnected after lost connection");
                true
            }
            Err(e) => {
                tracing::error!(backend = self.name(), error = %e, "reconnect failed");
                false
            }
        }
    }
}
