use std::collections::HashMap;

use crate::error::{DbError, Result};

/// A single row of a result set. Values are carried as strings and accessed
/// by column name; decoding to a concrete type happens at the call site.
#[derive(Debug, Clone)]
pub struct Row {
    values: HashMap<String, String>,
}

impl Row {
    pub(crate) fn new(columns: &[String], values: Vec<String>) -> Self {
        let values = columns
            .iter()
            .zip(values)
            .map(|(col, val)| (col.clone(), val))
            .collect();
        Self { values }
    }

    /// Gets a value by column name.
    pub fn get(&self, column: &str) -> Result<&str> {
        self.values
            .get(column)
            .map(String::as_str)
            .ok_or_else(|| DbError::ColumnNotFound(column.to_string()))
    }

    /// Gets a value by column name and decodes it as an integer.
    pub fn get_int(&self, column: &str) -> Result<i64> {
        self.get(column)?
            .trim()
            .parse()
            .map_err(|_| DbError::ColumnDecode {
                column: column.to_string(),
                reason: "not an integer".to_string(),
            })
    }

    /// Returns all column names in this row.
    pub fn columns(&self) -> Vec<&str> {
        self.values.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Result of executing a statement: zero or more rows for reads, plus the
/// affected-row count reported by the backend for writes.
#[derive(Debug, Clone)]
pub struct QueryResult {
    columns: Vec<String>,
    rows: Vec<Row>,
    rows_affected: u64,
}

impl QueryResult {
    /// Build a result from raw column names and row values in column order.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>, rows_affected: u64) -> Self {
        let rows = rows
            .into_iter()
            .map(|values| Row::new(&columns, values))
            .collect();
        Self {
            columns,
            rows,
            rows_affected,
        }
    }

    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected: 0,
        }
    }

    /// Rows changed by the statement, for writes.
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// Extracts a single row from the result.
    /// Returns an error if the result contains zero or more than one row.
    pub fn single_row(self) -> Result<Row> {
        if self.rows.len() != 1 {
            return Err(DbError::UnexpectedRowCount {
                expected: 1,
                actual: self.rows.len(),
            });
        }
        Ok(self.rows.into_iter().next().unwrap())
    }

    /// Returns all rows from the result.
    pub fn rows(self) -> Vec<Row> {
        self.rows
    }

    /// Returns a reference to the rows without consuming the result.
    pub fn rows_ref(&self) -> &[Row] {
        &self.rows
    }

    /// Returns the column names from this result.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the number of rows in this result.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if this result contains no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
