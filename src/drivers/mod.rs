mod in_memory;
mod postgres;

pub use self::in_memory::{InMemoryDriver, ResponseBuilder};
pub use self::postgres::PostgresDriver;

use crate::error::{DbError, Result};
use crate::template::PlaceholderKind;
use crate::traits::InsertMethod;

/// Build a PostgreSQL-style `ON CONFLICT` clause for the given insert method.
///
/// Replace becomes `DO UPDATE SET col = EXCLUDED.col` over the non-key
/// columns; ignore becomes `DO NOTHING`. Shared by the adapters that speak
/// this dialect.
pub(crate) fn on_conflict_clause(
    method: InsertMethod,
    columns: &[(&str, PlaceholderKind)],
    keys: &[&str],
    supports_ignore: bool,
) -> Result<Option<String>> {
    fn quote_ident(ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    match method {
        InsertMethod::Insert => Ok(None),
        InsertMethod::Ignore => {
            if !supports_ignore {
                return Err(DbError::Unsupported("ignore-on-conflict semantics"));
            }
            Ok(Some(if keys.is_empty() {
                "ON CONFLICT DO NOTHING".to_string()
            } else {
                format!(
                    "ON CONFLICT ({}) DO NOTHING",
                    keys.iter()
                        .map(|k| quote_ident(k))
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }))
        }
        InsertMethod::Replace => {
            if keys.is_empty() {
                return Err(DbError::Malformed(
                    "replace requires key columns for conflict resolution".to_string(),
                ));
            }
            let target = keys
                .iter()
                .map(|k| quote_ident(k))
                .collect::<Vec<_>>()
                .join(", ");
            let updates: Vec<String> = columns
                .iter()
                .map(|(name, _)| *name)
                .filter(|name| !keys.contains(name))
                .map(|name| format!("{0} = EXCLUDED.{0}", quote_ident(name)))
                .collect();
            Ok(Some(if updates.is_empty() {
                format!("ON CONFLICT ({target}) DO NOTHING")
            } else {
                format!("ON CONFLICT ({target}) DO UPDATE SET {}", updates.join(", "))
            }))
        }
    }
}
