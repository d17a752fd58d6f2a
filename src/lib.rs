//! palaver-db - the database abstraction layer of the Palaver forum engine
//!
//! A thin, backend-agnostic façade over a SQL client library. Queries are
//! written once as named-placeholder templates and run against any backend
//! implementing the [`DatabaseDriver`] contract: substitution and escaping,
//! execution with logged error recovery, transactions, bulk inserts with
//! replace/ignore conflict handling, and LIKE-wildcard escaping. The crate
//! also carries the bridge wiring the forum to its third-party
//! request-screening library ([`screening`]).
//!
//! # Example
//! ```ignore
//! use palaver_db::{DbClient, Value};
//!
//! // Connect to the forum database
//! let client = DbClient::connect("postgres://localhost/forum", "forum_").await?;
//!
//! let result = client
//!     .query(
//!         "recent_members",
//!         "SELECT id_member, member_name
//!          FROM {db_prefix}members
//!          WHERE id_member IN ({array_int:ids})",
//!         &[("ids", Value::from(vec![1i64, 2, 3]))],
//!     )
//!     .await?;
//!
//! for row in result.rows() {
//!     println!("{}", row.get("member_name")?);
//! }
//! ```

pub mod drivers;
pub mod error;
pub mod screening;
pub mod template;
pub mod traits;
pub mod types;

mod client;

// Re-export main types for convenient access
pub use client::DbClient;
pub use error::{error_backtrace, DbError, Result, Severity};
pub use template::{escape_wildcard_string, PlaceholderKind, QueryContext, Value};
pub use traits::{DatabaseDriver, InsertMethod, TransactionOp};
pub use types::{QueryResult, Row};
