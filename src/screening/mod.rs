//! Bridge between the forum and its third-party request-screening library.
//!
//! The library decides whether an incoming request is abusive. Everything it
//! needs from the host application (clock, storage, escaping, contact
//! address, configuration, a head-section script slot) is the fixed callback
//! surface modeled by [`ScreeningHost`]. [`ForumHost`] implements that
//! surface over the forum's database client and settings map, and carries
//! the logging and maintenance helpers built on top of it.

mod settings;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;

use crate::client::DbClient;
use crate::error::Result;
use crate::template::{PlaceholderKind, Value};
use crate::traits::InsertMethod;
use crate::types::Row;

pub use settings::{read_whitelist, ScreeningSettings, Whitelist, DEFAULT_LOG_TABLE};

/// Verdict key recorded for requests that passed every check.
pub const PASSED_KEY: &str = "00000000";

/// Log entries older than this are pruned.
const LOG_RETENTION_SECS: i64 = 7 * 86_400;

/// The signed-in user attached to the request being screened.
#[derive(Debug, Clone, Default)]
pub struct SessionInfo {
    pub member_id: i64,
    pub session_id: String,
}

/// The request attributes the screening library hands back for logging.
#[derive(Debug, Clone, Default)]
pub struct RequestPackage {
    pub ip: String,
    pub request_method: String,
    pub request_uri: String,
    pub server_protocol: String,
    pub user_agent: String,
    pub headers: Vec<(String, String)>,
    pub request_entity: Vec<(String, String)>,
}

/// What a library-issued query produced.
#[derive(Debug)]
pub enum DbQueryOutcome {
    /// A read that matched at least one row.
    Rows(Vec<Row>),
    /// A read that matched nothing.
    Empty,
    /// A write; carries whether any row changed.
    Changed(bool),
}

/// The callback surface the screening library expects from its host.
/// The shape is fixed by the library.
#[async_trait]
pub trait ScreeningHost: Send + Sync {
    /// Current time in the format preferred by the database.
    fn db_date(&self) -> i64;

    /// Run one of the library's queries and report what it produced.
    async fn db_query(&self, sql: &str) -> Result<DbQueryOutcome>;

    /// Escape a string for database usage.
    fn db_escape(&self, s: &str) -> String;

    /// Emergency contact address shown on block pages.
    fn email(&self) -> &str;

    /// The assembled screening configuration.
    fn read_settings(&self) -> &ScreeningSettings;

    /// Inline script for the head template slot; falls back to cookies when
    /// the template does not use it.
    fn insert_head(&self) -> String;
}

/// [`ScreeningHost`] implementation over the forum's database client and
/// settings map.
pub struct ForumHost {
    db: DbClient,
    settings: ScreeningSettings,
    raw_settings: HashMap<String, String>,
    contact_email: String,
    session: SessionInfo,
    head_script: String,
}

impl ForumHost {
    pub fn new(
        db: DbClient,
        settings_map: &HashMap<String, String>,
        contact_email: impl Into<String>,
        session: SessionInfo,
    ) -> Self {
        Self {
            db,
            settings: ScreeningSettings::from_map(settings_map),
            raw_settings: settings_map.clone(),
            contact_email: contact_email.into(),
            session,
            head_script: String::new(),
        }
    }

    /// Store the `<script>`-wrapped snippet the library wants in the page
    /// head; [`ScreeningHost::insert_head`] serves it unwrapped.
    pub fn set_head_script(&mut self, wrapped: impl Into<String>) {
        self.head_script = wrapped.into();
    }

    /// The whitelist the library should honor, if any is configured.
    pub fn whitelist(&self) -> Option<Whitelist> {
        read_whitelist(&self.raw_settings)
    }

    /// Record a screened request in the log table. `verdict_key` is the
    /// library's verdict code ([`PASSED_KEY`] for clean requests).
    ///
    /// Returns whether a row was written; logging may be disabled.
    pub async fn log_request(&self, package: &RequestPackage, verdict_key: &str) -> Result<bool> {
        if !self.settings.logging {
            return Ok(false);
        }

        // Everything except the user agent, which gets its own column
        let headers: String = package
            .headers
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case("user-agent"))
            .map(|(name, value)| format!("{name}: {value}\n"))
            .collect();
        let request_entity: String = if package.request_method.eq_ignore_ascii_case("POST") {
            package
                .request_entity
                .iter()
                .map(|(name, value)| format!("{name}: {value}\n"))
                .collect()
        } else {
            String::new()
        };

        let columns: &[(&str, PlaceholderKind)] = &[
            ("ip", PlaceholderKind::String),
            ("date", PlaceholderKind::Int),
            ("request_method", PlaceholderKind::String),
            ("request_uri", PlaceholderKind::String),
            ("server_protocol", PlaceholderKind::String),
            ("http_headers", PlaceholderKind::String),
            ("user_agent", PlaceholderKind::String),
            ("request_entity", PlaceholderKind::String),
            ("valid", PlaceholderKind::String),
            ("id_member", PlaceholderKind::Int),
            ("session", PlaceholderKind::String),
        ];
        let row = vec![
            Value::Text(package.ip.clone()),
            Value::Int(self.db_date()),
            Value::Text(package.request_method.clone()),
            Value::Text(package.request_uri.clone()),
            Value::Text(package.server_protocol.clone()),
            Value::Text(headers),
            Value::Text(package.user_agent.clone()),
            Value::Text(request_entity),
            Value::Text(verdict_key.to_string()),
            Value::Int(self.session.member_id),
            Value::Text(self.session.session_id.clone()),
        ];

        self.db
            .insert(
                InsertMethod::Insert,
                &self.settings.log_table,
                columns,
                &[row],
                &[],
                false,
            )
            .await?;
        Ok(true)
    }

    /// Number of requests blocked in the retention window, for the optional
    /// footer blurb.
    pub async fn blocked_last_week(&self) -> Result<i64> {
        let template = format!(
            "SELECT COUNT(*) AS blocked FROM {} WHERE valid NOT LIKE {{string:passed}}",
            self.settings.log_table
        );
        let result = self
            .db
            .query(
                "screening_blocked_count",
                &template,
                &[("passed", Value::Text(PASSED_KEY.to_string()))],
            )
            .await?;
        result.single_row()?.get_int("blocked")
    }

    /// Drop log entries past the retention window. Returns the pruned count.
    pub async fn prune_log(&self) -> Result<u64> {
        let cutoff = self.db_date() - LOG_RETENTION_SECS;
        let template = format!(
            "DELETE FROM {} WHERE date < {{int:cutoff}}",
            self.settings.log_table
        );
        self.db
            .query("screening_prune", &template, &[("cutoff", Value::Int(cutoff))])
            .await?;
        Ok(self.db.affected_rows())
    }
}

#[async_trait]
impl ScreeningHost for ForumHost {
    fn db_date(&self) -> i64 {
        Utc::now().timestamp()
    }

    async fn db_query(&self, sql: &str) -> Result<DbQueryOutcome> {
        // The library only speaks MySQL; rewrite its maintenance statements
        // instead of passing them through.
        if sql.contains("DATE_SUB") {
            let pruned = self.prune_log().await?;
            return Ok(DbQueryOutcome::Changed(pruned != 0));
        }
        if sql.contains("@@session.wait_timeout") {
            return Ok(DbQueryOutcome::Changed(true));
        }

        let result = self.db.query("screening", sql, &[]).await?;
        if !result.is_empty() {
            Ok(DbQueryOutcome::Rows(result.rows()))
        } else if !result.columns().is_empty() {
            Ok(DbQueryOutcome::Empty)
        } else {
            Ok(DbQueryOutcome::Changed(result.rows_affected() != 0))
        }
    }

    fn db_escape(&self, s: &str) -> String {
        self.db.escape_string(s)
    }

    fn email(&self) -> &str {
        &self.contact_email
    }

    fn read_settings(&self) -> &ScreeningSettings {
        &self.settings
    }

    fn insert_head(&self) -> String {
        unwrap_head_script(&self.head_script)
    }
}

/// Unwrap the library's `<script>`-wrapped snippet so it can be injected
/// inline through the template's head slot.
pub fn unwrap_head_script(wrapped: &str) -> String {
    let stripped = wrapped
        .replace("<script type=\"text/javascript\">\n<!--\n", "")
        .replace("// --></script>", "");
    format!("\n{}", stripped.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_head_script() {
        let wrapped =
            "<script type=\"text/javascript\">\n<!--\nfunction probe() { return 1; }\n// --></script>";
        assert_eq!(unwrap_head_script(wrapped), "\nfunction probe() { return 1; }");
    }

    #[test]
    fn test_unwrap_head_script_plain_input() {
        assert_eq!(unwrap_head_script("  probe();  "), "\nprobe();");
    }
}
