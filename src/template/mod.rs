//! Named-placeholder substitution for query templates.
//!
//! Templates carry tokens of two shapes: bare context tokens (`{db_prefix}`,
//! or a registered session fragment such as `{query_see_board}`) and typed
//! placeholders (`{string:name}`, `{array_int:ids}`). Every bound value is
//! checked against its placeholder's declared type and escaped through the
//! driver before it reaches the SQL string.

mod value;
mod wildcard;

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::{error_backtrace, DbError, Result, Severity};
use crate::traits::DatabaseDriver;

pub use value::{PlaceholderKind, Value};
pub use wildcard::escape_wildcard_string;

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([a-z_]+)(?::([a-zA-Z0-9_-]+))?\}").unwrap());

/// Per-request substitution context: the table-name prefix plus the
/// pre-authorized session SQL fragments that bare tokens expand to.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    prefix: String,
    fragments: HashMap<String, String>,
}

impl QueryContext {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            fragments: HashMap::new(),
        }
    }

    /// Register a session fragment, builder style.
    pub fn with_fragment(mut self, name: impl Into<String>, sql: impl Into<String>) -> Self {
        self.fragments.insert(name.into(), sql.into());
        self
    }

    pub fn set_fragment(&mut self, name: impl Into<String>, sql: impl Into<String>) {
        self.fragments.insert(name.into(), sql.into());
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn set_prefix(&mut self, prefix: impl Into<String>) {
        self.prefix = prefix.into();
    }

    pub fn fragment(&self, name: &str) -> Option<&str> {
        self.fragments.get(name).map(String::as_str)
    }
}

/// Whether `name` can be used as the name part of a placeholder token.
pub(crate) fn is_valid_placeholder_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Substitute every token in `template` and return the finished SQL string.
pub(crate) fn substitute<D>(
    template: &str,
    values: &[(&str, Value)],
    ctx: &QueryContext,
    driver: &D,
) -> Result<String>
where
    D: DatabaseDriver + ?Sized,
{
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in TOKEN_RE.captures_iter(template) {
        let whole = caps.get(0).unwrap();
        out.push_str(&template[last..whole.start()]);
        out.push_str(&render_token(&caps, values, ctx, driver)?);
        last = whole.end();
    }
    out.push_str(&template[last..]);

    Ok(out)
}

fn render_token<D>(
    caps: &Captures<'_>,
    values: &[(&str, Value)],
    ctx: &QueryContext,
    driver: &D,
) -> Result<String>
where
    D: DatabaseDriver + ?Sized,
{
    let kind_str = &caps[1];

    let Some(name) = caps.get(2) else {
        // bare token: the prefix or a registered session fragment
        if kind_str == "db_prefix" {
            return Ok(ctx.prefix().to_string());
        }
        return match ctx.fragment(kind_str) {
            Some(sql) => Ok(sql.to_string()),
            None => Err(fail(kind_str, "unrecognized token")),
        };
    };
    let name = name.as_str();

    let Some(kind) = PlaceholderKind::parse(kind_str) else {
        return Err(fail(
            &format!("{kind_str}:{name}"),
            "unrecognized placeholder type",
        ));
    };
    let Some((_, value)) = values.iter().find(|(n, _)| *n == name) else {
        return Err(fail(name, "no value bound for this placeholder"));
    };

    render_value(kind, value, name, driver)
}

fn render_value<D>(kind: PlaceholderKind, value: &Value, token: &str, driver: &D) -> Result<String>
where
    D: DatabaseDriver + ?Sized,
{
    match kind {
        PlaceholderKind::String => match value {
            Value::Text(s) => Ok(format!("'{}'", driver.escape_string(s))),
            Value::Null => Ok("NULL".to_string()),
            other => Err(mismatch(token, kind, other)),
        },
        PlaceholderKind::Int => match value {
            Value::Int(i) => Ok(i.to_string()),
            Value::Text(s) => match s.trim().parse::<i64>() {
                Ok(i) => Ok(i.to_string()),
                Err(_) => Err(fail(token, format!("`{s}` is not an integer"))),
            },
            Value::Null => Ok("NULL".to_string()),
            other => Err(mismatch(token, kind, other)),
        },
        PlaceholderKind::Float => match value {
            Value::Float(f) if f.is_finite() => Ok(f.to_string()),
            Value::Float(_) => Err(fail(token, "float value must be finite")),
            Value::Int(i) => Ok(i.to_string()),
            Value::Null => Ok("NULL".to_string()),
            other => Err(mismatch(token, kind, other)),
        },
        PlaceholderKind::Date => match value {
            Value::Date(d) => Ok(format!("'{}'", d.format("%Y-%m-%d"))),
            Value::Text(s) => match chrono::NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
                Ok(d) => Ok(format!("'{}'", d.format("%Y-%m-%d"))),
                Err(_) => Err(fail(token, format!("`{s}` is not a YYYY-MM-DD date"))),
            },
            Value::Null => Ok("NULL".to_string()),
            other => Err(mismatch(token, kind, other)),
        },
        PlaceholderKind::ArrayInt => match value {
            Value::IntList(items) if !items.is_empty() => Ok(items
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")),
            Value::IntList(_) => Err(fail(token, "list placeholders need at least one element")),
            other => Err(mismatch(token, kind, other)),
        },
        PlaceholderKind::ArrayString => match value {
            Value::TextList(items) if !items.is_empty() => Ok(items
                .iter()
                .map(|s| format!("'{}'", driver.escape_string(s)))
                .collect::<Vec<_>>()
                .join(", ")),
            Value::TextList(_) => Err(fail(token, "list placeholders need at least one element")),
            other => Err(mismatch(token, kind, other)),
        },
        PlaceholderKind::Identifier => match value {
            Value::Text(s) => Ok(driver.quote_identifier(s)),
            other => Err(mismatch(token, kind, other)),
        },
        PlaceholderKind::Raw => match value {
            Value::Text(s) => Ok(s.clone()),
            other => Err(mismatch(token, kind, other)),
        },
    }
}

#[track_caller]
fn fail(token: &str, reason: impl Into<String>) -> DbError {
    error_backtrace(
        DbError::Placeholder {
            token: token.to_string(),
            reason: reason.into(),
        },
        "",
        Severity::Critical,
    )
}

#[track_caller]
fn mismatch(token: &str, kind: PlaceholderKind, value: &Value) -> DbError {
    fail(
        token,
        format!(
            "expected a {} value, got {}",
            kind.token(),
            value.type_name()
        ),
    )
}
