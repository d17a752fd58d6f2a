use chrono::NaiveDate;

/// A typed value bound to a named placeholder, in a driver-agnostic way.
/// The substitution engine renders these into SQL through the driver's
/// escaping hooks.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    IntList(Vec<i64>),
    TextList(Vec<String>),
}

impl Value {
    /// Human-readable name of the value's type, for validation messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Date(_) => "date",
            Value::IntList(_) => "int list",
            Value::TextList(_) => "text list",
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<Vec<i64>> for Value {
    fn from(value: Vec<i64>) -> Self {
        Value::IntList(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::TextList(value)
    }
}

impl From<Vec<&str>> for Value {
    fn from(value: Vec<&str>) -> Self {
        Value::TextList(value.into_iter().map(str::to_string).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// The value type a placeholder expects, as written in query templates
/// (`{int:id}`) and in bulk-insert column declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderKind {
    String,
    Int,
    Float,
    Date,
    ArrayInt,
    ArrayString,
    Identifier,
    Raw,
}

impl PlaceholderKind {
    /// Parse the kind part of a `{kind:name}` token.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "string" => Some(PlaceholderKind::String),
            "int" => Some(PlaceholderKind::Int),
            "float" => Some(PlaceholderKind::Float),
            "date" => Some(PlaceholderKind::Date),
            "array_int" => Some(PlaceholderKind::ArrayInt),
            "array_string" => Some(PlaceholderKind::ArrayString),
            "identifier" => Some(PlaceholderKind::Identifier),
            "raw" => Some(PlaceholderKind::Raw),
            _ => None,
        }
    }

    /// The kind as it appears inside a template token.
    pub fn token(self) -> &'static str {
        match self {
            PlaceholderKind::String => "string",
            PlaceholderKind::Int => "int",
            PlaceholderKind::Float => "float",
            PlaceholderKind::Date => "date",
            PlaceholderKind::ArrayInt => "array_int",
            PlaceholderKind::ArrayString => "array_string",
            PlaceholderKind::Identifier => "identifier",
            PlaceholderKind::Raw => "raw",
        }
    }
}
