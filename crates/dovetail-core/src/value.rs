use crate::Result;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;

/// The data type class of a mapped column.
///
/// Classes, not storage types: the engine only needs to know how a column
/// value crosses the JSON boundary, not its precise SQL declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Double,
    String,
    Binary,
    Boolean,
    Json,
    Geometry,
}

/// A ready-to-embed SQL fragment.
///
/// Every constructor that accepts untrusted text escapes it; once a value
/// is a `SqlLiteral` it may be pasted into a statement verbatim. This is
/// the currency of [`PrimaryKeyColumnValues`] and of the row-ownership
/// binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SqlLiteral(String);

impl SqlLiteral {
    /// Wraps a fragment the caller has already rendered. The caller is
    /// responsible for its validity.
    pub fn raw(fragment: impl Into<String>) -> Self {
        Self(fragment.into())
    }

    pub fn null() -> Self {
        Self("NULL".to_string())
    }

    /// A single-quoted string literal, escaped MySQL-style.
    pub fn quoted(text: &str) -> Self {
        let mut out = String::with_capacity(text.len() + 2);
        out.push('\'');
        escape_into(&mut out, text);
        out.push('\'');
        Self(out)
    }

    /// A binary literal in `X'…'` form.
    pub fn bytes(bytes: &[u8]) -> Self {
        let mut out = String::with_capacity(bytes.len() * 2 + 3);
        out.push_str("X'");
        for byte in bytes {
            out.push_str(&format!("{byte:02X}"));
        }
        out.push('\'');
        Self(out)
    }

    /// A `FROM_BASE64` expression for a Base64 payload that has already
    /// been validated.
    fn from_base64(text: &str) -> Self {
        let mut out = String::with_capacity(text.len() + 16);
        out.push_str("FROM_BASE64('");
        escape_into(&mut out, text);
        out.push_str("')");
        Self(out)
    }

    /// A JSON document literal, `CAST('…' AS JSON)`.
    fn json(value: &Value) -> Self {
        let text = value.to_string();
        let mut out = String::with_capacity(text.len() + 18);
        out.push_str("CAST('");
        escape_into(&mut out, &text);
        out.push_str("' AS JSON)");
        Self(out)
    }

    /// A geometry literal from its GeoJSON form.
    fn geometry(value: &Value) -> Self {
        let text = value.to_string();
        let mut out = String::with_capacity(text.len() + 24);
        out.push_str("ST_GeomFromGeoJSON('");
        escape_into(&mut out, &text);
        out.push_str("')");
        Self(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == "NULL"
    }
}

impl fmt::Display for SqlLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for SqlLiteral {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for SqlLiteral {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<bool> for SqlLiteral {
    fn from(value: bool) -> Self {
        Self(if value { "TRUE" } else { "FALSE" }.to_string())
    }
}

/// MySQL-style string escaping.
pub fn escape_into(dst: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '\'' => dst.push_str("\\'"),
            '"' => dst.push_str("\\\""),
            '\\' => dst.push_str("\\\\"),
            '\0' => dst.push_str("\\0"),
            '\n' => dst.push_str("\\n"),
            '\r' => dst.push_str("\\r"),
            '\u{1a}' => dst.push_str("\\Z"),
            ch => dst.push(ch),
        }
    }
}

/// Converts a JSON value to a SQL literal for a column of the given type
/// class. `None` means the value's JSON type does not fit the column.
pub fn literal(ty: ColumnType, value: &Value) -> Option<SqlLiteral> {
    if value.is_null() {
        return Some(SqlLiteral::null());
    }

    match ty {
        ColumnType::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(SqlLiteral::raw(n.to_string())),
            // 64-bit integers may travel as strings to avoid precision loss.
            Value::String(s) if is_decimal(s) => Some(SqlLiteral::raw(s.clone())),
            _ => None,
        },
        ColumnType::Double => match value {
            Value::Number(n) => Some(SqlLiteral::raw(n.to_string())),
            _ => None,
        },
        ColumnType::String => value.as_str().map(SqlLiteral::quoted),
        ColumnType::Binary => match value.as_str() {
            Some(text) if BASE64.decode(text).is_ok() => Some(SqlLiteral::from_base64(text)),
            _ => None,
        },
        ColumnType::Boolean => value.as_bool().map(SqlLiteral::from),
        ColumnType::Json => Some(SqlLiteral::json(value)),
        ColumnType::Geometry => match value {
            Value::Object(_) => Some(SqlLiteral::geometry(value)),
            _ => None,
        },
    }
}

fn is_decimal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Compares two document values for a column of the given type class.
///
/// `null` only equals `null`; numeric classes compare numerically (so `2`
/// and `2.0` agree); JSON classes compare structurally, insensitive to
/// object key order.
pub fn values_equal(ty: ColumnType, a: &Value, b: &Value) -> bool {
    match (a.is_null(), b.is_null()) {
        (true, true) => return true,
        (true, false) | (false, true) => return false,
        (false, false) => {}
    }

    match ty {
        ColumnType::Integer | ColumnType::Double => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            // Stringified 64-bit integers still compare as text.
            _ => a.as_str().is_some() && a == b,
        },
        ColumnType::Boolean => a.as_bool() == b.as_bool() && a.as_bool().is_some(),
        ColumnType::String | ColumnType::Binary => a.as_str() == b.as_str() && a.as_str().is_some(),
        ColumnType::Json | ColumnType::Geometry => a == b,
    }
}

/// Ordered mapping from primary-key column name to a ready-to-embed SQL
/// literal.
///
/// Order matters: composite keys render predicates and URL segments in
/// declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrimaryKeyColumnValues {
    columns: IndexMap<String, SqlLiteral>,
}

impl PrimaryKeyColumnValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single-column key.
    pub fn single(column: impl Into<String>, value: impl Into<SqlLiteral>) -> Self {
        let mut this = Self::new();
        this.insert(column, value);
        this
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<SqlLiteral>) {
        self.columns.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&SqlLiteral> {
        self.columns.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlLiteral)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<(String, SqlLiteral)> for PrimaryKeyColumnValues {
    fn from_iter<T: IntoIterator<Item = (String, SqlLiteral)>>(iter: T) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a PrimaryKeyColumnValues {
    type Item = (&'a String, &'a SqlLiteral);
    type IntoIter = indexmap::map::Iter<'a, String, SqlLiteral>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

/// Decodes one column of a text-protocol result row into the JSON value a
/// read of that column would produce. Used when the engine selects raw
/// columns (key collection, link columns) rather than whole documents.
pub fn column_text_to_json(ty: ColumnType, text: &str) -> Result<Value> {
    let value = match ty {
        ColumnType::Integer => match text.parse::<i64>() {
            Ok(n) => Value::from(n),
            Err(_) => Value::from(text.parse::<u64>().map_err(anyhow::Error::from)?),
        },
        ColumnType::Double => Value::from(text.parse::<f64>().map_err(anyhow::Error::from)?),
        ColumnType::Boolean => Value::Bool(!matches!(text, "0" | "false")),
        ColumnType::String | ColumnType::Binary => Value::from(text),
        ColumnType::Json | ColumnType::Geometry => serde_json::from_str(text)?,
    };
    Ok(value)
}
