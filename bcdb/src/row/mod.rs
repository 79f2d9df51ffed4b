// Row codec - typed values to and from the `;;`-delimited text form

use crate::error::{BcdbError, Result};
use crate::schema::{DataType, FIELD_SEP};
use std::fmt;

/// A single typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

/// One record, values in schema order.
pub type Row = Vec<Value>;

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Boolean(_) => DataType::Boolean,
            Value::Integer(_) => DataType::Integer,
            Value::Float(_) => DataType::Float,
            Value::String(_) => DataType::String,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            other => f.write_str(&encode(other)),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// Build a [`Row`] from anything convertible into [`Value`].
///
/// ```
/// use bcdb::{row, Value};
/// assert_eq!(row![5, "x"], vec![Value::Integer(5), Value::String("x".into())]);
/// ```
#[macro_export]
macro_rules! row {
    ($($value:expr),* $(,)?) => {
        vec![$($crate::Value::from($value)),*]
    };
}

/// Decode one field of a data line according to its column type.
pub fn decode(field: &str, data_type: DataType) -> Result<Value> {
    if field.contains(FIELD_SEP) {
        return Err(BcdbError::Constraint(format!(
            "invalid value {field:?}: string contains separator"
        )));
    }
    match data_type {
        DataType::Boolean => {
            if field.eq_ignore_ascii_case("true") {
                Ok(Value::Boolean(true))
            } else if field.eq_ignore_ascii_case("false") {
                Ok(Value::Boolean(false))
            } else {
                Err(BcdbError::Corrupt(format!("{field:?} isn't boolean")))
            }
        }
        DataType::Float => {
            if !field.contains('.') {
                return Err(BcdbError::Corrupt(format!("{field:?} isn't float")));
            }
            field
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| BcdbError::Corrupt(format!("{field:?} isn't float: {e}")))
        }
        DataType::Integer => {
            if field.contains('.') {
                return Err(BcdbError::Corrupt(format!("{field:?} isn't integer")));
            }
            field
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|e| BcdbError::Corrupt(format!("{field:?} isn't integer: {e}")))
        }
        DataType::String => Ok(Value::String(unescape(field))),
    }
}

/// Encode one value for a data line.
pub fn encode(value: &Value) -> String {
    match value {
        Value::Boolean(true) => "True".to_string(),
        Value::Boolean(false) => "False".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => {
            let text = f.to_string();
            if f.is_finite() && !text.contains('.') {
                format!("{text}.0")
            } else {
                text
            }
        }
        Value::String(s) => escape(s),
    }
}

/// Encode a whole row, without the trailing newline.
pub fn encode_row(row: &[Value]) -> String {
    let fields: Vec<String> = row.iter().map(encode).collect();
    fields.join(FIELD_SEP)
}

/// Render a row for error messages, e.g. `(5, "x")`.
pub fn display_row(row: &[Value]) -> String {
    let values: Vec<String> = row.iter().map(Value::to_string).collect();
    format!("({})", values.join(", "))
}

fn escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            c => result.push(c),
        }
    }
    result
}

/// Inverse of `escape`. Unknown escapes and a trailing backslash are kept
/// verbatim.
fn unescape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => result.push('\\'),
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }
    result
}
