//! Row identifiers and column values.
//!
//! # Design
//! - Rows are modelled as loosely typed column maps so one engine can drive
//!   every child table; typed accessors live on the consumers.
//! - `Fields` is a `BTreeMap` so diffing and key extraction are deterministic.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Primary key of a stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(i64);

impl RowId {
    /// Wrap a raw database identifier.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Raw identifier value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RowId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Single column value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// SQL `NULL`.
    Null,
    /// Integer column.
    Int(i64),
    /// Text column.
    Text(String),
}

impl FieldValue {
    /// Integer payload, if this is an integer value.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Text payload, if this is a text value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Whether the value is SQL `NULL`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<RowId> for FieldValue {
    fn from(value: RowId) -> Self {
        Self::Int(value.get())
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Column map for one row.
pub type Fields = BTreeMap<String, FieldValue>;

/// Build a [`Fields`] map from `name => value` pairs.
#[macro_export]
macro_rules! fields {
    () => {
        $crate::Fields::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut fields = $crate::Fields::new();
        $(fields.insert(::std::string::String::from($name), $crate::FieldValue::from($value));)+
        fields
    }};
}

/// Read an integer column.
///
/// # Errors
///
/// Returns [`ModelError::MissingField`] when the column is absent and
/// [`ModelError::InvalidFieldType`] when it is not an integer.
pub fn int_field(fields: &Fields, field: &'static str) -> ModelResult<i64> {
    match fields.get(field) {
        Some(FieldValue::Int(value)) => Ok(*value),
        Some(_) => Err(ModelError::InvalidFieldType {
            field,
            expected: "integer",
        }),
        None => Err(ModelError::MissingField { field }),
    }
}

/// Read a text column, treating an absent or `NULL` column as empty.
///
/// # Errors
///
/// Returns [`ModelError::InvalidFieldType`] when the column holds an integer.
pub fn text_field(fields: &Fields, field: &'static str) -> ModelResult<String> {
    match fields.get(field) {
        Some(FieldValue::Text(value)) => Ok(value.clone()),
        Some(FieldValue::Null) | None => Ok(String::new()),
        Some(FieldValue::Int(_)) => Err(ModelError::InvalidFieldType {
            field,
            expected: "text",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_macro_converts_values() {
        let fields = fields! { "tag" => "env", "count" => 3, "note" => None::<String> };
        assert_eq!(fields.get("tag"), Some(&FieldValue::Text("env".into())));
        assert_eq!(fields.get("count"), Some(&FieldValue::Int(3)));
        assert_eq!(fields.get("note"), Some(&FieldValue::Null));
    }

    #[test]
    fn text_field_defaults_absent_to_empty() {
        let fields = fields! { "value" => 7 };
        assert_eq!(text_field(&fields, "value2"), Ok(String::new()));
        assert!(matches!(
            text_field(&fields, "value"),
            Err(ModelError::InvalidFieldType { field: "value", .. })
        ));
    }

    #[test]
    fn field_values_serialize_untagged() {
        let json = serde_json::to_string(&fields! { "a" => 1, "b" => "x" }).expect("serialize");
        assert_eq!(json, r#"{"a":1,"b":"x"}"#);
        let back: Fields = serde_json::from_str(r#"{"a":null,"b":2}"#).expect("deserialize");
        assert_eq!(back.get("a"), Some(&FieldValue::Null));
        assert_eq!(back.get("b"), Some(&FieldValue::Int(2)));
    }
}
