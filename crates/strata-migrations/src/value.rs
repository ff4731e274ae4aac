//! Parameter values carried by SQL actions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A positional parameter (or literal default) attached to an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	String(String),
	Bytes(Vec<u8>),
	Timestamp(DateTime<Utc>),
}

impl SqlValue {
	/// Hex encoding used by the literal renderers for binary values.
	pub(crate) fn hex(bytes: &[u8]) -> String {
		bytes.iter().map(|b| format!("{:02x}", b)).collect()
	}
}

/// Neutral literal rendering, used in operation descriptions.
///
/// Dialect-exact rendering is [`SchemaEditor::literal`](crate::SchemaEditor::literal).
impl fmt::Display for SqlValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SqlValue::Null => write!(f, "NULL"),
			SqlValue::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
			SqlValue::Int(i) => write!(f, "{}", i),
			SqlValue::Float(v) => write!(f, "{}", v),
			SqlValue::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
			SqlValue::Bytes(b) => write!(f, "X'{}'", Self::hex(b)),
			SqlValue::Timestamp(dt) => write!(f, "'{}'", dt.to_rfc3339()),
		}
	}
}

impl From<&str> for SqlValue {
	fn from(s: &str) -> Self {
		SqlValue::String(s.to_string())
	}
}

impl From<String> for SqlValue {
	fn from(s: String) -> Self {
		SqlValue::String(s)
	}
}

impl From<i64> for SqlValue {
	fn from(i: i64) -> Self {
		SqlValue::Int(i)
	}
}

impl From<i32> for SqlValue {
	fn from(i: i32) -> Self {
		SqlValue::Int(i as i64)
	}
}

impl From<f64> for SqlValue {
	fn from(f: f64) -> Self {
		SqlValue::Float(f)
	}
}

impl From<bool> for SqlValue {
	fn from(b: bool) -> Self {
		SqlValue::Bool(b)
	}
}

impl From<Vec<u8>> for SqlValue {
	fn from(b: Vec<u8>) -> Self {
		SqlValue::Bytes(b)
	}
}

impl From<DateTime<Utc>> for SqlValue {
	fn from(dt: DateTime<Utc>) -> Self {
		SqlValue::Timestamp(dt)
	}
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
	fn from(value: Option<T>) -> Self {
		value.map(Into::into).unwrap_or(SqlValue::Null)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case(SqlValue::Null, "NULL")]
	#[case(SqlValue::Int(5), "5")]
	#[case(SqlValue::Bool(true), "TRUE")]
	#[case(SqlValue::from("O'Brien"), "'O''Brien'")]
	#[case(SqlValue::Bytes(vec![0x0a, 0xff]), "X'0aff'")]
	fn test_display_renders_literal(#[case] value: SqlValue, #[case] expected: &str) {
		assert_eq!(value.to_string(), expected);
	}

	#[test]
	fn test_option_conversion() {
		assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
		assert_eq!(SqlValue::from(Some(3i64)), SqlValue::Int(3));
	}
}
