//! Field type definitions for migrations

use serde::{Deserialize, Serialize};

/// Value type of a column.
///
/// The variant together with its parameters is the column's type identity:
/// two columns with equal `FieldType`s never need a type alteration.
/// Rendering to SQL is done by each backend's [`SchemaEditor`](crate::SchemaEditor)
/// with an exhaustive match, so adding a variant forces every dialect to handle it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
	// Auto-incrementing primary keys
	AutoField,
	BigAutoField,

	// Integer types
	SmallInteger,
	Integer,
	BigInteger,

	// Boolean type
	Boolean,

	// String types
	/// Short text. `None` renders an unbounded `VARCHAR`.
	Char {
		max_length: Option<u32>,
	},
	Text,

	// Date/time types
	Date,
	DateTime,
	Time,

	// Numeric types
	Decimal {
		max_digits: u32,
		decimal_places: u32,
	},
	Float,
	Double,

	// Binary and structured types
	Binary,
	Json,
	Uuid,

	/// Foreign-key reference. The boxed type is the storage type of the referenced column.
	ForeignKey(Box<FieldType>),
}

impl FieldType {
	/// `VARCHAR(255)`, the default short text column.
	pub fn char() -> Self {
		FieldType::Char {
			max_length: Some(255),
		}
	}

	/// `VARCHAR(max_length)`
	pub fn varchar(max_length: u32) -> Self {
		FieldType::Char {
			max_length: Some(max_length),
		}
	}

	/// `NUMERIC(10, 5)`, the default decimal column.
	pub fn decimal() -> Self {
		FieldType::Decimal {
			max_digits: 10,
			decimal_places: 5,
		}
	}

	/// Foreign-key type pointing at a column of type `target`.
	///
	/// ```
	/// use strata_migrations::FieldType;
	///
	/// let fk = FieldType::foreign_key_to(&FieldType::AutoField);
	/// assert_eq!(fk, FieldType::ForeignKey(Box::new(FieldType::Integer)));
	/// ```
	pub fn foreign_key_to(target: &FieldType) -> Self {
		FieldType::ForeignKey(Box::new(target.reference_storage()))
	}

	/// Storage type of a column that references a column of this type.
	///
	/// Serial keys degrade to their plain integer type; a reference to a
	/// foreign key stores whatever that key stores.
	pub fn reference_storage(&self) -> FieldType {
		match self {
			FieldType::AutoField => FieldType::Integer,
			FieldType::BigAutoField => FieldType::BigInteger,
			FieldType::ForeignKey(inner) => inner.reference_storage(),
			other => other.clone(),
		}
	}

	pub fn is_auto(&self) -> bool {
		matches!(self, FieldType::AutoField | FieldType::BigAutoField)
	}

	pub fn is_foreign_key(&self) -> bool {
		matches!(self, FieldType::ForeignKey(_))
	}
}

/// ForeignKey action for ON DELETE and ON UPDATE clauses
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum ForeignKeyAction {
	/// Restricts deletion/update
	Restrict,
	/// Cascades deletion/update to dependent rows
	Cascade,
	/// Sets foreign key to NULL
	SetNull,
	/// No action (similar to Restrict but deferred)
	NoAction,
	/// Sets foreign key to default value
	SetDefault,
}

impl ForeignKeyAction {
	/// Convert to SQL keyword for use in constraint definitions
	pub fn to_sql_keyword(&self) -> &'static str {
		match self {
			ForeignKeyAction::Restrict => "RESTRICT",
			ForeignKeyAction::Cascade => "CASCADE",
			ForeignKeyAction::SetNull => "SET NULL",
			ForeignKeyAction::NoAction => "NO ACTION",
			ForeignKeyAction::SetDefault => "SET DEFAULT",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_reference_storage_degrades_serial_types() {
		assert_eq!(FieldType::AutoField.reference_storage(), FieldType::Integer);
		assert_eq!(
			FieldType::BigAutoField.reference_storage(),
			FieldType::BigInteger
		);
		assert_eq!(FieldType::Uuid.reference_storage(), FieldType::Uuid);
	}

	#[test]
	fn test_foreign_key_to_foreign_key_uses_inner_storage() {
		let inner = FieldType::foreign_key_to(&FieldType::BigAutoField);
		assert_eq!(
			FieldType::foreign_key_to(&inner),
			FieldType::ForeignKey(Box::new(FieldType::BigInteger))
		);
	}

	#[test]
	fn test_char_parameters_are_part_of_identity() {
		assert_ne!(FieldType::char(), FieldType::varchar(5));
		assert_ne!(FieldType::char(), FieldType::Char { max_length: None });
		assert_eq!(FieldType::char(), FieldType::varchar(255));
	}

	#[test]
	fn test_foreign_key_action_keywords() {
		assert_eq!(ForeignKeyAction::SetNull.to_sql_keyword(), "SET NULL");
		assert_eq!(ForeignKeyAction::Restrict.to_sql_keyword(), "RESTRICT");
	}
}
