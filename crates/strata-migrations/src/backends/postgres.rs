//! PostgreSQL-specific schema editor
//!
//! PostgreSQL can express every primitive with a plain `ALTER` statement:
//! - `ALTER COLUMN .. TYPE` for type changes
//! - `CREATE INDEX CONCURRENTLY`, run outside the migration transaction
//! - `SET search_path` for schema selection
//!
//! # Example
//!
//! ```
//! use strata_migrations::{FieldType, PostgresSchemaEditor, SchemaEditor};
//!
//! let editor = PostgresSchemaEditor::new();
//! assert_eq!(editor.quote_name("user"), "\"user\"");
//! assert_eq!(editor.column_type_sql(&FieldType::Json), "JSONB");
//! ```

use crate::action::Action;
use crate::fields::FieldType;
use crate::schema_editor::{DatabaseType, SchemaEditor};
use crate::value::SqlValue;
use crate::Result;
use async_trait::async_trait;
use pg_escape::quote_literal;

/// PostgreSQL limits identifiers to 63 bytes (NAMEDATALEN - 1).
const MAX_IDENTIFIER_LENGTH: usize = 63;

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresSchemaEditor;

impl PostgresSchemaEditor {
	pub fn new() -> Self {
		Self
	}
}

#[async_trait]
impl SchemaEditor for PostgresSchemaEditor {
	fn database_type(&self) -> DatabaseType {
		DatabaseType::Postgres
	}

	fn max_identifier_length(&self) -> usize {
		MAX_IDENTIFIER_LENGTH
	}

	fn quote_name(&self, name: &str) -> String {
		format!("\"{}\"", name.replace('"', "\"\""))
	}

	fn placeholder(&self, index: usize) -> String {
		format!("${}", index)
	}

	fn literal(&self, value: &SqlValue) -> String {
		match value {
			SqlValue::Null => "NULL".to_string(),
			SqlValue::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
			SqlValue::Int(i) => i.to_string(),
			SqlValue::Float(f) => f.to_string(),
			SqlValue::String(s) => quote_literal(s).to_string(),
			SqlValue::Bytes(b) => format!("'\\x{}'::bytea", SqlValue::hex(b)),
			SqlValue::Timestamp(dt) => quote_literal(&dt.to_rfc3339()).to_string(),
		}
	}

	fn column_type_sql(&self, field_type: &FieldType) -> String {
		match field_type {
			FieldType::AutoField => "SERIAL".to_string(),
			FieldType::BigAutoField => "BIGSERIAL".to_string(),
			FieldType::SmallInteger => "SMALLINT".to_string(),
			FieldType::Integer => "INTEGER".to_string(),
			FieldType::BigInteger => "BIGINT".to_string(),
			FieldType::Boolean => "BOOLEAN".to_string(),
			FieldType::Char {
				max_length: Some(n),
			} => format!("VARCHAR({})", n),
			FieldType::Char { max_length: None } => "VARCHAR".to_string(),
			FieldType::Text => "TEXT".to_string(),
			FieldType::Date => "DATE".to_string(),
			FieldType::DateTime => "TIMESTAMP".to_string(),
			FieldType::Time => "TIME".to_string(),
			FieldType::Decimal {
				max_digits,
				decimal_places,
			} => format!("NUMERIC({}, {})", max_digits, decimal_places),
			FieldType::Float => "REAL".to_string(),
			FieldType::Double => "DOUBLE PRECISION".to_string(),
			FieldType::Binary => "BYTEA".to_string(),
			FieldType::Json => "JSONB".to_string(),
			FieldType::Uuid => "UUID".to_string(),
			FieldType::ForeignKey(inner) => self.column_type_sql(inner),
		}
	}

	fn supports_concurrent_index(&self) -> bool {
		true
	}

	fn select_schema(&self, schema: &str) -> Result<Vec<Action>> {
		Ok(vec![Action::sql(format!(
			"SET search_path TO {}",
			self.quote_name(schema)
		))])
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::schema::{ColumnDefinition, IndexDefinition, TableSchema};
	use rstest::rstest;

	#[rstest]
	#[case(FieldType::AutoField, "SERIAL")]
	#[case(FieldType::char(), "VARCHAR(255)")]
	#[case(FieldType::Char { max_length: None }, "VARCHAR")]
	#[case(FieldType::decimal(), "NUMERIC(10, 5)")]
	#[case(FieldType::DateTime, "TIMESTAMP")]
	#[case(FieldType::Double, "DOUBLE PRECISION")]
	#[case(FieldType::foreign_key_to(&FieldType::BigAutoField), "BIGINT")]
	fn test_column_type_sql(#[case] field_type: FieldType, #[case] expected: &str) {
		assert_eq!(PostgresSchemaEditor::new().column_type_sql(&field_type), expected);
	}

	#[rstest]
	#[case(SqlValue::from("O'Brien"), "'O''Brien'")]
	#[case(SqlValue::Bytes(vec![0xde, 0xad]), "'\\xdead'::bytea")]
	#[case(SqlValue::Bool(false), "FALSE")]
	fn test_literal(#[case] value: SqlValue, #[case] expected: &str) {
		assert_eq!(PostgresSchemaEditor::new().literal(&value), expected);
	}

	#[test]
	fn test_quote_name_escapes_quotes() {
		assert_eq!(PostgresSchemaEditor::new().quote_name("a\"b"), "\"a\"\"b\"");
	}

	#[test]
	fn test_primary_key_column_sql() {
		let column = ColumnDefinition::new("id", FieldType::AutoField).primary_key();
		assert_eq!(
			PostgresSchemaEditor::new().column_sql(&column),
			"\"id\" SERIAL NOT NULL PRIMARY KEY"
		);
	}

	#[test]
	fn test_concurrent_index_runs_outside_transaction() {
		let table = TableSchema::new("user")
			.column(ColumnDefinition::new("email", FieldType::Text));
		let index = IndexDefinition::new(["email"])
			.concurrently(true)
			.safe(true)
			.predicate("\"email\" IS NOT NULL");
		let actions = PostgresSchemaEditor::new().create_index(&table, &index).unwrap();
		let sql = actions[0].as_sql().unwrap();
		assert_eq!(
			sql.sql,
			"CREATE INDEX CONCURRENTLY IF NOT EXISTS \"user_email\" ON \"user\" (\"email\") WHERE \"email\" IS NOT NULL"
		);
		assert!(sql.outside_transaction);
	}

	#[test]
	fn test_select_schema() {
		let actions = PostgresSchemaEditor::new().select_schema("tenant_1").unwrap();
		assert_eq!(
			actions[0].as_sql().unwrap().sql,
			"SET search_path TO \"tenant_1\""
		);
	}
}
