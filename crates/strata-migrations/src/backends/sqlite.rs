//! SQLite-specific schema editor
//!
//! SQLite's `ALTER TABLE` only renames tables and columns and adds columns.
//! Everything else goes through the table rebuild of
//! [`SchemaEditor::rebuild_table`]:
//!
//! 1. `CREATE TABLE "t__new"` with the target definition
//! 2. `INSERT INTO "t__new" (..) SELECT .. FROM "t"`
//! 3. `DROP TABLE "t"`
//! 4. `ALTER TABLE "t__new" RENAME TO "t"`
//! 5. recreate the target's indexes
//!
//! Triggers and views attached to the rebuilt table are not recreated.

use crate::action::Action;
use crate::fields::FieldType;
use crate::schema::{ColumnDefinition, IndexDefinition, TableSchema};
use crate::schema_editor::{
	add_nullable_column, change_columns_in_place, require_default, DatabaseType, EmitContext,
	SchemaEditor, TableChange,
};
use crate::value::SqlValue;
use crate::Result;
use async_trait::async_trait;

const MAX_IDENTIFIER_LENGTH: usize = 64;

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteSchemaEditor;

impl SqliteSchemaEditor {
	pub fn new() -> Self {
		Self
	}

	fn rebuild(&self, change: &TableChange<'_>) -> Result<Vec<Action>> {
		self.rebuild_table(change.state, change.from, change.to)
	}
}

/// Whether a column change needs more than `RENAME COLUMN` and index DDL.
fn needs_rebuild(old: &ColumnDefinition, new: &ColumnDefinition) -> bool {
	old.field_type != new.field_type
		|| old.references != new.references
		|| old.server_default != new.server_default
		|| old.null != new.null
}

#[async_trait]
impl SchemaEditor for SqliteSchemaEditor {
	fn database_type(&self) -> DatabaseType {
		DatabaseType::Sqlite
	}

	fn max_identifier_length(&self) -> usize {
		MAX_IDENTIFIER_LENGTH
	}

	fn quote_name(&self, name: &str) -> String {
		format!("\"{}\"", name.replace('"', "\"\""))
	}

	fn placeholder(&self, _index: usize) -> String {
		"?".to_string()
	}

	fn literal(&self, value: &SqlValue) -> String {
		match value {
			SqlValue::Null => "NULL".to_string(),
			SqlValue::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
			SqlValue::Int(i) => i.to_string(),
			SqlValue::Float(f) => f.to_string(),
			SqlValue::String(s) => format!("'{}'", s.replace('\'', "''")),
			SqlValue::Bytes(b) => format!("X'{}'", SqlValue::hex(b)),
			SqlValue::Timestamp(dt) => format!("'{}'", dt.to_rfc3339()),
		}
	}

	fn column_type_sql(&self, field_type: &FieldType) -> String {
		match field_type {
			// Only `INTEGER PRIMARY KEY` aliases the rowid.
			FieldType::AutoField | FieldType::BigAutoField => "INTEGER".to_string(),
			FieldType::SmallInteger | FieldType::Integer | FieldType::BigInteger => {
				"INTEGER".to_string()
			}
			FieldType::Boolean => "INTEGER".to_string(),
			FieldType::Char {
				max_length: Some(n),
			} => format!("VARCHAR({})", n),
			FieldType::Char { max_length: None } => "VARCHAR".to_string(),
			FieldType::Text | FieldType::Json | FieldType::Uuid => "TEXT".to_string(),
			FieldType::Date => "DATE".to_string(),
			FieldType::DateTime => "DATETIME".to_string(),
			FieldType::Time => "TIME".to_string(),
			FieldType::Decimal {
				max_digits,
				decimal_places,
			} => format!("DECIMAL({},{})", max_digits, decimal_places),
			FieldType::Float | FieldType::Double => "REAL".to_string(),
			FieldType::Binary => "BLOB".to_string(),
			FieldType::ForeignKey(inner) => self.column_type_sql(inner),
		}
	}

	fn drop_table(&self, table: &TableSchema, _cascade: bool) -> Result<Vec<Action>> {
		Ok(vec![Action::sql(format!(
			"DROP TABLE {}",
			self.quote_name(&table.table_name)
		))])
	}

	/// A NOT NULL column is added nullable, backfilled, then fixed by a rebuild
	/// which also recreates the column's index.
	fn add_column(&self, change: &TableChange<'_>, column: &ColumnDefinition) -> Result<Vec<Action>> {
		require_default(change, column)?;

		let mut actions = vec![add_nullable_column(self, change, column)];
		if !column.null {
			if column.server_default.is_none() {
				actions.push(self.backfill(change.table_name(), column));
			}
			actions.extend(self.rebuild_table(change.state, change.to, change.to)?);
			return Ok(actions);
		}
		if let Some(index) = change.to.single_column_index(column) {
			actions.extend(self.create_index(change.to, &index)?);
		}
		Ok(actions)
	}

	fn drop_columns(
		&self,
		change: &TableChange<'_>,
		_columns: &[ColumnDefinition],
		_cascade: bool,
	) -> Result<Vec<Action>> {
		self.rebuild(change)
	}

	fn alter_column_type(&self, change: &TableChange<'_>, _column: &ColumnDefinition) -> Result<Vec<Action>> {
		self.rebuild(change)
	}

	fn set_not_null(&self, change: &TableChange<'_>, _column: &ColumnDefinition) -> Result<Vec<Action>> {
		self.rebuild(change)
	}

	fn drop_not_null(&self, change: &TableChange<'_>, _column: &ColumnDefinition) -> Result<Vec<Action>> {
		self.rebuild(change)
	}

	fn set_default(
		&self,
		change: &TableChange<'_>,
		_column: &ColumnDefinition,
		_expression: &str,
	) -> Result<Vec<Action>> {
		self.rebuild(change)
	}

	fn drop_default(&self, change: &TableChange<'_>, _column: &ColumnDefinition) -> Result<Vec<Action>> {
		self.rebuild(change)
	}

	fn add_foreign_key(&self, change: &TableChange<'_>, _column: &ColumnDefinition) -> Result<Vec<Action>> {
		self.rebuild(change)
	}

	async fn drop_foreign_key(
		&self,
		_ctx: &EmitContext<'_>,
		change: &TableChange<'_>,
		_old: &ColumnDefinition,
	) -> Result<Vec<Action>> {
		self.rebuild(change)
	}

	fn rename_index(
		&self,
		table: &TableSchema,
		index: &IndexDefinition,
		old: &str,
		new: &str,
	) -> Result<Vec<Action>> {
		let mut actions = self.drop_index(table, old, false, false)?;
		actions.extend(self.create_index(table, &index.clone().name(new))?);
		Ok(actions)
	}

	/// One rebuild covers every structural change of the table; otherwise
	/// only renames and index DDL are emitted.
	async fn change_columns(
		&self,
		ctx: &EmitContext<'_>,
		change: &TableChange<'_>,
		pairs: &[(ColumnDefinition, ColumnDefinition)],
	) -> Result<Vec<Action>> {
		if pairs.iter().any(|(old, new)| needs_rebuild(old, new)) {
			return self.rebuild(change);
		}
		change_columns_in_place(self, ctx, change, pairs).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::state::SchemaState;

	fn sql(actions: &[Action]) -> Vec<String> {
		actions
			.iter()
			.map(|a| a.as_sql().unwrap().sql.clone())
			.collect()
	}

	#[test]
	fn test_rebuild_copies_by_logical_name() {
		let from = TableSchema::new("user")
			.column(ColumnDefinition::new("id", FieldType::AutoField).primary_key())
			.column(ColumnDefinition::new("name", FieldType::char()).index())
			.column(ColumnDefinition::new("age", FieldType::Integer).null());
		let to = TableSchema::new("user")
			.column(ColumnDefinition::new("id", FieldType::AutoField).primary_key())
			.column(
				ColumnDefinition::new("name", FieldType::Text)
					.column_name("full_name")
					.index(),
			);
		let state = SchemaState::from_tables([to.clone()]);
		let actions = SqliteSchemaEditor::new()
			.rebuild_table(&state, &from, &to)
			.unwrap();
		assert_eq!(
			sql(&actions),
			vec![
				"CREATE TABLE \"user__new\" (\"id\" INTEGER NOT NULL PRIMARY KEY, \"full_name\" TEXT NOT NULL)",
				"INSERT INTO \"user__new\" (\"id\", \"full_name\") SELECT \"id\", \"name\" FROM \"user\"",
				"DROP TABLE \"user\"",
				"ALTER TABLE \"user__new\" RENAME TO \"user\"",
				"CREATE INDEX \"user_full_name\" ON \"user\" (\"full_name\")",
			]
		);
	}

	#[test]
	fn test_rename_index_drops_and_recreates() {
		let table = TableSchema::new("user").column(ColumnDefinition::new("title", FieldType::Text).unique());
		let index = table.single_column_index(table.get_column("title").unwrap()).unwrap();
		let actions = SqliteSchemaEditor::new()
			.rename_index(&table, &index, "user_name", "user_title")
			.unwrap();
		assert_eq!(
			sql(&actions),
			vec![
				"DROP INDEX \"user_name\"",
				"CREATE UNIQUE INDEX \"user_title\" ON \"user\" (\"title\")",
			]
		);
	}

	#[test]
	fn test_needs_rebuild_ignores_renames_and_indexes() {
		let old = ColumnDefinition::new("name", FieldType::Text);
		let renamed = old.clone().column_name("title").unique();
		assert!(!needs_rebuild(&old, &renamed));
		assert!(needs_rebuild(&old, &old.clone().null()));
	}
}
