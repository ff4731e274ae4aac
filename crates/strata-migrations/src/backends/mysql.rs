//! MySQL-specific schema editor
//!
//! MySQL changes column attributes by restating the whole column with
//! `MODIFY COLUMN`, and foreign keys are added as named constraints rather
//! than inline `REFERENCES` clauses. Every foreign key gets an explicit
//! `fk_..` name, so a constraint can be dropped without a catalog lookup.

use crate::action::Action;
use crate::fields::FieldType;
use crate::naming::fk_constraint_name;
use crate::schema::{ColumnDefinition, ForeignKeyReference, IndexDefinition, TableSchema};
use crate::schema_editor::{create_index_statement, DatabaseType, EmitContext, SchemaEditor, TableChange};
use crate::state::SchemaState;
use crate::value::SqlValue;
use crate::Result;
use async_trait::async_trait;

const MAX_IDENTIFIER_LENGTH: usize = 64;

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlSchemaEditor;

impl MySqlSchemaEditor {
	pub fn new() -> Self {
		Self
	}

	/// `ALTER TABLE t MODIFY COLUMN <definition>` with the given nullability.
	fn modify_column(&self, table: &str, column: &ColumnDefinition, null: bool) -> Action {
		Action::sql(format!(
			"ALTER TABLE {} MODIFY COLUMN {}",
			self.quote_name(table),
			self.column_definition_sql(column, null, false)
		))
	}
}

#[async_trait]
impl SchemaEditor for MySqlSchemaEditor {
	fn database_type(&self) -> DatabaseType {
		DatabaseType::Mysql
	}

	fn max_identifier_length(&self) -> usize {
		MAX_IDENTIFIER_LENGTH
	}

	fn quote_name(&self, name: &str) -> String {
		format!("`{}`", name.replace('`', "``"))
	}

	fn placeholder(&self, _index: usize) -> String {
		"?".to_string()
	}

	fn literal(&self, value: &SqlValue) -> String {
		match value {
			SqlValue::Null => "NULL".to_string(),
			SqlValue::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
			SqlValue::Int(i) => i.to_string(),
			SqlValue::Float(f) => f.to_string(),
			SqlValue::String(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''")),
			SqlValue::Bytes(b) => format!("X'{}'", SqlValue::hex(b)),
			SqlValue::Timestamp(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S")),
		}
	}

	fn column_type_sql(&self, field_type: &FieldType) -> String {
		match field_type {
			FieldType::AutoField => "INTEGER AUTO_INCREMENT".to_string(),
			FieldType::BigAutoField => "BIGINT AUTO_INCREMENT".to_string(),
			FieldType::SmallInteger => "SMALLINT".to_string(),
			FieldType::Integer => "INTEGER".to_string(),
			FieldType::BigInteger => "BIGINT".to_string(),
			FieldType::Boolean => "BOOL".to_string(),
			// MySQL requires a length for VARCHAR.
			FieldType::Char { max_length } => format!("VARCHAR({})", max_length.unwrap_or(255)),
			FieldType::Text => "TEXT".to_string(),
			FieldType::Date => "DATE".to_string(),
			FieldType::DateTime => "DATETIME".to_string(),
			FieldType::Time => "TIME".to_string(),
			FieldType::Decimal {
				max_digits,
				decimal_places,
			} => format!("NUMERIC({}, {})", max_digits, decimal_places),
			FieldType::Float => "FLOAT".to_string(),
			FieldType::Double => "DOUBLE PRECISION".to_string(),
			FieldType::Binary => "BLOB".to_string(),
			FieldType::Json => "JSON".to_string(),
			FieldType::Uuid => "VARCHAR(40)".to_string(),
			FieldType::ForeignKey(inner) => self.column_type_sql(inner),
		}
	}

	fn inline_references(&self) -> bool {
		false
	}

	fn rename_table(&self, old: &str, new: &str) -> Result<Vec<Action>> {
		Ok(vec![Action::sql(format!(
			"RENAME TABLE {} TO {}",
			self.quote_name(old),
			self.quote_name(new)
		))])
	}

	fn drop_columns(
		&self,
		change: &TableChange<'_>,
		columns: &[ColumnDefinition],
		_cascade: bool,
	) -> Result<Vec<Action>> {
		Ok(columns
			.iter()
			.map(|column| {
				Action::sql(format!(
					"ALTER TABLE {} DROP COLUMN {}",
					self.quote_name(change.table_name()),
					self.quote_name(&column.column_name)
				))
			})
			.collect())
	}

	/// Restate the column nullable with its new type, then restore NOT NULL.
	fn alter_column_type(&self, change: &TableChange<'_>, column: &ColumnDefinition) -> Result<Vec<Action>> {
		let table = change.table_name();
		let mut actions = vec![self.modify_column(table, column, true)];
		if !column.null {
			actions.push(self.modify_column(table, column, false));
		}
		Ok(actions)
	}

	fn set_not_null(&self, change: &TableChange<'_>, column: &ColumnDefinition) -> Result<Vec<Action>> {
		Ok(vec![self.modify_column(change.table_name(), column, false)])
	}

	fn drop_not_null(&self, change: &TableChange<'_>, column: &ColumnDefinition) -> Result<Vec<Action>> {
		Ok(vec![self.modify_column(change.table_name(), column, true)])
	}

	fn table_foreign_key_name(
		&self,
		state: &SchemaState,
		table: &TableSchema,
		column: &ColumnDefinition,
	) -> Option<String> {
		self.foreign_key_name(state, table, column)
	}

	fn default_foreign_key_name(
		&self,
		state: &SchemaState,
		table: &str,
		column_name: &str,
		reference: &ForeignKeyReference,
	) -> String {
		let (target, _) = state.resolve_reference(reference);
		fk_constraint_name(table, column_name, &target, MAX_IDENTIFIER_LENGTH)
	}

	async fn drop_foreign_key(
		&self,
		ctx: &EmitContext<'_>,
		change: &TableChange<'_>,
		old: &ColumnDefinition,
	) -> Result<Vec<Action>> {
		let name = self.resolve_foreign_key_name(ctx, change, old).await?;
		Ok(vec![Action::sql(format!(
			"ALTER TABLE {} DROP FOREIGN KEY {}",
			self.quote_name(change.table_name()),
			self.quote_name(&name)
		))])
	}

	fn create_index(&self, table: &TableSchema, index: &IndexDefinition) -> Result<Vec<Action>> {
		if index.predicate.is_some() {
			return Err(self.unsupported("partial indexes"));
		}
		if index.safe {
			return Err(self.unsupported("IF NOT EXISTS on indexes"));
		}
		Ok(vec![create_index_statement(self, table, index).into()])
	}

	fn drop_index(
		&self,
		table: &TableSchema,
		name: &str,
		safe: bool,
		_concurrently: bool,
	) -> Result<Vec<Action>> {
		if safe {
			return Err(self.unsupported("IF EXISTS on indexes"));
		}
		Ok(vec![Action::sql(format!(
			"DROP INDEX {} ON {}",
			self.quote_name(name),
			self.quote_name(&table.table_name)
		))])
	}

	fn rename_index(
		&self,
		table: &TableSchema,
		_index: &IndexDefinition,
		old: &str,
		new: &str,
	) -> Result<Vec<Action>> {
		Ok(vec![Action::sql(format!(
			"ALTER TABLE {} RENAME INDEX {} TO {}",
			self.quote_name(&table.table_name),
			self.quote_name(old),
			self.quote_name(new)
		))])
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::MigrationError;
	use crate::state::SchemaState;
	use rstest::rstest;

	#[rstest]
	#[case(FieldType::AutoField, "INTEGER AUTO_INCREMENT")]
	#[case(FieldType::DateTime, "DATETIME")]
	#[case(FieldType::Boolean, "BOOL")]
	#[case(FieldType::Uuid, "VARCHAR(40)")]
	#[case(FieldType::Char { max_length: None }, "VARCHAR(255)")]
	fn test_column_type_sql(#[case] field_type: FieldType, #[case] expected: &str) {
		assert_eq!(MySqlSchemaEditor::new().column_type_sql(&field_type), expected);
	}

	#[test]
	fn test_partial_index_is_unsupported() {
		let table = TableSchema::new("user").column(ColumnDefinition::new("email", FieldType::Text));
		let index = IndexDefinition::new(["email"]).predicate("email IS NOT NULL");
		let err = MySqlSchemaEditor::new().create_index(&table, &index).unwrap_err();
		assert!(matches!(
			err,
			MigrationError::UnsupportedOperation { ref backend, .. } if backend == "MySQL"
		));
	}

	#[test]
	fn test_alter_type_restores_not_null() {
		let table = TableSchema::new("user").column(ColumnDefinition::new("age", FieldType::BigInteger));
		let state = SchemaState::from_tables([table.clone()]);
		let change = TableChange::new(&state, &table, &table);
		let column = table.get_column("age").unwrap();
		let actions = MySqlSchemaEditor::new().alter_column_type(&change, column).unwrap();
		let sql: Vec<_> = actions.iter().map(|a| a.as_sql().unwrap().sql.clone()).collect();
		assert_eq!(
			sql,
			vec![
				"ALTER TABLE `user` MODIFY COLUMN `age` BIGINT",
				"ALTER TABLE `user` MODIFY COLUMN `age` BIGINT NOT NULL",
			]
		);
	}

	#[tokio::test]
	async fn test_drop_foreign_key_without_catalog_uses_generated_name() {
		let user = TableSchema::new("user").column(ColumnDefinition::new("id", FieldType::AutoField).primary_key());
		let table = TableSchema::new("post").column(ColumnDefinition::foreign_key("author", "user"));
		let state = SchemaState::from_tables([user, table.clone()]);
		let change = TableChange::new(&state, &table, &table);
		let column = table.get_column("author").unwrap();
		let editor = MySqlSchemaEditor::new();
		let actions = editor
			.drop_foreign_key(&EmitContext::new(&editor), &change, column)
			.await
			.unwrap();
		assert_eq!(
			actions[0].as_sql().unwrap().sql,
			"ALTER TABLE `post` DROP FOREIGN KEY `fk_post_author_id_refs_user`"
		);
	}

	#[test]
	fn test_create_table_names_foreign_keys() {
		let user = TableSchema::new("user").column(ColumnDefinition::new("id", FieldType::AutoField).primary_key());
		let table = TableSchema::new("post").column(ColumnDefinition::foreign_key("author", "user"));
		let state = SchemaState::from_tables([user]);
		let sql = MySqlSchemaEditor::new().create_table_sql(&state, &table);
		assert!(sql.contains(
			"CONSTRAINT `fk_post_author_id_refs_user` FOREIGN KEY (`author_id`) REFERENCES `user` (`id`)"
		));
	}
}
