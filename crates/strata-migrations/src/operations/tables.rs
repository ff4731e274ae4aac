//! Table operations

use super::SchemaOperation;
use crate::action::Action;
use crate::schema::TableSchema;
use crate::schema_editor::EmitContext;
use crate::state::SchemaState;
use crate::{MigrationError, Result};
use async_trait::async_trait;

/// Create a table together with its indexes
///
/// # Example
///
/// ```rust
/// use strata_migrations::operations::{CreateTable, SchemaOperation};
/// use strata_migrations::{ColumnDefinition, FieldType, SchemaState, TableSchema};
///
/// let mut state = SchemaState::new();
/// let create = CreateTable::new(
///     TableSchema::new("user")
///         .column(ColumnDefinition::new("id", FieldType::AutoField).primary_key()),
/// );
/// create.state_forwards(&mut state).unwrap();
/// assert!(state.contains("user"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
	pub table: TableSchema,
}

impl CreateTable {
	pub fn new(table: TableSchema) -> Self {
		Self { table }
	}
}

#[async_trait]
impl SchemaOperation for CreateTable {
	fn state_forwards(&self, state: &mut SchemaState) -> Result<()> {
		self.table.validate()?;
		if state.contains(&self.table.name) {
			return Err(MigrationError::InvalidSchema(format!(
				"table `{}` already exists",
				self.table.name
			)));
		}
		state.add_table(self.table.clone());
		Ok(())
	}

	async fn database_forwards(
		&self,
		ctx: &EmitContext<'_>,
		_from: &SchemaState,
		to: &SchemaState,
	) -> Result<Vec<Action>> {
		let table = to.require_table(&self.table.name)?;
		ctx.editor.create_table(to, table)
	}

	fn describe(&self) -> String {
		format!("Create table {}", self.table.name)
	}
}

/// Drop a table
#[derive(Debug, Clone, PartialEq)]
pub struct DropTable {
	pub table: String,
	pub cascade: bool,
}

impl DropTable {
	pub fn new(table: impl Into<String>) -> Self {
		Self {
			table: table.into(),
			cascade: false,
		}
	}

	pub fn cascade(mut self, cascade: bool) -> Self {
		self.cascade = cascade;
		self
	}
}

#[async_trait]
impl SchemaOperation for DropTable {
	fn state_forwards(&self, state: &mut SchemaState) -> Result<()> {
		state.remove_table(&self.table)?;
		Ok(())
	}

	async fn database_forwards(
		&self,
		ctx: &EmitContext<'_>,
		from: &SchemaState,
		_to: &SchemaState,
	) -> Result<Vec<Action>> {
		let table = from.require_table(&self.table)?;
		ctx.editor.drop_table(table, self.cascade)
	}

	fn describe(&self) -> String {
		format!("Drop table {}", self.table)
	}
}

/// Rename the physical table. The logical name is kept so that foreign keys
/// referencing it follow the rename.
#[derive(Debug, Clone, PartialEq)]
pub struct RenameTable {
	pub table: String,
	pub new_name: String,
}

impl RenameTable {
	pub fn new(table: impl Into<String>, new_name: impl Into<String>) -> Self {
		Self {
			table: table.into(),
			new_name: new_name.into(),
		}
	}
}

#[async_trait]
impl SchemaOperation for RenameTable {
	fn state_forwards(&self, state: &mut SchemaState) -> Result<()> {
		let table = state.require_table_mut(&self.table)?;
		// Existing indexes keep the names they were created with.
		table.pin_all_index_names();
		table.table_name = self.new_name.clone();
		Ok(())
	}

	async fn database_forwards(
		&self,
		ctx: &EmitContext<'_>,
		from: &SchemaState,
		to: &SchemaState,
	) -> Result<Vec<Action>> {
		let old = &from.require_table(&self.table)?.table_name;
		let new = &to.require_table(&self.table)?.table_name;
		ctx.editor.rename_table(old, new)
	}

	fn describe(&self) -> String {
		format!("Rename table {} to {}", self.table, self.new_name)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backends::PostgresSchemaEditor;
	use crate::fields::FieldType;
	use crate::schema::{ColumnDefinition, IndexDefinition};

	fn user() -> TableSchema {
		TableSchema::new("user")
			.column(ColumnDefinition::new("id", FieldType::AutoField).primary_key())
			.column(ColumnDefinition::new("first_name", FieldType::char()))
			.column(ColumnDefinition::new("last_name", FieldType::char()))
			.column(ColumnDefinition::new("email", FieldType::char()).unique())
			.index(IndexDefinition::new(["first_name", "last_name"]))
	}

	#[test]
	fn test_rename_table_pins_index_names() {
		let mut state = SchemaState::new();
		CreateTable::new(user()).state_forwards(&mut state).unwrap();
		RenameTable::new("user", "account")
			.state_forwards(&mut state)
			.unwrap();
		let table = state.require_table("user").unwrap();
		assert_eq!(
			table.index_name(&table.indexes[0]),
			"user_first_name_last_name"
		);
		let email = table.require_column("email").unwrap();
		assert_eq!(email.index_name.as_deref(), Some("user_email"));
		assert_eq!(
			table.single_column_index(email).unwrap().name.as_deref(),
			Some("user_email")
		);
		assert!(table.require_column("first_name").unwrap().index_name.is_none());
	}

	#[test]
	fn test_create_existing_table_fails() {
		let mut state = SchemaState::from_tables([user()]);
		assert!(CreateTable::new(user()).state_forwards(&mut state).is_err());
	}

	#[tokio::test]
	async fn test_rename_table_keeps_logical_name() {
		let mut state = SchemaState::from_tables([user()]);
		let rename = RenameTable::new("user", "account");
		state.create_snapshot();
		rename.state_forwards(&mut state).unwrap();
		let before = state.pop_snapshot();

		assert_eq!(state.require_table("user").unwrap().table_name, "account");
		let editor = PostgresSchemaEditor::new();
		let actions = rename
			.database_forwards(&EmitContext::new(&editor), &before, &state)
			.await
			.unwrap();
		assert_eq!(
			actions[0].as_sql().unwrap().sql,
			"ALTER TABLE \"user\" RENAME TO \"account\""
		);
	}

	#[test]
	fn test_drop_unknown_table() {
		let mut state = SchemaState::new();
		assert!(matches!(
			DropTable::new("user").state_forwards(&mut state),
			Err(MigrationError::UnknownTable { .. })
		));
	}
}
