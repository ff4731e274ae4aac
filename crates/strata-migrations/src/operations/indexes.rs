//! Index operations

use super::SchemaOperation;
use crate::action::Action;
use crate::schema::IndexDefinition;
use crate::schema_editor::EmitContext;
use crate::state::SchemaState;
use crate::{MigrationError, Result};
use async_trait::async_trait;

/// Add an index over one or more columns
#[derive(Debug, Clone, PartialEq)]
pub struct AddIndex {
	pub table: String,
	pub index: IndexDefinition,
}

impl AddIndex {
	pub fn new(table: impl Into<String>, index: IndexDefinition) -> Self {
		Self {
			table: table.into(),
			index,
		}
	}
}

#[async_trait]
impl SchemaOperation for AddIndex {
	fn state_forwards(&self, state: &mut SchemaState) -> Result<()> {
		let table = state.require_table_mut(&self.table)?;
		for column in &self.index.columns {
			table.require_column(column)?;
		}
		// An index with the same effective name is replaced.
		let name = table.index_name(&self.index);
		let existing = table.indexes.iter().position(|i| table.index_name(i) == name);
		match existing {
			Some(position) => table.indexes[position] = self.index.clone(),
			None => table.indexes.push(self.index.clone()),
		}
		Ok(())
	}

	async fn database_forwards(
		&self,
		ctx: &EmitContext<'_>,
		_from: &SchemaState,
		to: &SchemaState,
	) -> Result<Vec<Action>> {
		let table = to.require_table(&self.table)?;
		ctx.editor.create_index(table, &self.index)
	}

	fn describe(&self) -> String {
		format!(
			"Add {}index on {}({})",
			if self.index.unique { "unique " } else { "" },
			self.table,
			self.index.columns.join(", ")
		)
	}
}

/// Drop an index by its effective name
#[derive(Debug, Clone, PartialEq)]
pub struct DropIndex {
	pub table: String,
	pub name: String,
	pub safe: bool,
	pub concurrently: bool,
}

impl DropIndex {
	pub fn new(table: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			table: table.into(),
			name: name.into(),
			safe: false,
			concurrently: false,
		}
	}

	pub fn safe(mut self, safe: bool) -> Self {
		self.safe = safe;
		self
	}

	pub fn concurrently(mut self, concurrently: bool) -> Self {
		self.concurrently = concurrently;
		self
	}
}

#[async_trait]
impl SchemaOperation for DropIndex {
	fn state_forwards(&self, state: &mut SchemaState) -> Result<()> {
		let table = state.require_table_mut(&self.table)?;
		let position = table
			.indexes
			.iter()
			.position(|i| table.index_name(i) == self.name);
		match position {
			Some(position) => {
				table.indexes.remove(position);
				Ok(())
			}
			None if self.safe => Ok(()),
			None => Err(MigrationError::UnknownIndex {
				table: self.table.clone(),
				index: self.name.clone(),
			}),
		}
	}

	async fn database_forwards(
		&self,
		ctx: &EmitContext<'_>,
		from: &SchemaState,
		_to: &SchemaState,
	) -> Result<Vec<Action>> {
		let table = from.require_table(&self.table)?;
		ctx.editor
			.drop_index(table, &self.name, self.safe, self.concurrently)
	}

	fn describe(&self) -> String {
		format!("Drop index {} on {}", self.name, self.table)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backends::{MySqlSchemaEditor, PostgresSchemaEditor};
	use crate::fields::FieldType;
	use crate::schema::{ColumnDefinition, TableSchema};

	fn user() -> TableSchema {
		TableSchema::new("user")
			.column(ColumnDefinition::new("id", FieldType::AutoField).primary_key())
			.column(ColumnDefinition::new("first_name", FieldType::char()))
			.column(ColumnDefinition::new("last_name", FieldType::char()))
	}

	async fn emit(
		op: &dyn SchemaOperation,
		ctx: &EmitContext<'_>,
		state: &mut SchemaState,
	) -> Result<Vec<Action>> {
		state.create_snapshot();
		op.state_forwards(state)?;
		let before = state.pop_snapshot();
		op.database_forwards(ctx, &before, state).await
	}

	#[tokio::test]
	async fn test_add_then_drop_index() {
		let editor = PostgresSchemaEditor::new();
		let ctx = EmitContext::new(&editor);
		let mut state = SchemaState::from_tables([user()]);

		let add = AddIndex::new(
			"user",
			IndexDefinition::new(["first_name", "last_name"]).unique(true),
		);
		let actions = emit(&add, &ctx, &mut state).await.unwrap();
		assert_eq!(
			actions[0].as_sql().unwrap().sql,
			"CREATE UNIQUE INDEX \"user_first_name_last_name\" ON \"user\" (\"first_name\", \"last_name\")"
		);

		let drop = DropIndex::new("user", "user_first_name_last_name");
		let actions = emit(&drop, &ctx, &mut state).await.unwrap();
		assert_eq!(
			actions[0].as_sql().unwrap().sql,
			"DROP INDEX \"user_first_name_last_name\""
		);
		assert!(state.require_table("user").unwrap().indexes.is_empty());
	}

	#[test]
	fn test_add_index_on_unknown_column() {
		let mut state = SchemaState::from_tables([user()]);
		let add = AddIndex::new("user", IndexDefinition::new(["email"]));
		assert!(matches!(
			add.state_forwards(&mut state),
			Err(MigrationError::UnknownColumn { .. })
		));
	}

	#[test]
	fn test_drop_unknown_index() {
		let mut state = SchemaState::from_tables([user()]);
		assert!(matches!(
			DropIndex::new("user", "user_email").state_forwards(&mut state),
			Err(MigrationError::UnknownIndex { .. })
		));
		assert!(
			DropIndex::new("user", "user_email")
				.safe(true)
				.state_forwards(&mut state)
				.is_ok()
		);
	}

	#[tokio::test]
	async fn test_mysql_drop_index_names_table() {
		let editor = MySqlSchemaEditor::new();
		let ctx = EmitContext::new(&editor);
		let mut state = SchemaState::from_tables([user().index(IndexDefinition::new(["last_name"]))]);
		let actions = emit(&DropIndex::new("user", "user_last_name"), &ctx, &mut state)
			.await
			.unwrap();
		assert_eq!(
			actions[0].as_sql().unwrap().sql,
			"DROP INDEX `user_last_name` ON `user`"
		);
	}
}
