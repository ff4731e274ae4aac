//! Column operations

use super::SchemaOperation;
use crate::action::Action;
use crate::naming::resolve_renamed_column;
use crate::schema::{ColumnDefinition, TableSchema};
use crate::schema_editor::{EmitContext, TableChange};
use crate::state::SchemaState;
use crate::{MigrationError, Result};
use async_trait::async_trait;

fn column_names(columns: &[ColumnDefinition]) -> String {
	columns
		.iter()
		.map(|c| c.name.as_str())
		.collect::<Vec<_>>()
		.join(", ")
}

/// Add columns to an existing table
///
/// Existing rows of a NOT NULL column are filled with the client-side
/// default, or by the server-side default when one is declared.
///
/// # Example
///
/// ```rust
/// use strata_migrations::operations::{AddColumns, SchemaOperation};
/// use strata_migrations::{ColumnDefinition, FieldType, SchemaState, TableSchema};
///
/// let mut state = SchemaState::from_tables([TableSchema::new("user")]);
/// AddColumns::new("user", vec![ColumnDefinition::new("age", FieldType::Integer).default_value(5i64)])
///     .state_forwards(&mut state)
///     .unwrap();
/// assert!(state.require_table("user").unwrap().get_column("age").is_some());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AddColumns {
	pub table: String,
	pub columns: Vec<ColumnDefinition>,
}

impl AddColumns {
	pub fn new(table: impl Into<String>, columns: Vec<ColumnDefinition>) -> Self {
		Self {
			table: table.into(),
			columns,
		}
	}
}

#[async_trait]
impl SchemaOperation for AddColumns {
	fn state_forwards(&self, state: &mut SchemaState) -> Result<()> {
		let mut table = state.require_table(&self.table)?.clone();
		for column in &self.columns {
			column.validate()?;
			table.add_column(column.clone());
		}
		*state.require_table_mut(&self.table)? = table;
		Ok(())
	}

	async fn database_forwards(
		&self,
		ctx: &EmitContext<'_>,
		from: &SchemaState,
		to: &SchemaState,
	) -> Result<Vec<Action>> {
		let from_table = from.require_table(&self.table)?;
		let to_table = to.require_table(&self.table)?;

		let added = self
			.columns
			.iter()
			.map(|c| to_table.require_column(&c.name).cloned())
			.collect::<Result<Vec<_>>>()?;
		if let Some(column) = added
			.iter()
			.find(|c| !c.null && c.default.is_none() && c.server_default.is_none())
		{
			return Err(MigrationError::MissingDefault {
				table: self.table.clone(),
				column: column.name.clone(),
			});
		}

		// Each column is emitted against the table as it stands once the
		// previous columns exist.
		let mut current = from_table.clone();
		let mut actions = Vec::new();
		for column in &added {
			current.add_column(column.clone());
			let change = TableChange::new(to, from_table, &current);
			actions.extend(ctx.editor.add_column(&change, column)?);
		}
		Ok(actions)
	}

	fn describe(&self) -> String {
		format!("Add columns {} to {}", column_names(&self.columns), self.table)
	}
}

/// Replace column definitions, keyed by logical name
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeColumns {
	pub table: String,
	pub columns: Vec<ColumnDefinition>,
}

impl ChangeColumns {
	pub fn new(table: impl Into<String>, columns: Vec<ColumnDefinition>) -> Self {
		Self {
			table: table.into(),
			columns,
		}
	}
}

#[async_trait]
impl SchemaOperation for ChangeColumns {
	fn state_forwards(&self, state: &mut SchemaState) -> Result<()> {
		let mut table = state.require_table(&self.table)?.clone();
		for column in &self.columns {
			column.validate()?;
			let existing = table.require_column(&column.name)?;
			let mut column = column.clone();
			if existing.column_name != column.column_name {
				let name = column.name.clone();
				table.pin_index_names(|i| i.columns.contains(&name));
			} else if column.index_name.is_none() {
				column.index_name = existing.index_name.clone();
			}
			table.add_column(column);
		}
		*state.require_table_mut(&self.table)? = table;
		Ok(())
	}

	async fn database_forwards(
		&self,
		ctx: &EmitContext<'_>,
		from: &SchemaState,
		to: &SchemaState,
	) -> Result<Vec<Action>> {
		let from_table = from.require_table(&self.table)?;
		let to_table = to.require_table(&self.table)?;
		let pairs = self
			.columns
			.iter()
			.map(|c| {
				Ok((
					from_table.require_column(&c.name)?.clone(),
					to_table.require_column(&c.name)?.clone(),
				))
			})
			.collect::<Result<Vec<_>>>()?;

		let change = TableChange::new(to, from_table, to_table);
		ctx.editor.change_columns(ctx, &change, &pairs).await
	}

	fn describe(&self) -> String {
		format!("Change columns {} of {}", column_names(&self.columns), self.table)
	}
}

/// Remove columns, together with the indexes and foreign keys built on them
#[derive(Debug, Clone, PartialEq)]
pub struct RemoveColumns {
	pub table: String,
	pub columns: Vec<String>,
	pub cascade: bool,
}

impl RemoveColumns {
	pub fn new<I, S>(table: impl Into<String>, columns: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			table: table.into(),
			columns: columns.into_iter().map(Into::into).collect(),
			cascade: false,
		}
	}

	pub fn cascade(mut self, cascade: bool) -> Self {
		self.cascade = cascade;
		self
	}
}

#[async_trait]
impl SchemaOperation for RemoveColumns {
	fn state_forwards(&self, state: &mut SchemaState) -> Result<()> {
		let table = state.require_table_mut(&self.table)?;
		for name in &self.columns {
			table.remove_column(name)?;
		}
		// The database drops indexes covering a dropped column.
		table
			.indexes
			.retain(|i| !i.columns.iter().any(|c| self.columns.contains(c)));
		if let Some(pk) = &table.primary_key
			&& pk.columns.iter().any(|c| self.columns.contains(c))
		{
			table.primary_key = None;
		}
		Ok(())
	}

	async fn database_forwards(
		&self,
		ctx: &EmitContext<'_>,
		from: &SchemaState,
		to: &SchemaState,
	) -> Result<Vec<Action>> {
		let from_table = from.require_table(&self.table)?;
		let to_table = to.require_table(&self.table)?;
		let removed = self
			.columns
			.iter()
			.map(|name| from_table.require_column(name).cloned())
			.collect::<Result<Vec<_>>>()?;

		let change = TableChange::new(to, from_table, to_table);
		ctx.editor.drop_columns(&change, &removed, self.cascade)
	}

	fn describe(&self) -> String {
		format!("Remove columns {} from {}", self.columns.join(", "), self.table)
	}
}

/// Rename a column's logical name.
///
/// The physical name follows when it was derived from the logical one (see
/// [`resolve_renamed_column`]); otherwise only the logical name changes.
#[derive(Debug, Clone, PartialEq)]
pub struct RenameColumn {
	pub table: String,
	pub old: String,
	pub new: String,
}

impl RenameColumn {
	pub fn new(table: impl Into<String>, old: impl Into<String>, new: impl Into<String>) -> Self {
		Self {
			table: table.into(),
			old: old.into(),
			new: new.into(),
		}
	}
}

/// Rename a key of an ordered map in place.
impl RenameColumn {
	/// Follow the logical rename in a schema whose physical names must stay
	/// as they are.
	pub(crate) fn rename_key_in(&self, origin: &mut SchemaState) -> Result<()> {
		let known = origin
			.get_table(&self.table)
			.is_some_and(|t| t.get_column(&self.old).is_some());
		if !known {
			return Ok(());
		}
		origin
			.require_table_mut(&self.table)?
			.rename_column_key(&self.old, &self.new)
	}

	fn rename_in(&self, table: &mut TableSchema) -> Result<()> {
		let column = table.require_column(&self.old)?;
		let physical = resolve_renamed_column(column, &self.old, &self.new);
		if physical.is_none() {
			tracing::warn!(
				table = %self.table,
				column = %self.old,
				column_name = %column.column_name,
				"physical column name is not derived from `{}`, only the logical name is renamed",
				self.old
			);
		}

		table.pin_index_names(|i| i.columns.contains(&self.old));
		table.rename_column_key(&self.old, &self.new)?;
		if let Some(physical) = physical {
			let column = table.require_column_mut(&self.new)?;
			// The index follows the column to its derived name.
			column.index_name = None;
			column.column_name = physical;
		}
		Ok(())
	}
}

#[async_trait]
impl SchemaOperation for RenameColumn {
	fn state_forwards(&self, state: &mut SchemaState) -> Result<()> {
		self.rename_in(state.require_table_mut(&self.table)?)
	}

	async fn database_forwards(
		&self,
		ctx: &EmitContext<'_>,
		from: &SchemaState,
		to: &SchemaState,
	) -> Result<Vec<Action>> {
		let from_table = from.require_table(&self.table)?;
		let to_table = to.require_table(&self.table)?;
		let old = from_table.require_column(&self.old)?;
		let new = to_table.require_column(&self.new)?;
		if old.column_name == new.column_name {
			return Ok(Vec::new());
		}

		let mut actions =
			ctx.editor
				.rename_column(&to_table.table_name, &old.column_name, &new.column_name)?;
		if let Some(old_index) = from_table.single_column_index(old)
			&& let Some(new_index) = to_table.single_column_index(new)
		{
			let old_name = from_table.index_name(&old_index);
			let new_name = to_table.index_name(&new_index);
			if old_name != new_name {
				actions.extend(ctx.editor.rename_index(to_table, &new_index, &old_name, &new_name)?);
			}
		}
		Ok(actions)
	}

	fn describe(&self) -> String {
		format!("Rename column {}.{} to {}", self.table, self.old, self.new)
	}
}

/// Toggle nullability of columns
#[derive(Debug, Clone, PartialEq)]
pub struct SetNullable {
	pub table: String,
	pub columns: Vec<String>,
	pub null: bool,
}

impl SetNullable {
	pub fn new<I, S>(table: impl Into<String>, columns: I, null: bool) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			table: table.into(),
			columns: columns.into_iter().map(Into::into).collect(),
			null,
		}
	}
}

#[async_trait]
impl SchemaOperation for SetNullable {
	fn state_forwards(&self, state: &mut SchemaState) -> Result<()> {
		let table = state.require_table_mut(&self.table)?;
		for name in &self.columns {
			table.require_column_mut(name)?.null = self.null;
		}
		Ok(())
	}

	async fn database_forwards(
		&self,
		ctx: &EmitContext<'_>,
		from: &SchemaState,
		to: &SchemaState,
	) -> Result<Vec<Action>> {
		let from_table = from.require_table(&self.table)?;
		let to_table = to.require_table(&self.table)?;
		let change = TableChange::new(to, from_table, to_table);

		let mut actions = Vec::new();
		for name in &self.columns {
			let column = to_table.require_column(name)?;
			if self.null {
				actions.extend(ctx.editor.drop_not_null(&change, column)?);
			} else {
				actions.extend(ctx.editor.set_not_null(&change, column)?);
			}
		}
		Ok(actions)
	}

	fn describe(&self) -> String {
		let verb = if self.null { "Drop" } else { "Add" };
		format!("{} not null on {}.{}", verb, self.table, self.columns.join(", "))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backends::PostgresSchemaEditor;
	use crate::fields::FieldType;
	use crate::schema::IndexDefinition;

	fn user() -> TableSchema {
		TableSchema::new("user")
			.column(ColumnDefinition::new("id", FieldType::AutoField).primary_key())
			.column(ColumnDefinition::new("name", FieldType::char()).unique())
			.column(ColumnDefinition::new("first_name", FieldType::char()))
			.column(ColumnDefinition::new("last_name", FieldType::char()))
			.index(IndexDefinition::new(["first_name", "last_name"]))
	}

	async fn emit(op: &dyn SchemaOperation, state: &mut SchemaState) -> Result<Vec<String>> {
		state.create_snapshot();
		op.state_forwards(state)?;
		let before = state.pop_snapshot();
		let editor = PostgresSchemaEditor::new();
		let actions = op
			.database_forwards(&EmitContext::new(&editor), &before, state)
			.await?;
		Ok(actions
			.iter()
			.map(|a| a.as_sql().unwrap().sql.clone())
			.collect())
	}

	#[tokio::test]
	async fn test_rename_column_renames_index() {
		let mut state = SchemaState::from_tables([user()]);
		let sql = emit(&RenameColumn::new("user", "name", "title"), &mut state)
			.await
			.unwrap();
		assert_eq!(
			sql,
			vec![
				"ALTER TABLE \"user\" RENAME COLUMN \"name\" TO \"title\"",
				"ALTER INDEX \"user_name\" RENAME TO \"user_title\"",
			]
		);
	}

	#[tokio::test]
	async fn test_rename_column_keeps_composite_index_name() {
		let mut state = SchemaState::from_tables([user()]);
		emit(&RenameColumn::new("user", "first_name", "given_name"), &mut state)
			.await
			.unwrap();
		let table = state.require_table("user").unwrap();
		assert_eq!(table.indexes[0].columns, vec!["given_name", "last_name"]);
		assert_eq!(
			table.index_name(&table.indexes[0]),
			"user_first_name_last_name"
		);
		let names: Vec<_> = table.columns.keys().cloned().collect();
		assert_eq!(names, vec!["id", "name", "given_name", "last_name"]);
	}

	#[tokio::test]
	async fn test_rename_column_with_custom_physical_name_emits_nothing() {
		let table = TableSchema::new("user").column(
			ColumnDefinition::new("name", FieldType::Text).column_name("legacy_nm"),
		);
		let mut state = SchemaState::from_tables([table]);
		let sql = emit(&RenameColumn::new("user", "name", "title"), &mut state)
			.await
			.unwrap();
		assert!(sql.is_empty());
		let column = state.require_table("user").unwrap().get_column("title").unwrap();
		assert_eq!(column.column_name, "legacy_nm");
	}

	#[tokio::test]
	async fn test_remove_columns_drops_covering_indexes_from_state() {
		let mut state = SchemaState::from_tables([user()]);
		let sql = emit(&RemoveColumns::new("user", ["last_name"]), &mut state)
			.await
			.unwrap();
		assert_eq!(sql, vec!["ALTER TABLE \"user\" DROP COLUMN \"last_name\""]);
		assert!(state.require_table("user").unwrap().indexes.is_empty());
	}

	#[tokio::test]
	async fn test_set_nullable() {
		let mut state = SchemaState::from_tables([user()]);
		let sql = emit(
			&SetNullable::new("user", ["first_name", "last_name"], true),
			&mut state,
		)
		.await
		.unwrap();
		assert_eq!(
			sql,
			vec![
				"ALTER TABLE \"user\" ALTER COLUMN \"first_name\" DROP NOT NULL",
				"ALTER TABLE \"user\" ALTER COLUMN \"last_name\" DROP NOT NULL",
			]
		);
	}

	#[tokio::test]
	async fn test_missing_default_emits_nothing() {
		let mut state = SchemaState::from_tables([user()]);
		let add = AddColumns::new(
			"user",
			vec![
				ColumnDefinition::new("nickname", FieldType::Text).null(),
				ColumnDefinition::new("age", FieldType::Integer),
			],
		);
		let err = emit(&add, &mut state).await.unwrap_err();
		assert!(err.to_string().contains("`age` is not null but has no default"));
	}

	#[test]
	fn test_change_unknown_column() {
		let mut state = SchemaState::from_tables([user()]);
		let change = ChangeColumns::new("user", vec![ColumnDefinition::new("age", FieldType::Integer)]);
		assert!(matches!(
			change.state_forwards(&mut state),
			Err(MigrationError::UnknownColumn { .. })
		));
	}

	#[test]
	fn test_failed_change_leaves_state_untouched() {
		let mut state = SchemaState::from_tables([user()]);
		let change = ChangeColumns::new(
			"user",
			vec![
				ColumnDefinition::new("first_name", FieldType::Text),
				ColumnDefinition::new("age", FieldType::Integer),
			],
		);
		assert!(change.state_forwards(&mut state).is_err());
		let column = state.require_table("user").unwrap().get_column("first_name").unwrap();
		assert_eq!(column.field_type, FieldType::char());
	}

	#[test]
	fn test_change_keeps_pinned_index_name() {
		let table = user().table_name("account");
		let table = TableSchema {
			columns: table
				.columns
				.into_iter()
				.map(|(key, column)| match key.as_str() {
					"name" => (key, column.index_name("user_name")),
					_ => (key, column),
				})
				.collect(),
			..table
		};
		let mut state = SchemaState::from_tables([table]);

		ChangeColumns::new("user", vec![ColumnDefinition::new("name", FieldType::Text).unique()])
			.state_forwards(&mut state)
			.unwrap();

		let table = state.require_table("user").unwrap();
		let index = table.single_column_index(table.get_column("name").unwrap()).unwrap();
		assert_eq!(index.name.as_deref(), Some("user_name"));
	}
}
