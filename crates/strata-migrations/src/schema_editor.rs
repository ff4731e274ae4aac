//! Dialect emitter abstraction.
//!
//! [`SchemaEditor`] renders schema primitives into [`Action`]s. The shared
//! behaviour lives in default methods and in the `*_in_place` helpers of this
//! module; each backend only overrides the primitives its dialect spells
//! differently.

use crate::action::{Action, SqlAction};
use crate::fields::FieldType;
use crate::introspection::CatalogIntrospector;
use crate::naming::{fk_constraint_name, truncate_name};
use crate::schema::{ColumnDefault, ColumnDefinition, ForeignKeyReference, IndexDefinition, TableSchema};
use crate::state::SchemaState;
use crate::value::SqlValue;
use crate::{MigrationError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Database type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseType {
	Postgres,
	Sqlite,
	Mysql,
}

impl DatabaseType {
	/// Check if this database type supports transactional DDL
	///
	/// - PostgreSQL: Supports transactional DDL
	/// - SQLite: Supports transactional DDL
	/// - MySQL/MariaDB: Does NOT support transactional DDL (DDL causes implicit commit)
	///
	/// # Examples
	///
	/// ```
	/// use strata_migrations::DatabaseType;
	///
	/// assert!(DatabaseType::Postgres.supports_transactional_ddl());
	/// assert!(!DatabaseType::Mysql.supports_transactional_ddl());
	/// ```
	pub fn supports_transactional_ddl(&self) -> bool {
		matches!(self, DatabaseType::Postgres | DatabaseType::Sqlite)
	}

	/// Detect the database type from a connection URL scheme.
	pub fn from_url(url: &str) -> Option<Self> {
		let scheme = url.split(':').next()?;
		match scheme {
			"postgres" | "postgresql" => Some(DatabaseType::Postgres),
			"mysql" | "mariadb" => Some(DatabaseType::Mysql),
			"sqlite" => Some(DatabaseType::Sqlite),
			_ => None,
		}
	}
}

impl fmt::Display for DatabaseType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			DatabaseType::Postgres => "PostgreSQL",
			DatabaseType::Sqlite => "SQLite",
			DatabaseType::Mysql => "MySQL",
		})
	}
}

/// Per-run collaborators handed to every operation.
#[derive(Clone, Copy)]
pub struct EmitContext<'a> {
	pub editor: &'a dyn SchemaEditor,
	pub catalog: Option<&'a dyn CatalogIntrospector>,
	/// Schema as the database holds it before the running migration, keyed
	/// by the logical names in use at the current operation
	pub origin: Option<&'a SchemaState>,
}

impl<'a> EmitContext<'a> {
	pub fn new(editor: &'a dyn SchemaEditor) -> Self {
		Self {
			editor,
			catalog: None,
			origin: None,
		}
	}

	pub fn with_catalog(mut self, catalog: &'a dyn CatalogIntrospector) -> Self {
		self.catalog = Some(catalog);
		self
	}

	pub fn with_origin(mut self, origin: &'a SchemaState) -> Self {
		self.origin = Some(origin);
		self
	}

	/// Physical table and column names `column` had before the running
	/// migration. Columns the origin does not know keep their current names.
	pub fn original_names(&self, change: &TableChange<'_>, column: &ColumnDefinition) -> (String, String) {
		self.origin
			.and_then(|origin| origin.get_table(&change.from.name))
			.and_then(|table| {
				table
					.get_column(&column.name)
					.map(|c| (table.table_name.clone(), c.column_name.clone()))
			})
			.unwrap_or_else(|| (change.from.table_name.clone(), column.column_name.clone()))
	}
}

/// Before and after views of one table, plus the state used to resolve
/// foreign-key targets.
#[derive(Clone, Copy)]
pub struct TableChange<'a> {
	pub state: &'a SchemaState,
	pub from: &'a TableSchema,
	pub to: &'a TableSchema,
}

impl<'a> TableChange<'a> {
	pub fn new(state: &'a SchemaState, from: &'a TableSchema, to: &'a TableSchema) -> Self {
		Self { state, from, to }
	}

	/// Physical name of the table being altered.
	pub fn table_name(&self) -> &'a str {
		&self.to.table_name
	}
}

/// Renders schema primitives for one SQL dialect.
#[async_trait]
pub trait SchemaEditor: Send + Sync {
	fn database_type(&self) -> DatabaseType;

	fn max_identifier_length(&self) -> usize;

	fn quote_name(&self, name: &str) -> String;

	/// Positional parameter marker, 1-based.
	fn placeholder(&self, index: usize) -> String;

	fn literal(&self, value: &SqlValue) -> String;

	fn column_type_sql(&self, field_type: &FieldType) -> String;

	/// Whether `ADD COLUMN` may carry a `REFERENCES` clause.
	fn inline_references(&self) -> bool {
		true
	}

	fn supports_concurrent_index(&self) -> bool {
		false
	}

	fn unsupported(&self, operation: &str) -> MigrationError {
		MigrationError::UnsupportedOperation {
			backend: self.database_type().to_string(),
			operation: operation.to_string(),
		}
	}

	fn quote_names(&self, names: &[String]) -> String {
		names
			.iter()
			.map(|n| self.quote_name(n))
			.collect::<Vec<_>>()
			.join(", ")
	}

	/// Column DDL with explicit nullability and primary-key rendering.
	fn column_definition_sql(&self, column: &ColumnDefinition, null: bool, primary_key: bool) -> String {
		let mut parts = vec![
			self.quote_name(&column.column_name),
			self.column_type_sql(&column.field_type),
		];
		if !null {
			parts.push("NOT NULL".to_string());
		}
		if primary_key {
			parts.push("PRIMARY KEY".to_string());
		}
		if let Some(expression) = &column.server_default {
			parts.push(format!("DEFAULT {}", expression));
		}
		parts.extend(column.constraints.iter().cloned());
		parts.join(" ")
	}

	fn column_sql(&self, column: &ColumnDefinition) -> String {
		self.column_definition_sql(column, column.null, column.primary_key)
	}

	/// `REFERENCES "t" ("c") [ON DELETE ..] [ON UPDATE ..]`
	fn references_sql(&self, state: &SchemaState, reference: &ForeignKeyReference) -> String {
		let (table, column) = state.resolve_reference(reference);
		let mut sql = format!(
			"REFERENCES {} ({})",
			self.quote_name(&table),
			self.quote_name(&column)
		);
		if let Some(action) = reference.on_delete {
			sql.push_str(&format!(" ON DELETE {}", action.to_sql_keyword()));
		}
		if let Some(action) = reference.on_update {
			sql.push_str(&format!(" ON UPDATE {}", action.to_sql_keyword()));
		}
		sql
	}

	/// Name of the constraint created by [`add_foreign_key`](Self::add_foreign_key).
	fn foreign_key_name(&self, state: &SchemaState, table: &TableSchema, column: &ColumnDefinition) -> Option<String> {
		let reference = column.references.as_ref()?;
		Some(match &reference.constraint_name {
			Some(name) => name.clone(),
			None => {
				let (target, _) = state.resolve_reference(reference);
				fk_constraint_name(
					&table.table_name,
					&column.column_name,
					&target,
					self.max_identifier_length(),
				)
			}
		})
	}

	/// Constraint name spelled out for a foreign key declared in `CREATE TABLE`.
	/// `None` leaves the naming to the database.
	fn table_foreign_key_name(
		&self,
		_state: &SchemaState,
		_table: &TableSchema,
		column: &ColumnDefinition,
	) -> Option<String> {
		column.references.as_ref()?.constraint_name.clone()
	}

	/// Name the database gave an unnamed foreign key on `table.column_name`.
	///
	/// PostgreSQL's own default is `{table}_{column}_fkey`.
	fn default_foreign_key_name(
		&self,
		_state: &SchemaState,
		table: &str,
		column_name: &str,
		_reference: &ForeignKeyReference,
	) -> String {
		truncate_name(
			&format!("{}_{}_fkey", table, column_name),
			self.max_identifier_length(),
		)
	}

	fn create_table_sql(&self, state: &SchemaState, table: &TableSchema) -> String {
		let mut parts: Vec<String> = table.columns.values().map(|c| self.column_sql(c)).collect();
		if let Some(pk) = &table.primary_key {
			let columns: Vec<String> = pk
				.columns
				.iter()
				.map(|c| table.physical_column(c).to_string())
				.collect();
			parts.push(format!("PRIMARY KEY ({})", self.quote_names(&columns)));
		}
		for column in table.columns.values() {
			if let Some(reference) = &column.references {
				let constraint = self
					.table_foreign_key_name(state, table, column)
					.map(|n| format!("CONSTRAINT {} ", self.quote_name(&n)))
					.unwrap_or_default();
				parts.push(format!(
					"{}FOREIGN KEY ({}) {}",
					constraint,
					self.quote_name(&column.column_name),
					self.references_sql(state, reference)
				));
			}
		}
		format!(
			"CREATE TABLE {} ({})",
			self.quote_name(&table.table_name),
			parts.join(", ")
		)
	}

	fn create_table(&self, state: &SchemaState, table: &TableSchema) -> Result<Vec<Action>> {
		let mut actions = vec![Action::sql(self.create_table_sql(state, table))];
		for index in table.all_indexes() {
			actions.extend(self.create_index(table, &index)?);
		}
		Ok(actions)
	}

	fn drop_table(&self, table: &TableSchema, cascade: bool) -> Result<Vec<Action>> {
		let mut sql = format!("DROP TABLE {}", self.quote_name(&table.table_name));
		if cascade {
			sql.push_str(" CASCADE");
		}
		Ok(vec![Action::sql(sql)])
	}

	fn rename_table(&self, old: &str, new: &str) -> Result<Vec<Action>> {
		Ok(vec![Action::sql(format!(
			"ALTER TABLE {} RENAME TO {}",
			self.quote_name(old),
			self.quote_name(new)
		))])
	}

	/// Add-nullable, backfill, set-not-null, then constraint and index.
	fn add_column(&self, change: &TableChange<'_>, column: &ColumnDefinition) -> Result<Vec<Action>> {
		add_column_in_place(self, change, column)
	}

	/// `UPDATE t SET c = ?` filling existing rows with the client default.
	fn backfill(&self, table: &str, column: &ColumnDefinition) -> Action {
		let value = column
			.default
			.as_ref()
			.map(ColumnDefault::resolve)
			.unwrap_or(SqlValue::Null);
		Action::sql_with_params(
			format!(
				"UPDATE {} SET {} = {}",
				self.quote_name(table),
				self.quote_name(&column.column_name),
				self.placeholder(1)
			),
			vec![value],
		)
	}

	fn drop_columns(
		&self,
		change: &TableChange<'_>,
		columns: &[ColumnDefinition],
		cascade: bool,
	) -> Result<Vec<Action>> {
		Ok(columns
			.iter()
			.map(|column| {
				let mut sql = format!(
					"ALTER TABLE {} DROP COLUMN {}",
					self.quote_name(change.table_name()),
					self.quote_name(&column.column_name)
				);
				if cascade {
					sql.push_str(" CASCADE");
				}
				Action::sql(sql)
			})
			.collect())
	}

	fn rename_column(&self, table: &str, old: &str, new: &str) -> Result<Vec<Action>> {
		Ok(vec![Action::sql(format!(
			"ALTER TABLE {} RENAME COLUMN {} TO {}",
			self.quote_name(table),
			self.quote_name(old),
			self.quote_name(new)
		))])
	}

	fn alter_column_type(&self, change: &TableChange<'_>, column: &ColumnDefinition) -> Result<Vec<Action>> {
		Ok(vec![Action::sql(format!(
			"ALTER TABLE {} ALTER COLUMN {} TYPE {}",
			self.quote_name(change.table_name()),
			self.quote_name(&column.column_name),
			self.column_type_sql(&column.field_type)
		))])
	}

	fn set_not_null(&self, change: &TableChange<'_>, column: &ColumnDefinition) -> Result<Vec<Action>> {
		Ok(vec![Action::sql(format!(
			"ALTER TABLE {} ALTER COLUMN {} SET NOT NULL",
			self.quote_name(change.table_name()),
			self.quote_name(&column.column_name)
		))])
	}

	fn drop_not_null(&self, change: &TableChange<'_>, column: &ColumnDefinition) -> Result<Vec<Action>> {
		Ok(vec![Action::sql(format!(
			"ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL",
			self.quote_name(change.table_name()),
			self.quote_name(&column.column_name)
		))])
	}

	fn set_default(
		&self,
		change: &TableChange<'_>,
		column: &ColumnDefinition,
		expression: &str,
	) -> Result<Vec<Action>> {
		Ok(vec![Action::sql(format!(
			"ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
			self.quote_name(change.table_name()),
			self.quote_name(&column.column_name),
			expression
		))])
	}

	fn drop_default(&self, change: &TableChange<'_>, column: &ColumnDefinition) -> Result<Vec<Action>> {
		Ok(vec![Action::sql(format!(
			"ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
			self.quote_name(change.table_name()),
			self.quote_name(&column.column_name)
		))])
	}

	fn add_foreign_key(&self, change: &TableChange<'_>, column: &ColumnDefinition) -> Result<Vec<Action>> {
		let Some(reference) = &column.references else {
			return Ok(Vec::new());
		};
		let name = self
			.foreign_key_name(change.state, change.to, column)
			.unwrap_or_default();
		Ok(vec![Action::sql(format!(
			"ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) {}",
			self.quote_name(change.table_name()),
			self.quote_name(&name),
			self.quote_name(&column.column_name),
			self.references_sql(change.state, reference)
		))])
	}

	/// Name of the foreign-key constraint currently guarding `old`.
	///
	/// Resolution order: explicit name, live catalog, then
	/// [`default_foreign_key_name`](Self::default_foreign_key_name). The last
	/// two use the names the table and column had before the migration, which
	/// is what the catalog still holds while the plan is built.
	async fn resolve_foreign_key_name(
		&self,
		ctx: &EmitContext<'_>,
		change: &TableChange<'_>,
		old: &ColumnDefinition,
	) -> Result<String> {
		let Some(reference) = &old.references else {
			return Err(self.unsupported("dropping a foreign key from a plain column"));
		};
		if let Some(name) = &reference.constraint_name {
			return Ok(name.clone());
		}
		let (table, column_name) = ctx.original_names(change, old);
		if let Some(catalog) = ctx.catalog
			&& let Some(name) = catalog.foreign_key_constraint_name(&table, &column_name).await?
		{
			return Ok(name);
		}
		let state = ctx.origin.unwrap_or(change.state);
		Ok(self.default_foreign_key_name(state, &table, &column_name, reference))
	}

	/// Drop the foreign key `old` declared, on the table as it now stands.
	async fn drop_foreign_key(
		&self,
		ctx: &EmitContext<'_>,
		change: &TableChange<'_>,
		old: &ColumnDefinition,
	) -> Result<Vec<Action>> {
		let name = self.resolve_foreign_key_name(ctx, change, old).await?;
		Ok(vec![Action::sql(format!(
			"ALTER TABLE {} DROP CONSTRAINT {}",
			self.quote_name(change.table_name()),
			self.quote_name(&name)
		))])
	}

	fn create_index(&self, table: &TableSchema, index: &IndexDefinition) -> Result<Vec<Action>> {
		Ok(vec![create_index_statement(self, table, index).into()])
	}

	fn drop_index(
		&self,
		_table: &TableSchema,
		name: &str,
		safe: bool,
		concurrently: bool,
	) -> Result<Vec<Action>> {
		let concurrently = concurrently && self.supports_concurrent_index();
		let sql = format!(
			"DROP INDEX {}{}{}",
			if concurrently { "CONCURRENTLY " } else { "" },
			if safe { "IF EXISTS " } else { "" },
			self.quote_name(name)
		);
		Ok(vec![SqlAction::new(sql).outside_transaction(concurrently).into()])
	}

	fn rename_index(
		&self,
		_table: &TableSchema,
		_index: &IndexDefinition,
		old: &str,
		new: &str,
	) -> Result<Vec<Action>> {
		Ok(vec![Action::sql(format!(
			"ALTER INDEX {} RENAME TO {}",
			self.quote_name(old),
			self.quote_name(new)
		))])
	}

	fn select_schema(&self, _schema: &str) -> Result<Vec<Action>> {
		Err(self.unsupported("search path selection"))
	}

	/// Recreate `target` from the rows of `source`.
	///
	/// Columns are matched by logical name; target columns without a source
	/// counterpart are left to their defaults.
	fn rebuild_table(
		&self,
		state: &SchemaState,
		source: &TableSchema,
		target: &TableSchema,
	) -> Result<Vec<Action>> {
		let temp_name = format!("{}__new", target.table_name);
		let mut temp = target.clone();
		temp.table_name = temp_name.clone();

		let (into, from): (Vec<String>, Vec<String>) = target
			.columns
			.values()
			.filter_map(|c| {
				source
					.get_column(&c.name)
					.map(|s| (c.column_name.clone(), s.column_name.clone()))
			})
			.unzip();

		let mut actions = vec![
			Action::sql(self.create_table_sql(state, &temp)),
			Action::sql(format!(
				"INSERT INTO {} ({}) SELECT {} FROM {}",
				self.quote_name(&temp_name),
				self.quote_names(&into),
				self.quote_names(&from),
				self.quote_name(&source.table_name)
			)),
			Action::sql(format!("DROP TABLE {}", self.quote_name(&source.table_name))),
		];
		actions.extend(self.rename_table(&temp_name, &target.table_name)?);
		for index in target.all_indexes() {
			actions.extend(self.create_index(target, &index)?);
		}
		Ok(actions)
	}

	/// Emit the actions turning each `(old, new)` column pair into the new definition.
	async fn change_columns(
		&self,
		ctx: &EmitContext<'_>,
		change: &TableChange<'_>,
		pairs: &[(ColumnDefinition, ColumnDefinition)],
	) -> Result<Vec<Action>> {
		change_columns_in_place(self, ctx, change, pairs).await
	}
}

/// `CREATE [UNIQUE] INDEX [CONCURRENTLY] [IF NOT EXISTS] "n" ON "t" (..) [WHERE ..]`
pub(crate) fn create_index_statement<E: SchemaEditor + ?Sized>(
	editor: &E,
	table: &TableSchema,
	index: &IndexDefinition,
) -> SqlAction {
	let concurrently = index.concurrently && editor.supports_concurrent_index();
	if index.concurrently && !concurrently {
		tracing::warn!(
			backend = %editor.database_type(),
			table = %table.table_name,
			"concurrent index build is not supported, building normally"
		);
	}
	let mut sql = format!(
		"CREATE {}INDEX {}{}{} ON {} ({})",
		if index.unique { "UNIQUE " } else { "" },
		if concurrently { "CONCURRENTLY " } else { "" },
		if index.safe { "IF NOT EXISTS " } else { "" },
		editor.quote_name(&table.index_name(index)),
		editor.quote_name(&table.table_name),
		editor.quote_names(&table.physical_columns(index))
	);
	if let Some(predicate) = &index.predicate {
		sql.push_str(&format!(" WHERE {}", predicate));
	}
	SqlAction::new(sql).outside_transaction(concurrently)
}

pub(crate) fn require_default(change: &TableChange<'_>, column: &ColumnDefinition) -> Result<()> {
	if !column.null && column.default.is_none() && column.server_default.is_none() {
		return Err(MigrationError::MissingDefault {
			table: change.to.name.clone(),
			column: column.name.clone(),
		});
	}
	Ok(())
}

/// `ALTER TABLE .. ADD COLUMN` with the column forced nullable.
pub(crate) fn add_nullable_column<E: SchemaEditor + ?Sized>(
	editor: &E,
	change: &TableChange<'_>,
	column: &ColumnDefinition,
) -> Action {
	let mut ddl = editor.column_definition_sql(column, true, false);
	if editor.inline_references()
		&& let Some(reference) = &column.references
	{
		ddl.push(' ');
		ddl.push_str(&editor.references_sql(change.state, reference));
	}
	Action::sql(format!(
		"ALTER TABLE {} ADD COLUMN {}",
		editor.quote_name(change.table_name()),
		ddl
	))
}

pub(crate) fn add_column_in_place<E: SchemaEditor + ?Sized>(
	editor: &E,
	change: &TableChange<'_>,
	column: &ColumnDefinition,
) -> Result<Vec<Action>> {
	require_default(change, column)?;

	let mut actions = vec![add_nullable_column(editor, change, column)];
	if !column.null {
		if column.server_default.is_none() {
			actions.push(editor.backfill(change.table_name(), column));
		}
		actions.extend(editor.set_not_null(change, column)?);
	}
	if !editor.inline_references() && column.references.is_some() {
		actions.extend(editor.add_foreign_key(change, column)?);
	}
	if let Some(index) = change.to.single_column_index(column) {
		actions.extend(editor.create_index(change.to, &index)?);
	}
	Ok(actions)
}

/// Per-column change sequence: rename, type, foreign key, default,
/// nullability, then single-column index.
pub(crate) async fn change_columns_in_place<E: SchemaEditor + ?Sized>(
	editor: &E,
	ctx: &EmitContext<'_>,
	change: &TableChange<'_>,
	pairs: &[(ColumnDefinition, ColumnDefinition)],
) -> Result<Vec<Action>> {
	let table = change.table_name();
	let mut actions = Vec::new();

	for (old, new) in pairs {
		let mut current_index = change
			.from
			.single_column_index(old)
			.map(|i| change.from.index_name(&i));

		if old.column_name != new.column_name {
			actions.extend(editor.rename_column(table, &old.column_name, &new.column_name)?);
			if let Some(old_index) = current_index.clone()
				&& let Some(new_index) = change.to.single_column_index(new)
			{
				let new_name = change.to.index_name(&new_index);
				if new_name != old_index {
					actions.extend(editor.rename_index(change.to, &new_index, &old_index, &new_name)?);
					current_index = Some(new_name);
				}
			}
		}

		if old.field_type != new.field_type {
			actions.extend(editor.alter_column_type(change, new)?);
		}

		if old.references != new.references {
			if old.references.is_some() {
				actions.extend(editor.drop_foreign_key(ctx, change, old).await?);
			}
			if new.references.is_some() {
				actions.extend(editor.add_foreign_key(change, new)?);
			}
		}

		if old.server_default != new.server_default {
			match &new.server_default {
				Some(expression) => actions.extend(editor.set_default(change, new, expression)?),
				None => actions.extend(editor.drop_default(change, new)?),
			}
		}

		if old.null != new.null {
			if new.null {
				actions.extend(editor.drop_not_null(change, new)?);
			} else {
				actions.extend(editor.set_not_null(change, new)?);
			}
		}

		let index_unchanged =
			(old.unique && new.unique) || (!old.unique && !new.unique && old.index == new.index);
		if !index_unchanged {
			if let Some(name) = &current_index {
				actions.extend(editor.drop_index(change.to, name, false, false)?);
			}
			if let Some(index) = change.to.single_column_index(new) {
				actions.extend(editor.create_index(change.to, &index)?);
			}
		}
	}

	Ok(actions)
}

/// Editor for a database type.
pub fn editor_for(database_type: DatabaseType) -> Box<dyn SchemaEditor> {
	use crate::backends::{MySqlSchemaEditor, PostgresSchemaEditor, SqliteSchemaEditor};

	match database_type {
		DatabaseType::Postgres => Box::new(PostgresSchemaEditor::new()),
		DatabaseType::Mysql => Box::new(MySqlSchemaEditor::new()),
		DatabaseType::Sqlite => Box::new(SqliteSchemaEditor::new()),
	}
}
