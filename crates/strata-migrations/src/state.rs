//! Logical schema state threaded through a migration run.

use crate::schema::{ForeignKeyReference, TableSchema};
use crate::{MigrationError, Result};
use indexmap::IndexMap;
use std::sync::Arc;

type TableMap = IndexMap<String, Arc<TableSchema>>;

/// Tables keyed by lower-cased logical name.
///
/// Tables are shared copy-on-write: a snapshot only clones the map of
/// pointers, and a table is deep-copied the first time it is mutated while
/// a snapshot still refers to it. The view returned by
/// [`pop_snapshot`](Self::pop_snapshot) is therefore never affected by
/// mutations made after [`create_snapshot`](Self::create_snapshot).
///
/// # Examples
///
/// ```rust,ignore
/// use strata_migrations::{ColumnDefinition, FieldType, SchemaState, TableSchema};
///
/// let mut state = SchemaState::from_tables([TableSchema::new("user")]);
/// state.create_snapshot();
/// state
///     .require_table_mut("user")?
///     .add_column(ColumnDefinition::new("age", FieldType::Integer).null());
/// let before = state.pop_snapshot();
///
/// assert!(before.require_table("user")?.get_column("age").is_none());
/// assert!(state.require_table("user")?.get_column("age").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SchemaState {
	tables: TableMap,
	snapshot: Option<TableMap>,
}

impl SchemaState {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_tables(tables: impl IntoIterator<Item = TableSchema>) -> Self {
		let mut state = Self::new();
		for table in tables {
			state.add_table(table);
		}
		state
	}

	fn key(name: &str) -> String {
		name.to_lowercase()
	}

	/// Register a table, replacing any table with the same logical name.
	pub fn add_table(&mut self, table: TableSchema) {
		self.tables.insert(Self::key(&table.name), Arc::new(table));
	}

	pub fn contains(&self, name: &str) -> bool {
		self.tables.contains_key(&Self::key(name))
	}

	pub fn get_table(&self, name: &str) -> Option<&TableSchema> {
		self.tables.get(&Self::key(name)).map(Arc::as_ref)
	}

	pub fn require_table(&self, name: &str) -> Result<&TableSchema> {
		self.get_table(name)
			.ok_or_else(|| MigrationError::UnknownTable {
				table: name.to_string(),
			})
	}

	pub fn require_table_mut(&mut self, name: &str) -> Result<&mut TableSchema> {
		self.tables
			.get_mut(&Self::key(name))
			.map(Arc::make_mut)
			.ok_or_else(|| MigrationError::UnknownTable {
				table: name.to_string(),
			})
	}

	pub fn remove_table(&mut self, name: &str) -> Result<TableSchema> {
		self.tables
			.shift_remove(&Self::key(name))
			.map(Arc::unwrap_or_clone)
			.ok_or_else(|| MigrationError::UnknownTable {
				table: name.to_string(),
			})
	}

	/// Tables in registration order.
	pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
		self.tables.values().map(Arc::as_ref)
	}

	pub fn len(&self) -> usize {
		self.tables.len()
	}

	pub fn is_empty(&self) -> bool {
		self.tables.is_empty()
	}

	/// Record the current version of every table.
	pub fn create_snapshot(&mut self) {
		self.snapshot = Some(self.tables.clone());
	}

	/// Take the view recorded by the last [`create_snapshot`](Self::create_snapshot).
	///
	/// Without a pending snapshot the current view is returned.
	pub fn pop_snapshot(&mut self) -> SchemaState {
		let tables = self.snapshot.take().unwrap_or_else(|| self.tables.clone());
		SchemaState {
			tables,
			snapshot: None,
		}
	}

	/// Physical `(table, column)` names targeted by a foreign key.
	///
	/// Targets outside this state resolve to the names as written.
	pub fn resolve_reference(&self, reference: &ForeignKeyReference) -> (String, String) {
		match self.get_table(&reference.table) {
			Some(table) => (
				table.table_name.clone(),
				table.physical_column(&reference.column).to_string(),
			),
			None => (reference.table.clone(), reference.column.clone()),
		}
	}

	/// Serialize every table as a JSON array, dropping callable defaults.
	pub fn to_json(&self) -> Result<String> {
		let tables: Vec<&TableSchema> = self.tables().collect();
		Ok(serde_json::to_string_pretty(&tables)?)
	}

	/// Restore a state written by [`to_json`](Self::to_json).
	pub fn from_json(json: &str) -> Result<Self> {
		let tables: Vec<TableSchema> = serde_json::from_str(json)?;
		Ok(Self::from_tables(tables))
	}
}
