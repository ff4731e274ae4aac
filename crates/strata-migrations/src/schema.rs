//! In-memory schema model: tables, columns, indexes and foreign keys.
//!
//! Every type here is plain data. Planning logic lives in [`operations`](crate::operations)
//! and DDL rendering in the [`SchemaEditor`](crate::SchemaEditor) implementations.

use crate::fields::{FieldType, ForeignKeyAction};
use crate::naming::{fk_postfix, index_name};
use crate::value::SqlValue;
use crate::{MigrationError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Client-side default producer, evaluated when existing rows are backfilled.
pub type DefaultFn = Arc<dyn Fn() -> SqlValue + Send + Sync>;

/// Client-side default of a column.
///
/// A callable default is never persisted and never compared: two runs can
/// not be expected to produce the same value.
#[derive(Clone)]
pub enum ColumnDefault {
	Value(SqlValue),
	Callable(DefaultFn),
}

impl ColumnDefault {
	/// The literal value, if this default is reproducible.
	pub fn literal(&self) -> Option<&SqlValue> {
		match self {
			ColumnDefault::Value(v) => Some(v),
			ColumnDefault::Callable(_) => None,
		}
	}

	pub fn is_callable(&self) -> bool {
		matches!(self, ColumnDefault::Callable(_))
	}

	/// Produce the value used to fill existing rows.
	pub fn resolve(&self) -> SqlValue {
		match self {
			ColumnDefault::Value(v) => v.clone(),
			ColumnDefault::Callable(f) => f(),
		}
	}
}

impl fmt::Debug for ColumnDefault {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ColumnDefault::Value(v) => f.debug_tuple("Value").field(v).finish(),
			ColumnDefault::Callable(_) => f.write_str("Callable(..)"),
		}
	}
}

impl PartialEq for ColumnDefault {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(ColumnDefault::Value(a), ColumnDefault::Value(b)) => a == b,
			(ColumnDefault::Callable(a), ColumnDefault::Callable(b)) => Arc::ptr_eq(a, b),
			_ => false,
		}
	}
}

fn serialize_default<S: Serializer>(
	default: &Option<ColumnDefault>,
	serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
	default
		.as_ref()
		.and_then(ColumnDefault::literal)
		.serialize(serializer)
}

fn deserialize_default<'de, D: Deserializer<'de>>(
	deserializer: D,
) -> std::result::Result<Option<ColumnDefault>, D::Error> {
	Ok(Option::<SqlValue>::deserialize(deserializer)?.map(ColumnDefault::Value))
}

/// Target of a foreign-key column.
///
/// `table` and `column` are logical names; the physical names are looked up
/// in the schema state at emission time so that table and column renames
/// are followed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyReference {
	pub table: String,
	pub column: String,
	pub on_delete: Option<ForeignKeyAction>,
	pub on_update: Option<ForeignKeyAction>,
	/// Explicit constraint name. When absent the backend picks one.
	pub constraint_name: Option<String>,
}

impl ForeignKeyReference {
	pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
		Self {
			table: table.into(),
			column: column.into(),
			on_delete: None,
			on_update: None,
			constraint_name: None,
		}
	}

	pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
		self.on_delete = Some(action);
		self
	}

	pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
		self.on_update = Some(action);
		self
	}

	pub fn constraint_name(mut self, name: impl Into<String>) -> Self {
		self.constraint_name = Some(name.into());
		self
	}
}

/// Column definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
	/// Logical name, unique within its table
	pub name: String,
	/// Physical name in the database
	pub column_name: String,
	pub field_type: FieldType,
	pub null: bool,
	pub unique: bool,
	pub index: bool,
	pub primary_key: bool,
	#[serde(
		default,
		serialize_with = "serialize_default",
		deserialize_with = "deserialize_default"
	)]
	pub default: Option<ColumnDefault>,
	/// Server-side default expression, rendered as `DEFAULT <expr>`
	pub server_default: Option<String>,
	/// Extra raw column constraints, e.g. `CHECK (age > 0)`
	pub constraints: Vec<String>,
	pub references: Option<ForeignKeyReference>,
	/// Frozen name of the column's own index, set once a table rename would
	/// otherwise change the derived one
	#[serde(default)]
	pub index_name: Option<String>,
}

impl ColumnDefinition {
	/// Create a NOT NULL column whose physical name equals its logical name.
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		let name = name.into();
		Self {
			column_name: name.clone(),
			name,
			field_type,
			null: false,
			unique: false,
			index: false,
			primary_key: false,
			default: None,
			server_default: None,
			constraints: Vec::new(),
			references: None,
			index_name: None,
		}
	}

	/// Create an indexed foreign-key column referencing `table.id`.
	///
	/// The physical name gets an `_id` suffix and the storage type is
	/// `INTEGER`; use [`references_type`](Self::references_type) for other key types.
	///
	/// ```
	/// use strata_migrations::{ColumnDefinition, FieldType};
	///
	/// let author = ColumnDefinition::foreign_key("author", "user");
	/// assert_eq!(author.column_name, "author_id");
	/// assert!(author.index);
	/// assert_eq!(author.field_type, FieldType::ForeignKey(Box::new(FieldType::Integer)));
	/// ```
	pub fn foreign_key(name: impl Into<String>, table: impl Into<String>) -> Self {
		let name = name.into();
		let mut column = Self::new(
			name.clone(),
			FieldType::foreign_key_to(&FieldType::AutoField),
		);
		column.column_name = fk_postfix(&name);
		column.index = true;
		column.references = Some(ForeignKeyReference::new(table, "id"));
		column
	}

	pub fn column_name(mut self, column_name: impl Into<String>) -> Self {
		self.column_name = column_name.into();
		self
	}

	pub fn null(mut self) -> Self {
		self.null = true;
		self
	}

	pub fn nullable(mut self, null: bool) -> Self {
		self.null = null;
		self
	}

	pub fn unique(mut self) -> Self {
		self.unique = true;
		self
	}

	pub fn index(mut self) -> Self {
		self.index = true;
		self
	}

	pub fn no_index(mut self) -> Self {
		self.index = false;
		self.unique = false;
		self
	}

	pub fn primary_key(mut self) -> Self {
		self.primary_key = true;
		self
	}

	/// Name the column's own index explicitly.
	pub fn index_name(mut self, name: impl Into<String>) -> Self {
		self.index_name = Some(name.into());
		self
	}

	pub fn default_value(mut self, value: impl Into<SqlValue>) -> Self {
		self.default = Some(ColumnDefault::Value(value.into()));
		self
	}

	pub fn default_fn(mut self, f: impl Fn() -> SqlValue + Send + Sync + 'static) -> Self {
		self.default = Some(ColumnDefault::Callable(Arc::new(f)));
		self
	}

	/// Set the server-side default expression.
	///
	/// Fails with [`MigrationError::DuplicateDefaultConstraint`] if the column
	/// already has one.
	pub fn server_default(mut self, expression: impl Into<String>) -> Result<Self> {
		if self.server_default.is_some() {
			return Err(MigrationError::DuplicateDefaultConstraint { column: self.name });
		}
		self.server_default = Some(expression.into());
		Ok(self)
	}

	/// Attach a raw column constraint.
	///
	/// A clause starting with `DEFAULT ` is recorded as the server default,
	/// so declaring two default clauses is rejected.
	///
	/// ```
	/// use strata_migrations::{ColumnDefinition, FieldType};
	///
	/// let column = ColumnDefinition::new("created_at", FieldType::Date)
	///     .constraint("DEFAULT now()")
	///     .unwrap();
	/// assert_eq!(column.server_default.as_deref(), Some("now()"));
	/// assert!(column.constraint("DEFAULT CURRENT_DATE").is_err());
	/// ```
	pub fn constraint(mut self, clause: impl Into<String>) -> Result<Self> {
		let clause = clause.into();
		match parse_default_clause(&clause) {
			Some(expression) => self.server_default(expression),
			None => {
				self.constraints.push(clause);
				Ok(self)
			}
		}
	}

	pub fn references(mut self, reference: ForeignKeyReference) -> Self {
		if !self.field_type.is_foreign_key() {
			self.field_type = FieldType::foreign_key_to(&self.field_type);
		}
		self.references = Some(reference);
		self
	}

	/// Adjust the storage type of a foreign key to match the referenced column.
	pub fn references_type(mut self, target: &FieldType) -> Self {
		self.field_type = FieldType::foreign_key_to(target);
		self
	}

	/// Whether the column is covered by an index of its own.
	pub fn has_single_index(&self) -> bool {
		self.index || self.unique
	}

	/// Literal client-side default, ignoring callables.
	pub fn literal_default(&self) -> Option<&SqlValue> {
		self.default.as_ref().and_then(ColumnDefault::literal)
	}

	/// Check the foreign-key invariant: the type is a reference iff a target is set.
	pub fn validate(&self) -> Result<()> {
		if self.field_type.is_foreign_key() != self.references.is_some() {
			return Err(MigrationError::InvalidSchema(format!(
				"column `{}` must declare both a foreign-key type and a reference target",
				self.name
			)));
		}
		Ok(())
	}
}

fn rename_in_list(columns: &mut [String], old: &str, new: &str) {
	for column in columns.iter_mut().filter(|c| *c == old) {
		*column = new.to_string();
	}
}

/// Parse `DEFAULT <expr>` into `<expr>`.
fn parse_default_clause(clause: &str) -> Option<String> {
	let trimmed = clause.trim();
	let (keyword, rest) = trimmed.split_once(char::is_whitespace)?;
	if !keyword.eq_ignore_ascii_case("default") {
		return None;
	}
	let rest = rest.trim();
	(!rest.is_empty()).then(|| rest.to_string())
}

/// Index declared on a table.
///
/// Columns are logical names; they are resolved to physical names through
/// the owning [`TableSchema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
	pub columns: Vec<String>,
	pub unique: bool,
	/// Partial index predicate, rendered after `WHERE`
	pub predicate: Option<String>,
	/// Emit `IF NOT EXISTS` / `IF EXISTS`
	pub safe: bool,
	/// Build without locking writes (PostgreSQL only)
	pub concurrently: bool,
	/// Explicit name. When absent the name is derived from the table and columns.
	pub name: Option<String>,
}

impl IndexDefinition {
	pub fn new<I, S>(columns: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			columns: columns.into_iter().map(Into::into).collect(),
			unique: false,
			predicate: None,
			safe: false,
			concurrently: false,
			name: None,
		}
	}

	pub fn unique(mut self, unique: bool) -> Self {
		self.unique = unique;
		self
	}

	pub fn predicate(mut self, predicate: impl Into<String>) -> Self {
		self.predicate = Some(predicate.into());
		self
	}

	pub fn safe(mut self, safe: bool) -> Self {
		self.safe = safe;
		self
	}

	pub fn concurrently(mut self, concurrently: bool) -> Self {
		self.concurrently = concurrently;
		self
	}

	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	/// Structural identity: two indexes are the same iff columns, uniqueness and
	/// predicate match. Names and build flags do not take part.
	pub fn same_structure(&self, other: &IndexDefinition) -> bool {
		self.columns == other.columns
			&& self.unique == other.unique
			&& self.predicate == other.predicate
	}
}

/// Composite primary key descriptor. Single-column keys use
/// [`ColumnDefinition::primary_key`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKey {
	pub columns: Vec<String>,
}

/// Table definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
	/// Logical name, the key of the table in [`SchemaState`](crate::SchemaState)
	pub name: String,
	/// Physical table name
	pub table_name: String,
	pub columns: IndexMap<String, ColumnDefinition>,
	/// Indexes not implied by a single column's `index`/`unique` flags
	pub indexes: Vec<IndexDefinition>,
	pub primary_key: Option<PrimaryKey>,
}

impl TableSchema {
	pub fn new(name: impl Into<String>) -> Self {
		let name = name.into();
		Self {
			table_name: name.clone(),
			name,
			columns: IndexMap::new(),
			indexes: Vec::new(),
			primary_key: None,
		}
	}

	pub fn table_name(mut self, table_name: impl Into<String>) -> Self {
		self.table_name = table_name.into();
		self
	}

	pub fn column(mut self, column: ColumnDefinition) -> Self {
		self.add_column(column);
		self
	}

	pub fn index(mut self, index: IndexDefinition) -> Self {
		self.indexes.push(index);
		self
	}

	pub fn composite_primary_key<I, S>(mut self, columns: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.primary_key = Some(PrimaryKey {
			columns: columns.into_iter().map(Into::into).collect(),
		});
		self
	}

	/// Insert or replace a column, keeping the position of a replaced one.
	pub fn add_column(&mut self, column: ColumnDefinition) {
		self.columns.insert(column.name.clone(), column);
	}

	pub fn get_column(&self, name: &str) -> Option<&ColumnDefinition> {
		self.columns.get(name)
	}

	pub fn require_column(&self, name: &str) -> Result<&ColumnDefinition> {
		self.columns
			.get(name)
			.ok_or_else(|| self.unknown_column(name))
	}

	pub fn require_column_mut(&mut self, name: &str) -> Result<&mut ColumnDefinition> {
		let error = self.unknown_column(name);
		self.columns.get_mut(name).ok_or(error)
	}

	/// Remove a column, keeping the order of the remaining ones.
	pub fn remove_column(&mut self, name: &str) -> Result<ColumnDefinition> {
		self.columns
			.shift_remove(name)
			.ok_or_else(|| self.unknown_column(name))
	}

	pub(crate) fn unknown_column(&self, column: &str) -> MigrationError {
		MigrationError::UnknownColumn {
			table: self.name.clone(),
			column: column.to_string(),
		}
	}

	/// Physical name of a logical column, or the input itself for expressions
	/// and columns this table does not know about.
	pub fn physical_column<'a>(&'a self, name: &'a str) -> &'a str {
		self.columns
			.get(name)
			.map(|c| c.column_name.as_str())
			.unwrap_or(name)
	}

	pub fn physical_columns(&self, index: &IndexDefinition) -> Vec<String> {
		index
			.columns
			.iter()
			.map(|c| self.physical_column(c).to_string())
			.collect()
	}

	/// Effective name of an index on this table.
	pub fn index_name(&self, index: &IndexDefinition) -> String {
		match &index.name {
			Some(name) => name.clone(),
			None => index_name(&self.table_name, &self.physical_columns(index)),
		}
	}

	/// Index implied by a column's own `index`/`unique` flags.
	pub fn single_column_index(&self, column: &ColumnDefinition) -> Option<IndexDefinition> {
		column.has_single_index().then(|| {
			let index = IndexDefinition::new([column.name.clone()]).unique(column.unique);
			let name = match &column.index_name {
				Some(name) => name.clone(),
				None => index_name(&self.table_name, &[column.column_name.clone()]),
			};
			index.name(name)
		})
	}

	/// Every index to create alongside the table: single-column ones in column
	/// order, then composite ones.
	pub fn all_indexes(&self) -> Vec<IndexDefinition> {
		self.columns
			.values()
			.filter(|c| !c.primary_key)
			.filter_map(|c| self.single_column_index(c))
			.chain(self.indexes.iter().map(|i| {
				let name = self.index_name(i);
				i.clone().name(name)
			}))
			.collect()
	}

	/// Freeze the derived names of the matching indexes, so that later
	/// table or column renames do not change them.
	pub fn pin_index_names(&mut self, filter: impl Fn(&IndexDefinition) -> bool) {
		let names: Vec<Option<String>> = self
			.indexes
			.iter()
			.map(|i| filter(i).then(|| self.index_name(i)))
			.collect();
		for (index, name) in self.indexes.iter_mut().zip(names) {
			if let Some(name) = name {
				index.name = Some(name);
			}
		}
	}

	/// Freeze every derived index name on the table, single-column ones included.
	pub fn pin_all_index_names(&mut self) {
		self.pin_index_names(|_| true);
		let names: Vec<(String, String)> = self
			.columns
			.values()
			.filter(|c| c.index_name.is_none())
			.filter_map(|c| {
				self.single_column_index(c)
					.and_then(|i| i.name)
					.map(|name| (c.name.clone(), name))
			})
			.collect();
		for (column, name) in names {
			if let Some(column) = self.columns.get_mut(&column) {
				column.index_name = Some(name);
			}
		}
	}

	/// Re-key a column under a new logical name, keeping its position and
	/// following the rename in index and primary-key column lists.
	pub fn rename_column_key(&mut self, old: &str, new: &str) -> Result<()> {
		self.require_column(old)?;
		self.columns = std::mem::take(&mut self.columns)
			.into_iter()
			.map(|(key, mut column)| {
				if key == old {
					column.name = new.to_string();
					(new.to_string(), column)
				} else {
					(key, column)
				}
			})
			.collect();
		for index in &mut self.indexes {
			rename_in_list(&mut index.columns, old, new);
		}
		if let Some(pk) = &mut self.primary_key {
			rename_in_list(&mut pk.columns, old, new);
		}
		Ok(())
	}

	pub fn find_index(&self, name: &str) -> Option<&IndexDefinition> {
		self.indexes.iter().find(|i| self.index_name(i) == name)
	}

	/// Logical names of the tables this table references, excluding itself.
	pub fn dependencies(&self) -> Vec<String> {
		let mut deps: Vec<String> = self
			.columns
			.values()
			.filter_map(|c| c.references.as_ref())
			.map(|r| r.table.to_lowercase())
			.filter(|t| *t != self.name.to_lowercase())
			.collect();
		deps.sort();
		deps.dedup();
		deps
	}

	/// Validate column invariants and index column references.
	pub fn validate(&self) -> Result<()> {
		for column in self.columns.values() {
			column.validate()?;
		}
		for index in &self.indexes {
			for column in &index.columns {
				self.require_column(column)?;
			}
		}
		if let Some(pk) = &self.primary_key {
			for column in &pk.columns {
				self.require_column(column)?;
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	fn user_table() -> TableSchema {
		TableSchema::new("user")
			.column(ColumnDefinition::new("id", FieldType::AutoField).primary_key())
			.column(ColumnDefinition::new("name", FieldType::char()).unique())
			.column(ColumnDefinition::new("first_name", FieldType::char()))
			.column(ColumnDefinition::new("last_name", FieldType::char()))
			.index(IndexDefinition::new(["first_name", "last_name"]))
	}

	#[rstest]
	#[case("DEFAULT now()", Some("now()"))]
	#[case("default 5", Some("5"))]
	#[case("DEFAULT", None)]
	#[case("CHECK (age > 0)", None)]
	#[case("DEFAULTS x", None)]
	fn test_parse_default_clause(#[case] clause: &str, #[case] expected: Option<&str>) {
		assert_eq!(parse_default_clause(clause).as_deref(), expected);
	}

	#[test]
	fn test_duplicate_default_constraint_rejected() {
		let result = ColumnDefinition::new("age", FieldType::Integer)
			.constraint("DEFAULT 5")
			.and_then(|c| c.constraint("DEFAULT 6"));
		match result {
			Err(MigrationError::DuplicateDefaultConstraint { column }) => assert_eq!(column, "age"),
			other => panic!("expected duplicate default error, got {:?}", other),
		}
	}

	#[test]
	fn test_non_default_constraints_are_kept() {
		let column = ColumnDefinition::new("age", FieldType::Integer)
			.constraint("CHECK (age > 0)")
			.unwrap();
		assert_eq!(column.constraints, vec!["CHECK (age > 0)".to_string()]);
		assert!(column.server_default.is_none());
	}

	#[test]
	fn test_index_names_use_physical_names() {
		let table = user_table().table_name("users");
		let composite = &table.indexes[0];
		assert_eq!(table.index_name(composite), "users_first_name_last_name");

		let name = table.get_column("name").unwrap();
		let single = table.single_column_index(name).unwrap();
		assert_eq!(single.name.as_deref(), Some("users_name"));
		assert!(single.unique);
	}

	#[test]
	fn test_all_indexes_skips_primary_key() {
		let table = user_table();
		let names: Vec<_> = table
			.all_indexes()
			.into_iter()
			.filter_map(|i| i.name)
			.collect();
		assert_eq!(names, vec!["user_name", "user_first_name_last_name"]);
	}

	#[test]
	fn test_remove_column_keeps_order() {
		let mut table = user_table();
		table.remove_column("name").unwrap();
		let names: Vec<_> = table.columns.keys().cloned().collect();
		assert_eq!(names, vec!["id", "first_name", "last_name"]);
		assert!(matches!(
			table.remove_column("missing"),
			Err(MigrationError::UnknownColumn { .. })
		));
	}

	#[test]
	fn test_callable_default_is_not_serialized() {
		let column = ColumnDefinition::new("token", FieldType::Text).default_fn(|| "x".into());
		let json = serde_json::to_value(&column).unwrap();
		assert!(json["default"].is_null());

		let restored: ColumnDefinition = serde_json::from_value(json).unwrap();
		assert!(restored.default.is_none());
	}

	#[test]
	fn test_literal_default_round_trips_through_json() {
		let column = ColumnDefinition::new("age", FieldType::Integer).default_value(5i64);
		let restored: ColumnDefinition =
			serde_json::from_str(&serde_json::to_string(&column).unwrap()).unwrap();
		assert_eq!(restored, column);
	}

	#[test]
	fn test_validate_rejects_reference_without_foreign_key_type() {
		let mut column = ColumnDefinition::new("author", FieldType::Integer);
		column.references = Some(ForeignKeyReference::new("user", "id"));
		assert!(matches!(
			column.validate(),
			Err(MigrationError::InvalidSchema(_))
		));
		assert!(column.references(ForeignKeyReference::new("user", "id")).validate().is_ok());
	}

	#[test]
	fn test_dependencies_exclude_self_reference() {
		let table = TableSchema::new("category")
			.column(ColumnDefinition::new("id", FieldType::AutoField).primary_key())
			.column(ColumnDefinition::foreign_key("parent", "category").null())
			.column(ColumnDefinition::foreign_key("owner", "User"));
		assert_eq!(table.dependencies(), vec!["user".to_string()]);
	}
}
