//! Live catalog lookups needed while planning.
//!
//! Planning is otherwise pure; the only information read from the database
//! is the name of an existing foreign-key constraint, which is not recorded
//! in the schema state when the database chose it.

use async_trait::async_trait;
use indexmap::IndexMap;
use sqlx::AnyPool;
use sqlx::Row;

use crate::schema_editor::DatabaseType;
use crate::{MigrationError, Result};

/// Trait for database catalog lookups
#[async_trait]
pub trait CatalogIntrospector: Send + Sync {
	/// Name of the foreign-key constraint on `table.column`, if any
	async fn foreign_key_constraint_name(&self, table: &str, column: &str) -> Result<Option<String>>;

	/// Whether a table with this physical name exists
	async fn table_exists(&self, table: &str) -> Result<bool>;
}

/// Catalog reader over an sqlx [`AnyPool`].
///
/// PostgreSQL and MySQL are read through `information_schema`. SQLite does
/// not name foreign keys, so lookups there always return `None`.
pub struct SqlxCatalogIntrospector {
	pool: AnyPool,
	database_type: DatabaseType,
}

impl SqlxCatalogIntrospector {
	pub fn new(pool: AnyPool, database_type: DatabaseType) -> Self {
		Self {
			pool,
			database_type,
		}
	}

	fn introspection_error(what: &str, table: &str, error: sqlx::Error) -> MigrationError {
		MigrationError::Introspection(format!("Failed to {} for table {}: {}", what, table, error))
	}
}

#[async_trait]
impl CatalogIntrospector for SqlxCatalogIntrospector {
	async fn foreign_key_constraint_name(&self, table: &str, column: &str) -> Result<Option<String>> {
		let query = match self.database_type {
			DatabaseType::Postgres => {
				r#"
				SELECT tc.constraint_name::text
				FROM information_schema.table_constraints tc
				JOIN information_schema.key_column_usage kcu
					ON tc.constraint_name = kcu.constraint_name
					AND tc.table_schema = kcu.table_schema
				WHERE tc.constraint_type = 'FOREIGN KEY'
					AND tc.table_schema = current_schema()
					AND tc.table_name = $1
					AND kcu.column_name = $2
				"#
			}
			DatabaseType::Mysql => {
				r#"
				SELECT CAST(constraint_name AS CHAR)
				FROM information_schema.key_column_usage
				WHERE table_schema = DATABASE()
					AND table_name = ?
					AND column_name = ?
					AND referenced_table_name IS NOT NULL
				"#
			}
			DatabaseType::Sqlite => return Ok(None),
		};

		let row = sqlx::query(query)
			.bind(table)
			.bind(column)
			.fetch_optional(&self.pool)
			.await
			.map_err(|e| Self::introspection_error("fetch foreign keys", table, e))?;

		row.map(|row| {
			row.try_get::<String, _>(0).map_err(|e| {
				MigrationError::Introspection(format!("Failed to get constraint_name: {}", e))
			})
		})
		.transpose()
	}

	async fn table_exists(&self, table: &str) -> Result<bool> {
		let query = match self.database_type {
			DatabaseType::Postgres => {
				"SELECT 1 FROM information_schema.tables WHERE table_schema = current_schema() AND table_name = $1"
			}
			DatabaseType::Mysql => {
				"SELECT 1 FROM information_schema.tables WHERE table_schema = DATABASE() AND table_name = ?"
			}
			DatabaseType::Sqlite => "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?",
		};

		let row = sqlx::query(query)
			.bind(table)
			.fetch_optional(&self.pool)
			.await
			.map_err(|e| Self::introspection_error("check existence", table, e))?;
		Ok(row.is_some())
	}
}

/// Fixed catalog, for offline planning and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
	tables: Vec<String>,
	foreign_keys: IndexMap<(String, String), String>,
}

impl StaticCatalog {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_table(mut self, table: impl Into<String>) -> Self {
		self.tables.push(table.into());
		self
	}

	pub fn with_foreign_key(
		mut self,
		table: impl Into<String>,
		column: impl Into<String>,
		constraint_name: impl Into<String>,
	) -> Self {
		self.foreign_keys
			.insert((table.into(), column.into()), constraint_name.into());
		self
	}
}

#[async_trait]
impl CatalogIntrospector for StaticCatalog {
	async fn foreign_key_constraint_name(&self, table: &str, column: &str) -> Result<Option<String>> {
		Ok(self
			.foreign_keys
			.get(&(table.to_string(), column.to_string()))
			.cloned())
	}

	async fn table_exists(&self, table: &str) -> Result<bool> {
		Ok(self.tables.iter().any(|t| t == table)
			|| self.foreign_keys.keys().any(|(t, _)| t == table))
	}
}
