//! # Strata Migrations
//!
//! Schema migration planning and execution for relational databases.
//!
//! ## Features
//!
//! - **Typed operations**: a closed set of migration steps (create/drop table, add/change/remove
//!   columns, renames, indexes, nullability, raw SQL and callbacks)
//! - **Two-phase apply**: every operation first advances the logical [`SchemaState`], then emits
//!   concrete [`Action`]s from the before/after views
//! - **Auto-detection**: [`diff_table`] and [`diff_schema`] compare a target schema against a
//!   recorded baseline and produce a correctly ordered operation list
//! - **Dialects**: PostgreSQL, MySQL and SQLite emitters behind the [`SchemaEditor`] trait
//!
//! ## Planning a migration
//!
//! ```rust,ignore
//! use strata_migrations::prelude::*;
//!
//! let baseline = TableSchema::new("user")
//!     .column(ColumnDefinition::new("id", FieldType::AutoField).primary_key())
//!     .column(ColumnDefinition::new("name", FieldType::Text));
//! let target = baseline
//!     .clone()
//!     .column(ColumnDefinition::new("age", FieldType::Integer).default_value(5i64));
//!
//! let operations = diff_table(&target, &baseline);
//! let migration = Migration::new("0002_add_age").operations(operations);
//!
//! let mut state = SchemaState::from_tables([baseline]);
//! let editor = PostgresSchemaEditor::new();
//! let plan = migration.plan(&mut state, &EmitContext::new(&editor)).await?;
//! ```

pub mod action;
pub mod autodetector;
pub mod backends;
pub mod executor;
pub mod fields;
pub mod introspection;
pub mod migration;
pub mod naming;
pub mod operations;
pub mod schema;
pub mod schema_editor;
pub mod state;
pub mod value;

pub use action::{Action, CallbackAction, CallbackFn, SqlAction};
pub use autodetector::{diff_schema, diff_table, sort_tables_by_dependency};
pub use backends::{MySqlSchemaEditor, PostgresSchemaEditor, SqliteSchemaEditor};
pub use executor::{ExecutionResult, MigrationExecutor};
pub use fields::{FieldType, ForeignKeyAction};
pub use introspection::{CatalogIntrospector, SqlxCatalogIntrospector, StaticCatalog};
pub use migration::{Migration, PlannedOperation};
pub use operations::{
	AddColumns, AddIndex, ChangeColumns, CreateTable, DropIndex, DropTable, Operation,
	RemoveColumns, RenameColumn, RenameTable, RunCallback, RunRawAction, SchemaOperation, SetNullable,
};
pub use schema::{
	ColumnDefault, ColumnDefinition, DefaultFn, ForeignKeyReference, IndexDefinition, PrimaryKey,
	TableSchema,
};
pub use schema_editor::{DatabaseType, EmitContext, SchemaEditor, TableChange, editor_for};
pub use state::SchemaState;
pub use value::SqlValue;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
	#[error("Unknown table: `{table}`")]
	UnknownTable { table: String },

	#[error("Unknown column: `{column}` on table `{table}`")]
	UnknownColumn { table: String, column: String },

	#[error("Unknown index: `{index}` on table `{table}`")]
	UnknownIndex { table: String, index: String },

	/// Adding a non-nullable column requires either a client-side default
	/// or a server-side DEFAULT expression to fill existing rows.
	#[error("`{column}` is not null but has no default (table `{table}`)")]
	MissingDefault { table: String, column: String },

	#[error("`{column}` field has more than one default constraint")]
	DuplicateDefaultConstraint { column: String },

	/// The backend cannot express the requested primitive.
	#[error("{backend} does not support {operation}")]
	UnsupportedOperation { backend: String, operation: String },

	#[error("Circular dependency detected: {cycle}")]
	CircularDependency { cycle: String },

	#[error("Invalid schema: {0}")]
	InvalidSchema(String),

	#[error("Introspection error: {0}")]
	Introspection(String),

	#[error("Callback failed: {0}")]
	Callback(String),

	#[error("SQL error: {0}")]
	SqlError(#[from] sqlx::Error),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MigrationError>;

pub mod prelude {
	pub use super::{
		Action, ColumnDefinition, DatabaseType, EmitContext, FieldType, ForeignKeyAction,
		ForeignKeyReference, IndexDefinition, Migration, MigrationError, MigrationExecutor,
		MySqlSchemaEditor, Operation, PostgresSchemaEditor, SchemaEditor, SchemaState,
		SqlValue, SqliteSchemaEditor, TableSchema, diff_schema, diff_table,
	};
}
