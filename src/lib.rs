//! # Strata
//!
//! Schema diffing and dialect-aware migration operations for relational databases.
//!
//! Declare tables with the builder API, diff them against a recorded
//! baseline, and plan or apply the resulting operations on PostgreSQL,
//! MySQL or SQLite.
//!
//! ## Feature Flags
//!
//! - `full` (default) - Everything below
//! - `conf` - Layered settings ([`conf`])
//! - `migrations` - Operations, diffing and execution ([`migrations`])
//! - `db-postgres` / `db-mysql` / `db-sqlite` - Database drivers for the executor
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use strata::prelude::*;
//!
//! # async fn example() -> strata::migrations::Result<()> {
//! let baseline = TableSchema::new("user")
//!     .column(ColumnDefinition::new("id", FieldType::AutoField).primary_key());
//! let target = baseline
//!     .clone()
//!     .column(ColumnDefinition::new("age", FieldType::Integer).default_value(0i64));
//!
//! let settings = MigrationSettings::load(None).expect("invalid settings");
//! let executor = MigrationExecutor::from_settings(&settings).await?;
//!
//! let mut state = SchemaState::from_tables([baseline.clone()]);
//! let migration = Migration::new("0002_age").operations(diff_table(&target, &baseline));
//! executor.apply(&migration, &mut state).await?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "conf")]
pub use strata_conf as conf;

#[cfg(feature = "migrations")]
pub use strata_migrations as migrations;

#[cfg(feature = "conf")]
pub use strata_conf::{DatabaseConfig, DatabaseEngine, MigrationSettings};

#[cfg(feature = "migrations")]
pub use strata_migrations::{
	Migration, MigrationError, MigrationExecutor, Operation, SchemaState, TableSchema, diff_schema,
	diff_table,
};

pub mod prelude {
	#[cfg(feature = "conf")]
	pub use strata_conf::{DatabaseConfig, MigrationSettings};

	#[cfg(feature = "migrations")]
	pub use strata_migrations::prelude::*;
}
