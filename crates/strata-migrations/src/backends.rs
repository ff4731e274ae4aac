//! Dialect emitters for the supported databases.
//!
//! - [`PostgresSchemaEditor`]: transactional DDL, `ALTER COLUMN .. TYPE`, concurrent indexes
//! - [`MySqlSchemaEditor`]: `MODIFY COLUMN`, explicit foreign-key constraints
//! - [`SqliteSchemaEditor`]: table rebuilds for anything `ALTER TABLE` cannot express

pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use mysql::MySqlSchemaEditor;
pub use postgres::PostgresSchemaEditor;
pub use sqlite::SqliteSchemaEditor;
