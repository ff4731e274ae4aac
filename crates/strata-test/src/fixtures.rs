//! Database fixtures
//!
//! ```rust,ignore
//! use rstest::*;
//! use sqlx::AnyPool;
//! use strata_test::fixtures::sqlite_pool;
//!
//! #[rstest]
//! #[tokio::test]
//! async fn test_with_database(#[future] sqlite_pool: AnyPool) {
//!     let pool = sqlite_pool.await;
//!     sqlx::query("SELECT 1").execute(&pool).await.unwrap();
//! }
//! ```

use crate::logging::init_test_logging;
use rstest::*;
use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;

/// Connection URL of a private in-memory SQLite database.
pub const SQLITE_MEMORY_URL: &str = "sqlite::memory:";

/// In-memory SQLite pool behind the `Any` driver.
///
/// The pool holds exactly one connection that never expires: every
/// connection to `sqlite::memory:` opens a new, empty database.
#[fixture]
pub async fn sqlite_pool() -> AnyPool {
	init_test_logging();
	sqlx::any::install_default_drivers();
	AnyPoolOptions::new()
		.max_connections(1)
		.idle_timeout(None)
		.max_lifetime(None)
		.connect(SQLITE_MEMORY_URL)
		.await
		.expect("Failed to create in-memory SQLite pool")
}
