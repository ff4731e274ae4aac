//! Migration executor
//!
//! Plans a [`Migration`] against a copy of the schema state, runs the
//! resulting actions over an sqlx [`AnyPool`] and, once every action has
//! succeeded, publishes the advanced state back to the caller.

use crate::action::{Action, SqlAction};
use crate::introspection::{CatalogIntrospector, SqlxCatalogIntrospector};
use crate::migration::{Migration, PlannedOperation};
use crate::schema_editor::{DatabaseType, EmitContext, SchemaEditor, editor_for};
use crate::state::SchemaState;
use crate::value::SqlValue;
use crate::Result;
use sqlx::{Any, AnyConnection, AnyPool, Transaction};
use std::sync::Arc;

/// Outcome of [`MigrationExecutor::apply`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
	/// Descriptions of the applied operations, in order
	pub applied: Vec<String>,
	/// Number of SQL statements sent to the database
	pub statements: usize,
	/// The run only advanced the schema state
	pub faked: bool,
}

/// Runs migrations against a database pool.
///
/// # Examples
///
/// ```no_run
/// use sqlx::AnyPool;
/// use strata_migrations::{DatabaseType, Migration, MigrationExecutor, SchemaState};
/// use strata_migrations::operations::DropTable;
///
/// # async fn example() -> strata_migrations::Result<()> {
/// sqlx::any::install_default_drivers();
/// let pool = AnyPool::connect("postgresql://localhost/app").await?;
/// let executor = MigrationExecutor::new(pool, DatabaseType::Postgres);
///
/// let mut state = SchemaState::from_json(&std::fs::read_to_string("baseline.json").unwrap())?;
/// let migration = Migration::new("0002_drop_legacy").add_operation(DropTable::new("legacy"));
/// executor.apply(&migration, &mut state).await?;
/// # Ok(())
/// # }
/// ```
pub struct MigrationExecutor {
	pool: AnyPool,
	editor: Box<dyn SchemaEditor>,
	catalog: Arc<dyn CatalogIntrospector>,
	atomic: bool,
	schema: Option<String>,
	log_sql: bool,
	fake: bool,
}

impl MigrationExecutor {
	/// Create an executor emitting the dialect of `database_type`.
	///
	/// Foreign-key constraint names are looked up in the live catalog of
	/// `pool` unless another catalog is supplied with
	/// [`with_catalog`](Self::with_catalog).
	pub fn new(pool: AnyPool, database_type: DatabaseType) -> Self {
		let catalog = Arc::new(SqlxCatalogIntrospector::new(pool.clone(), database_type));
		Self {
			pool,
			editor: editor_for(database_type),
			catalog,
			atomic: true,
			schema: None,
			log_sql: false,
			fake: false,
		}
	}

	/// Connect using migration settings.
	///
	/// SQLite pools are limited to one connection so that in-memory
	/// databases are shared by every action of a run.
	#[cfg(feature = "settings")]
	pub async fn from_settings(settings: &strata_conf::MigrationSettings) -> Result<Self> {
		use sqlx::any::AnyPoolOptions;

		sqlx::any::install_default_drivers();
		let database_type = DatabaseType::from(settings.database.database_type());
		let mut options = AnyPoolOptions::new();
		if database_type == DatabaseType::Sqlite {
			options = options.max_connections(1).idle_timeout(None).max_lifetime(None);
		}
		let pool = options.connect(&settings.database.to_url()).await?;
		tracing::debug!(engine = %database_type, "connected migration pool");

		let mut executor = Self::new(pool, database_type)
			.with_atomic(settings.atomic)
			.with_log_sql(settings.log_sql);
		executor.schema = settings.schema.clone();
		Ok(executor)
	}

	pub fn with_catalog(mut self, catalog: Arc<dyn CatalogIntrospector>) -> Self {
		self.catalog = catalog;
		self
	}

	/// Allow transactions. Migrations marked non-atomic never use them.
	pub fn with_atomic(mut self, atomic: bool) -> Self {
		self.atomic = atomic;
		self
	}

	/// Search path used for migrations that do not select one themselves.
	pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
		self.schema = Some(schema.into());
		self
	}

	/// Log statements with their parameters inlined.
	pub fn with_log_sql(mut self, log_sql: bool) -> Self {
		self.log_sql = log_sql;
		self
	}

	/// Only advance the schema state, as if the database already matched.
	pub fn with_fake(mut self, fake: bool) -> Self {
		self.fake = fake;
		self
	}

	pub fn pool(&self) -> &AnyPool {
		&self.pool
	}

	pub fn editor(&self) -> &dyn SchemaEditor {
		self.editor.as_ref()
	}

	pub fn database_type(&self) -> DatabaseType {
		self.editor.database_type()
	}

	/// Plan `migration` without running it. `state` is left untouched.
	pub async fn plan(
		&self,
		migration: &Migration,
		state: &SchemaState,
	) -> Result<Vec<PlannedOperation>> {
		let mut planned_state = state.clone();
		self.plan_into(migration, &mut planned_state).await
	}

	async fn plan_into(
		&self,
		migration: &Migration,
		state: &mut SchemaState,
	) -> Result<Vec<PlannedOperation>> {
		let ctx = EmitContext::new(self.editor.as_ref()).with_catalog(self.catalog.as_ref());
		match (&migration.schema, &self.schema) {
			(None, Some(schema)) => {
				let migration = migration.clone().with_schema(schema);
				migration.plan(state, &ctx).await
			}
			_ => migration.plan(state, &ctx).await,
		}
	}

	/// Apply `migration`, advancing `state` on success.
	///
	/// On error `state` is left as it was. Actions already committed stay
	/// applied; the open transaction, if any, is rolled back.
	pub async fn apply(
		&self,
		migration: &Migration,
		state: &mut SchemaState,
	) -> Result<ExecutionResult> {
		if self.fake {
			let mut next = state.clone();
			for operation in &migration.operations {
				operation.state_forwards(&mut next)?;
			}
			tracing::info!(migration = %migration.name, "faked migration");
			*state = next;
			return Ok(ExecutionResult {
				applied: migration.operations.iter().map(|op| op.describe()).collect(),
				statements: 0,
				faked: true,
			});
		}

		let mut next = state.clone();
		let plan = self.plan_into(migration, &mut next).await?;

		let atomic = self.atomic && migration.atomic;
		let mut transaction: Option<Transaction<'static, Any>> = None;
		let mut result = ExecutionResult::default();

		let outcome = self
			.run_plan(migration, &plan, atomic, &mut transaction, &mut result)
			.await;

		match outcome {
			Ok(()) => {
				if let Some(open) = transaction.take() {
					open.commit().await?;
				}
				tracing::info!(
					migration = %migration.name,
					operations = result.applied.len(),
					statements = result.statements,
					"applied migration"
				);
				*state = next;
				Ok(result)
			}
			Err(error) => {
				if let Some(open) = transaction.take()
					&& let Err(rollback) = open.rollback().await
				{
					tracing::warn!(migration = %migration.name, error = %rollback, "rollback failed");
				}
				tracing::warn!(migration = %migration.name, error = %error, "migration failed");
				Err(error)
			}
		}
	}

	async fn run_plan(
		&self,
		migration: &Migration,
		plan: &[PlannedOperation],
		atomic: bool,
		transaction: &mut Option<Transaction<'static, Any>>,
		result: &mut ExecutionResult,
	) -> Result<()> {
		if !atomic {
			let mut conn = self.pool.acquire().await?;
			for operation in plan {
				for action in &operation.actions {
					self.run_action(&mut conn, migration, action, result).await?;
				}
				result.applied.push(operation.description.clone());
			}
			return Ok(());
		}

		for operation in plan {
			for action in &operation.actions {
				if action.outside_transaction() {
					if let Some(open) = transaction.take() {
						open.commit().await?;
					}
					let mut conn = self.pool.acquire().await?;
					self.run_action(&mut conn, migration, action, result).await?;
					continue;
				}

				let open = match transaction.take() {
					Some(open) => open,
					None => self.pool.begin().await?,
				};
				let open = transaction.insert(open);
				self.run_action(open, migration, action, result).await?;
			}
			result.applied.push(operation.description.clone());
		}
		Ok(())
	}

	async fn run_action(
		&self,
		conn: &mut AnyConnection,
		migration: &Migration,
		action: &Action,
		result: &mut ExecutionResult,
	) -> Result<()> {
		match action {
			Action::Sql(sql) => {
				if self.log_sql {
					tracing::info!(
						migration = %migration.name,
						sql = %sql.render_inline(self.editor.as_ref()),
						"executing"
					);
				} else {
					tracing::info!(
						migration = %migration.name,
						sql = %sql.sql,
						params = ?sql.params,
						"executing"
					);
				}
				execute_sql(conn, sql).await?;
				result.statements += 1;
			}
			Action::Callback(callback) => {
				tracing::info!(migration = %migration.name, "running callback");
				(callback.callback)(conn, &callback.state).await?;
			}
		}
		Ok(())
	}
}

/// Execute one statement, binding its parameters in order.
async fn execute_sql(conn: &mut AnyConnection, action: &SqlAction) -> Result<u64> {
	let mut query = sqlx::query(&action.sql);
	for param in &action.params {
		query = match param {
			SqlValue::Null => query.bind(None::<String>),
			SqlValue::Bool(value) => query.bind(*value),
			SqlValue::Int(value) => query.bind(*value),
			SqlValue::Float(value) => query.bind(*value),
			SqlValue::String(value) => query.bind(value.clone()),
			SqlValue::Bytes(value) => query.bind(value.clone()),
			SqlValue::Timestamp(value) => query.bind(value.to_rfc3339()),
		};
	}
	Ok(query.execute(conn).await?.rows_affected())
}

#[cfg(feature = "settings")]
impl From<strata_conf::DatabaseEngine> for DatabaseType {
	fn from(engine: strata_conf::DatabaseEngine) -> Self {
		match engine {
			strata_conf::DatabaseEngine::Postgresql => DatabaseType::Postgres,
			strata_conf::DatabaseEngine::Mysql => DatabaseType::Mysql,
			strata_conf::DatabaseEngine::Sqlite => DatabaseType::Sqlite,
		}
	}
}
