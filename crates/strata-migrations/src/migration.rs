//! Migration definition and planning

use crate::action::Action;
use crate::operations::Operation;
use crate::schema_editor::EmitContext;
use crate::state::SchemaState;
use crate::Result;

/// A named, ordered list of operations
#[derive(Debug, Clone, PartialEq)]
pub struct Migration {
	/// Migration name (e.g., "0001_initial")
	pub name: String,

	/// Operations to apply, in order
	pub operations: Vec<Operation>,

	/// Whether actions run inside transactions
	pub atomic: bool,

	/// Search path selected before the first operation (PostgreSQL)
	pub schema: Option<String>,
}

/// Actions emitted for one operation, with a readable summary
#[derive(Debug, Clone)]
pub struct PlannedOperation {
	pub description: String,
	pub actions: Vec<Action>,
}

impl Migration {
	/// Create a new, atomic migration
	///
	/// # Examples
	///
	/// ```
	/// use strata_migrations::Migration;
	///
	/// let migration = Migration::new("0001_initial");
	/// assert_eq!(migration.name, "0001_initial");
	/// assert!(migration.atomic);
	/// assert!(migration.operations.is_empty());
	/// ```
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			operations: Vec::new(),
			atomic: true,
			schema: None,
		}
	}

	/// Add an operation to this migration
	///
	/// # Examples
	///
	/// ```
	/// use strata_migrations::Migration;
	/// use strata_migrations::operations::DropTable;
	///
	/// let migration = Migration::new("0002_drop_legacy").add_operation(DropTable::new("legacy"));
	/// assert_eq!(migration.operations.len(), 1);
	/// ```
	pub fn add_operation(mut self, operation: impl Into<Operation>) -> Self {
		self.operations.push(operation.into());
		self
	}

	/// Append several operations, e.g. the output of [`diff_table`](crate::diff_table).
	pub fn operations(mut self, operations: impl IntoIterator<Item = Operation>) -> Self {
		self.operations.extend(operations);
		self
	}

	/// Set whether this migration should run in a transaction
	pub fn atomic(mut self, atomic: bool) -> Self {
		self.atomic = atomic;
		self
	}

	/// Select a schema (search path) before running the operations.
	pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
		self.schema = Some(schema.into());
		self
	}

	/// Plan every operation against `state`, advancing it.
	///
	/// Each operation sees the state left by the previous one. On error the
	/// state reflects the operations planned so far, including the failing
	/// operation's state change when that succeeded.
	pub async fn plan(
		&self,
		state: &mut SchemaState,
		ctx: &EmitContext<'_>,
	) -> Result<Vec<PlannedOperation>> {
		let mut planned = Vec::with_capacity(self.operations.len() + 1);

		if let Some(schema) = &self.schema {
			planned.push(PlannedOperation {
				description: format!("Select schema {}", schema),
				actions: ctx.editor.select_schema(schema)?,
			});
		}

		// The database as it stands before this migration, under the logical
		// names the operations use.
		let mut origin = ctx.origin.unwrap_or(&*state).clone();

		for operation in &self.operations {
			state.create_snapshot();
			if let Err(e) = operation.state_forwards(state) {
				state.pop_snapshot();
				return Err(e);
			}
			let from = state.pop_snapshot();
			let actions = operation
				.database_forwards(&ctx.with_origin(&origin), &from, state)
				.await?;
			if let Operation::RenameColumn(rename) = operation {
				rename.rename_key_in(&mut origin)?;
			}

			let description = operation.describe();
			tracing::debug!(
				migration = %self.name,
				operation = %description,
				actions = actions.len(),
				"planned operation"
			);
			planned.push(PlannedOperation {
				description,
				actions,
			});
		}
		Ok(planned)
	}
}
