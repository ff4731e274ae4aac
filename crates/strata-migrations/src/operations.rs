//! Migration operations
//!
//! Operations are organized into four categories:
//!
//! - **Table operations** (`tables`): create, drop and rename tables
//! - **Column operations** (`columns`): add, change, remove and rename columns, toggle nullability
//! - **Index operations** (`indexes`): add and drop composite indexes
//! - **Special operations** (`special`): raw SQL and data-migration callbacks
//!
//! Every operation is applied in two steps. [`SchemaOperation::state_forwards`]
//! advances the logical [`SchemaState`] without touching the database, then
//! [`SchemaOperation::database_forwards`] turns the before and after views
//! into [`Action`]s.
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_migrations::prelude::*;
//! use strata_migrations::operations::{AddColumns, SchemaOperation};
//!
//! let mut state = SchemaState::from_tables([TableSchema::new("user")
//!     .column(ColumnDefinition::new("id", FieldType::AutoField).primary_key())]);
//!
//! let add = AddColumns::new("user", vec![
//!     ColumnDefinition::new("age", FieldType::Integer).default_value(5i64),
//! ]);
//! state.create_snapshot();
//! add.state_forwards(&mut state)?;
//! let before = state.pop_snapshot();
//!
//! let editor = PostgresSchemaEditor::new();
//! let actions = add.database_forwards(&EmitContext::new(&editor), &before, &state).await?;
//! assert_eq!(actions.len(), 3);
//! ```

pub mod columns;
pub mod indexes;
pub mod special;
pub mod tables;

pub use columns::{AddColumns, ChangeColumns, RemoveColumns, RenameColumn, SetNullable};
pub use indexes::{AddIndex, DropIndex};
pub use special::{RunCallback, RunRawAction};
pub use tables::{CreateTable, DropTable, RenameTable};

use crate::action::Action;
use crate::schema_editor::EmitContext;
use crate::state::SchemaState;
use crate::Result;
use async_trait::async_trait;

/// Two-phase protocol shared by every operation.
#[async_trait]
pub trait SchemaOperation: Send + Sync {
	/// Apply the logical effect to `state`.
	fn state_forwards(&self, state: &mut SchemaState) -> Result<()>;

	/// Actions moving the database from `from` to `to`.
	async fn database_forwards(
		&self,
		ctx: &EmitContext<'_>,
		from: &SchemaState,
		to: &SchemaState,
	) -> Result<Vec<Action>>;

	/// One-line human-readable summary
	fn describe(&self) -> String;
}

/// Closed set of migration steps.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
	CreateTable(CreateTable),
	DropTable(DropTable),
	AddColumns(AddColumns),
	ChangeColumns(ChangeColumns),
	RemoveColumns(RemoveColumns),
	RenameColumn(RenameColumn),
	RenameTable(RenameTable),
	AddIndex(AddIndex),
	DropIndex(DropIndex),
	SetNullable(SetNullable),
	RunRawAction(RunRawAction),
	RunCallback(RunCallback),
}

impl Operation {
	fn inner(&self) -> &dyn SchemaOperation {
		match self {
			Operation::CreateTable(op) => op,
			Operation::DropTable(op) => op,
			Operation::AddColumns(op) => op,
			Operation::ChangeColumns(op) => op,
			Operation::RemoveColumns(op) => op,
			Operation::RenameColumn(op) => op,
			Operation::RenameTable(op) => op,
			Operation::AddIndex(op) => op,
			Operation::DropIndex(op) => op,
			Operation::SetNullable(op) => op,
			Operation::RunRawAction(op) => op,
			Operation::RunCallback(op) => op,
		}
	}

	pub fn state_forwards(&self, state: &mut SchemaState) -> Result<()> {
		self.inner().state_forwards(state)
	}

	pub async fn database_forwards(
		&self,
		ctx: &EmitContext<'_>,
		from: &SchemaState,
		to: &SchemaState,
	) -> Result<Vec<Action>> {
		self.inner().database_forwards(ctx, from, to).await
	}

	pub fn describe(&self) -> String {
		self.inner().describe()
	}

	/// Logical name of the table the operation targets, if any.
	pub fn table(&self) -> Option<&str> {
		match self {
			Operation::CreateTable(op) => Some(&op.table.name),
			Operation::DropTable(op) => Some(&op.table),
			Operation::AddColumns(op) => Some(&op.table),
			Operation::ChangeColumns(op) => Some(&op.table),
			Operation::RemoveColumns(op) => Some(&op.table),
			Operation::RenameColumn(op) => Some(&op.table),
			Operation::RenameTable(op) => Some(&op.table),
			Operation::AddIndex(op) => Some(&op.table),
			Operation::DropIndex(op) => Some(&op.table),
			Operation::SetNullable(op) => Some(&op.table),
			Operation::RunRawAction(_) | Operation::RunCallback(_) => None,
		}
	}
}

macro_rules! impl_from_operation {
	($($variant:ident),* $(,)?) => {
		$(
			impl From<$variant> for Operation {
				fn from(op: $variant) -> Self {
					Operation::$variant(op)
				}
			}
		)*
	};
}

impl_from_operation!(
	CreateTable,
	DropTable,
	AddColumns,
	ChangeColumns,
	RemoveColumns,
	RenameColumn,
	RenameTable,
	AddIndex,
	DropIndex,
	SetNullable,
	RunRawAction,
	RunCallback,
);
