//! Special operations
//!
//! Raw SQL and data-migration callbacks. Neither changes the schema state.

use super::SchemaOperation;
use crate::action::{Action, CallbackAction, CallbackFn, SqlAction};
use crate::schema_editor::EmitContext;
use crate::state::SchemaState;
use crate::value::SqlValue;
use crate::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::AnyConnection;
use std::fmt;
use std::sync::Arc;

/// Run a raw SQL statement
///
/// # Example
///
/// ```rust
/// use strata_migrations::operations::RunRawAction;
///
/// let op = RunRawAction::new("UPDATE \"user\" SET \"active\" = $1")
///     .params(vec![true.into()]);
/// assert_eq!(op.params.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RunRawAction {
	pub sql: String,
	pub params: Vec<SqlValue>,
	pub outside_transaction: bool,
}

impl RunRawAction {
	pub fn new(sql: impl Into<String>) -> Self {
		Self {
			sql: sql.into(),
			params: Vec::new(),
			outside_transaction: false,
		}
	}

	pub fn params(mut self, params: Vec<SqlValue>) -> Self {
		self.params = params;
		self
	}

	pub fn outside_transaction(mut self, outside: bool) -> Self {
		self.outside_transaction = outside;
		self
	}
}

#[async_trait]
impl SchemaOperation for RunRawAction {
	fn state_forwards(&self, _state: &mut SchemaState) -> Result<()> {
		Ok(())
	}

	async fn database_forwards(
		&self,
		_ctx: &EmitContext<'_>,
		_from: &SchemaState,
		_to: &SchemaState,
	) -> Result<Vec<Action>> {
		Ok(vec![
			SqlAction::new(self.sql.clone())
				.with_params(self.params.clone())
				.outside_transaction(self.outside_transaction)
				.into(),
		])
	}

	fn describe(&self) -> String {
		let first_line = self.sql.lines().next().unwrap_or_default();
		format!("Run SQL: {}", first_line.trim())
	}
}

/// Run a data-migration callback against the live connection.
///
/// The callback receives the schema state as it was before this operation.
#[derive(Clone)]
pub struct RunCallback {
	pub callback: CallbackFn,
	pub description: Option<String>,
}

impl RunCallback {
	pub fn new<F>(callback: F) -> Self
	where
		F: for<'c> Fn(&'c mut AnyConnection, &'c SchemaState) -> BoxFuture<'c, Result<()>>
			+ Send
			+ Sync
			+ 'static,
	{
		Self {
			callback: Arc::new(callback),
			description: None,
		}
	}

	pub fn description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}
}

impl fmt::Debug for RunCallback {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RunCallback")
			.field("description", &self.description)
			.finish_non_exhaustive()
	}
}

impl PartialEq for RunCallback {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.callback, &other.callback) && self.description == other.description
	}
}

#[async_trait]
impl SchemaOperation for RunCallback {
	fn state_forwards(&self, _state: &mut SchemaState) -> Result<()> {
		Ok(())
	}

	async fn database_forwards(
		&self,
		_ctx: &EmitContext<'_>,
		from: &SchemaState,
		_to: &SchemaState,
	) -> Result<Vec<Action>> {
		Ok(vec![Action::Callback(CallbackAction {
			callback: Arc::clone(&self.callback),
			state: from.clone(),
		})])
	}

	fn describe(&self) -> String {
		match &self.description {
			Some(description) => format!("Run callback: {}", description),
			None => "Run callback".to_string(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backends::SqliteSchemaEditor;
	use futures::FutureExt;

	#[tokio::test]
	async fn test_raw_action_keeps_params() {
		let editor = SqliteSchemaEditor::new();
		let state = SchemaState::new();
		let op = RunRawAction::new("DELETE FROM \"user\" WHERE \"id\" = ?").params(vec![7i64.into()]);
		let actions = op
			.database_forwards(&EmitContext::new(&editor), &state, &state)
			.await
			.unwrap();
		let sql = actions[0].as_sql().unwrap();
		assert_eq!(sql.params, vec![SqlValue::Int(7)]);
		assert_eq!(
			actions[0].render_inline(&editor),
			"DELETE FROM \"user\" WHERE \"id\" = 7"
		);
	}

	#[test]
	fn test_callback_equality_is_identity() {
		let a = RunCallback::new(|_conn, _state| async { Ok(()) }.boxed());
		let b = RunCallback::new(|_conn, _state| async { Ok(()) }.boxed());
		assert_eq!(a, a.clone());
		assert_ne!(a, b);
	}

	#[test]
	fn test_describe_uses_first_line() {
		let op = RunRawAction::new("UPDATE \"user\"\nSET \"active\" = 1");
		assert_eq!(op.describe(), "Run SQL: UPDATE \"user\"");
	}
}
