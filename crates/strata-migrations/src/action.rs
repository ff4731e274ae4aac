//! Concrete units of database work produced by operations.

use crate::schema_editor::SchemaEditor;
use crate::state::SchemaState;
use crate::value::SqlValue;
use crate::Result;
use futures::future::BoxFuture;
use sqlx::AnyConnection;
use std::fmt;
use std::sync::Arc;

/// Deferred data migration step. It receives the live connection and the
/// schema state as it was before the owning operation.
pub type CallbackFn = Arc<
	dyn for<'c> Fn(&'c mut AnyConnection, &'c SchemaState) -> BoxFuture<'c, Result<()>>
		+ Send
		+ Sync,
>;

/// One SQL statement with positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlAction {
	pub sql: String,
	pub params: Vec<SqlValue>,
	/// Must run outside any open transaction, e.g. `CREATE INDEX CONCURRENTLY`
	pub outside_transaction: bool,
}

impl SqlAction {
	pub fn new(sql: impl Into<String>) -> Self {
		Self {
			sql: sql.into(),
			params: Vec::new(),
			outside_transaction: false,
		}
	}

	pub fn with_params(mut self, params: Vec<SqlValue>) -> Self {
		self.params = params;
		self
	}

	pub fn outside_transaction(mut self, outside: bool) -> Self {
		self.outside_transaction = outside;
		self
	}

	/// Render the statement with its parameters inlined as dialect literals.
	///
	/// Placeholders are resolved in a single pass over the original text, so
	/// quoted sections and already inlined values are never rewritten.
	pub fn render_inline(&self, editor: &dyn SchemaEditor) -> String {
		let positional = editor.placeholder(1) != editor.placeholder(2);
		let mut rendered = String::with_capacity(self.sql.len());
		let mut chars = self.sql.chars().peekable();
		let mut quote = None;
		let mut next = 0;

		while let Some(c) = chars.next() {
			if let Some(open) = quote {
				rendered.push(c);
				if c == open {
					quote = None;
				}
				continue;
			}
			match c {
				'\'' | '"' | '`' => {
					quote = Some(c);
					rendered.push(c);
				}
				'$' if positional => {
					let mut digits = String::new();
					while let Some(d) = chars.next_if(char::is_ascii_digit) {
						digits.push(d);
					}
					let value = digits
						.parse::<usize>()
						.ok()
						.and_then(|n| n.checked_sub(1))
						.and_then(|i| self.params.get(i));
					match value {
						Some(value) => rendered.push_str(&editor.literal(value)),
						None => {
							rendered.push('$');
							rendered.push_str(&digits);
						}
					}
				}
				'?' if !positional => {
					match self.params.get(next) {
						Some(value) => rendered.push_str(&editor.literal(value)),
						None => rendered.push('?'),
					}
					next += 1;
				}
				_ => rendered.push(c),
			}
		}
		rendered
	}
}

/// Callback paired with the state it will be handed.
#[derive(Clone)]
pub struct CallbackAction {
	pub callback: CallbackFn,
	pub state: SchemaState,
}

impl fmt::Debug for CallbackAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CallbackAction")
			.field("tables", &self.state.len())
			.finish_non_exhaustive()
	}
}

#[derive(Debug, Clone)]
pub enum Action {
	Sql(SqlAction),
	Callback(CallbackAction),
}

impl Action {
	pub fn sql(sql: impl Into<String>) -> Self {
		Action::Sql(SqlAction::new(sql))
	}

	pub fn sql_with_params(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
		Action::Sql(SqlAction::new(sql).with_params(params))
	}

	pub fn as_sql(&self) -> Option<&SqlAction> {
		match self {
			Action::Sql(action) => Some(action),
			Action::Callback(_) => None,
		}
	}

	pub fn outside_transaction(&self) -> bool {
		matches!(self, Action::Sql(SqlAction { outside_transaction: true, .. }))
	}

	/// Human-readable form for dry runs and logs.
	pub fn render_inline(&self, editor: &dyn SchemaEditor) -> String {
		match self {
			Action::Sql(action) => action.render_inline(editor),
			Action::Callback(_) => "-- callback".to_string(),
		}
	}
}

impl From<SqlAction> for Action {
	fn from(action: SqlAction) -> Self {
		Action::Sql(action)
	}
}
