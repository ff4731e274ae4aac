//! Schema diffing
//!
//! Compares target table definitions against a recorded baseline and
//! produces the operations that turn one into the other. Diffing is pure:
//! it never reads the database and its output only depends on its input.

use crate::operations::{
	AddColumns, AddIndex, ChangeColumns, CreateTable, DropIndex, DropTable, Operation,
	RemoveColumns,
};
use crate::fields::FieldType;
use crate::schema::{ColumnDefinition, ForeignKeyReference, TableSchema};
use crate::value::SqlValue;
use crate::{MigrationError, Result};
use indexmap::IndexMap;
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use std::collections::BTreeSet;

/// The parts of a column that, when different, require a ChangeColumns.
#[derive(PartialEq)]
struct ColumnSignature<'a> {
	column_name: &'a str,
	field_type: &'a FieldType,
	null: bool,
	default: Option<&'a SqlValue>,
	server_default: Option<&'a str>,
	index: (bool, bool),
	references: Option<&'a ForeignKeyReference>,
}

impl<'a> From<&'a ColumnDefinition> for ColumnSignature<'a> {
	fn from(column: &'a ColumnDefinition) -> Self {
		Self {
			column_name: &column.column_name,
			field_type: &column.field_type,
			null: column.null,
			default: column.literal_default(),
			server_default: column.server_default.as_deref(),
			index: (column.index && !column.unique, column.unique),
			references: column.references.as_ref(),
		}
	}
}

/// Operations turning `baseline` into `target`.
///
/// The result is ordered: index drops, added columns, removed columns,
/// changed columns, then index additions.
///
/// # Examples
///
/// ```
/// use strata_migrations::{diff_table, ColumnDefinition, FieldType, Operation, TableSchema};
///
/// let baseline = TableSchema::new("user")
///     .column(ColumnDefinition::new("id", FieldType::AutoField).primary_key());
/// let target = baseline
///     .clone()
///     .column(ColumnDefinition::new("age", FieldType::Integer).null());
///
/// let ops = diff_table(&target, &baseline);
/// assert!(matches!(ops.as_slice(), [Operation::AddColumns(_)]));
/// assert!(diff_table(&target, &target).is_empty());
/// ```
pub fn diff_table(target: &TableSchema, baseline: &TableSchema) -> Vec<Operation> {
	let table = &target.name;
	let mut operations = Vec::new();

	for index in &baseline.indexes {
		if !target.indexes.iter().any(|i| i.same_structure(index)) {
			operations.push(DropIndex::new(table, baseline.index_name(index)).into());
		}
	}

	let added: Vec<ColumnDefinition> = target
		.columns
		.values()
		.filter(|c| baseline.get_column(&c.name).is_none())
		.cloned()
		.collect();
	if !added.is_empty() {
		operations.push(AddColumns::new(table, added).into());
	}

	let removed: Vec<&str> = baseline
		.columns
		.keys()
		.filter(|name| target.get_column(name).is_none())
		.map(String::as_str)
		.collect();
	if !removed.is_empty() {
		operations.push(RemoveColumns::new(table, removed).into());
	}

	let changed: Vec<ColumnDefinition> = target
		.columns
		.values()
		.filter(|c| {
			baseline
				.get_column(&c.name)
				.is_some_and(|old| ColumnSignature::from(old) != ColumnSignature::from(*c))
		})
		.cloned()
		.collect();
	if !changed.is_empty() {
		operations.push(ChangeColumns::new(table, changed).into());
	}

	for index in &target.indexes {
		if !baseline.indexes.iter().any(|i| i.same_structure(index)) {
			operations.push(AddIndex::new(table, index.clone()).into());
		}
	}

	tracing::debug!(table = %table, operations = operations.len(), "diffed table");
	operations
}

/// Operations turning the `baseline` tables into the `target` tables.
///
/// Tables are matched by logical name, case-insensitively. New tables are
/// created first in foreign-key dependency order, existing tables are then
/// altered in the same order, and dropped tables come last, dependents first.
///
/// Foreign keys between existing tables may form cycles. New tables that
/// reference each other are created with the nullable foreign-key column
/// that closes the cycle held back; it is added once its target exists. A
/// cycle of new tables held together by NOT NULL foreign keys only fails
/// with [`MigrationError::CircularDependency`].
pub fn diff_schema(target: &[TableSchema], baseline: &[TableSchema]) -> Result<Vec<Operation>> {
	let baseline_by_key: IndexMap<String, &TableSchema> = baseline
		.iter()
		.map(|t| (t.name.to_lowercase(), t))
		.collect();
	let target_keys: BTreeSet<String> = target.iter().map(|t| t.name.to_lowercase()).collect();
	let (existing, created): (Vec<&TableSchema>, Vec<&TableSchema>) = target
		.iter()
		.partition(|t| baseline_by_key.contains_key(&t.name.to_lowercase()));

	let mut operations: Vec<Operation> = Vec::new();
	let created = DependencyGraph::new(created);
	let order = created.order();
	let position: IndexMap<String, usize> = order
		.iter()
		.enumerate()
		.map(|(i, t)| (t.name.to_lowercase(), i))
		.collect();
	let mut deferred = Vec::new();
	for (i, table) in order.iter().enumerate() {
		let forward: Vec<&ColumnDefinition> = table
			.columns
			.values()
			.filter(|c| {
				c.references
					.as_ref()
					.and_then(|r| position.get(&r.table.to_lowercase()))
					.is_some_and(|p| *p > i)
			})
			.collect();
		if forward.is_empty() {
			operations.push(CreateTable::new((*table).clone()).into());
			continue;
		}
		if !forward.iter().all(|c| is_deferrable(table, c)) {
			return Err(MigrationError::CircularDependency {
				cycle: created.cycle_through(&table.name.to_lowercase()),
			});
		}
		tracing::debug!(
			table = %table.name,
			columns = forward.len(),
			"deferring foreign-key columns to break a cycle"
		);
		let (head, tail) = defer_columns(table, &forward);
		operations.push(CreateTable::new(head).into());
		deferred.extend(tail);
	}
	operations.extend(deferred);

	for table in DependencyGraph::new(existing).order() {
		operations.extend(diff_table(table, baseline_by_key[&table.name.to_lowercase()]));
	}

	let dropped = DependencyGraph::new(
		baseline
			.iter()
			.filter(|t| !target_keys.contains(&t.name.to_lowercase())),
	);
	let cyclic: BTreeSet<&str> = dropped.cycles().into_iter().flatten().collect();
	for table in dropped.order().into_iter().rev() {
		// Tables in a cycle are still referenced when dropped.
		let cascade = cyclic.contains(table.name.to_lowercase().as_str());
		operations.push(DropTable::new(&table.name).cascade(cascade).into());
	}

	Ok(operations)
}

/// Whether `column` can be added after its table is created.
fn is_deferrable(table: &TableSchema, column: &ColumnDefinition) -> bool {
	column.null
		&& !column.primary_key
		&& !table
			.primary_key
			.as_ref()
			.is_some_and(|pk| pk.columns.contains(&column.name))
}

/// Split `table` into the part created now and the operations adding
/// `columns`, with the indexes covering them, afterwards.
fn defer_columns(table: &TableSchema, columns: &[&ColumnDefinition]) -> (TableSchema, Vec<Operation>) {
	let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
	let mut head = table.clone();
	head.columns.retain(|name, _| !names.contains(&name.as_str()));
	let (later, now): (Vec<_>, Vec<_>) = std::mem::take(&mut head.indexes)
		.into_iter()
		.partition(|i| i.columns.iter().any(|c| names.contains(&c.as_str())));
	head.indexes = now;

	let added = columns.iter().map(|c| (*c).clone()).collect();
	let mut operations: Vec<Operation> = vec![AddColumns::new(&table.name, added).into()];
	operations.extend(later.into_iter().map(|i| AddIndex::new(&table.name, i).into()));
	(head, operations)
}

/// Tables keyed by lower-cased logical name, with an edge
/// `dependency -> dependent` for every reference between them.
/// Self-references and references to other tables are ignored.
struct DependencyGraph<'t> {
	tables: IndexMap<String, &'t TableSchema>,
	edges: DiGraphMap<usize, ()>,
}

impl<'t> DependencyGraph<'t> {
	fn new(tables: impl IntoIterator<Item = &'t TableSchema>) -> Self {
		let tables: IndexMap<String, &TableSchema> = tables
			.into_iter()
			.map(|t| (t.name.to_lowercase(), t))
			.collect();
		let mut edges = DiGraphMap::new();
		for (node, table) in tables.values().enumerate() {
			edges.add_node(node);
			for dependency in table.dependencies() {
				if let Some(dependency) = tables.get_index_of(&dependency) {
					edges.add_edge(dependency, node, ());
				}
			}
		}
		Self { tables, edges }
	}

	fn key(&self, node: usize) -> &str {
		self.tables
			.get_index(node)
			.map(|(key, _)| key.as_str())
			.unwrap_or_default()
	}

	/// Strongly connected groups of two or more tables, names sorted.
	fn cycles(&self) -> Vec<Vec<&str>> {
		let mut cycles: Vec<Vec<&str>> = tarjan_scc(&self.edges)
			.into_iter()
			.filter(|component| component.len() > 1)
			.map(|component| {
				let mut names: Vec<&str> = component.into_iter().map(|n| self.key(n)).collect();
				names.sort_unstable();
				names
			})
			.collect();
		cycles.sort();
		cycles
	}

	fn cycle_through(&self, key: &str) -> String {
		self.cycles()
			.into_iter()
			.find(|cycle| cycle.contains(&key))
			.map(|cycle| cycle.join(" -> "))
			.unwrap_or_else(|| key.to_string())
	}

	/// Dependency order with ties broken alphabetically.
	///
	/// When every remaining table waits on another one, a table of a cycle is
	/// placed early: the first whose pending references are all deferrable,
	/// or the first of all when none is.
	fn order(&self) -> Vec<&'t TableSchema> {
		let cyclic: BTreeSet<&str> = self.cycles().into_iter().flatten().collect();
		let mut pending: IndexMap<usize, usize> = self
			.edges
			.nodes()
			.map(|n| (n, self.edges.neighbors_directed(n, Direction::Incoming).count()))
			.collect();
		let mut ready: BTreeSet<&str> = pending
			.iter()
			.filter(|(_, degree)| **degree == 0)
			.map(|(node, _)| self.key(*node))
			.collect();

		let mut sorted = Vec::with_capacity(self.tables.len());
		while !pending.is_empty() {
			let Some(key) = ready.pop_first().or_else(|| self.release(&pending, &cyclic)) else {
				break;
			};
			let Some(node) = self.tables.get_index_of(key) else {
				break;
			};
			pending.swap_remove(&node);
			sorted.push(self.tables[node]);
			for dependent in self.edges.neighbors_directed(node, Direction::Outgoing) {
				if let Some(degree) = pending.get_mut(&dependent) {
					*degree -= 1;
					if *degree == 0 {
						ready.insert(self.key(dependent));
					}
				}
			}
		}
		sorted
	}

	/// Cycle member to place while its references are still pending.
	fn release(&self, pending: &IndexMap<usize, usize>, cyclic: &BTreeSet<&str>) -> Option<&str> {
		let waiting: BTreeSet<&str> = pending.keys().map(|n| self.key(*n)).collect();
		let deferrable = |key: &str| {
			let table = self.tables[key];
			table
				.columns
				.values()
				.filter(|c| {
					c.references.as_ref().is_some_and(|r| {
						let target = r.table.to_lowercase();
						target != key && waiting.contains(target.as_str())
					})
				})
				.all(|c| is_deferrable(table, c))
		};
		let mut candidates = waiting.iter().filter(|key| cyclic.contains(*key));
		candidates
			.clone()
			.find(|key| deferrable(**key))
			.or_else(|| candidates.next())
			.copied()
	}
}

/// Order tables so that every table comes after the tables it references.
///
/// Ties are broken alphabetically. Self-references and references to tables
/// outside `tables` are ignored. A cycle fails with
/// [`MigrationError::CircularDependency`]; [`diff_schema`] breaks cycles
/// instead where it can.
///
/// # Examples
///
/// ```
/// use strata_migrations::{sort_tables_by_dependency, ColumnDefinition, TableSchema};
///
/// let post = TableSchema::new("post").column(ColumnDefinition::foreign_key("author", "user"));
/// let user = TableSchema::new("user");
/// let tables = [post, user];
/// let sorted = sort_tables_by_dependency(&tables).unwrap();
/// assert_eq!(sorted[0].name, "user");
/// assert_eq!(sorted[1].name, "post");
/// ```
pub fn sort_tables_by_dependency(tables: &[TableSchema]) -> Result<Vec<&TableSchema>> {
	let graph = DependencyGraph::new(tables);
	if let Some(cycle) = graph.cycles().first() {
		return Err(MigrationError::CircularDependency {
			cycle: cycle.join(" -> "),
		});
	}
	Ok(graph.order())
}
