//! Identifier derivation and truncation helpers.

use crate::schema::ColumnDefinition;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Identifier limit used when deriving names in schema state. It is the
/// smallest limit of the supported backends, so derived names are valid
/// everywhere.
pub const COMMON_IDENTIFIER_LIMIT: usize = 63;

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w]+").unwrap());

/// Shorten `name` to at most `max_len` characters.
///
/// Names within the limit are returned unchanged. Longer names keep a
/// prefix of `max_len - 8` characters followed by `_` and the first seven
/// hex digits of the SHA-256 of the full name.
///
/// ```
/// use strata_migrations::naming::truncate_name;
///
/// let long = "a".repeat(80);
/// let short = truncate_name(&long, 63);
/// assert_eq!(short.len(), 63);
/// assert_eq!(short, truncate_name(&long, 63));
/// assert_eq!(truncate_name("user_name", 63), "user_name");
/// ```
pub fn truncate_name(name: &str, max_len: usize) -> String {
	if name.len() <= max_len {
		return name.to_string();
	}
	let digest = Sha256::digest(name.as_bytes());
	let hash: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
	let mut cut = max_len.saturating_sub(8);
	while !name.is_char_boundary(cut) {
		cut -= 1;
	}
	format!("{}_{}", &name[..cut], &hash[..7])
}

/// Append `_id` unless the name already ends with it.
pub fn fk_postfix(name: &str) -> String {
	if name.ends_with("_id") {
		name.to_string()
	} else {
		format!("{}_id", name)
	}
}

/// Derived index name: `{table}_{columns joined by _}`, with non-word
/// characters removed from the column part.
pub fn index_name(table: &str, columns: &[String]) -> String {
	let column_part = NON_WORD.replace_all(&columns.join("_"), "").into_owned();
	truncate_name(
		&format!("{}_{}", table, column_part),
		COMMON_IDENTIFIER_LIMIT,
	)
}

/// Name used when a foreign-key constraint is created explicitly.
pub fn fk_constraint_name(table: &str, column: &str, target: &str, max_len: usize) -> String {
	truncate_name(
		&format!("fk_{}_{}_refs_{}", table, column, target),
		max_len,
	)
}

/// Physical name a column gets when its logical name changes from `old` to `new`.
///
/// Returns `None` when the physical name is unrelated to the logical one and
/// must be kept as is.
pub fn resolve_renamed_column(column: &ColumnDefinition, old: &str, new: &str) -> Option<String> {
	if column.references.is_some() && column.column_name == fk_postfix(old) {
		return Some(fk_postfix(new));
	}
	if column.column_name == old {
		return Some(new.to_string());
	}
	None
}
