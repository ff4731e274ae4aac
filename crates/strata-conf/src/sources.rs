//! Configuration sources for layered settings
//!
//! Sources are merged in priority order: environment variables > .env
//! files > TOML files > defaults. Environment-style keys use `__` to reach
//! nested tables, so `STRATA_DATABASE__NAME` sets `database.name`.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;

/// Trait for configuration sources
pub trait ConfigSource: Send + Sync {
	/// Load configuration from this source
	fn load(&self) -> Result<IndexMap<String, Value>, SourceError>;

	/// Get the priority of this source (higher = more important)
	fn priority(&self) -> u8;

	/// Get a description of this source
	fn description(&self) -> String;
}

/// Error type for configuration sources
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Parse error: {0}")]
	Parse(String),

	#[error("TOML error: {0}")]
	Toml(#[from] toml::de::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("Dotenv error: {0}")]
	DotEnv(#[from] dotenv::Error),
}

/// Typed value of an environment string: integers and booleans are
/// recognized, anything else stays a string.
fn parse_env_value(value: String) -> Value {
	if let Ok(num) = value.parse::<i64>() {
		return Value::Number(num.into());
	}
	match value.trim().to_lowercase().as_str() {
		"true" | "yes" | "on" => Value::Bool(true),
		"false" | "no" | "off" => Value::Bool(false),
		_ => Value::String(value),
	}
}

/// Merge `overlay` into `base`. Tables are merged key by key, any other
/// value is replaced.
pub(crate) fn merge_value(base: &mut Value, overlay: Value) {
	match (base, overlay) {
		(Value::Object(base), Value::Object(overlay)) => {
			for (key, value) in overlay {
				match base.get_mut(&key) {
					Some(existing) => merge_value(existing, value),
					None => {
						base.insert(key, value);
					}
				}
			}
		}
		(base, overlay) => *base = overlay,
	}
}

/// Insert `value` under a `__`-separated, lower-cased key path.
fn insert_env_key(config: &mut IndexMap<String, Value>, key: &str, value: Value) {
	let lower = key.to_lowercase();
	let mut path: Vec<&str> = lower.split("__").collect();
	let head = path.remove(0);
	let nested = path.into_iter().rev().fold(value, |inner, part| {
		let mut map = Map::new();
		map.insert(part.to_string(), inner);
		Value::Object(map)
	});
	match config.get_mut(head) {
		Some(existing) => merge_value(existing, nested),
		None => {
			config.insert(head.to_string(), nested);
		}
	}
}

fn filter_prefixed(
	vars: impl Iterator<Item = (String, String)>,
	prefix: Option<&str>,
) -> IndexMap<String, Value> {
	let mut config = IndexMap::new();
	for (key, value) in vars {
		let key = match prefix {
			Some(prefix) => match key.strip_prefix(prefix) {
				Some(stripped) => stripped.to_string(),
				None => continue,
			},
			None => key,
		};
		insert_env_key(&mut config, &key, parse_env_value(value));
	}
	config
}

/// Environment variable configuration source
pub struct EnvSource {
	prefix: Option<String>,
}

impl EnvSource {
	/// Create a source reading every environment variable
	pub fn new() -> Self {
		Self { prefix: None }
	}

	/// Only read variables starting with `prefix`, which is stripped
	///
	/// # Examples
	///
	/// ```
	/// use strata_conf::sources::EnvSource;
	///
	/// let source = EnvSource::new().with_prefix("STRATA_");
	/// ```
	pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.prefix = Some(prefix.into());
		self
	}
}

impl Default for EnvSource {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigSource for EnvSource {
	fn load(&self) -> Result<IndexMap<String, Value>, SourceError> {
		Ok(filter_prefixed(std::env::vars(), self.prefix.as_deref()))
	}

	fn priority(&self) -> u8 {
		100
	}

	fn description(&self) -> String {
		match &self.prefix {
			Some(prefix) => format!("Environment variables (prefix: {})", prefix),
			None => "Environment variables".to_string(),
		}
	}
}

/// .env file configuration source
///
/// The file is parsed with `dotenv` but not exported into the process
/// environment. A missing file yields no values.
pub struct DotEnvSource {
	path: PathBuf,
	prefix: Option<String>,
}

impl DotEnvSource {
	pub fn new() -> Self {
		Self {
			path: PathBuf::from(".env"),
			prefix: None,
		}
	}

	pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.path = path.into();
		self
	}

	pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.prefix = Some(prefix.into());
		self
	}
}

impl Default for DotEnvSource {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigSource for DotEnvSource {
	fn load(&self) -> Result<IndexMap<String, Value>, SourceError> {
		if !self.path.exists() {
			return Ok(IndexMap::new());
		}
		let vars = dotenv::from_path_iter(&self.path)?.collect::<Result<Vec<_>, _>>()?;
		Ok(filter_prefixed(vars.into_iter(), self.prefix.as_deref()))
	}

	fn priority(&self) -> u8 {
		90
	}

	fn description(&self) -> String {
		format!(".env file: {}", self.path.display())
	}
}

/// TOML file configuration source
pub struct TomlFileSource {
	path: PathBuf,
}

impl TomlFileSource {
	/// Create a new TOML file configuration source
	///
	/// # Examples
	///
	/// ```
	/// use strata_conf::sources::TomlFileSource;
	///
	/// let source = TomlFileSource::new("strata.toml");
	/// ```
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}
}

impl ConfigSource for TomlFileSource {
	fn load(&self) -> Result<IndexMap<String, Value>, SourceError> {
		if !self.path.exists() {
			return Ok(IndexMap::new());
		}

		let content = fs::read_to_string(&self.path)?;
		let toml_value: toml::Value = toml::from_str(&content)?;
		let json_value = serde_json::to_value(toml_value)?;

		let map = json_value
			.as_object()
			.ok_or_else(|| SourceError::Parse("Expected table at root".to_string()))?;
		Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
	}

	fn priority(&self) -> u8 {
		50
	}

	fn description(&self) -> String {
		format!("TOML file: {}", self.path.display())
	}
}

/// Default values configuration source
pub struct DefaultSource {
	values: IndexMap<String, Value>,
}

impl DefaultSource {
	pub fn new() -> Self {
		Self {
			values: IndexMap::new(),
		}
	}

	/// Add a default value for a configuration key
	///
	/// # Examples
	///
	/// ```
	/// use strata_conf::sources::DefaultSource;
	/// use serde_json::Value;
	///
	/// let source = DefaultSource::new().with_value("atomic", Value::Bool(true));
	/// ```
	pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
		self.values.insert(key.into(), value);
		self
	}
}

impl Default for DefaultSource {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigSource for DefaultSource {
	fn load(&self) -> Result<IndexMap<String, Value>, SourceError> {
		Ok(self.values.clone())
	}

	fn priority(&self) -> u8 {
		0
	}

	fn description(&self) -> String {
		"Default values".to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;
	use std::io::Write;
	use tempfile::TempDir;

	#[rstest]
	#[case("42", json!(42))]
	#[case("true", json!(true))]
	#[case("off", json!(false))]
	#[case("tenant", json!("tenant"))]
	fn test_parse_env_value(#[case] raw: &str, #[case] expected: Value) {
		assert_eq!(parse_env_value(raw.to_string()), expected);
	}

	#[test]
	fn test_nested_keys() {
		let vars = vec![
			("APP_DATABASE__ENGINE".to_string(), "postgresql".to_string()),
			("APP_DATABASE__PORT".to_string(), "5432".to_string()),
			("APP_ATOMIC".to_string(), "false".to_string()),
			("OTHER".to_string(), "ignored".to_string()),
		];
		let config = filter_prefixed(vars.into_iter(), Some("APP_"));
		assert_eq!(
			config.get("database"),
			Some(&json!({"engine": "postgresql", "port": 5432}))
		);
		assert_eq!(config.get("atomic"), Some(&json!(false)));
		assert!(!config.contains_key("other"));
	}

	#[test]
	fn test_toml_source() {
		let temp_dir = TempDir::new().unwrap();
		let path = temp_dir.path().join("strata.toml");
		let mut file = fs::File::create(&path).unwrap();
		writeln!(
			file,
			r#"
schema = "tenant"

[database]
engine = "sqlite"
name = "app.db"
"#
		)
		.unwrap();

		let config = TomlFileSource::new(&path).load().unwrap();
		assert_eq!(config.get("schema"), Some(&json!("tenant")));
		assert_eq!(
			config.get("database"),
			Some(&json!({"engine": "sqlite", "name": "app.db"}))
		);
	}

	#[test]
	fn test_dotenv_source_does_not_touch_process_env() {
		let temp_dir = TempDir::new().unwrap();
		let path = temp_dir.path().join(".env");
		fs::write(&path, "STRATA_TEST_DOTENV_ONLY=1\nSTRATA_LOG_SQL=true\n").unwrap();

		let config = DotEnvSource::new()
			.with_path(&path)
			.with_prefix("STRATA_")
			.load()
			.unwrap();
		assert_eq!(config.get("log_sql"), Some(&json!(true)));
		assert!(std::env::var("STRATA_TEST_DOTENV_ONLY").is_err());
	}

	#[test]
	fn test_missing_files_yield_nothing() {
		assert!(TomlFileSource::new("does-not-exist.toml").load().unwrap().is_empty());
		assert!(
			DotEnvSource::new()
				.with_path("does-not-exist.env")
				.load()
				.unwrap()
				.is_empty()
		);
	}

	#[test]
	fn test_source_priority() {
		assert_eq!(EnvSource::new().priority(), 100);
		assert_eq!(DotEnvSource::new().priority(), 90);
		assert_eq!(TomlFileSource::new("test.toml").priority(), 50);
		assert_eq!(DefaultSource::new().priority(), 0);
	}
}
