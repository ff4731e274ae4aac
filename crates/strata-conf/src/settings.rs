//! Layered settings
//!
//! [`SettingsBuilder`] loads every registered [`ConfigSource`], merges them
//! in ascending priority and hands back a [`MergedSettings`] that can be
//! read key by key or deserialized as a whole.

use crate::database_config::DatabaseConfig;
use crate::sources::{
	ConfigSource, DefaultSource, DotEnvSource, EnvSource, SourceError, TomlFileSource, merge_value,
};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Prefix of the environment variables read by [`MigrationSettings::load`].
pub const ENV_PREFIX: &str = "STRATA_";

/// Settings file read by [`MigrationSettings::load`] when no path is given.
pub const DEFAULT_SETTINGS_FILE: &str = "strata.toml";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
	#[error("Failed to load {source_description}: {error}")]
	Source {
		source_description: String,
		#[source]
		error: SourceError,
	},

	#[error("Missing setting: {0}")]
	Missing(String),

	#[error("Invalid value for `{key}`: {error}")]
	Invalid {
		key: String,
		#[source]
		error: serde_json::Error,
	},
}

/// Builder merging configuration sources by priority
///
/// # Examples
///
/// ```
/// use strata_conf::SettingsBuilder;
/// use strata_conf::sources::DefaultSource;
/// use serde_json::json;
///
/// let merged = SettingsBuilder::new()
///     .add_source(DefaultSource::new().with_value("atomic", json!(true)))
///     .build()
///     .unwrap();
/// assert!(merged.get::<bool>("atomic").unwrap());
/// ```
#[derive(Default)]
pub struct SettingsBuilder {
	sources: Vec<Box<dyn ConfigSource>>,
}

impl SettingsBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_source(mut self, source: impl ConfigSource + 'static) -> Self {
		self.sources.push(Box::new(source));
		self
	}

	/// Load and merge every source. Sources of equal priority apply in the
	/// order they were added.
	pub fn build(mut self) -> Result<MergedSettings, SettingsError> {
		self.sources.sort_by_key(|s| s.priority());

		let mut merged = Value::Object(Map::new());
		for source in &self.sources {
			let values = source.load().map_err(|error| SettingsError::Source {
				source_description: source.description(),
				error,
			})?;
			tracing::debug!(
				source = %source.description(),
				keys = values.len(),
				"loaded settings source"
			);
			merge_value(&mut merged, Value::Object(values.into_iter().collect()));
		}

		let values = match merged {
			Value::Object(map) => map.into_iter().collect(),
			_ => IndexMap::new(),
		};
		Ok(MergedSettings { values })
	}
}

/// Result of [`SettingsBuilder::build`]
#[derive(Debug, Clone, Default)]
pub struct MergedSettings {
	values: IndexMap<String, Value>,
}

impl MergedSettings {
	/// Deserialize the value stored under `key`.
	pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, SettingsError> {
		let value = self
			.values
			.get(key)
			.ok_or_else(|| SettingsError::Missing(key.to_string()))?;
		serde_json::from_value(value.clone()).map_err(|error| SettingsError::Invalid {
			key: key.to_string(),
			error,
		})
	}

	pub fn contains(&self, key: &str) -> bool {
		self.values.contains_key(key)
	}

	/// Deserialize every merged value into `T`.
	pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, SettingsError> {
		let object = Value::Object(self.values.into_iter().collect());
		serde_json::from_value(object).map_err(|error| SettingsError::Invalid {
			key: "<root>".to_string(),
			error,
		})
	}
}

fn default_atomic() -> bool {
	true
}

/// Settings of a migration run
///
/// # Examples
///
/// ```
/// use strata_conf::MigrationSettings;
///
/// let settings = MigrationSettings::default();
/// assert!(settings.atomic);
/// assert!(settings.schema.is_none());
/// assert_eq!(settings.database.to_url(), "sqlite:db.sqlite3");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationSettings {
	#[serde(default)]
	pub database: DatabaseConfig,

	/// Schema (search path) selected before running operations
	#[serde(default)]
	pub schema: Option<String>,

	/// Run actions inside transactions
	#[serde(default = "default_atomic")]
	pub atomic: bool,

	/// Log every statement with its parameters inlined
	#[serde(default)]
	pub log_sql: bool,

	/// JSON file holding the recorded baseline schema
	#[serde(default)]
	pub baseline: Option<PathBuf>,
}

impl Default for MigrationSettings {
	fn default() -> Self {
		Self {
			database: DatabaseConfig::default(),
			schema: None,
			atomic: true,
			log_sql: false,
			baseline: None,
		}
	}
}

impl MigrationSettings {
	/// Load settings from the standard layers: defaults, the TOML file
	/// (`strata.toml` unless `path` is given), `.env`, then `STRATA_*`
	/// environment variables.
	pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
		Self::builder(path).build()?.into_typed()
	}

	/// The builder used by [`load`](Self::load), for adding further sources.
	pub fn builder(path: Option<&Path>) -> SettingsBuilder {
		let path = path
			.map(Path::to_path_buf)
			.unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
		SettingsBuilder::new()
			.add_source(DefaultSource::new().with_value("atomic", Value::Bool(true)))
			.add_source(TomlFileSource::new(path))
			.add_source(DotEnvSource::new().with_prefix(ENV_PREFIX))
			.add_source(EnvSource::new().with_prefix(ENV_PREFIX))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sources::DefaultSource;
	use serde_json::json;

	struct FailingSource;

	impl ConfigSource for FailingSource {
		fn load(&self) -> Result<IndexMap<String, Value>, SourceError> {
			Err(SourceError::Parse("broken".to_string()))
		}

		fn priority(&self) -> u8 {
			10
		}

		fn description(&self) -> String {
			"failing source".to_string()
		}
	}

	#[test]
	fn test_higher_priority_wins_regardless_of_order() {
		struct High;
		impl ConfigSource for High {
			fn load(&self) -> Result<IndexMap<String, Value>, SourceError> {
				Ok([("schema".to_string(), json!("high"))].into_iter().collect())
			}
			fn priority(&self) -> u8 {
				60
			}
			fn description(&self) -> String {
				"high".to_string()
			}
		}

		let merged = SettingsBuilder::new()
			.add_source(High)
			.add_source(DefaultSource::new().with_value("schema", json!("low")))
			.build()
			.unwrap();
		assert_eq!(merged.get::<String>("schema").unwrap(), "high");
	}

	#[test]
	fn test_nested_tables_merge() {
		let merged = SettingsBuilder::new()
			.add_source(
				DefaultSource::new().with_value("database", json!({"engine": "sqlite", "name": "a.db"})),
			)
			.add_source(FixedSource(json!({"database": {"name": "b.db"}})))
			.build()
			.unwrap();
		let settings: MigrationSettings = merged.into_typed().unwrap();
		assert_eq!(settings.database, DatabaseConfig::sqlite("b.db"));
	}

	struct FixedSource(Value);

	impl ConfigSource for FixedSource {
		fn load(&self) -> Result<IndexMap<String, Value>, SourceError> {
			Ok(self
				.0
				.as_object()
				.map(|m| m.clone().into_iter().collect())
				.unwrap_or_default())
		}

		fn priority(&self) -> u8 {
			50
		}

		fn description(&self) -> String {
			"fixed".to_string()
		}
	}

	#[test]
	fn test_source_error_names_source() {
		let err = SettingsBuilder::new()
			.add_source(FailingSource)
			.build()
			.unwrap_err();
		assert!(err.to_string().contains("failing source"));
	}

	#[test]
	fn test_missing_key() {
		let merged = SettingsBuilder::new().build().unwrap();
		assert!(matches!(
			merged.get::<String>("schema"),
			Err(SettingsError::Missing(_))
		));
	}
}
