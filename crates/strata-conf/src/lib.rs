//! # Strata Configuration
//!
//! Layered settings for migration runs.
//!
//! ## Features
//!
//! - **Multiple configuration sources**: TOML files, `.env` files, environment variables and defaults
//! - **Priority merging**: higher-priority sources override lower ones, nested tables merge key by key
//! - **Typed settings**: [`MigrationSettings`] and [`DatabaseConfig`] deserialize from the merged values
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use strata_conf::MigrationSettings;
//!
//! // strata.toml, then .env, then STRATA_* variables such as STRATA_DATABASE__NAME
//! let settings = MigrationSettings::load(None).unwrap();
//! println!("{}", settings.database.to_url());
//! ```
//!
//! ## Module Organization
//!
//! - [`sources`]: configuration sources
//! - [`settings`]: merging and the typed migration settings
//! - [`database_config`]: database connection settings

pub mod database_config;
pub mod settings;
pub mod sources;

pub use database_config::{DatabaseConfig, DatabaseEngine};
pub use settings::{MergedSettings, MigrationSettings, SettingsBuilder, SettingsError};
pub use sources::{ConfigSource, DefaultSource, DotEnvSource, EnvSource, SourceError, TomlFileSource};
