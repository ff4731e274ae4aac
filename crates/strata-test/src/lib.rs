//! Testing utilities for strata
//!
//! - [`logging::init_test_logging`]: route `tracing` events to `env_logger` once per process
//! - [`fixtures`]: rstest fixtures for database-backed tests

pub mod fixtures;
pub mod logging;

pub use logging::init_test_logging;
