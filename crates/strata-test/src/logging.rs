//! Test logging utilities
//!
//! Library code logs through `tracing` with its `log` feature enabled, so
//! an `env_logger` installed here receives every event. Control the output
//! with `RUST_LOG`, e.g. `RUST_LOG=strata_migrations=info`.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize logging for tests (call once)
///
/// # Examples
///
/// ```
/// use strata_test::logging::init_test_logging;
///
/// init_test_logging();
/// init_test_logging();
/// ```
pub fn init_test_logging() {
	INIT.call_once(|| {
		let _ = env_logger::builder().is_test(true).try_init();
	});
}
