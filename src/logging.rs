//! Logging prelude module for convenient access to tracing macros.
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("Copying tables to a temporary directory");
//! warn!("Field \"description\" not found; setting to default value");
//! ```

pub use tracing::{debug, error, info, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// `default_level` is used when `RUST_LOG` is not set:
///
/// ```bash
/// RUST_LOG=debug tabsync sync a/table.json b/table.json
/// RUST_LOG=tabsync::manager=trace tabsync sync a/table.json b/table.json
/// ```
pub fn init_tracing(default_level: &str) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

	// A second initialization (tests, embedding) is not an error
	let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

/// Map a `-v` count onto a level name
pub fn level_for_verbosity(verbose: u8) -> &'static str {
	match verbose {
		0 => "info",
		1 => "debug",
		_ => "trace",
	}
}


// vim: ts=4
