//! Configuration for tabsync
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (`Config::default()`)
//! 2. Config file (`~/.tabsync/config.toml`, or any JSON5 file given with `-c`)
//! 3. CLI flags (highest priority)

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::error::SyncError;

// ============================================================================
// MAIN CONFIGURATION STRUCT
// ============================================================================

/// Runtime configuration for table management and synchronization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	/// Host/user substitutions applied to protocol paths before use
	pub modifiers: Modifiers,

	/// Number of parallel workers (0 = sequential)
	pub parallel: usize,

	/// Protocols that may be used even when not locally visible
	pub allowed_protocols: Vec<String>,

	/// Parent directory for temporary staging directories
	pub staging_dir: Option<PathBuf>,

	/// Log level (trace, debug, info, warn, error)
	pub log_level: String,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			modifiers: Modifiers::default(),
			parallel: 0,
			allowed_protocols: vec![],
			staging_dir: None,
			log_level: "info".to_string(),
		}
	}
}

impl Config {
	/// Load a configuration file; TOML for `.toml`, JSON5 otherwise
	pub fn load(path: &Path) -> Result<Self, SyncError> {
		let contents = std::fs::read_to_string(path).map_err(|e| SyncError::InvalidConfig {
			message: format!("Cannot read {}: {}", path.display(), e),
		})?;

		let is_toml = path.extension().map(|e| e == "toml").unwrap_or(false);
		if is_toml {
			toml::from_str(&contents).map_err(|e| SyncError::InvalidConfig {
				message: format!("{}: {}", path.display(), e),
			})
		} else {
			json5::from_str(&contents).map_err(|e| SyncError::InvalidConfig {
				message: format!("{}: {}", path.display(), e),
			})
		}
	}

	/// Default location of the configuration file (`$HOME/.tabsync/config.toml`)
	pub fn default_path() -> Option<PathBuf> {
		std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".tabsync").join("config.toml"))
	}

	/// Load the default configuration file if it exists, defaults otherwise
	pub fn discover() -> Result<Self, SyncError> {
		match Self::default_path() {
			Some(path) if path.is_file() => Self::load(&path),
			_ => Ok(Self::default()),
		}
	}
}

// ============================================================================
// PATH MODIFIERS
// ============================================================================

/// Substitutions applied to protocol paths
///
/// Applying modifiers never mutates a path; a new one is returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Modifiers {
	/// User name per SSH host, filling bare `@host:` paths
	pub ssh_usernames: BTreeMap<String, String>,

	/// SSH host names that refer to this machine
	pub ssh_hosts: BTreeSet<String>,

	/// XRootD servers whose namespace is mounted locally
	pub xrootd_servers: BTreeSet<String>,
}

impl Modifiers {
	/// Empty set of modifiers
	pub fn new() -> Self {
		Self::default()
	}

	/// Add a user name for an SSH host
	pub fn with_ssh_username(mut self, host: &str, user: &str) -> Self {
		self.ssh_usernames.insert(host.to_string(), user.to_string());
		self
	}

	/// Mark an SSH host as being this machine
	pub fn with_ssh_host(mut self, host: &str) -> Self {
		self.ssh_hosts.insert(host.to_string());
		self
	}

	/// Mark an XRootD server as locally mounted
	pub fn with_xrootd_server(mut self, server: &str) -> Self {
		self.xrootd_servers.insert(server.to_string());
		self
	}
}


// vim: ts=4
