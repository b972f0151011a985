//! Error types for tabsync operations

use std::error::Error;
use std::fmt;
use std::io;

/// Main error type for table and reconciliation operations
#[derive(Debug)]
pub enum SyncError {
	/// Path construction, resolution or lookup failed
	Path(PathError),

	/// External transfer or directory creation failed
	Transfer(TransferError),

	/// Manifest could not be read or written
	Table(TableError),

	/// Protocol registry rejected a variant
	Registration(RegistrationError),

	/// Some tables lack entries present in others
	MissingEntries(Vec<MissingEntry>),

	/// I/O error
	Io(io::Error),

	/// Invalid configuration
	InvalidConfig { message: String },

	/// Generic error message
	Other { message: String },
}

/// A (table, name) pair reported by reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingEntry {
	pub table: String,
	pub name: String,
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::Path(e) => write!(f, "{}", e),
			SyncError::Transfer(e) => write!(f, "{}", e),
			SyncError::Table(e) => write!(f, "{}", e),
			SyncError::Registration(e) => write!(f, "{}", e),
			SyncError::MissingEntries(missing) => {
				write!(f, "Missing files in some tables:")?;
				for m in missing {
					write!(f, "\n  table \"{}\" does not have file \"{}\"", m.table, m.name)?;
				}
				Ok(())
			}
			SyncError::Io(e) => write!(f, "I/O error: {}", e),
			SyncError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
			SyncError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for SyncError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			SyncError::Path(e) => Some(e),
			SyncError::Transfer(e) => Some(e),
			SyncError::Table(e) => Some(e),
			SyncError::Registration(e) => Some(e),
			SyncError::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl SyncError {
	/// Exit status used by the command line front-end, one per error kind
	pub fn exit_code(&self) -> i32 {
		match self {
			SyncError::Path(PathError::InvalidPath { .. }) => 2,
			SyncError::Path(PathError::AmbiguousPath { .. }) => 3,
			SyncError::Path(PathError::UnknownProtocol { .. }) => 3,
			SyncError::Path(PathError::NoAvailableLocation { .. }) => 4,
			SyncError::Path(PathError::NoLocalPath { .. }) => 5,
			SyncError::Path(PathError::MissingUsername { .. }) => 6,
			SyncError::Transfer(TransferError::CopyFile { .. }) => 10,
			SyncError::Transfer(TransferError::MakeDirs { .. }) => 11,
			SyncError::Transfer(TransferError::Timeout { .. }) => 12,
			SyncError::Transfer(TransferError::Spawn { .. }) => 13,
			SyncError::Table(TableError::Schema { .. }) => 20,
			SyncError::Table(TableError::NotAFile { .. }) => 21,
			SyncError::Table(TableError::Parse { .. }) => 22,
			SyncError::Table(TableError::Collision { .. }) => 23,
			SyncError::Table(TableError::Io(_)) => 24,
			SyncError::Registration(_) => 30,
			SyncError::MissingEntries(_) => 40,
			SyncError::Io(_) => 50,
			SyncError::InvalidConfig { .. } => 60,
			SyncError::Other { .. } => 1,
		}
	}
}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Io(e)
	}
}

impl From<String> for SyncError {
	fn from(e: String) -> Self {
		SyncError::Other { message: e }
	}
}

impl From<PathError> for SyncError {
	fn from(e: PathError) -> Self {
		SyncError::Path(e)
	}
}

impl From<TransferError> for SyncError {
	fn from(e: TransferError) -> Self {
		SyncError::Transfer(e)
	}
}

impl From<TableError> for SyncError {
	fn from(e: TableError) -> Self {
		SyncError::Table(e)
	}
}

impl From<RegistrationError> for SyncError {
	fn from(e: RegistrationError) -> Self {
		SyncError::Registration(e)
	}
}

/// Errors building or resolving protocol paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
	/// Path does not match the syntax of the requested protocol
	InvalidPath { path: String, protocol: String },

	/// Zero or several protocols accept an unqualified path
	AmbiguousPath { path: String, candidates: Vec<String> },

	/// No protocol registered under the given identifier
	UnknownProtocol { id: String },

	/// None of the candidate locations is reachable
	NoAvailableLocation { paths: Vec<String> },

	/// Location can not be resolved to a path on this machine
	NoLocalPath { path: String },

	/// SSH path without user name and no configured user for its host
	MissingUsername { path: String },
}

impl fmt::Display for PathError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PathError::InvalidPath { path, protocol } => {
				write!(f, "Invalid path \"{}\" for protocol \"{}\"", path, protocol)
			}
			PathError::AmbiguousPath { path, candidates } if candidates.is_empty() => {
				write!(f, "No protocol accepts path \"{}\"", path)
			}
			PathError::AmbiguousPath { path, candidates } => {
				write!(
					f,
					"Path \"{}\" is ambiguous, accepted by protocols: {}",
					path,
					candidates.join(", ")
				)
			}
			PathError::UnknownProtocol { id } => write!(f, "Unknown protocol \"{}\"", id),
			PathError::NoAvailableLocation { paths } => {
				write!(f, "Unable to find an available path among: {}", paths.join(", "))
			}
			PathError::NoLocalPath { path } => {
				write!(f, "Unable to extract a local path from \"{}\"", path)
			}
			PathError::MissingUsername { path } => {
				write!(f, "Unable to find a proper user name for path \"{}\"", path)
			}
		}
	}
}

impl Error for PathError {}

/// Errors raised by external transfer commands
#[derive(Debug)]
pub enum TransferError {
	/// Copy command exited with a failure status
	CopyFile { source: String, target: String, stderr: String },

	/// Directory creation exited with a failure status
	MakeDirs { target: String, stderr: String },

	/// Remote host did not answer while creating directories
	Timeout { target: String },

	/// External program could not be started
	Spawn { program: String, source: io::Error },
}

impl fmt::Display for TransferError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TransferError::CopyFile { source, target, stderr } => write!(
				f,
				"Problem copying file:\ninput: \"{}\"\noutput: \"{}\"\nstderr:\n{}",
				source, target, stderr
			),
			TransferError::MakeDirs { target, stderr } => {
				write!(f, "Problem creating directories for \"{}\"\nstderr:\n{}", target, stderr)
			}
			TransferError::Timeout { target } => {
				write!(f, "Connection timed out creating directories for \"{}\"", target)
			}
			TransferError::Spawn { program, source } => {
				write!(f, "Failed to spawn '{}': {}", program, source)
			}
		}
	}
}

impl Error for TransferError {}

/// Manifest (table) errors
#[derive(Debug)]
pub enum TableError {
	/// A required field is absent
	Schema { field: String },

	/// Target exists but is not a regular file
	NotAFile { path: String },

	/// Malformed manifest content
	Parse { path: String, line: Option<usize>, message: String },

	/// Entry already present while collisions are not allowed
	Collision { name: String },

	/// I/O error
	Io(io::Error),
}

impl fmt::Display for TableError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TableError::Schema { field } => {
				write!(f, "Required field \"{}\" is not present; incompatible version", field)
			}
			TableError::NotAFile { path } => {
				write!(f, "Attempt to write table on \"{}\", which is not a file", path)
			}
			TableError::Parse { path, line: Some(line), message } => {
				write!(f, "Malformed table \"{}\" (line {}): {}", path, line, message)
			}
			TableError::Parse { path, line: None, message } => {
				write!(f, "Malformed table \"{}\": {}", path, message)
			}
			TableError::Collision { name } => {
				write!(f, "File \"{}\" already exists in table", name)
			}
			TableError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl Error for TableError {}

impl From<io::Error> for TableError {
	fn from(e: io::Error) -> Self {
		TableError::Io(e)
	}
}

/// Protocol registration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
	/// Identifier already used by another protocol
	DuplicateId { id: String },

	/// Remote protocol lacks a mandatory capability
	MissingOverride { id: String, method: String },
}

impl fmt::Display for RegistrationError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RegistrationError::DuplicateId { id } => {
				write!(f, "Protocol with name \"{}\" already exists", id)
			}
			RegistrationError::MissingOverride { id, method } => {
				write!(f, "Protocol \"{}\" must override method \"{}\"", id, method)
			}
		}
	}
}

impl Error for RegistrationError {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_exit_codes_are_distinct_per_kind() {
		let errors = vec![
			SyncError::from(PathError::InvalidPath { path: "p".into(), protocol: "ssh".into() }),
			SyncError::from(PathError::NoAvailableLocation { paths: vec![] }),
			SyncError::from(TransferError::CopyFile {
				source: "a".into(),
				target: "b".into(),
				stderr: "boom".into(),
			}),
			SyncError::from(TransferError::MakeDirs { target: "b".into(), stderr: "".into() }),
			SyncError::from(TableError::Schema { field: "files".into() }),
			SyncError::from(TableError::NotAFile { path: "/tmp".into() }),
			SyncError::MissingEntries(vec![]),
		];
		let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
		codes.sort();
		codes.dedup();
		assert_eq!(codes.len(), errors.len());
		assert!(codes.iter().all(|c| *c != 0));
	}

	#[test]
	fn test_copy_error_carries_stderr() {
		let err = TransferError::CopyFile {
			source: "ipath".into(),
			target: "opath".into(),
			stderr: "No such file".into(),
		};
		let msg = err.to_string();
		assert!(msg.contains("ipath"));
		assert!(msg.contains("opath"));
		assert!(msg.contains("No such file"));
	}

	#[test]
	fn test_missing_entries_lists_every_pair() {
		let err = SyncError::MissingEntries(vec![
			MissingEntry { table: "t1".into(), name: "f1".into() },
			MissingEntry { table: "t2".into(), name: "f2".into() },
		]);
		let msg = err.to_string();
		assert!(msg.contains("\"t1\" does not have file \"f1\""));
		assert!(msg.contains("\"t2\" does not have file \"f2\""));
	}
}

// vim: ts=4
