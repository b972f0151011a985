//! File identity: content hash plus modification time
//!
//! A [`FileInfo`] binds a logical name to a location and to the
//! [`FileMarks`] of the version last seen there. Which of two versions wins
//! is decided by [`FileInfo::newer_than`].

use std::path::Path;
use std::time::UNIX_EPOCH;

use tokio::fs as afs;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::config::Modifiers;
use crate::error::{PathError, SyncError};
use crate::protocol::ProtocolPath;

/// Read buffer used while hashing
pub const BUFFER_SIZE: usize = 10 * 1024 * 1024;

const DEFAULT_TIMESTAMP: f64 = 0.0;
const DEFAULT_FID: &str = "none";

/// Version marks of a file: modification time and content id
#[derive(Debug, Clone, PartialEq)]
pub struct FileMarks {
	/// Seconds since the Unix epoch
	pub timestamp: f64,

	/// Content id (hex digest)
	pub fid: String,
}

impl Default for FileMarks {
	fn default() -> Self {
		FileMarks { timestamp: DEFAULT_TIMESTAMP, fid: DEFAULT_FID.to_string() }
	}
}

impl FileMarks {
	pub fn new(timestamp: f64, fid: &str) -> Self {
		FileMarks { timestamp, fid: fid.to_string() }
	}

	/// Marks of a registered file whose version was never observed
	pub fn is_bare(&self) -> bool {
		self.timestamp == DEFAULT_TIMESTAMP && self.fid == DEFAULT_FID
	}

	/// Compute the marks of a file on this machine
	pub async fn from_local_path(path: &Path) -> Result<Self, SyncError> {
		let modified = afs::metadata(path).await?.modified()?;
		let timestamp = modified
			.duration_since(UNIX_EPOCH)
			.map(|d| d.as_secs_f64())
			.unwrap_or(DEFAULT_TIMESTAMP);
		let fid = hash_file(path).await?;

		Ok(FileMarks { timestamp, fid })
	}
}

/// Streaming BLAKE3 digest of a local file, lowercase hex
pub async fn hash_file(path: &Path) -> Result<String, SyncError> {
	let mut f = afs::File::open(path).await?;
	let mut hasher = blake3::Hasher::new();
	let mut buf = vec![0u8; BUFFER_SIZE];

	loop {
		let n = f.read(&mut buf).await?;
		if n == 0 {
			break;
		}
		hasher.update(&buf[..n]);
	}

	Ok(hasher.finalize().to_hex().to_string())
}

/// A named file at a location, with the marks of its version there
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
	pub name: String,
	pub location: ProtocolPath,
	pub marks: FileMarks,
}

impl FileInfo {
	/// Bare entry
	pub fn new(name: &str, location: ProtocolPath) -> Self {
		FileInfo { name: name.to_string(), location, marks: FileMarks::default() }
	}

	pub fn with_marks(name: &str, location: ProtocolPath, marks: FileMarks) -> Self {
		FileInfo { name: name.to_string(), location, marks }
	}

	/// Build from a location whose bytes are reachable on this machine
	pub async fn from_name_and_local_file(
		name: &str,
		location: ProtocolPath,
		modifiers: &Modifiers,
	) -> Result<Self, SyncError> {
		let local = location
			.local_path(modifiers)
			.ok_or_else(|| PathError::NoLocalPath { path: location.path().to_string() })?;

		let marks = FileMarks::from_local_path(&local).await?;
		Ok(FileInfo { name: name.to_string(), location, marks })
	}

	pub fn is_bare(&self) -> bool {
		self.marks.is_bare()
	}

	/// Whether this version supersedes `other`
	///
	/// True only when the content ids differ and this timestamp is
	/// strictly greater. Identical content never counts as newer, whatever
	/// the timestamps say.
	pub fn newer_than(&self, other: &FileInfo) -> bool {
		self.marks.fid != other.marks.fid && self.marks.timestamp > other.marks.timestamp
	}

	/// Path on this machine, `None` for bare entries
	pub fn local_path(&self, modifiers: &Modifiers) -> Result<Option<std::path::PathBuf>, PathError> {
		if self.is_bare() {
			return Ok(None);
		}

		self.location
			.local_path(modifiers)
			.map(Some)
			.ok_or_else(|| PathError::NoLocalPath { path: self.location.path().to_string() })
	}

	/// Copy of this entry with marks recomputed from the current bytes
	///
	/// Bare entries are returned unchanged.
	pub async fn refreshed(&self, modifiers: &Modifiers) -> Result<FileInfo, SyncError> {
		let local = match self.local_path(modifiers)? {
			Some(p) => p,
			None => return Ok(self.clone()),
		};

		debug!("Refreshing marks of \"{}\" from {}", self.name, local.display());
		let marks = FileMarks::from_local_path(&local).await?;
		Ok(FileInfo { name: self.name.clone(), location: self.location.clone(), marks })
	}
}


// vim: ts=4
