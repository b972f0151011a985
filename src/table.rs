//! Manifests ("tables") mapping file names to locations and marks
//!
//! # Format
//!
//! ```json
//! {
//!   "version": "0.3.0",
//!   "description": "reference data",
//!   "last_update": "2024-05-01T10:00:00+00:00",
//!   "files": {
//!     "calib": {"name": "calib", "path": "/data/calib.root", "pid": "local", "tmstp": 1714557600.0, "fid": "…"}
//!   }
//! }
//! ```
//!
//! Older manifests are plain text, one file per line, with either
//! `name path tmstp fid` or `name path pid tmstp fid` columns. They are
//! still read; writing always produces JSON.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::fs as afs;
use tracing::{debug, info, warn};

use crate::config::Modifiers;
use crate::error::{SyncError, TableError};
use crate::fields::{check_fields, Required};
use crate::files::{FileInfo, FileMarks};
use crate::parallel::JobHandler;
use crate::protocol::{ProtocolPath, ProtocolRegistry};

const TABLE_FIELDS: &[&str] = &["version", "description", "last_update", "files"];
const TABLE_REQUIRED: &[&str] = &["files"];
const ENTRY_FIELDS: &[&str] = &["name", "path", "pid", "tmstp", "fid"];
const ENTRY_REQUIRED: &[&str] = &["name", "path", "tmstp", "fid"];

const BACKUP_SUFFIX: &str = "backup";
const PENDING_SUFFIX: &str = "new";

/// What to do with an existing manifest before overwriting it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backup {
	/// Overwrite in place
	Skip,

	/// Rename to `<path>.backup`
	Beside,

	/// Rename to the given path
	To(PathBuf),
}

impl Backup {
	fn target(&self, path: &Path) -> Option<PathBuf> {
		match self {
			Backup::Skip => None,
			Backup::Beside => Some(sibling(path, BACKUP_SUFFIX)),
			Backup::To(p) => Some(p.clone()),
		}
	}
}

/// `<path>.<suffix>`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
	let mut name = path.as_os_str().to_os_string();
	name.push(".");
	name.push(suffix);
	PathBuf::from(name)
}

/// Policy for entries already present when replicating a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collisions {
	Fail,
	Omit,
	Replace,
}

impl std::str::FromStr for Collisions {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"fail" => Ok(Collisions::Fail),
			"omit" => Ok(Collisions::Omit),
			"replace" => Ok(Collisions::Replace),
			other => Err(format!("Unknown collision policy \"{}\"", other)),
		}
	}
}

/// A manifest: file name to [`FileInfo`]
///
/// Equality compares the description and the entries; the producer
/// version and the last update stamp are bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct Table {
	pub description: String,
	pub version: Option<String>,
	pub last_update: Option<String>,
	files: BTreeMap<String, FileInfo>,
}

impl PartialEq for Table {
	fn eq(&self, other: &Self) -> bool {
		self.description == other.description && self.files == other.files
	}
}

#[derive(Serialize)]
struct TableRecord<'a> {
	version: &'a str,
	description: &'a str,
	last_update: String,
	files: BTreeMap<&'a str, EntryRecord<'a>>,
}

#[derive(Serialize)]
struct EntryRecord<'a> {
	name: &'a str,
	path: &'a str,
	pid: &'a str,
	tmstp: f64,
	fid: &'a str,
}

impl Table {
	pub fn new(description: &str) -> Self {
		Table { description: description.to_string(), ..Default::default() }
	}

	pub fn from_files<I: IntoIterator<Item = FileInfo>>(description: &str, files: I) -> Self {
		let mut table = Self::new(description);
		for f in files {
			table.insert(f);
		}
		table
	}

	pub fn get(&self, name: &str) -> Option<&FileInfo> {
		self.files.get(name)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.files.contains_key(name)
	}

	/// Entries sorted by name
	pub fn files(&self) -> impl Iterator<Item = &FileInfo> {
		self.files.values()
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.files.keys().map(String::as_str)
	}

	pub fn len(&self) -> usize {
		self.files.len()
	}

	pub fn is_empty(&self) -> bool {
		self.files.is_empty()
	}

	/// Add or replace an entry, returning the previous one
	pub fn insert(&mut self, info: FileInfo) -> Option<FileInfo> {
		self.files.insert(info.name.clone(), info)
	}

	pub fn remove(&mut self, name: &str) -> Option<FileInfo> {
		self.files.remove(name)
	}

	/// Remove every entry whose name matches, returning the removed names
	pub fn remove_matching(&mut self, pattern: &Regex) -> Vec<String> {
		let names: Vec<String> = self.files.keys().filter(|n| pattern.is_match(n)).cloned().collect();
		for name in &names {
			self.files.remove(name);
		}
		names
	}

	// ========================================================================
	// READING
	// ========================================================================

	/// Read a manifest from a local file
	pub async fn read(path: &Path, registry: &ProtocolRegistry) -> Result<Table, SyncError> {
		let contents = afs::read_to_string(path).await.map_err(TableError::from)?;
		let origin = path.display().to_string();

		if contents.trim_start().starts_with('{') {
			Self::from_json_str(&contents, &origin, registry)
		} else {
			Self::from_legacy_str(&contents, &origin, registry)
		}
	}

	/// Parse the JSON form; `origin` only labels errors
	pub fn from_json_str(contents: &str, origin: &str, registry: &ProtocolRegistry) -> Result<Table, SyncError> {
		let value: Value = serde_json::from_str(contents).map_err(|e| TableError::Parse {
			path: origin.to_string(),
			line: Some(e.line()),
			message: e.to_string(),
		})?;

		let root = value.as_object().ok_or_else(|| parse_error(origin, "expected a JSON object"))?;
		check_fields(TABLE_FIELDS, root.keys().map(String::as_str), Required::Only(TABLE_REQUIRED))?;

		let mut table = Table {
			description: root.get("description").and_then(Value::as_str).unwrap_or_default().to_string(),
			version: root.get("version").and_then(Value::as_str).map(String::from),
			last_update: root.get("last_update").and_then(Value::as_str).map(String::from),
			files: BTreeMap::new(),
		};

		let entries = root
			.get("files")
			.and_then(Value::as_object)
			.ok_or_else(|| parse_error(origin, "\"files\" must be an object"))?;

		for (key, entry) in entries {
			let entry = entry
				.as_object()
				.ok_or_else(|| parse_error(origin, &format!("entry \"{}\" must be an object", key)))?;
			let info = entry_from_json(entry, origin, registry)?;

			if &info.name != key {
				return Err(parse_error(origin, &format!("entry \"{}\" is named \"{}\"", key, info.name)).into());
			}
			table.files.insert(info.name.clone(), info);
		}

		debug!("Read {} entries from {}", table.len(), origin);
		Ok(table)
	}

	/// Parse the line-oriented legacy form
	pub fn from_legacy_str(contents: &str, origin: &str, registry: &ProtocolRegistry) -> Result<Table, SyncError> {
		let mut table = Table::default();

		for (idx, line) in contents.lines().enumerate() {
			let cols: Vec<&str> = line.split_whitespace().collect();
			let (name, path, pid, tmstp, fid) = match cols.as_slice() {
				[] => continue,
				[name, path, tmstp, fid] => (*name, *path, None, *tmstp, *fid),
				[name, path, pid, tmstp, fid] => (*name, *path, Some(*pid), *tmstp, *fid),
				_ => {
					return Err(TableError::Parse {
						path: origin.to_string(),
						line: Some(idx + 1),
						message: format!("expected 4 or 5 columns, found {}", cols.len()),
					}
					.into());
				}
			};

			let timestamp = match tmstp.parse::<f64>() {
				Ok(t) if t.is_finite() => t,
				_ => {
					return Err(TableError::Parse {
						path: origin.to_string(),
						line: Some(idx + 1),
						message: format!("invalid time stamp \"{}\"", tmstp),
					}
					.into());
				}
			};

			let location = registry.make(path, pid)?;
			table.insert(FileInfo::with_marks(name, location, FileMarks::new(timestamp, fid)));
		}

		Ok(table)
	}

	// ========================================================================
	// WRITING
	// ========================================================================

	/// Serialize to pretty JSON, entries sorted by name
	pub fn to_json_string(&self) -> Result<String, TableError> {
		let record = TableRecord {
			version: env!("CARGO_PKG_VERSION"),
			description: &self.description,
			last_update: chrono::Utc::now().to_rfc3339(),
			files: self
				.files
				.iter()
				.map(|(name, f)| {
					let entry = EntryRecord {
						name: &f.name,
						path: f.location.path(),
						pid: f.location.protocol_id(),
						tmstp: f.marks.timestamp,
						fid: &f.marks.fid,
					};
					(name.as_str(), entry)
				})
				.collect(),
		};

		serde_json::to_string_pretty(&record).map_err(|e| TableError::Parse {
			path: String::new(),
			line: None,
			message: e.to_string(),
		})
	}

	/// Write the manifest to a local file
	///
	/// Fails with [`TableError::NotAFile`] if `path` exists and is not a
	/// regular file. A backup request without a previous file only warns.
	/// The new content goes to `<path>.new` first; the previous file is only
	/// moved once that write has succeeded.
	pub async fn write(&self, path: &Path, backup: Backup) -> Result<(), SyncError> {
		let previous = match afs::metadata(path).await {
			Ok(meta) if !meta.is_file() => {
				return Err(TableError::NotAFile { path: path.display().to_string() }.into());
			}
			Ok(_) => true,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
			Err(e) => return Err(TableError::Io(e).into()),
		};

		let contents = self.to_json_string()?;
		let pending = sibling(path, PENDING_SUFFIX);
		if let Err(e) = afs::write(&pending, contents).await {
			let _ = afs::remove_file(&pending).await;
			return Err(TableError::Io(e).into());
		}

		match backup.target(path) {
			Some(target) if previous => {
				debug!("Backing up {} to {}", path.display(), target.display());
				afs::rename(path, &target).await.map_err(TableError::from)?;
			}
			Some(_) => warn!("No previous table at {}; nothing to back up", path.display()),
			None => {}
		}

		afs::rename(&pending, path).await.map_err(TableError::from)?;
		Ok(())
	}

	// ========================================================================
	// REFRESHING AND EDITING
	// ========================================================================

	/// New table with the marks of `subset` (all entries by default) recomputed
	///
	/// With `parallel > 0` entries are refreshed by a worker pool; the
	/// resulting table is the same either way.
	pub async fn updated(
		&self,
		subset: Option<&[String]>,
		parallel: usize,
		modifiers: &Modifiers,
	) -> Result<Table, SyncError> {
		if let Some(names) = subset {
			for name in names.iter().filter(|n| !self.files.contains_key(n.as_str())) {
				warn!("File \"{}\" is not in the table; ignoring it", name);
			}
		}

		let selected: Vec<FileInfo> = self
			.files
			.values()
			.filter(|f| subset.map_or(true, |names| names.contains(&f.name)))
			.cloned()
			.collect();

		let refreshed = if parallel > 0 {
			let modifiers = Arc::new(modifiers.clone());
			JobHandler::run(selected, parallel, move |f: FileInfo| {
				let modifiers = Arc::clone(&modifiers);
				async move { f.refreshed(&modifiers).await }
			})
			.await?
		} else {
			let mut out = Vec::with_capacity(selected.len());
			for f in &selected {
				out.push(f.refreshed(modifiers).await?);
			}
			out
		};

		let mut table = self.clone();
		for f in refreshed {
			table.insert(f);
		}
		Ok(table)
	}

	/// Register every regular file under `dir`, recursively
	///
	/// Entries are named after the file name; only files whose path
	/// relative to `dir` matches `pattern` are considered. Returns the
	/// names added.
	pub async fn add_from_dir(
		&mut self,
		dir: &Path,
		pattern: Option<&Regex>,
		bare: bool,
		modifiers: &Modifiers,
	) -> Result<Vec<String>, SyncError> {
		let mut found = Vec::new();
		let mut pending = vec![dir.to_path_buf()];

		while let Some(current) = pending.pop() {
			let mut entries = afs::read_dir(&current).await?;
			while let Some(entry) = entries.next_entry().await? {
				let file_type = entry.file_type().await?;
				let path = entry.path();
				if file_type.is_dir() {
					pending.push(path);
				} else if file_type.is_file() {
					found.push(path);
				}
			}
		}
		found.sort();

		let mut added = Vec::new();
		for path in found {
			let relative = path.strip_prefix(dir).unwrap_or(&path).to_string_lossy().into_owned();
			if let Some(re) = pattern {
				if !re.is_match(&relative) {
					continue;
				}
			}

			let name = match path.file_name() {
				Some(n) => n.to_string_lossy().into_owned(),
				None => continue,
			};
			if self.contains(&name) || added.contains(&name) {
				return Err(TableError::Collision { name }.into());
			}

			let location = ProtocolPath::local(&path);
			let info = if bare {
				FileInfo::new(&name, location)
			} else {
				FileInfo::from_name_and_local_file(&name, location, modifiers).await?
			};
			self.insert(info);
			added.push(name);
		}

		info!("Added {} files from {}", added.len(), dir.display());
		Ok(added)
	}

	/// Recreate the entries of `reference` under another root, as bare entries
	///
	/// Every reference path must start with `ref_root`; the prefix is
	/// replaced by `new_root` and the protocol is inferred from the result.
	pub fn replicate(
		&mut self,
		reference: &Table,
		ref_root: &str,
		new_root: &str,
		collisions: Collisions,
		registry: &ProtocolRegistry,
	) -> Result<Vec<String>, SyncError> {
		let mut replicas = Vec::with_capacity(reference.len());

		for f in reference.files() {
			let suffix = f.location.path().strip_prefix(ref_root).ok_or_else(|| SyncError::Other {
				message: format!("Path \"{}\" is not under \"{}\"", f.location.path(), ref_root),
			})?;
			let location = registry.make(&format!("{}{}", new_root, suffix), None)?;
			replicas.push(FileInfo::new(&f.name, location));
		}

		if collisions == Collisions::Fail {
			if let Some(f) = replicas.iter().find(|f| self.contains(&f.name)) {
				return Err(TableError::Collision { name: f.name.clone() }.into());
			}
		}

		let mut added = Vec::new();
		for f in replicas {
			if collisions == Collisions::Omit && self.contains(&f.name) {
				debug!("Keeping existing entry \"{}\"", f.name);
				continue;
			}
			added.push(f.name.clone());
			self.insert(f);
		}

		Ok(added)
	}
}

fn parse_error(origin: &str, message: &str) -> TableError {
	TableError::Parse { path: origin.to_string(), line: None, message: message.to_string() }
}

fn text_field<'a>(entry: &'a Map<String, Value>, field: &str, origin: &str) -> Result<&'a str, TableError> {
	entry
		.get(field)
		.and_then(Value::as_str)
		.ok_or_else(|| parse_error(origin, &format!("field \"{}\" must be a string", field)))
}

fn entry_from_json(
	entry: &Map<String, Value>,
	origin: &str,
	registry: &ProtocolRegistry,
) -> Result<FileInfo, SyncError> {
	check_fields(ENTRY_FIELDS, entry.keys().map(String::as_str), Required::Only(ENTRY_REQUIRED))?;

	let name = text_field(entry, "name", origin)?;
	let path = text_field(entry, "path", origin)?;
	let fid = text_field(entry, "fid", origin)?;
	let pid = entry.get("pid").and_then(Value::as_str);
	let timestamp = entry
		.get("tmstp")
		.and_then(Value::as_f64)
		.ok_or_else(|| parse_error(origin, "field \"tmstp\" must be a number"))?;

	let location = registry.make(path, pid)?;
	Ok(FileInfo::with_marks(name, location, FileMarks::new(timestamp, fid)))
}


// vim: ts=4
