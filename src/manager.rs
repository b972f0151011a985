//! Reconciliation of several manifests describing the same files
//!
//! [`Manager::update`] stages every registered table locally, picks the most
//! recent version of each file, copies it over the stale locations and only
//! then rewrites the tables that changed. File copies and table copies are
//! two separate batches: a table never claims a version before the bytes
//! are in place.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::{Duration, UNIX_EPOCH};

use filetime::FileTime;
use tracing::{debug, error, info, warn};

use crate::config::Modifiers;
use crate::error::{MissingEntry, PathError, SyncError};
use crate::files::FileInfo;
use crate::parallel::JobHandler;
use crate::protocol::{available_location, ProtocolPath, ProtocolRegistry, Transport};
use crate::table::{Backup, Table};

/// Knobs for [`Manager::update`]
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
	/// Number of parallel workers (0 = sequential)
	pub parallel: usize,

	/// Parent directory for the staging area (system temp dir otherwise)
	pub staging_dir: Option<PathBuf>,
}

/// What [`Manager::update`] did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateReport {
	pub files_copied: usize,
	pub tables_written: usize,
}

/// Set of tables kept in sync with each other
#[derive(Debug, Clone, Default)]
pub struct Manager {
	tables: Vec<ProtocolPath>,
}

/// A staged table plus the changes it needs
struct TableUpdater {
	source: ProtocolPath,
	staged: PathBuf,
	table: Table,
	changes: Vec<(FileInfo, FileInfo)>,
}

impl TableUpdater {
	/// Record a change if `most_recent` supersedes this table's entry
	fn check_changed(&mut self, most_recent: &FileInfo) {
		if let Some(current) = self.table.get(&most_recent.name) {
			if most_recent.newer_than(current) {
				self.changes.push((most_recent.clone(), current.clone()));
			}
		}
	}

	fn needs_update(&self) -> bool {
		!self.changes.is_empty()
	}

	/// Give the stale entries the winning marks, keeping their locations
	fn update_table(&mut self) {
		for (src, tgt) in &self.changes {
			self.table.insert(FileInfo::with_marks(&tgt.name, tgt.location.clone(), src.marks.clone()));
		}
	}
}

impl Manager {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_table(&mut self, path: ProtocolPath) {
		self.tables.push(path);
	}

	pub fn tables(&self) -> &[ProtocolPath] {
		&self.tables
	}

	/// First table reachable from this machine
	pub fn available_table(&self, allowed: &[String], modifiers: &Modifiers) -> Result<ProtocolPath, PathError> {
		available_location(&self.tables, allowed, modifiers)
	}

	/// Bring every table, and the files they list, to the most recent versions
	pub async fn update(
		&self,
		registry: &ProtocolRegistry,
		transport: &Transport,
		options: &UpdateOptions,
	) -> Result<UpdateReport, SyncError> {
		let staging = match &options.staging_dir {
			Some(dir) => tempfile::Builder::new().prefix("tabsync").tempdir_in(dir)?,
			None => tempfile::Builder::new().prefix("tabsync").tempdir()?,
		};

		info!("Copying tables to a temporary directory");
		let mut updaters = Vec::with_capacity(self.tables.len());
		for (i, source) in self.tables.iter().enumerate() {
			let staged = staging.path().join(format!("table_{}.json", i));
			transport.copy_file(source, &ProtocolPath::local(&staged)).await?;
			let table = Table::read(&staged, registry).await?;
			updaters.push(TableUpdater { source: source.clone(), staged, table, changes: Vec::new() });
		}

		let names: BTreeSet<String> =
			updaters.iter().flat_map(|u| u.table.names().map(String::from)).collect();

		check_missing(&updaters, &names)?;

		info!("Determining most recent version of files");
		let most_recent = select_most_recent(&updaters, &names);

		for f in most_recent.values() {
			for u in updaters.iter_mut() {
				u.check_changed(f);
			}
		}

		let file_jobs: Vec<(FileInfo, FileInfo)> =
			updaters.iter().flat_map(|u| u.changes.iter().cloned()).collect();

		if file_jobs.is_empty() {
			info!("All files are up to date");
			return Ok(UpdateReport::default());
		}

		info!("Starting to synchronize {} files", file_jobs.len());
		let files_copied = file_jobs.len();
		run_batch(file_jobs, options.parallel, transport, |transport, (src, tgt)| async move {
			copy_version(&transport, &src, &tgt).await
		})
		.await?;

		let mut table_jobs = Vec::new();
		for u in updaters.iter_mut().filter(|u| u.needs_update()) {
			u.update_table();
			u.table.write(&u.staged, Backup::Skip).await?;
			table_jobs.push((ProtocolPath::local(&u.staged), u.source.clone()));
		}

		info!("Updating {} tables", table_jobs.len());
		let tables_written = table_jobs.len();
		run_batch(table_jobs, options.parallel, transport, |transport, (staged, source)| async move {
			transport.copy_file(&staged, &source).await
		})
		.await?;

		Ok(UpdateReport { files_copied, tables_written })
	}
}

fn check_missing(updaters: &[TableUpdater], names: &BTreeSet<String>) -> Result<(), SyncError> {
	let mut missing = Vec::new();

	for u in updaters {
		for name in names.iter().filter(|n| !u.table.contains(n.as_str())) {
			error!("Table in \"{}\" does not have file \"{}\"", u.source, name);
			missing.push(MissingEntry { table: u.source.to_string(), name: name.clone() });
		}
	}

	if missing.is_empty() {
		Ok(())
	} else {
		Err(SyncError::MissingEntries(missing))
	}
}

/// Winner per name: the first table's entry, replaced only by strictly newer ones
fn select_most_recent(updaters: &[TableUpdater], names: &BTreeSet<String>) -> BTreeMap<String, FileInfo> {
	let mut most_recent: BTreeMap<String, FileInfo> = BTreeMap::new();

	for name in names {
		for f in updaters.iter().filter_map(|u| u.table.get(name)) {
			match most_recent.get(name) {
				Some(current) if !f.newer_than(current) => {}
				_ => {
					most_recent.insert(name.clone(), f.clone());
				}
			}
		}
	}

	most_recent
}

/// Copy the winning version over a stale one, restoring its time stamp
async fn copy_version(transport: &Transport, src: &FileInfo, tgt: &FileInfo) -> Result<(), SyncError> {
	debug!("Updating \"{}\": {} -> {}", src.name, src.location, tgt.location);
	transport.copy_file(&src.location, &tgt.location).await?;

	if transport.preserves_mtime(&src.location, &tgt.location) {
		return Ok(());
	}

	if let Some(local) = tgt.location.local_path(transport.modifiers()) {
		if local.exists() {
			let stamp = Duration::try_from_secs_f64(src.marks.timestamp).ok().and_then(|d| UNIX_EPOCH.checked_add(d));
			match stamp {
				Some(time) => {
					filetime::set_file_mtime(&local, FileTime::from_system_time(time))?;
					debug!("Restored modification time of {}", local.display());
				}
				None => warn!(
					"Time stamp {} of \"{}\" is out of range; modification time of {} left as is",
					src.marks.timestamp,
					src.name,
					local.display()
				),
			}
		}
	}

	Ok(())
}

async fn run_batch<T, F, Fut>(items: Vec<T>, parallel: usize, transport: &Transport, func: F) -> Result<(), SyncError>
where
	T: Send + 'static,
	F: Fn(Transport, T) -> Fut + Send + Sync + 'static,
	Fut: std::future::Future<Output = Result<(), SyncError>> + Send + 'static,
{
	if parallel > 0 {
		let transport = transport.clone();
		JobHandler::run(items, parallel, move |item| func(transport.clone(), item)).await?;
	} else {
		for item in items {
			func(transport.clone(), item).await?;
		}
	}
	Ok(())
}


// vim: ts=4
