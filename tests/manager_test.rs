//! Reconciliation tests on real files
//!
//! Tables and files live in temporary directories. Local copies go through
//! the real `cp`/`mkdir`; XRootD transfers are emulated by a runner that
//! maps `root://server//path` onto the local filesystem and, like the real
//! `xrdcp`, does not keep modification times.

use async_trait::async_trait;
use filetime::FileTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use tabsync::files::hash_file;
use tabsync::protocol::{CommandOutput, CommandRunner, CommandSpec};
use tabsync::{
	Backup, FileInfo, FileMarks, Manager, Modifiers, ProcessRunner, ProtocolPath, ProtocolRegistry, SyncError, Table,
	TransferError, Transport, UpdateOptions, UpdateReport,
};

// ============================================================================
// Helpers
// ============================================================================

/// Runs commands for real and counts them per program
#[derive(Default)]
struct CountingRunner {
	copies: AtomicUsize,
	mkdirs: AtomicUsize,
}

#[async_trait]
impl CommandRunner for CountingRunner {
	async fn run(&self, cmd: &CommandSpec) -> io::Result<CommandOutput> {
		match cmd.program.as_str() {
			"cp" => self.copies.fetch_add(1, Ordering::SeqCst),
			"mkdir" => self.mkdirs.fetch_add(1, Ordering::SeqCst),
			_ => 0,
		};
		ProcessRunner.run(cmd).await
	}
}

/// Emulates `xrdcp`/`xrd` on the local filesystem
struct FakeXrootd {
	fail_copies: bool,
}

fn xrootd_local(path: &str) -> String {
	match path.strip_prefix("root://") {
		Some(rest) => match rest.find("//") {
			Some(sep) => rest[sep + 1..].to_string(),
			None => rest.to_string(),
		},
		None => path.to_string(),
	}
}

#[async_trait]
impl CommandRunner for FakeXrootd {
	async fn run(&self, cmd: &CommandSpec) -> io::Result<CommandOutput> {
		match cmd.program.as_str() {
			"xrdcp" if self.fail_copies => Ok(CommandOutput::failed(54, "[ERROR] Server responded with an error")),
			"xrdcp" => {
				fs::copy(xrootd_local(&cmd.args[2]), xrootd_local(&cmd.args[3]))?;
				Ok(CommandOutput::ok())
			}
			"xrd" => {
				fs::create_dir_all(&cmd.args[2])?;
				Ok(CommandOutput::ok())
			}
			_ => ProcessRunner.run(cmd).await,
		}
	}
}

fn write_file(path: &Path, content: &str, mtime: i64) {
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).unwrap();
	}
	fs::write(path, content).unwrap();
	filetime::set_file_mtime(path, FileTime::from_unix_time(mtime, 0)).unwrap();
}

async fn register(table: &mut Table, name: &str, location: ProtocolPath, local: &Path) {
	let marks = FileMarks::from_local_path(local).await.unwrap();
	table.insert(FileInfo::with_marks(name, location, marks));
}

fn mtime(path: &Path) -> i64 {
	FileTime::from_last_modification_time(&fs::metadata(path).unwrap()).unix_seconds()
}

/// Two sites holding f1 and f2; site A has a newer f1
async fn setup_two_sites(root: &Path) -> (PathBuf, PathBuf) {
	let a = root.join("a");
	let b = root.join("b");

	write_file(&a.join("f1.dat"), "f1 version 2", 2_000_000_000);
	write_file(&a.join("f2.dat"), "f2 shared", 1_500_000_000);
	write_file(&b.join("f1.dat"), "f1 version 1", 1_000_000_000);
	write_file(&b.join("f2.dat"), "f2 shared", 1_600_000_000);

	for site in [&a, &b] {
		let mut table = Table::new("site");
		for name in ["f1.dat", "f2.dat"] {
			let path = site.join(name);
			register(&mut table, name, ProtocolPath::local(&path), &path).await;
		}
		table.write(&site.join("table.json"), Backup::Skip).await.unwrap();
	}

	(a, b)
}

fn manager_for(sites: &[&Path]) -> Manager {
	let mut manager = Manager::new();
	for site in sites {
		manager.add_table(ProtocolPath::local(site.join("table.json")));
	}
	manager
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_newer_file_propagates_to_stale_table() {
	let root = TempDir::new().unwrap();
	let (a, b) = setup_two_sites(root.path()).await;
	let registry = ProtocolRegistry::new();

	let a_before = Table::read(&a.join("table.json"), &registry).await.unwrap();
	let report = manager_for(&[&a, &b])
		.update(&registry, &Transport::new(ProcessRunner), &UpdateOptions::default())
		.await
		.expect("update should succeed");

	assert_eq!(report, UpdateReport { files_copied: 1, tables_written: 1 });
	assert_eq!(fs::read_to_string(b.join("f1.dat")).unwrap(), "f1 version 2");

	let b_after = Table::read(&b.join("table.json"), &registry).await.unwrap();
	let f1 = b_after.get("f1.dat").unwrap();
	assert_eq!(f1.marks, a_before.get("f1.dat").unwrap().marks);
	assert_eq!(f1.location, ProtocolPath::local(b.join("f1.dat")));
	assert_eq!(hash_file(&b.join("f1.dat")).await.unwrap(), hash_file(&a.join("f1.dat")).await.unwrap());

	// Same content under different time stamps is left alone
	assert_eq!(mtime(&b.join("f2.dat")), 1_600_000_000);
	assert_eq!(Table::read(&a.join("table.json"), &registry).await.unwrap(), a_before);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_is_idempotent() {
	let root = TempDir::new().unwrap();
	let (a, b) = setup_two_sites(root.path()).await;
	let registry = ProtocolRegistry::new();
	let manager = manager_for(&[&a, &b]);

	let runner = Arc::new(CountingRunner::default());
	let transport = Transport::from_runner(runner.clone());

	let first = manager.update(&registry, &transport, &UpdateOptions::default()).await.unwrap();
	assert_eq!(first.files_copied, 1);
	// two staged tables, one file, one table back
	assert_eq!(runner.copies.load(Ordering::SeqCst), 4);

	let b_table = fs::read(b.join("table.json")).unwrap();
	runner.copies.store(0, Ordering::SeqCst);

	let second = manager.update(&registry, &transport, &UpdateOptions::default()).await.unwrap();
	assert_eq!(second, UpdateReport::default());
	assert_eq!(runner.copies.load(Ordering::SeqCst), 2);
	assert_eq!(fs::read(b.join("table.json")).unwrap(), b_table);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_parallel_update_matches_sequential() {
	let root_seq = TempDir::new().unwrap();
	let root_par = TempDir::new().unwrap();
	let registry = ProtocolRegistry::new();

	let (a1, b1) = setup_two_sites(root_seq.path()).await;
	let (a2, b2) = setup_two_sites(root_par.path()).await;

	let seq = manager_for(&[&a1, &b1])
		.update(&registry, &Transport::new(ProcessRunner), &UpdateOptions::default())
		.await
		.unwrap();
	let par = manager_for(&[&a2, &b2])
		.update(&registry, &Transport::new(ProcessRunner), &UpdateOptions { parallel: 4, staging_dir: None })
		.await
		.unwrap();

	assert_eq!(seq, par);
	for (x, y) in [(&a1, &a2), (&b1, &b2)] {
		let tx = Table::read(&x.join("table.json"), &registry).await.unwrap();
		let ty = Table::read(&y.join("table.json"), &registry).await.unwrap();
		for (fx, fy) in tx.files().zip(ty.files()) {
			assert_eq!(fx.name, fy.name);
			assert_eq!(fx.marks, fy.marks);
		}
		assert_eq!(fs::read(x.join("f1.dat")).unwrap(), fs::read(y.join("f1.dat")).unwrap());
	}
}

#[tokio::test(flavor = "multi_thread")]
async fn test_three_tables_latest_wins() {
	let root = TempDir::new().unwrap();
	let registry = ProtocolRegistry::new();
	let sites: Vec<PathBuf> = (0..3).map(|i| root.path().join(format!("s{}", i))).collect();

	for (i, site) in sites.iter().enumerate() {
		let path = site.join("data.txt");
		write_file(&path, &format!("revision {}", [1, 3, 2][i]), 1_000_000_000 + [1, 3, 2][i] * 100);
		let mut table = Table::new("");
		register(&mut table, "data", ProtocolPath::local(&path), &path).await;
		table.write(&site.join("table.json"), Backup::Skip).await.unwrap();
	}

	let refs: Vec<&Path> = sites.iter().map(|p| p.as_path()).collect();
	let report = manager_for(&refs)
		.update(&registry, &Transport::new(ProcessRunner), &UpdateOptions { parallel: 2, staging_dir: None })
		.await
		.unwrap();

	assert_eq!(report, UpdateReport { files_copied: 2, tables_written: 2 });
	for site in &sites {
		assert_eq!(fs::read_to_string(site.join("data.txt")).unwrap(), "revision 3");
	}
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_entries_reported_together() {
	let root = TempDir::new().unwrap();
	let registry = ProtocolRegistry::new();
	let a = root.path().join("a");
	let b = root.path().join("b");

	write_file(&a.join("only_a"), "a", 1_000_000_000);
	write_file(&b.join("only_b"), "b", 1_000_000_000);
	for (site, name) in [(&a, "only_a"), (&b, "only_b")] {
		let mut table = Table::new("");
		let path = site.join(name);
		register(&mut table, name, ProtocolPath::local(&path), &path).await;
		table.write(&site.join("table.json"), Backup::Skip).await.unwrap();
	}

	let err = manager_for(&[&a, &b])
		.update(&registry, &Transport::new(ProcessRunner), &UpdateOptions::default())
		.await
		.unwrap_err();

	match err {
		SyncError::MissingEntries(missing) => {
			assert_eq!(missing.len(), 2);
			assert!(missing.iter().any(|m| m.name == "only_b" && m.table.ends_with("a/table.json")));
			assert!(missing.iter().any(|m| m.name == "only_a" && m.table.ends_with("b/table.json")));
		}
		other => panic!("expected missing entries, got {}", other),
	}
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unreachable_table_fails_fast() {
	let root = TempDir::new().unwrap();
	let (a, _b) = setup_two_sites(root.path()).await;

	let mut manager = manager_for(&[&a]);
	manager.add_table(ProtocolPath::local(root.path().join("nowhere").join("table.json")));

	let err = manager
		.update(&ProtocolRegistry::new(), &Transport::new(ProcessRunner), &UpdateOptions::default())
		.await
		.unwrap_err();
	assert!(matches!(err, SyncError::Transfer(TransferError::CopyFile { .. })));
	assert_eq!(err.exit_code(), 10);
}

// ============================================================================
// Backends that do not keep modification times
// ============================================================================

/// Site A is local; site B lists its files through an XRootD server
async fn setup_xrootd_site(root: &Path) -> (PathBuf, PathBuf) {
	let a = root.join("a");
	let b = root.join("b");
	let registry = ProtocolRegistry::new();

	write_file(&a.join("f1.dat"), "fresh", 2_000_000_000);
	write_file(&b.join("f1.dat"), "stale", 1_000_000_000);

	let mut ta = Table::new("local site");
	register(&mut ta, "f1", ProtocolPath::local(a.join("f1.dat")), &a.join("f1.dat")).await;
	ta.write(&a.join("table.json"), Backup::Skip).await.unwrap();

	let remote = registry.make(&format!("root://fake/{}", b.join("f1.dat").display()), None).unwrap();
	let mut tb = Table::new("xrootd site");
	register(&mut tb, "f1", remote, &b.join("f1.dat")).await;
	tb.write(&b.join("table.json"), Backup::Skip).await.unwrap();

	(a, b)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_xrootd_copy_restamps_target() {
	let root = TempDir::new().unwrap();
	let (a, b) = setup_xrootd_site(root.path()).await;
	let registry = ProtocolRegistry::new();

	let report = manager_for(&[&a, &b])
		.update(&registry, &Transport::new(FakeXrootd { fail_copies: false }), &UpdateOptions::default())
		.await
		.unwrap();

	assert_eq!(report.files_copied, 1);
	assert_eq!(fs::read_to_string(b.join("f1.dat")).unwrap(), "fresh");
	assert_eq!(mtime(&b.join("f1.dat")), 2_000_000_000);

	let tb = Table::read(&b.join("table.json"), &registry).await.unwrap();
	assert_eq!(tb.get("f1").unwrap().location.protocol_id(), "xrootd");
	let refreshed = tb.updated(None, 0, &Modifiers::new()).await.unwrap();
	assert_eq!(refreshed, tb);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_out_of_range_time_stamp_skips_restamp() {
	let root = TempDir::new().unwrap();
	let a = root.path().join("a");
	let b = root.path().join("b");
	let registry = ProtocolRegistry::new();

	write_file(&a.join("f"), "far future", 2_000_000_000);
	write_file(&b.join("f"), "old", 1_000_000_000);

	let mut ta = Table::new("local site");
	ta.insert(FileInfo::with_marks("f", ProtocolPath::local(a.join("f")), FileMarks::new(1e20, "h2")));
	ta.write(&a.join("table.json"), Backup::Skip).await.unwrap();

	let remote = registry.make(&format!("root://fake/{}", b.join("f").display()), None).unwrap();
	let mut tb = Table::new("xrootd site");
	tb.insert(FileInfo::with_marks("f", remote, FileMarks::new(1.0, "h1")));
	tb.write(&b.join("table.json"), Backup::Skip).await.unwrap();

	let report = manager_for(&[&a, &b])
		.update(&registry, &Transport::new(FakeXrootd { fail_copies: false }), &UpdateOptions::default())
		.await
		.unwrap();

	assert_eq!(report, UpdateReport { files_copied: 1, tables_written: 1 });
	assert_eq!(fs::read_to_string(b.join("f")).unwrap(), "far future");
	let tb = Table::read(&b.join("table.json"), &registry).await.unwrap();
	assert_eq!(tb.get("f").unwrap().marks, FileMarks::new(1e20, "h2"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_copy_leaves_tables_untouched() {
	let root = TempDir::new().unwrap();
	let (a, b) = setup_xrootd_site(root.path()).await;
	let before = fs::read(b.join("table.json")).unwrap();

	let err = manager_for(&[&a, &b])
		.update(
			&ProtocolRegistry::new(),
			&Transport::new(FakeXrootd { fail_copies: true }),
			&UpdateOptions::default(),
		)
		.await
		.unwrap_err();

	match err {
		SyncError::Transfer(TransferError::CopyFile { stderr, .. }) => {
			assert!(stderr.contains("Server responded with an error"));
		}
		other => panic!("expected copy failure, got {}", other),
	}
	assert_eq!(fs::read(b.join("table.json")).unwrap(), before);
	assert_eq!(fs::read_to_string(b.join("f1.dat")).unwrap(), "stale");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_staging_dir_from_options() {
	let root = TempDir::new().unwrap();
	let staging = TempDir::new().unwrap();
	let (a, b) = setup_two_sites(root.path()).await;

	manager_for(&[&a, &b])
		.update(
			&ProtocolRegistry::new(),
			&Transport::new(ProcessRunner),
			&UpdateOptions { parallel: 0, staging_dir: Some(staging.path().to_path_buf()) },
		)
		.await
		.unwrap();

	// the staging area is removed once the update ends
	assert_eq!(fs::read_dir(staging.path()).unwrap().count(), 0);
}

// vim: ts=4
