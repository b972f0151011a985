use clap::{Arg, ArgAction, ArgMatches, Command};
use regex::Regex;
use std::path::{Path, PathBuf};

use tabsync::logging::{info, init_tracing, level_for_verbosity, warn};
use tabsync::{
	Backup, Collisions, Config, FileInfo, Manager, ProcessRunner, ProtocolRegistry, SyncError, Table, Transport,
	UpdateOptions,
};

///////////////////////
// Utility functions //
///////////////////////

fn load_config(matches: &ArgMatches) -> Result<Config, SyncError> {
	match matches.get_one::<String>("config") {
		Some(path) => Config::load(Path::new(path)),
		None => Config::discover(),
	}
}

fn compile_regex(pattern: &str) -> Result<Regex, SyncError> {
	Regex::new(pattern).map_err(|e| SyncError::Other { message: format!("Invalid regex \"{}\": {}", pattern, e) })
}

fn backup_mode(matches: &ArgMatches) -> Backup {
	if matches.get_flag("backup") {
		Backup::Beside
	} else {
		Backup::Skip
	}
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str, SyncError> {
	matches
		.get_one::<String>(name)
		.map(|s| s.as_str())
		.ok_or_else(|| SyncError::Other { message: format!("Missing argument {}", name) })
}

fn many(matches: &ArgMatches, name: &str) -> Vec<String> {
	matches.get_many::<String>(name).map(|v| v.cloned().collect()).unwrap_or_default()
}

fn backup_arg() -> Arg {
	Arg::new("backup")
		.long("backup")
		.action(ArgAction::SetTrue)
		.help("Keep the previous table as <path>.backup")
}

fn parallel_arg() -> Arg {
	Arg::new("parallel")
		.short('j')
		.long("parallel")
		.value_name("N")
		.value_parser(clap::value_parser!(usize))
		.help("Number of parallel workers (0 = sequential)")
}

fn cli() -> Command {
	Command::new("tabsync")
		.version(env!("CARGO_PKG_VERSION"))
		.author(env!("CARGO_PKG_AUTHORS"))
		.about("Table-based file synchronization across local, SSH and XRootD locations")
		.subcommand_required(true)
		.arg(
			Arg::new("verbose")
				.short('v')
				.long("verbose")
				.action(ArgAction::Count)
				.global(true)
				.help("Increase verbosity"),
		)
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.global(true)
				.help("Configuration file (TOML or JSON5)"),
		)
		.subcommand(
			Command::new("table")
				.about("Create and edit tables")
				.subcommand_required(true)
				.subcommand(
					Command::new("create")
						.about("Create an empty table")
						.arg(Arg::new("path").required(true))
						.arg(Arg::new("description").short('d').long("description").value_name("TEXT")),
				)
				.subcommand(
					Command::new("add")
						.about("Add a file to a table")
						.arg(Arg::new("path").required(true))
						.arg(Arg::new("name").required(true))
						.arg(Arg::new("file").required(true))
						.arg(
							Arg::new("bare")
								.long("bare")
								.action(ArgAction::SetTrue)
								.help("Register without computing marks"),
						)
						.arg(backup_arg()),
				)
				.subcommand(
					Command::new("add-from-dir")
						.about("Add every file found under a directory")
						.arg(Arg::new("path").required(true))
						.arg(Arg::new("dir").required(true))
						.arg(Arg::new("regex").long("regex").value_name("RE"))
						.arg(Arg::new("bare").long("bare").action(ArgAction::SetTrue))
						.arg(backup_arg()),
				)
				.subcommand(
					Command::new("remove")
						.about("Remove files from a table")
						.arg(Arg::new("path").required(true))
						.arg(Arg::new("files").long("files").value_name("NAME").num_args(1..))
						.arg(Arg::new("regex").long("regex").value_name("RE"))
						.group(clap::ArgGroup::new("selection").args(["files", "regex"]).required(true))
						.arg(backup_arg()),
				)
				.subcommand(
					Command::new("update")
						.about("Recompute the marks of the files in a table")
						.arg(Arg::new("path").required(true))
						.arg(Arg::new("files").long("files").value_name("NAME").num_args(1..))
						.arg(parallel_arg())
						.arg(backup_arg()),
				)
				.subcommand(Command::new("display").about("Print a table").arg(Arg::new("path").required(true)))
				.subcommand(
					Command::new("replicate")
						.about("Recreate the structure of a reference table under another root")
						.arg(Arg::new("path").required(true))
						.arg(Arg::new("reference").required(true))
						.arg(Arg::new("ref_root").required(true))
						.arg(Arg::new("new_root").required(true))
						.arg(
							Arg::new("collisions")
								.long("collisions")
								.value_parser(["fail", "omit", "replace"])
								.default_value("fail"),
						)
						.arg(backup_arg()),
				),
		)
		.subcommand(
			Command::new("sync")
				.about("Synchronize tables and the files they list")
				.arg(Arg::new("tables").required(true).action(ArgAction::Append).num_args(1..))
				.arg(parallel_arg()),
		)
		.subcommand(
			Command::new("available")
				.about("Print the first table reachable from this machine")
				.arg(Arg::new("tables").required(true).action(ArgAction::Append).num_args(1..))
				.arg(Arg::new("allow").long("allow").value_name("PROTOCOL").num_args(1..)),
		)
}

////////////////////
// Table commands //
////////////////////

async fn run_table(matches: &ArgMatches, config: &Config, registry: &ProtocolRegistry) -> Result<(), SyncError> {
	let (command, sub) = matches
		.subcommand()
		.ok_or_else(|| SyncError::Other { message: "table: subcommand required".to_string() })?;
	let path = PathBuf::from(required(sub, "path")?);

	match command {
		"create" => {
			if path.exists() {
				return Err(SyncError::Other { message: format!("{} already exists", path.display()) });
			}
			let description = sub.get_one::<String>("description").map(|s| s.as_str()).unwrap_or("");
			Table::new(description).write(&path, Backup::Skip).await?;
			info!("Created table {}", path.display());
		}
		"add" => {
			let mut table = Table::read(&path, registry).await?;
			let name = required(sub, "name")?;
			let location = registry.make(required(sub, "file")?, None)?;
			let entry = if sub.get_flag("bare") {
				FileInfo::new(name, location)
			} else {
				FileInfo::from_name_and_local_file(name, location, &config.modifiers).await?
			};
			if table.insert(entry).is_some() {
				info!("Replaced entry \"{}\"", name);
			}
			table.write(&path, backup_mode(sub)).await?;
		}
		"add-from-dir" => {
			let mut table = Table::read(&path, registry).await?;
			let regex = sub.get_one::<String>("regex").map(|r| compile_regex(r)).transpose()?;
			let dir = PathBuf::from(required(sub, "dir")?);
			table.add_from_dir(&dir, regex.as_ref(), sub.get_flag("bare"), &config.modifiers).await?;
			table.write(&path, backup_mode(sub)).await?;
		}
		"remove" => {
			let mut table = Table::read(&path, registry).await?;
			let mut removed = 0;
			for name in many(sub, "files") {
				match table.remove(&name) {
					Some(_) => removed += 1,
					None => warn!("File \"{}\" is not in the table", name),
				}
			}
			if let Some(pattern) = sub.get_one::<String>("regex") {
				removed += table.remove_matching(&compile_regex(pattern)?).len();
			}
			info!("Removed {} entries", removed);
			table.write(&path, backup_mode(sub)).await?;
		}
		"update" => {
			let table = Table::read(&path, registry).await?;
			let files = many(sub, "files");
			let subset = if files.is_empty() { None } else { Some(files.as_slice()) };
			let parallel = sub.get_one::<usize>("parallel").copied().unwrap_or(config.parallel);
			let updated = table.updated(subset, parallel, &config.modifiers).await?;
			updated.write(&path, backup_mode(sub)).await?;
		}
		"display" => {
			let table = Table::read(&path, registry).await?;
			println!("description: {}", table.description);
			if let Some(last_update) = &table.last_update {
				println!("last update: {}", last_update);
			}
			for f in table.files() {
				println!(
					"{}\t{}\t{}\t{}\t{}",
					f.name,
					f.location.path(),
					f.location.protocol_id(),
					f.marks.timestamp,
					f.marks.fid
				);
			}
		}
		"replicate" => {
			let mut table = Table::read(&path, registry).await?;
			let reference = Table::read(Path::new(required(sub, "reference")?), registry).await?;
			let collisions: Collisions =
				required(sub, "collisions")?.parse().map_err(|message| SyncError::Other { message })?;
			let added = table.replicate(
				&reference,
				required(sub, "ref_root")?,
				required(sub, "new_root")?,
				collisions,
				registry,
			)?;
			info!("Replicated {} entries", added.len());
			table.write(&path, backup_mode(sub)).await?;
		}
		other => return Err(SyncError::Other { message: format!("Unknown table command \"{}\"", other) }),
	}

	Ok(())
}

//////////
// Main //
//////////

async fn run(matches: &ArgMatches) -> Result<(), SyncError> {
	let config = load_config(matches)?;
	let verbose = matches.get_count("verbose");
	init_tracing(if verbose > 0 { level_for_verbosity(verbose) } else { config.log_level.as_str() });

	let registry = ProtocolRegistry::new();

	match matches.subcommand() {
		Some(("table", sub)) => run_table(sub, &config, &registry).await,
		Some(("sync", sub)) => {
			let mut manager = Manager::new();
			for table in many(sub, "tables") {
				manager.add_table(registry.make(&table, None)?);
			}

			let options = UpdateOptions {
				parallel: sub.get_one::<usize>("parallel").copied().unwrap_or(config.parallel),
				staging_dir: config.staging_dir.clone(),
			};
			let transport = Transport::new(ProcessRunner)
				.with_modifiers(config.modifiers.clone())
				.with_staging_dir(config.staging_dir.clone());

			let report = manager.update(&registry, &transport, &options).await?;
			info!("Copied {} files, updated {} tables", report.files_copied, report.tables_written);
			Ok(())
		}
		Some(("available", sub)) => {
			let mut manager = Manager::new();
			for table in many(sub, "tables") {
				manager.add_table(registry.make(&table, None)?);
			}

			let allowed = match sub.get_many::<String>("allow") {
				Some(values) => values.cloned().collect(),
				None => config.allowed_protocols.clone(),
			};
			println!("{}", manager.available_table(&allowed, &config.modifiers)?);
			Ok(())
		}
		_ => Err(SyncError::Other { message: "Unknown command".to_string() }),
	}
}

#[tokio::main]
async fn main() {
	let matches = cli().get_matches();

	if let Err(e) = run(&matches).await {
		eprintln!("{}", e);
		std::process::exit(e.exit_code());
	}
}

// vim: ts=4
