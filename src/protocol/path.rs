//! Protocol-qualified paths

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::config::Modifiers;
use crate::error::{PathError, SyncError, TransferError};

use super::builtin::LocalProtocol;
use super::registry::ProtocolRegistry;
use super::transfer::carrier;
use super::{CommandRunner, Protocol, Resolved};

const TIMEOUT_MARKER: &str = "Connection timed out";

/// A path string together with the protocol that interprets it
///
/// The string is kept as given. Two paths are equal when the protocol
/// identifier matches and the locations match after normalization: for
/// remote paths the server must be the same, and on the path part repeated
/// separators and `.` components are dropped. `..` is left alone.
#[derive(Clone)]
pub struct ProtocolPath {
	path: String,
	protocol: Arc<dyn Protocol>,
}

impl ProtocolPath {
	pub(crate) fn with_protocol(path: &str, protocol: Arc<dyn Protocol>) -> Self {
		ProtocolPath { path: path.to_string(), protocol }
	}

	/// Path on the local filesystem
	pub fn local(path: impl AsRef<Path>) -> Self {
		ProtocolPath {
			path: path.as_ref().to_string_lossy().into_owned(),
			protocol: Arc::new(LocalProtocol),
		}
	}

	pub fn path(&self) -> &str {
		&self.path
	}

	pub fn protocol_id(&self) -> &str {
		self.protocol.id()
	}

	pub fn protocol(&self) -> &Arc<dyn Protocol> {
		&self.protocol
	}

	pub fn is_remote(&self) -> bool {
		self.protocol.is_remote()
	}

	/// Server and path on that server, `None` for local paths
	pub fn split_location(&self) -> Option<(String, String)> {
		self.protocol.as_remote().and_then(|r| r.split_location(&self.path))
	}

	/// New path with the modifiers applied; `self` is left untouched
	///
	/// Remote paths on servers configured as this machine become local.
	pub fn with_modifiers(&self, modifiers: &Modifiers) -> Result<ProtocolPath, PathError> {
		let remote = match self.protocol.as_remote() {
			Some(r) => r,
			None => return Ok(self.clone()),
		};

		match remote.apply_modifiers(&self.path, modifiers)? {
			Resolved::Remote(path) => Ok(ProtocolPath::with_protocol(&path, Arc::clone(&self.protocol))),
			Resolved::Local(path) => Ok(ProtocolPath::local(path)),
		}
	}

	/// Path on this machine holding the same bytes, if there is one
	///
	/// A remote path counts as locally visible when its server is
	/// configured as local, or when its server-side path exists here.
	pub fn local_path(&self, modifiers: &Modifiers) -> Option<PathBuf> {
		if !self.is_remote() {
			return Some(PathBuf::from(&self.path));
		}

		if let Ok(resolved) = self.with_modifiers(modifiers) {
			if !resolved.is_remote() {
				return Some(PathBuf::from(resolved.path));
			}
		}

		let (_, remote) = self.split_location()?;
		let candidate = PathBuf::from(remote);
		if candidate.exists() {
			Some(candidate)
		} else {
			None
		}
	}

	/// Copy the bytes at `self` to `target`
	///
	/// Paths handled by two different remote protocols are relayed through
	/// a temporary local file, removed once the copy ends.
	pub async fn copy(&self, target: &ProtocolPath, runner: &dyn CommandRunner) -> Result<(), SyncError> {
		self.copy_through(target, runner, None).await
	}

	/// [`copy`](Self::copy) with the relay directory created under `staging_root`
	///
	/// The system temporary directory is used when `staging_root` is `None`.
	/// The relay directory is removed whether the copy succeeds or not.
	pub async fn copy_through(
		&self,
		target: &ProtocolPath,
		runner: &dyn CommandRunner,
		staging_root: Option<&Path>,
	) -> Result<(), SyncError> {
		match carrier(self, target) {
			Some(protocol) => copy_direct(protocol.as_ref(), self, target, runner).await,
			None => {
				let mut builder = tempfile::Builder::new();
				builder.prefix("tabsync-relay");
				let staging = match staging_root {
					Some(root) => builder.tempdir_in(root)?,
					None => builder.tempdir()?,
				};
				let name = Path::new(&self.path).file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "relay".into());
				let relay = ProtocolPath::local(staging.path().join(name));

				debug!("Relaying {} -> {} through {}", self, target, relay);
				copy_direct(self.protocol.as_ref(), self, &relay, runner).await?;
				copy_direct(target.protocol.as_ref(), &relay, target, runner).await
			}
		}
	}

	/// Server (remote paths only) and normalized path, the identity used by `Eq`
	fn location_key(&self) -> (Option<String>, String) {
		match self.split_location() {
			Some((server, path)) => (Some(server), normalize(&path)),
			None => (None, normalize(&self.path)),
		}
	}

	/// Create the parent directory chain of this path
	pub async fn make_directories(&self, runner: &dyn CommandRunner) -> Result<(), SyncError> {
		let cmd = self.protocol.mkdirs_command(&self.path)?;

		let output = runner
			.run(&cmd)
			.await
			.map_err(|e| TransferError::Spawn { program: cmd.program.clone(), source: e })?;

		if output.success {
			return Ok(());
		}

		if output.stderr.contains(TIMEOUT_MARKER) {
			Err(TransferError::Timeout { target: self.path.clone() }.into())
		} else {
			Err(TransferError::MakeDirs { target: self.path.clone(), stderr: output.stderr }.into())
		}
	}
}

async fn copy_direct(
	protocol: &dyn Protocol,
	source: &ProtocolPath,
	target: &ProtocolPath,
	runner: &dyn CommandRunner,
) -> Result<(), SyncError> {
	let cmd = protocol.copy_command(&source.path, &target.path);

	let output = runner
		.run(&cmd)
		.await
		.map_err(|e| TransferError::Spawn { program: cmd.program.clone(), source: e })?;

	if output.success {
		Ok(())
	} else {
		Err(TransferError::CopyFile {
			source: source.path.clone(),
			target: target.path.clone(),
			stderr: output.stderr,
		}
		.into())
	}
}

fn normalize(path: &str) -> String {
	let joined = path.split('/').filter(|c| !c.is_empty() && *c != ".").collect::<Vec<_>>().join("/");
	if path.starts_with('/') {
		format!("/{}", joined)
	} else if joined.is_empty() {
		".".to_string()
	} else {
		joined
	}
}

impl PartialEq for ProtocolPath {
	fn eq(&self, other: &Self) -> bool {
		self.protocol_id() == other.protocol_id() && self.location_key() == other.location_key()
	}
}

impl Eq for ProtocolPath {}

impl Hash for ProtocolPath {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.protocol_id().hash(state);
		self.location_key().hash(state);
	}
}

impl fmt::Debug for ProtocolPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProtocolPath").field("path", &self.path).field("protocol", &self.protocol_id()).finish()
	}
}

impl fmt::Display for ProtocolPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.path)
	}
}

static DEFAULT_REGISTRY: OnceLock<ProtocolRegistry> = OnceLock::new();

/// Build a path with the built-in protocols, inferring the protocol
///
/// Convenience entry point; code that must not depend on inference should
/// go through [`ProtocolRegistry::make`] with an explicit identifier.
pub fn protocol_path(path: &str) -> Result<ProtocolPath, PathError> {
	DEFAULT_REGISTRY.get_or_init(ProtocolRegistry::new).make(path, None)
}

/// First location in `paths` that can be used right now
///
/// Locally visible locations are returned as local paths. Remote
/// locations that are not visible are only used when their protocol is
/// listed in `allowed`.
pub fn available_location(
	paths: &[ProtocolPath],
	allowed: &[String],
	modifiers: &Modifiers,
) -> Result<ProtocolPath, PathError> {
	for path in paths {
		if let Some(local) = path.local_path(modifiers) {
			if local.exists() {
				return Ok(ProtocolPath::local(local));
			}
		}

		if path.is_remote() && allowed.iter().any(|id| id == path.protocol_id()) {
			return Ok(path.clone());
		}
	}

	Err(PathError::NoAvailableLocation { paths: paths.iter().map(|p| p.path.clone()).collect() })
}


// vim: ts=4
