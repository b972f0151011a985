//! Transfer policy between protocol paths

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::config::Modifiers;
use crate::error::SyncError;

use super::{CommandRunner, Protocol, ProtocolPath, LOCAL};

/// Protocol able to carry a copy between two paths
///
/// `None` when both paths are remote with different protocols.
pub(crate) fn carrier(a: &ProtocolPath, b: &ProtocolPath) -> Option<Arc<dyn Protocol>> {
	match (a.is_remote(), b.is_remote()) {
		(true, true) if a.protocol_id() == b.protocol_id() => Some(Arc::clone(a.protocol())),
		(true, true) => None,
		(true, false) => Some(Arc::clone(a.protocol())),
		(false, true) => Some(Arc::clone(b.protocol())),
		(false, false) => Some(Arc::clone(a.protocol())),
	}
}

/// Identifier of the protocol carrying a copy between `a` and `b`
///
/// The remote side wins; `"local"` when both are local; `None` when both
/// are remote but incompatible and the copy has to be relayed.
pub fn remote_protocol(a: &ProtocolPath, b: &ProtocolPath) -> Option<String> {
	match (a.is_remote(), b.is_remote()) {
		(false, false) => Some(LOCAL.to_string()),
		_ => carrier(a, b).map(|p| p.id().to_string()),
	}
}

/// Whether copying `a` to `b` keeps the modification time of `a`
pub fn preserves_mtime(a: &ProtocolPath, b: &ProtocolPath) -> bool {
	match carrier(a, b) {
		Some(p) => p.preserves_mtime(),
		None => a.protocol().preserves_mtime() && b.protocol().preserves_mtime(),
	}
}

/// Command runner plus path modifiers, shared by every copy of a run
#[derive(Clone)]
pub struct Transport {
	runner: Arc<dyn CommandRunner>,
	modifiers: Arc<Modifiers>,
	staging_dir: Option<PathBuf>,
}

impl Transport {
	pub fn new<R: CommandRunner + 'static>(runner: R) -> Self {
		Self::from_runner(Arc::new(runner))
	}

	pub fn from_runner(runner: Arc<dyn CommandRunner>) -> Self {
		Transport { runner, modifiers: Arc::new(Modifiers::default()), staging_dir: None }
	}

	pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
		self.modifiers = Arc::new(modifiers);
		self
	}

	/// Parent directory for relay copies between incompatible remotes
	pub fn with_staging_dir(mut self, dir: Option<PathBuf>) -> Self {
		self.staging_dir = dir;
		self
	}

	pub fn modifiers(&self) -> &Modifiers {
		&self.modifiers
	}

	pub fn runner(&self) -> &dyn CommandRunner {
		self.runner.as_ref()
	}

	/// Copy `source` to `target`, creating the target directories first
	///
	/// Modifiers are applied to both ends before anything runs.
	pub async fn copy_file(&self, source: &ProtocolPath, target: &ProtocolPath) -> Result<(), SyncError> {
		let source = source.with_modifiers(&self.modifiers)?;
		let target = target.with_modifiers(&self.modifiers)?;

		debug!("Copying {} -> {}", source, target);
		target.make_directories(self.runner()).await?;
		source.copy_through(&target, self.runner(), self.staging_dir.as_deref()).await
	}

	/// Whether [`copy_file`](Self::copy_file) keeps the source modification time
	pub fn preserves_mtime(&self, source: &ProtocolPath, target: &ProtocolPath) -> bool {
		match (source.with_modifiers(&self.modifiers), target.with_modifiers(&self.modifiers)) {
			(Ok(s), Ok(t)) => preserves_mtime(&s, &t),
			_ => preserves_mtime(source, target),
		}
	}
}


// vim: ts=4
