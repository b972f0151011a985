//! Protocol abstraction layer
//!
//! Every location a table or a file can live at is a [`ProtocolPath`]: a
//! path string in the native syntax of some protocol (local filesystem,
//! SSH, XRootD, or a user-registered variant). Protocols describe how to
//! copy and how to create directories; the external programs themselves
//! are run by a [`CommandRunner`].
//!
//! # Example Usage
//!
//! ```ignore
//! use tabsync::protocol::{ProtocolRegistry, ProcessRunner, Transport};
//!
//! let registry = ProtocolRegistry::new();
//! let source = registry.make("user@host:/data/file.root", None)?;
//! let target = registry.make("/local/copy/file.root", None)?;
//! Transport::new(ProcessRunner).copy_file(&source, &target).await?;
//! ```

pub mod builtin;
pub mod path;
pub mod registry;
pub mod runner;
pub mod transfer;

use std::fmt;

use crate::config::Modifiers;
use crate::error::PathError;

pub use builtin::{LocalProtocol, SshProtocol, XrootdProtocol, LOCAL, SSH, XROOTD};
pub use path::{available_location, protocol_path, ProtocolPath};
pub use registry::ProtocolRegistry;
pub use runner::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use transfer::{remote_protocol, Transport};

/// A protocol variant
///
/// Copy and directory creation are required methods, so a variant that
/// forgets one of them does not build:
///
/// ```compile_fail
/// use tabsync::protocol::{CommandSpec, Protocol};
/// use tabsync::error::PathError;
///
/// #[derive(Debug)]
/// struct NoCopy;
///
/// impl Protocol for NoCopy {
///     fn id(&self) -> &str { "nocopy" }
///     fn is_remote(&self) -> bool { false }
///     fn accepts(&self, _path: &str) -> bool { true }
///     fn mkdirs_command(&self, path: &str) -> Result<CommandSpec, PathError> {
///         Ok(CommandSpec::new("mkdir").arg("-p").arg(path))
///     }
/// }
/// ```
///
/// Remote variants must also expose [`RemoteProtocol`] through
/// [`Protocol::as_remote`]; the registry refuses them otherwise.
pub trait Protocol: Send + Sync + fmt::Debug {
	/// Unique identifier, stored alongside paths in manifests
	fn id(&self) -> &str;

	/// Whether paths of this protocol live on another machine
	fn is_remote(&self) -> bool;

	/// Syntax check for a path in this protocol's native form
	fn accepts(&self, path: &str) -> bool;

	/// Command copying `source` to `target` (either may be local)
	fn copy_command(&self, source: &str, target: &str) -> CommandSpec;

	/// Command creating the parent directory chain of `path`
	fn mkdirs_command(&self, path: &str) -> Result<CommandSpec, PathError>;

	/// Whether a copy keeps the source modification time
	fn preserves_mtime(&self) -> bool {
		true
	}

	/// Remote capabilities, `None` for local variants
	fn as_remote(&self) -> Option<&dyn RemoteProtocol> {
		None
	}
}

/// Capabilities shared by all remote variants
pub trait RemoteProtocol: Protocol {
	/// Split a path into server and path on that server
	fn split_location(&self, path: &str) -> Option<(String, String)>;

	/// Whether `server` refers to this machine (or a local mount of it)
	fn is_local_server(&self, server: &str, modifiers: &Modifiers) -> bool;

	/// Fill in credentials or host substitutions
	///
	/// The default collapses paths on local servers to [`Resolved::Local`]
	/// and leaves everything else untouched.
	fn apply_modifiers(&self, path: &str, modifiers: &Modifiers) -> Result<Resolved, PathError> {
		let (server, remote) = self.split_location(path).ok_or_else(|| PathError::InvalidPath {
			path: path.to_string(),
			protocol: self.id().to_string(),
		})?;

		if self.is_local_server(&server, modifiers) {
			Ok(Resolved::Local(remote))
		} else {
			Ok(Resolved::Remote(path.to_string()))
		}
	}
}

/// Result of applying modifiers to a remote path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
	/// Still a path of the same remote protocol
	Remote(String),

	/// The server is this machine; path on the local filesystem
	Local(String),
}

/// Parent directory of a path, `./` when there is none
pub(crate) fn parent_dir(path: &str) -> String {
	match std::path::Path::new(path).parent() {
		Some(p) if !p.as_os_str().is_empty() => p.to_string_lossy().into_owned(),
		_ => "./".to_string(),
	}
}


// vim: ts=4
