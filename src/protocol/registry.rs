//! Protocol registry
//!
//! Resolves protocol identifiers and infers the protocol of unqualified
//! paths. Remote variants are tried first; the local variant only claims a
//! path no remote variant accepts. A path accepted by several remote
//! variants is rejected instead of being resolved by registration order.

use std::sync::Arc;

use crate::error::{PathError, RegistrationError};

use super::builtin::{LocalProtocol, SshProtocol, XrootdProtocol};
use super::{Protocol, ProtocolPath};

/// Set of known protocol variants
#[derive(Debug, Clone)]
pub struct ProtocolRegistry {
	protocols: Vec<Arc<dyn Protocol>>,
}

impl Default for ProtocolRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl ProtocolRegistry {
	/// Registry holding the built-in variants
	pub fn new() -> Self {
		ProtocolRegistry {
			protocols: vec![Arc::new(XrootdProtocol), Arc::new(SshProtocol), Arc::new(LocalProtocol)],
		}
	}

	/// Registry without any variant
	pub fn empty() -> Self {
		ProtocolRegistry { protocols: Vec::new() }
	}

	/// Add a variant
	///
	/// Fails if the identifier is taken, or if a remote variant does not
	/// provide its remote capabilities.
	pub fn register(&mut self, protocol: Arc<dyn Protocol>) -> Result<(), RegistrationError> {
		let id = protocol.id().to_string();

		if self.get(&id).is_some() {
			return Err(RegistrationError::DuplicateId { id });
		}

		if protocol.is_remote() && protocol.as_remote().is_none() {
			return Err(RegistrationError::MissingOverride { id, method: "split_location".to_string() });
		}

		self.protocols.push(protocol);
		Ok(())
	}

	/// Look up a variant by identifier
	pub fn get(&self, id: &str) -> Option<Arc<dyn Protocol>> {
		self.protocols.iter().find(|p| p.id() == id).cloned()
	}

	/// Registered identifiers, in priority order
	pub fn ids(&self) -> Vec<String> {
		self.protocols.iter().map(|p| p.id().to_string()).collect()
	}

	/// Build a path, validating it against `protocol` or inferring one
	pub fn make(&self, path: &str, protocol: Option<&str>) -> Result<ProtocolPath, PathError> {
		match protocol {
			Some(id) => {
				let proto = self.get(id).ok_or_else(|| PathError::UnknownProtocol { id: id.to_string() })?;
				if !proto.accepts(path) {
					return Err(PathError::InvalidPath { path: path.to_string(), protocol: id.to_string() });
				}
				Ok(ProtocolPath::with_protocol(path, proto))
			}
			None => self.infer(path),
		}
	}

	fn infer(&self, path: &str) -> Result<ProtocolPath, PathError> {
		let remote: Vec<&Arc<dyn Protocol>> =
			self.protocols.iter().filter(|p| p.is_remote() && p.accepts(path)).collect();

		match remote.as_slice() {
			[single] => return Ok(ProtocolPath::with_protocol(path, Arc::clone(single))),
			[] => {}
			several => {
				return Err(PathError::AmbiguousPath {
					path: path.to_string(),
					candidates: several.iter().map(|p| p.id().to_string()).collect(),
				});
			}
		}

		self.protocols
			.iter()
			.find(|p| !p.is_remote() && p.accepts(path))
			.map(|p| ProtocolPath::with_protocol(path, Arc::clone(p)))
			.ok_or_else(|| PathError::AmbiguousPath { path: path.to_string(), candidates: vec![] })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::protocol::{CommandSpec, LOCAL, SSH, XROOTD};

	#[derive(Debug)]
	struct HalfRemote;

	impl Protocol for HalfRemote {
		fn id(&self) -> &str {
			"half"
		}

		fn is_remote(&self) -> bool {
			true
		}

		fn accepts(&self, path: &str) -> bool {
			path.starts_with("half:")
		}

		fn copy_command(&self, source: &str, target: &str) -> CommandSpec {
			CommandSpec::new("cp").arg(source).arg(target)
		}

		fn mkdirs_command(&self, path: &str) -> Result<CommandSpec, PathError> {
			Ok(CommandSpec::new("mkdir").arg(path))
		}
	}

	#[test]
	fn test_inference() {
		let registry = ProtocolRegistry::new();
		assert_eq!(registry.make("user@host:/a/b", None).unwrap().protocol_id(), SSH);
		assert_eq!(registry.make("root://site//a/b", None).unwrap().protocol_id(), XROOTD);
		assert_eq!(registry.make("/a/b", None).unwrap().protocol_id(), LOCAL);
		assert_eq!(registry.make("relative/file", None).unwrap().protocol_id(), LOCAL);
	}

	#[test]
	fn test_explicit_protocol() {
		let registry = ProtocolRegistry::new();
		assert_eq!(
			registry.make("/a/b", Some(SSH)),
			Err(PathError::InvalidPath { path: "/a/b".into(), protocol: SSH.into() })
		);
		assert_eq!(
			registry.make("/a/b", Some("ftp")),
			Err(PathError::UnknownProtocol { id: "ftp".into() })
		);
		assert_eq!(registry.make("user@host:/a", Some(LOCAL)).unwrap().protocol_id(), LOCAL);
	}

	#[test]
	fn test_no_protocol_accepts() {
		assert_eq!(
			ProtocolRegistry::new().make("", None),
			Err(PathError::AmbiguousPath { path: "".into(), candidates: vec![] })
		);
		assert!(ProtocolRegistry::empty().make("/a", None).is_err());
	}

	#[test]
	fn test_register_duplicate() {
		let mut registry = ProtocolRegistry::new();
		assert_eq!(
			registry.register(Arc::new(SshProtocol)),
			Err(RegistrationError::DuplicateId { id: SSH.into() })
		);
	}

	#[test]
	fn test_register_remote_without_capabilities() {
		let mut registry = ProtocolRegistry::new();
		assert_eq!(
			registry.register(Arc::new(HalfRemote)),
			Err(RegistrationError::MissingOverride { id: "half".into(), method: "split_location".into() })
		);
		assert!(registry.get("half").is_none());
	}

	#[test]
	fn test_ambiguous_remote() {
		#[derive(Debug)]
		struct OtherSsh;

		impl Protocol for OtherSsh {
			fn id(&self) -> &str {
				"ssh2"
			}
			fn is_remote(&self) -> bool {
				true
			}
			fn accepts(&self, path: &str) -> bool {
				SshProtocol.accepts(path)
			}
			fn copy_command(&self, source: &str, target: &str) -> CommandSpec {
				SshProtocol.copy_command(source, target)
			}
			fn mkdirs_command(&self, path: &str) -> Result<CommandSpec, PathError> {
				SshProtocol.mkdirs_command(path)
			}
			fn as_remote(&self) -> Option<&dyn crate::protocol::RemoteProtocol> {
				Some(&SshProtocol)
			}
		}

		let mut registry = ProtocolRegistry::new();
		registry.register(Arc::new(OtherSsh)).unwrap();
		match registry.make("u@h:/a", None) {
			Err(PathError::AmbiguousPath { candidates, .. }) => {
				assert_eq!(candidates, vec![SSH.to_string(), "ssh2".to_string()]);
			}
			other => panic!("expected ambiguity, got {:?}", other),
		}
		assert_eq!(registry.make("u@h:/a", Some("ssh2")).unwrap().protocol_id(), "ssh2");
	}
}

// vim: ts=4
