//! Built-in protocol variants: local filesystem, SSH and XRootD

use crate::config::Modifiers;
use crate::error::PathError;

use super::{parent_dir, CommandSpec, Protocol, RemoteProtocol, Resolved};

pub const LOCAL: &str = "local";
pub const SSH: &str = "ssh";
pub const XROOTD: &str = "xrootd";

const XROOTD_PREFIX: &str = "root://";

// ============================================================================
// LOCAL
// ============================================================================

/// Paths on this machine
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalProtocol;

impl Protocol for LocalProtocol {
	fn id(&self) -> &str {
		LOCAL
	}

	fn is_remote(&self) -> bool {
		false
	}

	fn accepts(&self, path: &str) -> bool {
		!path.is_empty() && !path.contains('\0')
	}

	fn copy_command(&self, source: &str, target: &str) -> CommandSpec {
		CommandSpec::new("cp").arg("-p").arg(source).arg(target)
	}

	fn mkdirs_command(&self, path: &str) -> Result<CommandSpec, PathError> {
		Ok(CommandSpec::new("mkdir").arg("-p").arg(parent_dir(path)))
	}
}

// ============================================================================
// SSH
// ============================================================================

/// `user@host:path`, where the user may be left empty (`@host:path`)
#[derive(Debug, Clone, Copy, Default)]
pub struct SshProtocol;

struct SshParts<'a> {
	user: &'a str,
	host: &'a str,
	path: &'a str,
}

fn parse_ssh(path: &str) -> Option<SshParts<'_>> {
	let at = path.find('@')?;
	let user = &path[..at];
	let after = &path[at + 1..];
	let colon = after.find(':')?;
	let host = &after[..colon];
	let rest = &after[colon + 1..];

	let bad = |c: char| c == '/' || c == ':' || c.is_whitespace();
	if user.contains(bad) || host.is_empty() || host.contains(bad) || host.contains('@') || rest.is_empty() {
		return None;
	}

	Some(SshParts { user, host, path: rest })
}

impl Protocol for SshProtocol {
	fn id(&self) -> &str {
		SSH
	}

	fn is_remote(&self) -> bool {
		true
	}

	fn accepts(&self, path: &str) -> bool {
		parse_ssh(path).is_some()
	}

	fn copy_command(&self, source: &str, target: &str) -> CommandSpec {
		CommandSpec::new("scp").arg("-q").arg("-p").arg(source).arg(target)
	}

	fn mkdirs_command(&self, path: &str) -> Result<CommandSpec, PathError> {
		let (server, remote) = self.split_location(path).ok_or_else(|| PathError::InvalidPath {
			path: path.to_string(),
			protocol: SSH.to_string(),
		})?;

		Ok(CommandSpec::new("ssh").arg(server).arg("mkdir").arg("-p").arg(parent_dir(&remote)))
	}

	fn as_remote(&self) -> Option<&dyn RemoteProtocol> {
		Some(self)
	}
}

impl RemoteProtocol for SshProtocol {
	fn split_location(&self, path: &str) -> Option<(String, String)> {
		let parts = parse_ssh(path)?;
		Some((format!("{}@{}", parts.user, parts.host), parts.path.to_string()))
	}

	fn is_local_server(&self, server: &str, modifiers: &Modifiers) -> bool {
		let host = server.rsplit('@').next().unwrap_or(server);
		modifiers.ssh_hosts.contains(host)
	}

	fn apply_modifiers(&self, path: &str, modifiers: &Modifiers) -> Result<Resolved, PathError> {
		let parts = parse_ssh(path).ok_or_else(|| PathError::InvalidPath {
			path: path.to_string(),
			protocol: SSH.to_string(),
		})?;

		if modifiers.ssh_hosts.contains(parts.host) {
			return Ok(Resolved::Local(parts.path.to_string()));
		}

		if !parts.user.is_empty() {
			return Ok(Resolved::Remote(path.to_string()));
		}

		match modifiers.ssh_usernames.get(parts.host) {
			Some(user) => Ok(Resolved::Remote(format!("{}@{}:{}", user, parts.host, parts.path))),
			None => Err(PathError::MissingUsername { path: path.to_string() }),
		}
	}
}

// ============================================================================
// XROOTD
// ============================================================================

/// `root://server//path`
#[derive(Debug, Clone, Copy, Default)]
pub struct XrootdProtocol;

fn parse_xrootd(path: &str) -> Option<(&str, &str)> {
	let after = path.strip_prefix(XROOTD_PREFIX)?;
	let sep = after.find("//")?;
	let server = &after[..sep];
	let remote = &after[sep + 1..];

	if server.is_empty() || server.contains(char::is_whitespace) || remote.len() < 2 {
		return None;
	}

	Some((server, remote))
}

impl Protocol for XrootdProtocol {
	fn id(&self) -> &str {
		XROOTD
	}

	fn is_remote(&self) -> bool {
		true
	}

	fn accepts(&self, path: &str) -> bool {
		parse_xrootd(path).is_some()
	}

	fn copy_command(&self, source: &str, target: &str) -> CommandSpec {
		CommandSpec::new("xrdcp").arg("-f").arg("-s").arg(source).arg(target)
	}

	fn mkdirs_command(&self, path: &str) -> Result<CommandSpec, PathError> {
		let (server, remote) = self.split_location(path).ok_or_else(|| PathError::InvalidPath {
			path: path.to_string(),
			protocol: XROOTD.to_string(),
		})?;

		Ok(CommandSpec::new("xrd").arg(server).arg("mkdir").arg(parent_dir(&remote)))
	}

	fn preserves_mtime(&self) -> bool {
		false
	}

	fn as_remote(&self) -> Option<&dyn RemoteProtocol> {
		Some(self)
	}
}

impl RemoteProtocol for XrootdProtocol {
	fn split_location(&self, path: &str) -> Option<(String, String)> {
		parse_xrootd(path).map(|(server, remote)| (server.to_string(), remote.to_string()))
	}

	fn is_local_server(&self, server: &str, modifiers: &Modifiers) -> bool {
		modifiers.xrootd_servers.contains(server)
	}
}


// vim: ts=4
