//! External command execution
//!
//! Transfers and directory creation are delegated to external programs
//! (`cp`, `scp`, `xrdcp`, `ssh`, `xrd`). Protocols only describe the argument
//! lists; running them is the job of a [`CommandRunner`], which makes it
//! possible to count, record or fake transfers.

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::process::Stdio;
use tracing::debug;

/// Program plus argument list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
	pub program: String,
	pub args: Vec<String>,
}

impl CommandSpec {
	pub fn new(program: &str) -> Self {
		CommandSpec { program: program.to_string(), args: Vec::new() }
	}

	pub fn arg(mut self, arg: impl Into<String>) -> Self {
		self.args.push(arg.into());
		self
	}
}

impl fmt::Display for CommandSpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.program)?;
		for arg in &self.args {
			write!(f, " {}", arg)?;
		}
		Ok(())
	}
}

/// Outcome of an external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
	/// Whether the program exited cleanly
	pub success: bool,

	/// Exit code, if the program was not killed by a signal
	pub code: Option<i32>,

	/// Captured error output
	pub stderr: String,
}

impl CommandOutput {
	pub fn ok() -> Self {
		CommandOutput { success: true, code: Some(0), stderr: String::new() }
	}

	pub fn failed(code: i32, stderr: &str) -> Self {
		CommandOutput { success: false, code: Some(code), stderr: stderr.to_string() }
	}
}

/// Runs external commands and captures exit status plus stderr
#[async_trait]
pub trait CommandRunner: Send + Sync {
	/// Run the command to completion
	///
	/// `Err` means the program could not be started at all; a program that
	/// ran and failed is reported through [`CommandOutput::success`].
	async fn run(&self, cmd: &CommandSpec) -> io::Result<CommandOutput>;
}

/// Runs commands as child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
	async fn run(&self, cmd: &CommandSpec) -> io::Result<CommandOutput> {
		debug!("Running: {}", cmd);

		let output = tokio::process::Command::new(&cmd.program)
			.args(&cmd.args)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.output()
			.await?;

		Ok(CommandOutput {
			success: output.status.success(),
			code: output.status.code(),
			stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_command_spec_display() {
		let cmd = CommandSpec::new("scp").arg("-q").arg("a").arg("b");
		assert_eq!(cmd.to_string(), "scp -q a b");
	}

	#[tokio::test]
	async fn test_process_runner_success() {
		let out = ProcessRunner.run(&CommandSpec::new("true")).await.unwrap();
		assert!(out.success);
		assert_eq!(out.code, Some(0));
	}

	#[tokio::test]
	async fn test_process_runner_failure_captures_stderr() {
		let cmd = CommandSpec::new("sh").arg("-c").arg("echo oops >&2; exit 3");
		let out = ProcessRunner.run(&cmd).await.unwrap();
		assert!(!out.success);
		assert_eq!(out.code, Some(3));
		assert_eq!(out.stderr.trim(), "oops");
	}

	#[tokio::test]
	async fn test_process_runner_missing_program() {
		let result = ProcessRunner.run(&CommandSpec::new("tabsync-no-such-program")).await;
		assert!(result.is_err());
	}
}

// vim: ts=4
