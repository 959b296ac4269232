//! Command execution bound to one target.
//!
//! A [`Transport`] is what a flight body receives. It runs shell commands on
//! exactly one target (this machine, or one remote host) through a
//! [`CommandRunner`], and keeps the target's pass/fail state: the first failed
//! command aborts the transport and leaves a crash recording behind.
//!
//! Commands block the calling thread until they finish, so bodies read
//! top-to-bottom. Remote flights get concurrency by running each host's body
//! on its own thread.

pub mod local;
pub mod ssh;

pub use local::{execute_local_command, execute_local_command_in_dir, LocalRunner};
pub use ssh::SshClient;

use crate::abort::AbortToken;
use crate::error::{CommandFailedDetails, Error, Result};
use crate::host::Host;
use crate::reporter::{PlanEvent, Reporter};
use crate::utils::shell;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn spawn_error(message: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
            success: false,
            exit_code: -1,
        }
    }
}

/// Low-level primitive that actually runs a command somewhere.
pub trait CommandRunner: Send {
    fn run(&self, command: &str, stdin_file: Option<&Path>) -> CommandOutput;
    fn target(&self) -> String;
    fn is_remote(&self) -> bool;
}

/// Builds runners for flights. One runner per transport, never shared.
pub trait TransportFactory: Send + Sync {
    fn local(&self) -> Box<dyn CommandRunner>;
    fn remote(&self, host: &Host) -> Result<Box<dyn CommandRunner>>;
}

/// `sh -c` locally, the system `ssh` binary remotely.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellTransportFactory;

impl TransportFactory for ShellTransportFactory {
    fn local(&self) -> Box<dyn CommandRunner> {
        Box::new(LocalRunner::new())
    }

    fn remote(&self, host: &Host) -> Result<Box<dyn CommandRunner>> {
        Ok(Box::new(SshClient::from_host(host)?))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// A failing command is returned as output instead of aborting.
    pub failsafe: bool,
    /// Do not announce the command to the reporter.
    pub silent: bool,
}

impl ExecOptions {
    pub fn failsafe() -> Self {
        Self {
            failsafe: true,
            silent: false,
        }
    }
}

pub struct Transport {
    runner: Box<dyn CommandRunner>,
    reporter: Arc<dyn Reporter>,
    plan_abort: AbortToken,
    cwd_stack: Vec<String>,
    aborted: bool,
    crash_recordings: Vec<String>,
}

impl Transport {
    pub fn new(
        runner: Box<dyn CommandRunner>,
        reporter: Arc<dyn Reporter>,
        plan_abort: AbortToken,
    ) -> Self {
        Self {
            runner,
            reporter,
            plan_abort,
            cwd_stack: Vec::new(),
            aborted: false,
            crash_recordings: Vec::new(),
        }
    }

    pub fn target(&self) -> String {
        self.runner.target()
    }

    pub fn is_remote(&self) -> bool {
        self.runner.is_remote()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn crash_recordings(&self) -> &[String] {
        &self.crash_recordings
    }

    pub fn exec(&mut self, command: &str) -> Result<CommandOutput> {
        self.exec_with(command, ExecOptions::default())
    }

    pub fn exec_with(&mut self, command: &str, options: ExecOptions) -> Result<CommandOutput> {
        self.run_command(command, None, options)
    }

    /// Run `command` as `user` through `sudo -u <user> -i bash -c`.
    ///
    /// `sudo -i` starts in the user's home, so the cwd goes inside the sudo shell.
    pub fn sudo(&mut self, command: &str, user: &str) -> Result<CommandOutput> {
        let wrapped = shell::sudo_command(user, &self.in_cwd(command));
        self.run_raw(&wrapped, None, ExecOptions::default())
    }

    /// Stream a local file to `remote_path` on the target.
    pub fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<CommandOutput> {
        let command = format!("cat > {}", shell::quote_path(remote_path));
        self.run_command(&command, Some(local_path), ExecOptions::default())
    }

    /// Every command issued inside `f` runs from `dir`. Nests.
    pub fn with_cwd<T, F>(&mut self, dir: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transport) -> Result<T>,
    {
        self.cwd_stack.push(dir.to_string());
        let result = f(self);
        self.cwd_stack.pop();
        result
    }

    pub fn log(&self, message: impl Into<String>) {
        self.reporter.report(&PlanEvent::Log {
            target: self.target(),
            message: message.into(),
        });
    }

    /// Abort this transport and the whole plan. Return the error from the body.
    pub fn abort(&mut self, message: impl Into<String>) -> Error {
        let message = message.into();
        self.plan_abort.abort(Some(message.clone()));
        let err = Error::plan_aborted(message);
        self.record_failure(err.message.clone());
        err
    }

    pub(crate) fn record_failure(&mut self, message: String) {
        self.aborted = true;
        self.crash_recordings.push(message);
    }

    /// Record an error a body returned, unless it is the failure this
    /// transport already recorded when the command failed.
    pub(crate) fn record_body_error(&mut self, err: &Error) {
        if self.aborted && self.crash_recordings.last() == Some(&err.message) {
            return;
        }
        self.record_failure(err.message.clone());
    }

    fn in_cwd(&self, command: &str) -> String {
        self.cwd_stack
            .iter()
            .rev()
            .fold(command.to_string(), |cmd, dir| shell::with_cwd(dir, &cmd))
    }

    fn run_command(
        &mut self,
        command: &str,
        stdin_file: Option<&Path>,
        options: ExecOptions,
    ) -> Result<CommandOutput> {
        let effective = self.in_cwd(command);
        self.run_raw(&effective, stdin_file, options)
    }

    /// Run `effective` exactly as given; the cwd stack is not applied.
    fn run_raw(
        &mut self,
        effective: &str,
        stdin_file: Option<&Path>,
        options: ExecOptions,
    ) -> Result<CommandOutput> {
        let effective = effective.to_string();

        if !options.silent {
            self.reporter.report(&PlanEvent::CommandStarted {
                target: self.target(),
                command: effective.clone(),
            });
        }

        let output = self.runner.run(&effective, stdin_file);
        if output.success || options.failsafe {
            return Ok(output);
        }

        let err = Error::command_failed(
            self.is_remote(),
            CommandFailedDetails {
                command: effective,
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
                target: self.target(),
            },
        );
        self.record_failure(err.message.clone());
        Err(err)
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("target", &self.target())
            .field("aborted", &self.aborted)
            .field("crash_recordings", &self.crash_recordings)
            .finish()
    }
}
