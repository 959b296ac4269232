use super::local::execute_local_command;
use super::{CommandOutput, CommandRunner};
use crate::error::{Error, Result};
use crate::host::Host;
use crate::utils::shell;
use std::path::Path;
use std::process::Command;

/// Runs commands on one host through the system `ssh` binary.
#[derive(Debug, Clone)]
pub struct SshClient {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<String>,
    /// When true, all commands run locally instead of over SSH.
    /// Set automatically when the host is localhost/127.0.0.1/::1.
    pub is_local: bool,
}

impl SshClient {
    pub fn from_host(host: &Host) -> Result<Self> {
        let identity_file = match &host.identity_file {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).to_string();
                if !Path::new(&expanded).exists() {
                    return Err(Error::ssh_identity_file_not_found(host.label(), expanded));
                }
                Some(expanded)
            }
            _ => None,
        };

        let is_local = is_local_host(&host.host);
        if is_local {
            log_status!("ssh", "Host '{}' is localhost, using local execution", host.host);
        }

        Ok(Self {
            host: host.host.clone(),
            user: host.user.clone(),
            port: host.port,
            identity_file,
            is_local,
        })
    }

    pub fn build_ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        if self.port != 22 {
            args.push("-p".to_string());
            args.push(self.port.to_string());
        }

        // Flights are unattended: never prompt, and give up on dead links.
        args.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-o".to_string(),
            "ServerAliveCountMax=3".to_string(),
        ]);

        args.push(format!("{}@{}", self.user, self.host));
        args.push(command.to_string());

        args
    }

    /// Runs `command` once. Failures are returned as-is, never re-sent.
    fn execute(&self, command: &str, stdin_file: Option<&Path>) -> CommandOutput {
        if self.is_local {
            return match stdin_file {
                Some(path) => execute_local_command(&format!(
                    "cat {} | {}",
                    shell::quote_path(&path.to_string_lossy()),
                    command
                )),
                None => execute_local_command(command),
            };
        }

        let mut cmd = Command::new("ssh");
        cmd.args(self.build_ssh_args(command));

        if let Some(path) = stdin_file {
            match std::fs::File::open(path) {
                Ok(file) => {
                    cmd.stdin(file);
                }
                Err(err) => {
                    return CommandOutput::spawn_error(format!(
                        "Failed to open stdin file: {}",
                        err
                    ));
                }
            }
        }

        match cmd.output() {
            Ok(out) => CommandOutput {
                stdout: String::from_utf8_lossy(&out.stdout).to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).to_string(),
                success: out.status.success(),
                exit_code: out.status.code().unwrap_or(-1),
            },
            Err(e) => CommandOutput::spawn_error(format!("SSH error: {}", e)),
        }
    }
}

impl CommandRunner for SshClient {
    fn run(&self, command: &str, stdin_file: Option<&Path>) -> CommandOutput {
        self.execute(command, stdin_file)
    }

    fn target(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }

    fn is_remote(&self) -> bool {
        true
    }
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}
