use super::{CommandOutput, CommandRunner};
use crate::utils::shell;
use std::path::Path;
use std::process::Command;

/// Runs commands on this machine through `sh -c`.
#[derive(Debug, Default, Clone)]
pub struct LocalRunner {
    pub current_dir: Option<String>,
}

impl LocalRunner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CommandRunner for LocalRunner {
    fn run(&self, command: &str, stdin_file: Option<&Path>) -> CommandOutput {
        match stdin_file {
            Some(path) => {
                let piped = format!(
                    "cat {} | {}",
                    shell::quote_path(&path.to_string_lossy()),
                    command
                );
                execute_local_command_in_dir(&piped, self.current_dir.as_deref())
            }
            None => execute_local_command_in_dir(command, self.current_dir.as_deref()),
        }
    }

    fn target(&self) -> String {
        "local".to_string()
    }

    fn is_remote(&self) -> bool {
        false
    }
}

pub fn execute_local_command(command: &str) -> CommandOutput {
    execute_local_command_in_dir(command, None)
}

pub fn execute_local_command_in_dir(command: &str, current_dir: Option<&str>) -> CommandOutput {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    };

    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    };

    if let Some(dir) = current_dir {
        cmd.current_dir(dir);
    }

    match cmd.output() {
        Ok(out) => CommandOutput {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            success: out.status.success(),
            exit_code: out.status.code().unwrap_or(-1),
        },
        Err(e) => CommandOutput::spawn_error(format!("Command error: {}", e)),
    }
}
