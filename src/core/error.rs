use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigUnknownDestination,
    ConfigNoHosts,
    ConfigMissingBriefing,
    ConfigInvalidValue,
    ConfigInvalidManifest,

    ValidationInvalidArgument,

    PlanAlreadyStarted,
    PlanAbortedBeforeStart,
    PlanAborted,

    FlightAlreadyExecuted,
    FlightFailed,
    FlightPanicked,

    LocalCommandFailed,
    RemoteCommandFailed,

    SshIdentityFileNotFound,

    InternalIoError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigUnknownDestination => "config.unknown_destination",
            ErrorCode::ConfigNoHosts => "config.no_hosts",
            ErrorCode::ConfigMissingBriefing => "config.missing_briefing",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",
            ErrorCode::ConfigInvalidManifest => "config.invalid_manifest",

            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::PlanAlreadyStarted => "plan.already_started",
            ErrorCode::PlanAbortedBeforeStart => "plan.aborted_before_start",
            ErrorCode::PlanAborted => "plan.aborted",

            ErrorCode::FlightAlreadyExecuted => "flight.already_executed",
            ErrorCode::FlightFailed => "flight.failed",
            ErrorCode::FlightPanicked => "flight.panicked",

            ErrorCode::LocalCommandFailed => "local.command_failed",
            ErrorCode::RemoteCommandFailed => "remote.command_failed",

            ErrorCode::SshIdentityFileNotFound => "ssh.identity_file_not_found",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }

    /// Configuration and validation problems are detected before any flight runs.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ErrorCode::ConfigUnknownDestination
                | ErrorCode::ConfigNoHosts
                | ErrorCode::ConfigMissingBriefing
                | ErrorCode::ConfigInvalidValue
                | ErrorCode::ConfigInvalidManifest
                | ErrorCode::ValidationInvalidArgument
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnknownDestinationDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub known: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFailedDetails {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub target: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightFailedDetails {
    pub index: usize,
    pub total: usize,
    pub crash_recordings: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

const OUTPUT_TAIL_LINES: usize = 5;

/// Last `max_lines` non-blank lines of `output`, indented.
fn output_tail(output: &str, max_lines: usize) -> Option<String> {
    let lines: Vec<&str> = output.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return None;
    }
    let start = lines.len().saturating_sub(max_lines);
    Some(
        lines[start..]
            .iter()
            .map(|l| format!("  {}", l.trim_end()))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
        }
    }

    pub fn unknown_destination(destination: Option<&str>, known: Vec<String>) -> Self {
        let message = match destination {
            Some(name) if !name.is_empty() => format!("Unknown destination '{}'", name),
            _ => "A destination is required for remote flights".to_string(),
        };
        let hint = if known.is_empty() {
            "No destinations are configured in the briefing".to_string()
        } else {
            format!("Configured destinations: {}", known.join(", "))
        };

        Self::new(
            ErrorCode::ConfigUnknownDestination,
            message,
            to_details(UnknownDestinationDetails {
                destination: destination.map(str::to_string),
                known,
            }),
        )
        .with_hint(hint)
    }

    pub fn no_hosts(destination: impl Into<String>) -> Self {
        let destination = destination.into();
        Self::new(
            ErrorCode::ConfigNoHosts,
            format!("Destination '{}' has no hosts", destination),
            serde_json::json!({ "destination": destination }),
        )
    }

    pub fn missing_briefing() -> Self {
        Self::new(
            ErrorCode::ConfigMissingBriefing,
            "Briefing has not been configured",
            Value::Object(serde_json::Map::new()),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            to_details(ConfigInvalidValueDetails {
                key: key.into(),
                value,
                problem: problem.into(),
            }),
        )
    }

    pub fn invalid_manifest(path: impl Into<String>, problem: impl Into<String>) -> Self {
        let path = path.into();
        let problem = problem.into();
        Self::new(
            ErrorCode::ConfigInvalidManifest,
            format!("Invalid plan file {}: {}", path, problem),
            serde_json::json!({ "path": path, "problem": problem }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            to_details(InvalidArgumentDetails {
                field: field.into(),
                problem: problem.into(),
            }),
        )
    }

    pub fn plan_already_started() -> Self {
        Self::new(
            ErrorCode::PlanAlreadyStarted,
            "Flights cannot be registered after the plan has started",
            Value::Object(serde_json::Map::new()),
        )
    }

    pub fn aborted_before_start(reason: Option<String>) -> Self {
        Self::new(
            ErrorCode::PlanAbortedBeforeStart,
            match &reason {
                Some(reason) => format!("Plan aborted before start: {}", reason),
                None => "Plan aborted before start".to_string(),
            },
            serde_json::json!({ "reason": reason }),
        )
    }

    pub fn plan_aborted(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            ErrorCode::PlanAborted,
            format!("Aborted: {}", message),
            serde_json::json!({ "reason": message }),
        )
    }

    pub fn flight_already_executed() -> Self {
        Self::new(
            ErrorCode::FlightAlreadyExecuted,
            "Flight has already been executed",
            Value::Object(serde_json::Map::new()),
        )
    }

    pub fn flight_failed(details: FlightFailedDetails) -> Self {
        let message = format!("Flight {}/{} failed", details.index, details.total);
        Self::new(ErrorCode::FlightFailed, message, to_details(details))
    }

    pub fn flight_panicked(target: impl Into<String>) -> Self {
        let target = target.into();
        Self::new(
            ErrorCode::FlightPanicked,
            "Flight body panicked",
            serde_json::json!({ "target": target }),
        )
    }

    pub fn command_failed(remote: bool, details: CommandFailedDetails) -> Self {
        let code = if remote {
            ErrorCode::RemoteCommandFailed
        } else {
            ErrorCode::LocalCommandFailed
        };
        let mut message = format!(
            "Command failed on {} (exit {}): {}",
            details.target, details.exit_code, details.command
        );
        // stderr first; plenty of tools report failures on stdout only
        let output = if details.stderr.trim().is_empty() {
            &details.stdout
        } else {
            &details.stderr
        };
        if let Some(tail) = output_tail(output, OUTPUT_TAIL_LINES) {
            message.push('\n');
            message.push_str(&tail);
        }
        Self::new(code, message, to_details(details))
    }

    pub fn ssh_identity_file_not_found(
        target: impl Into<String>,
        identity_file: impl Into<String>,
    ) -> Self {
        let identity_file = identity_file.into();
        Self::new(
            ErrorCode::SshIdentityFileNotFound,
            format!("SSH identity file not found: {}", identity_file),
            serde_json::json!({ "target": target.into(), "identityFile": identity_file }),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalIoError,
            "IO error",
            to_details(InternalIoErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        let error = error.into();
        Self::new(
            ErrorCode::InternalUnexpected,
            format!("Unexpected error: {}", error),
            serde_json::json!({ "error": error }),
        )
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::internal_unexpected(message)
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}
