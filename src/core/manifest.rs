//! Declarative plan files.
//!
//! A plan file lists destinations, flights of shell commands and lifecycle
//! hooks. `.json` files are read with serde_json, everything else as TOML.

use crate::briefing::{Briefing, BriefingConfig};
use crate::error::{Error, Result};
use crate::flight::{Flight, FlightKind};
use crate::host::Host;
use crate::plan::Flightplan;
use crate::reporter::Reporter;
use crate::transport::{
    execute_local_command, CommandOutput, ExecOptions, Transport, TransportFactory,
};
use crate::utils::shell;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

pub const DEFAULT_PLAN_FILE: &str = "flightplan.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanManifest {
    #[serde(default)]
    pub destinations: BTreeMap<String, Vec<Host>>,
    #[serde(default)]
    pub flights: Vec<FlightSpec>,
    #[serde(default)]
    pub hooks: HookSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightSpec {
    pub kind: FlightKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub commands: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sudo: Option<String>,
    #[serde(default)]
    pub failsafe: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookSpec {
    #[serde(default)]
    pub success: Vec<String>,
    #[serde(default)]
    pub failure: Vec<String>,
    #[serde(default)]
    pub complete: Vec<String>,
}

impl FlightSpec {
    /// The command line actually sent to the target for `command`.
    pub fn render(&self, command: &str) -> String {
        let command = match &self.cwd {
            Some(dir) => shell::with_cwd(dir, command),
            None => command.to_string(),
        };
        match &self.sudo {
            Some(user) => shell::sudo_command(user, &command),
            None => command,
        }
    }

    fn run(&self, transport: &mut Transport) -> Result<()> {
        let options = ExecOptions {
            failsafe: self.failsafe,
            silent: false,
        };
        for command in &self.commands {
            transport.exec_with(&self.render(command), options)?;
        }
        Ok(())
    }

    fn into_flight(self) -> Flight {
        let label = self.label.clone();
        let kind = self.kind;
        let spec = Arc::new(self);
        let body = move |t: &mut Transport| spec.run(t);
        let flight = match kind {
            FlightKind::Local => Flight::local(body),
            FlightKind::Remote => Flight::remote(body),
        };
        match label {
            Some(label) => flight.labeled(label),
            None => flight,
        }
    }
}

impl PlanManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("read {}", display)))
                .with_hint(format!("Create {} or pass --file", DEFAULT_PLAN_FILE))
        })?;

        let manifest = if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json_str(&content, &display)?
        } else {
            Self::from_toml_str(&content, &display)?
        };
        manifest.validate(&display)?;
        Ok(manifest)
    }

    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::invalid_manifest(origin, e.to_string()))
    }

    pub fn from_json_str(content: &str, origin: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| Error::invalid_manifest(origin, e.to_string()))
    }

    pub fn validate(&self, origin: &str) -> Result<()> {
        for (i, flight) in self.flights.iter().enumerate() {
            if flight.commands.is_empty() {
                return Err(Error::invalid_manifest(
                    origin,
                    format!("flight {} has no commands", i + 1),
                ));
            }
        }
        Ok(())
    }

    pub fn briefing_config(&self) -> BriefingConfig {
        BriefingConfig {
            destinations: self.destinations.clone(),
        }
    }

    pub fn into_plan(
        self,
        factory: Arc<dyn TransportFactory>,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Flightplan> {
        let mut plan = Flightplan::new(Briefing::new(self.briefing_config()))
            .with_factory(factory)
            .with_reporter(reporter);

        for spec in self.flights {
            plan.register(spec.into_flight())?;
        }

        let HookSpec {
            success,
            failure,
            complete,
        } = self.hooks;
        if !success.is_empty() {
            plan.on_success(move || run_hooks("success", &success));
        }
        if !failure.is_empty() {
            plan.on_failure(move || run_hooks("failure", &failure));
        }
        if !complete.is_empty() {
            plan.on_complete(move || run_hooks("complete", &complete));
        }

        Ok(plan)
    }
}

/// Hooks run locally; a failing hook is logged and never changes the outcome.
fn run_hooks(event: &str, commands: &[String]) {
    for command in commands {
        let output = execute_local_command(command);
        if let Some(line) = hook_failure_line(event, command, &output) {
            eprintln!("{}", line);
        }
    }
}

fn hook_failure_line(event: &str, command: &str, output: &CommandOutput) -> Option<String> {
    if output.success {
        return None;
    }
    Some(format!(
        "[hook] {} hook '{}' failed (exit {}): {}",
        event,
        command,
        output.exit_code,
        output.stderr.trim()
    ))
}
