use clap::Args;
use serde::Serialize;

use flightplan::FlightKind;

use super::{CmdResult, GlobalArgs, PlanFileArgs};

#[derive(Args, Debug)]
pub struct FlightsArgs {
    #[command(flatten)]
    pub plan: PlanFileArgs,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightEntry {
    index: usize,
    kind: FlightKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    failsafe: bool,
    /// Command lines as sent to the target, cwd and sudo applied.
    commands: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightsOutput {
    requires_destination: bool,
    flights: Vec<FlightEntry>,
}

pub fn run(args: FlightsArgs, _global: &GlobalArgs) -> CmdResult<FlightsOutput> {
    let manifest = args.plan.load()?;

    let flights: Vec<FlightEntry> = manifest
        .flights
        .iter()
        .enumerate()
        .map(|(i, spec)| FlightEntry {
            index: i + 1,
            kind: spec.kind,
            label: spec.label.clone(),
            failsafe: spec.failsafe,
            commands: spec.commands.iter().map(|c| spec.render(c)).collect(),
        })
        .collect();

    let requires_destination = flights.iter().any(|f| f.kind == FlightKind::Remote);

    Ok((
        FlightsOutput {
            requires_destination,
            flights,
        },
        0,
    ))
}
