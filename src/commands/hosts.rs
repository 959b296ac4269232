use clap::Args;
use serde::Serialize;

use flightplan::briefing;
use flightplan::{Error, Host, HostOverrides};

use super::{CmdResult, GlobalArgs, PlanFileArgs};

#[derive(Args, Debug)]
pub struct HostsArgs {
    /// Only list this destination
    pub destination: Option<String>,

    #[command(flatten)]
    pub plan: PlanFileArgs,

    /// Show hosts as they would be after this override (repeatable)
    #[arg(long = "option", short = 'o', value_name = "KEY=VALUE")]
    pub options: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DestinationOutput {
    name: String,
    hosts: Vec<HostOutput>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostOutput {
    target: String,
    #[serde(flatten)]
    host: Host,
}

#[derive(Debug, Serialize)]
pub struct HostsOutput {
    destinations: Vec<DestinationOutput>,
}

pub fn run(args: HostsArgs, _global: &GlobalArgs) -> CmdResult<HostsOutput> {
    let manifest = args.plan.load()?;
    let overrides = HostOverrides::parse_pairs(&args.options)?;
    let shared = briefing::shared().access(Some(manifest.briefing_config()))?;

    let names: Vec<String> = match &args.destination {
        Some(name) if !shared.has_destination(name) => {
            return Err(Error::unknown_destination(
                Some(name.as_str()),
                shared.destinations().into_iter().map(str::to_string).collect(),
            ));
        }
        Some(name) => vec![name.clone()],
        None => shared.destinations().into_iter().map(str::to_string).collect(),
    };

    // Overrides are applied to a private copy; the shared briefing stays as configured.
    let mut view = (*shared).clone();
    let mut destinations = Vec::with_capacity(names.len());
    for name in names {
        view.apply_options(&name, &overrides)?;
        let hosts = view
            .hosts_for_destination(&name)?
            .into_iter()
            .map(|host| HostOutput {
                target: host.label(),
                host,
            })
            .collect();
        destinations.push(DestinationOutput { name, hosts });
    }

    Ok((HostsOutput { destinations }, 0))
}
