use clap::Args;
use std::sync::Arc;

use flightplan::transport::ShellTransportFactory;
use flightplan::{launch, report_fatal, HostOverrides, Landing, StatusReporter};

use super::{GlobalArgs, PlanFileArgs};
use crate::output::{self, CliResponse};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Destination whose hosts remote flights run on
    pub destination: Option<String>,

    #[command(flatten)]
    pub plan: PlanFileArgs,

    /// Log in as this user on every host of the destination
    #[arg(long, short)]
    pub username: Option<String>,

    /// Host override applied to the destination (repeatable)
    #[arg(long = "option", short = 'o', value_name = "KEY=VALUE")]
    pub options: Vec<String>,

    /// Echo every command before it runs
    #[arg(long, short)]
    pub verbose: bool,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    fn overrides(&self) -> flightplan::Result<HostOverrides> {
        let mut overrides = HostOverrides::parse_pairs(&self.options)?;
        if let Some(username) = &self.username {
            overrides.insert("username", username.as_str());
        }
        Ok(overrides)
    }
}

/// Runs the plan file and returns the process exit status.
///
/// Unlike the other subcommands this one always exits 0 or 1.
pub fn run(args: RunArgs, _global: &GlobalArgs) -> u8 {
    let prepared = args.plan.load().and_then(|manifest| {
        let overrides = args.overrides()?;
        let plan = manifest.into_plan(
            Arc::new(ShellTransportFactory),
            Arc::new(StatusReporter {
                verbose: args.verbose,
            }),
        )?;
        Ok((plan, overrides))
    });

    let landing = match prepared {
        Ok((mut plan, overrides)) => launch(&mut plan, args.destination.as_deref(), &overrides),
        Err(err) => {
            report_fatal(&err);
            Landing::Fatal(err)
        }
    };

    if args.json {
        let printed = match &landing {
            Landing::Completed(report) => match report.failure() {
                Some(err) => output::print_response(&CliResponse::failure(report, &err)),
                None => output::print_response(&CliResponse::success(report)),
            },
            Landing::Fatal(err) => output::print_response(&CliResponse::<()>::from_error(err)),
            Landing::Crashed(message) => output::print_response(&CliResponse::<()>::from_error(
                &flightplan::Error::internal_unexpected(message.clone()),
            )),
        };
        if let Err(err) = printed {
            report_fatal(&err);
        }
    }

    landing.exit_code()
}
