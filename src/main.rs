use clap::{Parser, Subcommand};

use commands::GlobalArgs;

mod commands;
mod output;

use commands::{flights, hosts, run};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "flightplan")]
#[command(version = VERSION)]
#[command(about = "Run ordered flights of shell commands locally and over SSH")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every flight of the plan file, stopping at the first failure
    Run(run::RunArgs),
    /// Show the hosts each destination resolves to
    Hosts(hosts::HostsArgs),
    /// Show the flights of the plan file and the commands they send
    Flights(flights::FlightsArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let global = GlobalArgs {};

    let (json_result, exit_code) = match cli.command {
        Commands::Run(args) => return std::process::ExitCode::from(run::run(args, &global)),
        Commands::Hosts(args) => output::map_cmd_result_to_json(hosts::run(args, &global)),
        Commands::Flights(args) => output::map_cmd_result_to_json(flights::run(args, &global)),
    };

    if output::print_json_result(json_result).is_err() {
        return std::process::ExitCode::from(1);
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
