use clap::Args;
use std::path::PathBuf;

use flightplan::manifest::{PlanManifest, DEFAULT_PLAN_FILE};

pub type CmdResult<T> = flightplan::Result<(T, i32)>;

pub(crate) struct GlobalArgs {}

/// Location of the plan file, shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct PlanFileArgs {
    /// Plan file (.toml, or .json)
    #[arg(long, short, value_name = "PATH", default_value = DEFAULT_PLAN_FILE)]
    pub file: PathBuf,
}

impl PlanFileArgs {
    pub fn load(&self) -> flightplan::Result<PlanManifest> {
        PlanManifest::load(&self.file)
    }
}

pub mod flights;
pub mod hosts;
pub mod run;
