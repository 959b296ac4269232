// Public modules
pub mod abort;
pub mod briefing;
pub mod error;
pub mod flight;
pub mod host;
pub mod manifest;
pub mod plan;
pub mod reporter;
pub mod signal;
pub mod transport;

// Re-export common types for convenience
pub use abort::AbortToken;
pub use briefing::{Briefing, BriefingConfig, BriefingRegistry};
pub use error::{Error, ErrorCode, Result};
pub use flight::{CrashRecording, Flight, FlightKind, FlightStatus};
pub use host::{Host, HostOverrides};
pub use plan::{FlightReport, FlightState, Flightplan, PlanReport};
pub use reporter::{MemoryReporter, PlanEvent, Reporter, StatusReporter};
pub use signal::{launch, report_fatal, Landing};
pub use transport::{CommandOutput, CommandRunner, ExecOptions, Transport, TransportFactory};
