//! Flights: one batch of user work, run locally or on every host of a destination.

use crate::abort::AbortToken;
use crate::error::{Error, Result};
use crate::host::Host;
use crate::reporter::Reporter;
use crate::transport::{Transport, TransportFactory};
use serde::{Deserialize, Serialize, Serializer};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// User work. Shared so a remote flight can hand it to one thread per host.
pub type FlightBody = Arc<dyn Fn(&mut Transport) -> Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightKind {
    Local,
    Remote,
}

impl std::fmt::Display for FlightKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlightKind::Local => write!(f, "local"),
            FlightKind::Remote => write!(f, "remote"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashRecording {
    pub target: String,
    pub message: String,
}

impl std::fmt::Display for CrashRecording {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.target, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightStatus {
    pub aborted: bool,
    #[serde(rename = "executionTimeMs", serialize_with = "serialize_millis")]
    pub execution_time: Duration,
    pub crash_recordings: Vec<CrashRecording>,
}

pub(crate) fn serialize_millis<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// What a flight needs from the plan while it runs.
#[derive(Clone)]
pub struct FlightContext {
    pub destination: Option<String>,
    pub factory: Arc<dyn TransportFactory>,
    pub reporter: Arc<dyn Reporter>,
    pub abort: AbortToken,
}

pub struct Flight {
    kind: FlightKind,
    label: Option<String>,
    body: FlightBody,
    status: FlightStatus,
    executed: bool,
}

impl Flight {
    pub fn new(kind: FlightKind, body: FlightBody) -> Self {
        Self {
            kind,
            label: None,
            body,
            status: FlightStatus::default(),
            executed: false,
        }
    }

    /// Runs once on this machine.
    pub fn local<F>(body: F) -> Self
    where
        F: Fn(&mut Transport) -> Result<()> + Send + Sync + 'static,
    {
        Self::new(FlightKind::Local, Arc::new(body))
    }

    /// Runs once per host of the destination, all hosts in parallel.
    pub fn remote<F>(body: F) -> Self
    where
        F: Fn(&mut Transport) -> Result<()> + Send + Sync + 'static,
    {
        Self::new(FlightKind::Remote, Arc::new(body))
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn kind(&self) -> FlightKind {
        self.kind
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn status(&self) -> &FlightStatus {
        &self.status
    }

    pub fn is_executed(&self) -> bool {
        self.executed
    }

    /// Run the flight. `hosts` is ignored by local flights.
    ///
    /// Failures inside the body land in [`Flight::status`]; `Err` is reserved
    /// for misuse (second execution, remote flight without hosts).
    pub fn execute(&mut self, hosts: &[Host], ctx: &FlightContext) -> Result<()> {
        if self.executed {
            return Err(Error::flight_already_executed());
        }

        if self.kind == FlightKind::Remote && hosts.is_empty() {
            return Err(Error::no_hosts(ctx.destination.clone().unwrap_or_default()));
        }

        self.executed = true;
        self.status = match self.kind {
            FlightKind::Local => execute_local(&self.body, ctx),
            FlightKind::Remote => execute_remote(&self.body, hosts, ctx),
        };

        Ok(())
    }
}

impl std::fmt::Debug for Flight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flight")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("status", &self.status)
            .field("executed", &self.executed)
            .finish()
    }
}

fn execute_local(body: &FlightBody, ctx: &FlightContext) -> FlightStatus {
    let started = Instant::now();
    let mut transport = Transport::new(
        ctx.factory.local(),
        Arc::clone(&ctx.reporter),
        ctx.abort.clone(),
    );

    let result = panic::catch_unwind(AssertUnwindSafe(|| body(&mut transport)));
    settle(&mut transport, result);

    let target = transport.target();
    FlightStatus {
        aborted: transport.is_aborted(),
        execution_time: started.elapsed(),
        crash_recordings: transport
            .crash_recordings()
            .iter()
            .map(|message| CrashRecording {
                target: target.clone(),
                message: message.clone(),
            })
            .collect(),
    }
}

struct HostOutcome {
    target: String,
    aborted: bool,
    crash_recordings: Vec<String>,
}

fn execute_remote(body: &FlightBody, hosts: &[Host], ctx: &FlightContext) -> FlightStatus {
    let started = Instant::now();

    let handles: Vec<_> = hosts
        .iter()
        .map(|host| {
            let host = host.clone();
            let body = Arc::clone(body);
            let ctx = ctx.clone();
            let target = host.label();
            let handle = thread::spawn(move || run_on_host(&host, &body, &ctx));
            (target, handle)
        })
        .collect();

    // Join in dispatch order so recordings follow host order, not completion order.
    let outcomes: Vec<HostOutcome> = handles
        .into_iter()
        .map(|(target, handle)| {
            handle.join().unwrap_or_else(|_| HostOutcome {
                target: target.clone(),
                aborted: true,
                crash_recordings: vec![Error::flight_panicked(target).message],
            })
        })
        .collect();

    let mut status = FlightStatus {
        aborted: false,
        execution_time: started.elapsed(),
        crash_recordings: Vec::new(),
    };

    for outcome in outcomes {
        status.aborted |= outcome.aborted;
        status
            .crash_recordings
            .extend(outcome.crash_recordings.into_iter().map(|message| CrashRecording {
                target: outcome.target.clone(),
                message,
            }));
    }

    status
}

fn run_on_host(host: &Host, body: &FlightBody, ctx: &FlightContext) -> HostOutcome {
    let target = host.label();

    let runner = match ctx.factory.remote(host) {
        Ok(runner) => runner,
        Err(err) => {
            return HostOutcome {
                target,
                aborted: true,
                crash_recordings: vec![err.message],
            }
        }
    };

    let mut transport = Transport::new(runner, Arc::clone(&ctx.reporter), ctx.abort.clone());
    let result = panic::catch_unwind(AssertUnwindSafe(|| body(&mut transport)));
    settle(&mut transport, result);

    HostOutcome {
        target,
        aborted: transport.is_aborted(),
        crash_recordings: transport.crash_recordings().to_vec(),
    }
}

/// Fold a body's return value into its transport's state.
fn settle(transport: &mut Transport, result: std::thread::Result<Result<()>>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(err)) => transport.record_body_error(&err),
        Err(_) => transport.record_failure(Error::flight_panicked(transport.target()).message),
    }
}
