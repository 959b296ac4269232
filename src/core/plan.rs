//! The orchestrator: runs registered flights in order and stops at the first failure.

use crate::abort::AbortToken;
use crate::briefing::Briefing;
use crate::error::{Error, FlightFailedDetails, Result};
use crate::flight::{serialize_millis, Flight, FlightContext, FlightKind, FlightStatus};
use crate::host::{Host, HostOverrides};
use crate::reporter::{PlanEvent, Reporter, StatusReporter};
use crate::transport::{ShellTransportFactory, Transport, TransportFactory};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub type Callback = Box<dyn FnOnce() + Send>;

pub struct Flightplan {
    flights: Vec<Flight>,
    briefing: Briefing,
    factory: Arc<dyn TransportFactory>,
    reporter: Arc<dyn Reporter>,
    abort: AbortToken,
    started: bool,
    execution_time: Duration,
    on_success: Option<Callback>,
    on_failure: Option<Callback>,
    on_complete: Option<Callback>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightState {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightReport {
    pub index: usize,
    pub kind: FlightKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub state: FlightState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<FlightStatus>,
}

/// Outcome of a completed run (as opposed to a run refused up front).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanReport {
    pub run_id: Uuid,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub aborted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_flight: Option<usize>,
    #[serde(rename = "executionTimeMs", serialize_with = "serialize_millis")]
    pub execution_time: Duration,
    pub flights: Vec<FlightReport>,
}

impl PlanReport {
    pub fn exit_code(&self) -> u8 {
        if self.aborted {
            1
        } else {
            0
        }
    }

    /// The failure as an error, for callers that report through `Error`.
    pub fn failure(&self) -> Option<Error> {
        if !self.aborted {
            return None;
        }

        match self.failed_flight {
            Some(index) => {
                let crash_recordings = self
                    .flights
                    .iter()
                    .find(|f| f.index == index)
                    .and_then(|f| f.status.as_ref())
                    .map(|s| s.crash_recordings.iter().map(|c| c.to_string()).collect())
                    .unwrap_or_default();
                Some(Error::flight_failed(FlightFailedDetails {
                    index,
                    total: self.flights.len(),
                    crash_recordings,
                }))
            }
            None => Some(Error::plan_aborted(
                self.abort_reason
                    .clone()
                    .unwrap_or_else(|| "aborted".to_string()),
            )),
        }
    }
}

impl Flightplan {
    pub fn new(briefing: Briefing) -> Self {
        Self {
            flights: Vec::new(),
            briefing,
            factory: Arc::new(ShellTransportFactory),
            reporter: Arc::new(StatusReporter::default()),
            abort: AbortToken::new(),
            started: false,
            execution_time: Duration::ZERO,
            on_success: None,
            on_failure: None,
            on_complete: None,
        }
    }

    pub fn with_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn briefing(&self) -> &Briefing {
        &self.briefing
    }

    pub fn flights(&self) -> &[Flight] {
        &self.flights
    }

    pub fn execution_time(&self) -> Duration {
        self.execution_time
    }

    pub fn register(&mut self, flight: Flight) -> Result<()> {
        if self.started {
            return Err(Error::plan_already_started());
        }
        self.flights.push(flight);
        Ok(())
    }

    pub fn local<F>(&mut self, body: F) -> Result<()>
    where
        F: Fn(&mut Transport) -> Result<()> + Send + Sync + 'static,
    {
        self.register(Flight::local(body))
    }

    pub fn remote<F>(&mut self, body: F) -> Result<()>
    where
        F: Fn(&mut Transport) -> Result<()> + Send + Sync + 'static,
    {
        self.register(Flight::remote(body))
    }

    pub fn local_labeled<F>(&mut self, label: impl Into<String>, body: F) -> Result<()>
    where
        F: Fn(&mut Transport) -> Result<()> + Send + Sync + 'static,
    {
        self.register(Flight::local(body).labeled(label))
    }

    pub fn remote_labeled<F>(&mut self, label: impl Into<String>, body: F) -> Result<()>
    where
        F: Fn(&mut Transport) -> Result<()> + Send + Sync + 'static,
    {
        self.register(Flight::remote(body).labeled(label))
    }

    pub fn requires_remote_hosts(&self) -> bool {
        self.flights.iter().any(|f| f.kind() == FlightKind::Remote)
    }

    /// Mark the plan aborted. A running flight is not interrupted; the plan
    /// stops before the next one.
    pub fn abort(&self, message: impl Into<String>) {
        self.abort.abort(Some(message.into()));
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    /// Clone of the plan's abort flag, for code that runs outside the plan.
    pub fn abort_token(&self) -> AbortToken {
        self.abort.clone()
    }

    pub fn on_success(&mut self, callback: impl FnOnce() + Send + 'static) {
        self.on_success = Some(Box::new(callback));
    }

    pub fn on_failure(&mut self, callback: impl FnOnce() + Send + 'static) {
        self.on_failure = Some(Box::new(callback));
    }

    pub fn on_complete(&mut self, callback: impl FnOnce() + Send + 'static) {
        self.on_complete = Some(Box::new(callback));
    }

    /// Run every flight in registration order.
    ///
    /// `Err` means the plan was refused before any flight ran (unknown
    /// destination, plan aborted during declaration, ...). A flight failure
    /// is not an `Err`: it is reported as an aborted [`PlanReport`] after the
    /// failure and completion callbacks have run.
    pub fn start(
        &mut self,
        destination: Option<&str>,
        overrides: &HostOverrides,
    ) -> Result<PlanReport> {
        if self.started {
            return Err(Error::plan_already_started());
        }
        self.started = true;

        let destination = destination.filter(|name| !name.is_empty());
        if let Some(name) = destination {
            self.briefing.apply_options(name, overrides)?;
        }

        let hosts = self.resolve_hosts(destination)?;

        if self.abort.is_aborted() {
            return Err(Error::aborted_before_start(self.abort.reason()));
        }

        let run_id = Uuid::new_v4();
        let started_at = chrono::Utc::now().to_rfc3339();
        let total = self.flights.len();
        let ctx = FlightContext {
            destination: destination.map(str::to_string),
            factory: Arc::clone(&self.factory),
            reporter: Arc::clone(&self.reporter),
            abort: self.abort.clone(),
        };

        self.reporter.report(&PlanEvent::PlanStarted {
            destination: ctx.destination.clone(),
            flights: total,
        });

        let started = Instant::now();
        let mut reports = Vec::with_capacity(total);
        let mut failed_flight = None;

        for (i, flight) in self.flights.iter_mut().enumerate() {
            let index = i + 1;

            if self.abort.is_aborted() {
                self.reporter
                    .report(&PlanEvent::FlightSkipped { index, total });
                reports.push(FlightReport {
                    index,
                    kind: flight.kind(),
                    label: flight.label().map(str::to_string),
                    state: FlightState::Skipped,
                    status: None,
                });
                continue;
            }

            self.reporter.report(&PlanEvent::FlightStarted {
                index,
                total,
                kind: flight.kind(),
                label: flight.label().map(str::to_string),
            });

            let flight_hosts: &[Host] = match flight.kind() {
                FlightKind::Local => &[],
                FlightKind::Remote => &hosts,
            };
            flight.execute(flight_hosts, &ctx)?;

            let status = flight.status().clone();
            let state = if status.aborted {
                self.reporter.report(&PlanEvent::FlightFailed {
                    index,
                    total,
                    duration: status.execution_time,
                    crash_recordings: status.crash_recordings.clone(),
                });
                self.abort
                    .abort(Some(format!("Flight {}/{} failed", index, total)));
                failed_flight = Some(index);
                FlightState::Failed
            } else {
                self.reporter.report(&PlanEvent::FlightSucceeded {
                    index,
                    total,
                    duration: status.execution_time,
                });
                FlightState::Succeeded
            };

            reports.push(FlightReport {
                index,
                kind: flight.kind(),
                label: flight.label().map(str::to_string),
                state,
                status: Some(status),
            });
        }

        self.execution_time = started.elapsed();
        let aborted = self.abort.is_aborted();

        if aborted {
            self.reporter.report(&PlanEvent::PlanFailed {
                duration: self.execution_time,
            });
            if let Some(callback) = self.on_failure.take() {
                callback();
            }
        } else {
            self.reporter.report(&PlanEvent::PlanSucceeded {
                duration: self.execution_time,
            });
            if let Some(callback) = self.on_success.take() {
                callback();
            }
        }
        if let Some(callback) = self.on_complete.take() {
            callback();
        }

        Ok(PlanReport {
            run_id,
            started_at,
            destination: ctx.destination,
            aborted,
            abort_reason: if aborted { self.abort.reason() } else { None },
            failed_flight,
            execution_time: self.execution_time,
            flights: reports,
        })
    }

    fn resolve_hosts(&self, destination: Option<&str>) -> Result<Vec<Host>> {
        if !self.requires_remote_hosts() {
            return Ok(Vec::new());
        }

        let name = destination
            .filter(|name| self.briefing.has_destination(name))
            .ok_or_else(|| {
                Error::unknown_destination(
                    destination,
                    self.briefing
                        .destinations()
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                )
            })?;

        let hosts = self.briefing.hosts_for_destination(name)?;
        if hosts.is_empty() {
            return Err(Error::no_hosts(name));
        }
        Ok(hosts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::briefing::BriefingConfig;
    use crate::reporter::MemoryReporter;
    use crate::transport::{CommandOutput, CommandRunner};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct OkRunner(String);

    impl CommandRunner for OkRunner {
        fn run(&self, command: &str, _stdin_file: Option<&Path>) -> CommandOutput {
            let success = command != "false";
            CommandOutput {
                stdout: String::new(),
                stderr: String::new(),
                success,
                exit_code: if success { 0 } else { 1 },
            }
        }

        fn target(&self) -> String {
            self.0.clone()
        }

        fn is_remote(&self) -> bool {
            self.0 != "local"
        }
    }

    struct OkFactory;

    impl TransportFactory for OkFactory {
        fn local(&self) -> Box<dyn CommandRunner> {
            Box::new(OkRunner("local".to_string()))
        }

        fn remote(&self, host: &Host) -> Result<Box<dyn CommandRunner>> {
            Ok(Box::new(OkRunner(host.label())))
        }
    }

    fn plan() -> Flightplan {
        let config = BriefingConfig::default().destination(
            "staging",
            vec![Host::new("web1", "deploy"), Host::new("web2", "deploy")],
        );
        Flightplan::new(Briefing::new(config))
            .with_factory(Arc::new(OkFactory))
            .with_reporter(Arc::new(MemoryReporter::new()))
    }

    #[test]
    fn requires_remote_hosts_only_with_remote_flight() {
        let mut plan = plan();
        plan.local(|_| Ok(())).unwrap();
        assert!(!plan.requires_remote_hosts());
        plan.remote(|_| Ok(())).unwrap();
        assert!(plan.requires_remote_hosts());
    }

    #[test]
    fn local_only_plan_runs_without_destination() {
        let mut plan = plan();
        plan.local(|t| t.exec("true").map(|_| ())).unwrap();
        let report = plan.start(None, &HostOverrides::new()).unwrap();
        assert!(!report.aborted);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.flights[0].state, FlightState::Succeeded);
    }

    #[test]
    fn failing_flight_skips_the_rest() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut plan = plan();

        let counter = Arc::clone(&ran);
        plan.local(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        plan.local(|t| t.exec("false").map(|_| ())).unwrap();
        let counter = Arc::clone(&ran);
        plan.local(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        let report = plan.start(None, &HostOverrides::new()).unwrap();
        assert!(report.aborted);
        assert_eq!(report.failed_flight, Some(2));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(report.flights[2].state, FlightState::Skipped);
        assert!(!plan.flights()[2].is_executed());
    }

    #[test]
    fn abort_during_declaration_refuses_to_start() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut plan = plan();
        let counter = Arc::clone(&ran);
        plan.local(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        plan.abort("missing release tag");

        let err = plan.start(None, &HostOverrides::new()).unwrap_err();
        assert_eq!(err.code.as_str(), "plan.aborted_before_start");
        assert!(err.message.contains("missing release tag"));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unknown_destination_with_remote_flight_is_fatal() {
        let mut plan = plan();
        plan.remote(|_| Ok(())).unwrap();
        let err = plan.start(Some("production"), &HostOverrides::new()).unwrap_err();
        assert_eq!(err.code.as_str(), "config.unknown_destination");
        assert!(!plan.flights()[0].is_executed());
    }

    #[test]
    fn missing_destination_with_remote_flight_is_fatal() {
        let mut plan = plan();
        plan.remote(|_| Ok(())).unwrap();
        let err = plan.start(Some(""), &HostOverrides::new()).unwrap_err();
        assert_eq!(err.code.as_str(), "config.unknown_destination");
    }

    #[test]
    fn empty_destination_is_fatal_for_remote_flights() {
        let config = BriefingConfig::default().destination("empty", vec![]);
        let mut plan = Flightplan::new(Briefing::new(config))
            .with_factory(Arc::new(OkFactory))
            .with_reporter(Arc::new(MemoryReporter::new()));
        plan.remote(|_| Ok(())).unwrap();
        let err = plan.start(Some("empty"), &HostOverrides::new()).unwrap_err();
        assert_eq!(err.code.as_str(), "config.no_hosts");
    }

    #[test]
    fn register_after_start_is_rejected() {
        let mut plan = plan();
        plan.start(None, &HostOverrides::new()).unwrap();
        let err = plan.local(|_| Ok(())).unwrap_err();
        assert_eq!(err.code.as_str(), "plan.already_started");
    }

    #[test]
    fn callbacks_fire_in_order_on_success() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut plan = plan();
        plan.local(|_| Ok(())).unwrap();

        let c = Arc::clone(&calls);
        plan.on_success(move || c.lock().unwrap().push("success"));
        let c = Arc::clone(&calls);
        plan.on_failure(move || c.lock().unwrap().push("failure"));
        let c = Arc::clone(&calls);
        plan.on_complete(move || c.lock().unwrap().push("complete"));

        plan.start(None, &HostOverrides::new()).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["success", "complete"]);
    }

    #[test]
    fn overrides_reach_remote_transports() {
        let users = Arc::new(Mutex::new(Vec::new()));
        let mut plan = plan();
        let seen = Arc::clone(&users);
        plan.remote(move |t| {
            seen.lock().unwrap().push(t.target());
            Ok(())
        })
        .unwrap();

        plan.start(
            Some("staging"),
            &HostOverrides::new().set("username", "alice"),
        )
        .unwrap();

        let mut users = users.lock().unwrap().clone();
        users.sort();
        assert_eq!(users, vec!["alice@web1:22", "alice@web2:22"]);
    }

    #[test]
    fn transport_abort_stops_plan_with_reason() {
        let mut plan = plan();
        plan.local(|t| Err(t.abort("tests are red"))).unwrap();
        plan.local(|_| Ok(())).unwrap();

        let report = plan.start(None, &HostOverrides::new()).unwrap();
        assert!(report.aborted);
        assert_eq!(report.abort_reason.as_deref(), Some("tests are red"));
        assert_eq!(report.flights[1].state, FlightState::Skipped);
        let failure = report.failure().unwrap();
        assert_eq!(failure.code.as_str(), "flight.failed");
    }
}
