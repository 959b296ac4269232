//! Progress events emitted by the engine.
//!
//! The engine never writes to the terminal itself: it hands [`PlanEvent`]s to
//! a [`Reporter`]. [`StatusReporter`] renders them as `[prefix]` status lines
//! on stderr; [`MemoryReporter`] keeps them for inspection.

use crate::flight::{CrashRecording, FlightKind};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum PlanEvent {
    PlanStarted {
        destination: Option<String>,
        flights: usize,
    },
    FlightStarted {
        index: usize,
        total: usize,
        kind: FlightKind,
        label: Option<String>,
    },
    FlightSucceeded {
        index: usize,
        total: usize,
        duration: Duration,
    },
    FlightFailed {
        index: usize,
        total: usize,
        duration: Duration,
        crash_recordings: Vec<CrashRecording>,
    },
    FlightSkipped {
        index: usize,
        total: usize,
    },
    CommandStarted {
        target: String,
        command: String,
    },
    Log {
        target: String,
        message: String,
    },
    PlanSucceeded {
        duration: Duration,
    },
    PlanFailed {
        duration: Duration,
    },
}

pub trait Reporter: Send + Sync {
    fn report(&self, event: &PlanEvent);
}

/// Progress through `log_status!`; failures always reach stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatusReporter {
    /// Also print every command before it runs.
    pub verbose: bool,
}

impl Reporter for StatusReporter {
    fn report(&self, event: &PlanEvent) {
        match event {
            PlanEvent::PlanStarted {
                destination,
                flights,
            } => match destination {
                Some(name) => log_status!("flightplan", "Flying {} flight(s) to '{}'", flights, name),
                None => log_status!("flightplan", "Flying {} flight(s)", flights),
            },
            PlanEvent::FlightStarted {
                index,
                total,
                kind,
                label,
            } => {
                let label = label.as_deref().map(|l| format!(" ({})", l)).unwrap_or_default();
                log_status!("flight", "Flight {}/{} launched [{}]{}", index, total, kind, label);
            }
            PlanEvent::FlightSucceeded {
                index,
                total,
                duration,
            } => log_status!(
                "flight",
                "Flight {}/{} finished after {}",
                index,
                total,
                format_duration(*duration)
            ),
            PlanEvent::FlightFailed { .. } | PlanEvent::PlanFailed { .. } => {
                for line in failure_lines(event) {
                    eprintln!("{}", line);
                }
            }
            PlanEvent::FlightSkipped { index, total } => {
                log_status!("flight", "Flight {}/{} skipped", index, total)
            }
            PlanEvent::CommandStarted { target, command } => {
                if self.verbose {
                    log_status!("exec", "{} $ {}", target, command);
                }
            }
            PlanEvent::Log { target, message } => log_status!("log", "{} {}", target, message),
            PlanEvent::PlanSucceeded { duration } => log_status!(
                "flightplan",
                "Flightplan finished after {}",
                format_duration(*duration)
            ),
        }
    }
}

/// Lines written for failure events. Unlike progress, these reach stderr
/// whether or not it is a terminal.
pub fn failure_lines(event: &PlanEvent) -> Vec<String> {
    match event {
        PlanEvent::FlightFailed {
            index,
            total,
            duration,
            crash_recordings,
        } => std::iter::once(format!(
            "[flight] Flight {}/{} aborted after {}",
            index,
            total,
            format_duration(*duration)
        ))
        .chain(crash_recordings.iter().map(|crash| format!("[flight]   {}", crash)))
        .collect(),
        PlanEvent::PlanFailed { duration } => vec![format!(
            "[flightplan] Flightplan aborted after {}",
            format_duration(*duration)
        )],
        _ => Vec::new(),
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<PlanEvent>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PlanEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, event: &PlanEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        format!("{}m{:02}s", millis / 60_000, (millis % 60_000) / 1000)
    }
}
