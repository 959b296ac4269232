//! Process-level entry: interrupt handling and exit codes.
//!
//! An interrupt (SIGINT/SIGTERM) ends the process immediately with status 1;
//! lifecycle callbacks do not run. A panic escaping the plan is caught,
//! logged and also mapped to status 1.

use crate::error::Error;
use crate::host::HostOverrides;
use crate::plan::{Flightplan, PlanReport};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

/// How a launched plan ended.
#[derive(Debug)]
pub enum Landing {
    /// Every flight ran, or the plan stopped at a failing flight.
    Completed(PlanReport),
    /// Refused before any flight ran.
    Fatal(Error),
    /// Something panicked outside a flight body.
    Crashed(String),
}

impl Landing {
    pub fn exit_code(&self) -> u8 {
        match self {
            Landing::Completed(report) => report.exit_code(),
            Landing::Fatal(_) | Landing::Crashed(_) => 1,
        }
    }
}

/// Run `plan` as the body of the process.
pub fn launch(plan: &mut Flightplan, destination: Option<&str>, overrides: &HostOverrides) -> Landing {
    install_interrupt_handler();

    match panic::catch_unwind(AssertUnwindSafe(|| plan.start(destination, overrides))) {
        Ok(Ok(report)) => Landing::Completed(report),
        Ok(Err(err)) => {
            report_fatal(&err);
            Landing::Fatal(err)
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            eprintln!("[flightplan] Uncaught error, aborting: {}", message);
            Landing::Crashed(message)
        }
    }
}

/// Write a fatal error and its hints to stderr, terminal or not.
pub fn report_fatal(err: &Error) {
    for line in fatal_lines(err) {
        eprintln!("{}", line);
    }
}

pub fn fatal_lines(err: &Error) -> Vec<String> {
    std::iter::once(format!("[flightplan] Error: {}", err.message))
        .chain(
            err.hints
                .iter()
                .map(|hint| format!("[flightplan] hint: {}", hint.message)),
        )
        .collect()
}

pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Install the emergency-exit handler once per process.
pub fn install_interrupt_handler() {
    static INSTALLED: Once = Once::new();
    INSTALLED.call_once(imp::install);
}

#[cfg(unix)]
mod imp {
    const MESSAGE: &[u8] = b"\n[flightplan] Interrupted, aborting flightplan\n";

    // Only async-signal-safe calls in here: write(2) and _exit(2).
    extern "C" fn on_interrupt(_signal: libc::c_int) {
        unsafe {
            let _ = libc::write(
                libc::STDERR_FILENO,
                MESSAGE.as_ptr() as *const libc::c_void,
                MESSAGE.len(),
            );
            libc::_exit(1);
        }
    }

    pub(super) fn install() {
        let handler = on_interrupt as extern "C" fn(libc::c_int) as libc::sighandler_t;
        unsafe {
            libc::signal(libc::SIGINT, handler);
            libc::signal(libc::SIGTERM, handler);
        }
    }
}

#[cfg(not(unix))]
mod imp {
    pub(super) fn install() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::briefing::{Briefing, BriefingConfig};
    use crate::reporter::MemoryReporter;
    use std::sync::Arc;

    fn plan() -> Flightplan {
        Flightplan::new(Briefing::new(BriefingConfig::default()))
            .with_reporter(Arc::new(MemoryReporter::new()))
    }

    #[test]
    fn fatal_error_exits_one() {
        let mut plan = plan();
        plan.remote(|_| Ok(())).unwrap();
        let landing = launch(&mut plan, Some("nowhere"), &HostOverrides::new());
        assert!(matches!(landing, Landing::Fatal(_)));
        assert_eq!(landing.exit_code(), 1);
    }

    #[test]
    fn fatal_lines_carry_message_and_hints() {
        let err = Error::unknown_destination(Some("nowhere"), vec!["staging".to_string()]);
        assert_eq!(
            fatal_lines(&err),
            vec![
                "[flightplan] Error: Unknown destination 'nowhere'".to_string(),
                "[flightplan] hint: Configured destinations: staging".to_string(),
            ]
        );
    }

    #[test]
    fn empty_plan_exits_zero() {
        let mut plan = plan();
        let landing = launch(&mut plan, None, &HostOverrides::new());
        assert_eq!(landing.exit_code(), 0);
    }

    #[test]
    fn panicking_callback_is_contained() {
        let mut plan = plan();
        plan.on_complete(|| panic!("callback exploded"));
        let landing = launch(&mut plan, None, &HostOverrides::new());
        match landing {
            Landing::Crashed(message) => assert_eq!(message, "callback exploded"),
            other => panic!("expected crash, got {:?}", other),
        }
    }
}
