use flightplan::manifest::PlanManifest;
use flightplan::{
    launch, Briefing, BriefingConfig, CommandOutput, CommandRunner, FlightState, Flightplan, Host,
    HostOverrides, Landing, MemoryReporter, PlanEvent, Result, TransportFactory,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;

type Journal = Arc<Mutex<Vec<(String, String)>>>;

/// Records every command; `false` fails, everything else succeeds.
struct ScriptedRunner {
    target: String,
    journal: Journal,
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &str, _stdin_file: Option<&Path>) -> CommandOutput {
        self.journal
            .lock()
            .unwrap()
            .push((self.target.clone(), command.to_string()));
        let success = command != "false";
        CommandOutput {
            stdout: String::new(),
            stderr: if success { String::new() } else { "exit status 1".to_string() },
            success,
            exit_code: if success { 0 } else { 1 },
        }
    }

    fn target(&self) -> String {
        self.target.clone()
    }

    fn is_remote(&self) -> bool {
        self.target != "local"
    }
}

#[derive(Default)]
struct ScriptedFactory {
    journal: Journal,
}

impl ScriptedFactory {
    fn commands_on(&self, target: &str) -> Vec<String> {
        self.journal
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == target)
            .map(|(_, c)| c.clone())
            .collect()
    }
}

impl TransportFactory for ScriptedFactory {
    fn local(&self) -> Box<dyn CommandRunner> {
        Box::new(ScriptedRunner {
            target: "local".to_string(),
            journal: Arc::clone(&self.journal),
        })
    }

    fn remote(&self, host: &Host) -> Result<Box<dyn CommandRunner>> {
        Ok(Box::new(ScriptedRunner {
            target: host.label(),
            journal: Arc::clone(&self.journal),
        }))
    }
}

fn plan_with(hosts: &[&str]) -> (Flightplan, Arc<ScriptedFactory>, Arc<MemoryReporter>) {
    let factory = Arc::new(ScriptedFactory::default());
    let reporter = Arc::new(MemoryReporter::new());
    let config = BriefingConfig::default().destination(
        "staging",
        hosts.iter().map(|h| Host::new(*h, "deploy")).collect(),
    );
    let plan = Flightplan::new(Briefing::new(config))
        .with_factory(factory.clone())
        .with_reporter(reporter.clone());
    (plan, factory, reporter)
}

#[test]
fn failing_host_stops_the_plan_after_its_siblings_finish() {
    let (mut plan, factory, reporter) = plan_with(&["h1", "h2"]);
    let calls = Arc::new(Mutex::new(Vec::new()));
    let c_runs = Arc::new(AtomicUsize::new(0));

    plan.local_labeled("A", |t| t.exec("make dist").map(|_| ()))
        .unwrap();

    // Both hosts must be inside the body at the same time to get past the barrier.
    let barrier = Arc::new(Barrier::new(2));
    plan.remote_labeled("B", move |t| {
        barrier.wait();
        if t.target().starts_with("deploy@h2") {
            t.exec("false")?;
        } else {
            std::thread::sleep(Duration::from_millis(50));
            t.exec("./restart.sh")?;
        }
        Ok(())
    })
    .unwrap();

    let counter = Arc::clone(&c_runs);
    plan.local_labeled("C", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    let log = Arc::clone(&calls);
    plan.on_success(move || log.lock().unwrap().push("success"));
    let log = Arc::clone(&calls);
    plan.on_failure(move || log.lock().unwrap().push("failure"));
    let log = Arc::clone(&calls);
    plan.on_complete(move || log.lock().unwrap().push("complete"));

    let landing = launch(&mut plan, Some("staging"), &HostOverrides::new());
    assert_eq!(landing.exit_code(), 1);
    let report = match landing {
        Landing::Completed(report) => report,
        other => panic!("expected a completed run, got {:?}", other),
    };

    assert_eq!(report.failed_flight, Some(2));
    assert_eq!(report.flights[0].state, FlightState::Succeeded);
    assert_eq!(report.flights[1].state, FlightState::Failed);
    assert_eq!(report.flights[2].state, FlightState::Skipped);
    assert_eq!(c_runs.load(Ordering::SeqCst), 0);
    assert_eq!(*calls.lock().unwrap(), vec!["failure", "complete"]);

    // h1 ran to completion although h2 had already failed.
    assert_eq!(factory.commands_on("deploy@h1:22"), vec!["./restart.sh"]);

    let crashes = &report.flights[1].status.as_ref().unwrap().crash_recordings;
    assert_eq!(crashes.len(), 1);
    assert_eq!(crashes[0].target, "deploy@h2:22");
    assert!(crashes[0].message.contains("false"));

    let events = reporter.events();
    assert!(events.contains(&PlanEvent::FlightSkipped { index: 3, total: 3 }));
    assert!(matches!(events.last(), Some(PlanEvent::PlanFailed { .. })));
}

#[test]
fn all_hosts_succeeding_runs_every_flight() {
    let (mut plan, factory, _) = plan_with(&["h1", "h2", "h3"]);
    let ran = Arc::new(AtomicUsize::new(0));

    plan.remote(|t| t.exec("uptime").map(|_| ())).unwrap();
    let counter = Arc::clone(&ran);
    plan.local(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    let report = plan.start(Some("staging"), &HostOverrides::new()).unwrap();
    assert!(!report.aborted);
    assert_eq!(report.exit_code(), 0);
    assert!(report.flights[0]
        .status
        .as_ref()
        .unwrap()
        .crash_recordings
        .is_empty());
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    for host in ["deploy@h1:22", "deploy@h2:22", "deploy@h3:22"] {
        assert_eq!(factory.commands_on(host), vec!["uptime"]);
    }
    assert!(report.failure().is_none());
}

#[test]
fn crash_recordings_follow_host_order_not_completion_order() {
    let (mut plan, _, _) = plan_with(&["h1", "h2", "h3"]);

    plan.remote(|t| {
        // h1 finishes last.
        if t.target().starts_with("deploy@h1") {
            std::thread::sleep(Duration::from_millis(80));
        }
        if !t.target().starts_with("deploy@h2") {
            t.exec("false")?;
        }
        Ok(())
    })
    .unwrap();

    let report = plan.start(Some("staging"), &HostOverrides::new()).unwrap();
    let targets: Vec<_> = report.flights[0]
        .status
        .as_ref()
        .unwrap()
        .crash_recordings
        .iter()
        .map(|c| c.target.clone())
        .collect();
    assert_eq!(targets, vec!["deploy@h1:22", "deploy@h3:22"]);
}

#[test]
fn unknown_destination_runs_nothing() {
    let (mut plan, factory, _) = plan_with(&["h1"]);
    let callbacks = Arc::new(AtomicUsize::new(0));
    plan.local(|t| t.exec("make dist").map(|_| ())).unwrap();
    plan.remote(|t| t.exec("uptime").map(|_| ())).unwrap();
    let counter = Arc::clone(&callbacks);
    plan.on_complete(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let landing = launch(&mut plan, Some("production"), &HostOverrides::new());
    match &landing {
        Landing::Fatal(err) => {
            assert_eq!(err.code.as_str(), "config.unknown_destination");
            assert!(err.hints[0].message.contains("staging"));
        }
        other => panic!("expected a fatal error, got {:?}", other),
    }
    assert_eq!(landing.exit_code(), 1);
    assert!(factory.journal.lock().unwrap().is_empty());
    assert_eq!(callbacks.load(Ordering::SeqCst), 0);
}

#[test]
fn failsafe_and_later_success_do_not_clear_an_abort() {
    let (mut plan, _, _) = plan_with(&["h1"]);
    plan.local(|t| {
        t.exec_with("false", flightplan::ExecOptions::failsafe())?;
        assert!(!t.is_aborted());
        let _ = t.exec("false");
        t.exec("true")?;
        assert!(t.is_aborted());
        Ok(())
    })
    .unwrap();

    let report = plan.start(None, &HostOverrides::new()).unwrap();
    assert!(report.aborted);
    assert_eq!(
        report.flights[0].status.as_ref().unwrap().crash_recordings.len(),
        1
    );
}

#[test]
fn panicking_remote_body_only_fails_its_host() {
    let (mut plan, factory, _) = plan_with(&["h1", "h2"]);
    plan.remote(|t| {
        if t.target().starts_with("deploy@h1") {
            panic!("lost the artifact");
        }
        t.exec("uptime").map(|_| ())
    })
    .unwrap();

    let report = plan.start(Some("staging"), &HostOverrides::new()).unwrap();
    let crashes = &report.flights[0].status.as_ref().unwrap().crash_recordings;
    assert_eq!(crashes.len(), 1);
    assert_eq!(crashes[0].target, "deploy@h1:22");
    assert_eq!(factory.commands_on("deploy@h2:22"), vec!["uptime"]);
}

#[test]
fn manifest_plan_runs_rendered_commands() {
    let manifest = PlanManifest::from_toml_str(
        r#"
[destinations]
staging = [{ host = "web1", user = "deploy" }]

[[flights]]
kind = "local"
commands = ["make dist"]

[[flights]]
kind = "remote"
cwd = "/srv/app"
commands = ["false", "./restart.sh"]

[[flights]]
kind = "local"
commands = ["echo never"]
"#,
        "flightplan.toml",
    )
    .unwrap();

    let factory = Arc::new(ScriptedFactory::default());
    let mut plan = manifest
        .into_plan(factory.clone(), Arc::new(MemoryReporter::new()))
        .unwrap();

    let report = plan
        .start(Some("staging"), &HostOverrides::new().set("username", "ops"))
        .unwrap();

    assert!(report.aborted);
    assert_eq!(factory.commands_on("local"), vec!["make dist"]);
    assert_eq!(factory.commands_on("ops@web1:22"), vec!["cd '/srv/app' && false"]);
}

#[cfg(unix)]
#[test]
fn manifest_hooks_run_locally() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("failed");
    let manifest = PlanManifest::from_json_str(
        &serde_json::json!({
            "flights": [{ "kind": "local", "commands": ["false"] }],
            "hooks": {
                "success": [format!("touch '{}.success'", marker.display())],
                "failure": [format!("touch '{}'", marker.display())]
            }
        })
        .to_string(),
        "plan.json",
    )
    .unwrap();

    let mut plan = manifest
        .into_plan(
            Arc::new(ScriptedFactory::default()),
            Arc::new(MemoryReporter::new()),
        )
        .unwrap();
    let report = plan.start(None, &HostOverrides::new()).unwrap();

    assert!(report.aborted);
    assert!(marker.exists());
    assert!(!dir.path().join("failed.success").exists());
}
