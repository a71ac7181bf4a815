//! End-to-end runs of the supervisor with injected collaborators.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rstest::{fixture, rstest};
use tempfile::TempDir;
use xrayd_config::Config;

use crate::lifecycle::Collaborators;
use crate::process::{LaunchError, SupervisorPlan, run_supervisor_with};
use crate::registry::{ManagedProcess, ProcessRegistry};
use crate::telemetry::{self, LogRotator};

use super::support::{
    FIRST_PID, RecordingLauncher, RecordingSignaller, StubStability, TestShutdownSignal,
};

const WAIT_TIMEOUT: Duration = Duration::from_secs(3);
const POLL_INTERVAL: Duration = Duration::from_millis(20);
const TRACKED_PID: u32 = 31_337;

struct Harness {
    dir: TempDir,
    launcher: RecordingLauncher,
    signaller: RecordingSignaller,
    stability: StubStability,
    shutdown: TestShutdownSignal,
}

impl Harness {
    fn config_dir(&self) -> PathBuf {
        self.dir.path().join("config")
    }

    fn registry_path(&self) -> PathBuf {
        self.dir.path().join("xray.pid")
    }

    fn config(&self) -> Config {
        Config {
            config_dir: self.config_dir(),
            registry_path: self.registry_path(),
            debounce_ms: 50,
            settle_ms: 0,
            stability_window_ms: 0,
            grace_period_ms: 0,
            ..Config::default()
        }
    }

    fn plan(&self) -> SupervisorPlan<TestShutdownSignal> {
        SupervisorPlan {
            config: self.config(),
            collaborators: Collaborators {
                launcher: Box::new(self.launcher.clone()),
                signaller: Arc::new(self.signaller.clone()),
                stability: Box::new(self.stability.clone()),
            },
            rotator: LogRotator::disabled(),
            shutdown: self.shutdown.clone(),
        }
    }

    fn write_config(&self, name: &str) {
        fs::write(self.config_dir().join(name), b"{}").expect("write configuration");
    }

    /// Triggers shutdown once `pid` is registered for `identity` or the wait times out.
    fn shut_down_after_registration_of(
        &self,
        pid: u32,
        identity: &str,
    ) -> thread::JoinHandle<bool> {
        let registry = self.registry_path();
        let shutdown = self.shutdown.clone();
        let expected = ManagedProcess::new(pid, identity).to_string();
        thread::spawn(move || {
            let deadline = Instant::now() + WAIT_TIMEOUT;
            let mut registered = false;
            while Instant::now() < deadline {
                let contents = fs::read_to_string(&registry).unwrap_or_default();
                if contents.lines().any(|line| line == expected) {
                    registered = true;
                    break;
                }
                thread::sleep(POLL_INTERVAL);
            }
            shutdown.trigger();
            registered
        })
    }
}

#[fixture]
fn harness() -> Harness {
    let dir = TempDir::new().expect("create temp dir");
    fs::create_dir(dir.path().join("config")).expect("create config dir");
    Harness {
        dir,
        launcher: RecordingLauncher::default(),
        signaller: RecordingSignaller::default(),
        stability: StubStability::default(),
        shutdown: TestShutdownSignal::new(),
    }
}

fn seed_registry(path: &Path, entry: ManagedProcess) {
    let mut registry = ProcessRegistry::open(path).expect("open registry");
    registry.append(entry).expect("seed registry");
}

#[rstest]
fn startup_scan_launches_only_untracked_configurations(harness: Harness) {
    harness.write_config("a.json");
    harness.write_config("b.json");
    harness.write_config("notes.txt");
    seed_registry(
        &harness.registry_path(),
        ManagedProcess::new(TRACKED_PID, "a.json"),
    );

    let trigger = harness.shut_down_after_registration_of(FIRST_PID, "b.json");
    let report = run_supervisor_with(harness.plan()).expect("supervisor should run");
    let registered = trigger.join().expect("trigger thread panicked");

    assert!(registered, "b.json was never registered");
    assert_eq!(harness.launcher.launches_for("a.json"), 0);
    assert_eq!(harness.launcher.launches_for("notes.txt"), 0);
    let mut terminated: Vec<u32> = report.terminated.iter().map(ManagedProcess::pid).collect();
    terminated.sort_unstable();
    assert_eq!(terminated, vec![FIRST_PID, TRACKED_PID]);
    assert!(!harness.registry_path().exists());
}

#[rstest]
fn startup_forgets_processes_that_already_exited(harness: Harness) {
    harness.write_config("a.json");
    seed_registry(
        &harness.registry_path(),
        ManagedProcess::new(TRACKED_PID, "a.json"),
    );
    harness.signaller.mark_exited(TRACKED_PID);

    let trigger = harness.shut_down_after_registration_of(FIRST_PID, "a.json");
    let report = run_supervisor_with(harness.plan()).expect("supervisor should run");

    assert!(trigger.join().expect("trigger thread panicked"));
    assert!(report.missing.is_empty());
    let terminated: Vec<u32> = report.terminated.iter().map(ManagedProcess::pid).collect();
    assert_eq!(terminated, vec![FIRST_PID]);
}

#[rstest]
fn missing_configuration_directory_is_fatal(harness: Harness) {
    fs::remove_dir(harness.config_dir()).expect("remove config dir");
    harness.shutdown.trigger();

    let error = run_supervisor_with(harness.plan()).expect_err("supervisor should fail");

    assert!(matches!(error, LaunchError::Watch { .. }), "got {error:?}");
    assert!(harness.launcher.launched().is_empty());
}

#[rstest]
fn log_setup_does_not_create_missing_configuration_directory(harness: Harness) {
    fs::remove_dir(harness.config_dir()).expect("remove config dir");
    harness.shutdown.trigger();
    let config = harness.config();

    let initialised = telemetry::initialise(&config);
    assert!(
        !harness.config_dir().exists(),
        "log setup created the watched directory ({initialised:?})"
    );

    let error = run_supervisor_with(harness.plan()).expect_err("supervisor should fail");
    assert!(matches!(error, LaunchError::Watch { .. }), "got {error:?}");
}
