//! Supervisor scenario world shared across BDD steps.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use crate::debounce::{ActionHandler, Debouncer, FsEvent, FsEventKind};
use crate::lifecycle::{Collaborators, LifecycleManager, StartOutcome, StopOutcome};
use crate::process::{ShutdownCoordinator, ShutdownReport};
use crate::registry::{self, ManagedProcess, ProcessRegistry, SharedRegistry};
use crate::telemetry::LogRotator;

use super::doubles::{RecordingLauncher, RecordingSignaller, StubStability};

pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(100);
const SETTLE_TIMEOUT: Duration = Duration::from_secs(3);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub type StepResult = Result<(), String>;

pub fn world() -> RefCell<SupervisorWorld> {
    RefCell::new(SupervisorWorld::new())
}

pub struct SupervisorWorld {
    dir: TempDir,
    pub launcher: RecordingLauncher,
    pub signaller: RecordingSignaller,
    pub stability: StubStability,
    registry: SharedRegistry,
    manager: Arc<LifecycleManager>,
    debouncer: Option<Debouncer>,
    served: HashMap<String, u32>,
    stop_result: Option<Result<StopOutcome, String>>,
    shutdown_report: Option<ShutdownReport>,
}

impl SupervisorWorld {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        fs::create_dir(dir.path().join("config")).expect("create config dir");
        let registry = ProcessRegistry::open(dir.path().join("xray.pid"))
            .expect("open registry")
            .into_shared();
        let launcher = RecordingLauncher::default();
        let signaller = RecordingSignaller::default();
        let stability = StubStability::default();
        let manager = Arc::new(LifecycleManager::new(
            Collaborators {
                launcher: Box::new(launcher.clone()),
                signaller: Arc::new(signaller.clone()),
                stability: Box::new(stability.clone()),
            },
            Arc::clone(&registry),
            LogRotator::disabled(),
            Duration::ZERO,
        ));
        Self {
            dir,
            launcher,
            signaller,
            stability,
            registry,
            manager,
            debouncer: None,
            served: HashMap::new(),
            stop_result: None,
            shutdown_report: None,
        }
    }

    pub fn config_path(&self, identity: &str) -> PathBuf {
        self.dir.path().join("config").join(identity)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.dir.path().join("xray.pid")
    }

    pub fn write_config(&self, identity: &str) -> StepResult {
        fs::write(self.config_path(identity), b"{\"inbounds\": []}")
            .map_err(|error| error.to_string())
    }

    pub fn serve(&mut self, identity: &str) -> StepResult {
        self.write_config(identity)?;
        match self.manager.start(&self.config_path(identity)) {
            Ok(StartOutcome::Started { pid }) => {
                self.served.insert(identity.to_owned(), pid);
                Ok(())
            }
            other => Err(format!("expected {identity} to start, got {other:?}")),
        }
    }

    pub fn served_pid(&self, identity: &str) -> Option<u32> {
        self.served.get(identity).copied()
    }

    pub fn emit(&mut self, kind: FsEventKind, identity: &str) -> StepResult {
        let path = self.config_path(identity);
        match kind {
            FsEventKind::Created | FsEventKind::Modified => self.write_config(identity)?,
            FsEventKind::Deleted => {
                if path.exists() {
                    fs::remove_file(&path).map_err(|error| error.to_string())?;
                }
            }
        }
        self.debouncer()?.handle().schedule(FsEvent::new(kind, path));
        Ok(())
    }

    /// Waits for every pending event to dispatch and for the worker to finish.
    pub fn settle(&mut self) -> StepResult {
        let Some(debouncer) = self.debouncer.take() else {
            return Ok(());
        };
        let handle = debouncer.handle();
        let deadline = Instant::now() + SETTLE_TIMEOUT;
        while handle.pending() > 0 {
            if Instant::now() >= deadline {
                return Err("debounced events never dispatched".to_owned());
            }
            thread::sleep(POLL_INTERVAL);
        }
        debouncer.join();
        Ok(())
    }

    pub fn stop(&mut self, identity: &str) {
        self.stop_result = Some(self.manager.stop(identity).map_err(|error| error.to_string()));
    }

    pub fn stop_result(&self) -> Option<&Result<StopOutcome, String>> {
        self.stop_result.as_ref()
    }

    pub fn shut_down(&mut self) -> StepResult {
        let signaller = Arc::clone(self.manager.signaller());
        let report = ShutdownCoordinator::new(Arc::clone(&self.registry), signaller)
            .run()
            .map_err(|error| error.to_string())?;
        self.shutdown_report = Some(report);
        Ok(())
    }

    pub fn shutdown_report(&self) -> Option<&ShutdownReport> {
        self.shutdown_report.as_ref()
    }

    pub fn entries(&self) -> Result<Vec<ManagedProcess>, String> {
        registry::lock(&self.registry)
            .load()
            .map_err(|error| error.to_string())
    }

    fn debouncer(&mut self) -> Result<&Debouncer, String> {
        if self.debouncer.is_none() {
            let handler: Arc<dyn ActionHandler> = self.manager.clone();
            let debouncer =
                Debouncer::spawn(DEBOUNCE_DELAY, handler).map_err(|error| error.to_string())?;
            self.debouncer = Some(debouncer);
        }
        self.debouncer
            .as_ref()
            .ok_or_else(|| "debouncer unavailable".to_owned())
    }
}
