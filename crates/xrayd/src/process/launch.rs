//! Supervisor launch sequencing and runtime orchestration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ortho_config::OrthoConfig;
use tracing::info;

use xrayd_config::Config;

use crate::debounce::{ActionHandler, DebounceHandle, Debouncer, FsEvent, FsEventKind};
use crate::lifecycle::{
    Collaborators, CommandLauncher, LifecycleManager, Signaller, SystemSignaller, config_identity,
};
use crate::registry::{self, ProcessRegistry, RegistryError, SharedRegistry};
use crate::stability::SizeStabilityChecker;
use crate::telemetry::{self, LogRotator};
use crate::watcher::{DirectoryWatcher, ensure_accessible, list_config_files};

use super::PROCESS_TARGET;
use super::coordinator::{ShutdownCoordinator, ShutdownReport};
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Everything the supervisor needs to run.
pub struct SupervisorPlan<S> {
    /// Resolved configuration.
    pub config: Config,
    /// Operating-system collaborators used by the lifecycle manager.
    pub collaborators: Collaborators,
    /// Rotator invoked after each lifecycle action.
    pub rotator: LogRotator,
    /// Source of the shutdown notification.
    pub shutdown: S,
}

/// Runs the supervisor using the production collaborators.
pub fn run_supervisor() -> Result<(), LaunchError> {
    let config = Config::load()?;
    ensure_accessible(config.config_dir())?;
    let telemetry = telemetry::initialise(&config)?;
    let shutdown = SystemShutdownSignal::install()?;
    let signaller: Arc<dyn Signaller> = Arc::new(SystemSignaller::new());
    let plan = SupervisorPlan {
        collaborators: Collaborators {
            launcher: Box::new(CommandLauncher::new(config.executable())),
            signaller,
            stability: Box::new(SizeStabilityChecker::new(
                config.settle_delay(),
                config.stability_window(),
            )),
        },
        rotator: telemetry.rotator(config.log_max_bytes()),
        shutdown,
        config,
    };
    let report = run_supervisor_with(plan)?;
    info!(
        target: PROCESS_TARGET,
        terminated = report.terminated.len(),
        missing = report.missing.len(),
        failed = report.failed.len(),
        "supervisor exiting"
    );
    Ok(())
}

/// Runs the supervisor with injected collaborators until shutdown completes.
pub fn run_supervisor_with<S>(plan: SupervisorPlan<S>) -> Result<ShutdownReport, LaunchError>
where
    S: ShutdownSignal,
{
    let SupervisorPlan {
        config,
        collaborators,
        rotator,
        shutdown,
    } = plan;

    info!(
        target: PROCESS_TARGET,
        dir = %config.config_dir().display(),
        extension = config.extension(),
        registry = %config.registry_path().display(),
        "starting supervisor"
    );
    let registry = ProcessRegistry::open(config.registry_path())?.into_shared();
    let manager = Arc::new(LifecycleManager::new(
        collaborators,
        Arc::clone(&registry),
        rotator,
        config.grace_period(),
    ));
    manager.forget_exited()?;
    let configs = list_config_files(config.config_dir(), config.extension())?;

    let signaller = Arc::clone(manager.signaller());
    let handler: Arc<dyn ActionHandler> = manager;
    let debouncer = Debouncer::spawn(config.debounce_delay(), handler)
        .map_err(|source| LaunchError::Worker { source })?;
    let watcher =
        DirectoryWatcher::start(config.config_dir(), config.extension(), debouncer.handle())?;
    schedule_untracked(&registry, &debouncer.handle(), configs)?;

    let waited = shutdown.wait();
    drop(watcher);
    debouncer.stop();
    let drained = ShutdownCoordinator::new(registry, signaller).run();
    debouncer.join();
    waited?;
    let report = drained?;
    info!(
        target: PROCESS_TARGET,
        "shutdown sequence completed"
    );
    Ok(report)
}

/// Queues a start for every configuration not already served.
fn schedule_untracked(
    registry: &SharedRegistry,
    debounce: &DebounceHandle,
    configs: Vec<PathBuf>,
) -> Result<(), RegistryError> {
    let registry = registry::lock(registry);
    for path in configs {
        let Some(identity) = config_identity(&path) else {
            continue;
        };
        if registry.contains_identity(&identity)? {
            info!(
                target: PROCESS_TARGET,
                path = %path.display(),
                "configuration already served; skipping"
            );
            continue;
        }
        info!(
            target: PROCESS_TARGET,
            path = %path.display(),
            "found configuration"
        );
        debounce.schedule_after(FsEvent::new(FsEventKind::Created, path), Duration::ZERO);
    }
    Ok(())
}
