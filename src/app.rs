/// Wiring: builds monitors from the loaded config with the real probe,
/// command runner, presenters, and terminal consent.
use crate::config::GuardConfig;
use crate::consent::ConsentSource;
use crate::killswitch::{Backend, KillSwitch};
use crate::monitor::Monitor;
use crate::probe::{LivenessProbe, ProcessProbe, SocketProbe};
use crate::runner::SystemRunner;
use crate::status::StatusFile;
use crate::warning::{WarningChain, WarningPresenter};
use std::sync::Arc;

pub type SystemProbe = LivenessProbe<SocketProbe, ProcessProbe<Arc<SystemRunner>>>;
pub type SystemMonitor = Monitor<SystemProbe, Arc<SystemRunner>>;

pub struct Guard {
    config: Arc<GuardConfig>,
    backend: Backend,
    runner: Arc<SystemRunner>,
    consent: Arc<dyn ConsentSource>,
    presenter: Arc<dyn WarningPresenter>,
}

impl Guard {
    pub fn new(config: Arc<GuardConfig>, backend: Backend, consent: Arc<dyn ConsentSource>) -> Self {
        let presenter: Arc<dyn WarningPresenter> =
            Arc::new(WarningChain::standard(Arc::clone(&consent)));
        Self {
            config,
            backend,
            runner: Arc::new(SystemRunner::default()),
            consent,
            presenter,
        }
    }

    pub fn presenter(&self) -> Arc<dyn WarningPresenter> {
        Arc::clone(&self.presenter)
    }

    pub fn status_file(&self) -> Option<StatusFile> {
        self.config.logging.status_file.clone().map(StatusFile::new)
    }

    /// A fresh, not yet started monitor. Each start gets its own run state.
    pub fn monitor(&self) -> SystemMonitor {
        let probe = LivenessProbe::from_config(&self.config.probe, Arc::clone(&self.runner));
        let kill_switch = KillSwitch::new(
            self.backend,
            Arc::clone(&self.runner),
            Arc::clone(&self.consent),
        );
        let monitor = Monitor::new(
            Arc::clone(&self.config),
            probe,
            kill_switch,
            Arc::clone(&self.presenter),
            Arc::clone(&self.consent),
        );
        match self.status_file() {
            Some(file) => monitor.with_status_file(file),
            None => monitor,
        }
    }
}
