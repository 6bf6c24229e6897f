/// Outage state machine.
///
/// One tokio task probes the proxy every `check_interval`, debounces
/// failures with a grace/retry policy, and on a confirmed outage walks
/// warning → consent → privilege check → kill-switch. The task is the only
/// writer of the status snapshot; everyone else observes it through a
/// `watch` receiver.
use crate::config::GuardConfig;
use crate::consent::{self, ConsentSource};
use crate::killswitch::{self, Disabled, KillSwitch};
use crate::probe::{Liveness, Probe, Signal};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::runner::CommandRunner;
use crate::status::{StatusFile, StatusRecord};
use crate::warning::WarningPresenter;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const CONSENT_PROMPT: &str = "Proceed to disable network now? Type YES to proceed: ";

/// Last known proxy health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    /// No probe has completed yet.
    Unknown,
    Healthy,
    Down,
}

impl std::fmt::Display for Health {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Health::Unknown => write!(f, "unknown"),
            Health::Healthy => write!(f, "Tor OK"),
            Health::Down => write!(f, "Tor DOWN"),
        }
    }
}

/// Where the state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Healthy,
    SuspectedOutage,
    ConfirmedOutage,
    Alerting,
    AwaitingConsent,
    Disabling,
    Aborted,
    Terminated,
    Stopped,
}

/// Everything observers may read about a run. Published whole.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub health: Health,
    pub phase: Phase,
    /// Signal behind the most recent successful probe.
    pub last_signal: Option<Signal>,
    /// Confirmed outages this run.
    pub outages: u32,
    /// When `phase` was entered.
    pub since: DateTime<Utc>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            health: Health::Unknown,
            phase: Phase::Healthy,
            last_signal: None,
            outages: 0,
            since: Utc::now(),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Stopped,
    /// Networking was disabled; the process should exit.
    Terminated(Disabled),
}

/// Result of handling one failed probe.
enum Escalation {
    Recovered,
    Aborted,
    Stopped,
    Terminated(Disabled),
}

/// Owns the status sender and mirrors every change to the status file.
struct Reporter {
    tx: watch::Sender<StatusSnapshot>,
    file: Option<StatusFile>,
}

impl Reporter {
    fn update(&self, change: impl FnOnce(&mut StatusSnapshot)) {
        self.tx.send_modify(|snapshot| {
            let before = snapshot.phase;
            change(snapshot);
            if snapshot.phase != before {
                snapshot.since = Utc::now();
            }
        });

        if let Some(file) = &self.file {
            let snapshot = self.tx.borrow().clone();
            if let Err(e) = file.write(&StatusRecord::new(&snapshot)) {
                tracing::warn!(error = %e, "failed to write status file");
            }
        }
    }

    fn phase(&self, phase: Phase) {
        self.update(|s| s.phase = phase);
    }

    fn health(&self) -> Health {
        self.tx.borrow().health
    }
}

fn stop_requested(cancel: &watch::Receiver<bool>) -> bool {
    *cancel.borrow()
}

/// Sleep that a stop request cuts short. Returns true if stopped.
async fn pause(cancel: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        // Err means the handle is gone, which is a stop as well
        _ = cancel.wait_for(|stop| *stop) => true,
    }
}

pub struct Monitor<P, R> {
    config: Arc<GuardConfig>,
    probe: P,
    kill_switch: KillSwitch<R>,
    presenter: Arc<dyn WarningPresenter>,
    consent: Arc<dyn ConsentSource>,
    privileged: fn() -> bool,
    status_file: Option<StatusFile>,
}

impl<P: Probe, R: CommandRunner> Monitor<P, R> {
    pub fn new(
        config: Arc<GuardConfig>,
        probe: P,
        kill_switch: KillSwitch<R>,
        presenter: Arc<dyn WarningPresenter>,
        consent: Arc<dyn ConsentSource>,
    ) -> Self {
        Self {
            config,
            probe,
            kill_switch,
            presenter,
            consent,
            privileged: killswitch::has_privilege,
            status_file: None,
        }
    }

    /// Replace the effective-uid check.
    pub fn with_privilege_check(mut self, check: fn() -> bool) -> Self {
        self.privileged = check;
        self
    }

    pub fn with_status_file(mut self, file: StatusFile) -> Self {
        self.status_file = Some(file);
        self
    }

    /// Spawn the worker task.
    pub fn start(self) -> MonitorHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(StatusSnapshot::default());
        let reporter = Reporter {
            tx: status_tx,
            file: self.status_file.clone(),
        };
        let task = tokio::spawn(self.run(cancel_rx, reporter));
        MonitorHandle {
            cancel: cancel_tx,
            status: status_rx,
            task: Some(task),
            outcome: None,
        }
    }

    async fn run(self, mut cancel: watch::Receiver<bool>, reporter: Reporter) -> RunOutcome {
        let monitor = &self.config.monitor;
        tracing::info!(
            ports = ?self.config.probe.socks_ports,
            hosts = ?self.config.probe.check_hosts,
            grace_seconds = monitor.grace_seconds,
            retries = monitor.retries,
            check_interval = monitor.check_interval,
            backend = %self.kill_switch.backend(),
            "monitor started"
        );

        loop {
            if stop_requested(&cancel) {
                return self.finish_stopped(&reporter);
            }

            match self.probe.probe().await {
                Liveness::Alive(signal) => {
                    if reporter.health() == Health::Down {
                        tracing::info!(signal = %signal, "proxy restored");
                    }
                    reporter.update(|s| {
                        s.health = Health::Healthy;
                        s.phase = Phase::Healthy;
                        s.last_signal = Some(signal);
                    });
                }
                Liveness::Down => match self.escalate(&mut cancel, &reporter).await {
                    Escalation::Recovered | Escalation::Aborted => {}
                    Escalation::Stopped => return self.finish_stopped(&reporter),
                    Escalation::Terminated(disabled) => {
                        return RunOutcome::Terminated(disabled);
                    }
                },
            }

            if pause(&mut cancel, monitor.interval()).await {
                return self.finish_stopped(&reporter);
            }
        }
    }

    /// Walk a failed probe through debounce and, if confirmed, the
    /// warning/consent/disable sequence.
    async fn escalate(
        &self,
        cancel: &mut watch::Receiver<bool>,
        reporter: &Reporter,
    ) -> Escalation {
        let monitor = &self.config.monitor;
        reporter.phase(Phase::SuspectedOutage);
        tracing::warn!("proxy unreachable, suspected outage");

        let mut policy = RetryPolicy::new(monitor.retries);
        let mut decision = policy.evaluate(Liveness::Down);
        loop {
            match decision {
                RetryDecision::Retry { .. } => {
                    if pause(cancel, monitor.grace()).await {
                        return Escalation::Stopped;
                    }
                    decision = policy.evaluate(self.probe.probe().await);
                }
                RetryDecision::Recovered { attempt, signal } => {
                    tracing::info!(attempt, signal = %signal, "short outage recovered");
                    reporter.update(|s| {
                        s.health = Health::Healthy;
                        s.phase = Phase::Healthy;
                        s.last_signal = Some(signal);
                    });
                    return Escalation::Recovered;
                }
                RetryDecision::Exhausted => break,
            }
        }

        reporter.update(|s| {
            s.health = Health::Down;
            s.phase = Phase::ConfirmedOutage;
            s.outages += 1;
        });
        tracing::error!(
            grace_seconds = monitor.grace_seconds,
            retries = monitor.retries,
            "proxy outage confirmed"
        );

        reporter.phase(Phase::Alerting);
        self.alert().await;
        if stop_requested(cancel) {
            return Escalation::Stopped;
        }

        reporter.phase(Phase::AwaitingConsent);
        if self.config.killswitch.require_confirm {
            tracing::info!("consent requested");
            let answer = consent::ask(&self.consent, CONSENT_PROMPT).await;
            if stop_requested(cancel) {
                return Escalation::Stopped;
            }
            if !consent::is_affirmative(&answer) {
                println!("Aborted by user.");
                tracing::info!("operator declined network disable");
                return self.abort(reporter);
            }
        } else {
            tracing::info!("confirmation disabled, proceeding to disable network");
        }

        reporter.phase(Phase::Disabling);
        if !(self.privileged)() {
            println!("Must be root to disable networking. Re-run with sudo.");
            tracing::error!("not privileged, cannot disable network");
            return self.abort(reporter);
        }

        // Once dispatched the kill-switch runs to completion; stop requests
        // are not consulted again.
        match self.kill_switch.disable(&self.config.killswitch).await {
            Ok(disabled) => {
                tracing::warn!(disabled = %disabled, "network disabled");
                reporter.phase(Phase::Terminated);
                Escalation::Terminated(disabled)
            }
            Err(e) => {
                println!("Network was NOT disabled: {e}");
                tracing::error!(error = %e, "network disable failed");
                self.abort(reporter)
            }
        }
    }

    /// Show the warning on the blocking pool. Failure to show it does not
    /// stop the escalation.
    async fn alert(&self) {
        let presenter = Arc::clone(&self.presenter);
        let config = self.config.warning.clone();
        match tokio::task::spawn_blocking(move || presenter.present(&config)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "could not show outage warning"),
            Err(e) => tracing::error!(error = %e, "warning presenter panicked"),
        }
    }

    fn abort(&self, reporter: &Reporter) -> Escalation {
        reporter.update(|s| {
            s.health = Health::Down;
            s.phase = Phase::Aborted;
        });
        tracing::info!(
            check_interval = self.config.monitor.check_interval,
            "disable aborted, resuming monitoring"
        );
        Escalation::Aborted
    }

    fn finish_stopped(&self, reporter: &Reporter) -> RunOutcome {
        reporter.phase(Phase::Stopped);
        if let Some(file) = &self.status_file {
            file.remove();
        }
        tracing::info!("monitor stopped");
        RunOutcome::Stopped
    }
}

/// Control surface for a running monitor. Dropping it requests a stop.
pub struct MonitorHandle {
    cancel: watch::Sender<bool>,
    status: watch::Receiver<StatusSnapshot>,
    task: Option<JoinHandle<RunOutcome>>,
    outcome: Option<RunOutcome>,
}

impl MonitorHandle {
    /// Request a stop. Idempotent; the flag is never reset.
    pub fn stop(&self) {
        self.cancel.send_replace(true);
    }

    pub fn stop_requested(&self) -> bool {
        *self.cancel.borrow()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    #[allow(dead_code)]
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Wait for the worker to end. Cancel-safe: dropping the future leaves
    /// the handle joinable.
    pub async fn join(&mut self) -> RunOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let Some(task) = self.task.as_mut() else {
            return RunOutcome::Stopped;
        };
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "monitor task failed");
                RunOutcome::Stopped
            }
        };
        self.task = None;
        self.outcome = Some(outcome.clone());
        outcome
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KillSwitchConfig, MonitorConfig, WarningConfig};
    use crate::consent::ScriptedConsent;
    use crate::killswitch::Backend;
    use crate::probe::{LivenessProbe, SocketProbe};
    use crate::runner::testing::ScriptedRunner;
    use crate::warning::WarningError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    type Events = Arc<Mutex<Vec<String>>>;

    /// Replays a fixed sequence of probe results, then repeats `fallback`.
    struct SequenceProbe {
        results: Mutex<VecDeque<Liveness>>,
        fallback: Liveness,
        calls: Arc<AtomicU32>,
    }

    impl SequenceProbe {
        fn new(results: &[Liveness], fallback: Liveness) -> Self {
            Self {
                results: Mutex::new(results.iter().copied().collect()),
                fallback,
                calls: Arc::new(AtomicU32::new(0)),
            }
        }

        fn always_down() -> Self {
            Self::new(&[], Liveness::Down)
        }
    }

    impl Probe for SequenceProbe {
        async fn probe(&self) -> Liveness {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.results.lock().unwrap().pop_front();
            next.unwrap_or(self.fallback)
        }
    }

    struct RecordingPresenter(Events);

    impl WarningPresenter for RecordingPresenter {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn present(&self, _config: &WarningConfig) -> Result<(), WarningError> {
            self.0.lock().unwrap().push("warning".to_string());
            Ok(())
        }
    }

    /// Consent that logs each prompt into the shared event list.
    struct RecordingConsent {
        events: Events,
        answers: Mutex<VecDeque<String>>,
    }

    impl ConsentSource for RecordingConsent {
        fn ask(&self, prompt: &str) -> String {
            self.events.lock().unwrap().push(format!("consent: {prompt}"));
            self.answers.lock().unwrap().pop_front().unwrap_or_default()
        }
    }

    /// Consent that blocks until the test releases an answer.
    struct GatedConsent(Mutex<std::sync::mpsc::Receiver<String>>);

    impl ConsentSource for GatedConsent {
        fn ask(&self, _prompt: &str) -> String {
            self.0.lock().unwrap().recv().unwrap_or_default()
        }
    }

    struct Harness {
        events: Events,
        runner: Arc<ScriptedRunner>,
    }

    fn config(retries: u32, grace_seconds: u64, require_confirm: bool) -> Arc<GuardConfig> {
        Arc::new(GuardConfig {
            monitor: MonitorConfig {
                grace_seconds,
                retries,
                check_interval: 3,
            },
            killswitch: KillSwitchConfig {
                require_confirm,
                interface_whitelist: Vec::new(),
            },
            ..GuardConfig::default()
        })
    }

    fn build<P: Probe>(
        config: Arc<GuardConfig>,
        probe: P,
        backend: Backend,
        runner: ScriptedRunner,
        answers: &[&str],
    ) -> (Monitor<P, Arc<ScriptedRunner>>, Harness) {
        let events: Events = Arc::new(Mutex::new(Vec::new()));
        let runner = Arc::new(runner);
        let consent: Arc<dyn ConsentSource> = Arc::new(RecordingConsent {
            events: Arc::clone(&events),
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
        });
        let kill_switch = KillSwitch::new(backend, Arc::clone(&runner), Arc::clone(&consent));
        let monitor = Monitor::new(
            config,
            probe,
            kill_switch,
            Arc::new(RecordingPresenter(Arc::clone(&events))),
            consent,
        )
        .with_privilege_check(|| true);
        (monitor, Harness { events, runner })
    }

    async fn wait_for_phase(handle: &MonitorHandle, phase: Phase) {
        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.phase == phase).await.unwrap();
    }

    fn warnings(events: &Events) -> usize {
        events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| *e == "warning")
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_probe_sets_health() {
        let probe = SequenceProbe::new(&[], Liveness::Alive(Signal::Socket));
        let (monitor, h) = build(
            config(2, 8, true),
            probe,
            Backend::NetworkManager,
            ScriptedRunner::new(),
            &[],
        );
        let mut handle = monitor.start();
        assert_eq!(handle.status().health, Health::Unknown);

        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.health == Health::Healthy).await.unwrap();
        assert_eq!(handle.status().last_signal, Some(Signal::Socket));

        handle.stop();
        assert_eq!(handle.join().await, RunOutcome::Stopped);
        assert_eq!(handle.status().phase, Phase::Stopped);
        assert!(!handle.is_running());
        assert!(h.events.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_before_last_retry_never_alerts() {
        let probe = SequenceProbe::new(
            &[
                Liveness::Alive(Signal::Socket),
                Liveness::Down,
                Liveness::Down,
                Liveness::Alive(Signal::Process),
            ],
            Liveness::Alive(Signal::Socket),
        );
        let (monitor, h) = build(
            config(3, 8, true),
            probe,
            Backend::NetworkManager,
            ScriptedRunner::new(),
            &[],
        );
        let mut handle = monitor.start();

        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.last_signal == Some(Signal::Process))
            .await
            .unwrap();
        let snapshot = handle.status();
        assert_eq!(snapshot.phase, Phase::Healthy);
        assert_eq!(snapshot.health, Health::Healthy);
        assert_eq!(snapshot.outages, 0);

        handle.stop();
        assert_eq!(handle.join().await, RunOutcome::Stopped);
        assert_eq!(warnings(&h.events), 0);
        assert!(h.runner.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_reprobe_recovers_without_warning() {
        let probe = SequenceProbe::new(
            &[Liveness::Down, Liveness::Down],
            Liveness::Alive(Signal::Socket),
        );
        let calls = Arc::clone(&probe.calls);
        let (monitor, h) = build(
            config(2, 1, true),
            probe,
            Backend::NetworkManager,
            ScriptedRunner::new(),
            &[],
        );
        let mut handle = monitor.start();

        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.last_signal == Some(Signal::Socket))
            .await
            .unwrap();
        // initial failure, failed re-probe 1, successful re-probe 2
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(handle.status().phase, Phase::Healthy);

        handle.stop();
        handle.join().await;
        assert_eq!(warnings(&h.events), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_alert_once_before_consent() {
        let (monitor, h) = build(
            config(1, 0, true),
            SequenceProbe::always_down(),
            Backend::NetworkManager,
            ScriptedRunner::new(),
            &["no"],
        );
        let mut handle = monitor.start();
        wait_for_phase(&handle, Phase::Aborted).await;
        handle.stop();
        assert_eq!(handle.join().await, RunOutcome::Stopped);

        let events = h.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["warning".to_string(), format!("consent: {CONSENT_PROMPT}")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_grace_never_alerts() {
        let (monitor, h) = build(
            config(3, 8, true),
            SequenceProbe::always_down(),
            Backend::NetworkManager,
            ScriptedRunner::new(),
            &[],
        );
        let mut handle = monitor.start();
        wait_for_phase(&handle, Phase::SuspectedOutage).await;
        tokio::time::advance(Duration::from_secs(2)).await;

        let stopped_at = tokio::time::Instant::now();
        handle.stop();
        assert_eq!(handle.join().await, RunOutcome::Stopped);
        // the 8s grace sleep is cut short, not waited out
        assert!(stopped_at.elapsed() < Duration::from_secs(1));
        assert_eq!(warnings(&h.events), 0);
        assert_eq!(handle.status().phase, Phase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_check_interval_is_prompt() {
        let probe = SequenceProbe::new(&[], Liveness::Alive(Signal::Socket));
        let (monitor, _h) = build(
            config(2, 8, true),
            probe,
            Backend::NetworkManager,
            ScriptedRunner::new(),
            &[],
        );
        let mut handle = monitor.start();
        wait_for_phase(&handle, Phase::Healthy).await;

        let stopped_at = tokio::time::Instant::now();
        handle.stop();
        assert_eq!(handle.join().await, RunOutcome::Stopped);
        assert!(stopped_at.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refusal_aborts_with_health_down_and_resumes() {
        let probe = SequenceProbe::new(&[Liveness::Down, Liveness::Down], Liveness::Down);
        let (monitor, h) = build(
            config(1, 0, true),
            probe,
            Backend::NetworkManager,
            ScriptedRunner::new(),
            &["nope"],
        );
        let mut handle = monitor.start();
        wait_for_phase(&handle, Phase::Aborted).await;
        let snapshot = handle.status();
        assert_eq!(snapshot.health, Health::Down);
        assert_eq!(snapshot.outages, 1);

        // After one interval the loop probes again and re-confirms
        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.outages == 2).await.unwrap();

        handle.stop();
        handle.join().await;
        assert!(h.runner.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_privilege_aborts_without_commands() {
        let (monitor, h) = build(
            config(1, 0, true),
            SequenceProbe::always_down(),
            Backend::NetworkManager,
            ScriptedRunner::new().respond("nmcli networking off", 0, ""),
            &["YES", "YES"],
        );
        let mut handle = monitor.with_privilege_check(|| false).start();
        wait_for_phase(&handle, Phase::Aborted).await;
        handle.stop();
        handle.join().await;
        assert!(h.runner.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_kill_switch_failure_aborts() {
        let (monitor, h) = build(
            config(1, 0, false),
            SequenceProbe::always_down(),
            Backend::NetworkManager,
            ScriptedRunner::new().respond("nmcli networking off", 1, ""),
            &[],
        );
        let mut handle = monitor.start();
        wait_for_phase(&handle, Phase::Aborted).await;
        assert_eq!(h.runner.calls(), vec!["nmcli networking off".to_string()]);

        handle.stop();
        assert_eq!(handle.join().await, RunOutcome::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_awaiting_consent_skips_kill_switch() {
        let (tx, rx) = std::sync::mpsc::channel();
        let runner = Arc::new(ScriptedRunner::new().respond("nmcli networking off", 0, ""));
        let consent: Arc<dyn ConsentSource> = Arc::new(GatedConsent(Mutex::new(rx)));
        let events: Events = Arc::new(Mutex::new(Vec::new()));
        let monitor = Monitor::new(
            config(1, 0, true),
            SequenceProbe::always_down(),
            KillSwitch::new(
                Backend::NetworkManager,
                Arc::clone(&runner),
                Arc::clone(&consent),
            ),
            Arc::new(RecordingPresenter(Arc::clone(&events))),
            consent,
        )
        .with_privilege_check(|| true);

        let mut handle = monitor.start();
        wait_for_phase(&handle, Phase::AwaitingConsent).await;
        handle.stop();
        tx.send("YES".to_string()).unwrap();

        assert_eq!(handle.join().await, RunOutcome::Stopped);
        assert!(runner.calls().is_empty());
        assert_eq!(warnings(&events), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_proxy_end_to_end_disables_interface() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let closed_port = listener.local_addr().unwrap().port();
        drop(listener);

        let runner = ScriptedRunner::new()
            .respond("pgrep -x tor", 1, "")
            .respond(
                "ip -o link show up",
                0,
                "1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536\n2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500\n",
            )
            .respond("ip link set eth0 down", 0, "");
        let runner = Arc::new(runner);
        let probe = LivenessProbe::new(
            SocketProbe::new(&["127.0.0.1".to_string()], &[closed_port]),
            crate::probe::ProcessProbe::new(Arc::clone(&runner), "tor"),
        );

        let events: Events = Arc::new(Mutex::new(Vec::new()));
        let consent = Arc::new(ScriptedConsent::new(&["YES", "YES"]));
        let kill_switch = KillSwitch::new(
            Backend::Interface,
            Arc::clone(&runner),
            Arc::clone(&consent) as Arc<dyn ConsentSource>,
        );
        let monitor = Monitor::new(
            config(2, 1, true),
            probe,
            kill_switch,
            Arc::new(RecordingPresenter(Arc::clone(&events))),
            Arc::clone(&consent) as Arc<dyn ConsentSource>,
        )
        .with_privilege_check(|| true);

        let started = tokio::time::Instant::now();
        let mut handle = monitor.start();
        let outcome = handle.join().await;
        // two grace delays of one second each before the outage is confirmed
        assert!(started.elapsed() >= Duration::from_secs(2));

        assert_eq!(
            outcome,
            RunOutcome::Terminated(Disabled {
                backend: Backend::Interface,
                targets: vec!["eth0".to_string()],
            })
        );
        assert_eq!(warnings(&events), 1);
        assert_eq!(consent.prompts()[0], CONSENT_PROMPT);
        let calls = runner.calls();
        // one process check per probe: initial + two re-probes
        assert_eq!(calls.iter().filter(|c| *c == "pgrep -x tor").count(), 3);
        assert_eq!(calls.last().unwrap(), "ip link set eth0 down");
        assert_eq!(handle.status().phase, Phase::Terminated);
        assert_eq!(handle.status().health, Health::Down);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_file_tracks_phase_and_is_removed_on_stop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("torguard.status");
        let (monitor, _h) = build(
            config(1, 0, true),
            SequenceProbe::always_down(),
            Backend::NetworkManager,
            ScriptedRunner::new(),
            &[],
        );
        let mut handle = monitor
            .with_status_file(StatusFile::new(path.clone()))
            .start();

        wait_for_phase(&handle, Phase::Aborted).await;
        let parsed = StatusFile::new(path.clone()).read().unwrap();
        assert_eq!(parsed["phase"], "aborted");
        assert_eq!(parsed["health"], "down");

        handle.stop();
        handle.join().await;
        assert!(!path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_is_repeatable() {
        let (monitor, _h) = build(
            config(2, 8, true),
            SequenceProbe::new(&[], Liveness::Alive(Signal::Socket)),
            Backend::NetworkManager,
            ScriptedRunner::new(),
            &[],
        );
        let mut handle = monitor.start();
        handle.stop();
        assert_eq!(handle.join().await, RunOutcome::Stopped);
        assert_eq!(handle.join().await, RunOutcome::Stopped);
    }

    #[test]
    fn test_health_display() {
        assert_eq!(Health::Healthy.to_string(), "Tor OK");
        assert_eq!(Health::Down.to_string(), "Tor DOWN");
        assert_eq!(Health::Unknown.to_string(), "unknown");
    }
}
