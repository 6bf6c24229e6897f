/// Interactive line menu: start/stop the monitor, inspect it, and exit.
///
/// Lines arrive from the shared console, so while a consent prompt is
/// pending the menu simply does not see input.
use crate::config::WarningConfig;
use crate::killswitch::Disabled;
use crate::monitor::{MonitorHandle, RunOutcome};
use crate::warning::WarningPresenter;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// How long quit/stop waits for the worker to wind down.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Lines shown by "Tail Logs".
pub const LOG_TAIL_LINES: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    Start,
    Stop,
    Status,
    Logs,
    TestWarning,
    ConfigPath,
    Quit,
}

impl MenuItem {
    pub const ALL: [MenuItem; 7] = [
        MenuItem::Start,
        MenuItem::Stop,
        MenuItem::Status,
        MenuItem::Logs,
        MenuItem::TestWarning,
        MenuItem::ConfigPath,
        MenuItem::Quit,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MenuItem::Start => "Start Monitor",
            MenuItem::Stop => "Stop Monitor",
            MenuItem::Status => "Status",
            MenuItem::Logs => "Tail Logs",
            MenuItem::TestWarning => "Test Warning",
            MenuItem::ConfigPath => "Show Config Path",
            MenuItem::Quit => "Quit",
        }
    }

    fn keyword(&self) -> &'static str {
        match self {
            MenuItem::Start => "start",
            MenuItem::Stop => "stop",
            MenuItem::Status => "status",
            MenuItem::Logs => "logs",
            MenuItem::TestWarning => "test",
            MenuItem::ConfigPath => "config",
            MenuItem::Quit => "quit",
        }
    }

    /// Accepts the item number or its keyword, case-insensitively.
    pub fn parse(input: &str) -> Option<MenuItem> {
        let input = input.trim();
        if let Ok(n) = input.parse::<usize>() {
            return n.checked_sub(1).and_then(|i| Self::ALL.get(i)).copied();
        }
        let input = input.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|item| item.keyword() == input || (input == "q" && *item == MenuItem::Quit))
    }
}

pub fn render_menu() -> String {
    let mut out = String::from("\nTorGuard\n");
    for (i, item) in MenuItem::ALL.iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", i + 1, item.label()));
    }
    out
}

/// Last `n` lines of the log file, or a placeholder.
pub fn tail_lines(path: &Path, n: usize) -> String {
    if !path.exists() {
        return "<no logs yet>".to_string();
    }
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let lines: Vec<&str> = contents.lines().collect();
            let start = lines.len().saturating_sub(n);
            lines[start..].join("\n")
        }
        Err(e) => format!("<error reading logs: {e}>"),
    }
}

enum Step {
    Continue(String),
    Quit(Option<Disabled>),
}

/// Result of asking the monitor to stop.
#[derive(Debug, PartialEq)]
enum Stop {
    NotRunning,
    Finished(RunOutcome),
    /// Stop requested but the worker is still blocked (e.g. in a dialog).
    /// The handle is kept so it can still be joined.
    Pending,
}

pub struct Menu<S> {
    start: S,
    monitor: Option<MonitorHandle>,
    presenter: Arc<dyn WarningPresenter>,
    warning: WarningConfig,
    log_file: Option<PathBuf>,
    config_path: PathBuf,
}

impl<S: Fn() -> MonitorHandle> Menu<S> {
    pub fn new(
        start: S,
        presenter: Arc<dyn WarningPresenter>,
        warning: WarningConfig,
        log_file: Option<PathBuf>,
        config_path: PathBuf,
    ) -> Self {
        Self {
            start,
            monitor: None,
            presenter,
            warning,
            log_file,
            config_path,
        }
    }

    /// Run until quit, EOF, or a successful network disable. Returns the
    /// disable if the monitor terminated.
    pub async fn run(mut self, lines: &mut UnboundedReceiver<String>) -> Option<Disabled> {
        print!("{}", render_menu());
        loop {
            print!("Select: ");
            let _ = std::io::stdout().flush();

            let line = tokio::select! {
                line = lines.recv() => line,
                outcome = wait_monitor(&mut self.monitor) => {
                    self.monitor = None;
                    match outcome {
                        RunOutcome::Terminated(disabled) => return Some(disabled),
                        RunOutcome::Stopped => {
                            println!("\nMonitor stopped.");
                            continue;
                        }
                    }
                }
            };

            let Some(line) = line else {
                tracing::debug!("input closed, leaving menu");
                return self.shutdown().await;
            };
            if line.trim().is_empty() {
                continue;
            }

            match MenuItem::parse(&line) {
                Some(item) => match self.handle(item).await {
                    Step::Continue(text) => println!("{text}"),
                    Step::Quit(disabled) => return disabled,
                },
                None => println!("Unknown option: {}", line.trim()),
            }
        }
    }

    async fn handle(&mut self, item: MenuItem) -> Step {
        tracing::debug!(?item, "menu selection");
        match item {
            MenuItem::Start => {
                if self.running() {
                    let stopping = self.monitor.as_ref().is_some_and(MonitorHandle::stop_requested);
                    return Step::Continue(if stopping {
                        "Previous monitor is still finishing; try again shortly.".to_string()
                    } else {
                        "Monitor already running.".to_string()
                    });
                }
                self.monitor = Some((self.start)());
                tracing::info!("monitor started from menu");
                Step::Continue("Monitor started.".to_string())
            }
            MenuItem::Stop => match self.stop_monitor().await {
                Stop::Finished(RunOutcome::Terminated(disabled)) => Step::Quit(Some(disabled)),
                Stop::Finished(RunOutcome::Stopped) => {
                    Step::Continue("Monitor stopped.".to_string())
                }
                Stop::Pending => Step::Continue(
                    "Stop requested; monitor still finishing.".to_string(),
                ),
                Stop::NotRunning => Step::Continue("Monitor not running.".to_string()),
            },
            MenuItem::Status => Step::Continue(self.status_line()),
            MenuItem::Logs => Step::Continue(match &self.log_file {
                Some(path) => tail_lines(path, LOG_TAIL_LINES),
                None => "<file logging disabled>".to_string(),
            }),
            MenuItem::TestWarning => {
                let presenter = Arc::clone(&self.presenter);
                let warning = self.warning.clone();
                let shown = tokio::task::spawn_blocking(move || presenter.present(&warning)).await;
                Step::Continue(match shown {
                    Ok(Ok(())) => "Warning test complete.".to_string(),
                    Ok(Err(e)) => format!("Warning could not be shown: {e}"),
                    Err(e) => format!("Warning could not be shown: {e}"),
                })
            }
            MenuItem::ConfigPath => {
                Step::Continue(format!("Config file: {}", self.config_path.display()))
            }
            MenuItem::Quit => Step::Quit(self.shutdown().await),
        }
    }

    fn running(&self) -> bool {
        self.monitor.as_ref().is_some_and(MonitorHandle::is_running)
    }

    fn status_line(&self) -> String {
        match &self.monitor {
            Some(handle) if handle.is_running() => {
                let status = handle.status();
                format!(
                    "Monitor: RUNNING | State: {} | Outages: {}",
                    status.health, status.outages
                )
            }
            _ => "Monitor: STOPPED".to_string(),
        }
    }

    /// Stop and wait up to `STOP_TIMEOUT`.
    async fn stop_monitor(&mut self) -> Stop {
        let Some(handle) = self.monitor.as_mut() else {
            return Stop::NotRunning;
        };
        handle.stop();
        match tokio::time::timeout(STOP_TIMEOUT, handle.join()).await {
            Ok(outcome) => {
                self.monitor = None;
                Stop::Finished(outcome)
            }
            Err(_) => {
                tracing::warn!("monitor did not stop within timeout, still finishing");
                Stop::Pending
            }
        }
    }

    async fn shutdown(&mut self) -> Option<Disabled> {
        match self.stop_monitor().await {
            Stop::Finished(RunOutcome::Terminated(disabled)) => Some(disabled),
            _ => None,
        }
    }
}

async fn wait_monitor(monitor: &mut Option<MonitorHandle>) -> RunOutcome {
    match monitor {
        Some(handle) => handle.join().await,
        None => std::future::pending().await,
    }
}
