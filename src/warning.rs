/// Outage warning presentation.
///
/// Presenters block until the operator acknowledges. They are tried in a
/// fixed preference order (image viewer, graphical dialog, terminal) and the
/// first one that manages to show the warning wins.
use crate::config::WarningConfig;
use crate::consent::ConsentSource;
use std::process::Command;
use std::sync::Arc;

pub const TITLE: &str = "TOR CONNECTION LOST";

pub const MESSAGE: &str = "TOR CONNECTION LOST\n\n\
Close your browser NOW.\n\
After closing the browser, you may proceed to disable networking.";

/// Why a presenter could not show the warning.
#[derive(Debug)]
pub enum WarningError {
    /// Preconditions not met (not configured, no display, no tool).
    Unavailable { reason: String },
    /// The external tool could not be run.
    Spawn {
        tool: &'static str,
        source: std::io::Error,
    },
    /// The external tool ran but reported an error.
    Failed {
        tool: &'static str,
        exit_code: Option<i32>,
    },
}

impl std::fmt::Display for WarningError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WarningError::Unavailable { reason } => write!(f, "unavailable: {reason}"),
            WarningError::Spawn { tool, source } => write!(f, "failed to run {tool}: {source}"),
            WarningError::Failed { tool, exit_code } => {
                write!(f, "{tool} exited with {exit_code:?}")
            }
        }
    }
}

impl std::error::Error for WarningError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WarningError::Spawn { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn unavailable(reason: impl Into<String>) -> WarningError {
    WarningError::Unavailable {
        reason: reason.into(),
    }
}

/// Shows the outage warning and blocks until it is acknowledged.
pub trait WarningPresenter: Send + Sync {
    fn name(&self) -> &'static str;

    fn present(&self, config: &WarningConfig) -> Result<(), WarningError>;
}

/// Full-screen image through ImageMagick `display` or `feh`; closing the
/// viewer acknowledges.
pub struct ImagePresenter;

impl ImagePresenter {
    const VIEWERS: [(&'static str, &'static str); 2] = [("display", "-backdrop"), ("feh", "-F")];
}

impl WarningPresenter for ImagePresenter {
    fn name(&self) -> &'static str {
        "image"
    }

    fn present(&self, config: &WarningConfig) -> Result<(), WarningError> {
        let image = config
            .red_image()
            .ok_or_else(|| unavailable("no red_image_path configured"))?;
        if !image.exists() {
            return Err(unavailable(format!("{} does not exist", image.display())));
        }

        for (viewer, fullscreen) in Self::VIEWERS {
            if which::which(viewer).is_err() {
                continue;
            }
            match Command::new(viewer).arg(fullscreen).arg(&image).status() {
                Ok(status) if status.success() => {
                    tracing::info!(viewer, "warning image shown and closed");
                    return Ok(());
                }
                Ok(status) => {
                    tracing::warn!(viewer, exit_code = ?status.code(), "image viewer failed");
                }
                Err(e) => {
                    tracing::warn!(viewer, error = %e, "failed to start image viewer");
                }
            }
        }
        Err(unavailable("no working image viewer (tried display, feh)"))
    }
}

/// Modal desktop dialog through zenity or kdialog.
pub struct DialogPresenter;

impl DialogPresenter {
    fn has_display() -> bool {
        std::env::var_os("DISPLAY").is_some() || std::env::var_os("WAYLAND_DISPLAY").is_some()
    }

    fn run(tool: &'static str, args: &[&str]) -> Result<(), WarningError> {
        let status = Command::new(tool)
            .args(args)
            .status()
            .map_err(|e| WarningError::Spawn { tool, source: e })?;
        // zenity reports 1 when the window is closed instead of confirmed;
        // both mean the operator saw it
        match status.code() {
            Some(0) | Some(1) => Ok(()),
            code => Err(WarningError::Failed {
                tool,
                exit_code: code,
            }),
        }
    }
}

impl WarningPresenter for DialogPresenter {
    fn name(&self) -> &'static str {
        "dialog"
    }

    fn present(&self, config: &WarningConfig) -> Result<(), WarningError> {
        if !config.use_gui {
            return Err(unavailable("disabled by warning.use_gui"));
        }
        if !Self::has_display() {
            return Err(unavailable("no graphical display"));
        }

        let text = format!("{MESSAGE}\n\nPress OK once you've closed your browser.");
        if which::which("zenity").is_ok() {
            let title = format!("--title={TITLE}");
            let body = format!("--text={text}");
            return Self::run("zenity", &["--warning", &title, &body, "--width=600"]);
        }
        if which::which("kdialog").is_ok() {
            return Self::run("kdialog", &["--title", TITLE, "--sorry", &text]);
        }
        Err(unavailable("neither zenity nor kdialog is installed"))
    }
}

/// Boxed banner on stdout, acknowledged with Enter. Always succeeds.
pub struct TerminalPresenter {
    input: Arc<dyn ConsentSource>,
}

impl TerminalPresenter {
    pub fn new(input: Arc<dyn ConsentSource>) -> Self {
        Self { input }
    }
}

impl WarningPresenter for TerminalPresenter {
    fn name(&self) -> &'static str {
        "terminal"
    }

    fn present(&self, _config: &WarningConfig) -> Result<(), WarningError> {
        let rule = "=".repeat(80);
        println!("\n{rule}");
        println!("{:^80}", format!("!!!  {TITLE}  !!!"));
        println!("{:^80}", "CLOSE YOUR BROWSER NOW");
        println!("{rule}\n");
        self.input
            .ask("Press Enter after you've closed your browser...");
        tracing::info!("terminal warning acknowledged");
        Ok(())
    }
}

/// Tries each presenter in order until one shows the warning.
pub struct WarningChain {
    presenters: Vec<Box<dyn WarningPresenter>>,
}

impl WarningChain {
    pub fn new(presenters: Vec<Box<dyn WarningPresenter>>) -> Self {
        Self { presenters }
    }

    /// Image, then dialog, then the terminal banner as the last resort.
    pub fn standard(input: Arc<dyn ConsentSource>) -> Self {
        Self::new(vec![
            Box::new(ImagePresenter),
            Box::new(DialogPresenter),
            Box::new(TerminalPresenter::new(input)),
        ])
    }
}

impl WarningPresenter for WarningChain {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn present(&self, config: &WarningConfig) -> Result<(), WarningError> {
        for presenter in &self.presenters {
            match presenter.present(config) {
                Ok(()) => {
                    tracing::info!(presenter = presenter.name(), "warning acknowledged");
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!(presenter = presenter.name(), error = %e, "presenter skipped");
                }
            }
        }
        Err(unavailable("no presenter could show the warning"))
    }
}
