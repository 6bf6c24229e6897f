/// Local Tor environment report for `--tor-info`: Tor Browser install,
/// whether it is running, the control port, and torsocks.
use crate::probe::{SignalCheck, SocketProbe};
use crate::runner::CommandRunner;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Default control ports of a system Tor (9051) and of Tor Browser (9151).
pub const CONTROL_PORTS: [u16; 2] = [9051, 9151];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorInfo {
    pub platform: &'static str,
    pub browser: Option<PathBuf>,
    pub browser_running: bool,
    pub profile: Option<PathBuf>,
    pub control_port: Option<u16>,
    pub torsocks: bool,
}

impl TorInfo {
    pub fn render(&self) -> String {
        fn path_or(path: &Option<PathBuf>) -> String {
            path.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "Not found".to_string())
        }

        let mut out = String::new();
        let _ = writeln!(out, "Tor environment ({})", self.platform);
        let _ = writeln!(out, "Tor Browser:");
        let _ = writeln!(out, "  Installation: {}", path_or(&self.browser));
        let _ = writeln!(
            out,
            "  Running: {}",
            if self.browser_running { "Yes" } else { "No" }
        );
        let _ = writeln!(out, "  Profile: {}", path_or(&self.profile));
        let _ = writeln!(out, "Tor service:");
        let _ = writeln!(
            out,
            "  Control port: {}",
            self.control_port
                .map(|p| p.to_string())
                .unwrap_or_else(|| "Not detected".to_string())
        );
        let _ = writeln!(out, "Integration tools:");
        let _ = writeln!(
            out,
            "  torsocks: {}",
            if self.torsocks { "Available" } else { "Not installed" }
        );
        out
    }
}

/// Where Tor Browser usually gets unpacked on this platform.
pub fn browser_candidates() -> Vec<PathBuf> {
    let home = dirs::home_dir().unwrap_or_default();
    if cfg!(target_os = "macos") {
        vec![
            PathBuf::from("/Applications/Tor Browser.app"),
            home.join("Applications").join("Tor Browser.app"),
        ]
    } else if cfg!(windows) {
        let mut paths = Vec::new();
        if let Some(dir) = std::env::var_os("PROGRAMFILES") {
            paths.push(PathBuf::from(dir).join("Tor Browser"));
        }
        if let Some(dir) = dirs::data_local_dir() {
            paths.push(dir.join("Tor Browser"));
        }
        paths.push(home.join("Desktop").join("Tor Browser"));
        paths
    } else {
        vec![
            home.join("tor-browser_en-US"),
            home.join("tor-browser"),
            home.join(".local").join("share").join("torbrowser"),
            PathBuf::from("/opt/torbrowser"),
            PathBuf::from("/opt/tor-browser_en-US"),
        ]
    }
}

pub fn first_existing(paths: &[PathBuf]) -> Option<PathBuf> {
    paths.iter().find(|p| p.exists()).cloned()
}

fn browser_data(browser: &Path) -> PathBuf {
    browser.join("Browser").join("TorBrowser").join("Data")
}

pub fn profile_dir(browser: &Path) -> PathBuf {
    browser_data(browser).join("Browser").join("profile.default")
}

/// System torrc locations, then the bundled Tor Browser one.
pub fn torrc_candidates(browser: Option<&Path>) -> Vec<PathBuf> {
    let home = dirs::home_dir().unwrap_or_default();
    let mut paths = if cfg!(target_os = "macos") {
        vec![
            PathBuf::from("/usr/local/etc/tor/torrc"),
            home.join(".tor").join("torrc"),
        ]
    } else if cfg!(windows) {
        dirs::config_dir()
            .map(|dir| vec![dir.join("tor").join("torrc")])
            .unwrap_or_default()
    } else {
        vec![
            PathBuf::from("/etc/tor/torrc"),
            home.join(".tor").join("torrc"),
        ]
    };
    if let Some(browser) = browser {
        paths.push(browser_data(browser).join("Tor").join("torrc"));
    }
    paths
}

/// First numeric `ControlPort` in a torrc. Accepts `9051` and
/// `127.0.0.1:9051`; `auto` and commented lines are skipped.
pub fn parse_control_port(torrc: &str) -> Option<u16> {
    torrc.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("ControlPort")?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let value = rest.split_whitespace().next()?;
        let port = value.rsplit(':').next()?;
        port.parse::<u16>().ok().filter(|p| *p != 0)
    })
}

/// Control port from the first torrc that names one, else the first
/// default port accepting connections on `host`.
pub async fn detect_control_port(torrcs: &[PathBuf], host: &str, fallback: &[u16]) -> Option<u16> {
    for path in torrcs {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "torrc not readable");
                continue;
            }
        };
        if let Some(port) = parse_control_port(&contents) {
            tracing::info!(port, torrc = %path.display(), "found ControlPort in torrc");
            return Some(port);
        }
    }

    let hosts = [host.to_string()];
    for port in fallback {
        if SocketProbe::new(&hosts, &[*port]).check().await {
            tracing::info!(port, "found open control port");
            return Some(*port);
        }
    }
    tracing::warn!("could not detect Tor control port");
    None
}

#[cfg(not(windows))]
pub async fn browser_running<R: CommandRunner>(runner: &R) -> bool {
    // Tor Browser is a Firefox build started with its own profile
    match runner.run("pgrep", &["-f", "firefox.*tor"]).await {
        Ok(out) => out.success(),
        Err(e) => {
            tracing::warn!(error = %e, "could not check for Tor Browser");
            false
        }
    }
}

#[cfg(windows)]
pub async fn browser_running<R: CommandRunner>(runner: &R) -> bool {
    match runner.run("tasklist", &["/FI", "IMAGENAME eq firefox.exe"]).await {
        Ok(out) => out.stdout.to_lowercase().contains("firefox.exe"),
        Err(e) => {
            tracing::warn!(error = %e, "could not check for Tor Browser");
            false
        }
    }
}

pub async fn gather<R: CommandRunner>(runner: &R) -> TorInfo {
    let browser = first_existing(&browser_candidates());
    let profile = browser
        .as_deref()
        .map(profile_dir)
        .filter(|p| p.exists());
    let torrcs = torrc_candidates(browser.as_deref());

    TorInfo {
        platform: std::env::consts::OS,
        browser_running: browser_running(runner).await,
        control_port: detect_control_port(&torrcs, "127.0.0.1", &CONTROL_PORTS).await,
        torsocks: which::which("torsocks").is_ok(),
        browser,
        profile,
    }
}
