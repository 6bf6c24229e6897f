use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration loaded from torguard.toml.
///
/// Immutable once loaded: the monitor receives it behind an `Arc` and reads
/// it for the whole run.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    pub probe: ProbeConfig,
    pub monitor: MonitorConfig,
    pub killswitch: KillSwitchConfig,
    pub warning: WarningConfig,
    pub menu: MenuConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Local SOCKS ports the proxy listens on.
    pub socks_ports: Vec<u16>,
    /// Host literals to probe (IPv4 or IPv6).
    pub check_hosts: Vec<String>,
    /// Exact process name looked up in the process table.
    pub process_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Delay before each re-probe after an initial failure.
    pub grace_seconds: u64,
    /// Re-probes after an initial failure before the outage is confirmed.
    pub retries: u32,
    /// Polling period while healthy.
    pub check_interval: u64,
}

impl MonitorConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_seconds)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KillSwitchConfig {
    /// Ask for an explicit YES before disabling networking.
    pub require_confirm: bool,
    /// Interfaces the kill-switch may target; empty means first active one.
    pub interface_whitelist: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WarningConfig {
    /// Try a graphical dialog before falling back to the terminal.
    pub use_gui: bool,
    /// Optional image shown full-screen by an external viewer.
    pub red_image_path: Option<PathBuf>,
}

impl WarningConfig {
    /// The configured image path with a leading `~/` expanded, if set.
    pub fn red_image(&self) -> Option<PathBuf> {
        let raw = self.red_image_path.as_ref()?;
        if raw.as_os_str().is_empty() {
            return None;
        }
        match (raw.strip_prefix("~"), dirs::home_dir()) {
            (Ok(rest), Some(home)) => Some(home.join(rest)),
            _ => Some(raw.clone()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MenuConfig {
    /// Run the interactive menu; false means headless.
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log file appended to alongside stderr.
    pub file: Option<PathBuf>,
    /// JSON status snapshot rewritten on every monitor transition.
    pub status_file: Option<PathBuf>,
}

// --- Default implementations ---

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            socks_ports: vec![9050, 9150],
            check_hosts: vec!["127.0.0.1".to_string(), "::1".to_string()],
            process_name: "tor".to_string(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            grace_seconds: 8,
            retries: 2,
            check_interval: 3,
        }
    }
}

impl Default for KillSwitchConfig {
    fn default() -> Self {
        Self {
            require_confirm: true,
            interface_whitelist: Vec::new(),
        }
    }
}

impl Default for WarningConfig {
    fn default() -> Self {
        Self {
            use_gui: true,
            red_image_path: None,
        }
    }
}

impl Default for MenuConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: Some(PathBuf::from("/var/tmp/torguard.log")),
            status_file: None,
        }
    }
}

impl GuardConfig {
    /// Check every constraint the monitor relies on.
    ///
    /// Collects all problems rather than stopping at the first one so the
    /// operator can fix the file in one pass.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        for port in &self.probe.socks_ports {
            if *port == 0 {
                problems.push("probe.socks_ports: port 0 is not a valid port".to_string());
            }
        }
        if self.probe.check_hosts.is_empty() {
            problems.push("probe.check_hosts cannot be empty".to_string());
        }
        if self.probe.check_hosts.iter().any(|h| h.trim().is_empty()) {
            problems.push("probe.check_hosts contains a blank entry".to_string());
        }
        if self.probe.process_name.trim().is_empty() {
            problems.push("probe.process_name cannot be empty".to_string());
        }
        if self.monitor.retries < 1 {
            problems.push(format!(
                "monitor.retries must be at least 1: {}",
                self.monitor.retries
            ));
        }
        if self.monitor.check_interval < 1 {
            problems.push(format!(
                "monitor.check_interval must be at least 1: {}",
                self.monitor.check_interval
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { problems })
        }
    }

    /// Log non-fatal issues (currently: a configured image that is missing).
    pub fn warn_soft_issues(&self) {
        if let Some(image) = self.warning.red_image() {
            if !image.exists() {
                tracing::warn!(path = %image.display(), "warning.red_image_path does not exist");
            }
        }
    }
}

/// Read, parse, and validate a configuration file.
pub fn load(path: &Path) -> Result<GuardConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    let config: GuardConfig = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    config.validate()?;
    Ok(config)
}

/// Errors from locating, reading, or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    NotFound {
        path: PathBuf,
    },
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    Invalid {
        problems: Vec<String>,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound { path } => {
                write!(f, "config file not found: {}", path.display())
            }
            ConfigError::Create { path, source } => {
                write!(
                    f,
                    "failed to create default config {}: {source}",
                    path.display()
                )
            }
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {source}", path.display())
            }
            ConfigError::Invalid { problems } => {
                write!(f, "invalid configuration: {}", problems.join("; "))
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Create { source, .. } => Some(source),
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::NotFound { .. } | ConfigError::Invalid { .. } => None,
        }
    }
}
