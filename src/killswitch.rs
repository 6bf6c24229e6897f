/// Network kill-switch: cut the machine's connectivity so nothing leaks
/// around a dead proxy.
///
/// The platform path is a closed set of backends picked once at startup.
/// Disabling is always gated by consent inside `KillSwitch::disable` itself
/// when `require_confirm` is set; callers cannot skip it.
use crate::config::KillSwitchConfig;
use crate::consent::{self, ConsentSource};
use crate::runner::{render, CommandRunner};
use serde::Serialize;
use std::sync::Arc;

/// How networking gets disabled on this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// `nmcli networking off`: one global, reversible switch.
    NetworkManager,
    /// `ip link set <iface> down` on exactly one selected interface.
    Interface,
    /// macOS: turn off every enabled network service.
    ServiceList,
    /// Windows: admin-disable every connected interface.
    InterfaceAdmin,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::NetworkManager => write!(f, "network-manager"),
            Backend::Interface => write!(f, "interface"),
            Backend::ServiceList => write!(f, "service-list"),
            Backend::InterfaceAdmin => write!(f, "interface-admin"),
        }
    }
}

impl Backend {
    /// Pick the backend for the running OS. None on unsupported platforms.
    pub fn detect() -> Option<Backend> {
        if cfg!(target_os = "linux") {
            if which::which("nmcli").is_ok() {
                Some(Backend::NetworkManager)
            } else {
                tracing::warn!("nmcli not found, will bring interfaces down with ip");
                Some(Backend::Interface)
            }
        } else if cfg!(target_os = "macos") {
            Some(Backend::ServiceList)
        } else if cfg!(target_os = "windows") {
            Some(Backend::InterfaceAdmin)
        } else {
            None
        }
    }

    /// Whether every discovered target is disabled, rather than one selected.
    pub fn disables_all(&self) -> bool {
        matches!(self, Backend::ServiceList | Backend::InterfaceAdmin)
    }

    /// Command that enumerates active targets, if the backend needs one.
    fn list_argv(&self) -> Option<(&'static str, &'static [&'static str])> {
        match self {
            Backend::NetworkManager => None,
            Backend::Interface => Some(("ip", &["-o", "link", "show", "up"])),
            Backend::ServiceList => Some(("networksetup", &["-listallnetworkservices"])),
            Backend::InterfaceAdmin => Some(("netsh", &["interface", "show", "interface"])),
        }
    }

    /// Command that disables one target.
    fn disable_argv<'a>(&self, target: &'a str) -> (&'static str, Vec<&'a str>) {
        match self {
            Backend::NetworkManager => ("nmcli", vec!["networking", "off"]),
            Backend::Interface => ("ip", vec!["link", "set", target, "down"]),
            Backend::ServiceList => (
                "networksetup",
                vec!["-setnetworkserviceenabled", target, "off"],
            ),
            Backend::InterfaceAdmin => (
                "netsh",
                vec!["interface", "set", "interface", target, "admin=disable"],
            ),
        }
    }

    /// Human-readable command line for disabling `target`.
    pub fn describe(&self, target: &str) -> String {
        let (program, args) = self.disable_argv(target);
        render(program, &args)
    }

    /// External programs the backend runs to enumerate and disable.
    pub fn required_tools(&self) -> &'static [&'static str] {
        match self {
            Backend::NetworkManager => &["nmcli"],
            Backend::Interface => &["ip"],
            Backend::ServiceList => &["networksetup"],
            Backend::InterfaceAdmin => &["netsh"],
        }
    }

    /// What a disable would run, for `--dry-run`. Targets are only known at
    /// disable time, so placeholders stand in for them.
    pub fn planned_commands(&self, whitelist: &[String]) -> Vec<String> {
        match self {
            Backend::NetworkManager => vec![self.describe("")],
            Backend::Interface => {
                let policy = if whitelist.is_empty() {
                    "  <iface>: first active interface".to_string()
                } else {
                    format!(
                        "  <iface>: first active interface in whitelist [{}]",
                        whitelist.join(", ")
                    )
                };
                vec![self.describe("<iface>"), policy]
            }
            Backend::ServiceList => vec![
                self.describe("<service>"),
                "  for every enabled network service".to_string(),
            ],
            Backend::InterfaceAdmin => vec![
                self.describe("<name>"),
                "  for every connected interface".to_string(),
            ],
        }
    }

    /// Parse the enumeration command's stdout into target names, in the
    /// order the OS reported them.
    pub fn parse_targets(&self, stdout: &str) -> Vec<String> {
        match self {
            Backend::NetworkManager => vec!["networking".to_string()],
            Backend::Interface => parse_ip_link(stdout),
            Backend::ServiceList => parse_network_services(stdout),
            Backend::InterfaceAdmin => parse_netsh_interfaces(stdout),
        }
    }

    /// Manual re-enable guidance. Networking is never turned back on
    /// automatically.
    pub fn reenable_instructions(&self) -> Vec<String> {
        let mut lines = match self {
            Backend::NetworkManager => vec![
                " - NetworkManager:  sudo nmcli networking on".to_string(),
                " - Generic Linux:   sudo ip link set <iface> up".to_string(),
            ],
            Backend::Interface => vec![
                " - Generic Linux:   sudo ip link set <iface> up".to_string(),
                " - Debian ifup:     sudo ifup <iface>".to_string(),
            ],
            Backend::ServiceList => vec![
                " - macOS:           sudo networksetup -setnetworkserviceenabled \"Wi-Fi\" on"
                    .to_string(),
                " - Or:              sudo ifconfig en0 up".to_string(),
                " - List services:   networksetup -listallnetworkservices".to_string(),
            ],
            Backend::InterfaceAdmin => vec![
                " - Windows:         netsh interface set interface \"<name>\" admin=enable"
                    .to_string(),
                " - List interfaces: netsh interface show interface".to_string(),
            ],
        };
        lines.push("Then restart your browser.".to_string());
        lines
    }
}

/// `ip -o link show up`: "2: eth0: <BROADCAST,...> mtu 1500 ...".
fn parse_ip_link(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.split(':').nth(1))
        .map(|name| name.trim())
        // veth pairs are listed as "veth0@if5"; the kernel name is before '@'
        .map(|name| name.split('@').next().unwrap_or(name))
        .filter(|name| !name.is_empty() && *name != "lo")
        .map(str::to_string)
        .collect()
}

/// `networksetup -listallnetworkservices`: a header line, then one service
/// per line; disabled services are prefixed with '*'.
fn parse_network_services(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('*'))
        .map(str::to_string)
        .collect()
}

/// `netsh interface show interface`: a column header, a dashed rule, then
/// "Admin State  State  Type  Interface Name" rows.
fn parse_netsh_interfaces(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("---"))
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 4 && parts[1].eq_ignore_ascii_case("connected") {
                Some(parts[3..].join(" "))
            } else {
                None
            }
        })
        .filter(|name| !name.to_lowercase().contains("loopback"))
        .collect()
}

/// Interface selection policy for single-target backends.
///
/// With a whitelist, the first enumerated interface that is also
/// whitelisted; without one, the first enumerated interface.
pub fn select_target(active: &[String], whitelist: &[String]) -> Result<String, DisableError> {
    let chosen = if whitelist.is_empty() {
        active.first()
    } else {
        active.iter().find(|name| whitelist.contains(*name))
    };

    match chosen {
        Some(name) => {
            tracing::info!(interface = %name, available = ?active, "selected interface");
            Ok(name.clone())
        }
        None => {
            tracing::warn!(whitelist = ?whitelist, available = ?active, "no eligible interface");
            Err(DisableError::NoTarget {
                whitelist: whitelist.to_vec(),
                available: active.to_vec(),
            })
        }
    }
}

/// Whether this process may change networking state.
#[cfg(unix)]
pub fn has_privilege() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Whether this process may change networking state.
///
/// Elevation cannot be queried cheaply here; a non-elevated attempt fails
/// at the command and is reported like any other command failure.
#[cfg(not(unix))]
pub fn has_privilege() -> bool {
    true
}

/// Successful disable: which backend acted on which targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disabled {
    pub backend: Backend,
    pub targets: Vec<String>,
}

impl std::fmt::Display for Disabled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} disabled {}", self.backend, self.targets.join(", "))
    }
}

/// Why networking was not disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisableError {
    /// The operator did not type the affirmative token.
    Denied,
    /// Nothing eligible to disable.
    NoTarget {
        whitelist: Vec<String>,
        available: Vec<String>,
    },
    /// An enumeration or disable command failed or could not run.
    CommandFailed { command: String, reason: String },
}

impl std::fmt::Display for DisableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisableError::Denied => write!(f, "network disable declined by operator"),
            DisableError::NoTarget {
                whitelist,
                available,
            } if whitelist.is_empty() => {
                write!(
                    f,
                    "no suitable network target found (available: {available:?})"
                )
            }
            DisableError::NoTarget {
                whitelist,
                available,
            } => write!(
                f,
                "no whitelisted interface is active (whitelist: {whitelist:?}, available: {available:?})"
            ),
            DisableError::CommandFailed { command, reason } => {
                write!(f, "`{command}` failed: {reason}")
            }
        }
    }
}

impl std::error::Error for DisableError {}

pub struct KillSwitch<R> {
    backend: Backend,
    runner: R,
    consent: Arc<dyn ConsentSource>,
}

impl<R: CommandRunner> KillSwitch<R> {
    pub fn new(backend: Backend, runner: R, consent: Arc<dyn ConsentSource>) -> Self {
        Self {
            backend,
            runner,
            consent,
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Work out which targets a disable would act on, without touching them.
    pub async fn plan(&self, config: &KillSwitchConfig) -> Result<Vec<String>, DisableError> {
        let Some((program, args)) = self.backend.list_argv() else {
            return Ok(self.backend.parse_targets(""));
        };

        let command = render(program, args);
        let output = self
            .runner
            .run(program, args)
            .await
            .map_err(|e| DisableError::CommandFailed {
                command: command.clone(),
                reason: e.to_string(),
            })?;
        if !output.success() {
            return Err(DisableError::CommandFailed {
                command,
                reason: format!("exit code {:?}", output.exit_code),
            });
        }

        let active = self.backend.parse_targets(&output.stdout);
        tracing::debug!(backend = %self.backend, targets = ?active, "enumerated targets");

        if self.backend.disables_all() {
            if active.is_empty() {
                return Err(DisableError::NoTarget {
                    whitelist: Vec::new(),
                    available: active,
                });
            }
            Ok(active)
        } else {
            select_target(&active, &config.interface_whitelist).map(|target| vec![target])
        }
    }

    /// Disable networking. Irreversible from this tool's point of view.
    pub async fn disable(&self, config: &KillSwitchConfig) -> Result<Disabled, DisableError> {
        tracing::info!(backend = %self.backend, "network disable requested");

        let targets = self.plan(config).await?;
        let commands: Vec<String> = targets.iter().map(|t| self.backend.describe(t)).collect();

        println!();
        for command in &commands {
            println!("About to run: {command}");
        }

        if config.require_confirm {
            let answer = consent::ask(&self.consent, "Type YES to proceed: ").await;
            if !consent::is_affirmative(&answer) {
                println!("Aborted.");
                tracing::info!("operator declined network disable at the kill-switch");
                return Err(DisableError::Denied);
            }
        }

        // Keep going after a failure: a half-disabled machine is worse than
        // one where every target was at least attempted.
        let mut failures = Vec::new();
        for target in &targets {
            if let Err(e) = self.disable_target(target).await {
                failures.push(e);
            }
        }

        match failures.into_iter().next() {
            None => Ok(Disabled {
                backend: self.backend,
                targets,
            }),
            Some(first) => Err(first),
        }
    }

    async fn disable_target(&self, target: &str) -> Result<(), DisableError> {
        let (program, args) = self.backend.disable_argv(target);
        let command = render(program, &args);

        match self.runner.run(program, &args).await {
            Ok(output) if output.success() => {
                tracing::info!(command = %command, exit_code = ?output.exit_code, "disable command succeeded");
                Ok(())
            }
            Ok(output) => {
                tracing::error!(command = %command, exit_code = ?output.exit_code, "disable command failed");
                Err(DisableError::CommandFailed {
                    command,
                    reason: format!("exit code {:?}", output.exit_code),
                })
            }
            Err(e) => {
                tracing::error!(command = %command, error = %e, "disable command could not run");
                Err(DisableError::CommandFailed {
                    command,
                    reason: e.to_string(),
                })
            }
        }
    }
}
