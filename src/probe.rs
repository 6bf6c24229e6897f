/// Proxy liveness: the proxy is considered alive if a TCP connect to one of
/// its SOCKS endpoints succeeds OR its process is in the process table.
///
/// Both signals swallow their own failures. A refused connection or a
/// missing `pgrep` only means "this signal says no".
use crate::config::ProbeConfig;
use crate::runner::CommandRunner;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;

/// Per-endpoint connect timeout.
pub const SOCKET_TIMEOUT: Duration = Duration::from_secs(1);

/// Which signal reported the proxy alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Socket,
    Process,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Socket => write!(f, "socket"),
            Signal::Process => write!(f, "process"),
        }
    }
}

/// Outcome of one liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive(Signal),
    Down,
}

/// Answers "is the proxy reachable right now?". Must not have side effects.
pub trait Probe: Send + Sync + 'static {
    fn probe(&self) -> impl Future<Output = Liveness> + Send;
}

/// One independent liveness signal.
pub trait SignalCheck: Send + Sync + 'static {
    fn check(&self) -> impl Future<Output = bool> + Send;
}

/// Connects to every `host × port` combination until one accepts.
#[derive(Debug, Clone)]
pub struct SocketProbe {
    endpoints: Vec<(String, u16)>,
    timeout: Duration,
}

impl SocketProbe {
    pub fn new(hosts: &[String], ports: &[u16]) -> Self {
        let endpoints = hosts
            .iter()
            .flat_map(|host| ports.iter().map(move |port| (host.clone(), *port)))
            .collect();
        Self {
            endpoints,
            timeout: SOCKET_TIMEOUT,
        }
    }

    #[cfg(test)]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl SignalCheck for SocketProbe {
    async fn check(&self) -> bool {
        for (host, port) in &self.endpoints {
            // (&str, u16) resolves IPv6 literals like "::1" to the IPv6 family
            match tokio::time::timeout(self.timeout, TcpStream::connect((host.as_str(), *port)))
                .await
            {
                Ok(Ok(_stream)) => {
                    tracing::debug!(host = %host, port, "SOCKS connection successful");
                    return true;
                }
                Ok(Err(e)) => {
                    tracing::debug!(host = %host, port, error = %e, "SOCKS connection failed");
                }
                Err(_) => {
                    tracing::debug!(host = %host, port, "SOCKS connection timed out");
                }
            }
        }
        false
    }
}

/// Looks the proxy process up by exact name.
pub struct ProcessProbe<R> {
    runner: R,
    name: String,
}

impl<R: CommandRunner> ProcessProbe<R> {
    pub fn new(runner: R, name: impl Into<String>) -> Self {
        Self {
            runner,
            name: name.into(),
        }
    }
}

#[cfg(not(windows))]
impl<R: CommandRunner> SignalCheck for ProcessProbe<R> {
    async fn check(&self) -> bool {
        // -x: exact name match, so "torbrowser" does not count as "tor"
        match self.runner.run("pgrep", &["-x", self.name.as_str()]).await {
            Ok(out) => {
                let found = out.success() && !out.stdout.trim().is_empty();
                tracing::debug!(process = %self.name, found, "process check");
                found
            }
            Err(e) => {
                tracing::warn!(process = %self.name, error = %e, "process check unavailable");
                false
            }
        }
    }
}

#[cfg(windows)]
impl<R: CommandRunner> SignalCheck for ProcessProbe<R> {
    async fn check(&self) -> bool {
        let image = format!("{}.exe", self.name);
        let filter = format!("IMAGENAME eq {image}");
        match self.runner.run("tasklist", &["/FI", filter.as_str()]).await {
            Ok(out) => {
                let found = out.stdout.to_lowercase().contains(&image.to_lowercase());
                tracing::debug!(process = %self.name, found, "process check");
                found
            }
            Err(e) => {
                tracing::warn!(process = %self.name, error = %e, "process check unavailable");
                false
            }
        }
    }
}

/// Socket probe OR process probe. The process table is only consulted when
/// no socket accepted.
pub struct LivenessProbe<S, P> {
    socket: S,
    process: P,
}

impl<S: SignalCheck, P: SignalCheck> LivenessProbe<S, P> {
    pub fn new(socket: S, process: P) -> Self {
        Self { socket, process }
    }
}

impl<R: CommandRunner> LivenessProbe<SocketProbe, ProcessProbe<R>> {
    pub fn from_config(config: &ProbeConfig, runner: R) -> Self {
        Self::new(
            SocketProbe::new(&config.check_hosts, &config.socks_ports),
            ProcessProbe::new(runner, config.process_name.clone()),
        )
    }
}

impl<S: SignalCheck, P: SignalCheck> Probe for LivenessProbe<S, P> {
    async fn probe(&self) -> Liveness {
        if self.socket.check().await {
            return Liveness::Alive(Signal::Socket);
        }
        if self.process.check().await {
            return Liveness::Alive(Signal::Process);
        }
        Liveness::Down
    }
}
