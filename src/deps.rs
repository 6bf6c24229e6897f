/// Startup check for the external programs torguard shells out to.
///
/// A missing disable tool would otherwise only show up after a confirmed
/// outage and a YES, and a missing process tool silently turns the process
/// signal off. Startup refuses to arm without them.
use crate::killswitch::Backend;

/// Program behind the process liveness signal.
pub const PROCESS_TOOL: &str = if cfg!(windows) { "tasklist" } else { "pgrep" };

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tool {
    pub name: &'static str,
    pub found: bool,
}

impl Tool {
    /// Package to install when the tool is missing.
    pub fn install_hint(&self) -> &'static str {
        match self.name {
            "ip" => "iproute2",
            "pgrep" => "procps",
            "nmcli" => "network-manager",
            _ => "a standard system install",
        }
    }
}

#[derive(Debug)]
pub enum ToolError {
    Missing { tools: Vec<Tool> },
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolError::Missing { tools } => {
                write!(f, "missing required tools:")?;
                for (i, tool) in tools.iter().enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    write!(f, "{sep}{} (install {})", tool.name, tool.install_hint())?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ToolError {}

/// Which of the backend's tools and the process tool are on `PATH`.
#[derive(Debug)]
pub struct ToolReport {
    pub tools: Vec<Tool>,
}

impl ToolReport {
    pub fn check(backend: Backend) -> Self {
        Self::check_with(backend, |name| which::which(name).is_ok())
    }

    pub fn check_with(backend: Backend, lookup: impl Fn(&str) -> bool) -> Self {
        let tools = backend
            .required_tools()
            .iter()
            .copied()
            .chain(std::iter::once(PROCESS_TOOL))
            .map(|name| {
                let found = lookup(name);
                tracing::debug!(tool = name, found, "dependency check");
                Tool { name, found }
            })
            .collect();
        Self { tools }
    }

    pub fn verify(&self) -> Result<(), ToolError> {
        let missing: Vec<Tool> = self.tools.iter().filter(|t| !t.found).cloned().collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ToolError::Missing { tools: missing })
        }
    }

    /// One line per tool, for `--dry-run`.
    pub fn lines(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|tool| {
                if tool.found {
                    format!("  {}: found", tool.name)
                } else {
                    format!("  {}: MISSING (install {})", tool.name, tool.install_hint())
                }
            })
            .collect()
    }
}
