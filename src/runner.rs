/// External command execution: spawn a program, capture stdout, and give up
/// after a bounded timeout.
///
/// Every process-table query, interface enumeration, and network-disable
/// command goes through a `CommandRunner`, so the probe and the kill-switch
/// can be driven by scripted runners in tests.
use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Upper bound on how long any external command may run.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exit code (None if killed by signal).
    pub exit_code: Option<i32>,
    /// Captured stdout, lossily decoded.
    pub stdout: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Errors that prevent a command from producing an exit code.
#[derive(Debug)]
pub enum CommandError {
    /// The program could not be started (usually: not installed).
    Spawn {
        program: String,
        source: std::io::Error,
    },
    /// Failed while waiting on the child.
    Io {
        program: String,
        source: std::io::Error,
    },
    /// The child outlived the timeout and was killed.
    Timeout { program: String, timeout: Duration },
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Spawn { program, source } => {
                write!(f, "failed to spawn {program}: {source}")
            }
            CommandError::Io { program, source } => {
                write!(f, "I/O error while running {program}: {source}")
            }
            CommandError::Timeout { program, timeout } => {
                write!(f, "{program} timed out after {}s", timeout.as_secs())
            }
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::Spawn { source, .. } => Some(source),
            CommandError::Io { source, .. } => Some(source),
            CommandError::Timeout { .. } => None,
        }
    }
}

/// Runs external programs on behalf of the probe and the kill-switch.
pub trait CommandRunner: Send + Sync + 'static {
    fn run(
        &self,
        program: &str,
        args: &[&str],
    ) -> impl Future<Output = Result<CommandOutput, CommandError>> + Send;
}

impl<T: CommandRunner> CommandRunner for Arc<T> {
    fn run(
        &self,
        program: &str,
        args: &[&str],
    ) -> impl Future<Output = Result<CommandOutput, CommandError>> + Send {
        (**self).run(program, args)
    }
}

/// Render a command line for logs and operator prompts.
pub fn render(program: &str, args: &[&str]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            line.push('"');
            line.push_str(arg);
            line.push('"');
        } else {
            line.push_str(arg);
        }
    }
    line
}

/// Runs commands as real child processes via `tokio::process`.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(COMMAND_TIMEOUT)
    }
}

impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        tracing::debug!(command = %render(program, args), "running external command");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true) // Timed-out children are reaped when the future is dropped
            .spawn()
            .map_err(|e| CommandError::Spawn {
                program: program.to_string(),
                source: e,
            })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(CommandOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            }),
            Ok(Err(e)) => Err(CommandError::Io {
                program: program.to_string(),
                source: e,
            }),
            Err(_) => Err(CommandError::Timeout {
                program: program.to_string(),
                timeout: self.timeout,
            }),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_plain_args() {
        assert_eq!(
            render("ip", &["link", "set", "eth0", "down"]),
            "ip link set eth0 down"
        );
    }

    #[test]
    fn test_render_quotes_args_with_spaces() {
        assert_eq!(
            render("networksetup", &["-setnetworkserviceenabled", "Wi-Fi 2", "off"]),
            "networksetup -setnetworkserviceenabled \"Wi-Fi 2\" off"
        );
    }

    #[test]
    fn test_command_output_success() {
        let ok = CommandOutput {
            exit_code: Some(0),
            stdout: String::new(),
        };
        let failed = CommandOutput {
            exit_code: Some(1),
            stdout: String::new(),
        };
        let killed = CommandOutput {
            exit_code: None,
            stdout: String::new(),
        };
        assert!(ok.success());
        assert!(!failed.success());
        assert!(!killed.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_captures_stdout() {
        let output = SystemRunner::default()
            .run("echo", &["hello", "world"])
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello world");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_nonzero_exit() {
        let output = SystemRunner::default()
            .run("sh", &["-c", "exit 3"])
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_system_runner_missing_program() {
        let err = SystemRunner::default()
            .run("nonexistent-binary-xyz", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
        assert!(err.to_string().contains("failed to spawn"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_times_out() {
        let runner = SystemRunner::new(Duration::from_millis(100));
        let start = std::time::Instant::now();
        let err = runner.run("sleep", &["5"]).await.unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_scripted_runner_records_calls() {
        let runner = testing::ScriptedRunner::new().respond("pgrep -x tor", 0, "4242\n");
        let out = runner.run("pgrep", &["-x", "tor"]).await.unwrap();
        assert_eq!(out.stdout, "4242\n");
        assert!(runner.run("nmcli", &["networking", "off"]).await.is_err());
        assert_eq!(
            runner.calls(),
            vec!["pgrep -x tor".to_string(), "nmcli networking off".to_string()]
        );
    }
}
