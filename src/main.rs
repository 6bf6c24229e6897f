mod app;
mod config;
mod consent;
mod deps;
mod killswitch;
mod locations;
mod lock;
mod menu;
mod monitor;
mod probe;
mod retry;
mod runner;
mod signals;
mod status;
mod torinfo;
mod warning;

use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// How long the runtime waits for blocking work (open dialogs, prompts)
/// when the process exits.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Watches the local Tor SOCKS proxy and, after a confirmed outage and an
/// explicit YES, disables networking so nothing leaks around it.
#[derive(Parser, Debug)]
#[command(name = "torguard", version, about)]
pub struct Cli {
    /// Config file path (default: /etc/torguard.toml, then the user config)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start monitoring immediately without the interactive menu
    #[arg(long)]
    no_menu: bool,

    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long)]
    debug: bool,

    /// Print the resolved config file path and exit
    #[arg(long)]
    config_path: bool,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Print the running instance's status file and exit
    #[arg(long)]
    status: bool,

    /// Show the outage warning once and exit
    #[arg(long)]
    test_warning: bool,

    /// Report Tor Browser, control port and torsocks detection, then exit
    #[arg(long)]
    tor_info: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let locations = locations::Locations::discover();
    let config_path = match locations.resolve_config(cli.config.as_deref()) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.config_path {
        println!("{}", config_path.display());
        return ExitCode::SUCCESS;
    }

    let config = match config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(cli.debug, config.logging.file.as_deref());
    tracing::debug!(?cli, config = %config_path.display(), "parsed CLI arguments");
    config.warn_soft_issues();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let code = runtime.block_on(run(cli, locations, config_path, config));
    // A warning dialog may still be open; don't wait on it forever
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    code
}

async fn run(
    cli: Cli,
    locations: locations::Locations,
    config_path: PathBuf,
    config: config::GuardConfig,
) -> ExitCode {
    let config = Arc::new(config);

    if cli.status {
        return print_status(&config);
    }

    if cli.tor_info {
        let info = torinfo::gather(&runner::SystemRunner::default()).await;
        print!("{}", info.render());
        return ExitCode::SUCCESS;
    }

    let Some(backend) = killswitch::Backend::detect() else {
        eprintln!("error: unsupported platform, no way to disable networking");
        tracing::error!(os = std::env::consts::OS, "no kill-switch backend");
        return ExitCode::FAILURE;
    };

    if cli.dry_run {
        return print_dry_run(&config, &config_path, &locations, backend);
    }

    let (console, mut lines) = consent::Console::spawn();
    let operator: Arc<dyn consent::ConsentSource> =
        Arc::new(consent::TerminalConsent::new(Arc::clone(&console)));
    let guard = app::Guard::new(Arc::clone(&config), backend, operator);

    if cli.test_warning {
        let presenter = guard.presenter();
        let warning = config.warning.clone();
        let shown = tokio::task::spawn_blocking(move || presenter.present(&warning)).await;
        console.close();
        return match shown {
            Ok(Ok(())) => ExitCode::SUCCESS,
            Ok(Err(e)) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
            Err(e) => {
                eprintln!("error: warning presenter failed: {e}");
                ExitCode::FAILURE
            }
        };
    }

    if let Err(e) = deps::ToolReport::check(backend).verify() {
        eprintln!("error: {e}");
        tracing::error!(error = %e, "refusing to start without required tools");
        console.close();
        return ExitCode::FAILURE;
    }

    let instance_lock = match lock::InstanceLock::acquire(&locations.lock()) {
        Ok(lock) => lock,
        Err(e) => {
            eprintln!("error: {e}");
            tracing::error!(error = %e, "refusing to start a second instance");
            console.close();
            return ExitCode::FAILURE;
        }
    };

    tracing::debug!(lock = %instance_lock.path().display(), "holding instance lock");
    tracing::info!(
        config = %config_path.display(),
        backend = %backend,
        "torguard v{} starting",
        env!("CARGO_PKG_VERSION")
    );
    if !killswitch::has_privilege() {
        println!("Note: not running as root. Monitoring works, but disabling the network will be refused.");
        println!("Re-run with sudo to arm the kill-switch.");
    }

    let disabled = if cli.no_menu || !config.menu.enabled {
        run_headless(&guard, &console).await
    } else {
        let menu = menu::Menu::new(
            || guard.monitor().start(),
            guard.presenter(),
            config.warning.clone(),
            config.logging.file.clone(),
            config_path.clone(),
        );
        menu.run(&mut lines).await
    };
    console.close();

    if let Some(disabled) = disabled {
        tracing::warn!(disabled = %disabled, "exiting after network disable");
        println!("\nNetwork disabled: {}", disabled.targets.join(", "));
        println!("To re-enable manually:");
        for line in backend.reenable_instructions() {
            println!("{line}");
        }
    }
    tracing::info!("torguard exiting");
    ExitCode::SUCCESS
}

/// Monitor until Ctrl-C/SIGTERM or until the network is disabled.
async fn run_headless(
    guard: &app::Guard,
    console: &consent::Console,
) -> Option<killswitch::Disabled> {
    let mut handle = guard.monitor().start();
    println!("Monitoring Tor proxy (Ctrl-C to stop)...");

    let outcome = tokio::select! {
        outcome = handle.join() => outcome,
        _ = signals::shutdown_signal() => {
            // Release a pending prompt so the worker can observe the stop
            console.close();
            handle.stop();
            match tokio::time::timeout(menu::STOP_TIMEOUT, handle.join()).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!("monitor did not stop within timeout");
                    monitor::RunOutcome::Stopped
                }
            }
        }
    };

    match outcome {
        monitor::RunOutcome::Terminated(disabled) => Some(disabled),
        monitor::RunOutcome::Stopped => None,
    }
}

fn print_status(config: &config::GuardConfig) -> ExitCode {
    let Some(path) = config.logging.status_file.clone() else {
        eprintln!("error: no status file configured (logging.status_file)");
        return ExitCode::FAILURE;
    };
    let file = status::StatusFile::new(path);
    match file.read() {
        Ok(value) => {
            match serde_json::to_string_pretty(&value) {
                Ok(text) => println!("{text}"),
                Err(_) => println!("{value}"),
            }
            ExitCode::SUCCESS
        }
        Err(status::StatusError::Read { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            println!("torguard is not running ({} absent)", file.path().display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn print_dry_run(
    config: &config::GuardConfig,
    config_path: &Path,
    locations: &locations::Locations,
    backend: killswitch::Backend,
) -> ExitCode {
    println!("Config file: {}", config_path.display());
    println!(
        "Search order: {}, then {}",
        locations.system_config().display(),
        locations.user_config().display()
    );
    match toml::to_string_pretty(config) {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("error: failed to render config: {e}");
            return ExitCode::FAILURE;
        }
    }
    println!("Kill-switch backend: {backend}");
    for (i, line) in backend
        .planned_commands(&config.killswitch.interface_whitelist)
        .iter()
        .enumerate()
    {
        if i == 0 {
            println!("  would run: {line}");
        } else {
            println!("  {line}");
        }
    }

    let tools = deps::ToolReport::check(backend);
    println!("Required tools:");
    for line in tools.lines() {
        println!("{line}");
    }
    if let Err(e) = tools.verify() {
        eprintln!("error: {e}");
        println!("Dry run: config valid, but torguard would refuse to start.");
        return ExitCode::FAILURE;
    }
    println!("Dry run: config valid, not monitoring.");
    ExitCode::SUCCESS
}

/// stderr always; the configured log file too when it can be opened.
fn init_tracing(debug: bool, log_file: Option<&Path>) {
    use std::sync::Mutex;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let file_layer = log_file.and_then(|path| {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
        {
            Ok(file) => Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            ),
            Err(e) => {
                eprintln!("warning: cannot open log file {}: {e}", path.display());
                None
            }
        }
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .try_init();
}
