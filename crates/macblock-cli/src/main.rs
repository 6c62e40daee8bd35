//! macblock - local DNS sinkhole for macOS.

use clap::Parser;
use macblock_types::paths;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;
mod commands;
mod privilege;

use app::{Cli, Commands, DaemonCommands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // The daemon tees its logs into the log directory; one-shot commands
    // log to stderr only.
    let to_file = matches!(cli.command, Commands::Daemon { .. });
    let _guard = init_logging(cli.verbose, cli.quiet, to_file);

    if let Err(e) = run_command(cli.command).await {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

/// Initialize the logging/tracing system. The returned guard must stay
/// alive so buffered daemon log lines get flushed.
fn init_logging(
    verbose: u8,
    quiet: bool,
    to_file: bool,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    // The daemon defaults to info so reconcile decisions land in the log.
    let filter = if to_file && verbose == 0 && !quiet {
        "info"
    } else {
        filter
    };
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let registry = tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer().with_target(false));

    if to_file && std::path::Path::new(paths::LOG_DIR).is_dir() {
        let appender = tracing_appender::rolling::never(paths::LOG_DIR, "daemon.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(writer),
            )
            .init();
        Some(guard)
    } else {
        registry.init();
        None
    }
}

/// Run a specific command.
async fn run_command(command: Commands) -> macblock_types::Result<()> {
    match command {
        Commands::Install { force, skip_update } => {
            commands::install::run_install(force, skip_update).await
        }
        Commands::Uninstall { force } => commands::install::run_uninstall(force).await,
        Commands::Enable => commands::control::enable().await,
        Commands::Disable => commands::control::disable().await,
        Commands::Pause { duration } => commands::control::pause(&duration).await,
        Commands::Resume => commands::control::resume().await,
        Commands::Update {
            source,
            min_domains,
        } => commands::update::run(source, min_domains).await,
        Commands::Sources { command } => commands::sources::run(command).await,
        Commands::Allow { command } => {
            commands::lists::run(commands::lists::Which::Allow, command).await
        }
        Commands::Deny { command } => {
            commands::lists::run(commands::lists::Which::Deny, command).await
        }
        Commands::Upstreams { command } => commands::upstreams::run(command).await,
        Commands::Status => commands::status::run().await,
        Commands::Doctor => commands::doctor::run().await,
        Commands::Logs {
            lines,
            follow,
            stream,
        } => commands::logs::run(lines, follow, stream).await,
        Commands::Test { domain } => commands::test::run(&domain).await,
        Commands::Daemon { command } => match command {
            DaemonCommands::Run => macblock_daemon::run().await,
        },
    }
}
