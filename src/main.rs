//! clusterd - request router over a supervised pool of API workers

mod api;
mod cli;
mod error;
mod logging;
mod pool;
mod server;
mod worker;

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::{OwoColorize, Stream::Stderr};

use cli::{Cli, Commands, Verbosity};
use logging::LogConfig;

/// Parse arguments, set up logging, run the selected role, and print the
/// error chain in colour on failure before exiting with status 1.
fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = match &cli.command {
        Commands::Serve(args) => cmd_serve(&cli, args),
        Commands::Worker(args) => cmd_worker(args),
    };

    if let Err(e) = result {
        eprintln!(
            "{}: {}",
            "error"
                .if_supports_color(Stderr, |text| text.red())
                .if_supports_color(Stderr, |text| text.bold()),
            e
        );
        for cause in e.chain().skip(1) {
            eprintln!(
                "  {}: {}",
                "caused by".if_supports_color(Stderr, |text| text.yellow()),
                cause
            );
        }
        std::process::exit(1);
    }
}

/// Command-line flags win over environment variables.
fn init_logging(cli: &Cli) {
    let mut config = match cli.verbosity() {
        Verbosity::Quiet => LogConfig::new().with_filter("error".into()),
        Verbosity::Normal => LogConfig::new(),
        Verbosity::Debug => LogConfig::new().with_filter("info,clusterd=debug,tower_http=debug".into()),
        Verbosity::Trace => LogConfig::new()
            .with_filter("info,clusterd=trace,tower_http=trace".into())
            .with_span_events(true),
    }
    .with_env_overrides();

    if let Some(format) = cli.log_format {
        config = config.with_format(format);
    }
    if let Some(path) = &cli.log_file {
        config = config.with_file(path.clone());
    }

    logging::init(config);
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")
}

fn cmd_serve(cli: &Cli, args: &cli::ServeArgs) -> Result<()> {
    use crate::server::{ServerConfig, run_server};

    let config = ServerConfig {
        host: args.host.clone(),
        port: args.port,
        worker_base_port: args.worker_base_port(),
        workers: args.workers,
        call_timeout: args.call_timeout(),
        startup_timeout: args.startup_timeout(),
        username: args.credentials.username.clone(),
        password: args.credentials.password.clone(),
        worker_log_args: cli.worker_log_args(),
    };

    runtime()?
        .block_on(run_server(config))
        .context("Master failed")?;
    Ok(())
}

fn cmd_worker(args: &cli::WorkerArgs) -> Result<()> {
    use crate::api::Credentials;
    use crate::worker::{WorkerOptions, run_worker};

    let options = WorkerOptions {
        worker_id: args.worker_id,
        port: args.port,
        credentials: Credentials::new(
            args.credentials.username.clone(),
            args.credentials.password.clone(),
        ),
    };

    let rt = runtime()?;
    let result = rt.block_on(run_worker(options));
    // Stdin is read on a blocking thread that may still be parked in read().
    rt.shutdown_background();

    result.with_context(|| format!("Worker {} failed", args.worker_id))?;
    Ok(())
}
