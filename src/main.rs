use std::env;

use anyhow::{bail, Context, Result};
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use nsbridge::logging::{log_file_path, open_log_file};
use nsbridge::server::{serve_stdio, serve_tcp};
use nsbridge_config::{load_config, Config};
use nsbridge_platform::{DefaultPaths, PlatformPaths};

/// How the client reaches the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// DAP on stdin/stdout, as launched by an editor.
    Stdio,
    /// DAP over TCP, logging to stderr as well.
    Server(u16),
}

fn parse_args<I>(args: I) -> Result<Mode>
where
    I: IntoIterator<Item = String>,
{
    let mut mode = Mode::Stdio;
    for arg in args {
        match arg.strip_prefix("--server=") {
            Some(port) => {
                let port = port
                    .parse()
                    .with_context(|| format!("invalid server port: {port}"))?;
                mode = Mode::Server(port);
            }
            None => bail!("unknown argument: {arg}"),
        }
    }
    Ok(mode)
}

fn init_logging(paths: &DefaultPaths, config: &Config, mode: Mode) -> Result<()> {
    // stdout is the protocol channel, so logs go to a file.
    let log_path = log_file_path(&paths.log_dir(), config.log.file.as_deref());
    let log_file = open_log_file(&log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log.level.as_filter()));
    let file_layer = fmt::layer()
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false);
    let stderr_layer =
        matches!(mode, Mode::Server(_)).then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}

fn run() -> Result<()> {
    let mode = parse_args(env::args().skip(1))?;
    let paths = DefaultPaths::new().context("failed to detect platform paths")?;

    let project_dir = env::current_dir().ok();
    let loaded = load_config(&paths.config_dir(), project_dir.as_deref());
    let config = loaded.as_ref().cloned().unwrap_or_default();

    init_logging(&paths, &config, mode)?;
    if let Err(e) = &loaded {
        error!("config load failed, using defaults: {}", e);
    }
    info!(version = env!("CARGO_PKG_VERSION"), ?mode, "nsbridge starting");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(async {
        match mode {
            Mode::Stdio => serve_stdio(&config).await,
            Mode::Server(port) => serve_tcp(port, &config).await,
        }
    })
}

fn main() {
    if let Err(e) = run() {
        eprintln!("nsbridge: {:#}", e);
        std::process::exit(1);
    }
}
