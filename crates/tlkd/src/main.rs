//! tlkd: host file daemon for the ote secure storage service
//!
//! Usage:
//!   tlkd --storagedir /data [--config /etc/ote/ote.toml] [--socket PATH] [--foreground]
//!
//! Blobs are kept under `<storagedir>/tlk`. Without `--foreground` the
//! daemon detaches before starting its runtime.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ote_core::config::OteConfig;
use ote_host::SocketSource;
use prometheus_client::registry::Registry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tlkd::daemonize::{daemonize, resolve_from, Forked};
use tlkd::metrics::MetricsEndpoint;
use tlkd::{Daemon, DaemonMetrics, HostFileStore};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "tlkd", version, about = "ote host file daemon")]
struct Cli {
    /// Directory that holds the storage root (`<storagedir>/tlk`)
    #[arg(long)]
    storagedir: Option<PathBuf>,

    /// Path to ote.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "TLKD_CONFIG",
        default_value = "/etc/ote/ote.toml"
    )]
    config: PathBuf,

    /// Socket to serve file requests on (overrides daemon.socket)
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Stay attached to the terminal
    #[arg(long, short = 'f')]
    foreground: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TLKD_LOG")]
    log: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    // No subscriber exists yet; a missing file is reported once logging is up.
    let loaded = OteConfig::read(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    let config_missing = loaded.is_none();
    let mut config = loaded.unwrap_or_default();

    // Resolve before daemonize() moves the process to `/`.
    let cwd = std::env::current_dir().context("reading working directory")?;
    let storage_dir = cli
        .storagedir
        .clone()
        .or_else(|| config.daemon.storage_dir.clone())
        .map(|dir| resolve_from(&cwd, &dir))
        .context("no storage directory: pass --storagedir or set daemon.storage_dir")?;
    let socket = resolve_from(
        &cwd,
        cli.socket.as_deref().unwrap_or(&config.daemon.socket),
    );
    config.daemon.log_file = config
        .daemon
        .log_file
        .take()
        .map(|file| resolve_from(&cwd, &file));

    if !cli.foreground {
        // Safe: no runtime or other thread has been started yet.
        match unsafe { daemonize() }.context("detaching from terminal")? {
            Forked::Parent { .. } => return Ok(()),
            Forked::Child => {}
        }
    }

    let level = cli
        .log
        .clone()
        .unwrap_or_else(|| config.daemon.log_level.clone());
    let format = cli.log_format.clone().unwrap_or_else(|| {
        if config.daemon.log_format.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    });
    init_logging(&level, &format, config.daemon.log_file.as_deref())?;
    if config_missing {
        warn!(config = %cli.config.display(), "config file not found (using defaults)");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        storage_dir = %storage_dir.display(),
        socket = %socket.display(),
        "tlkd starting"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    runtime.block_on(run(config, storage_dir, socket))
}

async fn run(config: OteConfig, storage_dir: PathBuf, socket: PathBuf) -> Result<()> {
    let store = HostFileStore::new(&storage_dir);
    store
        .ensure_root()
        .with_context(|| format!("creating storage root {}", store.root().display()))?;

    let source = SocketSource::bind(&socket)
        .with_context(|| format!("binding socket {}", socket.display()))?
        .with_max_object_len(config.service.max_object_len);

    let mut daemon =
        Daemon::new(source, store).with_retry_budget(config.daemon.new_request_retries);

    if let Some(addr) = config.daemon.metrics_addr.clone() {
        let mut registry = Registry::default();
        let metrics = DaemonMetrics::new(&mut registry);
        daemon = daemon.with_metrics(metrics);
        let endpoint = MetricsEndpoint::new(registry);
        tokio::spawn(async move {
            if let Err(e) = endpoint.serve(&addr).await {
                tracing::error!("metrics server failed: {e}");
            }
        });
    }

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("installing SIGTERM handler")?;

    tokio::select! {
        result = daemon.run() => result.map_err(Into::into),
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
            Ok(())
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received, shutting down");
            Ok(())
        }
    }
}

fn init_logging(level: &str, format: &LogFormat, log_file: Option<&Path>) -> Result<()> {
    use tracing_subscriber::{
        fmt::{self, writer::BoxMakeWriter},
        layer::SubscriberExt,
        util::SubscriberInitExt,
        EnvFilter,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (writer, ansi) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            (BoxMakeWriter::new(Arc::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(writer))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_ansi(ansi).with_writer(writer))
                .init();
        }
    }
    Ok(())
}
