//! ote: secure storage CLI
//!
//! Runs the storage service in-process against a running tlkd:
//!   write <name> [<file>]   - seal a file (or stdin) and store it
//!   read <name> [<file>]    - fetch, verify and decrypt an object
//!   size <name>             - show the stored data length
//!   delete <name>           - remove an object
//!   demo                    - write, read back and delete the demo object

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ote_core::config::OteConfig;
use ote_core::{CallerIdentity, OteError};
use ote_host::SocketHost;
use ote_service::{AccessFlags, FileDeviceId, StorageObject, StorageService};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const DEMO_NAME: &str = "TADemo.blob";
const DEMO_DATA: &[u8] = b"Hello, Hello, from secure storage demo app.";

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "ote", version, about = "ote secure storage client")]
struct Cli {
    /// Path to ote.toml configuration file
    #[arg(long, short = 'c', env = "OTE_CONFIG", default_value = "/etc/ote/ote.toml")]
    config: PathBuf,

    /// tlkd socket (overrides service.socket)
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Device id file (overrides service.device_id_file)
    #[arg(long)]
    device_id_file: Option<PathBuf>,

    /// Caller identity (UUID) the objects are bound to
    #[arg(long, env = "OTE_IDENTITY")]
    identity: CallerIdentity,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "OTE_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Seal and store a file (stdin when no file is given)
    Write {
        name: String,
        input: Option<PathBuf>,
    },
    /// Read an object back (stdout when no file is given)
    Read {
        name: String,
        output: Option<PathBuf>,
    },
    /// Print the stored data length of an object
    Size { name: String },
    /// Delete an object
    Delete { name: String },
    /// Write, read back and delete the demo object
    Demo,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);

    let config = OteConfig::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    let socket = cli.socket.clone().unwrap_or(config.service.socket.clone());
    let device_id_file = cli
        .device_id_file
        .clone()
        .unwrap_or(config.service.device_id_file.clone());
    debug!(socket = %socket.display(), device_id = %device_id_file.display(), "connecting");

    let host = SocketHost::new(&socket).with_max_object_len(config.service.max_object_len);
    let service = StorageService::create(&FileDeviceId::new(device_id_file), host)
        .map_err(describe)?
        .with_max_object_len(config.service.max_object_len);

    let result = match &cli.command {
        Commands::Write { name, input } => {
            cmd_write(&service, cli.identity, name, input.as_deref()).await
        }
        Commands::Read { name, output } => {
            cmd_read(&service, cli.identity, name, output.as_deref()).await
        }
        Commands::Size { name } => cmd_size(&service, cli.identity, name).await,
        Commands::Delete { name } => cmd_delete(&service, cli.identity, name).await,
        Commands::Demo => cmd_demo(&service, cli.identity).await,
    };
    service.destroy();
    result
}

// ── Commands ──────────────────────────────────────────────────────────────────

async fn cmd_write(
    service: &StorageService<SocketHost>,
    identity: CallerIdentity,
    name: &str,
    input: Option<&Path>,
) -> Result<()> {
    let data = match input {
        Some(path) => std::fs::read(path).with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("reading stdin")?;
            buf
        }
    };

    let session = service.open_session(Some(identity));
    let obj = StorageObject::open(service, &session, name, AccessFlags::WRITE).map_err(describe)?;
    obj.write(&data).await.map_err(describe)?;
    obj.close();
    service.close_session(session);

    eprintln!("{name}: {} bytes stored", data.len());
    Ok(())
}

async fn cmd_read(
    service: &StorageService<SocketHost>,
    identity: CallerIdentity,
    name: &str,
    output: Option<&Path>,
) -> Result<()> {
    let session = service.open_session(Some(identity));
    let obj = StorageObject::open(service, &session, name, AccessFlags::READ).map_err(describe)?;
    let mut buf = vec![0u8; service.max_object_len()];
    let n = obj.read(&mut buf).await.map_err(describe)?;
    obj.close();
    service.close_session(session);

    match output {
        Some(path) => std::fs::write(path, &buf[..n])
            .with_context(|| format!("writing {}", path.display()))?,
        None => std::io::stdout()
            .write_all(&buf[..n])
            .context("writing stdout")?,
    }
    Ok(())
}

async fn cmd_size(
    service: &StorageService<SocketHost>,
    identity: CallerIdentity,
    name: &str,
) -> Result<()> {
    let session = service.open_session(Some(identity));
    let obj = StorageObject::open(service, &session, name, AccessFlags::READ).map_err(describe)?;
    let size = obj.size().await.map_err(describe)?;
    obj.close();
    service.close_session(session);

    println!("{size}");
    Ok(())
}

async fn cmd_delete(
    service: &StorageService<SocketHost>,
    identity: CallerIdentity,
    name: &str,
) -> Result<()> {
    let session = service.open_session(Some(identity));
    let obj =
        StorageObject::open(service, &session, name, AccessFlags::WRITE_META).map_err(describe)?;
    obj.delete().await.map_err(describe)?;
    service.close_session(session);

    eprintln!("{name}: deleted");
    Ok(())
}

async fn cmd_demo(service: &StorageService<SocketHost>, identity: CallerIdentity) -> Result<()> {
    let session = service.open_session(Some(identity));
    let flags = AccessFlags::READ | AccessFlags::WRITE | AccessFlags::WRITE_META;
    let obj = StorageObject::open(service, &session, DEMO_NAME, flags).map_err(describe)?;

    obj.write(DEMO_DATA).await.map_err(describe)?;
    println!("wrote {} bytes to {DEMO_NAME}", DEMO_DATA.len());

    let mut buf = [0u8; 256];
    let n = obj.read(&mut buf).await.map_err(describe)?;
    println!("read back: {}", String::from_utf8_lossy(&buf[..n]));
    if &buf[..n] != DEMO_DATA {
        anyhow::bail!("demo data mismatch after read back");
    }

    obj.delete().await.map_err(describe)?;
    println!("deleted {DEMO_NAME}");
    service.close_session(session);
    Ok(())
}

/// Attach the numeric result code to a service error.
fn describe(e: OteError) -> anyhow::Error {
    anyhow::anyhow!("{e} (code {:#010x})", e.code())
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
