//! Polycache - command line front end for the cache facade
//!
//! Runs one cache operation against the backend selected through the
//! environment (see [`Config::from_env`]) and prints the result as JSON.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use polycache::{Backend, Cache, Config, Expiration};

#[derive(Parser)]
#[command(
    name = "polycache",
    version,
    about = "Uniform TTL cache over process-local, filesystem and network backends"
)]
struct Cli {
    /// Backend override: local, filesystem or network
    #[arg(long, global = true)]
    backend: Option<Backend>,

    /// Cache directory override (filesystem backend)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store VALUE under KEY
    Set {
        key: String,
        value: String,
        /// Time to live in milliseconds
        #[arg(long)]
        ttl_ms: Option<u64>,
    },
    /// Print the value stored under KEY
    Get {
        key: String,
        /// Printed on a miss
        #[arg(long, default_value = "null")]
        default: String,
    },
    /// Print whether KEY holds a live entry
    Exists { key: String },
    /// Remove KEY
    Expire { key: String },
    /// Restart the lifetime of KEY
    Touch {
        key: String,
        #[arg(long)]
        ttl_ms: Option<u64>,
    },
    /// Print expiry metadata of KEY
    Expiration { key: String },
    /// Remove every entry
    Clear,
    /// Remove expired artifacts (filesystem backend)
    Sweep,
}

/// Arguments are JSON when they parse as JSON, plain strings otherwise.
fn parse_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn expiration_json(expiration: Option<Expiration>) -> Result<Value> {
    let Some(expiration) = expiration else {
        return Ok(Value::Null);
    };
    let mut output = serde_json::to_value(expiration)?;
    output["expires_at"] = json!(expiration.expires_at().map(|at| at.to_rfc3339()));
    Ok(output)
}

fn main() -> Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "polycache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("failed to load configuration")?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(dir) = cli.dir {
        config.directory = dir;
    }
    info!(backend = ?config.backend, "cache backend selected");

    let output = match cli.cmd {
        Command::Sweep => {
            let mut cache = config
                .open_filesystem()
                .context("sweep needs the filesystem backend")?;
            json!({ "removed": cache.clear_expired()? })
        }
        cmd => {
            let mut cache = config.open().context("failed to open cache backend")?;
            run(cache.as_mut(), cmd)?
        }
    };

    println!("{output}");
    Ok(())
}

fn run(cache: &mut dyn Cache, cmd: Command) -> Result<Value> {
    let ttl = |ms: Option<u64>| ms.map(Duration::from_millis);

    Ok(match cmd {
        Command::Set { key, value, ttl_ms } => {
            cache.set(&parse_arg(&key), &parse_arg(&value), ttl(ttl_ms))?;
            Value::Bool(true)
        }
        Command::Get { key, default } => cache.get(&parse_arg(&key), parse_arg(&default))?,
        Command::Exists { key } => Value::Bool(cache.exists(&parse_arg(&key))?),
        Command::Expire { key } => {
            cache.expire(&parse_arg(&key))?;
            Value::Bool(true)
        }
        Command::Touch { key, ttl_ms } => {
            cache.touch(&parse_arg(&key), ttl(ttl_ms))?;
            Value::Bool(true)
        }
        Command::Expiration { key } => expiration_json(cache.expiration(&parse_arg(&key))?)?,
        Command::Clear => {
            cache.clear()?;
            Value::Bool(true)
        }
        Command::Sweep => anyhow::bail!("sweep is handled before opening the contract"),
    })
}
