use anyhow::{Context, Result};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr};

const DEFAULT_MAX_CHUNK_BYTES: usize = 10 * 1024 * 1024;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Root for staging directories and completed files.
    pub upload_dir: PathBuf,
    /// Largest chunk a client may send in one request.
    pub max_chunk_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Resumable chunked upload server")]
pub struct Args {
    /// Host to bind to (overrides RESUMABLE_UPLOAD_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides RESUMABLE_UPLOAD_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where chunks and merged files are stored (overrides RESUMABLE_UPLOAD_DIR)
    #[arg(long)]
    pub upload_dir: Option<PathBuf>,

    /// Maximum chunk size in bytes (overrides RESUMABLE_UPLOAD_MAX_CHUNK_BYTES)
    #[arg(long)]
    pub max_chunk_bytes: Option<usize>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    /// Merge already-parsed CLI args over the environment and defaults.
    pub fn from_args(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("RESUMABLE_UPLOAD_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_number("RESUMABLE_UPLOAD_PORT", 3001u16)?;
        let env_dir = env::var("RESUMABLE_UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./target/uploads"));
        let env_max_chunk =
            env_number("RESUMABLE_UPLOAD_MAX_CHUNK_BYTES", DEFAULT_MAX_CHUNK_BYTES)?;

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            upload_dir: args.upload_dir.unwrap_or(env_dir),
            max_chunk_bytes: args.max_chunk_bytes.unwrap_or(env_max_chunk),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_number<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}
