//! chunklift command-line entry point.

mod app;
mod config;

use std::path::PathBuf;

use chunklift_transfer::HashAlgorithm;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "chunklift", version, about = "Resumable, deduplicated chunked uploads")]
struct Cli {
    /// Configuration file (defaults to the per-user client.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a file to the remote store.
    Upload(UploadArgs),
    /// Print the effective configuration.
    Config,
}

#[derive(Args)]
struct UploadArgs {
    /// File to upload.
    file: PathBuf,

    /// Base URL of the remote store.
    #[arg(long)]
    server: Option<String>,

    /// Name to store the file under (defaults to the local file name).
    #[arg(long)]
    name: Option<String>,

    /// Simultaneous chunk uploads.
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Chunk size in bytes.
    #[arg(long)]
    chunk_size: Option<u64>,

    /// Retries per chunk before giving up on it.
    #[arg(long)]
    retries: Option<u32>,

    /// Fingerprint digest.
    #[arg(long, value_enum)]
    hash: Option<HashArg>,

    /// JSON file for resume state across runs.
    #[arg(long, conflicts_with = "no_resume")]
    resume_state: Option<PathBuf>,

    /// Do not persist resume state, even if configured.
    #[arg(long)]
    no_resume: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum HashArg {
    Sha256,
    Md5,
}

impl From<HashArg> for HashAlgorithm {
    fn from(arg: HashArg) -> Self {
        match arg {
            HashArg::Sha256 => HashAlgorithm::Sha256,
            HashArg::Md5 => HashAlgorithm::Md5,
        }
    }
}

impl UploadArgs {
    /// Command-line flags take precedence over the configuration file.
    fn apply(&self, config: &mut Config) {
        if let Some(server) = &self.server {
            config.server_url.clone_from(server);
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(retries) = self.retries {
            config.max_retries = retries;
        }
        if let Some(hash) = self.hash {
            config.hash_algorithm = hash.into();
        }
        if self.no_resume {
            config.resume_state = None;
        } else if let Some(path) = &self.resume_state {
            config.resume_state = Some(path.clone());
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Command::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Upload(args) => {
            args.apply(&mut config);
            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                server = %config.server_url,
                "starting upload"
            );

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(app::upload(config, args.file, args.name))
        }
    }
}
