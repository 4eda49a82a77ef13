//! gpg-shim - Drive gpg as a subprocess in buffered and streaming modes.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gpg_shim::config::{ConfigError, ConfigLoader, ShimConfig};
use gpg_shim::gpg::{BufferedInvoker, Dest, InvokeError, Source, StreamingInvoker, StreamingRequest};

/// Path argument meaning stdin or stdout.
const STDIO_PATH: &str = "-";

#[derive(Parser)]
#[command(
    name = "gpg-shim",
    about = "Drive gpg in buffered and streaming modes",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file (defaults to .gpg-shim.toml, then the user config dir).
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run gpg on a single in-memory input.
    Exec {
        /// Input file (reads stdin when omitted).
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Default arguments appended after the per-call arguments.
        #[arg(long = "default-arg", allow_hyphen_values = true)]
        default_args: Vec<String>,
        /// Per-call gpg arguments.
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Stream a source through gpg into a destination.
    Stream {
        /// Source file, or `-` for stdin.
        #[arg(long)]
        source: String,
        /// Destination file, or `-` for stdout.
        #[arg(long)]
        dest: String,
        /// Complete gpg argument list.
        #[arg(last = true)]
        args: Vec<String>,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Invoke(#[from] InvokeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<ShimConfig, ConfigError> {
    let loader = match path {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    loader.load()
}

async fn exec(
    config: &ShimConfig,
    input: Option<PathBuf>,
    default_args: Vec<String>,
    args: Vec<String>,
) -> Result<(), CliError> {
    let input = match input {
        Some(path) => tokio::fs::read(path).await?,
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin().read_to_end(&mut buf).await?;
            buf
        }
    };

    let invoker = BufferedInvoker::new(config.launcher());
    let output = invoker.invoke(input, &default_args, &args).await?;

    if !output.stderr.is_empty() {
        eprint!("{}", output.stderr);
    }
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&output.stdout).await?;
    stdout.flush().await?;
    Ok(())
}

async fn stream(
    config: &ShimConfig,
    source: String,
    dest: String,
    args: Vec<String>,
) -> Result<(), CliError> {
    let source = if source == STDIO_PATH {
        Source::reader(tokio::io::stdin())
    } else {
        Source::path(source)
    };
    let to_stdout = dest == STDIO_PATH;
    let dest = if to_stdout {
        Dest::writer(tokio::io::stdout())
    } else {
        Dest::path(dest)
    };

    let invoker = StreamingInvoker::new(config.launcher()).with_matcher(config.reject_matcher());
    let request = StreamingRequest::new().source(source).dest(dest);
    let outcome = invoker.invoke(request, &args).await?;

    tracing::info!(bytes = outcome.bytes_written, "Stream complete");
    if to_stdout {
        eprintln!("{}", outcome.message());
    } else {
        println!("{}", outcome.message());
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.config)?;

    match cli.command {
        Commands::Exec {
            input,
            default_args,
            args,
        } => exec(&config, input, default_args, args).await,
        Commands::Stream { source, dest, args } => stream(&config, source, dest, args).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "gpg-shim failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
