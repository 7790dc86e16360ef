use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tlsn_plugin_host::{cli, HostConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), env!("PLUGIN_HOST_VERSION_SUFFIX"));

#[derive(Parser)]
#[command(name = "tlsn-plugin")]
#[command(author, version = VERSION, about = "TLSNotary plugin tooling: transcripts, reveal ranges and permission checks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Host configuration file (default: the per-user config file)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse an HTTP transcript and print a JSON summary
    Parse {
        /// Raw request or response bytes
        file: PathBuf,
    },

    /// Compute the reveal ranges for a handler list
    Ranges {
        /// JSON array of handlers
        #[arg(long)]
        handlers: PathBuf,

        /// Sent transcript (the request)
        #[arg(long)]
        sent: PathBuf,

        /// Received transcript (the response)
        #[arg(long)]
        recv: PathBuf,
    },

    /// Print the config a plugin exports, without running it
    Config {
        /// Plugin source file
        plugin: PathBuf,
    },

    /// Check whether a plugin may open a window on a URL
    CheckWindow {
        plugin: PathBuf,
        url: String,
    },

    /// Check whether a plugin may prove a request
    CheckProve {
        plugin: PathBuf,

        #[arg(long)]
        url: String,

        #[arg(long, default_value = "GET")]
        method: String,

        #[arg(long)]
        verifier: String,

        /// Defaults to the proxy derived from the verifier
        #[arg(long)]
        proxy: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "tlsn_plugin_host=debug"
    } else {
        "tlsn_plugin_host=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => HostConfig::load_from(path)?,
        None => HostConfig::load().unwrap_or_default(),
    };

    match cli.command {
        Commands::Parse { file } => cli::run_parse(&file)?,
        Commands::Ranges { handlers, sent, recv } => cli::run_ranges(&handlers, &sent, &recv)?,
        Commands::Config { plugin } => cli::run_config(&plugin, &config)?,
        Commands::CheckWindow { plugin, url } => cli::run_check_window(&plugin, &url, &config)?,
        Commands::CheckProve {
            plugin,
            url,
            method,
            verifier,
            proxy,
        } => cli::run_check_prove(&plugin, &url, &method, &verifier, proxy.as_deref(), &config)?,
    }

    Ok(())
}
