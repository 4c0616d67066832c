//! attnscope CLI: offline attention analysis and the HTTP gateway.

mod commands;

use attnscope_core::VisualizationMethod;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// attnscope: see where a transformer looks
#[derive(Parser, Debug)]
#[command(name = "attnscope", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the HTTP gateway against a model service
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Base URL of the model service
        #[arg(long)]
        service_url: Option<String>,
    },
    /// Process attention stored in a JSON file (text, tokens, attentions)
    Analyze {
        input: PathBuf,
        /// raw, rollout or flow (defaults to the configured method)
        #[arg(short, long)]
        method: Option<VisualizationMethod>,
        /// Skip residual (identity) augmentation
        #[arg(long)]
        no_identity: bool,
        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Max-flow attribution from one input position
    Flow {
        input: PathBuf,
        /// Source token index
        #[arg(short, long)]
        source: usize,
        /// Leave out token-to-itself edges
        #[arg(long)]
        remove_diagonal: bool,
    },
    /// Show which word each token belongs to
    Align { input: PathBuf },
    /// Replace the word behind a token and print the resulting text
    Mask {
        input: PathBuf,
        /// Token index to replace
        #[arg(short, long)]
        index: usize,
        /// Replacement text
        #[arg(short, long)]
        replacement: String,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default configuration file to the workspace
    Init,
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "attnscope", "attnscope")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "attnscope.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace).await
}
