use anyhow::{Context, Result};
use chat_stream::{ChatClient, Mode};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;

mod config;
mod repl;
mod session;

use crate::config::{CliOverrides, FileConfig, StreamConfig};

#[derive(Parser)]
#[command(name = "chat")]
#[command(about = "Streaming chat client")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (defaults to <config dir>/chat-stream/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// WebSocket endpoint, e.g. wss://host/ws/chat
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Bearer token
    #[arg(long, global = true)]
    token: Option<String>,

    /// Conversation mode (generic, document_processing, personal_query)
    #[arg(long, global = true)]
    mode: Option<Mode>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message, print the reply and exit
    Ask(AskArgs),
}

#[derive(Parser)]
struct AskArgs {
    /// Message text
    text: String,

    /// Attach a file
    #[arg(long, conflicts_with = "audio")]
    file: Option<PathBuf>,

    /// Attach an audio recording
    #[arg(long, requires = "duration")]
    audio: Option<PathBuf>,

    /// Recording length in seconds
    #[arg(long, requires = "audio")]
    duration: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "chat_cli=debug,chat_stream=debug,warn"
    } else {
        "chat_cli=info,chat_stream=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let config_path = config::config_path(cli.config)?;
    let mut fc: FileConfig = config::load_config(&config_path)
        .extract()
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    fc.apply(CliOverrides {
        url: cli.endpoint,
        token: cli.token,
        mode: cli.mode,
    });

    let endpoint = config::endpoint_from_file(&fc.endpoint)?;
    let stream = StreamConfig::from_file(&fc.stream);
    info!(endpoint = %endpoint, mode = %fc.stream.mode, "connecting");
    let client = ChatClient::connect(endpoint, stream.options.clone());

    match cli.command {
        None => session::interactive(client, &stream).await,
        Some(Commands::Ask(args)) => {
            let mode = fc.stream.mode;
            let input = match (args.file, args.audio, args.duration) {
                (Some(path), _, _) => repl::file_input(args.text, path, mode),
                (None, Some(path), Some(secs)) => repl::audio_input(args.text, path, secs, mode),
                _ => chat_stream::TurnInput::new(args.text).mode(mode),
            };
            session::ask(client, input, &stream).await
        }
    }
}
