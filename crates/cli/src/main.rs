//! AgentScope CLI — the main entry point.
//!
//! Commands:
//! - `init`    — Write the default config
//! - `chat`    — Interactive or single-message chat with the ReAct agent
//! - `serve`   — Expose the agent over A2A
//! - `call`    — Send one message to a remote A2A agent
//! - `card`    — Print a remote agent card
//! - `models`  — List the default provider's models

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "agentscope",
    about = "AgentScope — ReAct agents and Agent-to-Agent interop",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.agentscope/config.toml)
    #[arg(short, long, global = true, env = "AGENTSCOPE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Chat with the ReAct agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Print the reply as it is generated
        #[arg(long)]
        stream: bool,
    },

    /// Serve the agent over the A2A protocol
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the bind address
        #[arg(long)]
        host: Option<String>,
    },

    /// Send a message to a remote A2A agent
    Call {
        /// Base URL of the agent, or a name from `[[a2a.agents]]`
        target: String,

        /// The message to send
        message: String,

        /// Stream the reply
        #[arg(long)]
        stream: bool,
    },

    /// Print the agent card of a remote A2A agent
    Card {
        /// Base URL of the agent
        url: String,
    },

    /// List the models of the default provider
    Models,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Init { force } => commands::init::run(config, force).await?,
        Commands::Chat { message, stream } => commands::chat::run(config, message, stream).await?,
        Commands::Serve { port, host } => commands::serve::run(config, host, port).await?,
        Commands::Call {
            target,
            message,
            stream,
        } => commands::call::run(config, &target, &message, stream).await?,
        Commands::Card { url } => commands::card::run(&url).await?,
        Commands::Models => commands::models::run(config).await?,
    }

    Ok(())
}
