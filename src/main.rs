//! ChatVault - Private local data routing for a terminal AI assistant
//!
//! `chatvault serve` runs the warm process; every other subcommand is a
//! short-lived client that talks to it over the loopback socket.

use anyhow::{bail, Context, Result};
use chatvault::{
    config::ChatVaultConfig,
    server::{Response, Server, DEFAULT_SESSION},
    supervisor::{self, DaemonClient, Supervisor},
    Pipeline,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chatvault")]
#[command(author = "ChatVault Team")]
#[command(version)]
#[command(about = "Private local data routing for a terminal AI assistant")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CHATVAULT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the warm process in the foreground
    Serve {
        /// Port to listen on (overrides configuration)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Send a message, starting the warm process if needed
    Send {
        /// Message text
        message: String,

        /// Session the message belongs to
        #[arg(short, long, default_value = DEFAULT_SESSION)]
        session: String,

        /// System prompt for the remote chat model
        #[arg(long)]
        system_prompt: Option<String>,
    },

    /// Check whether the warm process is answering
    Ping,

    /// Stop the warm process
    Stop,

    /// Delete the remote chat history of every session
    CleanupHistory,

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("chatvault={}", log_level).into()),
        )
        .with(
            cli.log_json
                .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
        )
        .with(
            (!cli.log_json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        )
        .init();

    let config = ChatVaultConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let client = DaemonClient::new(config.server.address());

    match cli.command {
        Commands::Serve { port } => run_server(config, port).await?,
        Commands::Send {
            message,
            session,
            system_prompt,
        } => {
            let supervisor = Supervisor::new(client, cli.config.clone())?;
            send_message(&supervisor, &session, &message, system_prompt).await?;
        }
        Commands::Ping => {
            if !client.ping().await {
                bail!("ChatVault is not running on {}", client.address());
            }
            println!("pong");
        }
        Commands::Stop => {
            let supervisor = Supervisor::new(client, cli.config.clone())?;
            if supervisor.stop().await? {
                println!("ChatVault stopped");
            } else {
                println!("ChatVault is not running");
            }
        }
        Commands::CleanupHistory => {
            let supervisor = Supervisor::new(client, cli.config.clone())?;
            supervisor.ensure_running().await?;
            print_response(&supervisor.client().cleanup_history().await?);
        }
        Commands::Config { default } => {
            let shown = if default {
                ChatVaultConfig::default()
            } else {
                config
            };
            println!("{}", toml::to_string_pretty(&shown)?);
        }
    }

    Ok(())
}

async fn run_server(mut config: ChatVaultConfig, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }

    if let Some(parent) = config.storage.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    // the classifier and extractor fall back to rules without a runner
    if let Err(e) = supervisor::runner::ensure_running(&config.models).await {
        tracing::warn!(error = %e, "Model runner unavailable, using rule fallbacks");
    }

    let pipeline = Arc::new(Pipeline::from_config(&config)?);
    Server::new(config.server.clone(), pipeline).run().await?;
    Ok(())
}

async fn send_message(
    supervisor: &Supervisor,
    session: &str,
    message: &str,
    system_prompt: Option<String>,
) -> Result<()> {
    supervisor.ensure_running().await?;
    let client = supervisor.client();

    let response = client
        .send_message(session, message, system_prompt.clone())
        .await?;
    print_response(&response);

    // a parked confirmation would swallow the session's next message, so
    // piped or closed stdin answers "no"
    if awaiting_confirmation(&response) {
        let line = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await?
        .unwrap_or_default();
        let reply = confirmation_reply(&line);
        print_response(&client.send_message(session, reply, system_prompt).await?);
    }
    Ok(())
}

/// The user's answer, or "no" when there was none
fn confirmation_reply(line: &str) -> &str {
    match line.trim() {
        "" => "no",
        text => text,
    }
}

fn awaiting_confirmation(response: &Response) -> bool {
    response
        .metadata
        .as_ref()
        .and_then(|m| m.get("status"))
        .and_then(|s| s.as_str())
        == Some("awaiting_confirmation")
}

fn print_response(response: &Response) {
    if response.success {
        println!("{}", response.response.as_deref().unwrap_or_default());
    } else {
        eprintln!("{}", response.error.as_deref().unwrap_or("Request failed"));
    }
}
