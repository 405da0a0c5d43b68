//! Chatline - multi-conversation chat client
//!
#![doc = "Chatline - multi-conversation chat client"]
#![doc = "Main entry point for the Chatline application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chatline::cli::{Cli, Commands};
use chatline::commands;
use chatline::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| Config::default_path().to_string_lossy().to_string());
    let config = Config::load(&config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    match cli.command {
        Commands::Chat { chat } => {
            tracing::info!("Starting interactive chat mode");
            commands::chat::run_chat(config, chat).await?;
        }
        Commands::List { json } => {
            commands::conversations::list(&config, json).await?;
        }
        Commands::Show { id } => {
            commands::conversations::show(&config, &id).await?;
        }
        Commands::Create => {
            commands::conversations::create(&config).await?;
        }
        Commands::Rename { id, title } => {
            commands::conversations::rename(&config, &id, &title).await?;
        }
        Commands::Delete { id, yes } => {
            commands::conversations::delete(&config, &id, yes).await?;
        }
        Commands::Send { chat, content } => {
            commands::conversations::send(&config, chat.as_deref(), &content).await?;
        }
    }

    Ok(())
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose { "chatline=debug" } else { "chatline=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
