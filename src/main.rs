//! MCP multi-server chat client
//!
//! Entry point for the interactive tool-calling chat loop.

use std::process::ExitCode;

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use clap::Parser;
use dotenvy::dotenv;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use mcp_multiserver_chat::app::{self, SessionOutcome};
use mcp_multiserver_chat::config::{Cli, ClientConfig, load_llm_settings};
use mcp_multiserver_chat::llm::{Agent, ChatAgent};
use mcp_multiserver_chat::mcp::config::ConfigSource;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing (M-LOG-STRUCTURED); stdout belongs to the chat.
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    // Load .env (if present)
    let _ = dotenv();

    let cli = Cli::parse();
    let client_config = match ClientConfig::from_cli(cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let settings = match load_llm_settings(&client_config.llm) {
        Ok(s) => s,
        Err(msg) => {
            eprintln!("Configuration error: {msg}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        model = %settings.model,
        "LLM configuration loaded"
    );

    let mut stdout = std::io::stdout();
    let source = ConfigSource::resolve(client_config.server_config.as_deref());
    let servers = match app::load_server_config(&source, &mut stdout) {
        Ok(cfg) => cfg,
        Err(e) => {
            println!("Failed to read config file at '{}': {e}", e.path().display());
            return ExitCode::FAILURE;
        }
    };

    let stdin = BufReader::new(tokio::io::stdin());
    let outcome = app::run_session(
        &servers,
        |tools| Box::new(Agent::new(settings, tools)) as Box<dyn ChatAgent>,
        stdin,
        &mut stdout,
    )
    .await;

    match outcome {
        Ok(outcome) => {
            if let SessionOutcome::Finished { queries } = outcome {
                info!(queries = queries, "Session finished");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
