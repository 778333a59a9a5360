//! Gmail agent tools - MCP server
//!
//! Serves Gmail draft, message and label tools over MCP, each call acting on the mailbox of the
//! agent that made it.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use gmail_agent_tools::config::Config;
use gmail_agent_tools::gmail::auth::{
    authorize_interactive, serve_callback, CallbackState, CredentialResolver, GoogleOAuth,
};
use gmail_agent_tools::gmail::client::GmailClient;
use gmail_agent_tools::gmail::operation::OperationExecutor;
use gmail_agent_tools::gmail::token_store::{FileTokenStore, TokenStore};
use gmail_agent_tools::gmail::types::CallerId;
use gmail_agent_tools::mcp::server::McpServer;
use gmail_agent_tools::mcp::tools::ToolHandler;

/// Gmail agent tools
#[derive(Parser)]
#[command(name = "gmail-agent-tools")]
#[command(author, version, about = "Gmail tools for many agents over the Model Context Protocol")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server on stdio together with the OAuth callback (default)
    Serve,

    /// Authorize one agent from the terminal
    Authorize {
        /// Identity of the agent to authorize
        #[arg(long)]
        agent: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the MCP stream
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::new().context("Failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(config).await,
        Commands::Authorize { agent } => {
            let store = open_store(&config).await?;
            let oauth = load_oauth(&config).await?;
            authorize_interactive(&config, oauth, store, &CallerId::new(agent.clone()))
                .await
                .context("Authorization failed")?;
            eprintln!("Agent {} authorized successfully!", agent);
            Ok(())
        }
    }
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn TokenStore>> {
    let store = FileTokenStore::open(&config.credentials_path)
        .await
        .with_context(|| {
            format!(
                "Failed to load stored credentials from {}",
                config.credentials_path.display()
            )
        })?;
    Ok(Arc::new(store))
}

async fn load_oauth(config: &Config) -> anyhow::Result<Arc<GoogleOAuth>> {
    let oauth = GoogleOAuth::from_config(config).await.with_context(|| {
        format!(
            "Please place gcp-oauth.keys.json in the current directory or {}",
            config.config_dir.display()
        )
    })?;
    Ok(Arc::new(oauth))
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let store = open_store(&config).await?;
    let oauth = load_oauth(&config).await?;

    let callback_state = CallbackState::new(oauth.clone(), store.clone(), oauth.pending());
    let callback_config = config.clone();
    tokio::spawn(async move {
        if let Err(e) = serve_callback(&callback_config, callback_state).await {
            tracing::error!("OAuth callback server stopped: {}", e);
        }
    });

    let executor = OperationExecutor::new(
        CredentialResolver::new(store, Some(oauth.clone())),
        Arc::new(GmailClient::new(&config)),
        oauth,
    );
    let server = Arc::new(McpServer::new(
        ToolHandler::new(executor),
        CallerId::new(config.default_agent.clone()),
    ));

    tracing::info!("Serving Gmail tools on stdio");
    server.run_stdio().await?;
    Ok(())
}
