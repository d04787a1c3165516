use std::net::SocketAddr;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use neoagent::{config::Config, utils::init_logger, Agent, AppState};

mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let default_filter = match cli.command {
        None | Some(Command::Serve) => neoagent::utils::DEFAULT_FILTER,
        Some(_) => "neoagent=warn",
    };
    let _guard = init_logger(config.logging.log_dir.as_deref(), default_filter)?;

    let agent = Agent::from_config(&config)?;

    match cli.command {
        None | Some(Command::Serve) => serve(config, agent).await,
        Some(Command::Chat(args)) => cli::chat(&agent, args).await,
        Some(Command::Pipeline(args)) => cli::pipeline(&agent, &config, args).await,
    }
}

async fn serve(config: Config, agent: Agent) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!(server = ?config.server, model = %config.llm.model, "Configuration loaded");

    let state = AppState::new(config, agent);
    let app = neoagent::create_router(state);

    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
