use anyhow::Context;
use clap::{Parser, Subcommand};
use matchday_sync::{Orchestrator, SyncConfig, SyncEvent};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "matchday-sync")]
#[command(about = "Sync Premier League squads and Fotmob match data to the D11 broker")]
#[command(version = "0.1.0")]
struct Cli {
    /// Configuration file (TOML or JSON); environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler and broker listener until interrupted
    Daemon,

    /// Fetch and publish every squad of a competition once
    UpdateSquads {
        /// Overrides the configured competition id
        #[arg(long)]
        competition_id: Option<String>,

        /// Overrides the configured season
        #[arg(long)]
        season: Option<String>,
    },

    /// Fetch and publish a single platform match once
    UpdateMatch {
        /// D11 platform match id
        #[arg(long)]
        match_id: i64,

        /// Mark the match as final
        #[arg(long)]
        finish: bool,
    },

    /// Refresh the Fotmob API token from the token endpoint
    RefreshToken,

    /// Import the Fotmob API token from a HAR capture
    ParseHar { file: PathBuf },

    /// Publish a ping message to the broker
    Ping,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = SyncConfig::load(cli.config.as_deref()).context("Invalid configuration")?;
    let orchestrator = Orchestrator::new(config)?;

    match cli.command {
        Commands::Daemon => {
            if let Err(e) = orchestrator.run().await {
                error!("Daemon failed: {:#}", e);
                return Err(e);
            }
        }
        Commands::UpdateSquads { competition_id, season } => {
            let competition = orchestrator.competition(competition_id, season);
            let event = orchestrator.service().update_squads(&competition).await?;
            report(event);
            disconnect(&orchestrator).await;
        }
        Commands::UpdateMatch { match_id, finish } => {
            let event = orchestrator.service().update_match(match_id, finish).await?;
            report(event);
            disconnect(&orchestrator).await;
        }
        Commands::RefreshToken => {
            if !orchestrator.tokens().refresh().await? {
                warn!("Token not refreshed");
            }
        }
        Commands::ParseHar { file } => {
            if !orchestrator.tokens().import_har(&file)? {
                warn!("No token imported from {:?}", file);
            }
        }
        Commands::Ping => {
            orchestrator.publisher().send_ping().await.context("Failed to send ping")?;
            info!("Ping sent");
            disconnect(&orchestrator).await;
        }
    }

    Ok(())
}

fn report(event: SyncEvent) {
    match event {
        SyncEvent::FetchFailed { endpoint, .. } => warn!("Nothing published, no data from {}", endpoint),
        event => info!("Done: {:?}", event),
    }
}

async fn disconnect(orchestrator: &Orchestrator) {
    if let Err(e) = orchestrator.connection().disconnect().await {
        warn!("Broker disconnect failed: {}", e);
    }
}
