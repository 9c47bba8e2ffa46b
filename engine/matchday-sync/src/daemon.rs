//! Long-running mode: scheduler, broker listener and connection wired together

use crate::archive::Archive;
use crate::broker::{ConnectionManager, Publisher, StompConnector};
use crate::config::SyncConfig;
use crate::credentials::TokenStore;
use crate::listener::EventListener;
use crate::models::SyncEvent;
use crate::providers::d11::D11Client;
use crate::providers::fotmob::FotmobClient;
use crate::providers::premier_league::PremierLeagueClient;
use crate::providers::Competition;
use crate::scheduler::{LocalClock, RandomJitter, ScheduledTask, Scheduler};
use crate::service::SyncService;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

const SQUAD_SYNC_TAG: &str = "squad-sync";
const TOKEN_REFRESH_TAG: &str = "token-refresh";

/// Daily squad sync for the configured competition
pub struct SquadSyncTask {
    service: Arc<SyncService>,
    competition: Competition,
}

#[async_trait]
impl ScheduledTask for SquadSyncTask {
    fn name(&self) -> &str {
        "squad sync"
    }

    async fn run(&self) -> Result<()> {
        match self.service.update_squads(&self.competition).await? {
            SyncEvent::FetchFailed { endpoint, .. } => {
                anyhow::bail!("no data from {}", endpoint)
            }
            event => {
                info!("Squad sync finished: {:?}", event);
                Ok(())
            }
        }
    }
}

pub struct TokenRefreshTask {
    tokens: Arc<TokenStore>,
}

#[async_trait]
impl ScheduledTask for TokenRefreshTask {
    fn name(&self) -> &str {
        "token refresh"
    }

    async fn run(&self) -> Result<()> {
        self.tokens.refresh().await.map(|_| ())
    }
}

/// Owns the broker connection and every component sharing it
pub struct Orchestrator {
    config: SyncConfig,
    connection: Arc<ConnectionManager>,
    publisher: Arc<Publisher>,
    service: Arc<SyncService>,
    tokens: Arc<TokenStore>,
}

impl Orchestrator {
    /// Build the clients and the broker plumbing. Nothing connects until first use.
    pub fn new(config: SyncConfig) -> Result<Self> {
        let timeout = config.http_timeout();

        let tokens = Arc::new(TokenStore::new(&config.fotmob, timeout)?);
        let platform = Arc::new(D11Client::new(config.d11.clone(), timeout)?);
        let squads = Arc::new(PremierLeagueClient::new(config.premier_league.clone(), timeout)?);
        let matches = Arc::new(FotmobClient::new(config.fotmob.clone(), timeout, tokens.clone())?);

        let connector = Arc::new(StompConnector::new(config.broker.clone()));
        let connection = Arc::new(ConnectionManager::new(connector));
        let publisher = Arc::new(Publisher::new(connection.clone(), config.topics.clone()));

        let service = Arc::new(SyncService::new(
            platform,
            squads,
            matches,
            publisher.clone(),
            Archive::new(config.archive.clone()),
            config.fotmob.kickoff_offset_hours,
        ));

        Ok(Self { config, connection, publisher, service, tokens })
    }

    pub fn service(&self) -> &Arc<SyncService> {
        &self.service
    }

    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Competition from configuration, with optional per-run overrides
    pub fn competition(&self, competition_id: Option<String>, season: Option<String>) -> Competition {
        Competition {
            competition_id: competition_id
                .unwrap_or_else(|| self.config.premier_league.competition_id.clone()),
            season: season.unwrap_or_else(|| self.config.premier_league.season.clone()),
        }
    }

    /// Run until Ctrl-C. A broker connection failure at startup is fatal.
    pub async fn run(&self) -> Result<()> {
        info!("Starting matchday sync daemon");

        let listener = Arc::new(EventListener::new(
            &self.config.topics,
            self.service.clone(),
            &self.connection,
        ));
        self.connection
            .set_listener(listener)
            .await
            .context("Failed to connect to broker")?;

        let mut scheduler = self.build_scheduler()?;
        scheduler.run(self.config.poll_interval(), shutdown_signal()).await;

        if let Err(e) = self.connection.disconnect().await {
            warn!("Broker disconnect failed: {}", e);
        }
        info!("Matchday sync daemon stopped");
        Ok(())
    }

    fn build_scheduler(&self) -> Result<Scheduler> {
        let mut scheduler = Scheduler::new(Arc::new(LocalClock), Box::new(RandomJitter::new()));

        scheduler.every_day_at(
            SQUAD_SYNC_TAG,
            self.config.squad_sync_time()?,
            Arc::new(SquadSyncTask {
                service: self.service.clone(),
                competition: self.competition(None, None),
            }),
        );

        if self.config.scheduler.enable_token_refresh {
            scheduler.adaptive(
                TOKEN_REFRESH_TAG,
                Arc::new(TokenRefreshTask { tokens: self.tokens.clone() }),
            );
        }

        Ok(scheduler)
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Interrupt received, shutting down"),
        Err(e) => {
            // Without a signal handler the daemon runs until killed
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_competition_overrides() {
        let orchestrator = Orchestrator::new(SyncConfig::default()).unwrap();

        let configured = orchestrator.competition(None, None);
        assert_eq!(configured.competition_id, "8");
        assert_eq!(configured.season, "2025");

        let overridden = orchestrator.competition(Some("1".to_string()), Some("2024".to_string()));
        assert_eq!(overridden.competition_id, "1");
        assert_eq!(overridden.season, "2024");
    }

    #[test]
    fn test_scheduler_jobs() {
        let orchestrator = Orchestrator::new(SyncConfig::default()).unwrap();
        let scheduler = orchestrator.build_scheduler().unwrap();
        assert_eq!(scheduler.pending(SQUAD_SYNC_TAG).len(), 1);
        assert_eq!(scheduler.pending(TOKEN_REFRESH_TAG).len(), 1);

        let mut config = SyncConfig::default();
        config.scheduler.enable_token_refresh = false;
        let orchestrator = Orchestrator::new(config).unwrap();
        let scheduler = orchestrator.build_scheduler().unwrap();
        assert_eq!(scheduler.pending(SQUAD_SYNC_TAG).len(), 1);
        assert!(scheduler.pending(TOKEN_REFRESH_TAG).is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_broker_is_fatal() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut config = SyncConfig::default();
        config.broker.host = "127.0.0.1".to_string();
        config.broker.port = port;
        config.broker.connect_timeout_secs = 1;

        let orchestrator = Orchestrator::new(config).unwrap();
        assert!(orchestrator.run().await.is_err());
    }
}
