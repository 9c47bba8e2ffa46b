//! Inbound broker events → ingestion triggers

use crate::broker::{BrokerListener, ConnectionManager};
use crate::config::TopicConfig;
use crate::models::{ActiveMatch, SyncEvent};
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// Runs a match ingestion on request
#[async_trait]
pub trait MatchIngestor: Send + Sync {
    async fn update_match(&self, match_id: i64, finish: bool) -> anyhow::Result<SyncEvent>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    ActiveMatch,
    Liveness,
}

/// Dispatches inbound messages by exact destination match.
///
/// Holds the connection manager weakly: the manager owns this listener once registered.
pub struct EventListener {
    routes: Vec<(String, Route)>,
    ingestor: Arc<dyn MatchIngestor>,
    connection: Weak<ConnectionManager>,
}

impl EventListener {
    pub fn new(
        topics: &TopicConfig,
        ingestor: Arc<dyn MatchIngestor>,
        connection: &Arc<ConnectionManager>,
    ) -> Self {
        Self {
            routes: vec![
                (topics.active_match.clone(), Route::ActiveMatch),
                (topics.ping.clone(), Route::Liveness),
            ],
            ingestor,
            connection: Arc::downgrade(connection),
        }
    }

    fn route(&self, destination: &str) -> Option<Route> {
        self.routes.iter().find(|(topic, _)| topic == destination).map(|(_, route)| *route)
    }

    async fn handle_active_match(&self, body: &str) {
        let active: ActiveMatch = match serde_json::from_str(body) {
            Ok(active) => active,
            Err(e) => {
                error!("Malformed active match message ({}): {}", e, body);
                return;
            }
        };

        info!("Received active match {} (finish: {})", active.match_id, active.finish);

        match self.ingestor.update_match(active.match_id, active.finish).await {
            Ok(SyncEvent::FetchFailed { endpoint, .. }) => {
                error!("Match {} not updated, no data from {}", active.match_id, endpoint)
            }
            Ok(event) => debug!("Match {} ingestion finished: {:?}", active.match_id, event),
            Err(e) => error!("Failed to update match {}: {:#}", active.match_id, e),
        }
    }
}

#[async_trait]
impl BrokerListener for EventListener {
    fn topics(&self) -> Vec<String> {
        self.routes.iter().map(|(topic, _)| topic.clone()).collect()
    }

    async fn on_message(&self, destination: &str, body: &str) {
        match self.route(destination) {
            Some(Route::ActiveMatch) => self.handle_active_match(body).await,
            Some(Route::Liveness) => info!("Ping received on {}: {}", destination, body),
            None => debug!("Dropping message for unhandled destination {}", destination),
        }
    }

    async fn on_error(&self, message: &str, body: &str) {
        error!("Broker error: {} {}", message, body);
    }

    async fn on_disconnected(&self) {
        let Some(connection) = self.connection.upgrade() else {
            debug!("Connection manager gone, not reconnecting");
            return;
        };

        // One attempt per drop, no backoff
        warn!("Broker connection lost, reconnecting");
        tokio::spawn(async move {
            match connection.reconnect().await {
                Ok(()) => info!("Reconnected to broker"),
                Err(e) => error!("Reconnect to broker failed: {}", e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::testing::MockConnector;
    use crate::config::SyncConfig;
    use crate::models::MatchStatus;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingIngestor {
        calls: Mutex<Vec<(i64, bool)>>,
    }

    #[async_trait]
    impl MatchIngestor for RecordingIngestor {
        async fn update_match(&self, match_id: i64, finish: bool) -> anyhow::Result<SyncEvent> {
            self.calls.lock().unwrap().push((match_id, finish));
            if match_id < 0 {
                anyhow::bail!("unknown match");
            }
            Ok(SyncEvent::MatchUpdated { match_id, status: MatchStatus::Active, timestamp: Utc::now() })
        }
    }

    fn listener() -> (Arc<RecordingIngestor>, Arc<MockConnector>, Arc<ConnectionManager>, EventListener) {
        let ingestor = Arc::new(RecordingIngestor::default());
        let connector = Arc::new(MockConnector::default());
        let manager = Arc::new(ConnectionManager::new(connector.clone()));
        let listener = EventListener::new(&SyncConfig::default().topics, ingestor.clone(), &manager);
        (ingestor, connector, manager, listener)
    }

    #[tokio::test]
    async fn test_topics() {
        let (_, _, _, listener) = listener();
        assert_eq!(listener.topics(), vec!["D11::ACTIVE_MATCH", "D11::PING"]);
    }

    #[tokio::test]
    async fn test_active_match_triggers_ingestion() {
        let (ingestor, _, _, listener) = listener();

        listener.on_message("D11::ACTIVE_MATCH", r#"{"matchId": 417, "finish": true}"#).await;
        listener.on_message("D11::ACTIVE_MATCH", r#"{"matchId": "418"}"#).await;
        listener.on_message("D11::ACTIVE_MATCH", r#"{"matchId": -1}"#).await;

        assert_eq!(*ingestor.calls.lock().unwrap(), vec![(417, true), (418, false), (-1, false)]);
    }

    #[tokio::test]
    async fn test_malformed_and_unrouted_messages_are_dropped() {
        let (ingestor, _, _, listener) = listener();

        listener.on_message("D11::ACTIVE_MATCH", "not json").await;
        listener.on_message("D11::ACTIVE_MATCH", r#"{"finish": true}"#).await;
        listener.on_message("D11::PING", r#"{"ping": true}"#).await;
        listener.on_message("D11::ACTIVE_MATCH_V2", r#"{"matchId": 1}"#).await;

        assert!(ingestor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_triggers_reconnect() {
        let (_, connector, manager, listener) = listener();
        let listener = Arc::new(listener);
        manager.set_listener(listener.clone()).await.unwrap();
        assert_eq!(connector.sessions().len(), 1);

        connector.latest().drop_connection();
        listener.on_disconnected().await;

        tokio::time::timeout(Duration::from_secs(2), async {
            while connector.sessions().len() < 2 || connector.latest().subscriptions().len() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(connector.latest().subscriptions(), vec!["D11::ACTIVE_MATCH", "D11::PING"]);
    }

    #[tokio::test]
    async fn test_no_reconnect_after_manager_dropped() {
        let (_, connector, manager, listener) = listener();
        drop(manager);

        listener.on_disconnected().await;
        tokio::task::yield_now().await;
        assert!(connector.sessions().is_empty());
    }
}
