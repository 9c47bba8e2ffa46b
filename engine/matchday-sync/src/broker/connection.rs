//! The single logical broker connection and its lifecycle

use super::{BrokerListener, BrokerSession, Connector};
use crate::error::BrokerResult;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

struct Inner {
    session: Option<Arc<dyn BrokerSession>>,
    listener: Option<Arc<dyn BrokerListener>>,
    state: ConnectionState,
}

/// Owns the one broker session the process holds.
///
/// Lifecycle calls are serialized on an internal lock. A dropped session is replaced lazily
/// by the next `get_connection`, or eagerly by `reconnect`; either way the registered listener
/// is attached to the new session and its topics subscribed again.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    inner: Mutex<Inner>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            inner: Mutex::new(Inner {
                session: None,
                listener: None,
                state: ConnectionState::Disconnected,
            }),
        }
    }

    /// The live session, connecting first if needed
    pub async fn get_connection(&self) -> BrokerResult<Arc<dyn BrokerSession>> {
        let mut inner = self.inner.lock().await;
        self.ensure_connected(&mut inner).await
    }

    /// Register the listener and subscribe it to every topic it declares.
    ///
    /// Replaces any previously registered listener.
    pub async fn set_listener(&self, listener: Arc<dyn BrokerListener>) -> BrokerResult<()> {
        let mut inner = self.inner.lock().await;
        let session = self.ensure_connected(&mut inner).await?;

        inner.listener = Some(listener.clone());
        attach(session.as_ref(), listener).await
    }

    /// Tear down the current session and open a new one with the listener re-attached
    pub async fn reconnect(&self) -> BrokerResult<()> {
        let mut inner = self.inner.lock().await;
        info!("Reconnecting to broker");

        if let Some(old) = inner.session.take() {
            if let Err(e) = old.disconnect().await {
                warn!("Error closing previous broker session: {}", e);
            }
        }
        inner.state = ConnectionState::Disconnected;

        self.ensure_connected(&mut inner).await.map(|_| ())
    }

    pub async fn disconnect(&self) -> BrokerResult<()> {
        let mut inner = self.inner.lock().await;
        inner.state = ConnectionState::Disconnected;

        match inner.session.take() {
            Some(session) => session.disconnect().await,
            None => Ok(()),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        let inner = self.inner.lock().await;
        match &inner.session {
            Some(session) if !session.is_connected() => ConnectionState::Disconnected,
            _ => inner.state,
        }
    }

    async fn ensure_connected(&self, inner: &mut Inner) -> BrokerResult<Arc<dyn BrokerSession>> {
        if let Some(session) = &inner.session {
            if session.is_connected() {
                return Ok(session.clone());
            }
        }

        if let Some(stale) = inner.session.take() {
            let _ = stale.disconnect().await;
        }

        inner.state = ConnectionState::Connecting;
        let session = match self.connector.connect().await {
            Ok(session) => session,
            Err(e) => {
                inner.state = ConnectionState::Disconnected;
                return Err(e);
            }
        };

        if let Some(listener) = &inner.listener {
            if let Err(e) = attach(session.as_ref(), listener.clone()).await {
                let _ = session.disconnect().await;
                inner.state = ConnectionState::Disconnected;
                return Err(e);
            }
        }

        inner.session = Some(session.clone());
        inner.state = ConnectionState::Connected;
        Ok(session)
    }
}

async fn attach(session: &dyn BrokerSession, listener: Arc<dyn BrokerListener>) -> BrokerResult<()> {
    let topics = listener.topics();
    session.set_listener(listener).await;
    for topic in &topics {
        session.subscribe(topic).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::testing::{MockConnector, TopicsOnly};
    use crate::error::BrokerError;

    fn manager() -> (Arc<MockConnector>, ConnectionManager) {
        let connector = Arc::new(MockConnector::default());
        (connector.clone(), ConnectionManager::new(connector))
    }

    #[tokio::test]
    async fn test_get_connection_is_lazy_and_reused() {
        let (connector, manager) = manager();
        assert_eq!(manager.state().await, ConnectionState::Disconnected);
        assert!(connector.sessions().is_empty());

        manager.get_connection().await.unwrap();
        manager.get_connection().await.unwrap();

        assert_eq!(connector.sessions().len(), 1);
        assert_eq!(manager.state().await, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_set_listener_subscribes_topics() {
        let (connector, manager) = manager();
        let listener = Arc::new(TopicsOnly(vec!["D11::ACTIVE_MATCH", "D11::PING"]));

        manager.set_listener(listener.clone()).await.unwrap();
        manager.set_listener(listener).await.unwrap();

        let session = connector.latest();
        assert_eq!(session.subscriptions(), vec!["D11::ACTIVE_MATCH", "D11::PING"]);
        assert!(session.listener().is_some());
    }

    #[tokio::test]
    async fn test_double_reconnect_keeps_one_connection() {
        let (connector, manager) = manager();
        manager
            .set_listener(Arc::new(TopicsOnly(vec!["D11::ACTIVE_MATCH", "D11::PING"])))
            .await
            .unwrap();

        manager.reconnect().await.unwrap();
        manager.reconnect().await.unwrap();

        let sessions = connector.sessions();
        assert_eq!(sessions.len(), 3);

        let live: Vec<_> = sessions.iter().filter(|s| s.is_connected()).collect();
        assert_eq!(live.len(), 1);
        assert!(Arc::ptr_eq(live[0], &connector.latest()));
        assert_eq!(live[0].subscriptions(), vec!["D11::ACTIVE_MATCH", "D11::PING"]);
        assert_eq!(manager.state().await, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_dropped_session_replaced_on_next_use() {
        let (connector, manager) = manager();
        manager.set_listener(Arc::new(TopicsOnly(vec!["D11::ACTIVE_MATCH"]))).await.unwrap();

        connector.latest().drop_connection();
        assert_eq!(manager.state().await, ConnectionState::Disconnected);

        manager.get_connection().await.unwrap();
        assert_eq!(connector.sessions().len(), 2);
        assert_eq!(connector.latest().subscriptions(), vec!["D11::ACTIVE_MATCH"]);
    }

    #[tokio::test]
    async fn test_failed_connect_propagates() {
        let (connector, manager) = manager();
        connector.refuse_connections(true);

        assert!(matches!(manager.get_connection().await, Err(BrokerError::Io(_))));
        assert_eq!(manager.state().await, ConnectionState::Disconnected);

        connector.refuse_connections(false);
        assert!(manager.reconnect().await.is_ok());
    }

    #[tokio::test]
    async fn test_disconnect() {
        let (connector, manager) = manager();
        manager.get_connection().await.unwrap();

        manager.disconnect().await.unwrap();
        assert!(!connector.latest().is_connected());
        assert_eq!(manager.state().await, ConnectionState::Disconnected);

        // Nothing to close the second time
        manager.disconnect().await.unwrap();
    }
}
