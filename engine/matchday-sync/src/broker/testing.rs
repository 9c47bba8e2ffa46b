//! In-memory broker doubles for lifecycle and publishing tests

use super::{BrokerListener, BrokerSession, Connector};
use crate::error::{BrokerError, BrokerResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) type SentMessage = (String, Vec<(String, String)>, String);

#[derive(Default)]
pub(crate) struct MockSession {
    connected: AtomicBool,
    subscriptions: Mutex<Vec<String>>,
    sent: Mutex<Vec<SentMessage>>,
    listener: Mutex<Option<Arc<dyn BrokerListener>>>,
}

impl MockSession {
    fn open() -> Self {
        Self { connected: AtomicBool::new(true), ..Default::default() }
    }

    /// Simulate the broker dropping the connection
    pub(crate) fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub(crate) fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub(crate) fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn listener(&self) -> Option<Arc<dyn BrokerListener>> {
        self.listener.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrokerSession for MockSession {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn set_listener(&self, listener: Arc<dyn BrokerListener>) {
        *self.listener.lock().unwrap() = Some(listener);
    }

    async fn subscribe(&self, destination: &str) -> BrokerResult<()> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        if !subscriptions.iter().any(|s| s == destination) {
            subscriptions.push(destination.to_string());
        }
        Ok(())
    }

    async fn send(
        &self,
        destination: &str,
        headers: Vec<(String, String)>,
        body: String,
    ) -> BrokerResult<()> {
        if !self.is_connected() {
            return Err(BrokerError::NotConnected);
        }
        self.sent.lock().unwrap().push((destination.to_string(), headers, body));
        Ok(())
    }

    async fn disconnect(&self) -> BrokerResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MockConnector {
    sessions: Mutex<Vec<Arc<MockSession>>>,
    refuse: AtomicBool,
}

impl MockConnector {
    pub(crate) fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub(crate) fn sessions(&self) -> Vec<Arc<MockSession>> {
        self.sessions.lock().unwrap().clone()
    }

    pub(crate) fn latest(&self) -> Arc<MockSession> {
        self.sessions().last().cloned().expect("no session opened yet")
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> BrokerResult<Arc<dyn BrokerSession>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(BrokerError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "broker unavailable",
            )));
        }

        let session = Arc::new(MockSession::open());
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }
}

/// Listener that only declares topics
pub(crate) struct TopicsOnly(pub Vec<&'static str>);

#[async_trait]
impl BrokerListener for TopicsOnly {
    fn topics(&self) -> Vec<String> {
        self.0.iter().map(|t| t.to_string()).collect()
    }

    async fn on_message(&self, _destination: &str, _body: &str) {}

    async fn on_error(&self, _message: &str, _body: &str) {}

    async fn on_disconnected(&self) {}
}
