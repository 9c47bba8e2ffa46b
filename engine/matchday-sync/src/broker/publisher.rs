use super::ConnectionManager;
use crate::config::TopicConfig;
use crate::error::BrokerResult;
use crate::models::{UpdateMatchMessage, UpdateSquadMessage};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Serializes records and sends them through the managed connection.
///
/// Fire-and-forget: nothing is acknowledged or retried, send errors go back to the caller.
pub struct Publisher {
    connection: Arc<ConnectionManager>,
    topics: TopicConfig,
}

impl Publisher {
    pub fn new(connection: Arc<ConnectionManager>, topics: TopicConfig) -> Self {
        Self { connection, topics }
    }

    /// Publish a record as indented JSON
    pub async fn publish<T: Serialize + ?Sized>(&self, topic: &str, record: &T) -> BrokerResult<()> {
        let body = serde_json::to_string_pretty(record)?;
        let size = body.len();

        let session = self.connection.get_connection().await?;
        session
            .send(
                topic,
                vec![("content-type".to_string(), "application/json".to_string())],
                body,
            )
            .await?;

        debug!("Published {} bytes to {}", size, topic);
        Ok(())
    }

    pub async fn send_update_squad(&self, message: &UpdateSquadMessage) -> BrokerResult<()> {
        self.publish(&self.topics.update_squad, message).await
    }

    pub async fn send_update_match(&self, message: &UpdateMatchMessage) -> BrokerResult<()> {
        self.publish(&self.topics.update_match, message).await
    }

    /// Smoke test message on the ping topic
    pub async fn send_ping(&self) -> BrokerResult<()> {
        self.publish(&self.topics.ping, &json!({ "ping": true })).await
    }
}
