//! Message broker plumbing: STOMP transport, connection lifecycle and publishing.
//!
//! The connection manager only talks to the `Connector`/`BrokerSession` traits; the STOMP
//! implementation lives in `session`.

pub mod connection;
pub mod frame;
pub mod publisher;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

use crate::error::BrokerResult;
use async_trait::async_trait;
use std::sync::Arc;

pub use connection::{ConnectionManager, ConnectionState};
pub use publisher::Publisher;
pub use session::{StompConnector, StompSession};

/// Receives what the broker pushes to us.
///
/// Callbacks run on the session's reader task, one at a time.
#[async_trait]
pub trait BrokerListener: Send + Sync {
    /// Destinations to subscribe to; each one is also its subscription id
    fn topics(&self) -> Vec<String>;

    async fn on_message(&self, destination: &str, body: &str);

    async fn on_error(&self, message: &str, body: &str);

    /// The connection dropped without us asking for it
    async fn on_disconnected(&self);
}

/// One live broker connection
#[async_trait]
pub trait BrokerSession: Send + Sync {
    fn is_connected(&self) -> bool;

    async fn set_listener(&self, listener: Arc<dyn BrokerListener>);

    /// Subscribe with `id = destination`; subscribing twice is a no-op
    async fn subscribe(&self, destination: &str) -> BrokerResult<()>;

    async fn send(
        &self,
        destination: &str,
        headers: Vec<(String, String)>,
        body: String,
    ) -> BrokerResult<()>;

    async fn disconnect(&self) -> BrokerResult<()>;
}

/// Opens sessions
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> BrokerResult<Arc<dyn BrokerSession>>;
}
