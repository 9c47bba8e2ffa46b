//! Error types for the transform engine and the broker transport

use thiserror::Error;

/// A raw provider record that cannot be mapped onto a canonical record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unmappable {entity}: {reason}")]
pub struct DataShapeError {
    /// What was being mapped, e.g. "match 4506263" or "squad player 223094"
    pub entity: String,

    /// Which field was missing or malformed
    pub reason: String,
}

impl DataShapeError {
    pub fn new(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { entity: entity.into(), reason: reason.into() }
    }

    /// Decode a typed raw structure out of a parsed payload
    pub fn decode<T: serde::de::DeserializeOwned>(
        entity: impl Into<String>,
        value: &serde_json::Value,
    ) -> Result<T, Self> {
        T::deserialize(value).map_err(|e| Self::new(entity, e.to_string()))
    }
}

/// Result type alias for broker operations
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

/// Errors raised by the broker connection and its transport
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Socket level failures
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record serialization failures
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Connect or handshake did not finish in time
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// The broker answered CONNECT with an ERROR frame
    #[error("Connection rejected by broker: {0}")]
    Rejected(String),

    /// Malformed or unexpected frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The session is closed
    #[error("Not connected to broker")]
    NotConnected,
}

impl BrokerError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }
}
