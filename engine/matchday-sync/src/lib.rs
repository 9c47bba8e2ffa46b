//! Matchday Sync Service
//!
//! Pulls football squads and live match data from the Premier League and Fotmob APIs, maps them
//! into the D11 platform's records and publishes them to the D11 message broker. Squads are
//! synced once a day; matches are synced whenever the platform asks for one over the broker.

pub mod archive;
pub mod broker;
pub mod config;
pub mod credentials;
pub mod daemon;
pub mod error;
pub mod listener;
pub mod models;
pub mod providers;
pub mod scheduler;
pub mod service;
pub mod transform;

pub use config::SyncConfig;
pub use daemon::Orchestrator;
pub use error::{BrokerError, DataShapeError};
pub use models::*;
pub use service::SyncService;
