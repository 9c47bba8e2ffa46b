//! Outbound clients for the stats providers and the D11 platform.
//!
//! Every fetch either returns the parsed JSON payload or `None`. Failures are logged here
//! and never surface as errors, so an ingestion can skip cleanly. Mapping the payload onto
//! typed raw structures is the transform engine's job.

pub mod d11;
pub mod fotmob;
pub mod premier_league;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

pub use d11::D11Client;
pub use fotmob::FotmobClient;
pub use premier_league::PremierLeagueClient;

/// Competition and season a squad sync runs against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Competition {
    pub competition_id: String,
    pub season: String,
}

/// Source of teams and squads
#[async_trait]
pub trait SquadSource: Send + Sync {
    /// Raw team references participating in the competition
    async fn fetch_teams(&self, competition: &Competition) -> Option<Vec<Value>>;

    /// Raw player records for one team
    async fn fetch_squad(&self, competition: &Competition, team_id: i64) -> Option<Vec<Value>>;
}

/// Source of live match details
#[async_trait]
pub trait MatchSource: Send + Sync {
    async fn fetch_match(&self, stat_source_id: i64) -> Option<Value>;
}

/// The platform's own view of a match (ids, match week, team names)
#[async_trait]
pub trait PlatformSource: Send + Sync {
    async fn fetch_platform_match(&self, match_id: i64) -> Option<Value>;
}

/// Build an HTTP client with the configured timeout
pub(crate) fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder().timeout(timeout).build().context("Failed to create HTTP client")
}

/// GET a JSON document, logging and swallowing any failure
pub(crate) async fn get_json(
    client: &Client,
    url: &str,
    headers: HeaderMap,
    provider: &str,
) -> Option<Value> {
    debug!("Fetching {} data from {}", provider, url);

    let result: Result<Value> = async {
        let response = client.get(url).headers(headers).send().await.context("request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("API request failed with status: {}", status);
        }

        response.json::<Value>().await.context("response is not valid JSON")
    }
    .await;

    match result {
        Ok(value) => Some(value),
        Err(e) => {
            error!("Error fetching {} data from {}: {:#}", provider, url, e);
            None
        }
    }
}
