use crate::config::{fill_template, D11Config};
use crate::models::lenient_id;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use super::{get_json, http_client, PlatformSource};

/// Client for the D11 platform API
pub struct D11Client {
    config: D11Config,
    client: Client,
}

impl D11Client {
    pub fn new(config: D11Config, timeout: Duration) -> Result<Self> {
        Ok(Self { config, client: http_client(timeout)? })
    }
}

#[async_trait]
impl PlatformSource for D11Client {
    async fn fetch_platform_match(&self, match_id: i64) -> Option<Value> {
        let endpoint =
            fill_template(&self.config.match_endpoint, &[("match_id", &match_id.to_string())]);
        let url = format!("{}{}", self.config.base_url, endpoint);
        get_json(&self.client, &url, HeaderMap::new(), "D11").await
    }
}

/// The platform's match record, as returned by the match endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformMatch {
    #[serde(deserialize_with = "lenient_id")]
    pub id: i64,

    /// Match id at the stats provider
    #[serde(rename = "whoscoredId", deserialize_with = "lenient_id")]
    pub stat_source_id: i64,

    pub match_week: PlatformMatchWeek,
    pub home_team: PlatformTeam,
    pub away_team: PlatformTeam,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformMatchWeek {
    pub match_week_number: u32,
    pub season: PlatformSeason,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformSeason {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformTeam {
    pub name: String,
}
