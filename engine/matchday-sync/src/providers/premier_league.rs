use crate::config::{fill_template, PremierLeagueConfig};
use crate::models::lenient_id;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::error;

use super::{get_json, http_client, Competition, SquadSource};

/// Client for the Premier League squad API
pub struct PremierLeagueClient {
    config: PremierLeagueConfig,
    client: Client,
}

impl PremierLeagueClient {
    pub fn new(config: PremierLeagueConfig, timeout: Duration) -> Result<Self> {
        Ok(Self { config, client: http_client(timeout)? })
    }
}

#[async_trait]
impl SquadSource for PremierLeagueClient {
    async fn fetch_teams(&self, competition: &Competition) -> Option<Vec<Value>> {
        let endpoint = fill_template(
            &self.config.clubs_endpoint,
            &[
                ("competition_id", competition.competition_id.as_str()),
                ("season", competition.season.as_str()),
            ],
        );
        let url = format!("{}{}", self.config.v1_base_url, endpoint);

        let payload = get_json(&self.client, &url, HeaderMap::new(), "Premier League").await?;
        unwrap_list(payload, "data", &url)
    }

    async fn fetch_squad(&self, competition: &Competition, team_id: i64) -> Option<Vec<Value>> {
        let team_id = team_id.to_string();
        let endpoint = fill_template(
            &self.config.squad_endpoint,
            &[
                ("competition_id", competition.competition_id.as_str()),
                ("season", competition.season.as_str()),
                ("team_id", team_id.as_str()),
            ],
        );
        let url = format!("{}{}", self.config.v2_base_url, endpoint);

        let payload = get_json(&self.client, &url, HeaderMap::new(), "Premier League").await?;
        unwrap_list(payload, "players", &url)
    }
}

/// Pull the list out of a `{<key>: [...]}` envelope
fn unwrap_list(mut payload: Value, key: &str, url: &str) -> Option<Vec<Value>> {
    match payload.get_mut(key).map(Value::take) {
        Some(Value::Array(items)) => Some(items),
        _ => {
            error!("Premier League response from {} has no '{}' list", url, key);
            None
        }
    }
}

/// A participating club
#[derive(Debug, Clone, Deserialize)]
pub struct RawClub {
    #[serde(deserialize_with = "lenient_id")]
    pub id: i64,
    pub name: String,
}

/// A squad member as the squad endpoint returns it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSquadPlayer {
    #[serde(deserialize_with = "lenient_id")]
    pub id: i64,

    #[serde(default)]
    pub name: Option<RawPlayerName>,

    #[serde(default)]
    pub shirt_num: Option<u32>,

    pub position: String,

    #[serde(default)]
    pub country: Option<RawCountry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPlayerName {
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default)]
    pub first: Option<String>,
    #[serde(default)]
    pub last: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCountry {
    #[serde(default)]
    pub country: Option<String>,
}
