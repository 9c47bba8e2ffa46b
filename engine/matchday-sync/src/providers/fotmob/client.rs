use crate::config::{fill_template, FotmobConfig};
use crate::credentials::CredentialSource;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::providers::{get_json, http_client, MatchSource};

/// Client for the Fotmob match details API
pub struct FotmobClient {
    config: FotmobConfig,
    client: Client,
    credentials: Arc<dyn CredentialSource>,
}

impl FotmobClient {
    pub fn new(
        config: FotmobConfig,
        timeout: Duration,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self> {
        Ok(Self { config, client: http_client(timeout)?, credentials })
    }

    async fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        for (name, value) in self.credentials.auth_headers().await {
            match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!("Skipping credential header '{}' with invalid characters", name),
            }
        }

        headers
    }
}

#[async_trait]
impl MatchSource for FotmobClient {
    async fn fetch_match(&self, stat_source_id: i64) -> Option<Value> {
        let endpoint = fill_template(
            &self.config.match_details_endpoint,
            &[("match_id", &stat_source_id.to_string())],
        );
        let url = format!("{}{}", self.config.base_url, endpoint);

        get_json(&self.client, &url, self.headers().await, "Fotmob").await
    }
}
