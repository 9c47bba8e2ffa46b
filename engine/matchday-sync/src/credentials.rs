//! Credentials for authenticated Fotmob requests.
//!
//! The `x-mas` token and the cookies live in two small files next to the service. They are
//! refreshed from a token endpoint on a jittered schedule, or imported from a HAR capture
//! taken in a browser session.

use crate::config::FotmobConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Name of the token header the match details endpoint expects
pub const TOKEN_HEADER: &str = "x-mas";

/// Supplies header values for authenticated fetches
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn auth_headers(&self) -> Vec<(String, String)>;
}

/// File backed token and cookie store
pub struct TokenStore {
    token_file: PathBuf,
    cookies_file: PathBuf,
    token_url: Option<String>,
    client: Client,
}

impl TokenStore {
    pub fn new(config: &FotmobConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            token_file: PathBuf::from(&config.token_file),
            cookies_file: PathBuf::from(&config.cookies_file),
            token_url: config.authentication_token_url.clone(),
            client,
        })
    }

    /// Read the current token
    pub fn read_token(&self) -> Result<String> {
        let token = fs::read_to_string(&self.token_file)
            .with_context(|| format!("Failed to read token file {:?}", self.token_file))?;

        let token = token.trim();
        if token.is_empty() {
            anyhow::bail!("Token file {:?} is empty", self.token_file);
        }
        Ok(token.to_string())
    }

    /// Replace the stored token
    pub fn write_token(&self, token: &str) -> Result<()> {
        fs::write(&self.token_file, token)
            .with_context(|| format!("Failed to write token file {:?}", self.token_file))
    }

    /// Read cookies from a JSON object file, skipping `#` comment lines
    pub fn read_cookies(&self) -> Result<BTreeMap<String, String>> {
        let text = fs::read_to_string(&self.cookies_file)
            .with_context(|| format!("Failed to read cookies file {:?}", self.cookies_file))?;

        let json: String = text
            .lines()
            .filter(|line| !line.trim_start().starts_with('#'))
            .collect::<Vec<_>>()
            .join("\n");

        let cookies: BTreeMap<String, Value> = serde_json::from_str(&json)
            .with_context(|| format!("Cookies file {:?} is not a JSON object", self.cookies_file))?;

        Ok(cookies
            .into_iter()
            .map(|(name, value)| match value {
                Value::String(s) => (name, s),
                other => (name, other.to_string()),
            })
            .collect())
    }

    /// Fetch a fresh token from the token endpoint and store it.
    ///
    /// Returns `false` when no endpoint is configured.
    pub async fn refresh(&self) -> Result<bool> {
        let Some(url) = &self.token_url else {
            warn!("No token endpoint configured, keeping the current token");
            return Ok(false);
        };

        let response = self.client.get(url).send().await.context("Failed to reach token endpoint")?;
        if !response.status().is_success() {
            anyhow::bail!("Token endpoint returned status: {}", response.status());
        }

        let body: Value = response.json().await.context("Token endpoint returned invalid JSON")?;
        let token = body
            .get(TOKEN_HEADER)
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .with_context(|| format!("No '{TOKEN_HEADER}' field in token endpoint response"))?;

        self.write_token(token)?;
        info!("Fotmob API token refreshed in {:?}", self.token_file);
        Ok(true)
    }

    /// Import the token from a HAR capture, then delete the capture.
    ///
    /// Returns `false` when the capture does not exist or holds no token.
    pub fn import_har(&self, har_path: &Path) -> Result<bool> {
        if !har_path.exists() {
            debug!("HAR file {:?} not found", har_path);
            return Ok(false);
        }

        let token = token_from_har(har_path)?;
        let imported = match token {
            Some(token) => {
                self.write_token(&token)?;
                info!("Fotmob API token imported from {:?}", har_path);
                true
            }
            None => {
                error!("Fotmob token not found in {:?}", har_path);
                false
            }
        };

        fs::remove_file(har_path).with_context(|| format!("Failed to remove {har_path:?}"))?;
        Ok(imported)
    }
}

#[async_trait]
impl CredentialSource for TokenStore {
    async fn auth_headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::new();

        match self.read_token() {
            Ok(token) => headers.push((TOKEN_HEADER.to_string(), token)),
            Err(e) => error!("Fotmob API token unavailable: {:#}", e),
        }

        match self.read_cookies() {
            Ok(cookies) if !cookies.is_empty() => {
                let cookie = cookies
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect::<Vec<_>>()
                    .join("; ");
                headers.push(("Cookie".to_string(), cookie));
            }
            Ok(_) => {}
            Err(e) => debug!("No Fotmob cookies: {:#}", e),
        }

        headers
    }
}

#[derive(Debug, Deserialize)]
struct Har {
    log: HarLog,
}

#[derive(Debug, Deserialize)]
struct HarLog {
    #[serde(default)]
    entries: Vec<HarEntry>,
}

#[derive(Debug, Deserialize)]
struct HarEntry {
    request: HarRequest,
}

#[derive(Debug, Deserialize)]
struct HarRequest {
    url: String,
    #[serde(default)]
    headers: Vec<HarHeader>,
}

#[derive(Debug, Deserialize)]
struct HarHeader {
    name: String,
    value: String,
}

/// Token header of the last match details request in a HAR capture
pub fn token_from_har(path: &Path) -> Result<Option<String>> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {path:?}"))?;
    let har: Har = serde_json::from_str(&text).with_context(|| format!("{path:?} is not a HAR file"))?;

    Ok(har
        .log
        .entries
        .iter()
        .filter(|entry| entry.request.url.contains("matchDetails"))
        .flat_map(|entry| entry.request.headers.iter())
        .filter(|header| header.name.eq_ignore_ascii_case(TOKEN_HEADER))
        .map(|header| header.value.clone())
        .last())
}
