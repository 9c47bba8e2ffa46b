use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the matchday sync service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Message broker connection
    pub broker: BrokerConfig,

    /// Broker destinations
    pub topics: TopicConfig,

    /// D11 platform API
    pub d11: D11Config,

    /// Premier League squad API
    pub premier_league: PremierLeagueConfig,

    /// Fotmob match statistics API
    pub fotmob: FotmobConfig,

    /// Archival snapshot directories
    pub archive: ArchiveConfig,

    /// Scheduler configuration
    pub scheduler: SchedulerConfig,

    /// Outbound HTTP settings
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,

    /// Heartbeat we promise to send, in milliseconds (0 disables)
    pub heartbeat_send_ms: u64,

    /// Heartbeat we want to receive, in milliseconds (0 disables)
    pub heartbeat_receive_ms: u64,

    /// How long to wait for the TCP connect and the CONNECTED frame
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Inbound: the platform announces a match that needs updating
    pub active_match: String,

    /// Inbound: liveness probe, logged only
    pub ping: String,

    /// Outbound: squad updates
    pub update_squad: String,

    /// Outbound: match updates
    pub update_match: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct D11Config {
    pub base_url: String,

    /// Template with a `{match_id}` placeholder
    pub match_endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PremierLeagueConfig {
    pub v1_base_url: String,
    pub v2_base_url: String,

    /// Template with `{competition_id}` and `{season}` placeholders
    pub clubs_endpoint: String,

    /// Template with `{competition_id}`, `{season}` and `{team_id}` placeholders
    pub squad_endpoint: String,

    pub competition_id: String,
    pub season: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FotmobConfig {
    pub base_url: String,

    /// Template with a `{match_id}` placeholder
    pub match_details_endpoint: String,

    /// Endpoint handing out fresh `x-mas` tokens, if one is available
    pub authentication_token_url: Option<String>,

    pub token_file: String,
    pub cookies_file: String,

    /// Hours added to the UTC kick-off time before it is published
    pub kickoff_offset_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Directory template with a `{season}` placeholder
    pub squad_directory: String,

    /// Directory template with `{season}` and `{match_week_number}` placeholders
    pub match_directory: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Daily squad sync time (HH:MM, local time)
    pub squad_sync_time: String,

    /// Enable the adaptive token refresh task
    pub enable_token_refresh: bool,

    /// Poll resolution of the run loop
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig {
                host: "localhost".to_string(),
                port: 61616,
                user: "user".to_string(),
                password: "password".to_string(),
                heartbeat_send_ms: 30_000,
                heartbeat_receive_ms: 30_000,
                connect_timeout_secs: 10,
            },
            topics: TopicConfig {
                active_match: "D11::ACTIVE_MATCH".to_string(),
                ping: "D11::PING".to_string(),
                update_squad: "D11::UPDATE_SQUAD".to_string(),
                update_match: "D11::UPDATE_MATCH".to_string(),
            },
            d11: D11Config {
                base_url: "http://localhost:8080/api".to_string(),
                match_endpoint: "/matches/{match_id}".to_string(),
            },
            premier_league: PremierLeagueConfig {
                v1_base_url: "https://sdp-prem-prod.premier-league-prod.pulselive.com/api/v1"
                    .to_string(),
                v2_base_url: "https://sdp-prem-prod.premier-league-prod.pulselive.com/api/v2"
                    .to_string(),
                clubs_endpoint: "/competitions/{competition_id}/seasons/{season}/teams"
                    .to_string(),
                squad_endpoint:
                    "/competitions/{competition_id}/seasons/{season}/teams/{team_id}/squad"
                        .to_string(),
                competition_id: "8".to_string(),
                season: "2025".to_string(),
            },
            fotmob: FotmobConfig {
                base_url: "https://www.fotmob.com/api".to_string(),
                match_details_endpoint: "/matchDetails?matchId={match_id}".to_string(),
                authentication_token_url: None,
                token_file: ".fotmob_api_token".to_string(),
                cookies_file: ".fotmob_cookies".to_string(),
                kickoff_offset_hours: 2,
            },
            archive: ArchiveConfig {
                squad_directory: "data/{season}/squads".to_string(),
                match_directory: "data/{season}/{match_week_number}".to_string(),
            },
            scheduler: SchedulerConfig {
                squad_sync_time: "10:00".to_string(),
                enable_token_refresh: true,
                poll_interval_secs: 1,
            },
            http: HttpConfig { timeout_secs: 30 },
        }
    }
}

impl SyncConfig {
    /// Load configuration: defaults, then an optional file, then environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Self::default())
            .context("Failed to build default configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path.to_path_buf()));
        }

        let mut config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .with_context(|| format!("Failed to load configuration from {path:?}"))?;

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Override fields with environment variables if present
    pub fn apply_env(&mut self) {
        let var = |name: &str| std::env::var(name).ok();

        if let Some(host) = var("D11_MQ_HOST") {
            self.broker.host = host;
        }
        if let Some(port) = var("D11_MQ_PORT") {
            self.broker.port = port.parse().unwrap_or(self.broker.port);
        }
        if let Some(user) = var("D11_MQ_USER") {
            self.broker.user = user;
        }
        if let Some(password) = var("D11_MQ_PASSWORD") {
            self.broker.password = password;
        }

        if let Some(topic) = var("D11_MQ_ACTIVE_MATCH_QUEUE") {
            self.topics.active_match = topic;
        }
        if let Some(topic) = var("D11_PING_QUEUE") {
            self.topics.ping = topic;
        }
        if let Some(topic) = var("D11_MQ_UPDATE_SQUAD_QUEUE") {
            self.topics.update_squad = topic;
        }
        if let Some(topic) = var("D11_MQ_MATCH_DATA_QUEUE") {
            self.topics.update_match = topic;
        }

        if let Some(url) = var("D11_API_BASE_URL") {
            self.d11.base_url = url;
        }
        if let Some(endpoint) = var("D11_API_MATCH_ENDPOINT") {
            self.d11.match_endpoint = endpoint;
        }

        if let Some(url) = var("PREMIER_LEAGUE_API_V1_BASE_URL") {
            self.premier_league.v1_base_url = url;
        }
        if let Some(url) = var("PREMIER_LEAGUE_API_V2_BASE_URL") {
            self.premier_league.v2_base_url = url;
        }
        if let Some(endpoint) = var("PREMIER_LEAGUE_CLUBS_ENDPOINT") {
            self.premier_league.clubs_endpoint = endpoint;
        }
        if let Some(endpoint) = var("PREMIER_LEAGUE_SQUAD_ENDPOINT") {
            self.premier_league.squad_endpoint = endpoint;
        }
        if let Some(id) = var("PREMIER_LEAGUE_DEFAULT_COMPETITION_ID") {
            self.premier_league.competition_id = id;
        }
        if let Some(season) = var("PREMIER_LEAGUE_DEFAULT_SEASON") {
            self.premier_league.season = season;
        }
        if let Some(dir) = var("PREMIER_LEAGUE_SQUAD_DIRECTORY") {
            self.archive.squad_directory = dir;
        }

        if let Some(url) = var("FOTMOB_API_BASE_URL") {
            self.fotmob.base_url = url;
        }
        if let Some(endpoint) = var("FOTMOB_API_MATCH_DETAILS_ENDPOINT") {
            self.fotmob.match_details_endpoint = endpoint;
        }
        if let Some(url) = var("FOTMOB_AUTHENTICATION_TOKEN_URL") {
            self.fotmob.authentication_token_url = Some(url);
        }
        if let Some(dir) = var("FOTMOB_DATA_DIRECTORY") {
            self.archive.match_directory = dir;
        }

        if let Some(time) = var("SQUAD_SYNC_TIME") {
            self.scheduler.squad_sync_time = time;
        }
        if let Some(timeout) = var("HTTP_TIMEOUT_SECS") {
            self.http.timeout_secs = timeout.parse().unwrap_or(self.http.timeout_secs);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.broker.port == 0 {
            anyhow::bail!("Broker port must be greater than 0");
        }
        self.squad_sync_time()?;
        Ok(())
    }

    /// Daily squad sync time as a `NaiveTime`
    pub fn squad_sync_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.scheduler.squad_sync_time, "%H:%M").with_context(|| {
            format!("Invalid squad sync time '{}', expected HH:MM", self.scheduler.squad_sync_time)
        })
    }

    /// HTTP request timeout as Duration
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    /// Scheduler poll resolution as Duration (never below one second)
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.poll_interval_secs.max(1))
    }
}

impl BrokerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Substitute `{name}` placeholders in an endpoint or directory template
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{key}}}"), value)
    })
}
