use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Match progress as published to the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Pending,
    Active,
    FullTime,
}

/// Whether a player started the match or entered from the bench
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineupSlot {
    #[serde(rename = "STARTING_LINEUP")]
    Starting,
    #[serde(rename = "SUBSTITUTE")]
    Substitute,
}

/// Canonical match record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    /// Platform match id, filled in once the platform lookup is done
    pub match_id: Option<i64>,

    #[serde(rename = "whoscoredId")]
    pub stat_source_id: i64,

    #[serde(rename = "homeTeamWhoscoredId")]
    pub home_team_stat_source_id: i64,

    pub home_team_name: String,

    #[serde(rename = "awayTeamWhoscoredId")]
    pub away_team_stat_source_id: i64,

    pub away_team_name: String,

    /// Kick-off, "YYYY-MM-DD HH:MM"
    pub datetime: String,

    /// "FT", "N/A" or the live clock
    pub elapsed: String,

    pub status: MatchStatus,

    #[serde(default)]
    pub goals: Vec<Goal>,

    #[serde(default)]
    pub players: Vec<PlayerMatchStat>,
}

/// A goal event, in match order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    #[serde(rename = "playerWhoscoredId")]
    pub player_stat_source_id: i64,

    pub player_name: String,

    #[serde(rename = "teamWhoscoredId")]
    pub team_stat_source_id: i64,

    pub team_name: String,

    /// Minute of the goal
    pub time: i32,

    pub penalty: bool,
    pub own_goal: bool,
}

/// Per-player statistics for a single match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMatchStat {
    /// Platform player id, resolved downstream
    pub player_id: Option<i64>,

    #[serde(rename = "playerWhoscoredId")]
    pub player_stat_source_id: i64,

    pub player_name: String,

    /// Platform country, always 1 until the platform resolves it
    pub country_id: i64,

    /// Platform position, always 0 until the platform resolves it
    pub position_id: i64,

    #[serde(rename = "teamWhoscoredId")]
    pub team_stat_source_id: i64,

    pub team_name: String,

    pub lineup: LineupSlot,

    /// 0 when the player was not substituted on
    pub substitution_on_time: i32,

    /// 0 when the player was not substituted off
    pub substitution_off_time: i32,

    pub goals: u32,
    pub goal_assists: u32,
    pub own_goals: u32,

    /// Goals scored by the opposing side, the same for every player on a team
    pub goals_conceded: u32,

    /// 0 means no yellow card
    pub yellow_card_time: i32,

    /// 0 means no red card
    pub red_card_time: i32,

    pub man_of_the_match: bool,
    pub shared_man_of_the_match: bool,

    /// Provider rating ×100, e.g. 7.25 → 725
    pub rating: i32,

    pub played_position: String,

    /// Not provided by the match feed, published as 0
    pub height: i32,
}

impl PlayerMatchStat {
    pub fn new(
        player_stat_source_id: i64,
        player_name: String,
        team_stat_source_id: i64,
        team_name: String,
        lineup: LineupSlot,
    ) -> Self {
        Self {
            player_id: None,
            player_stat_source_id,
            player_name,
            country_id: 1,
            position_id: 0,
            team_stat_source_id,
            team_name,
            lineup,
            substitution_on_time: 0,
            substitution_off_time: 0,
            goals: 0,
            goal_assists: 0,
            own_goals: 0,
            goals_conceded: 0,
            yellow_card_time: 0,
            red_card_time: 0,
            man_of_the_match: false,
            shared_man_of_the_match: false,
            rating: 0,
            played_position: "N/A".to_string(),
            height: 0,
        }
    }
}

/// Canonical squad record for one team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Squad {
    pub id: i64,
    pub name: String,
    pub players: Vec<SquadPlayer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SquadPlayer {
    pub id: i64,
    pub name: String,
    pub shirt_number: Option<u32>,
    pub position: String,
    pub nationality: Option<String>,
    pub photo_id: i64,
}

/// Outbound: `{teamData: Squad}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSquadMessage {
    pub team_data: Squad,
}

/// Outbound: `{matchData: Match, finish: bool}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMatchMessage {
    pub match_data: Match,
    pub finish: bool,
}

/// Inbound: `{matchId, finish}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveMatch {
    #[serde(deserialize_with = "lenient_id")]
    pub match_id: i64,

    #[serde(default)]
    pub finish: bool,
}

/// Outcome of a single ingestion run
#[derive(Debug, Clone, Serialize)]
pub enum SyncEvent {
    /// Squads published
    SquadsUpdated {
        teams: usize,
        players: usize,
        timestamp: DateTime<Utc>,
    },

    /// Match published
    MatchUpdated {
        match_id: i64,
        status: MatchStatus,
        timestamp: DateTime<Utc>,
    },

    /// A provider returned nothing usable
    FetchFailed {
        endpoint: String,
        timestamp: DateTime<Utc>,
    },
}

impl SyncEvent {
    pub fn fetch_failed(endpoint: impl Into<String>) -> Self {
        Self::FetchFailed { endpoint: endpoint.into(), timestamp: Utc::now() }
    }
}

/// Provider ids show up as JSON numbers or as numeric strings
pub fn lenient_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Int(i64),
        Float(f64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Int(id) => Ok(id),
        RawId::Float(id) if id.fract() == 0.0 => Ok(id as i64),
        RawId::Float(id) => Err(serde::de::Error::custom(format!("non-integer id {id}"))),
        RawId::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("non-numeric id '{text}'"))),
    }
}

/// `lenient_id` for optional fields
pub fn lenient_id_opt<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "lenient_id")] i64);

    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(id)| id))
}
