use crate::models::{lenient_id, lenient_id_opt};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Root of the match details payload.
///
/// `general` and `header` are always present. `content` only matters once the match has
/// started, so its absence is checked by the transform rather than here.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMatchDetails {
    pub general: RawGeneral,
    pub header: RawHeader,
    #[serde(default)]
    pub content: Option<RawContent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGeneral {
    #[serde(deserialize_with = "lenient_id")]
    pub match_id: i64,

    pub home_team: RawTeam,
    pub away_team: RawTeam,

    /// e.g. "Sat, Aug 16, 2025, 14:00 UTC"
    #[serde(rename = "matchTimeUTC", default)]
    pub match_time_utc: Option<String>,

    /// e.g. "2025-08-16T14:00:00.000Z"
    #[serde(rename = "matchTimeUTCDate", default)]
    pub match_time_utc_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTeam {
    #[serde(deserialize_with = "lenient_id")]
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawHeader {
    pub status: RawStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStatus {
    #[serde(default)]
    pub finished: bool,
    #[serde(default)]
    pub started: bool,
    #[serde(default)]
    pub live_time: Option<RawLiveTime>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLiveTime {
    #[serde(default)]
    pub short: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContent {
    #[serde(default)]
    pub match_facts: Option<RawMatchFacts>,

    #[serde(default)]
    pub lineup: Option<RawLineup>,

    /// Per-player stat blocks keyed by player id. Kept loose so one odd block does not
    /// sink the whole payload.
    #[serde(default)]
    pub player_stats: Option<HashMap<String, Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMatchFacts {
    #[serde(default)]
    pub events: Option<RawEventList>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEventList {
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

/// One entry of the match facts timeline (goals, cards, substitutions, ...)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub time: Option<i32>,

    #[serde(default)]
    pub player: Option<RawEventPlayer>,

    #[serde(default)]
    pub is_home: bool,

    #[serde(default)]
    pub goal_description_key: Option<String>,

    #[serde(default)]
    pub card: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEventPlayer {
    #[serde(default, deserialize_with = "lenient_id_opt")]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLineup {
    pub home_team: RawLineupTeam,
    pub away_team: RawLineupTeam,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLineupTeam {
    #[serde(default)]
    pub starters: Vec<RawLineupPlayer>,
    #[serde(default)]
    pub subs: Vec<RawLineupPlayer>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLineupPlayer {
    #[serde(deserialize_with = "lenient_id")]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub performance: Option<RawPerformance>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPerformance {
    /// One decimal only, the stat feed is preferred when present
    #[serde(default)]
    pub rating: Option<f64>,

    #[serde(default)]
    pub events: Vec<RawPerformanceEvent>,

    #[serde(default)]
    pub substitution_events: Vec<RawSubstitutionEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPerformanceEvent {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSubstitutionEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub time: Option<i32>,
}

/// A single player's entry in `content.playerStats`
#[derive(Debug, Clone, Deserialize)]
pub struct RawPlayerStatBlock {
    #[serde(default)]
    pub stats: Vec<RawStatSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawStatSection {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub stats: HashMap<String, Value>,
}

impl RawPlayerStatBlock {
    /// The two-decimal "FotMob rating" from the `top_stats` section
    pub fn fine_rating(&self) -> Option<f64> {
        self.stats
            .iter()
            .find(|section| section.key.as_deref() == Some("top_stats"))?
            .stats
            .get("FotMob rating")?
            .get("stat")?
            .get("value")?
            .as_f64()
    }
}
