use crate::error::DataShapeError;
use crate::models::{Goal, LineupSlot, Match, MatchStatus, PlayerMatchStat};
use crate::providers::fotmob::{
    RawEvent, RawGeneral, RawLineupPlayer, RawLineupTeam, RawMatchDetails, RawPlayerStatBlock,
    RawStatus,
};
use chrono::{DateTime, Duration, NaiveDateTime};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Rating given to players the provider has not rated yet
pub const DEFAULT_RATING: i32 = 600;

const HUMAN_KICKOFF_FORMAT: &str = "%a, %b %d, %Y, %H:%M";

/// Map a Fotmob match details payload onto a `Match`.
///
/// The kick-off time is shifted by `kickoff_offset_hours`. A match that has not started
/// comes back with no goals and no players.
pub fn transform_match(raw: &Value, kickoff_offset_hours: i64) -> Result<Match, DataShapeError> {
    let entity = match raw.pointer("/general/matchId") {
        Some(Value::String(id)) => format!("match {id}"),
        Some(id) => format!("match {id}"),
        None => "match".to_string(),
    };

    let details: RawMatchDetails = DataShapeError::decode(&entity, raw)?;
    let general = &details.general;

    let datetime = kickoff_time(general, kickoff_offset_hours)
        .ok_or_else(|| DataShapeError::new(&entity, "no parseable kick-off time"))?;
    let (elapsed, status) = resolve_status(&details.header.status)
        .ok_or_else(|| DataShapeError::new(&entity, "started match has no live time"))?;

    let mut record = Match {
        match_id: None,
        stat_source_id: general.match_id,
        home_team_stat_source_id: general.home_team.id,
        home_team_name: general.home_team.name.clone(),
        away_team_stat_source_id: general.away_team.id,
        away_team_name: general.away_team.name.clone(),
        datetime,
        elapsed,
        status,
        goals: Vec::new(),
        players: Vec::new(),
    };

    if status == MatchStatus::Pending {
        return Ok(record);
    }

    let content = details
        .content
        .as_ref()
        .ok_or_else(|| DataShapeError::new(&entity, "started match has no content"))?;
    let lineup = content
        .lineup
        .as_ref()
        .ok_or_else(|| DataShapeError::new(&entity, "started match has no lineup"))?;

    let events = content
        .match_facts
        .as_ref()
        .and_then(|facts| facts.events.as_ref())
        .map(|list| list.events.as_slice())
        .unwrap_or_default();

    let timeline = scan_events(events, general).map_err(|reason| DataShapeError::new(&entity, reason))?;
    let ratings = fine_ratings(content.player_stats.as_ref());

    let home = Side {
        id: general.home_team.id,
        name: &general.home_team.name,
        conceded: timeline.away_goals,
    };
    let away = Side {
        id: general.away_team.id,
        name: &general.away_team.name,
        conceded: timeline.home_goals,
    };

    let mut home_players = side_players(&lineup.home_team, &home, &timeline.cards, &ratings);
    let mut away_players = side_players(&lineup.away_team, &away, &timeline.cards, &ratings);
    award_man_of_the_match(&mut home_players);
    award_man_of_the_match(&mut away_players);

    record.goals = timeline.goals;
    record.players = home_players;
    record.players.append(&mut away_players);

    debug!(
        "Transformed match {} ({} - {}): {} goals, {} players",
        record.stat_source_id,
        timeline.home_goals,
        timeline.away_goals,
        record.goals.len(),
        record.players.len()
    );

    Ok(record)
}

/// Provider kick-off time plus the offset, as "YYYY-MM-DD HH:MM"
fn kickoff_time(general: &RawGeneral, offset_hours: i64) -> Option<String> {
    let human = general.match_time_utc.as_deref().and_then(|text| {
        let text = text.trim();
        let text = text.strip_suffix("UTC").unwrap_or(text).trim_end();
        NaiveDateTime::parse_from_str(text, HUMAN_KICKOFF_FORMAT).ok()
    });

    let kickoff = human.or_else(|| {
        general
            .match_time_utc_date
            .as_deref()
            .and_then(|text| DateTime::parse_from_rfc3339(text.trim()).ok())
            .map(|dt| dt.naive_utc())
    })?;

    let local = kickoff + Duration::hours(offset_hours);
    Some(local.format("%Y-%m-%d %H:%M").to_string())
}

/// Display string and status; `None` when a started match carries no live clock
fn resolve_status(status: &RawStatus) -> Option<(String, MatchStatus)> {
    if status.finished {
        return Some(("FT".to_string(), MatchStatus::FullTime));
    }
    if !status.started {
        return Some(("N/A".to_string(), MatchStatus::Pending));
    }

    let clock = status.live_time.as_ref()?.short.as_deref()?;
    let clock: String = clock.chars().filter(|c| !matches!(c, '\u{2019}' | '\'' | '\u{2032}')).collect();
    Some((clock.trim().to_string(), MatchStatus::Active))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct CardTimes {
    yellow: i32,
    red: i32,
}

#[derive(Debug, Default)]
struct Timeline {
    goals: Vec<Goal>,
    home_goals: u32,
    away_goals: u32,
    cards: HashMap<i64, CardTimes>,
}

/// Walk the match facts in source order collecting goals and cards
fn scan_events(events: &[RawEvent], general: &RawGeneral) -> Result<Timeline, String> {
    let mut timeline = Timeline::default();

    for event in events {
        match event.kind.as_str() {
            "Goal" => {
                let player = event.player.as_ref();
                let player_id = player
                    .and_then(|p| p.id)
                    .ok_or_else(|| format!("goal at minute {:?} has no scorer", event.time))?;

                let team = if event.is_home {
                    timeline.home_goals += 1;
                    &general.home_team
                } else {
                    timeline.away_goals += 1;
                    &general.away_team
                };

                let description = event.goal_description_key.as_deref();
                timeline.goals.push(Goal {
                    player_stat_source_id: player_id,
                    player_name: player.and_then(|p| p.name.clone()).unwrap_or_default(),
                    team_stat_source_id: team.id,
                    team_name: team.name.clone(),
                    time: event.time.unwrap_or(0),
                    penalty: description == Some("penalty"),
                    own_goal: description == Some("owngoal"),
                });
            }
            "Card" => {
                let Some(player_id) = event.player.as_ref().and_then(|p| p.id) else {
                    warn!("Ignoring card at minute {:?} with no player", event.time);
                    continue;
                };

                // Later cards of the same colour overwrite earlier ones
                let times = timeline.cards.entry(player_id).or_default();
                let minute = event.time.unwrap_or(0);
                if event.card.as_deref() == Some("Yellow") {
                    times.yellow = minute;
                } else {
                    times.red = minute;
                }
            }
            _ => {}
        }
    }

    Ok(timeline)
}

/// Two-decimal ratings from the per-player stat feed, keyed by player id.
///
/// Blocks that do not parse are skipped.
fn fine_ratings(player_stats: Option<&HashMap<String, Value>>) -> HashMap<i64, f64> {
    let Some(player_stats) = player_stats else {
        return HashMap::new();
    };

    player_stats
        .iter()
        .filter_map(|(key, block)| {
            let id: i64 = key.trim().parse().ok()?;
            let block: RawPlayerStatBlock = serde_json::from_value(block.clone()).ok()?;
            Some((id, block.fine_rating()?))
        })
        .collect()
}

fn scale_rating(rating: f64) -> i32 {
    (rating * 100.0).round() as i32
}

struct Side<'a> {
    id: i64,
    name: &'a str,
    conceded: u32,
}

/// Starters then substitutes for one side
fn side_players(
    team: &RawLineupTeam,
    side: &Side<'_>,
    cards: &HashMap<i64, CardTimes>,
    ratings: &HashMap<i64, f64>,
) -> Vec<PlayerMatchStat> {
    let starters = team.starters.iter().map(|p| (p, LineupSlot::Starting));
    let subs = team.subs.iter().map(|p| (p, LineupSlot::Substitute));

    starters
        .chain(subs)
        .map(|(raw, slot)| player_stat(raw, slot, side, cards, ratings))
        .collect()
}

fn player_stat(
    raw: &RawLineupPlayer,
    lineup: LineupSlot,
    side: &Side<'_>,
    cards: &HashMap<i64, CardTimes>,
    ratings: &HashMap<i64, f64>,
) -> PlayerMatchStat {
    let mut player =
        PlayerMatchStat::new(raw.id, raw.name.clone(), side.id, side.name.to_string(), lineup);
    player.goals_conceded = side.conceded;

    let performance = raw.performance.as_ref();

    player.rating = ratings
        .get(&raw.id)
        .copied()
        .or_else(|| performance.and_then(|p| p.rating))
        .map(scale_rating)
        .unwrap_or(match lineup {
            LineupSlot::Starting => DEFAULT_RATING,
            LineupSlot::Substitute => 0,
        });

    if let Some(card) = cards.get(&raw.id) {
        player.yellow_card_time = card.yellow;
        player.red_card_time = card.red;
    }

    if let Some(performance) = performance {
        for event in &performance.events {
            match event.kind.as_str() {
                "goal" => player.goals += 1,
                "assist" => player.goal_assists += 1,
                "ownGoal" => player.own_goals += 1,
                _ => {}
            }
        }

        for event in &performance.substitution_events {
            match event.kind.as_str() {
                "subIn" => {
                    player.substitution_on_time = event.time.unwrap_or(0);
                    // Short cameos go unrated
                    if player.rating == 0 {
                        player.rating = DEFAULT_RATING;
                    }
                }
                "subOut" => player.substitution_off_time = event.time.unwrap_or(0),
                _ => {}
            }
        }
    }

    player
}

/// Flag the top rated player of one side, or every player sharing the top rating
fn award_man_of_the_match(players: &mut [PlayerMatchStat]) {
    let mut best = 0;
    let mut leaders: Vec<usize> = Vec::new();

    for (index, player) in players.iter().enumerate() {
        if player.rating <= 0 || player.rating < best {
            continue;
        }
        if player.rating > best {
            best = player.rating;
            leaders.clear();
        }
        leaders.push(index);
    }

    match leaders.as_slice() {
        [] => {}
        [only] => players[*only].man_of_the_match = true,
        tied => {
            for &index in tied {
                players[index].shared_man_of_the_match = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lineup_player(id: i64, name: &str, performance: Value) -> Value {
        json!({ "id": id, "name": name, "performance": performance })
    }

    fn rating_block(rating: f64) -> Value {
        json!({ "stats": [
            { "key": "top_stats", "stats": { "FotMob rating": { "stat": { "value": rating, "type": "double" } } } },
            { "key": "attack", "stats": {} }
        ] })
    }

    fn finished_payload() -> Value {
        json!({
            "general": {
                "matchId": "4506263",
                "homeTeam": { "id": 8650, "name": "Liverpool" },
                "awayTeam": { "id": 8678, "name": "Bournemouth" },
                "matchTimeUTC": "Fri, Aug 15, 2025, 19:00 UTC",
                "matchTimeUTCDate": "2025-08-15T19:00:00.000Z"
            },
            "header": { "status": { "finished": true, "started": true, "liveTime": { "short": "FT" } } },
            "content": {
                "matchFacts": { "events": { "events": [
                    { "type": "Goal", "time": 37, "isHome": true, "player": { "id": 1, "name": "Home Starter" } },
                    { "type": "Card", "time": 40, "card": "Yellow", "player": { "id": 11, "name": "Away Starter" } },
                    { "type": "Goal", "time": 64, "isHome": false, "player": { "id": 11, "name": "Away Starter" },
                      "goalDescriptionKey": "penalty" },
                    { "type": "Substitution", "time": 70 },
                    { "type": "Goal", "time": 88, "isHome": true, "player": { "id": 12, "name": "Away Defender" },
                      "goalDescriptionKey": "owngoal" },
                    { "type": "Card", "time": 90, "card": "YellowRed", "player": { "id": 11, "name": "Away Starter" } }
                ] } },
                "lineup": {
                    "homeTeam": {
                        "starters": [
                            lineup_player(1, "Home Starter", json!({ "rating": 7.9, "events": [{ "type": "goal" }],
                                "substitutionEvents": [{ "type": "subOut", "time": 75 }] })),
                            lineup_player(2, "Home Keeper", json!({}))
                        ],
                        "subs": [
                            lineup_player(3, "Home Sub", json!({ "substitutionEvents": [{ "type": "subIn", "time": 75 }] })),
                            lineup_player(4, "Home Unused", json!({}))
                        ]
                    },
                    "awayTeam": {
                        "starters": [
                            lineup_player(11, "Away Starter", json!({ "events": [{ "type": "goal" }] })),
                            { "id": 12, "name": "Away Defender" }
                        ],
                        "subs": []
                    }
                },
                "playerStats": {
                    "1": rating_block(8.21),
                    "11": rating_block(7.29),
                    "12": rating_block(5.2),
                    "999": { "stats": "unexpected" }
                }
            }
        })
    }

    fn player<'a>(record: &'a Match, id: i64) -> &'a PlayerMatchStat {
        record.players.iter().find(|p| p.player_stat_source_id == id).unwrap()
    }

    #[test]
    fn test_pending_match_short_circuits() {
        let raw = json!({
            "general": {
                "matchId": 4506270,
                "homeTeam": { "id": 1, "name": "A" },
                "awayTeam": { "id": 2, "name": "B" },
                "matchTimeUTC": "Sat, Aug 16, 2025, 14:00 UTC"
            },
            "header": { "status": { "finished": false, "started": false } }
        });

        let record = transform_match(&raw, 2).unwrap();
        assert_eq!(record.status, MatchStatus::Pending);
        assert_eq!(record.elapsed, "N/A");
        assert_eq!(record.datetime, "2025-08-16 16:00");
        assert!(record.goals.is_empty());
        assert!(record.players.is_empty());
    }

    #[test]
    fn test_finished_match() {
        let record = transform_match(&finished_payload(), 2).unwrap();

        assert_eq!(record.stat_source_id, 4506263);
        assert_eq!(record.status, MatchStatus::FullTime);
        assert_eq!(record.elapsed, "FT");
        assert_eq!(record.datetime, "2025-08-15 21:00");
        assert_eq!(record.match_id, None);

        assert_eq!(record.goals.len(), 3);
        assert_eq!(record.goals[0].team_name, "Liverpool");
        assert!(record.goals[1].penalty);
        assert_eq!(record.goals[1].team_stat_source_id, 8678);
        assert!(record.goals[2].own_goal);
        assert_eq!(record.goals[2].team_stat_source_id, 8650);

        let order: Vec<i64> = record.players.iter().map(|p| p.player_stat_source_id).collect();
        assert_eq!(order, vec![1, 2, 3, 4, 11, 12]);
    }

    #[test]
    fn test_goals_conceded_match_opposing_goal_events() {
        let record = transform_match(&finished_payload(), 2).unwrap();

        let home_goals = record.goals.iter().filter(|g| g.team_stat_source_id == 8650).count() as u32;
        let away_goals = record.goals.iter().filter(|g| g.team_stat_source_id == 8678).count() as u32;

        for player in &record.players {
            let expected = if player.team_stat_source_id == 8650 { away_goals } else { home_goals };
            assert_eq!(player.goals_conceded, expected, "player {}", player.player_name);
        }
        assert_eq!(player(&record, 11).goals_conceded, 2);
        assert_eq!(player(&record, 4).goals_conceded, 1);
    }

    #[test]
    fn test_rating_resolution() {
        let record = transform_match(&finished_payload(), 2).unwrap();

        // Stat feed wins over the one-decimal performance rating
        assert_eq!(player(&record, 1).rating, 821);
        assert_eq!(player(&record, 11).rating, 729);
        // Unrated starter
        assert_eq!(player(&record, 2).rating, DEFAULT_RATING);
        // Substitute that came on without a rating
        assert_eq!(player(&record, 3).rating, DEFAULT_RATING);
        assert_eq!(player(&record, 3).substitution_on_time, 75);
        // Unused substitute
        assert_eq!(player(&record, 4).rating, 0);
    }

    #[test]
    fn test_performance_rating_fallback() {
        let mut raw = finished_payload();
        raw["content"]["playerStats"] = json!({});

        let record = transform_match(&raw, 2).unwrap();
        assert_eq!(player(&record, 1).rating, 790);
        assert_eq!(player(&record, 11).rating, DEFAULT_RATING);
    }

    #[test]
    fn test_player_events_and_cards() {
        let record = transform_match(&finished_payload(), 2).unwrap();

        let scorer = player(&record, 1);
        assert_eq!(scorer.goals, 1);
        assert_eq!(scorer.substitution_off_time, 75);

        let booked = player(&record, 11);
        assert_eq!(booked.yellow_card_time, 40);
        assert_eq!(booked.red_card_time, 90);
        assert_eq!(player(&record, 2).yellow_card_time, 0);
        assert_eq!(player(&record, 2).red_card_time, 0);
    }

    #[test]
    fn test_later_card_overwrites() {
        let mut raw = finished_payload();
        raw["content"]["matchFacts"]["events"]["events"] = json!([
            { "type": "Card", "time": 12, "card": "Yellow", "player": { "id": 2 } },
            { "type": "Card", "time": 58, "card": "Yellow", "player": { "id": 2 } }
        ]);

        let record = transform_match(&raw, 2).unwrap();
        assert_eq!(player(&record, 2).yellow_card_time, 58);
        assert!(record.goals.is_empty());
        assert_eq!(player(&record, 2).goals_conceded, 0);
    }

    #[test]
    fn test_man_of_the_match_per_side() {
        let record = transform_match(&finished_payload(), 2).unwrap();

        assert!(player(&record, 1).man_of_the_match);
        assert!(!player(&record, 2).man_of_the_match);
        assert!(player(&record, 11).man_of_the_match);
        assert!(record.players.iter().all(|p| !p.shared_man_of_the_match));
    }

    fn rated(rating: i32) -> PlayerMatchStat {
        let mut player =
            PlayerMatchStat::new(rating as i64, "P".to_string(), 1, "T".to_string(), LineupSlot::Starting);
        player.rating = rating;
        player
    }

    #[test]
    fn test_single_leader_is_man_of_the_match() {
        let mut players = vec![rated(720), rated(650)];
        award_man_of_the_match(&mut players);
        assert!(players[0].man_of_the_match);
        assert!(!players[0].shared_man_of_the_match);
        assert!(!players[1].man_of_the_match);
    }

    #[test]
    fn test_tied_leaders_share() {
        let mut players = vec![rated(700), rated(650), rated(700)];
        award_man_of_the_match(&mut players);
        assert!(players[0].shared_man_of_the_match && players[2].shared_man_of_the_match);
        assert!(players.iter().all(|p| !p.man_of_the_match));
        assert!(!players[1].shared_man_of_the_match);
    }

    #[test]
    fn test_later_higher_rating_resets_leaders() {
        let mut players = vec![rated(700), rated(700), rated(710), rated(0)];
        award_man_of_the_match(&mut players);
        assert!(players[2].man_of_the_match);
        assert!(players.iter().all(|p| !p.shared_man_of_the_match));
    }

    #[test]
    fn test_unrated_side_has_no_man_of_the_match() {
        let mut players = vec![rated(0), rated(0)];
        award_man_of_the_match(&mut players);
        assert!(players.iter().all(|p| !p.man_of_the_match && !p.shared_man_of_the_match));
    }

    #[test]
    fn test_live_clock_is_cleaned() {
        let mut raw = finished_payload();
        raw["header"]["status"] = json!({ "finished": false, "started": true, "liveTime": { "short": "67\u{2019}" } });

        let record = transform_match(&raw, 2).unwrap();
        assert_eq!(record.status, MatchStatus::Active);
        assert_eq!(record.elapsed, "67");
    }

    #[test]
    fn test_iso_kickoff_fallback() {
        let mut raw = finished_payload();
        raw["general"]["matchTimeUTC"] = Value::Null;

        let record = transform_match(&raw, 1).unwrap();
        assert_eq!(record.datetime, "2025-08-15 20:00");
    }

    #[test]
    fn test_started_without_lineup_is_shape_error() {
        let mut raw = finished_payload();
        raw["content"].as_object_mut().unwrap().remove("lineup");

        let err = transform_match(&raw, 2).unwrap_err();
        assert_eq!(err.entity, "match 4506263");
        assert!(err.reason.contains("lineup"));
    }

    #[test]
    fn test_missing_general_is_shape_error() {
        let err = transform_match(&json!({ "header": {} }), 2).unwrap_err();
        assert_eq!(err.entity, "match");
    }

    #[test]
    fn test_missing_events_tolerated() {
        let mut raw = finished_payload();
        raw["content"].as_object_mut().unwrap().remove("matchFacts");

        let record = transform_match(&raw, 2).unwrap();
        assert!(record.goals.is_empty());
        assert!(record.players.iter().all(|p| p.goals_conceded == 0 && p.yellow_card_time == 0));
    }
}
