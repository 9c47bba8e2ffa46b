//! Ingestion paths: provider fetch → transform → archive → publish

use crate::archive::Archive;
use crate::broker::Publisher;
use crate::error::DataShapeError;
use crate::listener::MatchIngestor;
use crate::models::{SyncEvent, UpdateMatchMessage, UpdateSquadMessage};
use crate::providers::d11::PlatformMatch;
use crate::providers::{Competition, MatchSource, PlatformSource, SquadSource};
use crate::transform::{transform_club, transform_match, transform_squad};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Main sync service
pub struct SyncService {
    platform: Arc<dyn PlatformSource>,
    squads: Arc<dyn SquadSource>,
    matches: Arc<dyn MatchSource>,
    publisher: Arc<Publisher>,
    archive: Archive,
    kickoff_offset_hours: i64,
}

impl SyncService {
    pub fn new(
        platform: Arc<dyn PlatformSource>,
        squads: Arc<dyn SquadSource>,
        matches: Arc<dyn MatchSource>,
        publisher: Arc<Publisher>,
        archive: Archive,
        kickoff_offset_hours: i64,
    ) -> Self {
        Self { platform, squads, matches, publisher, archive, kickoff_offset_hours }
    }

    /// Publish the squad of every club in the competition.
    ///
    /// Clubs whose record or squad cannot be fetched or mapped are skipped.
    pub async fn update_squads(&self, competition: &Competition) -> Result<SyncEvent> {
        info!(
            "Updating squads for competition {} season {}",
            competition.competition_id, competition.season
        );

        let Some(teams) = self.squads.fetch_teams(competition).await else {
            return Ok(SyncEvent::fetch_failed("Premier League clubs"));
        };

        let mut team_count = 0;
        let mut player_count = 0;

        for raw in &teams {
            let club = match transform_club(raw) {
                Ok(club) => club,
                Err(e) => {
                    warn!("Skipping team: {}", e);
                    continue;
                }
            };

            info!("Updating team squad for {} ({})", club.name, club.id);

            let Some(raw_players) = self.squads.fetch_squad(competition, club.id).await else {
                warn!("No squad data for {}, skipping", club.name);
                continue;
            };

            let message = UpdateSquadMessage { team_data: transform_squad(&club, &raw_players) };
            self.archive.write_squad(&competition.season, &message)?;
            self.publisher
                .send_update_squad(&message)
                .await
                .with_context(|| format!("Failed to publish squad for {}", club.name))?;

            team_count += 1;
            player_count += message.team_data.players.len();
            info!("Team squad data for {} sent to broker", club.name);
        }

        info!("Updated {} squads ({} players)", team_count, player_count);
        Ok(SyncEvent::SquadsUpdated { teams: team_count, players: player_count, timestamp: Utc::now() })
    }

    /// Publish the current state of a platform match
    pub async fn update_match(&self, match_id: i64, finish: bool) -> Result<SyncEvent> {
        info!("Updating match {} (finish: {})", match_id, finish);

        let Some(raw_platform) = self.platform.fetch_platform_match(match_id).await else {
            return Ok(SyncEvent::fetch_failed(format!("D11 match {match_id}")));
        };
        let platform: PlatformMatch =
            DataShapeError::decode(format!("platform match {match_id}"), &raw_platform)?;

        let Some(raw_match) = self.matches.fetch_match(platform.stat_source_id).await else {
            return Ok(SyncEvent::fetch_failed(format!("Fotmob match {}", platform.stat_source_id)));
        };

        let mut match_data = transform_match(&raw_match, self.kickoff_offset_hours)?;
        match_data.match_id = Some(platform.id);
        let status = match_data.status;

        let message = UpdateMatchMessage { match_data, finish };
        self.archive.write_match(
            &platform.match_week.season.name,
            platform.match_week.match_week_number,
            &platform.home_team.name,
            &platform.away_team.name,
            &message,
        )?;

        self.publisher
            .send_update_match(&message)
            .await
            .with_context(|| format!("Failed to publish match {match_id}"))?;

        info!("Match data for {} sent to broker", match_id);
        Ok(SyncEvent::MatchUpdated { match_id, status, timestamp: Utc::now() })
    }
}

#[async_trait]
impl MatchIngestor for SyncService {
    async fn update_match(&self, match_id: i64, finish: bool) -> Result<SyncEvent> {
        SyncService::update_match(self, match_id, finish).await
    }
}
