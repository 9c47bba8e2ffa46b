//! JSON snapshots of every published message, keyed by season

use crate::config::{fill_template, ArchiveConfig};
use crate::models::{UpdateMatchMessage, UpdateSquadMessage};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct Archive {
    config: ArchiveConfig,
}

impl Archive {
    pub fn new(config: ArchiveConfig) -> Self {
        Self { config }
    }

    /// `<squad_dir>/<team name>.json`
    pub fn write_squad(&self, season: &str, message: &UpdateSquadMessage) -> Result<PathBuf> {
        let directory = fill_template(&self.config.squad_directory, &[("season", season)]);
        let file_name = format!("{}.json", message.team_data.name);
        write_json(Path::new(&directory), &file_name, message)
    }

    /// `<match_dir>/<home> vs <away> (<elapsed>).json`, with the match week zero padded
    pub fn write_match(
        &self,
        season: &str,
        match_week_number: u32,
        home_team: &str,
        away_team: &str,
        message: &UpdateMatchMessage,
    ) -> Result<PathBuf> {
        let match_week = format!("{match_week_number:02}");
        let directory = fill_template(
            &self.config.match_directory,
            &[("season", season), ("match_week_number", match_week.as_str())],
        );

        let elapsed = message.match_data.elapsed.replace('/', "");
        let file_name = format!("{home_team} vs {away_team} ({elapsed}).json");
        write_json(Path::new(&directory), &file_name, message)
    }
}

fn write_json<T: Serialize>(directory: &Path, file_name: &str, value: &T) -> Result<PathBuf> {
    fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create archive directory {directory:?}"))?;

    let path = directory.join(file_name);
    let json = serde_json::to_string_pretty(value)?;
    fs::write(&path, json).with_context(|| format!("Failed to write {path:?}"))?;

    debug!("Archived {:?}", path);
    Ok(path)
}
