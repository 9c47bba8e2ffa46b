use crate::error::DataShapeError;
use crate::models::{Squad, SquadPlayer};
use crate::providers::premier_league::{RawClub, RawPlayerName, RawSquadPlayer};
use serde_json::Value;
use tracing::warn;

/// Decode a club reference from the clubs endpoint
pub fn transform_club(raw: &Value) -> Result<RawClub, DataShapeError> {
    DataShapeError::decode(entity_label("club", raw), raw)
}

/// Map a club and its raw squad onto a `Squad`, skipping players that cannot be mapped
pub fn transform_squad(club: &RawClub, raw_players: &[Value]) -> Squad {
    let players = raw_players
        .iter()
        .filter_map(|raw| match squad_player(raw) {
            Ok(player) => Some(player),
            Err(e) => {
                warn!("Skipping player of {}: {}", club.name, e);
                None
            }
        })
        .collect();

    Squad { id: club.id, name: club.name.clone(), players }
}

fn squad_player(raw: &Value) -> Result<SquadPlayer, DataShapeError> {
    let entity = entity_label("squad player", raw);
    let player: RawSquadPlayer = DataShapeError::decode(&entity, raw)?;

    let name = player
        .name
        .as_ref()
        .and_then(display_name)
        .ok_or_else(|| DataShapeError::new(&entity, "no usable player name"))?;

    Ok(SquadPlayer {
        id: player.id,
        name,
        shirt_number: player.shirt_num,
        position: player.position,
        nationality: player.country.and_then(|c| c.country),
        photo_id: player.id,
    })
}

/// Display name if set, else first and last name joined
fn display_name(name: &RawPlayerName) -> Option<String> {
    let display = name.display.as_deref().map(str::trim).filter(|d| !d.is_empty());
    if let Some(display) = display {
        return Some(display.to_string());
    }

    let parts: Vec<&str> = [name.first.as_deref(), name.last.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    (!parts.is_empty()).then(|| parts.join(" "))
}

fn entity_label(kind: &str, raw: &Value) -> String {
    match raw.get("id") {
        Some(Value::String(id)) => format!("{kind} {id}"),
        Some(id) => format!("{kind} {id}"),
        None => kind.to_string(),
    }
}
