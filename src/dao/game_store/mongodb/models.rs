use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::state::game::{Game, GameStatus};

/// Stored shape of a game: queryable columns next to the full JSON aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoGameDocument {
    /// Game id.
    #[serde(rename = "_id")]
    pub id: String,
    /// Join code, indexed for lookups.
    pub code: String,
    /// Lifecycle phase, indexed with `last_activity` for the sweep.
    pub status: GameStatus,
    /// Creation time.
    pub created_at: DateTime,
    /// Last player action; drives the inactivity sweep.
    pub last_activity: DateTime,
    /// The full game aggregate.
    pub game: serde_json::Value,
}

impl MongoGameDocument {
    pub fn from_game(game: &Game) -> MongoResult<Self> {
        let body = serde_json::to_value(game).map_err(|source| MongoDaoError::Encode {
            id: game.id,
            source,
        })?;
        Ok(Self {
            id: game.id.to_string(),
            code: game.code.clone(),
            status: game.status,
            created_at: bson_datetime(game.created_at),
            last_activity: bson_datetime(game.last_activity),
            game: body,
        })
    }

    pub fn into_game(self) -> MongoResult<Game> {
        let id = self.id;
        serde_json::from_value(self.game).map_err(|source| MongoDaoError::Decode { id, source })
    }
}

fn bson_datetime(value: OffsetDateTime) -> DateTime {
    let millis = value.unix_timestamp_nanos() / 1_000_000;
    DateTime::from_millis(i64::try_from(millis).unwrap_or(i64::MAX))
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::game::{GameSettings, Player};

    #[test]
    fn document_keeps_queryable_columns_and_full_game() {
        let game = Game::new("ABC123".into(), Player::new("host", "Host"), GameSettings::default());
        let document = MongoGameDocument::from_game(&game).unwrap();

        assert_eq!(document.id, game.id.to_string());
        assert_eq!(document.code, "ABC123");
        assert_eq!(document.status, GameStatus::Waiting);
        assert_eq!(
            document.created_at.timestamp_millis(),
            (game.created_at.unix_timestamp_nanos() / 1_000_000) as i64
        );
        assert_eq!(document.into_game().unwrap(), game);
    }
}
