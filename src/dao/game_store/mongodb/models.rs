use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::{
    dao::models::{GameEntity, PlayerEntity},
    state::game::GameStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoGameDocument {
    #[serde(rename = "_id")]
    id: String,
    status: GameStatus,
    created_at: DateTime,
    updated_at: DateTime,
    players: Vec<MongoPlayerDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    user_id: String,
    joined_at: DateTime,
}

impl From<GameEntity> for MongoGameDocument {
    fn from(value: GameEntity) -> Self {
        Self {
            id: value.id.to_string(),
            status: value.status,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
            players: value
                .players
                .into_iter()
                .map(|player| MongoPlayerDocument {
                    user_id: player.user_id,
                    joined_at: DateTime::from_system_time(player.joined_at),
                })
                .collect(),
        }
    }
}

impl TryFrom<MongoGameDocument> for GameEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoGameDocument) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&value.id)
            .map_err(|_| MongoDaoError::CorruptGameId { id: value.id.clone() })?;

        Ok(Self {
            id,
            status: value.status,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
            players: value
                .players
                .into_iter()
                .map(|player| PlayerEntity {
                    user_id: player.user_id,
                    joined_at: player.joined_at.to_system_time(),
                })
                .collect(),
        })
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}
