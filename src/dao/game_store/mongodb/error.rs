use std::fmt;

use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Write applied to a single game document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameWrite {
    Upsert,
    Delete,
}

impl fmt::Display for GameWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GameWrite::Upsert => "upsert",
            GameWrite::Delete => "delete",
        })
    }
}

/// Failures of the MongoDB game store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// The connection string did not parse.
    #[error("invalid MongoDB URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    /// The driver rejected the parsed options.
    #[error("cannot build a MongoDB client from the parsed options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    /// The server never answered while opening the link.
    #[error("MongoDB left {attempts} ping(s) unanswered")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    /// A liveness ping failed.
    #[error("MongoDB ping failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    /// An index could not be created.
    #[error("cannot create index `{index}` on `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    /// Writing one game document failed.
    #[error("{write} of game `{id}` failed: {source}")]
    GameWrite {
        write: GameWrite,
        id: Uuid,
        #[source]
        source: MongoError,
    },
    /// Listing the games collection failed.
    #[error("loading the lobby games failed: {source}")]
    ListGames {
        #[source]
        source: MongoError,
    },
    /// A document id is not a UUID.
    #[error("stored game `{id}` has a malformed identifier")]
    CorruptGameId { id: String },
}
