use std::time::Duration;

use mongodb::{Client, Collection, Database, bson::doc};
use tokio::time::sleep;
use tracing::debug;

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
    models::MongoGameDocument,
};

pub(super) const GAMES_COLLECTION: &str = "games";
const OPEN_ATTEMPTS: u32 = 10;
const FIRST_RETRY: Duration = Duration::from_millis(250);
const MAX_RETRY: Duration = Duration::from_secs(5);

/// A client bound to the lobby database.
pub struct MongoLink {
    // Dropping the last client handle shuts its connection pool down.
    _client: Client,
    database: Database,
}

impl MongoLink {
    /// Build a client and wait until the database answers a ping.
    pub async fn open(config: &MongoConfig) -> MongoResult<Self> {
        let client = Client::with_options(config.options().clone())
            .map_err(|source| MongoDaoError::ClientConstruction { source })?;
        let link = Self {
            database: client.database(config.database()),
            _client: client,
        };

        let mut attempt = 0;
        let mut wait = FIRST_RETRY;
        loop {
            attempt += 1;
            match link.database.run_command(doc! { "ping": 1 }).await {
                Ok(_) => return Ok(link),
                Err(source) if attempt >= OPEN_ATTEMPTS => {
                    return Err(MongoDaoError::InitialPing {
                        attempts: attempt,
                        source,
                    });
                }
                Err(err) => {
                    debug!(attempt, error = %err, "mongodb not answering yet");
                    sleep(wait).await;
                    wait = (wait * 2).min(MAX_RETRY);
                }
            }
        }
    }

    pub async fn ping(&self) -> MongoResult<()> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(|source| MongoDaoError::HealthPing { source })
    }

    /// Collection of lobby game documents.
    pub fn games(&self) -> Collection<MongoGameDocument> {
        self.database.collection(GAMES_COLLECTION)
    }
}

