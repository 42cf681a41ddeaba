use std::time::Duration;

use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DATABASE: &str = "bingo_lobby";
const APP_NAME: &str = "bingo-lobby-back";
const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Parsed client options plus the database holding the lobby collections.
#[derive(Clone, Debug)]
pub struct MongoConfig {
    options: ClientOptions,
    database: String,
}

impl MongoConfig {
    /// Parse `uri`, tagging the client with the lobby application name.
    ///
    /// A server selection timeout given in the URI wins over the lobby default.
    pub async fn from_uri(uri: &str, database: Option<&str>) -> MongoResult<Self> {
        let mut options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;
        options.app_name.get_or_insert_with(|| APP_NAME.to_owned());
        options
            .server_selection_timeout
            .get_or_insert(SERVER_SELECTION_TIMEOUT);

        Ok(Self {
            options,
            database: database.unwrap_or(DEFAULT_DATABASE).to_owned(),
        })
    }

    /// Client options handed to the driver.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Database holding the `games` collection.
    pub fn database(&self) -> &str {
        &self.database
    }
}
