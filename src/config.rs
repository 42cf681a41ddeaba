//! Application-level configuration loading, including the session policies.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "BINGO_LOBBY_CONFIG_PATH";
const MONGO_URI_ENV: &str = "MONGO_URI";
const MONGO_DB_ENV: &str = "MONGO_DB";
const DEFAULT_GRACE: Duration = Duration::from_secs(30);
const DEFAULT_MAX_GAMES: usize = 1000;

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Rules applied by the session coordinator.
    pub session: SessionPolicy,
    /// Optional persistence backend settings.
    pub storage: StorageSettings,
}

/// Rules deciding how joins, removals and disconnects affect games.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionPolicy {
    /// How long a disconnected player keeps their seat; zero removes at once.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "disconnect_grace_ms")]
    pub disconnect_grace: Duration,
    /// Delete a game as soon as its last player is removed.
    pub delete_empty_games: bool,
    /// Refuse joins while the user sits in another unfinished game.
    pub single_game_per_user: bool,
    /// Accept new players once a game has left the `waiting` status.
    pub allow_late_join: bool,
    /// Upper bound on concurrent games; `null` means unbounded.
    pub max_games: Option<usize>,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            disconnect_grace: DEFAULT_GRACE,
            delete_empty_games: false,
            single_game_per_user: false,
            allow_late_join: false,
            max_games: Some(DEFAULT_MAX_GAMES),
        }
    }
}

impl SessionPolicy {
    /// Whether disconnected players are retained for a rejoin.
    pub fn retains_disconnected(&self) -> bool {
        !self.disconnect_grace.is_zero()
    }
}

/// Connection settings of the persistence backend, read from the environment.
#[derive(Debug, Clone, Default)]
pub struct StorageSettings {
    /// MongoDB connection string; persistence is disabled when absent.
    pub mongo_uri: Option<String>,
    /// Database name override.
    pub mongo_db: Option<String>,
}

impl StorageSettings {
    fn from_env() -> Self {
        Self {
            mongo_uri: env::var(MONGO_URI_ENV).ok().filter(|uri| !uri.is_empty()),
            mongo_db: env::var(MONGO_DB_ENV).ok().filter(|db| !db.is_empty()),
        }
    }

    /// Whether a storage backend is expected to be reachable.
    pub fn enabled(&self) -> bool {
        self.mongo_uri.is_some()
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let session = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    info!(
                        path = %path.display(),
                        grace_ms = raw.session.disconnect_grace.as_millis() as u64,
                        "loaded session policy from config"
                    );
                    raw.session
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    SessionPolicy::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                SessionPolicy::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                SessionPolicy::default()
            }
        };

        Self {
            session,
            storage: StorageSettings::from_env(),
        }
    }
}

/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    session: SessionPolicy,
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
