use std::{future::Future, sync::Arc};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Collection, IndexModel,
    bson::{Document, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::{GAMES_COLLECTION, MongoLink},
    error::{GameWrite, MongoDaoError, MongoResult},
    models::{MongoGameDocument, doc_id},
};
use crate::dao::{
    game_store::GameStore,
    models::GameEntity,
    storage::{StorageError, StorageResult},
};

/// Indexes backing the lobby listing: filter by status, order by creation.
const LOBBY_INDEXES: [(&str, &str); 2] = [
    ("status", "lobby_status_idx"),
    ("created_at", "lobby_created_at_idx"),
];

/// Lobby games persisted one document per game in MongoDB.
///
/// Cloning is cheap; clones share the same link, which a reconnect swaps in place.
#[derive(Clone)]
pub struct MongoGameStore {
    link: Arc<RwLock<MongoLink>>,
    config: Arc<MongoConfig>,
}

impl MongoGameStore {
    /// Open the link and make sure the lobby indexes exist.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let link = MongoLink::open(&config).await?;
        let store = Self {
            link: Arc::new(RwLock::new(link)),
            config: Arc::new(config),
        };
        store.ensure_indexes().await?;
        info!(database = store.config.database(), "mongodb game store ready");
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let games = self.games().await;
        for (field, name) in LOBBY_INDEXES {
            let index = IndexModel::builder()
                .keys(doc! { field: 1 })
                .options(IndexOptions::builder().name(Some(name.to_owned())).build())
                .build();
            games
                .create_index(index)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection: GAMES_COLLECTION,
                    index: name,
                    source,
                })?;
        }
        Ok(())
    }

    async fn games(&self) -> Collection<MongoGameDocument> {
        self.link.read().await.games()
    }

    async fn upsert(&self, game: GameEntity) -> MongoResult<()> {
        let id = game.id;
        let document = MongoGameDocument::from(game);
        self.games()
            .await
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::GameWrite {
                write: GameWrite::Upsert,
                id,
                source,
            })?;
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> MongoResult<bool> {
        let outcome = self
            .games()
            .await
            .delete_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::GameWrite {
                write: GameWrite::Delete,
                id,
                source,
            })?;
        Ok(outcome.deleted_count > 0)
    }

    async fn load_all(&self) -> MongoResult<Vec<GameEntity>> {
        let lobby_order: Document = doc! { "created_at": 1 };
        let documents: Vec<MongoGameDocument> = self
            .games()
            .await
            .find(doc! {})
            .sort(lobby_order)
            .await
            .map_err(|source| MongoDaoError::ListGames { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListGames { source })?;

        let mut games = Vec::with_capacity(documents.len());
        for document in documents {
            match GameEntity::try_from(document) {
                Ok(game) => games.push(game),
                Err(err) => warn!(error = %err, "skipping unreadable game document"),
            }
        }
        Ok(games)
    }

    async fn ping(&self) -> MongoResult<()> {
        self.link.read().await.ping().await
    }

    async fn reopen(&self) -> MongoResult<()> {
        let fresh = MongoLink::open(&self.config).await?;
        *self.link.write().await = fresh;
        Ok(())
    }

    /// Run `op` on a clone of the store, detached from `&self`.
    fn detached<T, F, Fut>(&self, op: F) -> BoxFuture<'static, StorageResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(Self) -> Fut + Send + 'static,
        Fut: Future<Output = MongoResult<T>> + Send + 'static,
    {
        let store = self.clone();
        Box::pin(async move { op(store).await.map_err(StorageError::from) })
    }
}

impl GameStore for MongoGameStore {
    fn save_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.detached(move |store| async move { store.upsert(game).await })
    }

    fn delete_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        self.detached(move |store| async move { store.remove(id).await })
    }

    fn list_games(&self) -> BoxFuture<'static, StorageResult<Vec<GameEntity>>> {
        self.detached(|store| async move { store.load_all().await })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.detached(|store| async move { store.ping().await })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.detached(|store| async move { store.reopen().await })
    }
}
