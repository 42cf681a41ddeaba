//! Persistence of lobby games behind the [`game_store::GameStore`] trait.

pub mod game_store;
/// Backend-neutral game documents.
pub mod models;
pub mod storage;
