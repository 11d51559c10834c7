use std::sync::Arc;

use common::{PlayRecord, Track, User};
use futures_util::future::BoxFuture;

#[derive(Debug)]
pub enum ProviderError {
    Http(reqwest::Error),
    Status(u16),
    Unsupported,
    Decode(String),
    Backoff,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::Http(err) => write!(f, "http error: {}", err),
            ProviderError::Status(code) => write!(f, "http status {}", code),
            ProviderError::Unsupported => write!(f, "capability not available"),
            ProviderError::Decode(message) => write!(f, "decode error: {}", message),
            ProviderError::Backoff => write!(f, "provider backing off"),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Http(err)
        }
    }
}

/// Source of the track snapshot and artist images.
pub trait CatalogProvider: Send + Sync {
    fn fetch_tracks(&self) -> BoxFuture<'_, Result<Vec<Track>, ProviderError>>;

    fn artist_image<'a>(
        &'a self,
        artist: &'a str,
    ) -> BoxFuture<'a, Result<Option<Vec<u8>>, ProviderError>>;

    fn trigger_library_scan(&self) -> BoxFuture<'_, Result<(), ProviderError>>;
}

/// Per-user playback statistics. Optional: without it no personal playlists are built.
pub trait HistoryProvider: Send + Sync {
    fn list_users(&self) -> BoxFuture<'_, Result<Vec<User>, ProviderError>>;

    fn play_history<'a>(
        &'a self,
        user: &'a User,
    ) -> BoxFuture<'a, Result<Vec<PlayRecord>, ProviderError>>;
}

pub trait ArtProvider: Send + Sync {
    fn artist_image<'a>(
        &'a self,
        artist: &'a str,
    ) -> BoxFuture<'a, Result<Option<Vec<u8>>, ProviderError>>;
}

#[derive(Clone)]
pub struct Providers {
    pub catalog: Arc<dyn CatalogProvider>,
    pub history: Option<Arc<dyn HistoryProvider>>,
    pub art: Option<Arc<dyn ArtProvider>>,
}
