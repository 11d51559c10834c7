use std::collections::HashMap;
use std::time::Duration;

use common::{PlayRecord, Track, User};
use futures_util::future::{BoxFuture, FutureExt};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::config::MediaServerConfig;
use crate::providers::{CatalogProvider, HistoryProvider, ProviderError};

const PAGE_SIZE: usize = 2000;
const AUDIO_FIELDS: &str = "Path,Genres,ProductionYear,Artists,AlbumArtist,Album";

/// Jellyfin-compatible media server; serves as catalog and playback-history provider.
#[derive(Clone)]
pub struct MediaServerClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemsResponse {
    #[serde(default)]
    items: Vec<BaseItem>,
    #[serde(default)]
    total_record_count: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BaseItem {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    artists: Vec<String>,
    #[serde(default)]
    album_artist: Option<String>,
    #[serde(default)]
    album: Option<String>,
    #[serde(default)]
    genres: Vec<String>,
    #[serde(default)]
    production_year: Option<i32>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    user_data: Option<UserItemData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserItemData {
    #[serde(default)]
    play_count: u32,
    #[serde(default)]
    is_favorite: bool,
    #[serde(default)]
    last_played_date: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserDto {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

impl MediaServerClient {
    pub fn new(client: Client, config: &MediaServerConfig) -> Self {
        Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        }
    }

    fn url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .timeout(self.timeout)
            .header("X-Emby-Token", &self.api_key)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }
        Ok(response.json::<T>().await?)
    }

    async fn audio_items(
        &self,
        prefix: &str,
        fields: &str,
        extra: &[(&str, String)],
    ) -> Result<Vec<BaseItem>, ProviderError> {
        let mut out = Vec::new();
        let mut start = 0usize;
        loop {
            let mut query = vec![
                ("IncludeItemTypes", "Audio".to_string()),
                ("Recursive", "true".to_string()),
                ("Fields", fields.to_string()),
                ("SortBy", "SortName".to_string()),
                ("SortOrder", "Ascending".to_string()),
                ("StartIndex", start.to_string()),
                ("Limit", PAGE_SIZE.to_string()),
            ];
            query.extend(extra.iter().cloned());
            let page: ItemsResponse = self.get_json(prefix, &query).await?;
            let fetched = page.items.len();
            out.extend(page.items);
            start += fetched;
            if !has_more(fetched, start, page.total_record_count) {
                break;
            }
        }
        Ok(out)
    }

    async fn fetch_tracks_inner(&self) -> Result<Vec<Track>, ProviderError> {
        let items = self.audio_items("/Items", AUDIO_FIELDS, &[]).await?;
        let tracks: Vec<Track> = items.into_iter().map(track_from_item).collect();
        info!("Fetched {} audio items from media server", tracks.len());
        Ok(tracks)
    }

    async fn artist_image_inner(&self, artist: &str) -> Result<Option<Vec<u8>>, ProviderError> {
        let item: BaseItem = match self
            .get_json(&format!("/Artists/{}", urlencoding::encode(artist)), &[])
            .await
        {
            Ok(item) => item,
            Err(ProviderError::Status(404)) => return Ok(None),
            Err(err) => return Err(err),
        };
        let response = self
            .client
            .get(self.url(&format!("/Items/{}/Images/Primary", urlencoding::encode(&item.id))))
            .timeout(self.timeout)
            .header("X-Emby-Token", &self.api_key)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }
        let data = response.bytes().await?;
        if data.is_empty() {
            return Ok(None);
        }
        Ok(Some(data.to_vec()))
    }

    async fn trigger_scan_inner(&self) -> Result<(), ProviderError> {
        let response = self
            .client
            .post(self.url("/Library/Refresh"))
            .timeout(self.timeout)
            .header("X-Emby-Token", &self.api_key)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }
        info!("Library scan requested");
        Ok(())
    }

    async fn list_users_inner(&self) -> Result<Vec<User>, ProviderError> {
        let users: Vec<UserDto> = match self.get_json("/Users", &[]).await {
            Ok(users) => users,
            Err(ProviderError::Status(404)) => return Err(ProviderError::Unsupported),
            Err(err) => return Err(err),
        };
        Ok(users
            .into_iter()
            .map(|user| User {
                name: user.name.unwrap_or_else(|| user.id.clone()),
                id: user.id,
            })
            .collect())
    }

    async fn play_history_inner(&self, user: &User) -> Result<Vec<PlayRecord>, ProviderError> {
        let prefix = format!("/Users/{}/Items", urlencoding::encode(&user.id));
        let mut records: HashMap<String, PlayRecord> = HashMap::new();
        for filter in ["IsPlayed", "IsFavorite"] {
            let extra = [
                ("Filters", filter.to_string()),
                ("EnableUserData", "true".to_string()),
            ];
            let items = match self.audio_items(&prefix, "UserData", &extra).await {
                Ok(items) => items,
                Err(ProviderError::Status(404)) => return Err(ProviderError::Unsupported),
                Err(err) => return Err(err),
            };
            for item in items {
                if let Some(record) = record_from_item(&item) {
                    records
                        .entry(record.track_id.clone())
                        .and_modify(|existing| merge_record(existing, &record))
                        .or_insert(record);
                }
            }
        }
        let mut out: Vec<PlayRecord> = records.into_values().collect();
        out.sort_by(|a, b| a.track_id.cmp(&b.track_id));
        debug!("{} history records for {}", out.len(), user.name);
        Ok(out)
    }
}

impl CatalogProvider for MediaServerClient {
    fn fetch_tracks(&self) -> BoxFuture<'_, Result<Vec<Track>, ProviderError>> {
        self.fetch_tracks_inner().boxed()
    }

    fn artist_image<'a>(
        &'a self,
        artist: &'a str,
    ) -> BoxFuture<'a, Result<Option<Vec<u8>>, ProviderError>> {
        self.artist_image_inner(artist).boxed()
    }

    fn trigger_library_scan(&self) -> BoxFuture<'_, Result<(), ProviderError>> {
        self.trigger_scan_inner().boxed()
    }
}

impl HistoryProvider for MediaServerClient {
    fn list_users(&self) -> BoxFuture<'_, Result<Vec<User>, ProviderError>> {
        self.list_users_inner().boxed()
    }

    fn play_history<'a>(
        &'a self,
        user: &'a User,
    ) -> BoxFuture<'a, Result<Vec<PlayRecord>, ProviderError>> {
        self.play_history_inner(user).boxed()
    }
}

fn track_from_item(item: BaseItem) -> Track {
    let mut artists = split_artists(&item.artists);
    if artists.is_empty() {
        if let Some(album_artist) = item.album_artist.as_deref() {
            artists = split_artists(&[album_artist.to_string()]);
        }
    }
    Track {
        title: item
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| item.id.clone()),
        id: item.id,
        artists,
        album: item
            .album
            .map(|album| album.trim().to_string())
            .filter(|album| !album.is_empty()),
        genres: item.genres,
        year: item.production_year.filter(|year| *year > 0),
        path: item.path.filter(|path| !path.trim().is_empty()),
    }
}

// Some taggers pack several artists into one NUL-separated string.
fn split_artists(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        for part in value.split('\0') {
            let name = part.trim();
            if name.is_empty() {
                continue;
            }
            if !out.iter().any(|existing| existing.eq_ignore_ascii_case(name)) {
                out.push(name.to_string());
            }
        }
    }
    out
}

fn record_from_item(item: &BaseItem) -> Option<PlayRecord> {
    let data = item.user_data.as_ref()?;
    if data.play_count == 0 && !data.is_favorite && data.last_played_date.is_none() {
        return None;
    }
    Some(PlayRecord {
        track_id: item.id.clone(),
        play_count: data.play_count,
        favorite: data.is_favorite,
        last_played: data.last_played_date.as_deref().and_then(parse_timestamp),
    })
}

fn merge_record(existing: &mut PlayRecord, incoming: &PlayRecord) {
    existing.play_count = existing.play_count.max(incoming.play_count);
    existing.favorite |= incoming.favorite;
    existing.last_played = existing.last_played.max(incoming.last_played);
}

/// A short page ends paging; the server may leave out the total count.
fn has_more(fetched: usize, seen: usize, total: Option<usize>) -> bool {
    fetched >= PAGE_SIZE && total.map(|total| seen < total).unwrap_or(true)
}

pub fn parse_timestamp(value: &str) -> Option<i64> {
    OffsetDateTime::parse(value.trim(), &Rfc3339)
        .ok()
        .map(|date| date.unix_timestamp())
}
