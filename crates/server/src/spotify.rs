use std::time::{Duration, Instant};

use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::SpotifyConfig;
use crate::providers::{ArtProvider, ProviderError};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const SEARCH_URL: &str = "https://api.spotify.com/v1/search";
const MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);
// Refresh a little before the provider says the token expires.
const TOKEN_SLACK: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Backoff {
    failures: u32,
    until: Option<Instant>,
}

impl Backoff {
    fn blocked(&self, now: Instant) -> bool {
        self.until.map(|until| now < until).unwrap_or(false)
    }

    fn fail(&mut self, now: Instant, base: Duration, retry_after: Option<Duration>) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let exponent = self.failures.saturating_sub(1).min(6);
        let delay = retry_after
            .unwrap_or_else(|| base.saturating_mul(1u32 << exponent))
            .min(MAX_BACKOFF);
        self.until = Some(now + delay);
        delay
    }

    fn succeed(&mut self) {
        self.failures = 0;
        self.until = None;
    }
}

/// Spotify "This is <Artist>" playlist art, via the client-credentials flow.
pub struct SpotifyArt {
    client: Client,
    client_id: String,
    client_secret: String,
    timeout: Duration,
    backoff_base: Duration,
    token: Mutex<Option<CachedToken>>,
    backoff: Mutex<Backoff>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct SearchResponse {
    playlists: Option<PlaylistPage>,
}

#[derive(Deserialize)]
struct PlaylistPage {
    #[serde(default)]
    items: Vec<Option<PlaylistItem>>,
}

#[derive(Deserialize)]
struct PlaylistItem {
    #[serde(default)]
    name: String,
    #[serde(default)]
    images: Option<Vec<ImageObject>>,
}

#[derive(Deserialize)]
struct ImageObject {
    url: String,
}

impl SpotifyArt {
    pub fn new(client: Client, config: &SpotifyConfig) -> Self {
        Self {
            client,
            client_id: config.client_id.trim().to_string(),
            client_secret: config.client_secret.trim().to_string(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            backoff_base: Duration::from_secs(config.backoff_secs.max(1)),
            token: Mutex::new(None),
            backoff: Mutex::new(Backoff::default()),
        }
    }

    fn record_failure(&self, retry_after: Option<Duration>) {
        let delay = self
            .backoff
            .lock()
            .fail(Instant::now(), self.backoff_base, retry_after);
        warn!("Spotify unavailable; backing off for {}s", delay.as_secs());
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        if let Some(token) = self.token.lock().clone() {
            if Instant::now() < token.expires_at {
                return Ok(token.value);
            }
        }
        let response = self
            .client
            .post(TOKEN_URL)
            .timeout(self.timeout)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let response = self.check(response)?;
        let payload = response.json::<TokenResponse>().await?;
        let lifetime = Duration::from_secs(payload.expires_in.unwrap_or(3600));
        let token = CachedToken {
            value: payload.access_token,
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_SLACK),
        };
        *self.token.lock() = Some(token.clone());
        debug!("Spotify token refreshed");
        Ok(token.value)
    }

    // Auth and rate-limit failures start a backoff window shared by every caller.
    fn check(&self, response: Response) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                self.record_failure(retry_after(response.headers()));
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                *self.token.lock() = None;
                self.record_failure(None);
            }
            status if status.is_server_error() => self.record_failure(None),
            _ => {}
        }
        Err(ProviderError::Status(status.as_u16()))
    }

    async fn search(&self, artist: &str) -> Result<Option<String>, ProviderError> {
        let token = self.access_token().await?;
        let query = [
            ("q", format!("This is {}", artist)),
            ("type", "playlist".to_string()),
            ("limit", "10".to_string()),
        ];
        let response = self
            .client
            .get(SEARCH_URL)
            .query(&query)
            .timeout(self.timeout)
            .bearer_auth(token)
            .send()
            .await?;
        let payload = self.check(response)?.json::<SearchResponse>().await?;
        let items = payload
            .playlists
            .map(|page| page.items)
            .unwrap_or_default();
        Ok(pick_playlist_image(artist, items.into_iter().flatten()))
    }

    async fn artist_image_inner(&self, artist: &str) -> Result<Option<Vec<u8>>, ProviderError> {
        if self.backoff.lock().blocked(Instant::now()) {
            return Err(ProviderError::Backoff);
        }
        let result = async {
            let url = match self.search(artist).await? {
                Some(url) => url,
                None => return Ok(None),
            };
            let response = self.client.get(&url).timeout(self.timeout).send().await?;
            let data = self.check(response)?.bytes().await?;
            Ok::<_, ProviderError>(Some(data.to_vec()))
        }
        .await;
        match &result {
            Ok(Some(_)) => {
                self.backoff.lock().succeed();
                info!("Downloaded Spotify art for {}", artist);
            }
            Ok(None) => {
                self.backoff.lock().succeed();
                debug!("No Spotify playlist matched {}", artist);
            }
            Err(ProviderError::Http(_)) => self.record_failure(None),
            Err(_) => {}
        }
        result
    }
}

impl ArtProvider for SpotifyArt {
    fn artist_image<'a>(
        &'a self,
        artist: &'a str,
    ) -> BoxFuture<'a, Result<Option<Vec<u8>>, ProviderError>> {
        self.artist_image_inner(artist).boxed()
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn pick_playlist_image<I>(artist: &str, items: I) -> Option<String>
where
    I: IntoIterator<Item = PlaylistItem>,
{
    let target = format!("this is {}", artist.trim().to_lowercase());
    for item in items {
        let name = item.name.trim().to_lowercase();
        if !name.starts_with(&target) {
            continue;
        }
        let url = item
            .images
            .unwrap_or_default()
            .into_iter()
            .map(|image| image.url.trim().to_string())
            .find(|url| !url.is_empty());
        if url.is_some() {
            return url;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, url: Option<&str>) -> PlaylistItem {
        PlaylistItem {
            name: name.to_string(),
            images: url.map(|url| {
                vec![ImageObject {
                    url: url.to_string(),
                }]
            }),
        }
    }

    #[test]
    fn picks_first_matching_playlist_with_art() {
        let items = vec![
            item("Best of Queen", Some("https://img/1")),
            item("This Is Queen", None),
            item("This is Queen!", Some("https://img/3")),
            item("This Is Queen", Some("https://img/4")),
        ];
        assert_eq!(
            pick_playlist_image("Queen", items),
            Some("https://img/3".to_string())
        );
    }

    #[test]
    fn ignores_unrelated_playlists() {
        let items = vec![item("Queen Radio", Some("https://img/1"))];
        assert_eq!(pick_playlist_image("Queen", items), None);
    }

    #[test]
    fn decodes_search_payload_with_null_items() {
        let payload = r#"{"playlists": {"items": [null, {"name": "This Is Björk", "images": [{"url": "https://img/b"}]}]}}"#;
        let response: SearchResponse = serde_json::from_str(payload).unwrap();
        let items = response.playlists.unwrap().items.into_iter().flatten();
        assert_eq!(
            pick_playlist_image("björk", items),
            Some("https://img/b".to_string())
        );
    }

    #[test]
    fn backoff_grows_and_honors_retry_after() {
        let now = Instant::now();
        let mut backoff = Backoff::default();
        let base = Duration::from_secs(10);
        assert_eq!(backoff.fail(now, base, None), Duration::from_secs(10));
        assert_eq!(backoff.fail(now, base, None), Duration::from_secs(20));
        assert!(backoff.blocked(now + Duration::from_secs(5)));
        assert!(!backoff.blocked(now + Duration::from_secs(25)));
        assert_eq!(
            backoff.fail(now, base, Some(Duration::from_secs(3))),
            Duration::from_secs(3)
        );
        backoff.succeed();
        assert!(!backoff.blocked(now));
    }
}
