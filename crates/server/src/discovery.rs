use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use catalog::{CatalogIndex, OTHER_GENRE};
use common::{derive_seed, fold_key, PlayRecord, Playlist, PlaylistKind, Track, User};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::builder::order_tracks;
use crate::settings::Settings;

const DISCOVERY_GENRES: usize = 5;

/// A history record joined with its catalog track.
#[derive(Clone, Debug)]
struct Listen {
    track: Arc<Track>,
    plays: u32,
    favorite: bool,
    last_played: Option<i64>,
}

/// Greedy selection in rank order; a candidate is accepted only while neither
/// its album nor any of its credited artists has reached the cap. A cap of 0 disables that cap.
pub fn select_with_caps<I>(
    candidates: I,
    max_per_album: usize,
    max_per_artist: usize,
    target: usize,
) -> Vec<Arc<Track>>
where
    I: IntoIterator<Item = Arc<Track>>,
{
    let mut albums: HashMap<String, usize> = HashMap::new();
    let mut artists: HashMap<String, usize> = HashMap::new();
    let mut selected = Vec::new();
    for track in candidates {
        if selected.len() >= target {
            break;
        }
        let album = track.album_key().map(|album| {
            format!("{}\u{1f}{}", track.artist_key().unwrap_or_default(), album)
        });
        let mut credited: Vec<String> = track
            .artists
            .iter()
            .map(|artist| fold_key(artist))
            .filter(|artist| !artist.is_empty())
            .collect();
        credited.sort();
        credited.dedup();
        let album_full = album
            .as_ref()
            .map(|key| max_per_album > 0 && albums.get(key).copied().unwrap_or(0) >= max_per_album)
            .unwrap_or(false);
        let artist_full = max_per_artist > 0
            && credited
                .iter()
                .any(|key| artists.get(key).copied().unwrap_or(0) >= max_per_artist);
        if album_full || artist_full {
            continue;
        }
        if let Some(key) = album {
            *albums.entry(key).or_default() += 1;
        }
        for key in credited {
            *artists.entry(key).or_default() += 1;
        }
        selected.push(track);
    }
    selected
}

/// Splits `total` across weights proportionally, handing leftover slots to the largest remainders.
pub fn largest_remainder(weights: &[u64], total: usize) -> Vec<usize> {
    let sum: u64 = weights.iter().sum();
    if sum == 0 || weights.is_empty() {
        return vec![0; weights.len()];
    }
    let mut quotas = Vec::with_capacity(weights.len());
    let mut remainders = Vec::with_capacity(weights.len());
    for (idx, weight) in weights.iter().enumerate() {
        let exact = *weight as u128 * total as u128;
        quotas.push((exact / sum as u128) as usize);
        remainders.push((exact % sum as u128, idx));
    }
    let assigned: usize = quotas.iter().sum();
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for (_, idx) in remainders.into_iter().take(total.saturating_sub(assigned)) {
        quotas[idx] += 1;
    }
    quotas
}

/// Personal playlists for one user from their play history.
pub struct DiscoveryRanker<'a> {
    settings: &'a Settings,
    index: &'a CatalogIndex,
}

impl<'a> DiscoveryRanker<'a> {
    pub fn new(settings: &'a Settings, index: &'a CatalogIndex) -> Self {
        Self { settings, index }
    }

    pub fn playlists_for(&self, user: &User, history: &[PlayRecord]) -> Vec<Playlist> {
        let listens = self.qualifying(history);
        let rules = &self.settings.personal;
        if listens.len() < rules.min_user_tracks {
            info!(
                "Skipping personal playlists for {}: {} qualifying tracks (minimum {})",
                user.name,
                listens.len(),
                rules.min_user_tracks
            );
            return Vec::new();
        }

        let candidates = [
            (PlaylistKind::PersonalTopTracks, self.top_tracks(&listens)),
            (PlaylistKind::PersonalDiscovery, self.discovery(&listens)),
            (PlaylistKind::PersonalRecent, self.recent_favorites(&listens)),
            (
                PlaylistKind::PersonalGenreMix,
                self.genre_mix(&listens, &user.name),
            ),
        ];
        let limits = &self.settings.limits;
        let mut playlists = Vec::new();
        for (kind, tracks) in candidates {
            let playlist = Playlist::new(kind, &user.name, tracks).owned_by(&user.id);
            if playlist.tracks.len() < limits.min_tracks {
                info!(
                    "Skipping '{}': only {} tracks",
                    playlist.name,
                    playlist.tracks.len()
                );
                continue;
            }
            debug!("Playlist '{}' with {} tracks", playlist.name, playlist.tracks.len());
            playlists.push(playlist);
        }
        playlists
    }

    fn qualifying(&self, history: &[PlayRecord]) -> Vec<Listen> {
        let mut merged: BTreeMap<&str, Listen> = BTreeMap::new();
        for record in history {
            if record.play_count == 0 && !record.favorite {
                continue;
            }
            let Some(track) = self.index.track(&record.track_id) else {
                continue;
            };
            if self.excluded(track) {
                continue;
            }
            merged
                .entry(record.track_id.as_str())
                .and_modify(|listen| {
                    listen.plays = listen.plays.max(record.play_count);
                    listen.favorite |= record.favorite;
                    listen.last_played = listen.last_played.max(record.last_played);
                })
                .or_insert_with(|| Listen {
                    track: Arc::clone(track),
                    plays: record.play_count,
                    favorite: record.favorite,
                    last_played: record.last_played,
                });
        }
        merged.into_values().collect()
    }

    fn excluded(&self, track: &Track) -> bool {
        track
            .artists
            .iter()
            .any(|artist| self.settings.is_excluded_artist(artist))
    }

    fn top_tracks(&self, listens: &[Listen]) -> Vec<Arc<Track>> {
        let mut ranked: Vec<&Listen> = listens
            .iter()
            .filter(|listen| listen.plays >= self.settings.personal.top_min_plays)
            .collect();
        ranked.sort_by(|a, b| {
            b.plays
                .cmp(&a.plays)
                .then(b.last_played.cmp(&a.last_played))
                .then(a.track.id.cmp(&b.track.id))
        });
        ranked
            .into_iter()
            .take(self.settings.limits.max_tracks)
            .map(|listen| Arc::clone(&listen.track))
            .collect()
    }

    fn recent_favorites(&self, listens: &[Listen]) -> Vec<Arc<Track>> {
        let mut ranked: Vec<&Listen> = listens.iter().collect();
        ranked.sort_by(|a, b| {
            (b.favorite, b.last_played)
                .cmp(&(a.favorite, a.last_played))
                .then(a.track.id.cmp(&b.track.id))
        });
        ranked
            .into_iter()
            .take(self.settings.limits.max_tracks)
            .map(|listen| Arc::clone(&listen.track))
            .collect()
    }

    /// Canonical genres ranked by aggregate plays; "Other" only when nothing else is known.
    fn genre_weights(&self, listens: &[Listen]) -> Vec<(String, u64)> {
        let mut weights: HashMap<&str, u64> = HashMap::new();
        for listen in listens {
            let Some(genres) = self.index.genres_of(&listen.track.id) else {
                continue;
            };
            for genre in genres {
                *weights.entry(genre.as_str()).or_default() += u64::from(listen.plays.max(1));
            }
        }
        let has_named = weights.keys().any(|genre| *genre != OTHER_GENRE);
        let mut ranked: Vec<(String, u64)> = weights
            .into_iter()
            .filter(|(genre, _)| !has_named || *genre != OTHER_GENRE)
            .map(|(genre, weight)| (genre.to_string(), weight))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }

    fn genre_mix(&self, listens: &[Listen], user_name: &str) -> Vec<Arc<Track>> {
        let mut genres = self.genre_weights(listens);
        genres.truncate(self.settings.personal.genre_mix_genres.max(1));
        let weights: Vec<u64> = genres.iter().map(|(_, weight)| *weight).collect();
        let quotas = largest_remainder(&weights, self.settings.limits.max_tracks);

        let name = PlaylistKind::PersonalGenreMix.display_name(user_name);
        let mut rng = StdRng::seed_from_u64(derive_seed(self.settings.seed, &name));
        let mut chosen: HashSet<String> = HashSet::new();
        let mut mix = Vec::new();
        for ((genre, _), quota) in genres.iter().zip(quotas) {
            let pool: Vec<Arc<Track>> = self
                .index
                .genre_tracks(genre)
                .into_iter()
                .filter(|track| !chosen.contains(&track.id) && !self.excluded(track))
                .collect();
            let picked: Vec<Arc<Track>> = pool.choose_multiple(&mut rng, quota).cloned().collect();
            debug!("Genre mix for {}: {} tracks from {}", user_name, picked.len(), genre);
            for track in picked {
                chosen.insert(track.id.clone());
                mix.push(track);
            }
        }
        if self.settings.shuffle {
            order_tracks(&mut mix, true, self.settings.seed, &name);
        }
        mix
    }

    fn discovery(&self, listens: &[Listen]) -> Vec<Arc<Track>> {
        let mut preferred = self.genre_weights(listens);
        preferred.truncate(DISCOVERY_GENRES);
        let total: u64 = preferred.iter().map(|(_, weight)| *weight).sum();
        if total == 0 {
            return Vec::new();
        }
        let affinity: HashMap<&str, f64> = preferred
            .iter()
            .map(|(genre, weight)| (genre.as_str(), *weight as f64 / total as f64))
            .collect();
        let plays: HashMap<&str, u32> = listens
            .iter()
            .map(|listen| (listen.track.id.as_str(), listen.plays))
            .collect();

        let mut scored: Vec<(f64, Arc<Track>)> = Vec::new();
        for track in self.index.tracks() {
            let genre_affinity: f64 = self
                .index
                .genres_of(&track.id)
                .map(|genres| {
                    genres
                        .iter()
                        .filter_map(|genre| affinity.get(genre.as_str()))
                        .sum()
                })
                .unwrap_or(0.0);
            if genre_affinity <= 0.0 || self.excluded(track) {
                continue;
            }
            let user_plays = plays.get(track.id.as_str()).copied().unwrap_or(0);
            scored.push((genre_affinity / (1.0 + f64::from(user_plays)), Arc::clone(track)));
        }
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        let rules = &self.settings.personal;
        select_with_caps(
            scored.into_iter().map(|(_, track)| track),
            rules.max_per_album,
            rules.max_per_artist,
            self.settings.limits.max_tracks,
        )
    }
}
