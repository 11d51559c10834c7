use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use catalog::{CatalogIndex, TrackGroup};
use common::{derive_seed, fold_key, Playlist, PlaylistKind, Track};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::settings::Settings;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Excluded,
    TooFewTracks(usize),
    TooFewArtists(usize),
    TooFewAlbums(usize),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Excluded => write!(f, "excluded"),
            SkipReason::TooFewTracks(count) => write!(f, "only {} tracks", count),
            SkipReason::TooFewArtists(count) => write!(f, "only {} artists", count),
            SkipReason::TooFewAlbums(count) => write!(f, "only {} albums", count),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Diversity {
    min_artists: usize,
    min_albums: usize,
}

/// Orders tracks for truncation: a seeded shuffle keyed by playlist name, or by track id.
pub fn order_tracks(tracks: &mut [Arc<Track>], shuffle: bool, seed: u64, key: &str) {
    if shuffle {
        let mut rng = StdRng::seed_from_u64(derive_seed(seed, key));
        tracks.shuffle(&mut rng);
    } else {
        tracks.sort_by(|a, b| a.id.cmp(&b.id));
    }
}

pub fn distinct_artists(tracks: &[Arc<Track>]) -> usize {
    tracks
        .iter()
        .flat_map(|track| track.artists.iter())
        .map(|artist| fold_key(artist))
        .filter(|artist| !artist.is_empty())
        .collect::<HashSet<_>>()
        .len()
}

pub fn distinct_albums(tracks: &[Arc<Track>]) -> usize {
    tracks
        .iter()
        .filter_map(|track| track.album_key())
        .collect::<HashSet<_>>()
        .len()
}

/// Static genre, decade and artist playlists over one catalog snapshot.
pub struct PlaylistBuilder<'a> {
    settings: &'a Settings,
    index: &'a CatalogIndex,
}

impl<'a> PlaylistBuilder<'a> {
    pub fn new(settings: &'a Settings, index: &'a CatalogIndex) -> Self {
        Self { settings, index }
    }

    pub fn build_all(&self) -> Vec<Playlist> {
        let mut playlists = Vec::new();
        let types = self.settings.types;
        if types.genre {
            playlists.extend(self.genre_playlists());
        }
        if types.year {
            playlists.extend(self.decade_playlists());
        }
        if types.artist {
            playlists.extend(self.artist_playlists());
        }
        playlists
    }

    pub fn genre_playlists(&self) -> Vec<Playlist> {
        let diversity = Diversity {
            min_artists: self.settings.limits.min_artist_diversity,
            min_albums: 0,
        };
        let mut playlists = Vec::new();
        for group in self.index.genre_groups() {
            if self.settings.is_excluded_genre(&group.name) {
                info!("Skipping genre '{}': {}", group.name, SkipReason::Excluded);
                continue;
            }
            match self.finish(PlaylistKind::Genre, &group.name, group.tracks, diversity) {
                Ok(playlist) => playlists.push(playlist),
                Err(reason) => info!("Skipping genre '{}': {}", group.name, reason),
            }
        }
        info!("Built {} genre playlists", playlists.len());
        playlists
    }

    pub fn decade_playlists(&self) -> Vec<Playlist> {
        let limits = &self.settings.limits;
        let diversity = Diversity {
            min_artists: limits.min_artist_diversity,
            min_albums: limits.min_albums_per_decade,
        };
        let mut playlists = Vec::new();
        for (decade, group) in self.index.decade_groups() {
            if decade + 9 < limits.min_year {
                debug!("Skipping decade {}s: before {}", decade, limits.min_year);
                continue;
            }
            let tracks: Vec<Arc<Track>> = group
                .tracks
                .into_iter()
                .filter(|track| track.year.map(|year| year >= limits.min_year).unwrap_or(false))
                .collect();
            let subject = decade.to_string();
            match self.finish(PlaylistKind::Year, &subject, tracks, diversity) {
                Ok(playlist) => playlists.push(playlist),
                Err(reason) => info!("Skipping decade {}s: {}", decade, reason),
            }
        }
        info!("Built {} decade playlists", playlists.len());
        playlists
    }

    pub fn artist_playlists(&self) -> Vec<Playlist> {
        let diversity = Diversity {
            min_artists: 0,
            min_albums: self.settings.limits.min_albums_per_artist,
        };
        let mut playlists = Vec::new();
        let mut skipped = 0usize;
        for TrackGroup { name, tracks } in self.index.artist_groups() {
            if self.settings.is_excluded_artist(&name) {
                info!("Skipping artist '{}': {}", name, SkipReason::Excluded);
                continue;
            }
            match self.finish(PlaylistKind::Artist, &name, tracks, diversity) {
                Ok(playlist) => playlists.push(playlist),
                // Most artists in a library are below the thresholds.
                Err(reason) => {
                    skipped += 1;
                    debug!("Skipping artist '{}': {}", name, reason);
                }
            }
        }
        info!(
            "Built {} artist playlists ({} artists below thresholds)",
            playlists.len(),
            skipped
        );
        playlists
    }

    fn finish(
        &self,
        kind: PlaylistKind,
        subject: &str,
        tracks: Vec<Arc<Track>>,
        diversity: Diversity,
    ) -> Result<Playlist, SkipReason> {
        let limits = &self.settings.limits;
        let mut tracks: Vec<Arc<Track>> = tracks
            .into_iter()
            .filter(|track| !self.has_excluded_artist(track))
            .collect();
        if tracks.len() < limits.min_tracks {
            return Err(SkipReason::TooFewTracks(tracks.len()));
        }
        check_diversity(&tracks, diversity)?;

        let mut playlist = Playlist::new(kind, subject, Vec::new());
        order_tracks(&mut tracks, self.settings.shuffle, self.settings.seed, &playlist.name);
        if tracks.len() > limits.max_tracks {
            tracks.truncate(limits.max_tracks);
            check_diversity(&tracks, diversity)?;
        }
        if tracks.len() < limits.min_tracks {
            return Err(SkipReason::TooFewTracks(tracks.len()));
        }
        debug!(
            "Playlist '{}' with {} tracks from {} artists",
            playlist.name,
            tracks.len(),
            distinct_artists(&tracks)
        );
        playlist.tracks = tracks;
        Ok(playlist)
    }

    fn has_excluded_artist(&self, track: &Track) -> bool {
        !self.settings.excluded_artists.is_empty()
            && track
                .artists
                .iter()
                .any(|artist| self.settings.is_excluded_artist(artist))
    }
}

fn check_diversity(tracks: &[Arc<Track>], diversity: Diversity) -> Result<(), SkipReason> {
    if diversity.min_albums > 0 {
        let albums = distinct_albums(tracks);
        if albums < diversity.min_albums {
            return Err(SkipReason::TooFewAlbums(albums));
        }
    }
    if diversity.min_artists > 0 {
        let artists = distinct_artists(tracks);
        if artists < diversity.min_artists {
            return Err(SkipReason::TooFewArtists(artists));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::test_settings;

    fn track(id: usize, artist: &str, album: &str, genre: &str, year: i32) -> Track {
        Track {
            id: format!("t{:03}", id),
            title: format!("Song {}", id),
            artists: vec![artist.to_string()],
            album: Some(album.to_string()),
            genres: vec![genre.to_string()],
            year: Some(year),
            path: None,
        }
    }

    fn index(settings: &Settings, tracks: Vec<Track>) -> CatalogIndex {
        CatalogIndex::build(tracks, &settings.normalizer)
    }

    #[test]
    fn genre_with_too_few_artists_produces_nothing() {
        let settings = test_settings();
        let tracks = (0..40)
            .map(|i| track(i, &format!("Artist {}", i % 3), "Album", "Jazz", 1999))
            .collect();
        let index = index(&settings, tracks);
        assert!(PlaylistBuilder::new(&settings, &index)
            .genre_playlists()
            .is_empty());
    }

    #[test]
    fn genre_playlists_respect_bounds_and_diversity() {
        let mut settings = test_settings();
        settings.limits.max_tracks = 20;
        let tracks = (0..60)
            .map(|i| track(i, &format!("Artist {}", i % 12), "Album", "Alternative Rock", 2001))
            .collect();
        let index = index(&settings, tracks);
        let playlists = PlaylistBuilder::new(&settings, &index).genre_playlists();
        assert_eq!(playlists.len(), 1);
        let playlist = &playlists[0];
        assert_eq!(playlist.name, "Rock Radio");
        assert_eq!(playlist.tracks.len(), 20);
        assert!(distinct_artists(&playlist.tracks) >= settings.limits.min_artist_diversity);
    }

    #[test]
    fn shuffle_is_stable_for_a_seed() {
        let settings = test_settings();
        let tracks: Vec<Track> = (0..30)
            .map(|i| track(i, &format!("Artist {}", i % 6), "Album", "Jazz", 1965))
            .collect();
        let index = index(&settings, tracks);
        let first = PlaylistBuilder::new(&settings, &index).genre_playlists();
        let second = PlaylistBuilder::new(&settings, &index).genre_playlists();
        let ids = |playlists: &[Playlist]| -> Vec<String> {
            playlists[0].tracks.iter().map(|t| t.id.clone()).collect()
        };
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn unshuffled_truncation_keeps_lowest_ids() {
        let mut settings = test_settings();
        settings.shuffle = false;
        settings.limits.max_tracks = 10;
        let tracks = (0..30)
            .rev()
            .map(|i| track(i, &format!("Artist {}", i % 10), "Album", "Jazz", 1965))
            .collect();
        let index = index(&settings, tracks);
        let playlists = PlaylistBuilder::new(&settings, &index).genre_playlists();
        let ids: Vec<&str> = playlists[0].tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids.first(), Some(&"t000"));
        assert_eq!(ids.last(), Some(&"t009"));
    }

    #[test]
    fn excluded_genres_and_artists_are_dropped() {
        let mut settings = test_settings();
        settings.excluded_genres.insert("jazz".to_string());
        settings.excluded_artists.insert("artist 0".to_string());
        let mut tracks: Vec<Track> = (0..20)
            .map(|i| track(i, &format!("Artist {}", i % 5), "Album", "Jazz", 1965))
            .collect();
        tracks.extend((20..40).map(|i| track(i, &format!("Artist {}", i % 6), "Album", "Blues", 1965)));
        let index = index(&settings, tracks);
        let playlists = PlaylistBuilder::new(&settings, &index).genre_playlists();
        assert_eq!(playlists.len(), 1);
        assert_eq!(playlists[0].name, "Blues Radio");
        assert!(playlists[0]
            .tracks
            .iter()
            .all(|t| t.artist() != Some("Artist 0")));
    }

    #[test]
    fn decades_need_albums_and_recent_years() {
        let settings = test_settings();
        let mut tracks: Vec<Track> = (0..20)
            .map(|i| {
                track(i, &format!("Artist {}", i % 5), &format!("Album {}", i % 4), "Pop", 1984)
            })
            .collect();
        // One album only.
        tracks.extend((20..40).map(|i| track(i, &format!("Artist {}", i % 5), "Same", "Pop", 1993)));
        tracks.extend((40..60).map(|i| {
            track(i, &format!("Artist {}", i % 5), &format!("Album {}", i % 4), "Pop", 1942)
        }));
        let index = index(&settings, tracks);
        let playlists = PlaylistBuilder::new(&settings, &index).decade_playlists();
        let names: Vec<&str> = playlists.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Back to the 1980s"]);
        assert_eq!(playlists[0].subject, "1980");
    }

    #[test]
    fn artists_need_multiple_albums() {
        let settings = test_settings();
        let mut tracks: Vec<Track> = (0..12)
            .map(|i| track(i, "Nina Simone", &format!("Album {}", i % 3), "Jazz", 1965))
            .collect();
        tracks.extend((12..24).map(|i| track(i, "One Hit", "Only Album", "Pop", 1999)));
        let index = index(&settings, tracks);
        let playlists = PlaylistBuilder::new(&settings, &index).artist_playlists();
        assert_eq!(playlists.len(), 1);
        assert_eq!(playlists[0].name, "This is Nina Simone!");
        assert_eq!(playlists[0].kind, PlaylistKind::Artist);
    }

    #[test]
    fn disabled_types_are_not_built() {
        let mut settings = test_settings();
        settings.types.genre = false;
        settings.types.year = false;
        let tracks = (0..12)
            .map(|i| track(i, "Nina Simone", &format!("Album {}", i % 3), "Jazz", 1965))
            .collect();
        let index = index(&settings, tracks);
        let playlists = PlaylistBuilder::new(&settings, &index).build_all();
        assert!(playlists.iter().all(|p| p.kind == PlaylistKind::Artist));
    }
}
