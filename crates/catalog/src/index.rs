use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use common::{fold_key, Track};
use tracing::debug;

use crate::genre::GenreNormalizer;

#[derive(Clone, Debug)]
pub struct TrackGroup {
    pub name: String,
    pub tracks: Vec<Arc<Track>>,
}

#[derive(Clone, Debug, Default)]
struct Bucket {
    name: String,
    members: Vec<usize>,
}

/// Read-only view over one cycle's track snapshot.
#[derive(Clone, Debug, Default)]
pub struct CatalogIndex {
    tracks: Vec<Arc<Track>>,
    track_genres: Vec<BTreeSet<String>>,
    by_id: HashMap<String, usize>,
    genres: BTreeMap<String, Bucket>,
    decades: BTreeMap<i32, Vec<usize>>,
    artists: BTreeMap<String, Bucket>,
}

impl CatalogIndex {
    pub fn build(tracks: Vec<Track>, normalizer: &GenreNormalizer) -> Self {
        let mut index = CatalogIndex::default();
        let mut duplicates = 0usize;
        for track in tracks {
            if index.by_id.contains_key(&track.id) {
                duplicates += 1;
                continue;
            }
            let idx = index.tracks.len();
            let genres = normalizer.normalize_all(track.genres.iter().map(|g| g.as_str()));
            for genre in &genres {
                push_bucket(&mut index.genres, genre, idx);
            }
            if let Some(decade) = track.year.filter(|year| *year > 0).map(decade_of) {
                index.decades.entry(decade).or_default().push(idx);
            }
            for artist in track.artists.iter().filter(|a| !a.trim().is_empty()) {
                push_bucket(&mut index.artists, artist.trim(), idx);
            }
            index.by_id.insert(track.id.clone(), idx);
            index.track_genres.push(genres);
            index.tracks.push(Arc::new(track));
        }
        if duplicates > 0 {
            debug!("Ignored {} duplicate track ids", duplicates);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[Arc<Track>] {
        &self.tracks
    }

    pub fn track(&self, id: &str) -> Option<&Arc<Track>> {
        self.by_id.get(id).map(|idx| &self.tracks[*idx])
    }

    pub fn genres_of(&self, id: &str) -> Option<&BTreeSet<String>> {
        self.by_id.get(id).map(|idx| &self.track_genres[*idx])
    }

    pub fn genre_names(&self) -> impl Iterator<Item = &str> {
        self.genres.values().map(|bucket| bucket.name.as_str())
    }

    pub fn genre_tracks(&self, genre: &str) -> Vec<Arc<Track>> {
        self.bucket_tracks(self.genres.get(&fold_key(genre)))
    }

    pub fn artist_tracks(&self, artist: &str) -> Vec<Arc<Track>> {
        self.bucket_tracks(self.artists.get(&fold_key(artist)))
    }

    pub fn decade_tracks(&self, decade: i32) -> Vec<Arc<Track>> {
        self.decades
            .get(&decade)
            .map(|members| self.collect(members))
            .unwrap_or_default()
    }

    pub fn genre_groups(&self) -> Vec<TrackGroup> {
        self.genres
            .values()
            .map(|bucket| TrackGroup {
                name: bucket.name.clone(),
                tracks: self.collect(&bucket.members),
            })
            .collect()
    }

    pub fn artist_groups(&self) -> Vec<TrackGroup> {
        self.artists
            .values()
            .map(|bucket| TrackGroup {
                name: bucket.name.clone(),
                tracks: self.collect(&bucket.members),
            })
            .collect()
    }

    /// Groups keyed by the decade's first year, e.g. "1980".
    pub fn decade_groups(&self) -> Vec<(i32, TrackGroup)> {
        self.decades
            .iter()
            .map(|(decade, members)| {
                (
                    *decade,
                    TrackGroup {
                        name: decade.to_string(),
                        tracks: self.collect(members),
                    },
                )
            })
            .collect()
    }

    fn bucket_tracks(&self, bucket: Option<&Bucket>) -> Vec<Arc<Track>> {
        bucket
            .map(|bucket| self.collect(&bucket.members))
            .unwrap_or_default()
    }

    fn collect(&self, members: &[usize]) -> Vec<Arc<Track>> {
        members.iter().map(|idx| Arc::clone(&self.tracks[*idx])).collect()
    }
}

pub fn decade_of(year: i32) -> i32 {
    year.div_euclid(10) * 10
}

fn push_bucket(map: &mut BTreeMap<String, Bucket>, name: &str, idx: usize) {
    let bucket = map.entry(fold_key(name)).or_insert_with(|| Bucket {
        name: name.to_string(),
        members: Vec::new(),
    });
    if bucket.members.last() != Some(&idx) {
        bucket.members.push(idx);
    }
}
