use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use artwork::CoverStyle;
use catalog::{default_groups, GenreNormalizer};
use common::{fold_key, User};

use crate::config::{resolve_path, ServerConfig};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaylistTypes {
    pub genre: bool,
    pub year: bool,
    pub artist: bool,
    pub personal: bool,
}

impl PlaylistTypes {
    pub fn parse(values: &[String]) -> Self {
        let mut types = PlaylistTypes::default();
        for value in values {
            match value.trim().to_ascii_lowercase().as_str() {
                "genre" | "genres" => types.genre = true,
                "year" | "decade" | "years" => types.year = true,
                "artist" | "artists" => types.artist = true,
                "personal" | "user" => types.personal = true,
                _ => {}
            }
        }
        types
    }
}

#[derive(Clone, Debug)]
pub struct SelectionLimits {
    pub min_tracks: usize,
    pub max_tracks: usize,
    pub min_artist_diversity: usize,
    pub min_albums_per_artist: usize,
    pub min_albums_per_decade: usize,
    pub min_year: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserSelection {
    All,
    Named(HashSet<String>),
}

impl UserSelection {
    pub fn parse(values: &[String]) -> Self {
        let names: HashSet<String> = values
            .iter()
            .flat_map(|value| value.split(','))
            .map(fold_key)
            .filter(|name| !name.is_empty())
            .collect();
        if names.is_empty() || names.contains("all") {
            UserSelection::All
        } else {
            UserSelection::Named(names)
        }
    }

    pub fn includes(&self, user: &User) -> bool {
        match self {
            UserSelection::All => true,
            UserSelection::Named(names) => {
                names.contains(&fold_key(&user.name)) || names.contains(&fold_key(&user.id))
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct PersonalRules {
    pub users: UserSelection,
    pub min_user_tracks: usize,
    pub top_min_plays: u32,
    pub genre_mix_genres: usize,
    pub max_per_album: usize,
    pub max_per_artist: usize,
}

#[derive(Clone, Debug)]
pub struct CoverRules {
    pub custom_artist_covers: bool,
    /// "<GENRE> RADIO" banners over the cover root's fallback background.
    pub genre_banners: bool,
    pub external_art: bool,
    pub font_paths: Vec<PathBuf>,
    pub style: CoverStyle,
}

/// Rewrites catalog-side library paths to where this process can read them.
#[derive(Clone, Debug, Default)]
pub struct PathMap {
    from: String,
    to: Option<PathBuf>,
}

impl PathMap {
    pub fn new(from: &str, to: &str) -> Self {
        let to = to.trim();
        Self {
            from: from.trim().to_string(),
            to: if to.is_empty() {
                None
            } else {
                Some(PathBuf::from(to))
            },
        }
    }

    pub fn local(&self, path: &str) -> PathBuf {
        if let Some(to) = &self.to {
            if !self.from.is_empty() {
                if let Some(rest) = path.strip_prefix(self.from.as_str()) {
                    let rest = rest.trim_start_matches(['/', '\\']);
                    let mut out = to.clone();
                    for part in rest.split(['/', '\\']).filter(|part| !part.is_empty()) {
                        out.push(part);
                    }
                    return out;
                }
            }
        }
        PathBuf::from(path)
    }
}

/// Immutable settings snapshot taken at the start of a cycle.
#[derive(Clone, Debug)]
pub struct Settings {
    pub playlists_root: PathBuf,
    pub cover_root: PathBuf,
    pub scratch_root: PathBuf,
    pub path_map: PathMap,
    pub types: PlaylistTypes,
    pub limits: SelectionLimits,
    pub excluded_genres: HashSet<String>,
    pub excluded_artists: HashSet<String>,
    pub shuffle: bool,
    pub seed: u64,
    pub normalizer: GenreNormalizer,
    pub personal: PersonalRules,
    pub covers: CoverRules,
    pub trigger_library_scan: bool,
    pub worker_concurrency: usize,
    pub update_covers_budget: Duration,
}

impl Settings {
    pub fn from_config(config_path: &Path, config: &ServerConfig) -> Self {
        let delimiter = config.genre_delimiter.trim().chars().next().unwrap_or(';');
        let normalizer = if !config.genre_grouping_enabled {
            GenreNormalizer::ungrouped(delimiter)
        } else if config.genre_groups.is_empty() {
            GenreNormalizer::new(default_groups(), delimiter)
        } else {
            GenreNormalizer::new(config.genre_groups.clone(), delimiter)
        };
        let font_paths = if config.font_paths.is_empty() {
            artwork::DEFAULT_FONT_PATHS.iter().map(PathBuf::from).collect()
        } else {
            config
                .font_paths
                .iter()
                .map(|path| resolve_path(config_path, path))
                .collect()
        };
        let spotify = &config.spotify;
        Self {
            playlists_root: resolve_path(config_path, &config.playlists_root),
            cover_root: resolve_path(config_path, &config.cover_root),
            scratch_root: resolve_path(config_path, &config.scratch_path),
            path_map: PathMap::new(&config.library_path_from, &config.library_path_to),
            types: PlaylistTypes::parse(&config.playlist_types),
            limits: SelectionLimits {
                min_tracks: config.min_tracks,
                max_tracks: config.max_tracks,
                min_artist_diversity: config.min_artist_diversity,
                min_albums_per_artist: config.min_albums_per_artist,
                min_albums_per_decade: config.min_albums_per_decade,
                min_year: config.min_year,
            },
            excluded_genres: fold_set(&config.excluded_genres),
            excluded_artists: fold_set(&config.excluded_artists),
            shuffle: config.shuffle_tracks,
            seed: config.shuffle_seed.unwrap_or_else(rand::random::<u64>),
            normalizer,
            personal: PersonalRules {
                users: UserSelection::parse(&config.personal_playlist_users),
                min_user_tracks: config.personal_min_user_tracks,
                top_min_plays: config.top_tracks_min_plays.max(1),
                genre_mix_genres: config.genre_mix_genres,
                max_per_album: config.discovery_max_songs_per_album,
                max_per_artist: config.discovery_max_songs_per_artist,
            },
            covers: CoverRules {
                custom_artist_covers: config.custom_artist_covers,
                genre_banners: config.generated_genre_covers,
                external_art: spotify.enabled
                    && !spotify.client_id.trim().is_empty()
                    && !spotify.client_secret.trim().is_empty(),
                font_paths,
                style: CoverStyle {
                    size: config.cover_size,
                    ..CoverStyle::default()
                },
            },
            trigger_library_scan: config.trigger_library_scan,
            worker_concurrency: config.worker_concurrency.max(1),
            update_covers_budget: Duration::from_secs(config.update_covers_budget_secs.max(1)),
        }
    }

    pub fn is_excluded_genre(&self, name: &str) -> bool {
        self.excluded_genres.contains(&fold_key(name))
    }

    pub fn is_excluded_artist(&self, name: &str) -> bool {
        self.excluded_artists.contains(&fold_key(name))
    }
}

fn fold_set(values: &[String]) -> HashSet<String> {
    values
        .iter()
        .map(|value| fold_key(value))
        .filter(|value| !value.is_empty())
        .collect()
}

#[cfg(test)]
pub(crate) fn test_settings() -> Settings {
    let config = ServerConfig {
        shuffle_seed: Some(42),
        ..ServerConfig::default()
    };
    Settings::from_config(Path::new("/tmp/tapedeck/config.yaml"), &config)
}
