use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use catalog::CanonicalGenre;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaServerConfig {
    pub url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Default for MediaServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8096".to_string(),
            api_key: String::new(),
            timeout_secs: 30,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    pub enabled: bool,
    pub client_id: String,
    pub client_secret: String,
    pub timeout_secs: u64,
    pub backoff_secs: u64,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            client_id: String::new(),
            client_secret: String::new(),
            timeout_secs: 10,
            backoff_secs: 60,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub media_server: MediaServerConfig,
    pub spotify: SpotifyConfig,
    pub playlists_root: String,
    pub cover_root: String,
    pub scratch_path: String,
    pub library_path_from: String,
    pub library_path_to: String,
    pub generation_interval_hours: u64,
    pub generate_on_startup: bool,
    pub playlist_types: Vec<String>,
    pub max_tracks: usize,
    pub min_tracks: usize,
    pub min_artist_diversity: usize,
    pub min_albums_per_artist: usize,
    pub min_albums_per_decade: usize,
    pub min_year: i32,
    pub excluded_genres: Vec<String>,
    pub excluded_artists: Vec<String>,
    pub shuffle_tracks: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shuffle_seed: Option<u64>,
    pub genre_grouping_enabled: bool,
    pub genre_delimiter: String,
    pub genre_groups: Vec<CanonicalGenre>,
    pub personal_playlist_users: Vec<String>,
    pub personal_min_user_tracks: usize,
    pub top_tracks_min_plays: u32,
    pub genre_mix_genres: usize,
    pub discovery_max_songs_per_album: usize,
    pub discovery_max_songs_per_artist: usize,
    pub custom_artist_covers: bool,
    pub generated_genre_covers: bool,
    pub font_paths: Vec<String>,
    pub cover_size: u32,
    pub trigger_library_scan: bool,
    pub worker_concurrency: usize,
    pub update_covers_budget_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3080,
            media_server: MediaServerConfig::default(),
            spotify: SpotifyConfig::default(),
            playlists_root: "playlists".to_string(),
            cover_root: "covers".to_string(),
            scratch_path: "scratch".to_string(),
            library_path_from: String::new(),
            library_path_to: String::new(),
            generation_interval_hours: 24,
            generate_on_startup: false,
            playlist_types: vec![
                "Genre".to_string(),
                "Year".to_string(),
                "Artist".to_string(),
                "Personal".to_string(),
            ],
            max_tracks: 100,
            min_tracks: 5,
            min_artist_diversity: 5,
            min_albums_per_artist: 2,
            min_albums_per_decade: 3,
            min_year: 1950,
            excluded_genres: Vec::new(),
            excluded_artists: Vec::new(),
            shuffle_tracks: true,
            shuffle_seed: None,
            genre_grouping_enabled: true,
            genre_delimiter: ";".to_string(),
            genre_groups: Vec::new(),
            personal_playlist_users: vec!["all".to_string()],
            personal_min_user_tracks: 10,
            top_tracks_min_plays: 1,
            genre_mix_genres: 3,
            discovery_max_songs_per_album: 1,
            discovery_max_songs_per_artist: 2,
            custom_artist_covers: true,
            generated_genre_covers: true,
            font_paths: Vec::new(),
            cover_size: 640,
            trigger_library_scan: true,
            worker_concurrency: 4,
            update_covers_budget_secs: 180,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("TAPEDECK_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

pub fn load_or_create_config(path: &Path) -> Result<(ServerConfig, bool), ConfigError> {
    let (mut config, created) = if path.exists() {
        let contents = fs::read_to_string(path)?;
        (serde_yaml::from_str::<ServerConfig>(&contents)?, false)
    } else {
        let config = ServerConfig::default();
        save_config(path, &config)?;
        (config, true)
    };
    if config.media_server.api_key.trim().is_empty() {
        if let Ok(key) = env::var("TAPEDECK_API_KEY") {
            config.media_server.api_key = key.trim().to_string();
        }
    }
    normalize_config(&mut config);
    Ok((config, created))
}

pub fn normalize_config(config: &mut ServerConfig) {
    let defaults = ServerConfig::default();
    if config.port == 0 {
        config.port = defaults.port;
    }
    config.media_server.url = config.media_server.url.trim().trim_end_matches('/').to_string();
    if config.media_server.timeout_secs == 0 {
        config.media_server.timeout_secs = defaults.media_server.timeout_secs;
    }
    if config.spotify.timeout_secs == 0 {
        config.spotify.timeout_secs = defaults.spotify.timeout_secs;
    }
    if config.playlists_root.trim().is_empty() {
        config.playlists_root = defaults.playlists_root;
    }
    if config.cover_root.trim().is_empty() {
        config.cover_root = defaults.cover_root;
    }
    if config.scratch_path.trim().is_empty() {
        config.scratch_path = defaults.scratch_path;
    }
    if config.max_tracks == 0 {
        config.max_tracks = defaults.max_tracks;
    }
    if config.min_tracks == 0 {
        config.min_tracks = 1;
    }
    if config.min_tracks > config.max_tracks {
        std::mem::swap(&mut config.min_tracks, &mut config.max_tracks);
    }
    if config.genre_delimiter.trim().is_empty() {
        config.genre_delimiter = defaults.genre_delimiter;
    }
    if config.discovery_max_songs_per_album == 0 {
        config.discovery_max_songs_per_album = 1;
    }
    if config.discovery_max_songs_per_artist == 0 {
        config.discovery_max_songs_per_artist = 1;
    }
    if config.genre_mix_genres == 0 {
        config.genre_mix_genres = defaults.genre_mix_genres;
    }
    if config.worker_concurrency == 0 {
        config.worker_concurrency = 1;
    }
    if config.update_covers_budget_secs == 0 {
        config.update_covers_budget_secs = defaults.update_covers_budget_secs;
    }
    if config.cover_size < 64 {
        config.cover_size = defaults.cover_size;
    }
}

pub fn save_config(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value.trim());
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}
