use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "webp", "avif", "bmp"];
pub const UNKNOWN_PLAYLIST: &str = "Unknown Playlist";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub path: Option<String>,
}

impl Track {
    /// Primary credited artist.
    pub fn artist(&self) -> Option<&str> {
        self.artists.first().map(|name| name.as_str())
    }

    pub fn artist_key(&self) -> Option<String> {
        self.artist().map(fold_key)
    }

    pub fn album_key(&self) -> Option<String> {
        self.album
            .as_deref()
            .map(fold_key)
            .filter(|album| !album.is_empty())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaylistKind {
    Genre,
    Year,
    Artist,
    PersonalTopTracks,
    PersonalDiscovery,
    PersonalRecent,
    PersonalGenreMix,
}

impl PlaylistKind {
    pub fn is_personal(self) -> bool {
        matches!(
            self,
            PlaylistKind::PersonalTopTracks
                | PlaylistKind::PersonalDiscovery
                | PlaylistKind::PersonalRecent
                | PlaylistKind::PersonalGenreMix
        )
    }

    pub fn visibility(self) -> Visibility {
        if self.is_personal() {
            Visibility::Private
        } else {
            Visibility::Public
        }
    }

    pub fn display_name(self, subject: &str) -> String {
        match self {
            PlaylistKind::Genre => format!("{} Radio", subject),
            PlaylistKind::Year => format!("Back to the {}s", subject),
            PlaylistKind::Artist => format!("This is {}!", subject),
            PlaylistKind::PersonalTopTracks => format!("Top Tracks - {}", subject),
            PlaylistKind::PersonalDiscovery => format!("Discovery Mix - {}", subject),
            PlaylistKind::PersonalRecent => format!("Recent Favorites - {}", subject),
            PlaylistKind::PersonalGenreMix => format!("Genre Mix - {}", subject),
        }
    }

    /// Cover file stem shared by every playlist of this kind.
    pub fn generic_cover_name(self) -> &'static str {
        match self {
            PlaylistKind::Genre => "Radio - all",
            PlaylistKind::Year => "Back to - all",
            PlaylistKind::Artist => "This is - all",
            PlaylistKind::PersonalTopTracks => "Top Tracks - all",
            PlaylistKind::PersonalDiscovery => "Discovery Mix - all",
            PlaylistKind::PersonalRecent => "Recent Favorites - all",
            PlaylistKind::PersonalGenreMix => "Genre Mix - all",
        }
    }

    /// Recovers the kind and subject from a display name written by a previous cycle.
    pub fn infer(name: &str) -> Option<(PlaylistKind, String)> {
        let name = name.trim();
        let personal = [
            ("Top Tracks - ", PlaylistKind::PersonalTopTracks),
            ("Discovery Mix - ", PlaylistKind::PersonalDiscovery),
            ("Recent Favorites - ", PlaylistKind::PersonalRecent),
            ("Genre Mix - ", PlaylistKind::PersonalGenreMix),
        ];
        for (prefix, kind) in personal {
            if let Some(user) = name.strip_prefix(prefix) {
                if !user.trim().is_empty() {
                    return Some((kind, user.trim().to_string()));
                }
            }
        }
        if let Some(rest) = name.strip_prefix("This is ") {
            let artist = strip_artist_suffix(rest);
            if !artist.is_empty() {
                return Some((PlaylistKind::Artist, artist.to_string()));
            }
        }
        if let Some(rest) = name.strip_prefix("Back to the ") {
            let decade = rest.trim().trim_end_matches('s');
            if !decade.is_empty() && decade.chars().all(|c| c.is_ascii_digit()) {
                return Some((PlaylistKind::Year, decade.to_string()));
            }
        }
        if let Some(genre) = name.strip_suffix(" Radio") {
            if !genre.trim().is_empty() {
                return Some((PlaylistKind::Genre, genre.trim().to_string()));
            }
        }
        None
    }
}

// "Artist!", "Artist!!", "Artist!2" all name the same artist.
fn strip_artist_suffix(value: &str) -> &str {
    let value = value.trim();
    let without_digits = value.trim_end_matches(|c: char| c.is_ascii_digit());
    if without_digits.ends_with('!') {
        without_digits.trim_end_matches('!').trim_end()
    } else {
        value
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverTier {
    Generated,
    External,
    Predefined,
    LibraryFolder,
}

impl CoverTier {
    pub fn label(self) -> &'static str {
        match self {
            CoverTier::Generated => "generated",
            CoverTier::External => "external",
            CoverTier::Predefined => "predefined",
            CoverTier::LibraryFolder => "library folder",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoverCandidate {
    pub path: PathBuf,
    pub tier: CoverTier,
}

#[derive(Clone, Debug)]
pub struct Playlist {
    pub kind: PlaylistKind,
    pub name: String,
    pub subject: String,
    pub tracks: Vec<Arc<Track>>,
    pub cover: Option<CoverCandidate>,
    pub owner: Option<String>,
}

impl Playlist {
    pub fn new(kind: PlaylistKind, subject: &str, tracks: Vec<Arc<Track>>) -> Self {
        Self {
            kind,
            name: normalize_name(&kind.display_name(subject)),
            subject: subject.to_string(),
            tracks,
            cover: None,
            owner: None,
        }
    }

    pub fn owned_by(mut self, user_id: &str) -> Self {
        self.owner = Some(user_id.to_string());
        self
    }

    pub fn visibility(&self) -> Visibility {
        self.kind.visibility()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayRecord {
    pub track_id: String,
    pub play_count: u32,
    pub favorite: bool,
    /// Unix seconds.
    pub last_played: Option<i64>,
}

pub fn fold_key(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Derives a per-playlist RNG seed so shuffles do not depend on processing order.
pub fn derive_seed(seed: u64, key: &str) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    hasher.update(key.as_bytes());
    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// Folds typographic quotes and dashes to ASCII and strips control bytes.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '\u{2018}' | '\u{2019}' | '\u{201B}' | '\u{2032}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201F}' | '\u{2033}' => out.push('"'),
            '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}'
            | '\u{2212}' => out.push('-'),
            '\u{00A0}' => out.push(' '),
            '\0' => {}
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    let trimmed = out.trim();
    if trimmed.is_empty() {
        UNKNOWN_PLAYLIST.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn sanitize_dir_name(name: &str) -> String {
    let normalized = normalize_name(name);
    let mut out = String::with_capacity(normalized.len());
    for ch in normalized.chars() {
        match ch {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => out.push('_'),
            c => out.push(c),
        }
    }
    let trimmed = out.trim().trim_end_matches('.').trim_end();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '_') {
        UNKNOWN_PLAYLIST.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn image_ext_from_bytes(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xff, 0xd8, 0xff]) {
        Some("jpg")
    } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("png")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("webp")
    } else if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" && &bytes[8..12] == b"avif" {
        Some("avif")
    } else if bytes.starts_with(b"BM") {
        Some("bmp")
    } else {
        None
    }
}

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Writes through a sibling temp file and renames it into place.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    let temp_path = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));
    let result = (|| {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

pub fn copy_atomic(source: &Path, dest: &Path) -> io::Result<()> {
    let data = fs::read(source)?;
    write_atomic(dest, &data)
}
