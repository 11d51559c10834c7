use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use common::{image_ext_from_bytes, sanitize_dir_name, write_atomic, Playlist, Track, IMAGE_EXTENSIONS};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::{debug, warn};

pub const PLAYLIST_FILE: &str = "playlist.xml";
pub const COVER_STEM: &str = "cover";
pub const XSPF_NS: &str = "http://xspf.org/ns/0/";

#[derive(Debug)]
pub enum WriteError {
    Io(io::Error),
    Xml(String),
}

impl std::fmt::Display for WriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteError::Io(err) => write!(f, "io error: {}", err),
            WriteError::Xml(message) => write!(f, "xml error: {}", message),
        }
    }
}

impl std::error::Error for WriteError {}

impl From<io::Error> for WriteError {
    fn from(err: io::Error) -> Self {
        WriteError::Io(err)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackEntry {
    pub location: Option<String>,
    pub title: String,
    pub creator: Option<String>,
    pub album: Option<String>,
}

impl TrackEntry {
    pub fn from_track(track: &Track) -> Self {
        Self {
            location: track
                .path
                .as_deref()
                .filter(|path| !path.is_empty())
                .map(|path| format!("file://{}", encode_path(path))),
            title: track.title.clone(),
            creator: track.artist().map(str::to_string),
            album: track.album.clone(),
        }
    }

    /// Filesystem path behind a `file://` location.
    pub fn path(&self) -> Option<PathBuf> {
        let location = self.location.as_deref()?;
        let raw = location.strip_prefix("file://").unwrap_or(location);
        let decoded = match urlencoding::decode(raw) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned(),
        };
        Some(PathBuf::from(decoded))
    }
}

/// Percent-encodes each path segment, keeping the separators.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaylistFile {
    pub title: String,
    pub tracks: Vec<TrackEntry>,
}

impl PlaylistFile {
    pub fn from_playlist(playlist: &Playlist) -> Self {
        Self {
            title: playlist.name.clone(),
            tracks: playlist
                .tracks
                .iter()
                .map(|track| TrackEntry::from_track(track))
                .collect(),
        }
    }
}

fn xml_err(err: impl std::fmt::Display) -> WriteError {
    WriteError::Xml(err.to_string())
}

fn text_element<W: io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: &str,
) -> Result<(), WriteError> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)?;
    Ok(())
}

pub fn render_xspf(file: &PlaylistFile) -> Result<Vec<u8>, WriteError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(xml_err)?;
    let mut root = BytesStart::new("playlist");
    root.push_attribute(("version", "1"));
    root.push_attribute(("xmlns", XSPF_NS));
    writer.write_event(Event::Start(root)).map_err(xml_err)?;
    text_element(&mut writer, "title", &file.title)?;
    writer
        .write_event(Event::Start(BytesStart::new("trackList")))
        .map_err(xml_err)?;
    for entry in &file.tracks {
        writer
            .write_event(Event::Start(BytesStart::new("track")))
            .map_err(xml_err)?;
        if let Some(location) = &entry.location {
            text_element(&mut writer, "location", location)?;
        }
        text_element(&mut writer, "title", &entry.title)?;
        if let Some(creator) = &entry.creator {
            text_element(&mut writer, "creator", creator)?;
        }
        if let Some(album) = &entry.album {
            text_element(&mut writer, "album", album)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("track")))
            .map_err(xml_err)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("trackList")))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("playlist")))
        .map_err(xml_err)?;
    let mut out = writer.into_inner();
    out.push(b'\n');
    Ok(out)
}

pub fn parse_xspf(data: &[u8]) -> Result<PlaylistFile, WriteError> {
    let mut reader = Reader::from_reader(data);
    // Field values keep their edge whitespace.
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut file = PlaylistFile::default();
    let mut current: Option<TrackEntry> = None;
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.local_name().as_ref()).to_string();
                if name == "track" {
                    current = Some(TrackEntry::default());
                }
                stack.push(name);
            }
            Event::Empty(start) => {
                if start.local_name().as_ref() == b"track" {
                    file.tracks.push(TrackEntry::default());
                }
            }
            Event::End(_) => {
                if stack.pop().as_deref() == Some("track") {
                    if let Some(entry) = current.take() {
                        file.tracks.push(entry);
                    }
                }
            }
            Event::Text(text) => {
                let value = text.unescape().map_err(xml_err)?;
                // Indentation between elements.
                if in_field(&stack) || !value.trim().is_empty() {
                    assign_text(&stack, &mut file, current.as_mut(), &value);
                }
            }
            Event::CData(data) => {
                let value = String::from_utf8_lossy(&data.into_inner()).to_string();
                assign_text(&stack, &mut file, current.as_mut(), &value);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(file)
}

fn in_field(stack: &[String]) -> bool {
    matches!(
        stack.last().map(String::as_str),
        Some("title" | "location" | "creator" | "album")
    )
}

fn assign_text(stack: &[String], file: &mut PlaylistFile, entry: Option<&mut TrackEntry>, value: &str) {
    let Some(field) = stack.last().map(String::as_str) else {
        return;
    };
    match entry {
        Some(entry) => {
            let slot = match field {
                "location" => entry.location.get_or_insert_with(String::new),
                "title" => &mut entry.title,
                "creator" => entry.creator.get_or_insert_with(String::new),
                "album" => entry.album.get_or_insert_with(String::new),
                _ => return,
            };
            slot.push_str(value);
        }
        None if stack.len() == 2 && field == "title" => file.title.push_str(value),
        None => {}
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoverWrite {
    pub path: PathBuf,
    pub changed: bool,
}

/// A playlist directory left by an earlier cycle.
#[derive(Clone, Debug)]
pub struct ExistingPlaylist {
    pub dir: PathBuf,
    pub title: String,
}

/// Persists playlists as `<root>/<sanitized name>/playlist.xml` plus `cover.<ext>`.
#[derive(Clone, Debug)]
pub struct PlaylistWriter {
    root: PathBuf,
}

impl PlaylistWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn playlist_dir(&self, name: &str) -> PathBuf {
        self.root.join(sanitize_dir_name(name))
    }

    pub fn write(&self, playlist: &Playlist) -> Result<PathBuf, WriteError> {
        let dir = self.playlist_dir(&playlist.name);
        fs::create_dir_all(&dir)?;
        let data = render_xspf(&PlaylistFile::from_playlist(playlist))?;
        write_atomic(&dir.join(PLAYLIST_FILE), &data)?;
        if let Some(cover) = &playlist.cover {
            self.write_cover(&dir, &cover.path)?;
        }
        debug!(
            "Wrote '{}' ({} tracks) to {}",
            playlist.name,
            playlist.tracks.len(),
            dir.display()
        );
        Ok(dir)
    }

    /// Installs `source` as the directory's cover and removes covers with other extensions.
    pub fn write_cover(&self, dir: &Path, source: &Path) -> Result<CoverWrite, WriteError> {
        let data = fs::read(source)?;
        let ext = image_ext_from_bytes(&data)
            .map(str::to_string)
            .or_else(|| {
                source
                    .extension()
                    .map(|ext| ext.to_string_lossy().to_lowercase())
                    .filter(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
            })
            .unwrap_or_else(|| artwork::OUTPUT_EXT.to_string());
        let dest = dir.join(format!("{}.{}", COVER_STEM, ext));
        let unchanged = fs::read(&dest)
            .map(|existing| blake3::hash(&existing) == blake3::hash(&data))
            .unwrap_or(false);
        if !unchanged {
            write_atomic(&dest, &data)?;
        }
        for other in IMAGE_EXTENSIONS.iter().filter(|other| **other != ext) {
            let stale = dir.join(format!("{}.{}", COVER_STEM, other));
            if stale.is_file() {
                fs::remove_file(&stale)?;
                debug!("Removed stale cover {}", stale.display());
            }
        }
        Ok(CoverWrite {
            path: dest,
            changed: !unchanged,
        })
    }

    pub fn read(&self, dir: &Path) -> Result<PlaylistFile, WriteError> {
        parse_xspf(&fs::read(dir.join(PLAYLIST_FILE))?)
    }

    /// Playlist directories under the root, sorted by path.
    pub fn list_existing(&self) -> Result<Vec<ExistingPlaylist>, WriteError> {
        let mut dirs: Vec<PathBuf> = fs::read_dir(&self.root)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.join(PLAYLIST_FILE).is_file())
            .collect();
        dirs.sort();
        let mut existing = Vec::with_capacity(dirs.len());
        for dir in dirs {
            let title = match self.read(&dir) {
                Ok(file) if !file.title.trim().is_empty() => file.title,
                Ok(_) => dir_title(&dir),
                Err(err) => {
                    warn!("Unreadable playlist in {}: {}", dir.display(), err);
                    dir_title(&dir)
                }
            };
            existing.push(ExistingPlaylist { dir, title });
        }
        Ok(existing)
    }
}

fn dir_title(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CoverCandidate, CoverTier, PlaylistKind};
    use std::sync::Arc;

    fn track(id: &str, title: &str, artist: &str, album: Option<&str>, path: Option<&str>) -> Arc<Track> {
        Arc::new(Track {
            id: id.to_string(),
            title: title.to_string(),
            artists: vec![artist.to_string()],
            album: album.map(str::to_string),
            genres: Vec::new(),
            year: None,
            path: path.map(str::to_string),
        })
    }

    fn sample() -> Playlist {
        Playlist::new(
            PlaylistKind::Artist,
            "AC/DC",
            vec![
                track("2", "T.N.T.", "AC/DC", Some("High Voltage"), Some("/music/AC DC/High Voltage/02 T.N.T..flac")),
                track("1", "Rock & Roll <Ain't> Noise", "AC/DC", None, Some("/music/AC DC/Flick/01 #1.flac")),
                track("3", "Untitled", "AC/DC", Some("Demos"), None),
            ],
        )
    }

    #[test]
    fn xspf_round_trip_keeps_order_and_fields() {
        let playlist = sample();
        let file = PlaylistFile::from_playlist(&playlist);
        let data = render_xspf(&file).unwrap();
        let text = String::from_utf8(data.clone()).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(text.contains("xmlns=\"http://xspf.org/ns/0/\""));
        assert!(text.contains("&lt;Ain&apos;t&gt;") || text.contains("&lt;Ain't&gt;"));
        let parsed = parse_xspf(&data).unwrap();
        assert_eq!(parsed, file);
        assert_eq!(parsed.title, "This is AC/DC!");
        assert_eq!(
            parsed.tracks[1].path(),
            Some(PathBuf::from("/music/AC DC/Flick/01 #1.flac"))
        );
        assert_eq!(parsed.tracks[2].location, None);
    }

    #[test]
    fn locations_encode_each_segment() {
        let path = "/music/Sigur Rós/Ágætis byrjun/01 #1.flac";
        let entry = TrackEntry::from_track(&track("1", "Intro", "Sigur Rós", None, Some(path)));
        assert_eq!(
            entry.location.as_deref(),
            Some("file:///music/Sigur%20R%C3%B3s/%C3%81g%C3%A6tis%20byrjun/01%20%231.flac")
        );
        assert_eq!(entry.path(), Some(PathBuf::from(path)));
    }

    #[test]
    fn round_trip_keeps_edge_whitespace() {
        let file = PlaylistFile {
            title: " Late Night Radio ".to_string(),
            tracks: vec![TrackEntry {
                location: Some("file:///music/Bj%C3%B6rk/01.flac".to_string()),
                title: "Intro ".to_string(),
                creator: Some(" Björk".to_string()),
                album: Some("  ".to_string()),
            }],
        };
        let parsed = parse_xspf(&render_xspf(&file).unwrap()).unwrap();
        assert_eq!(parsed, file);
    }

    #[test]
    fn parses_foreign_prefixes_and_cdata() {
        let data = br#"<?xml version="1.0"?>
<x:playlist xmlns:x="http://xspf.org/ns/0/">
  <x:title><![CDATA[Jazz Radio]]></x:title>
  <x:trackList>
    <x:track><x:title>So What</x:title><x:creator>Miles Davis</x:creator></x:track>
    <x:track/>
  </x:trackList>
</x:playlist>"#;
        let parsed = parse_xspf(data).unwrap();
        assert_eq!(parsed.title, "Jazz Radio");
        assert_eq!(parsed.tracks.len(), 2);
        assert_eq!(parsed.tracks[0].creator.as_deref(), Some("Miles Davis"));
        assert_eq!(parsed.tracks[0].album, None);
    }

    #[test]
    fn writes_into_sanitized_directory() {
        let dir = tempfile::tempdir().unwrap();
        let writer = PlaylistWriter::new(dir.path());
        let written = writer.write(&sample()).unwrap();
        assert_eq!(written, dir.path().join("This is AC_DC!"));
        let file = writer.read(&written).unwrap();
        assert_eq!(file.title, "This is AC/DC!");
        assert_eq!(file.tracks.len(), 3);
        let existing = writer.list_existing().unwrap();
        assert_eq!(existing.len(), 1);
        assert_eq!(existing[0].title, "This is AC/DC!");
    }

    #[test]
    fn cover_replaces_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let writer = PlaylistWriter::new(dir.path().join("playlists"));
        let source = dir.path().join("art.png");
        fs::write(&source, b"\x89PNG\r\n\x1a\nbody").unwrap();
        let mut playlist = sample();
        playlist.cover = Some(CoverCandidate {
            path: source.clone(),
            tier: CoverTier::Predefined,
        });
        let target = writer.playlist_dir(&playlist.name);
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("cover.jpg"), b"old").unwrap();

        writer.write(&playlist).unwrap();
        assert!(target.join("cover.png").is_file());
        assert!(!target.join("cover.jpg").exists());

        let again = writer.write_cover(&target, &source).unwrap();
        assert!(!again.changed);
        assert_eq!(again.path, target.join("cover.png"));
    }
}
