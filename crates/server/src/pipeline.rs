use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use artwork::FontStack;
use catalog::CatalogIndex;
use common::{sanitize_dir_name, CoverTier, Playlist, PlaylistKind, Track};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::builder::PlaylistBuilder;
use crate::covers::{ArtistFolders, CoverRequest, CoverResolver};
use crate::discovery::DiscoveryRanker;
use crate::providers::{HistoryProvider, ProviderError, Providers};
use crate::settings::Settings;
use crate::state::{unix_now, AppState, CycleGuard};
use crate::writer::{PlaylistWriter, WriteError};

#[derive(Debug)]
pub enum CycleError {
    Catalog(ProviderError),
    Write(WriteError),
    Task(String),
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleError::Catalog(err) => write!(f, "catalog fetch failed: {}", err),
            CycleError::Write(err) => write!(f, "write failed: {}", err),
            CycleError::Task(message) => write!(f, "worker task failed: {}", message),
        }
    }
}

impl std::error::Error for CycleError {}

impl From<WriteError> for CycleError {
    fn from(err: WriteError) -> Self {
        CycleError::Write(err)
    }
}

impl From<tokio::task::JoinError> for CycleError {
    fn from(err: tokio::task::JoinError) -> Self {
        CycleError::Task(err.to_string())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ItemFailure {
    pub item: String,
    pub error: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct CycleReport {
    pub started_at: u64,
    pub duration_ms: u64,
    pub tracks: usize,
    pub users: usize,
    pub playlists_built: usize,
    pub playlists_written: usize,
    /// Cover tier label to number of playlists it served.
    pub covers: BTreeMap<String, usize>,
    pub without_cover: usize,
    pub library_scan_triggered: bool,
    pub failures: Vec<ItemFailure>,
}

/// State owned by one pipeline invocation.
pub struct CycleContext {
    pub settings: Arc<Settings>,
    pub index: Arc<CatalogIndex>,
    pub folders: Arc<ArtistFolders>,
}

impl CycleContext {
    /// Builds the index and artist folder map off the async runtime.
    pub async fn prepare(
        settings: Arc<Settings>,
        tracks: Vec<Track>,
    ) -> Result<Self, CycleError> {
        let build_settings = Arc::clone(&settings);
        let (index, folders) = tokio::task::spawn_blocking(move || {
            let index = CatalogIndex::build(tracks, &build_settings.normalizer);
            let folders = ArtistFolders::build(index.tracks(), &build_settings.path_map);
            (index, folders)
        })
        .await?;
        Ok(Self {
            settings,
            index: Arc::new(index),
            folders: Arc::new(folders),
        })
    }

    pub async fn load_fonts(&self) -> Option<Arc<FontStack>> {
        let covers = &self.settings.covers;
        if !covers.custom_artist_covers && !covers.genre_banners {
            return None;
        }
        let paths = self.settings.covers.font_paths.clone();
        match tokio::task::spawn_blocking(move || FontStack::load(&paths)).await {
            Ok(Ok(fonts)) => {
                debug!("Loaded {} cover fonts", fonts.len());
                Some(Arc::new(fonts))
            }
            Ok(Err(err)) => {
                warn!("Cover fonts unavailable: {}", err);
                None
            }
            Err(err) => {
                warn!("Font loading task failed: {}", err);
                None
            }
        }
    }
}

/// One generation cycle: fetch, index, build, resolve covers, write, rescan.
pub async fn run_generation(
    settings: Arc<Settings>,
    providers: &Providers,
) -> Result<CycleReport, CycleError> {
    let started = Instant::now();
    let mut report = CycleReport {
        started_at: unix_now(),
        ..CycleReport::default()
    };

    let tracks = providers
        .catalog
        .fetch_tracks()
        .await
        .map_err(CycleError::Catalog)?;
    info!("Fetched {} tracks from the catalog", tracks.len());
    report.tracks = tracks.len();
    if tracks.is_empty() {
        warn!("Catalog returned no tracks; nothing to generate");
    }

    let ctx = CycleContext::prepare(Arc::clone(&settings), tracks).await?;
    let index = Arc::clone(&ctx.index);
    let build_settings = Arc::clone(&settings);
    let mut playlists =
        tokio::task::spawn_blocking(move || PlaylistBuilder::new(&build_settings, &index).build_all())
            .await?;

    if settings.types.personal {
        match providers.history.as_ref() {
            Some(history) => {
                let personal = personal_playlists(&ctx, history, &mut report).await;
                playlists.extend(personal);
            }
            None => info!("No playback history source; personal playlists skipped"),
        }
    }
    report.playlists_built = playlists.len();
    info!("Built {} playlists", playlists.len());

    let fonts = if playlists
        .iter()
        .any(|p| matches!(p.kind, PlaylistKind::Artist | PlaylistKind::Genre))
    {
        ctx.load_fonts().await
    } else {
        None
    };
    let resolver = Arc::new(CoverResolver::standard(
        &settings,
        providers,
        Arc::clone(&ctx.folders),
        fonts,
    ));
    let writer = PlaylistWriter::new(&settings.playlists_root);
    let outcomes: Vec<(String, Result<Option<CoverTier>, String>)> = stream::iter(playlists)
        .map(|playlist| {
            let resolver = Arc::clone(&resolver);
            let writer = writer.clone();
            let scratch = settings.scratch_root.clone();
            async move {
                let name = playlist.name.clone();
                let result = finish_playlist(&resolver, writer, &scratch, playlist).await;
                (name, result)
            }
        })
        .buffer_unordered(settings.worker_concurrency)
        .collect()
        .await;

    for (name, outcome) in outcomes {
        match outcome {
            Ok(tier) => {
                report.playlists_written += 1;
                match tier {
                    Some(tier) => *report.covers.entry(tier.label().to_string()).or_default() += 1,
                    None => report.without_cover += 1,
                }
            }
            Err(error) => {
                warn!("Playlist '{}' failed: {}", name, error);
                report.failures.push(ItemFailure { item: name, error });
            }
        }
    }

    if settings.trigger_library_scan && report.playlists_written > 0 {
        match providers.catalog.trigger_library_scan().await {
            Ok(()) => {
                info!("Requested a library rescan");
                report.library_scan_triggered = true;
            }
            Err(err) => warn!("Library rescan request failed: {}", err),
        }
    }

    clear_scratch(&settings.scratch_root).await;
    report.duration_ms = started.elapsed().as_millis() as u64;
    info!(
        "Generation finished in {} ms: {} written, {} without cover, {} failed",
        report.duration_ms,
        report.playlists_written,
        report.without_cover,
        report.failures.len()
    );
    Ok(report)
}

async fn personal_playlists(
    ctx: &CycleContext,
    history: &Arc<dyn HistoryProvider>,
    report: &mut CycleReport,
) -> Vec<Playlist> {
    let settings = &ctx.settings;
    let users = match history.list_users().await {
        Ok(users) => users,
        Err(ProviderError::Unsupported) => {
            info!("Playback history unavailable; personal playlists skipped");
            return Vec::new();
        }
        Err(err) => {
            warn!("Listing users failed: {}", err);
            report.failures.push(ItemFailure {
                item: "users".to_string(),
                error: err.to_string(),
            });
            return Vec::new();
        }
    };
    let mut selected: Vec<_> = users
        .into_iter()
        .filter(|user| settings.personal.users.includes(user))
        .collect();
    selected.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    info!("Building personal playlists for {} users", selected.len());
    report.users = selected.len();

    let mut histories: Vec<_> = stream::iter(selected)
        .map(|user| {
            let history = Arc::clone(history);
            async move {
                let records = history.play_history(&user).await;
                (user, records)
            }
        })
        .buffer_unordered(settings.worker_concurrency)
        .collect()
        .await;
    histories.sort_by(|a, b| a.0.name.cmp(&b.0.name).then_with(|| a.0.id.cmp(&b.0.id)));

    let ranker = DiscoveryRanker::new(settings, &ctx.index);
    let mut playlists = Vec::new();
    for (user, records) in histories {
        match records {
            Ok(records) => playlists.extend(ranker.playlists_for(&user, &records)),
            Err(err) => {
                warn!("Play history for {} failed: {}", user.name, err);
                report.failures.push(ItemFailure {
                    item: format!("user {}", user.name),
                    error: err.to_string(),
                });
            }
        }
    }
    playlists
}

async fn finish_playlist(
    resolver: &CoverResolver,
    writer: PlaylistWriter,
    scratch: &Path,
    mut playlist: Playlist,
) -> Result<Option<CoverTier>, String> {
    let work_dir = scratch.join(sanitize_dir_name(&playlist.name));
    tokio::fs::create_dir_all(&work_dir)
        .await
        .map_err(|err| format!("scratch dir: {}", err))?;
    let request = CoverRequest {
        kind: playlist.kind,
        name: &playlist.name,
        subject: &playlist.subject,
        work_dir: &work_dir,
    };
    let cover = resolver.resolve(&request).await;
    let tier = cover.as_ref().map(|cover| cover.tier);
    playlist.cover = cover;
    tokio::task::spawn_blocking(move || writer.write(&playlist))
        .await
        .map_err(|err| err.to_string())?
        .map_err(|err| err.to_string())?;
    Ok(tier)
}

pub async fn clear_scratch(scratch: &Path) {
    match tokio::fs::remove_dir_all(scratch).await {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!("Failed to clear scratch {}: {}", scratch.display(), err),
    }
}

/// Runs a generation cycle holding `guard` and records the outcome.
pub async fn generate(state: AppState, guard: CycleGuard) -> Result<CycleReport, CycleError> {
    let result = run_generation(state.settings(), &state.providers).await;
    if let Err(err) = &result {
        warn!("Generation cycle failed: {}", err);
    }
    state.record_generation(&result);
    drop(guard);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::test_settings;
    use crate::state::testing::{MockCatalog, MockHistory};
    use common::{PlayRecord, User};
    use std::fs;
    use std::sync::atomic::Ordering;

    fn library() -> Vec<Track> {
        (0..40)
            .map(|i| Track {
                id: format!("t{:02}", i),
                title: format!("Song {}", i),
                artists: vec![format!("Artist {}", i % 8)],
                album: Some(format!("Album {}", i % 16)),
                genres: vec!["Jazz".to_string()],
                year: Some(1960 + i % 5),
                path: Some(format!("/music/Artist {}/Album {}/{:02}.flac", i % 8, i % 16, i)),
            })
            .collect()
    }

    fn settings(root: &Path) -> Arc<Settings> {
        let mut settings = test_settings();
        settings.playlists_root = root.join("playlists");
        settings.cover_root = root.join("covers");
        settings.scratch_root = root.join("scratch");
        settings.covers.custom_artist_covers = false;
        settings.covers.genre_banners = false;
        settings.trigger_library_scan = true;
        Arc::new(settings)
    }

    #[tokio::test]
    async fn writes_playlists_and_requests_rescan() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        fs::create_dir_all(&settings.cover_root).unwrap();
        fs::write(settings.cover_root.join("Radio - all.png"), b"\x89PNG\r\n\x1a\n").unwrap();
        let catalog = Arc::new(MockCatalog {
            tracks: library(),
            ..MockCatalog::default()
        });
        let history = MockHistory {
            users: vec![User {
                id: "u1".to_string(),
                name: "anna".to_string(),
            }],
            records: (0..12)
                .map(|i| PlayRecord {
                    track_id: format!("t{:02}", i),
                    play_count: 3,
                    favorite: false,
                    last_played: Some(100 + i),
                })
                .collect(),
        };
        let providers = Providers {
            catalog: catalog.clone(),
            history: Some(Arc::new(history)),
            art: None,
        };
        let report = run_generation(Arc::clone(&settings), &providers).await.unwrap();
        assert_eq!(report.tracks, 40);
        assert_eq!(report.users, 1);
        assert!(report.failures.is_empty());
        assert_eq!(report.playlists_written, report.playlists_built);
        assert!(report.library_scan_triggered);
        assert_eq!(catalog.scans.load(Ordering::SeqCst), 1);

        let jazz = settings.playlists_root.join("Jazz Radio");
        assert!(jazz.join("playlist.xml").is_file());
        assert!(jazz.join("cover.png").is_file());
        assert!(settings
            .playlists_root
            .join("Back to the 1960s")
            .join("playlist.xml")
            .is_file());
        assert!(settings
            .playlists_root
            .join("Top Tracks - anna")
            .join("playlist.xml")
            .is_file());
        assert_eq!(report.covers.get("predefined"), Some(&1));
        assert!(!settings.scratch_root.exists());
    }

    #[tokio::test]
    async fn catalog_failure_aborts_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let catalog = Arc::new(MockCatalog {
            tracks: library(),
            fail: true,
            ..MockCatalog::default()
        });
        let providers = Providers {
            catalog: catalog.clone(),
            history: None,
            art: None,
        };
        let result = run_generation(Arc::clone(&settings), &providers).await;
        assert!(matches!(result, Err(CycleError::Catalog(_))));
        assert!(!settings.playlists_root.exists());
        assert_eq!(catalog.scans.load(Ordering::SeqCst), 0);
    }
}
