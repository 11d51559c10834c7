use std::io;
use std::sync::Arc;
use std::time::Instant;

use common::{sanitize_dir_name, CoverTier, PlaylistKind};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::covers::{CoverRequest, CoverResolver};
use crate::pipeline::{clear_scratch, CycleContext, CycleError};
use crate::providers::Providers;
use crate::settings::Settings;
use crate::state::{unix_now, AppState, CycleGuard};
use crate::writer::{ExistingPlaylist, PlaylistWriter, WriteError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverOutcome {
    Updated,
    Unchanged,
    NoCover,
    Error,
    /// The time budget ran out before this playlist was attempted.
    NotReached,
}

#[derive(Clone, Debug, Serialize)]
pub struct CoverUpdate {
    pub playlist: String,
    pub outcome: CoverOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<CoverTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CoverUpdate {
    fn new(playlist: &str, outcome: CoverOutcome) -> Self {
        Self {
            playlist: playlist.to_string(),
            outcome,
            tier: None,
            detail: None,
        }
    }

    fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct UpdateCoversReport {
    pub started_at: u64,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub updated: usize,
    pub unchanged: usize,
    pub no_cover: usize,
    pub errors: usize,
    pub not_reached: usize,
    pub items: Vec<CoverUpdate>,
}

impl UpdateCoversReport {
    fn tally(&mut self) {
        for item in &self.items {
            match item.outcome {
                CoverOutcome::Updated => self.updated += 1,
                CoverOutcome::Unchanged => self.unchanged += 1,
                CoverOutcome::NoCover => self.no_cover += 1,
                CoverOutcome::Error => self.errors += 1,
                CoverOutcome::NotReached => self.not_reached += 1,
            }
        }
        self.timed_out = self.not_reached > 0
            || self
                .items
                .iter()
                .any(|item| item.detail.as_deref() == Some(TIMED_OUT));
    }
}

const TIMED_OUT: &str = "timed out";

/// Re-resolves covers for every playlist already on disk, within the configured time budget.
pub async fn run_update_covers(
    settings: Arc<Settings>,
    providers: &Providers,
) -> Result<UpdateCoversReport, CycleError> {
    let started = Instant::now();
    let mut report = UpdateCoversReport {
        started_at: unix_now(),
        ..UpdateCoversReport::default()
    };

    let writer = PlaylistWriter::new(&settings.playlists_root);
    let listing = writer.clone();
    let existing = match tokio::task::spawn_blocking(move || listing.list_existing()).await? {
        Ok(existing) => existing,
        Err(WriteError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
            info!(
                "No playlists under {}; nothing to update",
                settings.playlists_root.display()
            );
            return Ok(report);
        }
        Err(err) => return Err(err.into()),
    };
    info!("Updating covers for {} playlists", existing.len());

    let tracks = match providers.catalog.fetch_tracks().await {
        Ok(tracks) => tracks,
        Err(err) => {
            warn!("Catalog fetch failed; library folder covers unavailable: {}", err);
            Vec::new()
        }
    };
    let ctx = CycleContext::prepare(Arc::clone(&settings), tracks).await?;
    debug!("Found {} artist folders", ctx.folders.len());
    let fonts = ctx.load_fonts().await;
    let resolver = Arc::new(CoverResolver::standard(
        &settings,
        providers,
        Arc::clone(&ctx.folders),
        fonts,
    ));

    let deadline = tokio::time::Instant::now() + settings.update_covers_budget;
    let mut items: Vec<CoverUpdate> = stream::iter(existing)
        .map(|playlist| {
            let resolver = Arc::clone(&resolver);
            let writer = writer.clone();
            let scratch = settings.scratch_root.clone();
            async move {
                if tokio::time::Instant::now() >= deadline {
                    return CoverUpdate::new(&playlist.title, CoverOutcome::NotReached);
                }
                let title = playlist.title.clone();
                let work = update_one(&resolver, writer, &scratch, playlist);
                match tokio::time::timeout_at(deadline, work).await {
                    Ok(update) => update,
                    Err(_) => CoverUpdate::new(&title, CoverOutcome::Error).detail(TIMED_OUT),
                }
            }
        })
        .buffer_unordered(settings.worker_concurrency)
        .collect()
        .await;
    items.sort_by(|a, b| a.playlist.cmp(&b.playlist));
    report.items = items;
    report.tally();

    clear_scratch(&settings.scratch_root).await;
    report.duration_ms = started.elapsed().as_millis() as u64;
    info!(
        "Cover update finished in {} ms: {} updated, {} unchanged, {} without cover, {} errors, {} not reached",
        report.duration_ms,
        report.updated,
        report.unchanged,
        report.no_cover,
        report.errors,
        report.not_reached
    );
    Ok(report)
}

async fn update_one(
    resolver: &CoverResolver,
    writer: PlaylistWriter,
    scratch: &std::path::Path,
    playlist: ExistingPlaylist,
) -> CoverUpdate {
    let Some((kind, subject)) = PlaylistKind::infer(&playlist.title) else {
        debug!("Cannot infer the kind of '{}'", playlist.title);
        return CoverUpdate::new(&playlist.title, CoverOutcome::NoCover)
            .detail("unrecognized playlist name");
    };
    let work_dir = scratch.join(sanitize_dir_name(&playlist.title));
    if let Err(err) = tokio::fs::create_dir_all(&work_dir).await {
        return CoverUpdate::new(&playlist.title, CoverOutcome::Error)
            .detail(format!("scratch dir: {}", err));
    }
    let request = CoverRequest {
        kind,
        name: &playlist.title,
        subject: &subject,
        work_dir: &work_dir,
    };
    let Some(cover) = resolver.resolve(&request).await else {
        return CoverUpdate::new(&playlist.title, CoverOutcome::NoCover);
    };

    let dir = playlist.dir.clone();
    let source = cover.path.clone();
    let written = tokio::task::spawn_blocking(move || writer.write_cover(&dir, &source)).await;
    let mut update = match written {
        Ok(Ok(write)) if write.changed => CoverUpdate::new(&playlist.title, CoverOutcome::Updated),
        Ok(Ok(_)) => CoverUpdate::new(&playlist.title, CoverOutcome::Unchanged),
        Ok(Err(err)) => {
            warn!("Cover write for '{}' failed: {}", playlist.title, err);
            CoverUpdate::new(&playlist.title, CoverOutcome::Error).detail(err.to_string())
        }
        Err(err) => CoverUpdate::new(&playlist.title, CoverOutcome::Error).detail(err.to_string()),
    };
    update.tier = Some(cover.tier);
    update
}

/// Runs a cover update holding `guard` and records the outcome.
pub async fn update_covers(
    state: AppState,
    guard: CycleGuard,
) -> Result<UpdateCoversReport, CycleError> {
    let result = run_update_covers(state.settings(), &state.providers).await;
    if let Err(err) = &result {
        warn!("Cover update failed: {}", err);
    }
    state.record_update_covers(&result);
    drop(guard);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::test_settings;
    use crate::state::testing::MockCatalog;
    use crate::writer::COVER_STEM;
    use common::{Playlist, Track};
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfirst";

    fn settings(root: &Path) -> Settings {
        let mut settings = test_settings();
        settings.playlists_root = root.join("playlists");
        settings.cover_root = root.join("covers");
        settings.scratch_root = root.join("scratch");
        settings.covers.custom_artist_covers = false;
        settings.covers.genre_banners = false;
        settings
    }

    fn providers() -> Providers {
        Providers {
            catalog: Arc::new(MockCatalog::default()),
            history: None,
            art: None,
        }
    }

    fn write_playlist(settings: &Settings, kind: PlaylistKind, subject: &str) -> Playlist {
        let track = Arc::new(Track {
            id: "t1".to_string(),
            title: "Song".to_string(),
            artists: vec!["Artist".to_string()],
            album: None,
            genres: Vec::new(),
            year: None,
            path: None,
        });
        let playlist = Playlist::new(kind, subject, vec![track]);
        PlaylistWriter::new(&settings.playlists_root)
            .write(&playlist)
            .unwrap();
        playlist
    }

    #[tokio::test]
    async fn missing_root_is_an_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(settings(dir.path()));
        let report = run_update_covers(settings, &providers()).await.unwrap();
        assert!(report.items.is_empty());
        assert!(!report.timed_out);
    }

    #[tokio::test]
    async fn updates_then_reports_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(settings(dir.path()));
        fs::create_dir_all(&settings.cover_root).unwrap();
        fs::write(settings.cover_root.join("Radio - all.png"), PNG).unwrap();
        let jazz = write_playlist(&settings, PlaylistKind::Genre, "Jazz");
        write_playlist(&settings, PlaylistKind::Artist, "Nina Simone");

        let first = run_update_covers(Arc::clone(&settings), &providers())
            .await
            .unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.updated, 1);
        assert_eq!(first.no_cover, 1);
        let updated = first
            .items
            .iter()
            .find(|item| item.playlist == jazz.name)
            .unwrap();
        assert_eq!(updated.tier, Some(CoverTier::Predefined));
        let cover = settings
            .playlists_root
            .join("Jazz Radio")
            .join(format!("{}.png", COVER_STEM));
        assert_eq!(fs::read(&cover).unwrap(), PNG);

        let second = run_update_covers(Arc::clone(&settings), &providers())
            .await
            .unwrap();
        assert_eq!(second.updated, 0);
        assert_eq!(second.unchanged, 1);
        assert!(!settings.scratch_root.exists());
    }

    #[tokio::test]
    async fn unrecognized_names_get_no_cover() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(settings(dir.path()));
        let odd = settings.playlists_root.join("Road Trip");
        fs::create_dir_all(&odd).unwrap();
        fs::write(
            odd.join("playlist.xml"),
            "<playlist version=\"1\"><title>Road Trip</title><trackList/></playlist>",
        )
        .unwrap();
        let report = run_update_covers(settings, &providers()).await.unwrap();
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].outcome, CoverOutcome::NoCover);
    }

    #[tokio::test]
    async fn exhausted_budget_marks_items_not_reached() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.update_covers_budget = Duration::ZERO;
        let settings = Arc::new(settings);
        write_playlist(&settings, PlaylistKind::Genre, "Jazz");
        write_playlist(&settings, PlaylistKind::Year, "1970");
        let report = run_update_covers(settings, &providers()).await.unwrap();
        assert_eq!(report.not_reached, 2);
        assert!(report.timed_out);
        assert!(report
            .items
            .iter()
            .all(|item| item.outcome == CoverOutcome::NotReached));
    }
}
