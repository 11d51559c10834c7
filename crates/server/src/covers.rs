use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use artwork::{CoverStyle, FontStack};
use common::{
    fold_key, image_ext_from_bytes, is_image_path, sanitize_dir_name, CoverCandidate, CoverTier,
    PlaylistKind, Track, IMAGE_EXTENSIONS,
};
use futures_util::future::{BoxFuture, FutureExt};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::providers::{ArtProvider, CatalogProvider, ProviderError, Providers};
use crate::settings::{PathMap, Settings};

/// Library image names that stand for an artist, in preference order.
pub const ARTIST_IMAGE_NAMES: [&str; 5] = ["folder", "cover", "artist", "thumb", "front"];

const PRE_1900_DECADE: &str = "1800s";
/// Background for generated genre covers, looked up under the cover root.
pub const FALLBACK_BACKGROUND: &str = "Fallback Radio";

pub struct CoverRequest<'a> {
    pub kind: PlaylistKind,
    pub name: &'a str,
    pub subject: &'a str,
    /// Scratch directory owned by this playlist for downloaded and generated files.
    pub work_dir: &'a Path,
}

/// One step of the cover fallback chain. Absence is `None`, never an error.
pub trait CoverProvider: Send + Sync {
    fn tier(&self) -> CoverTier;

    fn attempt<'a>(&'a self, request: &'a CoverRequest<'a>) -> BoxFuture<'a, Option<PathBuf>>;
}

pub struct CoverResolver {
    tiers: Vec<Box<dyn CoverProvider>>,
}

impl CoverResolver {
    pub fn new(tiers: Vec<Box<dyn CoverProvider>>) -> Self {
        Self { tiers }
    }

    /// Generated, external, predefined, genre banner, then library folder;
    /// disabled tiers are left out.
    pub fn standard(
        settings: &Settings,
        providers: &Providers,
        folders: Arc<ArtistFolders>,
        fonts: Option<Arc<FontStack>>,
    ) -> Self {
        let covers = &settings.covers;
        let mut tiers: Vec<Box<dyn CoverProvider>> = Vec::new();
        if covers.custom_artist_covers {
            match fonts.as_ref() {
                Some(fonts) => tiers.push(Box::new(GeneratedCover {
                    folders: Arc::clone(&folders),
                    catalog: Arc::clone(&providers.catalog),
                    fonts: Arc::clone(fonts),
                    style: covers.style.clone(),
                })),
                None => warn!("No usable fonts; generated artist covers disabled"),
            }
        }
        if covers.external_art {
            if let Some(art) = providers.art.as_ref() {
                tiers.push(Box::new(ExternalArtCover {
                    art: Arc::clone(art),
                }));
            }
        }
        tiers.push(Box::new(PredefinedCover {
            root: settings.cover_root.clone(),
        }));
        if covers.genre_banners {
            match fonts {
                Some(fonts) => tiers.push(Box::new(GenreBannerCover {
                    root: settings.cover_root.clone(),
                    fonts,
                    style: covers.style.clone(),
                })),
                None => warn!("No usable fonts; generated genre covers disabled"),
            }
        }
        tiers.push(Box::new(LibraryFolderCover { folders }));
        let resolver = Self::new(tiers);
        debug!(
            "Cover tiers: {}",
            resolver
                .tiers()
                .map(CoverTier::label)
                .collect::<Vec<_>>()
                .join(", ")
        );
        resolver
    }

    pub fn tiers(&self) -> impl Iterator<Item = CoverTier> + '_ {
        self.tiers.iter().map(|tier| tier.tier())
    }

    pub async fn resolve(&self, request: &CoverRequest<'_>) -> Option<CoverCandidate> {
        for tier in &self.tiers {
            if let Some(path) = tier.attempt(request).await {
                info!(
                    "Cover for '{}' from {} tier: {}",
                    request.name,
                    tier.tier().label(),
                    path.display()
                );
                return Some(CoverCandidate {
                    path,
                    tier: tier.tier(),
                });
            }
        }
        info!("No cover found for '{}'", request.name);
        None
    }
}

/// Artist name to library folder, derived from track paths once per cycle.
#[derive(Clone, Debug, Default)]
pub struct ArtistFolders {
    dirs: HashMap<String, PathBuf>,
}

impl ArtistFolders {
    /// An artist's folder is the track's grandparent (Artist/Album/track) or
    /// parent (Artist/track) whose name matches the artist case-insensitively.
    pub fn build(tracks: &[Arc<Track>], path_map: &PathMap) -> Self {
        let mut dirs = HashMap::new();
        for track in tracks {
            let Some(path) = track.path.as_deref() else {
                continue;
            };
            let local = path_map.local(path);
            for artist in &track.artists {
                let key = fold_key(artist);
                if key.is_empty() || dirs.contains_key(&key) {
                    continue;
                }
                let parent = local.parent();
                let candidates = [parent.and_then(Path::parent), parent];
                if let Some(dir) = candidates
                    .into_iter()
                    .flatten()
                    .find(|dir| dir_matches(dir, &key))
                {
                    dirs.insert(key, dir.to_path_buf());
                }
            }
        }
        debug!("Located {} artist folders", dirs.len());
        Self { dirs }
    }

    pub fn get(&self, artist: &str) -> Option<&Path> {
        self.dirs.get(&fold_key(artist)).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}

fn dir_matches(dir: &Path, key: &str) -> bool {
    dir.file_name()
        .map(|name| fold_key(&name.to_string_lossy()) == key)
        .unwrap_or(false)
}

/// Best `folder|cover|artist|thumb|front.<ext>` image directly inside `dir`.
pub fn find_named_image(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut best: Option<((usize, usize), PathBuf)> = None;
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let (Some(stem), Some(ext)) = (path.file_stem(), path.extension()) else {
            continue;
        };
        let stem = stem.to_string_lossy().to_lowercase();
        let ext = ext.to_string_lossy().to_lowercase();
        let Some(name_rank) = ARTIST_IMAGE_NAMES.iter().position(|name| *name == stem) else {
            continue;
        };
        let Some(ext_rank) = IMAGE_EXTENSIONS.iter().position(|known| *known == ext) else {
            continue;
        };
        let rank = (name_rank, ext_rank);
        if best.as_ref().map(|(current, _)| rank < *current).unwrap_or(true) {
            best = Some((rank, path));
        }
    }
    best.map(|(_, path)| path)
}

/// First image, by path order, in the folders directly below `dir`.
pub fn find_nested_image(dir: &Path) -> Option<PathBuf> {
    WalkDir::new(dir)
        .follow_links(false)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .map(|entry| entry.into_path())
        .find(|path| path.is_file() && is_image_path(path))
}

/// Cover file stems to look for under the cover root, most specific first.
pub fn predefined_stems(kind: PlaylistKind, name: &str, subject: &str) -> Vec<String> {
    let mut stems = vec![name.to_string()];
    let safe = sanitize_dir_name(name);
    if safe != name {
        stems.push(safe);
    }
    if kind == PlaylistKind::Year {
        if let Ok(decade) = subject.trim().parse::<i32>() {
            stems.push(format!("{}s-cover", decade));
            if decade < 1900 {
                stems.push(format!("{}-cover", PRE_1900_DECADE));
            }
        }
    }
    stems.push(kind.generic_cover_name().to_string());
    stems
}

pub fn find_predefined(root: &Path, stems: &[String]) -> Option<PathBuf> {
    stems.iter().find_map(|stem| {
        IMAGE_EXTENSIONS
            .iter()
            .map(|ext| root.join(format!("{}.{}", stem, ext)))
            .find(|path| path.is_file())
    })
}

async fn blocking<T, F>(label: &str, work: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> Option<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(err) => {
            warn!("{} task failed: {}", label, err);
            None
        }
    }
}

/// Stores downloaded bytes under `work_dir/<stem>.<detected ext>`.
async fn store_image(work_dir: &Path, stem: &str, data: Vec<u8>) -> Option<PathBuf> {
    let Some(ext) = image_ext_from_bytes(&data) else {
        debug!("Downloaded {} is not a recognized image", stem);
        return None;
    };
    let dest = work_dir.join(format!("{}.{}", stem, ext));
    blocking("image store", move || match common::write_atomic(&dest, &data) {
        Ok(()) => Some(dest),
        Err(err) => {
            warn!("Failed to store {}: {}", dest.display(), err);
            None
        }
    })
    .await
}

fn log_provider_error(source: &str, artist: &str, err: &ProviderError) {
    match err {
        ProviderError::Backoff => debug!("{} skipped for {}: backing off", source, artist),
        ProviderError::Status(404) | ProviderError::Unsupported => {
            debug!("{} has no image for {}", source, artist)
        }
        err => warn!("{} lookup failed for {}: {}", source, artist, err),
    }
}

/// "This is <Artist>" cover rendered from a library or catalog artist image.
pub struct GeneratedCover {
    pub folders: Arc<ArtistFolders>,
    pub catalog: Arc<dyn CatalogProvider>,
    pub fonts: Arc<FontStack>,
    pub style: CoverStyle,
}

impl GeneratedCover {
    async fn source_image(&self, request: &CoverRequest<'_>) -> Option<PathBuf> {
        if let Some(dir) = self.folders.get(request.subject) {
            let dir = dir.to_path_buf();
            if let Some(path) = blocking("artist folder", move || find_named_image(&dir)).await {
                return Some(path);
            }
        }
        match self.catalog.artist_image(request.subject).await {
            Ok(Some(data)) => store_image(request.work_dir, "source", data).await,
            Ok(None) => None,
            Err(err) => {
                log_provider_error("Catalog artist image", request.subject, &err);
                None
            }
        }
    }

    async fn attempt_inner(&self, request: &CoverRequest<'_>) -> Option<PathBuf> {
        if request.kind != PlaylistKind::Artist {
            return None;
        }
        let source = self.source_image(request).await?;
        let dest = request
            .work_dir
            .join(format!("generated.{}", artwork::OUTPUT_EXT));
        let fonts = Arc::clone(&self.fonts);
        let style = self.style.clone();
        let artist = request.subject.to_string();
        blocking("cover render", move || {
            match artwork::write_cover(&source, &artist, &fonts, &style, &dest) {
                Ok(()) => Some(dest),
                Err(err) => {
                    warn!("Cover render for {} failed: {}", artist, err);
                    None
                }
            }
        })
        .await
    }
}

impl CoverProvider for GeneratedCover {
    fn tier(&self) -> CoverTier {
        CoverTier::Generated
    }

    fn attempt<'a>(&'a self, request: &'a CoverRequest<'a>) -> BoxFuture<'a, Option<PathBuf>> {
        self.attempt_inner(request).boxed()
    }
}

pub struct ExternalArtCover {
    pub art: Arc<dyn ArtProvider>,
}

impl CoverProvider for ExternalArtCover {
    fn tier(&self) -> CoverTier {
        CoverTier::External
    }

    fn attempt<'a>(&'a self, request: &'a CoverRequest<'a>) -> BoxFuture<'a, Option<PathBuf>> {
        async move {
            if request.kind != PlaylistKind::Artist {
                return None;
            }
            match self.art.artist_image(request.subject).await {
                Ok(Some(data)) => store_image(request.work_dir, "external", data).await,
                Ok(None) => None,
                Err(err) => {
                    log_provider_error("External art", request.subject, &err);
                    None
                }
            }
        }
        .boxed()
    }
}

pub struct PredefinedCover {
    pub root: PathBuf,
}

impl CoverProvider for PredefinedCover {
    fn tier(&self) -> CoverTier {
        CoverTier::Predefined
    }

    fn attempt<'a>(&'a self, request: &'a CoverRequest<'a>) -> BoxFuture<'a, Option<PathBuf>> {
        let root = self.root.clone();
        let stems = predefined_stems(request.kind, request.name, request.subject);
        blocking("predefined cover", move || find_predefined(&root, &stems)).boxed()
    }
}

/// "<GENRE>" over "RADIO" drawn on the cover root's fallback background.
pub struct GenreBannerCover {
    pub root: PathBuf,
    pub fonts: Arc<FontStack>,
    pub style: CoverStyle,
}

impl GenreBannerCover {
    async fn attempt_inner(&self, request: &CoverRequest<'_>) -> Option<PathBuf> {
        if request.kind != PlaylistKind::Genre {
            return None;
        }
        let root = self.root.clone();
        let background = blocking("banner background", move || {
            find_predefined(&root, &[FALLBACK_BACKGROUND.to_string()])
        })
        .await?;
        let dest = request
            .work_dir
            .join(format!("generated.{}", artwork::OUTPUT_EXT));
        let fonts = Arc::clone(&self.fonts);
        let style = self.style.clone();
        let genre = request.subject.to_string();
        blocking("banner render", move || {
            match artwork::write_banner(&background, &genre, &fonts, &style, &dest) {
                Ok(()) => Some(dest),
                Err(err) => {
                    warn!("Genre cover for {} failed: {}", genre, err);
                    None
                }
            }
        })
        .await
    }
}

impl CoverProvider for GenreBannerCover {
    fn tier(&self) -> CoverTier {
        CoverTier::Generated
    }

    fn attempt<'a>(&'a self, request: &'a CoverRequest<'a>) -> BoxFuture<'a, Option<PathBuf>> {
        self.attempt_inner(request).boxed()
    }
}

pub struct LibraryFolderCover {
    pub folders: Arc<ArtistFolders>,
}

impl CoverProvider for LibraryFolderCover {
    fn tier(&self) -> CoverTier {
        CoverTier::LibraryFolder
    }

    fn attempt<'a>(&'a self, request: &'a CoverRequest<'a>) -> BoxFuture<'a, Option<PathBuf>> {
        let dir = match request.kind {
            PlaylistKind::Artist => self.folders.get(request.subject).map(Path::to_path_buf),
            _ => None,
        };
        async move {
            let dir = dir?;
            blocking("library folder", move || {
                find_named_image(&dir).or_else(|| find_nested_image(&dir))
            })
            .await
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockTier {
        tier: CoverTier,
        result: Option<PathBuf>,
        calls: Arc<AtomicUsize>,
    }

    impl CoverProvider for MockTier {
        fn tier(&self) -> CoverTier {
            self.tier
        }

        fn attempt<'a>(&'a self, _: &'a CoverRequest<'a>) -> BoxFuture<'a, Option<PathBuf>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = self.result.clone();
            async move { result }.boxed()
        }
    }

    struct PngArt;

    impl ArtProvider for PngArt {
        fn artist_image<'a>(
            &'a self,
            _: &'a str,
        ) -> BoxFuture<'a, Result<Option<Vec<u8>>, ProviderError>> {
            async { Ok(Some(b"\x89PNG\r\n\x1a\nrest".to_vec())) }.boxed()
        }
    }

    fn request<'a>(kind: PlaylistKind, name: &'a str, subject: &'a str, dir: &'a Path) -> CoverRequest<'a> {
        CoverRequest {
            kind,
            name,
            subject,
            work_dir: dir,
        }
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"img").unwrap();
    }

    #[tokio::test]
    async fn first_successful_tier_wins() {
        let tiers = [
            (CoverTier::Generated, None),
            (CoverTier::External, None),
            (CoverTier::Predefined, Some(PathBuf::from("/covers/Rock Radio.jpg"))),
            (CoverTier::LibraryFolder, Some(PathBuf::from("/music/folder.jpg"))),
        ];
        let counters: Vec<Arc<AtomicUsize>> =
            tiers.iter().map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let resolver = CoverResolver::new(
            tiers
                .iter()
                .zip(&counters)
                .map(|((tier, result), calls)| {
                    Box::new(MockTier {
                        tier: *tier,
                        result: result.clone(),
                        calls: Arc::clone(calls),
                    }) as Box<dyn CoverProvider>
                })
                .collect(),
        );
        let dir = tempfile::tempdir().unwrap();
        let found = resolver
            .resolve(&request(PlaylistKind::Artist, "This is Queen!", "Queen", dir.path()))
            .await
            .unwrap();
        assert_eq!(found.tier, CoverTier::Predefined);
        assert_eq!(found.path, PathBuf::from("/covers/Rock Radio.jpg"));
        let calls: Vec<usize> = counters.iter().map(|c| c.load(Ordering::SeqCst)).collect();
        assert_eq!(calls, vec![1, 1, 1, 0]);
    }

    #[tokio::test]
    async fn predefined_prefers_exact_name_and_extension_order() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("Rock Radio.png"));
        touch(&dir.path().join("Rock Radio.jpg"));
        touch(&dir.path().join("Radio - all.jpg"));
        let tier = PredefinedCover {
            root: dir.path().to_path_buf(),
        };
        let work = dir.path().join("work");
        let exact = tier
            .attempt(&request(PlaylistKind::Genre, "Rock Radio", "Rock", &work))
            .await;
        assert_eq!(exact, Some(dir.path().join("Rock Radio.jpg")));
        let generic = tier
            .attempt(&request(PlaylistKind::Genre, "Jazz Radio", "Jazz", &work))
            .await;
        assert_eq!(generic, Some(dir.path().join("Radio - all.jpg")));
        let none = tier
            .attempt(&request(PlaylistKind::Year, "Back to the 1990s", "1990", &work))
            .await;
        assert_eq!(none, None);
    }

    #[tokio::test]
    async fn predefined_handles_decades_and_unsafe_names() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("1980s-cover.jpeg"));
        touch(&dir.path().join("1800s-cover.png"));
        touch(&dir.path().join("This is AC_DC!.webp"));
        let tier = PredefinedCover {
            root: dir.path().to_path_buf(),
        };
        let work = dir.path().join("work");
        let eighties = tier
            .attempt(&request(PlaylistKind::Year, "Back to the 1980s", "1980", &work))
            .await;
        assert_eq!(eighties, Some(dir.path().join("1980s-cover.jpeg")));
        let old = tier
            .attempt(&request(PlaylistKind::Year, "Back to the 1850s", "1850", &work))
            .await;
        assert_eq!(old, Some(dir.path().join("1800s-cover.png")));
        let acdc = tier
            .attempt(&request(PlaylistKind::Artist, "This is AC/DC!", "AC/DC", &work))
            .await;
        assert_eq!(acdc, Some(dir.path().join("This is AC_DC!.webp")));
    }

    #[test]
    fn locates_artist_folders_from_track_paths() {
        let track = |id: &str, artist: &str, path: &str| {
            Arc::new(Track {
                id: id.to_string(),
                title: id.to_string(),
                artists: vec![artist.to_string()],
                album: None,
                genres: Vec::new(),
                year: None,
                path: Some(path.to_string()),
            })
        };
        let tracks = vec![
            track("1", "Queen", "/media/music/Queen/Jazz/01.flac"),
            track("2", "Björk", "/media/music/björk/02.flac"),
            track("3", "Various", "/media/music/Compilations/Hits/03.flac"),
        ];
        let folders = ArtistFolders::build(&tracks, &PathMap::new("/media/music", "/srv/music"));
        assert_eq!(folders.get("queen"), Some(Path::new("/srv/music/Queen")));
        assert_eq!(folders.get("Björk"), Some(Path::new("/srv/music/björk")));
        assert_eq!(folders.get("Various"), None);
        assert_eq!(folders.len(), 2);
    }

    #[tokio::test]
    async fn library_folder_uses_named_then_nested_images() {
        let dir = tempfile::tempdir().unwrap();
        let artist_dir = dir.path().join("Queen");
        touch(&artist_dir.join("Jazz").join("scan.png"));
        touch(&artist_dir.join("Jazz").join("01.flac"));
        let mut folders = ArtistFolders::default();
        folders.dirs.insert("queen".to_string(), artist_dir.clone());
        let tier = LibraryFolderCover {
            folders: Arc::new(folders),
        };
        let work = dir.path().join("work");
        let req = request(PlaylistKind::Artist, "This is Queen!", "Queen", &work);
        assert_eq!(tier.attempt(&req).await, Some(artist_dir.join("Jazz").join("scan.png")));

        touch(&artist_dir.join("Thumb.JPG"));
        touch(&artist_dir.join("cover.png"));
        assert_eq!(tier.attempt(&req).await, Some(artist_dir.join("cover.png")));

        let genre = request(PlaylistKind::Genre, "Rock Radio", "Rock", &work);
        assert_eq!(tier.attempt(&genre).await, None);
    }

    #[tokio::test]
    async fn external_art_is_stored_with_detected_extension() {
        let dir = tempfile::tempdir().unwrap();
        let tier = ExternalArtCover {
            art: Arc::new(PngArt),
        };
        let found = tier
            .attempt(&request(PlaylistKind::Artist, "This is Queen!", "Queen", dir.path()))
            .await;
        assert_eq!(found, Some(dir.path().join("external.png")));
        let skipped = tier
            .attempt(&request(PlaylistKind::Genre, "Rock Radio", "Rock", dir.path()))
            .await;
        assert_eq!(skipped, None);
    }

    fn fixture_fonts() -> Arc<FontStack> {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../artwork/tests/fixtures/DejaVuSans-Bold.ttf");
        Arc::new(FontStack::load(&[path]).unwrap())
    }

    #[tokio::test]
    async fn genre_banner_draws_on_fallback_background() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("covers");
        fs::create_dir_all(&root).unwrap();
        image::RgbImage::from_pixel(96, 96, image::Rgb([30, 30, 30]))
            .save(root.join("Fallback Radio.png"))
            .unwrap();
        let tier = GenreBannerCover {
            root,
            fonts: fixture_fonts(),
            style: CoverStyle {
                size: 128,
                quality: 90,
            },
        };
        let work = dir.path().join("work");
        fs::create_dir_all(&work).unwrap();
        let found = tier
            .attempt(&request(PlaylistKind::Genre, "Jazz Radio", "Jazz", &work))
            .await;
        let dest = work.join("generated.jpg");
        assert_eq!(found, Some(dest.clone()));
        let rendered = image::open(&dest).unwrap();
        assert_eq!((rendered.width(), rendered.height()), (128, 128));

        let artist = tier
            .attempt(&request(PlaylistKind::Artist, "This is Queen!", "Queen", &work))
            .await;
        assert_eq!(artist, None);
    }

    #[tokio::test]
    async fn genre_banner_needs_a_background() {
        let dir = tempfile::tempdir().unwrap();
        let tier = GenreBannerCover {
            root: dir.path().to_path_buf(),
            fonts: fixture_fonts(),
            style: CoverStyle::default(),
        };
        let found = tier
            .attempt(&request(PlaylistKind::Genre, "Jazz Radio", "Jazz", dir.path()))
            .await;
        assert_eq!(found, None);
    }

    #[test]
    fn standard_chain_honors_cover_switches() {
        let providers = Providers {
            catalog: Arc::new(crate::state::testing::MockCatalog::default()),
            history: None,
            art: Some(Arc::new(PngArt)),
        };
        let folders = Arc::new(ArtistFolders::default());
        let mut settings = crate::settings::test_settings();
        settings.covers.custom_artist_covers = true;
        settings.covers.genre_banners = true;
        settings.covers.external_art = false;

        let tiers = |settings: &Settings, fonts: Option<Arc<FontStack>>| {
            CoverResolver::standard(settings, &providers, Arc::clone(&folders), fonts)
                .tiers()
                .collect::<Vec<_>>()
        };
        assert_eq!(
            tiers(&settings, Some(fixture_fonts())),
            vec![
                CoverTier::Generated,
                CoverTier::Predefined,
                CoverTier::Generated,
                CoverTier::LibraryFolder
            ]
        );
        assert_eq!(
            tiers(&settings, None),
            vec![CoverTier::Predefined, CoverTier::LibraryFolder]
        );

        settings.covers.external_art = true;
        settings.covers.custom_artist_covers = false;
        settings.covers.genre_banners = false;
        assert_eq!(
            tiers(&settings, Some(fixture_fonts())),
            vec![
                CoverTier::External,
                CoverTier::Predefined,
                CoverTier::LibraryFolder
            ]
        );
    }
}
