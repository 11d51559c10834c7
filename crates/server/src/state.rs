use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::ServerConfig;
use crate::pipeline::{CycleError, CycleReport};
use crate::providers::Providers;
use crate::settings::Settings;
use crate::update_covers::UpdateCoversReport;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleKind {
    Generate,
    UpdateCovers,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct CycleStatus {
    pub running: Option<CycleKind>,
    pub started_at: Option<u64>,
    pub last_generation: Option<CycleReport>,
    pub last_update_covers: Option<UpdateCoversReport>,
    pub last_error: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub config_path: PathBuf,
    pub config: Arc<RwLock<ServerConfig>>,
    pub providers: Providers,
    pub cycle_lock: Arc<Mutex<()>>,
    pub status: Arc<RwLock<CycleStatus>>,
}

impl AppState {
    pub fn new(config_path: PathBuf, config: ServerConfig, providers: Providers) -> Self {
        Self {
            config_path,
            config: Arc::new(RwLock::new(config)),
            providers,
            cycle_lock: Arc::new(Mutex::new(())),
            status: Arc::new(RwLock::new(CycleStatus::default())),
        }
    }

    /// Fresh immutable snapshot for one cycle.
    pub fn settings(&self) -> Arc<Settings> {
        let config = self.config.read();
        Arc::new(Settings::from_config(&self.config_path, &config))
    }

    /// Claims the single cycle slot, or `None` while another cycle runs.
    pub fn try_begin(&self, kind: CycleKind) -> Option<CycleGuard> {
        let permit = Arc::clone(&self.cycle_lock).try_lock_owned().ok()?;
        {
            let mut status = self.status.write();
            status.running = Some(kind);
            status.started_at = Some(unix_now());
        }
        Some(CycleGuard {
            _permit: permit,
            status: Arc::clone(&self.status),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.status.read().running.is_some()
    }

    pub fn record_generation(&self, result: &Result<CycleReport, CycleError>) {
        let mut status = self.status.write();
        match result {
            Ok(report) => {
                status.last_generation = Some(report.clone());
                status.last_error = None;
            }
            Err(err) => status.last_error = Some(err.to_string()),
        }
    }

    pub fn record_update_covers(&self, result: &Result<UpdateCoversReport, CycleError>) {
        let mut status = self.status.write();
        match result {
            Ok(report) => {
                status.last_update_covers = Some(report.clone());
                status.last_error = None;
            }
            Err(err) => status.last_error = Some(err.to_string()),
        }
    }
}

/// Holds the cycle slot; dropping it marks the cycle finished.
pub struct CycleGuard {
    _permit: OwnedMutexGuard<()>,
    status: Arc<RwLock<CycleStatus>>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        let mut status = self.status.write();
        status.running = None;
        status.started_at = None;
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use common::{PlayRecord, Track, User};
    use futures_util::future::{BoxFuture, FutureExt};

    use crate::providers::{CatalogProvider, HistoryProvider, ProviderError};

    #[derive(Default)]
    pub struct MockCatalog {
        pub tracks: Vec<Track>,
        pub fail: bool,
        pub scans: AtomicUsize,
    }

    impl CatalogProvider for MockCatalog {
        fn fetch_tracks(&self) -> BoxFuture<'_, Result<Vec<Track>, ProviderError>> {
            let result = if self.fail {
                Err(ProviderError::Status(500))
            } else {
                Ok(self.tracks.clone())
            };
            async move { result }.boxed()
        }

        fn artist_image<'a>(
            &'a self,
            _: &'a str,
        ) -> BoxFuture<'a, Result<Option<Vec<u8>>, ProviderError>> {
            async { Ok(None) }.boxed()
        }

        fn trigger_library_scan(&self) -> BoxFuture<'_, Result<(), ProviderError>> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }.boxed()
        }
    }

    pub struct MockHistory {
        pub users: Vec<User>,
        pub records: Vec<PlayRecord>,
    }

    impl HistoryProvider for MockHistory {
        fn list_users(&self) -> BoxFuture<'_, Result<Vec<User>, ProviderError>> {
            let users = self.users.clone();
            async move { Ok(users) }.boxed()
        }

        fn play_history<'a>(
            &'a self,
            _: &'a User,
        ) -> BoxFuture<'a, Result<Vec<PlayRecord>, ProviderError>> {
            let records = self.records.clone();
            async move { Ok(records) }.boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MockCatalog;
    use super::*;
    use std::path::Path;

    fn state() -> AppState {
        let providers = Providers {
            catalog: Arc::new(MockCatalog::default()),
            history: None,
            art: None,
        };
        AppState::new(
            Path::new("/tmp/tapedeck/config.yaml").to_path_buf(),
            ServerConfig::default(),
            providers,
        )
    }

    #[tokio::test]
    async fn only_one_cycle_at_a_time() {
        let state = state();
        let guard = state.try_begin(CycleKind::Generate).unwrap();
        assert!(state.is_busy());
        assert!(state.try_begin(CycleKind::UpdateCovers).is_none());
        drop(guard);
        assert!(!state.is_busy());
        assert!(state.try_begin(CycleKind::UpdateCovers).is_some());
    }

    #[test]
    fn settings_are_snapshots() {
        let state = state();
        let before = state.settings();
        state.config.write().max_tracks = 7;
        assert_eq!(before.limits.max_tracks, 100);
        assert_eq!(state.settings().limits.max_tracks, 7);
    }
}
