//! Live filesystem change notification (§4.2, live mode).
//!
//! Wraps a `notify` watcher. Incoming paths are filtered to allowlist
//! roots and accumulated into a `pending` set bounded at `N_max` (≈2000);
//! exceeding that clears the set and marks `overflowed`, so the next
//! flush performs a bounded rescan instead of enumerating the buffered
//! list. Each notification resets a quiet-window timer; a flush runs
//! exactly once per generation after the window elapses with no new
//! notifications.

use chrono::Utc;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::connector_fs::{BackfillMode, FileConnector};
use crate::models::IngestionEvent;

const N_MAX: usize = 2000;
const M_DIRECT: usize = 512;
const OVERFLOW_RESCAN_CAP: usize = 384;

struct PendingState {
    paths: HashSet<PathBuf>,
    overflowed: bool,
}

/// Debounced change watcher sitting in front of a [`FileConnector`].
pub struct ChangeWatcher {
    connector: Arc<FileConnector>,
    pending: Mutex<PendingState>,
    generation: AtomicU64,
    last_flush_at: Mutex<chrono::DateTime<Utc>>,
}

impl ChangeWatcher {
    pub fn new(connector: Arc<FileConnector>) -> Self {
        Self {
            connector,
            pending: Mutex::new(PendingState {
                paths: HashSet::new(),
                overflowed: false,
            }),
            generation: AtomicU64::new(0),
            last_flush_at: Mutex::new(Utc::now()),
        }
    }

    /// Record a burst of raw changed paths from the underlying OS
    /// notifier. Filters to allowlist roots and non-excluded paths before
    /// accumulating.
    pub fn notify_paths(&self, paths: impl IntoIterator<Item = PathBuf>) {
        let mut state = self.pending.lock();
        for path in paths {
            let in_allowlist = self
                .connector
                .policy
                .allowlist_roots
                .iter()
                .any(|root| path.starts_with(root));
            if in_allowlist && !self.connector.policy.should_skip_path(&path) {
                state.paths.insert(path);
            }
        }
        if state.paths.len() > N_MAX {
            state.paths.clear();
            state.overflowed = true;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Current generation counter, for callers implementing the
    /// quiet-window timer (flush once no new notification bumps this
    /// further within `quietWindowSeconds`).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Run one flush: either processes up to `M_direct` buffered paths, or
    /// — if overflow was flagged since the last flush — performs a
    /// bounded rescan since the last flush time instead.
    pub fn flush(&self) -> Vec<IngestionEvent> {
        let (paths, overflowed): (Vec<PathBuf>, bool) = {
            let mut state = self.pending.lock();
            let overflowed = state.overflowed;
            state.overflowed = false;
            if overflowed {
                state.paths.clear();
                (Vec::new(), true)
            } else {
                let drained: Vec<PathBuf> = state.paths.drain().take(M_DIRECT).collect();
                (drained, false)
            }
        };

        let events = if overflowed {
            self.rescan_since_last_flush()
        } else {
            paths
                .iter()
                .filter_map(|p| self.connector.event_for_path(p))
                .collect()
        };

        *self.last_flush_at.lock() = Utc::now();
        events
    }

    fn rescan_since_last_flush(&self) -> Vec<IngestionEvent> {
        let since = *self.last_flush_at.lock();
        let cursor = (since.timestamp(), String::new());
        let (events, _) = self
            .connector
            .backfill(BackfillMode::Incremental, Some(&cursor), OVERFLOW_RESCAN_CAP);
        events
    }
}

/// Spawns a `notify` watcher over the given roots and forwards raw path
/// events into an mpsc channel for a [`ChangeWatcher`] to consume.
pub fn spawn_os_watcher(
    roots: Vec<PathBuf>,
) -> notify::Result<(RecommendedWatcher, mpsc::UnboundedReceiver<PathBuf>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            for path in event.paths {
                let _ = tx.send(path);
            }
        }
    })?;
    for root in &roots {
        watcher.watch(root, RecursiveMode::Recursive)?;
    }
    Ok((watcher, rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IndexingProfile, PolicyOverrides};
    use crate::policy::IndexingPolicy;
    use std::fs;

    fn watcher_over(root: &std::path::Path) -> ChangeWatcher {
        let policy = IndexingPolicy::resolve(
            IndexingProfile::Developer,
            vec![root.to_path_buf()],
            &PolicyOverrides::default(),
        );
        let connector = Arc::new(FileConnector::new("filesystem".to_string(), Arc::new(policy)));
        ChangeWatcher::new(connector)
    }

    #[test]
    fn notify_and_flush_emits_upsert_event() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("note.txt");
        fs::write(&file, "content").unwrap();

        let watcher = watcher_over(tmp.path());
        watcher.notify_paths(vec![file.clone()]);
        let events = watcher.flush();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source_path_or_handle, file.to_string_lossy());
    }

    #[test]
    fn notify_paths_outside_allowlist_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let watcher = watcher_over(tmp.path());
        watcher.notify_paths(vec![PathBuf::from("/outside/file.txt")]);
        assert_eq!(watcher.flush().len(), 0);
    }

    #[test]
    fn overflow_clears_pending_and_sets_flag() {
        let tmp = tempfile::tempdir().unwrap();
        let watcher = watcher_over(tmp.path());
        let paths: Vec<PathBuf> = (0..N_MAX + 10)
            .map(|i| tmp.path().join(format!("f{i}.txt")))
            .collect();
        watcher.notify_paths(paths);
        let state = watcher.pending.lock();
        assert!(state.overflowed);
        assert!(state.paths.is_empty());
    }

    #[test]
    fn deleted_path_produces_delete_event() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("gone.txt");
        let watcher = watcher_over(tmp.path());
        watcher.notify_paths(vec![missing.clone()]);
        let events = watcher.flush();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].operation, crate::models::IngestionOperation::Delete);
    }
}
