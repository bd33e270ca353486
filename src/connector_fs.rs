//! Filesystem connector: backfill enumeration and single-path event
//! construction shared with the live watcher (§4.2).
//!
//! Two backfill modes: `full` (paginate descending by `(modifiedAt, path)`
//! older than a resume cursor) and `incremental` (only entries newer than
//! the cursor). Both retain the top-`limit` candidates by
//! `(modifiedAt desc, path desc)` using a single-pass weakest-candidate
//! replacement (a capacity-bounded binary heap), then emit events for
//! exactly those candidates.

use chrono::{DateTime, TimeZone, Utc};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::models::{IngestionEvent, IngestionOperation, SourceType};
use crate::policy::{Decision, IndexingPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillMode {
    Full,
    Incremental,
}

/// `(modifiedAt as integer seconds, path)` — the resume cursor shape named
/// in §4.2.
pub type ResumeToken = (i64, String);

#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    modified_secs: i64,
    path: String,
}

impl Candidate {
    fn key(&self) -> (i64, &str) {
        (self.modified_secs, self.path.as_str())
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Reverse-ordered wrapper so a max-heap `BinaryHeap` behaves as a
/// min-heap over `(modifiedAt, path)` — the top of the heap is always the
/// current weakest retained candidate, which is what gets evicted.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MinCandidate(Candidate);
impl PartialOrd for MinCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for MinCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.cmp(&self.0)
    }
}

pub struct FileConnector {
    pub scope_label: String,
    pub policy: Arc<IndexingPolicy>,
}

impl FileConnector {
    pub fn new(scope_label: String, policy: Arc<IndexingPolicy>) -> Self {
        Self { scope_label, policy }
    }

    /// Enumerate up to `limit` candidates across the allowlist roots,
    /// skipping hidden items and pruning excluded directories without
    /// descending, then build events for exactly the retained top-`limit`.
    /// Returns the events plus a resume token for the next page: the
    /// oldest selected candidate in `full` mode, the newest in
    /// `incremental` mode.
    pub fn backfill(
        &self,
        mode: BackfillMode,
        cursor: Option<&ResumeToken>,
        limit: usize,
    ) -> (Vec<IngestionEvent>, Option<ResumeToken>) {
        if limit == 0 {
            return (Vec::new(), None);
        }

        let mut heap: BinaryHeap<MinCandidate> = BinaryHeap::with_capacity(limit + 1);

        for root in &self.policy.allowlist_roots {
            self.walk_root(root, mode, cursor, limit, &mut heap);
        }

        let mut candidates: Vec<Candidate> = heap.into_iter().map(|m| m.0).collect();
        candidates.sort_by(|a, b| b.key().cmp(&a.key()));

        let resume_token = match mode {
            BackfillMode::Full => candidates.last().map(|c| (c.modified_secs, c.path.clone())),
            BackfillMode::Incremental => candidates.first().map(|c| (c.modified_secs, c.path.clone())),
        };

        let events = candidates
            .into_iter()
            .filter_map(|c| self.event_for_path(Path::new(&c.path)))
            .collect();

        (events, resume_token)
    }

    fn walk_root(
        &self,
        root: &Path,
        mode: BackfillMode,
        cursor: Option<&ResumeToken>,
        limit: usize,
        heap: &mut BinaryHeap<MinCandidate>,
    ) {
        let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            if name.starts_with('.') && entry.depth() > 0 {
                return false;
            }
            if entry.file_type().is_dir() && self.policy.should_skip_path(entry.path()) {
                return false;
            }
            true
        });

        for entry in walker.flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if self.policy.should_skip_path(path) {
                continue;
            }
            let Ok(metadata) = entry.metadata() else { continue };
            let modified_secs = modified_seconds(&metadata);
            let path_str = path.to_string_lossy().to_string();

            if let Some((cursor_secs, cursor_path)) = cursor {
                let candidate_key = (modified_secs, path_str.as_str());
                let cursor_key = (*cursor_secs, cursor_path.as_str());
                let in_range = match mode {
                    BackfillMode::Full => candidate_key < cursor_key,
                    BackfillMode::Incremental => candidate_key > cursor_key,
                };
                if !in_range {
                    continue;
                }
            }

            let candidate = MinCandidate(Candidate {
                modified_secs,
                path: path_str,
            });
            if heap.len() < limit {
                heap.push(candidate);
            } else if let Some(weakest) = heap.peek() {
                if candidate.0 > weakest.0 {
                    heap.pop();
                    heap.push(candidate);
                }
            }
        }
    }

    /// Build the event for a single path: `delete` if missing, otherwise
    /// run the policy and keep `index`/`deferred` outcomes (drop `skip`).
    pub fn event_for_path(&self, path: &Path) -> Option<IngestionEvent> {
        if !path.exists() {
            return Some(delete_event(&self.scope_label, path));
        }
        let metadata = std::fs::metadata(path).ok()?;
        let size = metadata.len();
        let modified_at = Utc.timestamp_opt(modified_seconds(&metadata), 0).single()?;

        match self.policy.evaluate(path, size, modified_at) {
            Decision::Skip(_) => None,
            Decision::Index(_) | Decision::Deferred(_) => read_upsert_event(&self.scope_label, path, modified_at),
        }
    }
}

fn modified_seconds(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

pub fn delete_event(scope_label: &str, path: &Path) -> IngestionEvent {
    let path_str = path.to_string_lossy().to_string();
    IngestionEvent {
        id: uuid::Uuid::new_v4().to_string(),
        source_type: SourceType::File,
        scope_label: scope_label.to_string(),
        source_id: path_str.clone(),
        title: None,
        body: String::new(),
        source_path_or_handle: path_str,
        occurred_at: Utc::now(),
        operation: IngestionOperation::Delete,
    }
}

/// Reads file content best-effort (UTF-8 with a lossy fallback, since
/// binary office/PDF extraction happens downstream in the extraction
/// service, not here) and builds an `Upsert` event.
fn read_upsert_event(scope_label: &str, path: &Path, modified_at: DateTime<Utc>) -> Option<IngestionEvent> {
    let path_str = path.to_string_lossy().to_string();
    let title = path.file_name().map(|n| n.to_string_lossy().to_string());
    let body = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(_) => String::new(),
    };

    Some(IngestionEvent {
        id: uuid::Uuid::new_v4().to_string(),
        source_type: SourceType::File,
        scope_label: scope_label.to_string(),
        source_id: path_str.clone(),
        title,
        body,
        source_path_or_handle: path_str,
        occurred_at: modified_at,
        operation: IngestionOperation::Upsert,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IndexingProfile, PolicyOverrides};
    use std::fs;

    fn connector(root: &Path) -> FileConnector {
        let policy = IndexingPolicy::resolve(
            IndexingProfile::Developer,
            vec![root.to_path_buf()],
            &PolicyOverrides::default(),
        );
        FileConnector::new("filesystem".to_string(), Arc::new(policy))
    }

    #[test]
    fn backfill_full_respects_limit_and_excludes() {
        let tmp = tempfile::tempdir().unwrap();
        for i in 0..10 {
            fs::write(tmp.path().join(format!("note{i}.txt")), "content").unwrap();
        }
        fs::create_dir_all(tmp.path().join("node_modules")).unwrap();
        fs::write(tmp.path().join("node_modules").join("pkg.txt"), "x").unwrap();

        let connector = connector(tmp.path());
        let (events, resume) = connector.backfill(BackfillMode::Full, None, 5);
        assert_eq!(events.len(), 5);
        assert!(resume.is_some());
        for e in &events {
            assert!(!e.source_path_or_handle.contains("node_modules"));
        }
    }

    #[test]
    fn event_for_missing_path_is_delete() {
        let tmp = tempfile::tempdir().unwrap();
        let connector = connector(tmp.path());
        let missing = tmp.path().join("gone.txt");
        let event = connector.event_for_path(&missing).unwrap();
        assert_eq!(event.operation, IngestionOperation::Delete);
    }

    #[test]
    fn event_for_excluded_extension_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("binary.exe"), "content").unwrap();
        let connector = connector(tmp.path());
        assert!(connector.event_for_path(&tmp.path().join("binary.exe")).is_none());
    }

    #[test]
    fn backfill_incremental_only_returns_newer_than_cursor() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("old.txt"), "content").unwrap();
        let connector = connector(tmp.path());
        let cursor = (0i64, String::new());
        let (events, _) = connector.backfill(BackfillMode::Incremental, Some(&cursor), 10);
        assert_eq!(events.len(), 1);
    }
}
