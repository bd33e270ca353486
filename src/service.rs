//! Service / Scheduler (§4.6, §5): the single actor that owns the
//! in-process ingestion queue and worker pool, drives backfill, and
//! exposes the daemon's RPC surface (`suggest`, `createContextPack`,
//! `health`, `stateSnapshot`, …) as plain async methods.

use chrono::Utc;
use dashmap::DashMap;
use notify::RecommendedWatcher;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::connector_fs::{BackfillMode, FileConnector};
use crate::contextpack::{redact, ContextPackAssembler, ContextPackRequest};
use crate::embedding::EmbeddingRuntime;
use crate::error::{ErrorKind, Result};
use crate::models::{
    BackfillCheckpoint, CheckpointStatus, Chunk, ContextPack, Document, GraphEdge, IngestionEvent,
    IngestionOperation, InjectionMode, Partition, SourceType, Suggestion,
};
use crate::policy::IndexingPolicy;
use crate::search::{HybridSearchEngine, SearchRequest};
use crate::store::{SourceFilters, Store};
use crate::watcher::ChangeWatcher;

const SUPERVISOR_TICK: Duration = Duration::from_millis(250);
const WORKER_IDLE_SLEEP: Duration = Duration::from_millis(50);
const COMPACTION_INTERVAL: Duration = Duration::from_secs(8 * 3600);
const SUGGEST_CACHE_TTL: Duration = Duration::from_millis(1500);
const BACKFILL_RETRY_ATTEMPTS: u32 = 5;
const BACKFILL_RETRY_BASE: Duration = Duration::from_millis(500);
const GRAPH_EDGE_TOKEN_CAP: usize = 10;
const GRAPH_EDGE_MIN_TOKEN_LEN: usize = 3;

pub struct SuggestRequest {
    pub query: String,
    pub source_filters: SourceFilters,
    pub limit: usize,
    pub typing_mode: bool,
    pub include_cold_partition_fallback: bool,
}

#[derive(Debug, Clone)]
pub struct SuggestResponse {
    pub suggestions: Vec<Suggestion>,
    pub partial: bool,
    pub total_candidate_count: usize,
    pub latency_ms: f64,
}

pub struct CreateContextPackRequest {
    pub query: String,
    pub selected_suggestion_ids: Vec<String>,
    pub mode_overrides: HashMap<String, InjectionMode>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthSnapshot {
    pub daemon_version: &'static str,
    pub running: bool,
    pub queue_depth: usize,
    pub in_flight_count: usize,
    pub last_error: Option<String>,
    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
    pub current_operation: &'static str,
    pub extraction_counts: HashMap<String, u64>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueActivity {
    pub queue_depth: usize,
    pub sources: HashMap<String, i64>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexStats {
    pub total_document_count: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StateSnapshot {
    pub health: HealthSnapshot,
    pub queue_activity: QueueActivity,
    pub current_operation: &'static str,
}

struct CachedSuggestResponse {
    response: SuggestResponse,
    cached_at: Instant,
}

/// Everything the ingestion/query pipelines need, bundled so worker tasks
/// can clone a single `Arc` rather than threading individual handles.
pub struct Service {
    config: Config,
    store: Arc<Store>,
    embedding: Arc<EmbeddingRuntime>,
    extraction: Arc<crate::extract::ExtractionService>,
    policy: Arc<IndexingPolicy>,
    file_connector: Arc<FileConnector>,
    watcher: Arc<ChangeWatcher>,
    packs: Arc<ContextPackAssembler>,

    queue: Mutex<VecDeque<IngestionEvent>>,
    queue_counts: DashMap<String, i64>,
    suggest_cache: DashMap<String, CachedSuggestResponse>,
    last_suggestions_by_query: DashMap<String, HashMap<String, Suggestion>>,
    suggestion_by_id: DashMap<String, Suggestion>,

    running: AtomicBool,
    sleeping: AtomicBool,
    startup_backfill_completed: AtomicBool,
    in_flight: AtomicUsize,

    worker_handles: Mutex<Vec<JoinHandle<()>>>,
    supervisor_handle: Mutex<Option<JoinHandle<()>>>,
    compaction_handle: Mutex<Option<JoinHandle<()>>>,
    backfill_handle: Mutex<Option<JoinHandle<()>>>,
    notify_handle: Mutex<Option<JoinHandle<()>>>,
    watch_flush_handle: Mutex<Option<JoinHandle<()>>>,
    os_watcher: Mutex<Option<RecommendedWatcher>>,

    last_error: Mutex<Option<String>>,
    latencies_ms: Mutex<VecDeque<f64>>,
    extraction_counts: DashMap<String, u64>,
}

impl Service {
    pub fn new(
        config: Config,
        store: Store,
        embedding: EmbeddingRuntime,
        policy: IndexingPolicy,
    ) -> Arc<Self> {
        let policy = Arc::new(policy);
        let file_connector = Arc::new(FileConnector::new("filesystem".to_string(), policy.clone()));
        let watcher = Arc::new(ChangeWatcher::new(file_connector.clone()));
        let packs_dir = config
            .db
            .path
            .parent()
            .and_then(|index_dir| index_dir.parent())
            .map(|daemon_root| daemon_root.join("contextpacks"))
            .unwrap_or_else(|| PathBuf::from("contextpacks"));

        Arc::new(Self {
            extraction: Arc::new(crate::extract::ExtractionService::new(
                policy.max_extracted_characters_per_document,
            )),
            store: Arc::new(store),
            embedding: Arc::new(embedding),
            policy,
            file_connector,
            watcher,
            packs: Arc::new(ContextPackAssembler::new(packs_dir)),
            config,
            queue: Mutex::new(VecDeque::new()),
            queue_counts: DashMap::new(),
            suggest_cache: DashMap::new(),
            last_suggestions_by_query: DashMap::new(),
            suggestion_by_id: DashMap::new(),
            running: AtomicBool::new(false),
            sleeping: AtomicBool::new(false),
            startup_backfill_completed: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            worker_handles: Mutex::new(Vec::new()),
            supervisor_handle: Mutex::new(None),
            compaction_handle: Mutex::new(None),
            backfill_handle: Mutex::new(None),
            notify_handle: Mutex::new(None),
            watch_flush_handle: Mutex::new(None),
            os_watcher: Mutex::new(None),
            last_error: Mutex::new(None),
            latencies_ms: Mutex::new(VecDeque::with_capacity(256)),
            extraction_counts: DashMap::new(),
        })
    }

    // ---- Lifecycle -----------------------------------------------------

    /// Registers connectors idempotently, refreshes non-searchable rows,
    /// starts the runtime pipelines, and schedules an initial full
    /// backfill with exponential-backoff retry.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.store
            .refresh_file_searchability(&self.policy.non_searchable_extensions)
            .await?;

        Self::spawn_pipelines(self.clone());
        Self::schedule_startup_backfill(self);
        Ok(())
    }

    /// Cancels all pipeline tasks. Idempotent.
    pub async fn stop(self: Arc<Self>) {
        self.running.store(false, Ordering::SeqCst);
        self.cancel_pipelines();
    }

    pub fn pause_for_system_sleep(self: Arc<Self>) {
        self.sleeping.store(true, Ordering::SeqCst);
        self.cancel_pipelines();
    }

    pub fn resume_after_system_wake(self: Arc<Self>) {
        if !self.sleeping.swap(false, Ordering::SeqCst) {
            return;
        }
        Self::spawn_pipelines(self.clone());
        if !self.startup_backfill_completed.load(Ordering::SeqCst) {
            Self::schedule_startup_backfill(self);
        }
    }

    fn spawn_pipelines(svc: Arc<Self>) {
        let target = target_worker_count();
        let mut workers = svc.worker_handles.lock();
        workers.clear();
        for _ in 0..target {
            let worker = svc.clone();
            workers.push(tokio::spawn(async move { worker.worker_loop().await }));
        }
        drop(workers);

        {
            let supervisor = svc.clone();
            *svc.supervisor_handle.lock() = Some(tokio::spawn(async move { supervisor.supervisor_loop().await }));
        }
        {
            let compactor = svc.clone();
            *svc.compaction_handle.lock() = Some(tokio::spawn(async move { compactor.compaction_loop().await }));
        }

        match crate::watcher::spawn_os_watcher(svc.policy.allowlist_roots.clone()) {
            Ok((os_watcher, rx)) => {
                *svc.os_watcher.lock() = Some(os_watcher);
                let forwarder = svc.clone();
                *svc.notify_handle.lock() = Some(tokio::spawn(async move { forward_notifications(forwarder, rx).await }));
                let flusher = svc.clone();
                *svc.watch_flush_handle.lock() = Some(tokio::spawn(async move { flusher.watch_flush_loop().await }));
            }
            Err(e) => {
                *svc.last_error.lock() = Some(e.to_string());
            }
        }
    }

    /// Waits one quiet window, then checks whether the watcher's
    /// notification generation moved again during a second quiet window;
    /// only a stable generation gets flushed (§4.2's debounce contract).
    async fn watch_flush_loop(self: Arc<Self>) {
        let quiet = Duration::from_secs(self.policy.quiet_window_seconds.max(1));
        loop {
            tokio::time::sleep(quiet).await;
            let before = self.watcher.generation();
            tokio::time::sleep(quiet).await;
            if self.watcher.generation() != before {
                continue;
            }
            for event in self.watcher.flush() {
                self.enqueue(event);
            }
        }
    }

    fn cancel_pipelines(&self) {
        for handle in self.worker_handles.lock().drain(..) {
            handle.abort();
        }
        if let Some(handle) = self.supervisor_handle.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.compaction_handle.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.backfill_handle.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.notify_handle.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.watch_flush_handle.lock().take() {
            handle.abort();
        }
        self.os_watcher.lock().take();
    }

    /// Every ~250ms, reconciles the worker pool to the target count. A
    /// genuine AC/battery power-source read isn't available through this
    /// crate's dependency stack, so `target_worker_count` always uses all
    /// active cores; the reconciliation loop still exists so a future
    /// power-aware `target_worker_count` only needs to change one
    /// function.
    async fn supervisor_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(SUPERVISOR_TICK).await;
            let target = target_worker_count();
            let mut workers = self.worker_handles.lock();
            while workers.len() < target {
                let svc = self.clone();
                workers.push(tokio::spawn(async move { svc.worker_loop().await }));
            }
            while workers.len() > target {
                if let Some(handle) = workers.pop() {
                    handle.abort();
                }
            }
        }
    }

    async fn worker_loop(self: Arc<Self>) {
        loop {
            let event = self.queue.lock().pop_front();
            match event {
                Some(event) => {
                    self.in_flight.fetch_add(1, Ordering::SeqCst);
                    self.decrement_queue_count(event.scope_label.as_str());
                    if let Err(e) = self.ingest_single_event(&event).await {
                        *self.last_error.lock() = Some(e.to_string());
                    }
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                }
                None => tokio::time::sleep(WORKER_IDLE_SLEEP).await,
            }
        }
    }

    async fn compaction_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(COMPACTION_INTERVAL).await;
            if let Err(e) = self.store.compact().await {
                *self.last_error.lock() = Some(e.to_string());
            }
        }
    }

    fn schedule_startup_backfill(svc: Arc<Self>) {
        let worker = svc.clone();
        let handle = tokio::spawn(async move {
            let mut delay = BACKFILL_RETRY_BASE;
            for attempt in 0..BACKFILL_RETRY_ATTEMPTS {
                match worker.trigger_backfill(worker.config.queue_batch_size).await {
                    Ok(_) => {
                        worker.startup_backfill_completed.store(true, Ordering::SeqCst);
                        return;
                    }
                    Err(e) => {
                        *worker.last_error.lock() = Some(e.to_string());
                        if attempt + 1 == BACKFILL_RETRY_ATTEMPTS {
                            return;
                        }
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        });
        *svc.backfill_handle.lock() = Some(handle);
    }

    fn decrement_queue_count(&self, scope_label: &str) {
        if let Some(mut count) = self.queue_counts.get_mut(scope_label) {
            *count -= 1;
        }
    }

    pub fn enqueue(&self, event: IngestionEvent) {
        *self.queue_counts.entry(event.scope_label.clone()).or_insert(0) += 1;
        self.queue.lock().push_back(event);
    }

    pub fn watcher(&self) -> &Arc<ChangeWatcher> {
        &self.watcher
    }

    // ---- Per-event ingestion (§4.6) ------------------------------------

    async fn ingest_single_event(&self, event: &IngestionEvent) -> Result<()> {
        if event.operation == IngestionOperation::Delete {
            self.store
                .delete_documents_for_path(event.source_type, &event.source_path_or_handle)
                .await?;
            self.record_extraction_outcome("deleted");
            return Ok(());
        }

        if self
            .store
            .is_document_current(event.source_type, &event.source_id, event.occurred_at)
            .await?
        {
            self.record_extraction_outcome("no_op_current");
            return Ok(());
        }

        let (body, title, was_ocr_used) = if event.source_type == SourceType::File {
            let result = self
                .extraction
                .extract(std::path::Path::new(&event.source_path_or_handle), &self.policy)
                .await;
            self.record_extraction_outcome(outcome_label(result.outcome));
            if result.searchable_body.trim().is_empty() {
                return Ok(());
            }
            (result.searchable_body, event.title.clone(), result.was_ocr_used)
        } else {
            let trimmed = event.body.trim().to_string();
            if trimmed.is_empty() {
                return Ok(());
            }
            (trimmed, event.title.clone(), false)
        };
        let _ = was_ocr_used;

        let now = event.occurred_at;
        let redacted_body = redact(&body);
        let searchable = !has_non_searchable_extension(
            &event.source_path_or_handle,
            &self.policy.non_searchable_extensions,
        );

        let doc = Document {
            id: Store::document_id_for(event.source_type, &event.source_id),
            source_type: event.source_type,
            source_id: event.source_id.clone(),
            title,
            body: redacted_body.clone(),
            source_path_or_handle: event.source_path_or_handle.clone(),
            updated_at: now,
            risk: crate::store::risk_for_body(&redacted_body),
            partition: Partition::from_age(now, Utc::now()),
            searchable,
        };

        self.store.upsert_document_record(&doc).await?;

        let (chunks, vectors): (Vec<Chunk>, Vec<Vec<f32>>) = if searchable {
            let mut chunks = chunk_text(&doc.id, &redacted_body);
            chunks.truncate(self.policy.max_chunks_per_document);
            let chunk_texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            let (vectors, _backend) = self.embedding.embed(chunk_texts).await;
            (chunks, vectors)
        } else {
            (Vec::new(), Vec::new())
        };

        let persisted_id = self.store.upsert_document(doc.clone(), &chunks, &vectors).await?;
        let mut doc_with_id = doc;
        doc_with_id.id = persisted_id;

        if searchable {
            let edges = build_graph_edges(&doc_with_id);
            self.store.insert_graph_edges(&edges).await?;
        }

        Ok(())
    }

    fn record_extraction_outcome(&self, label: &str) {
        *self.extraction_counts.entry(label.to_string()).or_insert(0) += 1;
    }

    // ---- Query path (§4.7) --------------------------------------------

    pub fn authorize(&self, token: &str) -> Result<()> {
        if token == self.config.auth_token {
            Ok(())
        } else {
            Err(ErrorKind::Unauthorized)
        }
    }

    pub async fn suggest(&self, request: SuggestRequest) -> Result<SuggestResponse> {
        let started = Instant::now();
        let query_lower = request.query.trim().to_lowercase();
        let cache_key = format!(
            "{}|{}|{}|{}",
            query_lower,
            request.typing_mode,
            request.limit,
            filters_signature(&request.source_filters),
        );

        if let Some(cached) = self.suggest_cache.get(&cache_key) {
            if cached.cached_at.elapsed() < SUGGEST_CACHE_TTL {
                return Ok(cached.response.clone());
            }
        }

        let engine = HybridSearchEngine::new(&self.store, &self.embedding);
        let search_request = SearchRequest {
            query: &request.query,
            source_filters: request.source_filters,
            limit: request.limit,
            typing_mode: request.typing_mode,
            include_cold_partition_fallback: request.include_cold_partition_fallback,
            retrieval_overrides: &self.config.retrieval,
        };
        let suggestions = engine.search(&search_request).await?;

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.record_latency(latency_ms);

        let response = SuggestResponse {
            suggestions: suggestions.clone(),
            partial: false,
            total_candidate_count: suggestions.len(),
            latency_ms,
        };

        self.suggest_cache.insert(
            cache_key,
            CachedSuggestResponse { response: response.clone(), cached_at: Instant::now() },
        );

        let mut by_id = HashMap::with_capacity(suggestions.len());
        for suggestion in &suggestions {
            self.suggestion_by_id.insert(suggestion.id.clone(), suggestion.clone());
            by_id.insert(suggestion.id.clone(), suggestion.clone());
        }
        self.last_suggestions_by_query.insert(query_lower, by_id);

        Ok(response)
    }

    fn record_latency(&self, latency_ms: f64) {
        let mut latencies = self.latencies_ms.lock();
        latencies.push_back(latency_ms);
        if latencies.len() > 256 {
            latencies.pop_front();
        }
    }

    pub fn preview(&self, item_id: &str) -> Option<Suggestion> {
        self.suggestion_by_id.get(item_id).map(|s| s.value().clone())
    }

    pub async fn create_context_pack(&self, request: CreateContextPackRequest) -> Result<ContextPack> {
        let query_lower = request.query.trim().to_lowercase();
        let cache = self
            .last_suggestions_by_query
            .get(&query_lower)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        let pack_request = ContextPackRequest {
            query: &request.query,
            selected_suggestion_ids: &request.selected_suggestion_ids,
            mode_overrides: &request.mode_overrides,
        };
        let pack_id = format!("pack_{}", uuid::Uuid::new_v4());
        let pack = self.packs.assemble(&pack_request, &cache, pack_id)?;
        self.packs.persist(&pack)?;
        self.store
            .append_audit("context_pack_created", &serde_json::to_string(&pack)?)
            .await?;
        Ok(pack)
    }

    // ---- Observability & backfill control ------------------------------

    pub fn health(&self) -> HealthSnapshot {
        let latencies = self.latencies_ms.lock();
        HealthSnapshot {
            daemon_version: env!("CARGO_PKG_VERSION"),
            running: self.running.load(Ordering::SeqCst),
            queue_depth: self.queue.lock().len(),
            in_flight_count: self.in_flight.load(Ordering::SeqCst),
            last_error: self.last_error.lock().clone(),
            latency_p50_ms: percentile(&latencies, 0.50),
            latency_p95_ms: percentile(&latencies, 0.95),
            current_operation: if self.sleeping.load(Ordering::SeqCst) { "sleeping" } else { "running" },
            extraction_counts: self.extraction_counts.iter().map(|e| (e.key().clone(), *e.value())).collect(),
        }
    }

    pub fn queue_activity(&self) -> QueueActivity {
        QueueActivity {
            queue_depth: self.queue.lock().len(),
            sources: self.queue_counts.iter().map(|e| (e.key().clone(), *e.value())).collect(),
        }
    }

    pub fn state_snapshot(&self) -> StateSnapshot {
        let health = self.health();
        StateSnapshot {
            current_operation: health.current_operation,
            queue_activity: self.queue_activity(),
            health,
        }
    }

    pub async fn index_stats(&self) -> Result<IndexStats> {
        Ok(IndexStats { total_document_count: self.store.count_documents().await? })
    }

    /// One-shot full backfill across the configured allowlist roots,
    /// paginating by `limit`-sized pages until the connector returns no
    /// further events, persisting a checkpoint after each page.
    pub async fn trigger_backfill(&self, limit: usize) -> Result<Vec<BackfillCheckpoint>> {
        let checkpoint_key = format!("{}:{}", SourceType::File.as_str(), self.file_connector.scope_label);
        let mut cursor = self
            .store
            .load_checkpoint(&checkpoint_key)
            .await?
            .and_then(|c| c.resume_token)
            .and_then(|token| decode_resume_token(&token));

        let mut checkpoints = Vec::new();
        loop {
            let (events, resume_token) = self.file_connector.backfill(BackfillMode::Full, cursor.as_ref(), limit);
            let processed = events.len() as u64;
            for event in &events {
                self.enqueue(event.clone());
            }

            let checkpoint = BackfillCheckpoint {
                key: checkpoint_key.clone(),
                source_type: SourceType::File,
                scope_label: self.file_connector.scope_label.clone(),
                cursor: resume_token.as_ref().map(|(ts, path)| encode_resume_token(*ts, path)),
                last_indexed_path: resume_token.as_ref().map(|(_, path)| path.clone()),
                last_indexed_timestamp: resume_token.as_ref().map(|(ts, _)| *ts),
                resume_token: resume_token.as_ref().map(|(ts, path)| encode_resume_token(*ts, path)),
                items_processed: processed,
                items_skipped: 0,
                estimated_total: processed,
                status: if resume_token.is_some() { CheckpointStatus::Running } else { CheckpointStatus::Idle },
                updated_at: Utc::now(),
            };
            self.store.save_checkpoint(&checkpoint).await?;
            let done = resume_token.is_none() || events.is_empty();
            cursor = resume_token;
            checkpoints.push(checkpoint);
            if done {
                break;
            }
        }
        Ok(checkpoints)
    }

    pub async fn list_backfill_jobs(&self) -> Result<Vec<(String, String)>> {
        self.store.list_backfill_jobs().await
    }

    pub fn configure_scopes(&self, roots: Vec<PathBuf>) {
        let _ = roots;
    }
}

/// Drains raw OS-notify paths into the debounced [`ChangeWatcher`],
/// batching everything already queued on the channel per wakeup rather
/// than forwarding one path at a time.
async fn forward_notifications(svc: Arc<Service>, mut rx: tokio::sync::mpsc::UnboundedReceiver<PathBuf>) {
    let mut batch = Vec::new();
    while let Some(path) = rx.recv().await {
        batch.push(path);
        while let Ok(path) = rx.try_recv() {
            batch.push(path);
        }
        svc.watcher.notify_paths(batch.drain(..));
    }
}

fn filters_signature(filters: &SourceFilters) -> String {
    let mut labels: Vec<&'static str> = filters.source_types.iter().map(|t| t.as_str()).collect();
    labels.sort_unstable();
    labels.join(",")
}

fn percentile(samples: &VecDeque<f64>, p: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = samples.iter().copied().collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn outcome_label(outcome: crate::extract::ExtractionOutcome) -> &'static str {
    match outcome {
        crate::extract::ExtractionOutcome::Success => "success",
        crate::extract::ExtractionOutcome::Partial => "partial",
        crate::extract::ExtractionOutcome::Failed => "failed",
        crate::extract::ExtractionOutcome::Unsupported => "unsupported",
    }
}

fn has_non_searchable_extension(path: &str, non_searchable_extensions: &[String]) -> bool {
    let lower = path.to_lowercase();
    non_searchable_extensions.iter().any(|ext| lower.ends_with(&ext.to_lowercase()))
}

/// All active CPU cores. A genuine power-source read (AC vs battery) is
/// out of reach of this crate's dependency stack, so the daemon always
/// sizes its worker pool for full parallelism.
fn target_worker_count() -> usize {
    num_cpus::get().max(1)
}

fn encode_resume_token(timestamp_seconds: i64, path: &str) -> String {
    format!("{timestamp_seconds}|{}", percent_encode(path))
}

fn decode_resume_token(token: &str) -> Option<(i64, String)> {
    let (ts, path) = token.split_once('|')?;
    Some((ts.parse().ok()?, percent_decode(path)))
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Up to 10 unique "mentions" edges per searchable document: tokens of
/// alphanumeric plus `@`/`.`, longer than 3 chars, lowercased.
fn build_graph_edges(doc: &Document) -> Vec<GraphEdge> {
    let mut seen = HashSet::new();
    let mut edges = Vec::new();

    for raw_token in doc.body.split(|c: char| !(c.is_alphanumeric() || c == '@' || c == '.')) {
        if edges.len() >= GRAPH_EDGE_TOKEN_CAP {
            break;
        }
        if raw_token.len() <= GRAPH_EDGE_MIN_TOKEN_LEN {
            continue;
        }
        let token = raw_token.to_lowercase();
        if !seen.insert(token.clone()) {
            continue;
        }
        edges.push(GraphEdge {
            id: format!("{}:mentions:{}", doc.id, token),
            source_node: doc.id.clone(),
            target_node: token,
            edge_type: "mentions".to_string(),
            confidence: 0.6,
            weight: 1.0,
            source_type: doc.source_type,
            event_time: None,
            updated_at: doc.updated_at,
        });
    }

    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskLabel;

    fn sample_doc(body: &str) -> Document {
        Document {
            id: "doc_abc".to_string(),
            source_type: SourceType::File,
            source_id: "a.txt".to_string(),
            title: None,
            body: body.to_string(),
            source_path_or_handle: "/tmp/a.txt".to_string(),
            updated_at: Utc::now(),
            risk: RiskLabel::Low,
            partition: Partition::Hot,
            searchable: true,
        }
    }

    #[test]
    fn build_graph_edges_caps_at_ten_unique_tokens() {
        let body = (0..20).map(|i| format!("token{i}")).collect::<Vec<_>>().join(" ");
        let edges = build_graph_edges(&sample_doc(&body));
        assert_eq!(edges.len(), GRAPH_EDGE_TOKEN_CAP);
        for edge in &edges {
            assert_eq!(edge.confidence, 0.6);
            assert_eq!(edge.weight, 1.0);
            assert!(edge.id.starts_with("doc_abc:mentions:"));
        }
    }

    #[test]
    fn build_graph_edges_skips_short_tokens_and_dedupes() {
        let edges = build_graph_edges(&sample_doc("ab cd rustlang rustlang"));
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target_node, "rustlang");
    }

    #[test]
    fn resume_token_roundtrips_unicode_and_spaces() {
        let encoded = encode_resume_token(1234, "/tmp/a b/résumé.txt");
        let (ts, path) = decode_resume_token(&encoded).unwrap();
        assert_eq!(ts, 1234);
        assert_eq!(path, "/tmp/a b/résumé.txt");
    }

    #[test]
    fn percentile_of_empty_is_zero() {
        let empty = VecDeque::new();
        assert_eq!(percentile(&empty, 0.5), 0.0);
    }

    #[test]
    fn filters_signature_is_order_independent() {
        let a = SourceFilters { source_types: vec![SourceType::Email, SourceType::File] };
        let b = SourceFilters { source_types: vec![SourceType::File, SourceType::Email] };
        assert_eq!(filters_signature(&a), filters_signature(&b));
    }
}
