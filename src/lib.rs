//! # Retrieval Daemon
//!
//! A local-first hybrid retrieval daemon: it watches a personal corpus
//! (filesystem today, other source types by model), keeps a continuously
//! updated SQLite index of lexical, vector, and co-occurrence-graph
//! signals over it, and answers ranked-suggestion and context-assembly
//! queries from an always-resident in-process [`service::Service`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌───────────┐
//! │ FileConnector│──▶│   Service      │──▶│  SQLite   │
//! │ + ChangeWatch│   │ queue+workers  │   │ FTS5+Vec  │
//! └──────────────┘   └───────┬───────┘   └─────┬─────┘
//!                            │                  │
//!                            ▼                  ▼
//!                    ┌────────────────┐   ┌─────────────┐
//!                    │ HybridSearch   │   │ ContextPack │
//!                    │ lex+vec+graph  │   │ Assembler   │
//!                    └────────────────┘   └─────────────┘
//! ```
//!
//! ## Data flow
//!
//! 1. [`connector_fs`] and [`watcher`] produce [`models::IngestionEvent`]s,
//!    either from a paginated backfill sweep or debounced live
//!    filesystem notifications.
//! 2. [`service::Service`]'s worker pool runs each event through
//!    [`policy::IndexingPolicy`] and [`extract`], redacts the result,
//!    chunks it ([`chunk`]), embeds the chunks ([`embedding`]), and
//!    persists everything through [`store::Store`].
//! 3. [`search::HybridSearchEngine`] answers `suggest` queries by merging
//!    lexical, vector, and graph-boosted candidates and reranking them.
//! 4. [`contextpack::ContextPackAssembler`] turns a caller's selected
//!    suggestions into a redacted, mode-tagged [`models::ContextPack`]
//!    persisted to disk.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing, profile/override resolution |
//! | [`models`] | Core data types: `Document`, `Chunk`, `GraphEdge`, `Suggestion`, … |
//! | [`policy`] | Allowlist/exclude/size/extension rules and recency partitioning |
//! | [`connector_fs`] | Filesystem connector: capacity-bounded backfill enumeration |
//! | [`watcher`] | Debounced live filesystem change notification |
//! | [`chunk`] | Paragraph-boundary text chunker |
//! | [`extract`] | Per-type extraction chain (text, PDF, Office, images, fallback) |
//! | [`embedding`] | Embedding runtime: local backend plus deterministic fallback |
//! | [`store`] | SQLite-backed persistence: FTS5, vectors, graph edges, checkpoints |
//! | [`search`] | Hybrid lexical + vector + graph search with reranking |
//! | [`contextpack`] | Redacted context-pack assembly and persistence |
//! | [`service`] | The actor owning the queue, worker pool, and RPC surface |
//! | [`db`] | SQLite connection pool setup (WAL mode, migrations) |
//! | [`migrate`] | Database schema migrations (idempotent) |
//! | [`error`] | The closed `ErrorKind` error type |
//!
//! ## Configuration
//!
//! The daemon is configured via a TOML file. See [`config`] for all
//! available options and [`config::load_config`] for validation rules.

pub mod chunk;
pub mod config;
pub mod connector_fs;
pub mod contextpack;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod migrate;
pub mod models;
pub mod policy;
pub mod search;
pub mod service;
pub mod store;
pub mod watcher;
