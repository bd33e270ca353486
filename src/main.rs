//! Operator-facing CLI for the retrieval daemon (§10.4).
//!
//! Stands in for the transport layer proper (HTTP/IPC), which is out of
//! scope: every subcommand drives the [`Service`](retrieval_daemon::service::Service)
//! in-process against the configured database, never opening a network port.

use clap::{Parser, Subcommand};
use retrieval_daemon::config::load_config;
use retrieval_daemon::db;
use retrieval_daemon::embedding::EmbeddingRuntime;
use retrieval_daemon::models::SourceType;
use retrieval_daemon::policy::IndexingPolicy;
use retrieval_daemon::service::{CreateContextPackRequest, Service, SuggestRequest};
use retrieval_daemon::store::{SourceFilters, Store};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "retrieval-daemon",
    about = "Local hybrid retrieval daemon: lexical + vector + graph search over a continuously ingested personal corpus",
    version
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "./config/daemon.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon and block until Ctrl-C, then stop gracefully.
    Serve,

    /// Run one full backfill pass and print the resulting checkpoints.
    Backfill {
        /// Page size per backfill request.
        #[arg(long, default_value_t = 256)]
        limit: usize,
    },

    /// Print ranked suggestions for a query.
    Suggest {
        query: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Use the tighter "typing" tuning instead of "deep".
        #[arg(long)]
        typing: bool,

        /// Allow falling back to the cold partition when hot/warm is thin.
        #[arg(long)]
        cold_fallback: bool,

        /// Restrict results to these source types (repeatable).
        #[arg(long = "source", value_enum)]
        sources: Vec<CliSourceType>,
    },

    /// Assemble and persist a context pack from a query and suggestion IDs.
    Pack {
        query: String,

        /// Suggestion IDs to include, as printed by `suggest`.
        #[arg(required = true)]
        suggestion_ids: Vec<String>,
    },

    /// Print the daemon's health snapshot.
    Health,

    /// Print the daemon's full state snapshot (health + queue activity).
    Stats,
}

#[derive(Clone, clap::ValueEnum)]
enum CliSourceType {
    File,
    Email,
    Message,
    Calendar,
}

impl From<CliSourceType> for SourceType {
    fn from(value: CliSourceType) -> Self {
        match value {
            CliSourceType::File => SourceType::File,
            CliSourceType::Email => SourceType::Email,
            CliSourceType::Message => SourceType::Message,
            CliSourceType::Calendar => SourceType::Calendar,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            let service = build_service(config).await?;
            service.clone().start().await?;
            tracing::info!("daemon started, waiting for ctrl-c");
            tokio::signal::ctrl_c().await?;
            tracing::info!("shutting down");
            service.stop().await;
        }
        Commands::Backfill { limit } => {
            let service = build_service(config).await?;
            let checkpoints = service.trigger_backfill(limit).await?;
            println!("{}", serde_json::to_string_pretty(&checkpoints)?);
        }
        Commands::Suggest { query, limit, typing, cold_fallback, sources } => {
            let service = build_service(config).await?;
            let response = service
                .suggest(SuggestRequest {
                    query,
                    source_filters: SourceFilters { source_types: sources.into_iter().map(Into::into).collect() },
                    limit,
                    typing_mode: typing,
                    include_cold_partition_fallback: cold_fallback,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&response.suggestions)?);
        }
        Commands::Pack { query, suggestion_ids } => {
            let service = build_service(config).await?;
            // Re-populate the suggestion cache for this query in-process,
            // since `create_context_pack` reads from it and a fresh CLI
            // invocation starts with an empty cache.
            service
                .suggest(SuggestRequest {
                    query: query.clone(),
                    source_filters: SourceFilters::default(),
                    limit: 100,
                    typing_mode: false,
                    include_cold_partition_fallback: true,
                })
                .await?;
            let pack = service
                .create_context_pack(CreateContextPackRequest {
                    query,
                    selected_suggestion_ids: suggestion_ids,
                    mode_overrides: Default::default(),
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&pack)?);
        }
        Commands::Health => {
            let service = build_service(config).await?;
            println!("{}", serde_json::to_string_pretty(&service.health())?);
        }
        Commands::Stats => {
            let service = build_service(config).await?;
            println!("{}", serde_json::to_string_pretty(&service.state_snapshot())?);
        }
    }

    Ok(())
}

async fn build_service(config: retrieval_daemon::config::Config) -> anyhow::Result<Arc<Service>> {
    let pool = db::connect(&config).await?;
    let store = Store::new(pool);
    let embedding = EmbeddingRuntime::new(&config.embedding);
    let policy = IndexingPolicy::resolve(config.indexing_profile, config.startup_allowlist_roots.clone(), &config.policy);
    Ok(Service::new(config, store, embedding, policy))
}
