//! Core data types shared across the ingestion and query paths.
//!
//! [`SourceType`], [`RiskLabel`], [`Partition`], [`InjectionMode`], and the
//! persisted/queued entities (`Document`, `Chunk`, `GraphEdge`,
//! `BackfillCheckpoint`, `IngestionEvent`) plus the `ContextPack` response
//! artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of ingestible source kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    File,
    Email,
    Message,
    Calendar,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::File => "file",
            SourceType::Email => "email",
            SourceType::Message => "message",
            SourceType::Calendar => "calendar",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(SourceType::File),
            "email" => Some(SourceType::Email),
            "message" => Some(SourceType::Message),
            "calendar" => Some(SourceType::Calendar),
            _ => None,
        }
    }
}

/// Body-keyword-derived sensitivity label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLabel {
    Low,
    Medium,
    High,
}

impl RiskLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::Low => "low",
            RiskLabel::Medium => "medium",
            RiskLabel::High => "high",
        }
    }
}

/// Age-derived recency tier, used to bound query scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Hot,
    Warm,
    Cold,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Hot => "hot",
            Partition::Warm => "warm",
            Partition::Cold => "cold",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hot" => Some(Partition::Hot),
            "warm" => Some(Partition::Warm),
            "cold" => Some(Partition::Cold),
            _ => None,
        }
    }

    /// <30d hot, <180d warm, else cold.
    pub fn from_age(updated_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let age_days = (now - updated_at).num_days();
        if age_days < 30 {
            Partition::Hot
        } else if age_days < 180 {
            Partition::Warm
        } else {
            Partition::Cold
        }
    }
}

/// How a selected suggestion's content is packaged into a context pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InjectionMode {
    FileRef,
    InlineSnippet,
    StructuredSummary,
}

impl InjectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InjectionMode::FileRef => "fileRef",
            InjectionMode::InlineSnippet => "inlineSnippet",
            InjectionMode::StructuredSummary => "structuredSummary",
        }
    }

    /// Default mode for a source type: fileRef for files, structuredSummary
    /// for mail/messages/calendar.
    pub fn default_for(source_type: SourceType) -> Self {
        match source_type {
            SourceType::File => InjectionMode::FileRef,
            _ => InjectionMode::StructuredSummary,
        }
    }
}

/// The canonical indexed unit.
#[derive(Debug, Clone)]
pub struct Document {
    /// `doc_` + first 24 hex chars of `sha256(sourceType|sourceId)`.
    pub id: String,
    pub source_type: SourceType,
    pub source_id: String,
    pub title: Option<String>,
    /// Redacted, length-bounded extracted/normalized body.
    pub body: String,
    /// Absolute path for files; an opaque handle for other sources.
    pub source_path_or_handle: String,
    pub updated_at: DateTime<Utc>,
    pub risk: RiskLabel,
    pub partition: Partition,
    /// false => excluded from query paths, lacks chunks/vectors/edges.
    pub searchable: bool,
}

/// A contiguous slice of a document's body used as a retrieval unit.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// `"{document_id}:{index}"`.
    pub id: String,
    pub document_id: String,
    pub index: i64,
    pub text: String,
}

/// A weighted undirected relation between two nodes (document IDs, or
/// lowercased mention tokens).
#[derive(Debug, Clone)]
pub struct GraphEdge {
    /// `"{docId}:mentions:{tokenLower}"`.
    pub id: String,
    pub source_node: String,
    pub target_node: String,
    pub edge_type: String,
    pub confidence: f64,
    pub weight: f64,
    pub source_type: SourceType,
    pub event_time: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Per-source backfill progress, keyed by `"{sourceType}:{scope}"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillCheckpoint {
    pub key: String,
    pub source_type: SourceType,
    pub scope_label: String,
    pub cursor: Option<String>,
    pub last_indexed_path: Option<String>,
    pub last_indexed_timestamp: Option<i64>,
    pub resume_token: Option<String>,
    pub items_processed: u64,
    pub items_skipped: u64,
    pub estimated_total: u64,
    pub status: CheckpointStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStatus {
    Running,
    Idle,
}

/// A queued unit of ingestion work.
#[derive(Debug, Clone)]
pub struct IngestionEvent {
    pub id: String,
    pub source_type: SourceType,
    pub scope_label: String,
    pub source_id: String,
    pub title: Option<String>,
    pub body: String,
    pub source_path_or_handle: String,
    pub occurred_at: DateTime<Utc>,
    pub operation: IngestionOperation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionOperation {
    Upsert,
    Delete,
}

/// A single ranked retrieval result surfaced by the search engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: String,
    pub document_id: String,
    pub source_type: SourceType,
    pub title: Option<String>,
    pub snippet: String,
    pub file_path: Option<String>,
    pub score: f64,
    pub reasons: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// One item within an assembled [`ContextPack`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextPackItem {
    pub source_type: SourceType,
    pub mode: InjectionMode,
    pub title: Option<String>,
    /// Redacted text.
    pub text: String,
    pub file_path: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Assembled, redacted response artifact built from selected suggestions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextPack {
    pub id: String,
    pub query: String,
    pub items: Vec<ContextPackItem>,
    pub attachment_paths: Vec<String>,
    pub inline_prompt_blocks: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn partition_from_age_boundaries() {
        let now = Utc::now();
        assert_eq!(Partition::from_age(now, now), Partition::Hot);
        assert_eq!(
            Partition::from_age(now - Duration::days(29), now),
            Partition::Hot
        );
        assert_eq!(
            Partition::from_age(now - Duration::days(30), now),
            Partition::Warm
        );
        assert_eq!(
            Partition::from_age(now - Duration::days(179), now),
            Partition::Warm
        );
        assert_eq!(
            Partition::from_age(now - Duration::days(180), now),
            Partition::Cold
        );
        assert_eq!(
            Partition::from_age(now - Duration::days(400), now),
            Partition::Cold
        );
    }

    #[test]
    fn source_type_round_trips() {
        for st in [
            SourceType::File,
            SourceType::Email,
            SourceType::Message,
            SourceType::Calendar,
        ] {
            assert_eq!(SourceType::parse(st.as_str()), Some(st));
        }
        assert_eq!(SourceType::parse("bogus"), None);
    }

    #[test]
    fn injection_mode_defaults() {
        assert_eq!(
            InjectionMode::default_for(SourceType::File),
            InjectionMode::FileRef
        );
        assert_eq!(
            InjectionMode::default_for(SourceType::Email),
            InjectionMode::StructuredSummary
        );
    }
}
