use crate::domains::transcript::types::TranscriptFilter;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One flattened dialog turn. Every row carries all sixteen columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CsvRow {
    pub transcript_id: String,
    pub session_id: String,
    pub start_time: String,
    pub turn_id: String,
    pub turn_type: String,
    pub event: String,
    pub content: String,
    pub output: String,
    pub ai: bool,
    pub intent_matched: String,
    pub confidence_interval: String,
    pub model: String,
    pub token_multiplier: f64,
    pub token_consumption_total: u64,
    pub token_consumption_query: u64,
    pub token_consumption_answer: u64,
}

/// How session rows are laid out into files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExportMode {
    /// One CSV file per session
    #[default]
    PerSession,
    /// A single CSV file holding every session, header emitted once
    Consolidated,
}

/// A validated export request
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub api_key: String,
    pub project_id: String,
    pub filter: TranscriptFilter,
    pub mode: ExportMode,
}

/// Lifecycle of a single export job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Validating,
    Listing,
    FetchingSession,
    Transcoding,
    Writing,
    Archiving,
    Streaming,
    CleaningUp,
    Done,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Validating => "validating",
            JobState::Listing => "listing",
            JobState::FetchingSession => "fetching_session",
            JobState::Transcoding => "transcoding",
            JobState::Writing => "writing",
            JobState::Archiving => "archiving",
            JobState::Streaming => "streaming",
            JobState::CleaningUp => "cleaning_up",
            JobState::Done => "done",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Export statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportStats {
    pub sessions_listed: usize,
    pub sessions_exported: usize,
    pub sessions_skipped: usize,
    pub rows_written: usize,
    pub files_written: usize,
}
