use crate::config::ExportConfig;
use crate::domains::export::types::{ExportMode, ExportRequest, ExportStats, JobState};
use crate::domains::export::workspace::JobWorkspace;
use crate::domains::export::writers::{ConsolidatedCsv, CsvAssembler, CsvConfig};
use crate::domains::redaction::{HttpRedactor, PassthroughRedactor, Redactor};
use crate::domains::transcript::repository::{ApiTranscriptRepository, TranscriptRepository};
use crate::errors::{ServiceError, ServiceResult, ValidationError};
use chrono::Utc;
use futures::stream::Stream;
use log::{debug, error, info};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// A finished archive, ready to be streamed.
///
/// Owns the job workspace: dropping the artifact, or the stream made from
/// it, removes the working directory and the archive.
#[derive(Debug)]
pub struct ExportArtifact {
    pub file_name: String,
    pub size: u64,
    pub stats: ExportStats,
    workspace: Arc<JobWorkspace>,
}

impl ExportArtifact {
    pub fn archive_path(&self) -> &Path {
        self.workspace.archive_path()
    }

    pub fn working_dir(&self) -> &Path {
        self.workspace.dir()
    }

    /// Stream the archive in chunks. Cleanup runs once the stream finishes or is dropped.
    pub async fn into_stream(
        self,
    ) -> ServiceResult<impl Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + 'static> {
        let file = tokio::fs::File::open(self.workspace.archive_path()).await?;
        debug!("Job {} -> {}", self.workspace.name(), JobState::Streaming);

        Ok(futures::stream::unfold(
            Some((file, self.workspace)),
            |state| async move {
                let (mut file, workspace) = match state {
                    Some(state) => state,
                    None => return None,
                };
                let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
                match file.read(&mut buf).await {
                    Ok(0) => {
                        drop(file);
                        debug!("Job {} -> {}", workspace.name(), JobState::CleaningUp);
                        None
                    }
                    Ok(n) => {
                        buf.truncate(n);
                        Some((Ok(buf), Some((file, workspace))))
                    }
                    Err(e) => {
                        error!("Failed streaming archive for job {}: {}", workspace.name(), e);
                        Some((Err(e), None))
                    }
                }
            },
        ))
    }
}

/// Sequences listing, fetching, transcoding, writing and archiving for one export
pub struct ExportService {
    config: ExportConfig,
    transcripts: Arc<dyn TranscriptRepository>,
    assembler: CsvAssembler,
}

impl std::fmt::Debug for ExportService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportService")
            .field("config", &self.config)
            .field("transcripts", &"<TranscriptRepository>")
            .field("assembler", &"<CsvAssembler>")
            .finish()
    }
}

impl ExportService {
    /// Build a service talking to the configured transcript and redaction services
    pub fn new(config: ExportConfig) -> Self {
        let transcripts: Arc<dyn TranscriptRepository> =
            Arc::new(ApiTranscriptRepository::new(&config.transcript_api_base));
        let redactor: Arc<dyn Redactor> = match config.redaction_url.as_deref() {
            Some(url) if config.redaction_enabled => Arc::new(HttpRedactor::new(url)),
            _ => Arc::new(PassthroughRedactor),
        };
        Self::with_dependencies(config, transcripts, redactor)
    }

    pub fn with_dependencies(
        config: ExportConfig,
        transcripts: Arc<dyn TranscriptRepository>,
        redactor: Arc<dyn Redactor>,
    ) -> Self {
        Self {
            config,
            transcripts,
            assembler: CsvAssembler::new(CsvConfig::default(), redactor),
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Run one export job, from validation to a finished archive, within the
    /// configured timeout. Streaming the artifact is not covered by it.
    ///
    /// On every failure path, timeout included, the job workspace is dropped.
    /// Removal happens before this returns unless a blocking file write or
    /// archive task is still running; that task holds the workspace and
    /// removes it when it finishes.
    pub async fn export(&self, request: ExportRequest) -> ServiceResult<ExportArtifact> {
        let timeout = self.config.job_timeout;
        match tokio::time::timeout(timeout, self.run_job(request)).await {
            Ok(Ok(artifact)) => Ok(artifact),
            Ok(Err(e)) => {
                error!("Export job failed: {}", e);
                Err(e)
            }
            Err(_) => {
                error!("Export job exceeded {} ms, abandoning it", timeout.as_millis());
                Err(ServiceError::Timeout(timeout.as_millis() as u64))
            }
        }
    }

    async fn run_job(&self, request: ExportRequest) -> ServiceResult<ExportArtifact> {
        let requested_at = Utc::now();
        debug!("Job for project {} -> {}", request.project_id, JobState::Validating);
        if request.api_key.trim().is_empty() {
            return Err(ValidationError::required("vfApiKey").into());
        }
        if request.project_id.trim().is_empty() {
            return Err(ValidationError::required("projectId").into());
        }

        let workspace = Arc::new(JobWorkspace::create(
            &self.config.work_root,
            &request.project_id,
            requested_at,
        )?);
        let job = workspace.name().to_string();

        debug!("Job {} -> {}", job, JobState::Listing);
        let sessions = self
            .transcripts
            .list_transcripts(&request.api_key, &request.project_id, &request.filter)
            .await?;

        let mut stats = ExportStats {
            sessions_listed: sessions.len(),
            ..Default::default()
        };
        let mut consolidated = ConsolidatedCsv::new();

        for session in &sessions {
            debug!("Job {} -> {} ({})", job, JobState::FetchingSession, session.session_id);
            tokio::time::sleep(self.config.inter_call_delay).await;
            let turns = self
                .transcripts
                .fetch_dialog(&request.project_id, &session.session_id, &request.api_key)
                .await?;

            if turns.is_empty() {
                debug!("Session {} has no turns, skipping", session.session_id);
                stats.sessions_skipped += 1;
                continue;
            }

            debug!("Job {} -> {} ({} turns)", job, JobState::Transcoding, turns.len());
            let block = self.assembler.session_csv(session, &turns).await?;
            stats.sessions_exported += 1;
            stats.rows_written += block.rows;

            match request.mode {
                ExportMode::PerSession => {
                    debug!("Job {} -> {}", job, JobState::Writing);
                    workspace
                        .write_file(&format!("{}.csv", session.id), block.text)
                        .await?;
                    stats.files_written += 1;
                }
                ExportMode::Consolidated => consolidated.append(&block),
            }
        }

        if request.mode == ExportMode::Consolidated && !consolidated.is_empty() {
            debug!("Job {} -> {}", job, JobState::Writing);
            workspace
                .write_file(
                    &format!("{}_transcripts.csv", request.project_id),
                    consolidated.into_text(),
                )
                .await?;
            stats.files_written += 1;
        }

        debug!("Job {} -> {}", job, JobState::Archiving);
        let size = workspace.archive().await?;

        info!(
            "Export job {} finished: {} sessions listed, {} exported, {} skipped, {} rows, {} bytes",
            job,
            stats.sessions_listed,
            stats.sessions_exported,
            stats.sessions_skipped,
            stats.rows_written,
            size
        );

        Ok(ExportArtifact {
            file_name: workspace.archive_file_name(),
            size,
            stats,
            workspace,
        })
    }
}
