pub mod export;
pub mod redaction;
pub mod transcript;

pub use export::{ExportArtifact, ExportService};
pub use redaction::{HttpRedactor, PassthroughRedactor, Redactor};
pub use transcript::{ApiTranscriptRepository, TranscriptRepository};
