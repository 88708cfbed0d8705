pub mod repository;
pub mod types;

pub use repository::{ApiTranscriptRepository, TranscriptRepository};
pub use types::{DateRange, DialogTurn, SessionSummary, TranscriptFilter};
