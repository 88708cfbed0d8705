pub mod csv_record;
pub mod service;
pub mod telemetry;
pub mod transcoder;
pub mod types;
pub mod workspace;
pub mod writers;

pub use csv_record::{CsvRecord, CSV_HEADERS};
pub use service::{ExportArtifact, ExportService};
pub use types::{CsvRow, ExportMode, ExportRequest, ExportStats, JobState};
pub use workspace::JobWorkspace;
pub use writers::{ConsolidatedCsv, CsvAssembler, CsvConfig};
