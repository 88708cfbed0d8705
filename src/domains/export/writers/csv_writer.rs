use crate::domains::export::csv_record::{CsvRecord, CSV_HEADERS};
use crate::domains::export::transcoder::build_row;
use crate::domains::export::types::CsvRow;
use crate::domains::redaction::Redactor;
use crate::domains::transcript::types::{DialogTurn, SessionSummary};
use crate::errors::{ServiceError, ServiceResult};
use std::sync::Arc;

#[derive(Clone)]
pub struct CsvConfig {
    pub delimiter: u8,
    pub quote_char: u8,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote_char: b'"',
        }
    }
}

/// The fixed header line, without terminator
pub fn header_line() -> String {
    CSV_HEADERS.join(",")
}

/// Drop the header line from a session block so it can be appended to a consolidated file
pub fn strip_header(block: &str) -> &str {
    match block.split_once('\n') {
        Some((_, rest)) => rest,
        None => "",
    }
}

/// CSV text for one session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionBlock {
    pub text: String,
    pub rows: usize,
}

/// Builds CSV text from session turns, redacting user-authored output when configured
pub struct CsvAssembler {
    config: CsvConfig,
    redactor: Arc<dyn Redactor>,
}

impl CsvAssembler {
    pub fn new(config: CsvConfig, redactor: Arc<dyn Redactor>) -> Self {
        Self { config, redactor }
    }

    /// Transcode every turn of a session, in order
    pub async fn session_rows(&self, session: &SessionSummary, turns: &[DialogTurn]) -> Vec<CsvRow> {
        let mut rows = Vec::with_capacity(turns.len());
        for turn in turns {
            let mut transcoded = build_row(session, turn);
            if transcoded.redact_output && !transcoded.row.output.is_empty() {
                let redacted = self.redactor.process_text(&transcoded.row.output).await;
                transcoded.apply_redaction(turn, redacted);
            }
            rows.push(transcoded.row);
        }
        rows
    }

    /// Header line followed by one line per turn.
    ///
    /// Every cell is quoted with inner quotes doubled, and line breaks inside
    /// cells are already collapsed, so each row is exactly one physical line.
    pub async fn session_csv(
        &self,
        session: &SessionSummary,
        turns: &[DialogTurn],
    ) -> ServiceResult<SessionBlock> {
        let rows = self.session_rows(session, turns).await;
        let text = self.render(&rows)?;
        Ok(SessionBlock {
            text,
            rows: rows.len(),
        })
    }

    fn render(&self, rows: &[CsvRow]) -> ServiceResult<String> {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(header_line().as_bytes());
        buffer.push(b'\n');

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(self.config.delimiter)
            .quote(self.config.quote_char)
            .quote_style(csv::QuoteStyle::Always)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(buffer);

        for row in rows {
            wtr.write_record(&row.to_csv())
                .map_err(|e| ServiceError::Internal(format!("CSV write failed: {}", e)))?;
        }

        let buffer = wtr
            .into_inner()
            .map_err(|e| ServiceError::Internal(format!("CSV flush failed: {}", e)))?;
        String::from_utf8(buffer)
            .map_err(|e| ServiceError::Internal(format!("CSV is not valid UTF-8: {}", e)))
    }
}

/// Accumulates several session blocks into one file with a single header
#[derive(Debug, Clone, Default)]
pub struct ConsolidatedCsv {
    text: String,
    rows: usize,
}

impl ConsolidatedCsv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, block: &SessionBlock) {
        if self.text.is_empty() {
            self.text.push_str(&block.text);
        } else {
            self.text.push_str(strip_header(&block.text));
        }
        self.rows += block.rows;
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn into_text(self) -> String {
        self.text
    }
}
