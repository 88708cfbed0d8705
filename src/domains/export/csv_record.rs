use crate::domains::export::types::CsvRow;
use serde::Serialize;

/// Column names of the export schema, in output order
pub const CSV_HEADERS: [&str; 16] = [
    "transcriptID",
    "sessionID",
    "startTime",
    "turnID",
    "type",
    "event",
    "content",
    "output",
    "ai",
    "intent_matched",
    "confidence_interval",
    "model",
    "token_multiplier",
    "token_consumption_total",
    "token_consumption_query",
    "token_consumption_answer",
];

/// Trait for types that can be exported to CSV
pub trait CsvRecord: Serialize {
    /// Get CSV headers for this type
    fn headers() -> Vec<&'static str>;

    /// Convert to CSV row
    fn to_csv(&self) -> Vec<String>;
}

/// Replace every line break with a single space so a cell stays on one physical line.
///
/// Lossy: the original line breaks cannot be recovered.
pub fn collapse_newlines(s: &str) -> String {
    s.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

fn csv_value_to_string<T: std::fmt::Display>(value: &T) -> String {
    collapse_newlines(&value.to_string())
}

impl CsvRecord for CsvRow {
    fn headers() -> Vec<&'static str> {
        CSV_HEADERS.to_vec()
    }

    fn to_csv(&self) -> Vec<String> {
        vec![
            csv_value_to_string(&self.transcript_id),
            csv_value_to_string(&self.session_id),
            csv_value_to_string(&self.start_time),
            csv_value_to_string(&self.turn_id),
            csv_value_to_string(&self.turn_type),
            csv_value_to_string(&self.event),
            csv_value_to_string(&self.content),
            csv_value_to_string(&self.output),
            self.ai.to_string(),
            csv_value_to_string(&self.intent_matched),
            csv_value_to_string(&self.confidence_interval),
            csv_value_to_string(&self.model),
            self.token_multiplier.to_string(),
            self.token_consumption_total.to_string(),
            self.token_consumption_query.to_string(),
            self.token_consumption_answer.to_string(),
        ]
    }
}
