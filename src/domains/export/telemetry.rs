//! Extraction of model usage figures from internal debug messages.
//!
//! The transcript service records LLM usage as a human-readable debug turn,
//! not as structured data. Expected input (line breaks and backticks around
//! the consumption object are optional):
//!
//! ```text
//! __AI Response__
//! Model: `gpt-4o`
//! Token Multiplier: 2.50x
//! Token Consumption: `{total: 160, query: 106, answer: 54}`
//! ```
//!
//! Only messages starting with [`TELEMETRY_MARKER`] are parsed. Each figure is
//! matched on its own; a figure that is not found keeps its zero value.

use regex::Regex;
use std::sync::OnceLock;

/// Prefix that marks a debug message as carrying usage telemetry
pub const TELEMETRY_MARKER: &str = "__";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryFields {
    pub model: String,
    pub token_multiplier: f64,
    pub tokens_total: u64,
    pub tokens_query: u64,
    pub tokens_answer: u64,
}

fn model_regex() -> &'static Regex {
    static MODEL_REGEX: OnceLock<Regex> = OnceLock::new();
    MODEL_REGEX.get_or_init(|| Regex::new(r"Model:\s*`([^`]*)`").unwrap())
}

fn multiplier_regex() -> &'static Regex {
    static MULTIPLIER_REGEX: OnceLock<Regex> = OnceLock::new();
    MULTIPLIER_REGEX.get_or_init(|| Regex::new(r"Token Multiplier:\s*(\d+(?:\.\d+)?)x").unwrap())
}

fn consumption_regex() -> &'static Regex {
    static CONSUMPTION_REGEX: OnceLock<Regex> = OnceLock::new();
    CONSUMPTION_REGEX.get_or_init(|| {
        Regex::new(
            r"Token Consumption:\s*`?\{\s*total:\s*(\d+),\s*query:\s*(\d+),\s*answer:\s*(\d+)\s*\}`?",
        )
        .unwrap()
    })
}

/// Parse usage figures out of a debug message.
///
/// Returns all-default fields when the message is not telemetry-marked.
pub fn extract_telemetry(message: &str) -> TelemetryFields {
    let mut fields = TelemetryFields::default();
    if !message.starts_with(TELEMETRY_MARKER) {
        return fields;
    }

    if let Some(caps) = model_regex().captures(message) {
        fields.model = caps[1].to_string();
    }
    if let Some(caps) = multiplier_regex().captures(message) {
        fields.token_multiplier = caps[1].parse().unwrap_or_default();
    }
    if let Some(caps) = consumption_regex().captures(message) {
        fields.tokens_total = caps[1].parse().unwrap_or_default();
        fields.tokens_query = caps[2].parse().unwrap_or_default();
        fields.tokens_answer = caps[3].parse().unwrap_or_default();
    }

    fields
}
