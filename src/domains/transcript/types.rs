use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// One recorded conversation, as returned by the transcript list call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
}

/// One recorded exchange event within a session.
///
/// `payload` is left untyped: its shape depends on `turn_type` and on the
/// nested `payload.type`, and the transcoder dispatches on both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogTurn {
    #[serde(rename = "turnID", default, deserialize_with = "lenient_string")]
    pub turn_id: String,
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub turn_type: String,
    #[serde(rename = "startTime", default, deserialize_with = "lenient_string")]
    pub start_time: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub format: String,
    #[serde(default)]
    pub payload: Value,
}

/// Accept any JSON scalar for a text attribute: `null` reads as empty,
/// numbers and booleans as their literal text.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

impl DialogTurn {
    /// Nested discriminant, `payload.type`, if present
    pub fn event(&self) -> &str {
        self.payload.get("type").and_then(Value::as_str).unwrap_or("")
    }

    /// Event-specific body, `payload.payload`, or `Null` when absent
    pub fn body(&self) -> &Value {
        self.payload.get("payload").unwrap_or(&NULL)
    }

    /// String at a path inside the event body, e.g. `["query"]` or `["intent", "name"]`
    pub fn body_str(&self, path: &[&str]) -> Option<&str> {
        let mut current = self.body();
        for key in path {
            current = current.get(*key)?;
        }
        current.as_str()
    }
}

static NULL: Value = Value::Null;

/// Predefined date windows understood by the transcript service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRange {
    Today,
    Yesterday,
    Last7Days,
    Last30Days,
    AllTime,
}

impl DateRange {
    pub const ALL: [DateRange; 5] = [
        DateRange::Today,
        DateRange::Yesterday,
        DateRange::Last7Days,
        DateRange::Last30Days,
        DateRange::AllTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DateRange::Today => "Today",
            DateRange::Yesterday => "Yesterday",
            DateRange::Last7Days => "Last 7 days",
            DateRange::Last30Days => "Last 30 days",
            DateRange::AllTime => "All time",
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DateRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DateRange::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown range '{}'", s))
    }
}

/// Filters forwarded verbatim to the transcript list call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptFilter {
    pub tag: Option<String>,
    pub range: Option<DateRange>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl TranscriptFilter {
    /// Query pairs in the order the list endpoint documents them
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(tag) = &self.tag {
            pairs.push(("tag", tag.clone()));
        }
        if let Some(range) = self.range {
            pairs.push(("range", range.as_str().to_string()));
        }
        if let Some(start) = self.start_date {
            pairs.push(("startDate", start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = self.end_date {
            pairs.push(("endDate", end.format("%Y-%m-%d").to_string()));
        }
        pairs
    }
}
