use crate::domains::export::types::{ExportMode, ExportRequest};
use crate::domains::transcript::types::{DateRange, TranscriptFilter};
use crate::errors::{ValidationError, ValidationResult};
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;

/// Raw query parameters of `GET /export`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportQuery {
    pub vf_api_key: Option<String>,
    pub project_id: Option<String>,
    pub tag: Option<String>,
    pub range: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub single_file: Option<String>,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parse an ISO-8601 calendar date, or a full timestamp whose date part is kept
pub fn parse_iso_date(field: &str, value: &str) -> ValidationResult<NaiveDate> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.date_naive())
        .map_err(|_| ValidationError::format(field, "expected an ISO-8601 date"))
}

/// Parse a literal `"true"` / `"false"` flag; absent means false
pub fn parse_flag(field: &str, value: Option<&str>) -> ValidationResult<bool> {
    match value.map(str::trim) {
        None | Some("") | Some("false") => Ok(false),
        Some("true") => Ok(true),
        Some(_) => Err(ValidationError::invalid_value(field, "expected \"true\" or \"false\"")),
    }
}

fn parse_range(value: &str) -> ValidationResult<DateRange> {
    value.parse::<DateRange>().map_err(|_| {
        let allowed: Vec<&str> = DateRange::ALL.iter().map(|r| r.as_str()).collect();
        ValidationError::invalid_value("range", &format!("must be one of: {}", allowed.join(", ")))
    })
}

impl ExportQuery {
    /// Check every parameter and build the export request
    pub fn validate(&self) -> ValidationResult<ExportRequest> {
        let api_key = non_empty(self.vf_api_key.as_ref())
            .ok_or_else(|| ValidationError::required("vfApiKey"))?;
        let project_id = non_empty(self.project_id.as_ref())
            .ok_or_else(|| ValidationError::required("projectId"))?;

        let range = non_empty(self.range.as_ref())
            .map(|r| parse_range(&r))
            .transpose()?;
        let start_date = non_empty(self.start_date.as_ref())
            .map(|d| parse_iso_date("startDate", &d))
            .transpose()?;
        let end_date = non_empty(self.end_date.as_ref())
            .map(|d| parse_iso_date("endDate", &d))
            .transpose()?;

        let mode = if parse_flag("singleFile", self.single_file.as_deref())? {
            ExportMode::Consolidated
        } else {
            ExportMode::PerSession
        };

        Ok(ExportRequest {
            api_key,
            project_id,
            filter: TranscriptFilter {
                tag: non_empty(self.tag.as_ref()),
                range,
                start_date,
                end_date,
            },
            mode,
        })
    }
}
