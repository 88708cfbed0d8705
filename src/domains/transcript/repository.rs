use crate::domains::transcript::types::{DialogTurn, SessionSummary, TranscriptFilter};
use crate::errors::{ServiceError, ServiceResult, ValidationError};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// Read access to the remote transcript service
#[async_trait]
pub trait TranscriptRepository: Send + Sync {
    /// List every session recorded for a project under the given filters.
    ///
    /// Any failure aborts: a partial list is never returned.
    async fn list_transcripts(
        &self,
        api_key: &str,
        project_id: &str,
        filter: &TranscriptFilter,
    ) -> ServiceResult<Vec<SessionSummary>>;

    /// Fetch the ordered turns of one session.
    ///
    /// An unauthorized or unparseable response yields an empty list; any other
    /// failure is an error.
    async fn fetch_dialog(
        &self,
        project_id: &str,
        session_id: &str,
        api_key: &str,
    ) -> ServiceResult<Vec<DialogTurn>>;
}

/// Implementation of TranscriptRepository backed by the transcript HTTP API
pub struct ApiTranscriptRepository {
    client: Client,
    base_url: String,
}

impl ApiTranscriptRepository {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn auth_header(&self, api_key: &str) -> String {
        format!("Bearer {}", api_key)
    }

    /// `{base}/transcripts/{segment}/...`, each segment percent-encoded
    fn transcripts_url(&self, segments: &[&str]) -> String {
        let mut url = format!("{}/transcripts", self.base_url);
        for segment in segments {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        url
    }
}

fn require<'a>(field: &str, value: &'a str) -> ServiceResult<&'a str> {
    if value.trim().is_empty() {
        return Err(ValidationError::required(field).into());
    }
    Ok(value)
}

#[async_trait]
impl TranscriptRepository for ApiTranscriptRepository {
    async fn list_transcripts(
        &self,
        api_key: &str,
        project_id: &str,
        filter: &TranscriptFilter,
    ) -> ServiceResult<Vec<SessionSummary>> {
        let api_key = require("vfApiKey", api_key)?;
        let project_id = require("projectId", project_id)?;

        let url = self.transcripts_url(&[project_id]);
        debug!("Listing transcripts for project {} with filter {:?}", project_id, filter);

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header(api_key))
            .query(&filter.query_pairs())
            .send()
            .await
            .map_err(|e| ServiceError::Upstream(format!("Failed to list transcripts: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ServiceError::Authentication(
                "Transcript service rejected the API key".to_string(),
            ));
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to get error details".to_string());
            return Err(ServiceError::Upstream(format!(
                "Transcript list returned error {}: {}",
                status, error_text
            )));
        }

        let sessions = response
            .json::<Vec<SessionSummary>>()
            .await
            .map_err(|e| ServiceError::Upstream(format!("Failed to parse transcript list: {}", e)))?;

        debug!("Transcript service returned {} sessions", sessions.len());
        Ok(sessions)
    }

    async fn fetch_dialog(
        &self,
        project_id: &str,
        session_id: &str,
        api_key: &str,
    ) -> ServiceResult<Vec<DialogTurn>> {
        let url = self.transcripts_url(&[project_id, session_id]);

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header(api_key))
            .send()
            .await
            .map_err(|e| {
                ServiceError::Upstream(format!("Failed to fetch session {}: {}", session_id, e))
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!("Unauthorized fetching session {}, skipping it", session_id);
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to get error details".to_string());
            return Err(ServiceError::Upstream(format!(
                "Session {} returned error {}: {}",
                session_id, status, error_text
            )));
        }

        // A body that is not a turn array is confined to this session
        let body = response.bytes().await.map_err(|e| {
            ServiceError::Upstream(format!("Failed to read session {}: {}", session_id, e))
        })?;
        let raw = match serde_json::from_slice::<Vec<Value>>(&body) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Unparseable turns for session {}, skipping it: {}", session_id, e);
                return Ok(Vec::new());
            }
        };

        // One malformed turn must not cost the session its other turns
        let mut turns = Vec::with_capacity(raw.len());
        for (index, value) in raw.into_iter().enumerate() {
            match serde_json::from_value::<DialogTurn>(value) {
                Ok(turn) => turns.push(turn),
                Err(e) => warn!("Dropping malformed turn {} of session {}: {}", index, session_id, e),
            }
        }
        Ok(turns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::transcript::types::DateRange;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_list_forwards_filters_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transcripts/proj1"))
            .and(header("Authorization", "Bearer key1"))
            .and(query_param("tag", "prod"))
            .and(query_param("range", "Last 30 days"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"_id": "t1", "sessionID": "s1"},
                {"_id": "t2", "sessionID": "s2"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let repo = ApiTranscriptRepository::new(&server.uri());
        let filter = TranscriptFilter {
            tag: Some("prod".into()),
            range: Some(DateRange::Last30Days),
            ..Default::default()
        };
        let sessions = repo.list_transcripts("key1", "proj1", &filter).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[1].session_id, "s2");
    }

    #[tokio::test]
    async fn test_list_unauthorized_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let repo = ApiTranscriptRepository::new(&server.uri());
        let err = repo
            .list_transcripts("key1", "proj1", &TranscriptFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_list_server_error_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let repo = ApiTranscriptRepository::new(&server.uri());
        let err = repo
            .list_transcripts("key1", "proj1", &TranscriptFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_list_requires_key_and_project_without_calling_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let repo = ApiTranscriptRepository::new(&server.uri());
        let err = repo
            .list_transcripts("", "proj1", &TranscriptFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        let err = repo
            .list_transcripts("key1", " ", &TranscriptFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_fetch_dialog_soft_fails_on_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transcripts/proj1/s1"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let repo = ApiTranscriptRepository::new(&server.uri());
        let turns = repo.fetch_dialog("proj1", "s1", "key1").await.unwrap();
        assert!(turns.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_dialog_soft_fails_on_unparseable_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transcripts/proj1/s1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let repo = ApiTranscriptRepository::new(&server.uri());
        let turns = repo.fetch_dialog("proj1", "s1", "key1").await.unwrap();
        assert!(turns.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_dialog_hard_fails_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transcripts/proj1/s1"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let repo = ApiTranscriptRepository::new(&server.uri());
        let err = repo.fetch_dialog("proj1", "s1", "key1").await.unwrap_err();
        assert!(matches!(err, ServiceError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_fetch_dialog_returns_turns_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transcripts/proj1/s1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"turnID": "a", "type": "launch", "startTime": "2024-01-01T00:00:00Z", "format": "launch", "payload": {}},
                {"turnID": "b", "type": "end", "startTime": "2024-01-01T00:00:01Z", "format": "", "payload": {}}
            ])))
            .mount(&server)
            .await;

        let repo = ApiTranscriptRepository::new(&server.uri());
        let turns = repo.fetch_dialog("proj1", "s1", "key1").await.unwrap();
        let ids: Vec<&str> = turns.iter().map(|t| t.turn_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_fetch_dialog_keeps_turns_with_null_attributes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transcripts/proj1/s1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"turnID": "a", "type": "launch", "startTime": "2024-01-01T00:00:00Z", "format": "launch", "payload": {}},
                {"turnID": 7, "type": "end", "startTime": "2024-01-01T00:00:01Z", "format": null, "payload": {}},
                "not a turn"
            ])))
            .mount(&server)
            .await;

        let repo = ApiTranscriptRepository::new(&server.uri());
        let turns = repo.fetch_dialog("proj1", "s1", "key1").await.unwrap();
        let ids: Vec<&str> = turns.iter().map(|t| t.turn_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "7"]);
        assert_eq!(turns[1].format, "");
    }

    #[tokio::test]
    async fn test_fetch_dialog_encodes_session_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transcripts/proj1/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"turnID": "WRONG", "type": "end", "startTime": "", "format": "", "payload": {}}
            ])))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/transcripts/proj%201/user%2342%2F%3Fx"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"turnID": "right", "type": "end", "startTime": "", "format": "", "payload": {}}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let repo = ApiTranscriptRepository::new(&server.uri());
        let turns = repo.fetch_dialog("proj 1", "user#42/?x", "key1").await.unwrap();
        let ids: Vec<&str> = turns.iter().map(|t| t.turn_id.as_str()).collect();
        assert_eq!(ids, vec!["right"]);
    }

    #[tokio::test]
    async fn test_list_encodes_project_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transcripts/a%2Fb"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let repo = ApiTranscriptRepository::new(&server.uri());
        let sessions = repo
            .list_transcripts("key1", "a/b", &TranscriptFilter::default())
            .await
            .unwrap();
        assert!(sessions.is_empty());
    }
}
