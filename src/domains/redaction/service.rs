use async_trait::async_trait;
use log::warn;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Best-effort PII scrubbing of user-authored text.
///
/// Implementations never fail: on any problem they hand back the input.
#[async_trait]
pub trait Redactor: Send + Sync {
    async fn process_text(&self, text: &str) -> String;
}

/// Redactor used when redaction is disabled for the job
pub struct PassthroughRedactor;

#[async_trait]
impl Redactor for PassthroughRedactor {
    async fn process_text(&self, text: &str) -> String {
        text.to_string()
    }
}

#[derive(Serialize)]
struct RedactRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct RedactResponse {
    redacted_text: String,
}

/// Redactor that posts text to an external scrub service
pub struct HttpRedactor {
    client: Client,
    url: String,
}

impl HttpRedactor {
    pub fn new(url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();

        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl Redactor for HttpRedactor {
    async fn process_text(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let response = match self
            .client
            .post(&self.url)
            .json(&RedactRequest { text })
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Redaction request failed, keeping original text: {}", e);
                return text.to_string();
            }
        };

        if !response.status().is_success() {
            warn!(
                "Redaction service returned {}, keeping original text",
                response.status()
            );
            return text.to_string();
        }

        match response.json::<RedactResponse>().await {
            Ok(body) => body.redacted_text,
            Err(e) => {
                warn!("Malformed redaction response, keeping original text: {}", e);
                text.to_string()
            }
        }
    }
}
