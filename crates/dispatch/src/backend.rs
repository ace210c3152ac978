use std::time::Duration;

use {
    async_trait::async_trait,
    charla_common::Credentials,
    tracing::{debug, warn},
};

/// The backend's literal reply when it could not make sense of the question.
const NOT_UNDERSTOOD_SENTINEL: &str = "failed";

/// Per-call deadline for the downstream query. No retry: a timed-out query
/// degrades to "nothing to send".
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a downstream query, already folded into reply semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// A normal answer to relay verbatim.
    Text(String),
    /// The distinguished not-understood sentinel; maps to a fixed apology.
    NotUnderstood,
    /// Nothing to send (empty answer, transport failure, or timeout).
    Empty,
}

/// Downstream conversational-AI endpoint.
#[async_trait]
pub trait AnswerBackend: Send + Sync {
    /// Ask the backend one coalesced question. `conversation_id` scopes the
    /// backend-side chat memory. Failures are folded into [`Answer`]; this
    /// call never blocks the caller beyond its own deadline.
    async fn query(
        &self,
        question: &str,
        conversation_id: &str,
        credentials: &Credentials,
    ) -> Answer;
}

/// HTTP prediction-endpoint backend.
///
/// POSTs `{question, overrideConfig: {sessionId}}` to the tenant's endpoint
/// URL with bearer auth and reads either `{"text": ...}` or a plain-text
/// body.
pub struct HttpAnswerBackend {
    http: reqwest::Client,
}

impl HttpAnswerBackend {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpAnswerBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnswerBackend for HttpAnswerBackend {
    async fn query(
        &self,
        question: &str,
        conversation_id: &str,
        credentials: &Credentials,
    ) -> Answer {
        let body = serde_json::json!({
            "question": question,
            "overrideConfig": { "sessionId": conversation_id },
        });

        let response = self
            .http
            .post(&credentials.endpoint)
            .bearer_auth(&credentials.key)
            .timeout(QUERY_TIMEOUT)
            .json(&body)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(conversation_id, error = %e, "downstream query failed");
                return Answer::Empty;
            },
        };

        if !response.status().is_success() {
            warn!(
                conversation_id,
                status = %response.status(),
                "downstream query rejected"
            );
            return Answer::NotUnderstood;
        }

        let raw = match response.text().await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(conversation_id, error = %e, "failed to read downstream answer");
                return Answer::Empty;
            },
        };

        // Prediction endpoints answer `{"text": ...}`; tolerate a bare
        // string body as well.
        let text = match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(value) => value
                .get("text")
                .and_then(|t| t.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| value.as_str().unwrap_or(&raw).to_string()),
            Err(_) => raw,
        };

        debug!(conversation_id, answer_len = text.len(), "downstream answered");
        match text.as_str() {
            "" => Answer::Empty,
            NOT_UNDERSTOOD_SENTINEL => Answer::NotUnderstood,
            _ => Answer::Text(text),
        }
    }
}
