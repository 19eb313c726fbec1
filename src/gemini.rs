use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ModelConfig;
use crate::conversation::{ContentPart, Role, Turn};

const FALLBACK_API_KEY_ENV: &str = "API_KEY";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no API key found in ${0} or ${1}")]
    MissingApiKey(String, &'static str),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("{message} (HTTP {status})")]
    Api { status: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    #[serde(skip)]
    pub model: String,
    pub contents: Vec<Content>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Anything that can answer a generateContent request with plain text.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn generate_content(&self, request: GenerateRequest) -> anyhow::Result<String>;
}

pub struct GeminiClient {
    base_url: String,
    api_key_env: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn with_config(config: &ModelConfig) -> Self {
        GeminiClient {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key_env: config.api_key_env.clone(),
            client: reqwest::Client::new(),
        }
    }

    // Looked up per request so a key exported after launch is picked up.
    fn api_key(&self) -> Result<String, ClientError> {
        let lookup = |name: &str| env::var(name).ok();
        resolve_api_key(lookup(&self.api_key_env), || lookup(FALLBACK_API_KEY_ENV))
            .ok_or_else(|| ClientError::MissingApiKey(self.api_key_env.clone(), FALLBACK_API_KEY_ENV))
    }

    pub async fn send(&self, request: &GenerateRequest) -> Result<String, ClientError> {
        let key = self.api_key()?;
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, request.model);

        debug!(model = %request.model, turns = request.contents.len(), "sending generateContent request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Malformed(e.to_string()))?;
        extract_text(body)
    }
}

#[async_trait]
impl ModelBackend for GeminiClient {
    async fn generate_content(&self, request: GenerateRequest) -> anyhow::Result<String> {
        Ok(self.send(&request).await?)
    }
}

/// A blank primary key counts as unset, so the fallback still applies.
fn resolve_api_key(primary: Option<String>, fallback: impl FnOnce() -> Option<String>) -> Option<String> {
    let usable = |key: &String| !key.trim().is_empty();
    primary.filter(usable).or_else(|| fallback().filter(usable))
}

fn api_error(status: u16, body: &str) -> ClientError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "request failed".to_string()
            } else {
                trimmed.to_string()
            }
        });
    ClientError::Api { status, message }
}

fn extract_text(response: GenerateResponse) -> Result<String, ClientError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ClientError::Malformed(format!("prompt blocked ({reason})")));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ClientError::Malformed("no candidates".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
        return Err(ClientError::Malformed(format!("no text in reply (finish reason {reason})")));
    }
    Ok(text)
}

/// Outcome of one round trip. Failures are data, not errors, so the
/// transcript always gets a model turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Failed(String),
}

impl Reply {
    pub fn text(&self) -> String {
        match self {
            Reply::Text(text) => text.clone(),
            Reply::Failed(message) => format!("Error: {}", message),
        }
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            Reply::Failed(message) => Some(message.as_str()),
            Reply::Text(_) => None,
        }
    }
}

#[derive(Clone)]
pub struct Responder {
    model: String,
    backend: Arc<dyn ModelBackend>,
}

impl Responder {
    pub fn new(model: impl Into<String>, backend: Arc<dyn ModelBackend>) -> Self {
        Responder {
            model: model.into(),
            backend,
        }
    }

    pub fn get_model(&self) -> &str {
        &self.model
    }

    pub fn build_request(&self, history: &[Turn], new_parts: &[ContentPart]) -> GenerateRequest {
        let mut contents: Vec<Content> = history
            .iter()
            .map(|turn| Content {
                role: turn.role(),
                parts: turn.parts().to_vec(),
            })
            .collect();
        contents.push(Content {
            role: Role::User,
            parts: new_parts.to_vec(),
        });

        GenerateRequest {
            model: self.model.clone(),
            contents,
        }
    }

    pub async fn generate(&self, history: Vec<Turn>, new_parts: Vec<ContentPart>) -> Reply {
        let request = self.build_request(&history, &new_parts);
        match self.backend.generate_content(request).await {
            Ok(text) => Reply::Text(text),
            Err(e) => {
                warn!("Error generating response from Gemini: {:#}", e);
                Reply::Failed(format!("{:#}", e))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::conversation::Conversation;
    use serde_json::json;
    use std::sync::Mutex;

    /// Backend that pops scripted outcomes and records the last request.
    pub(crate) struct ScriptedBackend {
        replies: Mutex<Vec<Result<String, String>>>,
        pub last_request: Mutex<Option<GenerateRequest>>,
    }

    impl ScriptedBackend {
        pub(crate) fn new(replies: Vec<Result<String, String>>) -> Self {
            ScriptedBackend {
                replies: Mutex::new(replies),
                last_request: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        async fn generate_content(&self, request: GenerateRequest) -> anyhow::Result<String> {
            *self.last_request.lock().unwrap() = Some(request);
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                anyhow::bail!("no scripted reply");
            }
            replies.remove(0).map_err(|e| anyhow::anyhow!(e))
        }
    }

    #[tokio::test]
    async fn test_first_turn_request_shape() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok("hi there".to_string())]));
        let responder = Responder::new("gemini-2.5-flash", backend.clone());

        let reply = responder.generate(Vec::new(), vec![ContentPart::text("hello")]).await;
        assert_eq!(reply, Reply::Text("hi there".to_string()));

        let request = backend.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.model, "gemini-2.5-flash");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "contents": [ { "role": "user", "parts": [ { "text": "hello" } ] } ] })
        );
    }

    #[tokio::test]
    async fn test_history_precedes_new_parts() {
        let mut conversation = Conversation::default();
        conversation.append(Role::User, vec![ContentPart::text("one")]);
        conversation.append(Role::Model, vec![ContentPart::text("two")]);

        let backend = Arc::new(ScriptedBackend::new(vec![Ok("four".to_string())]));
        let responder = Responder::new("m", backend.clone());
        responder
            .generate(
                conversation.turns().to_vec(),
                vec![ContentPart::inline("image/png", "AAAA"), ContentPart::text("three")],
            )
            .await;

        let request = backend.last_request.lock().unwrap().clone().unwrap();
        let roles: Vec<Role> = request.contents.iter().map(|c| c.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Model, Role::User]);
        assert_eq!(request.contents[2].parts.len(), 2);
        assert!(matches!(request.contents[2].parts[0], ContentPart::InlineData(_)));
    }

    #[tokio::test]
    async fn test_backend_failure_becomes_error_text() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err("quota exceeded".to_string())]));
        let responder = Responder::new("m", backend);

        let reply = responder.generate(Vec::new(), vec![ContentPart::text("hi")]).await;
        assert_eq!(reply.failure(), Some("quota exceeded"));
        assert_eq!(reply.text(), "Error: quota exceeded");
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let body: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [ { "text": "Hello, " }, { "text": "world" } ] },
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(extract_text(body).unwrap(), "Hello, world");
    }

    #[test]
    fn test_extract_text_blocked_prompt() {
        let body: GenerateResponse = serde_json::from_value(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();
        let err = extract_text(body).unwrap_err();
        assert_eq!(err.to_string(), "malformed response: prompt blocked (SAFETY)");
    }

    #[test]
    fn test_extract_text_without_text() {
        let body: GenerateResponse = serde_json::from_value(json!({
            "candidates": [ { "finishReason": "MAX_TOKENS" } ]
        }))
        .unwrap();
        assert!(matches!(extract_text(body), Err(ClientError::Malformed(_))));
        assert!(matches!(extract_text(GenerateResponse::default()), Err(ClientError::Malformed(_))));
    }

    #[test]
    fn test_api_error_message() {
        let body = r#"{"error":{"code":429,"message":"quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        let err = api_error(429, body);
        assert_eq!(err.to_string(), "quota exceeded (HTTP 429)");

        let err = api_error(502, "  ");
        assert_eq!(err.to_string(), "request failed (HTTP 502)");
    }

    #[test]
    fn test_blank_primary_key_falls_back() {
        let key = |value: &str| Some(value.to_string());
        assert_eq!(resolve_api_key(key("  "), || key("fallback")), key("fallback"));
        assert_eq!(resolve_api_key(None, || key("fallback")), key("fallback"));
        assert_eq!(resolve_api_key(key("primary"), || key("fallback")), key("primary"));
        assert_eq!(resolve_api_key(key(""), || key(" ")), None);
        assert_eq!(resolve_api_key(None, || None), None);
    }

    #[test]
    fn test_missing_api_key() {
        let client = GeminiClient::with_config(&ModelConfig {
            api_key_env: "PEXI_TEST_UNSET_KEY".to_string(),
            ..ModelConfig::default()
        });
        if env::var(FALLBACK_API_KEY_ENV).is_err() {
            assert!(matches!(client.api_key(), Err(ClientError::MissingApiKey(..))));
        }
    }
}
