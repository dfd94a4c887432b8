use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

// ── Request / Error ──

/// One system + user exchange sent to the text-generation backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.1,
            max_tokens: 512,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Transport(String),
    #[error("backend returned HTTP {0}")]
    Status(u16),
    #[error("malformed backend response: {0}")]
    Decode(String),
    #[error("backend returned no choices")]
    Empty,
}

/// A text-generation service. Implementations must be cheap to share.
#[async_trait::async_trait]
pub trait TextBackend: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<String, BackendError>;
}

// ── HTTP backend ──

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireContent,
}

#[derive(Deserialize)]
struct WireContent {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

/// OpenAI-compatible chat-completions client (`<base>/v1/chat/completions`).
///
/// ureq is blocking, so calls run on tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    model: String,
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout,
        }
    }

    pub fn from_config(cfg: &shipyard_core::ShipyardConfig) -> Self {
        Self::new(&cfg.backend_url, &cfg.model, cfg.backend_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn agent(&self) -> ureq::Agent {
        ureq::Agent::config_builder()
            .timeout_global(Some(self.timeout))
            .build()
            .new_agent()
    }

    fn complete_blocking(&self, request: &ChatRequest) -> Result<String, BackendError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = WireRequest {
            model: &self.model,
            messages: [
                WireMessage {
                    role: "system",
                    content: &request.system,
                },
                WireMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
        };
        let payload =
            serde_json::to_string(&body).map_err(|e| BackendError::Decode(e.to_string()))?;
        tracing::debug!(%url, model = %self.model, "backend request");

        let mut response = self
            .agent()
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .send(payload)
            .map_err(map_ureq_error)?;
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        tracing::debug!(raw = %text, "backend response");

        let decoded: WireResponse =
            serde_json::from_str(&text).map_err(|e| BackendError::Decode(e.to_string()))?;
        decoded
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(BackendError::Empty)
    }

    fn models_blocking(&self) -> Result<Vec<String>, BackendError> {
        let url = format!("{}/v1/models", self.base_url);
        let mut response = self.agent().get(&url).call().map_err(map_ureq_error)?;
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let list: ModelList = serde_json::from_str(&text).unwrap_or(ModelList { data: vec![] });
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }

    /// Probe `<base>/v1/models`. Returns the advertised model ids, possibly empty.
    pub async fn check_connection(&self) -> Result<Vec<String>, BackendError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.models_blocking())
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?
    }
}

fn map_ureq_error(err: ureq::Error) -> BackendError {
    match err {
        ureq::Error::StatusCode(code) => BackendError::Status(code),
        other => BackendError::Transport(other.to_string()),
    }
}

#[async_trait::async_trait]
impl TextBackend for HttpBackend {
    async fn complete(&self, request: ChatRequest) -> Result<String, BackendError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.complete_blocking(&request))
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?
    }
}

// ── Scripted backend ──

/// Replays canned replies in order and records every request (for testing).
/// Once the script runs out, every call fails with a transport error.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, BackendError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String, BackendError>>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A backend that is always down.
    pub fn offline() -> Self {
        Self::new([])
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl TextBackend for ScriptedBackend {
    async fn complete(&self, request: ChatRequest) -> Result<String, BackendError> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(request);
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| Err(BackendError::Transport("connection refused".into())))
    }
}
