//! Generation gateway — bounded, observable wrapper around the
//! language-generation backend.
//!
//! One gateway call maps to one backend call: a fixed timeout is applied,
//! latency and token usage are reported, and failures are converted into an
//! empty-text outcome so the caller can take the fallback path. The gateway
//! never retries; a single failed call yields a single fallback.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::agents::AgentProfile;
use crate::condition::AgentSlot;
use crate::prompt::AgentInstructions;

/// Error type for backend calls.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("http transport: {0}")]
    Transport(String),

    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed backend response: {0}")]
    Malformed(String),

    #[error("scripted failure: {0}")]
    Scripted(String),
}

/// One text-completion request crossing the backend boundary.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Successful backend response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub tokens_in: Option<u32>,
    pub tokens_out: Option<u32>,
}

/// The language-generation backend, treated as an opaque text-in/text-out
/// call. Implementations must be cancellation-safe: the gateway drops the
/// in-flight future on timeout.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, BackendError>;
}

/// Outcome of one gateway call. Failures are folded into an empty text so
/// the orchestrator has a single fallback trigger to check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub text: String,
    pub tokens_in: Option<u32>,
    pub tokens_out: Option<u32>,
    pub latency_ms: u64,
    pub timed_out: bool,
}

impl GenerationOutcome {
    fn empty(latency_ms: u64, timed_out: bool) -> Self {
        Self {
            text: String::new(),
            tokens_in: None,
            tokens_out: None,
            latency_ms,
            timed_out,
        }
    }

    /// Whether the caller should substitute the fallback response.
    pub fn needs_fallback(&self) -> bool {
        self.timed_out || self.text.trim().is_empty()
    }
}

/// Bounded wrapper around one backend.
pub struct GenerationGateway {
    backend: Arc<dyn GenerationBackend>,
    model: String,
    timeout: Duration,
    max_tokens: u32,
}

impl GenerationGateway {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        model: impl Into<String>,
        timeout: Duration,
        max_tokens: u32,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            timeout,
            max_tokens,
        }
    }

    /// Execute one generation call for an agent slot.
    ///
    /// The sampling temperature comes from the slot's fixed profile, not
    /// from the request. On timeout the in-flight call is cancelled (the
    /// future is dropped) and an empty outcome with `timed_out=true` is
    /// returned; any other backend error is logged and likewise yields an
    /// empty outcome.
    pub async fn generate(
        &self,
        slot: AgentSlot,
        instructions: &AgentInstructions,
    ) -> GenerationOutcome {
        let profile = AgentProfile::for_slot(slot);
        let request = CompletionRequest {
            system: instructions.system.clone(),
            user: instructions.user.clone(),
            model: self.model.clone(),
            temperature: profile.temperature,
            max_tokens: self.max_tokens,
        };

        let started = Instant::now();
        match tokio::time::timeout(self.timeout, self.backend.complete(&request)).await {
            Ok(Ok(response)) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                debug!(
                    slot = %slot,
                    latency_ms,
                    tokens_out = ?response.tokens_out,
                    "generation complete"
                );
                GenerationOutcome {
                    text: response.text,
                    tokens_in: response.tokens_in,
                    tokens_out: response.tokens_out,
                    latency_ms,
                    timed_out: false,
                }
            }
            Ok(Err(err)) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                warn!(slot = %slot, error = %err, "generation backend failed");
                GenerationOutcome::empty(latency_ms, false)
            }
            Err(_) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                warn!(
                    slot = %slot,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "generation timed out"
                );
                GenerationOutcome::empty(latency_ms, true)
            }
        }
    }
}

/// HTTP backend speaking the chat-completions protocol.
pub struct HttpBackend {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpBackend {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, BackendError> {
        #[derive(Serialize)]
        struct ChatMessage<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<ChatMessage<'a>>,
            max_tokens: u32,
            temperature: f32,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
            usage: Option<Usage>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ResponseMessage,
        }

        #[derive(Deserialize)]
        struct ResponseMessage {
            content: Option<String>,
        }

        #[derive(Deserialize)]
        struct Usage {
            prompt_tokens: Option<u32>,
            completion_tokens: Option<u32>,
        }

        let body = ChatRequest {
            model: &request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;

        let choice = chat
            .choices
            .first()
            .ok_or_else(|| BackendError::Malformed("no choices in response".to_string()))?;

        let (tokens_in, tokens_out) = match chat.usage {
            Some(ref usage) => (usage.prompt_tokens, usage.completion_tokens),
            None => (None, None),
        };

        Ok(CompletionResponse {
            text: choice.message.content.clone().unwrap_or_default(),
            tokens_in,
            tokens_out,
        })
    }
}

/// Backend used in test mode — returns a fixed line without any network call.
pub struct StaticBackend {
    text: String,
}

impl StaticBackend {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl GenerationBackend for StaticBackend {
    async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse, BackendError> {
        Ok(CompletionResponse {
            text: self.text.clone(),
            tokens_in: None,
            tokens_out: None,
        })
    }
}

/// Reply produced by a [`ScriptedBackend`] for one request.
pub enum ScriptedReply {
    /// Respond immediately with text.
    Text(String),
    /// Respond immediately with text and usage counters.
    TextWithUsage {
        text: String,
        tokens_in: u32,
        tokens_out: u32,
    },
    /// Fail with a backend error.
    Fail(String),
    /// Respond with text, but only after a delay (for timeout tests).
    Stall { delay: Duration, text: String },
}

type Script = dyn Fn(&CompletionRequest) -> ScriptedReply + Send + Sync;

/// Deterministic backend double driven by a script closure.
///
/// Counts calls so tests can assert that replayed cycles never reach the
/// backend.
pub struct ScriptedBackend {
    script: Box<Script>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(
        script: impl Fn(&CompletionRequest) -> ScriptedReply + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    /// A backend that answers every request with the same text.
    pub fn replying(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| ScriptedReply::Text(text.clone()))
    }

    /// Number of completion calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match (self.script)(request) {
            ScriptedReply::Text(text) => Ok(CompletionResponse {
                text,
                tokens_in: None,
                tokens_out: None,
            }),
            ScriptedReply::TextWithUsage {
                text,
                tokens_in,
                tokens_out,
            } => Ok(CompletionResponse {
                text,
                tokens_in: Some(tokens_in),
                tokens_out: Some(tokens_out),
            }),
            ScriptedReply::Fail(reason) => Err(BackendError::Scripted(reason)),
            ScriptedReply::Stall { delay, text } => {
                tokio::time::sleep(delay).await;
                Ok(CompletionResponse {
                    text,
                    tokens_in: None,
                    tokens_out: None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instructions() -> AgentInstructions {
        AgentInstructions {
            system: "system text".to_string(),
            user: "user text".to_string(),
        }
    }

    fn gateway(backend: Arc<dyn GenerationBackend>) -> GenerationGateway {
        GenerationGateway::new(backend, "test-model", Duration::from_secs(12), 400)
    }

    #[tokio::test]
    async fn test_success_carries_text_and_usage() {
        let backend = Arc::new(ScriptedBackend::new(|_| ScriptedReply::TextWithUsage {
            text: "generated reply".to_string(),
            tokens_in: 120,
            tokens_out: 45,
        }));
        let outcome = gateway(backend).generate(AgentSlot::Agent1, &instructions()).await;

        assert_eq!(outcome.text, "generated reply");
        assert_eq!(outcome.tokens_in, Some(120));
        assert_eq!(outcome.tokens_out, Some(45));
        assert!(!outcome.timed_out);
        assert!(!outcome.needs_fallback());
    }

    #[tokio::test]
    async fn test_backend_error_becomes_empty_outcome() {
        let backend = Arc::new(ScriptedBackend::new(|_| {
            ScriptedReply::Fail("connection refused".to_string())
        }));
        let outcome = gateway(backend).generate(AgentSlot::Agent2, &instructions()).await;

        assert!(outcome.text.is_empty());
        assert!(!outcome.timed_out);
        assert!(outcome.needs_fallback());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_times_out() {
        let backend = Arc::new(ScriptedBackend::new(|_| ScriptedReply::Stall {
            delay: Duration::from_secs(60),
            text: "too late".to_string(),
        }));
        let outcome = gateway(backend).generate(AgentSlot::Agent3, &instructions()).await;

        assert!(outcome.timed_out);
        assert!(outcome.text.is_empty());
        assert!(outcome.needs_fallback());
    }

    #[tokio::test]
    async fn test_temperature_comes_from_the_slot_profile() {
        let backend = Arc::new(ScriptedBackend::new(|req| {
            ScriptedReply::Text(format!("temp={}", req.temperature))
        }));
        let gw = gateway(backend);

        for slot in AgentSlot::all() {
            let outcome = gw.generate(*slot, &instructions()).await;
            let expected = AgentProfile::for_slot(*slot).temperature;
            assert_eq!(outcome.text, format!("temp={expected}"));
        }
    }

    #[tokio::test]
    async fn test_blank_text_is_treated_as_failure() {
        let backend = Arc::new(ScriptedBackend::replying("   "));
        let outcome = gateway(backend).generate(AgentSlot::Agent1, &instructions()).await;
        assert!(outcome.needs_fallback());
    }

    #[tokio::test]
    async fn test_call_counter() {
        let backend = Arc::new(ScriptedBackend::replying("ok"));
        let gw = gateway(backend.clone());
        assert_eq!(backend.calls(), 0);
        gw.generate(AgentSlot::Agent1, &instructions()).await;
        gw.generate(AgentSlot::Agent2, &instructions()).await;
        assert_eq!(backend.calls(), 2);
    }
}
