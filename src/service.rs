//! Reasoning-service boundary
//!
//! The pipeline treats the generative reasoning service as an opaque
//! text-in/text-or-JSON-out collaborator behind the [`ReasoningService`]
//! trait. Callers construct a concrete client themselves and pass the handle
//! down; nothing in this crate holds service state at module level.
//!
//! [`GeminiClient`] is the production implementation, speaking the
//! `generateContent` API over blocking HTTP (the pipeline is strictly
//! sequential, one request in flight at a time). Failures are classified
//! into typed [`ServiceError`] variants so callers can tell retryable
//! service trouble from permanent validation failures.

use crate::error::ServiceError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Default endpoint for the hosted reasoning service
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model name
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Expected shape of the service response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Free-form text
    Text,
    /// A JSON-shaped payload (`application/json` mime type requested)
    Json,
}

/// One generation request: role instructions plus a task prompt
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Role/system instructions for the service
    pub system_instruction: String,
    /// Task prompt
    pub prompt: String,
    /// Expected response shape
    pub format: ResponseFormat,
    /// Sampling temperature override
    pub temperature: Option<f64>,
}

impl GenerationRequest {
    /// Free-text request
    pub fn text(system_instruction: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            prompt: prompt.into(),
            format: ResponseFormat::Text,
            temperature: None,
        }
    }

    /// JSON-output request
    pub fn json(system_instruction: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            prompt: prompt.into(),
            format: ResponseFormat::Json,
            temperature: None,
        }
    }
}

/// Opaque generative reasoning collaborator
pub trait ReasoningService {
    /// Generate a completion for the request. The returned string is the
    /// raw response text; JSON-format callers parse it themselves.
    fn generate(&self, request: &GenerationRequest) -> Result<String, ServiceError>;
}

/// Configuration for the hosted reasoning-service client
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// API key
    pub api_key: String,
    /// Model name (e.g. "gemini-2.5-flash")
    pub model: String,
    /// Base URL for the API
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl ServiceConfig {
    /// Config from the `GEMINI_API_KEY` environment variable and defaults
    pub fn from_env() -> Result<Self, ServiceError> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| {
            ServiceError::AuthenticationFailed(format!("{} is not set", API_KEY_ENV))
        })?;
        Ok(Self::new(api_key))
    }

    /// Config with defaults for everything but the key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types for the generateContent API
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct WirePart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct WireContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<WirePart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    system_instruction: WireContent<'a>,
    contents: Vec<WireContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: WireGenerationConfig<'a>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
}

#[derive(Debug, Deserialize)]
struct WireCandidate {
    content: Option<WireCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct WireCandidateContent {
    #[serde(default)]
    parts: Vec<WireResponsePart>,
}

#[derive(Debug, Deserialize)]
struct WireResponsePart {
    #[serde(default)]
    text: String,
}

/// Blocking HTTP client for the hosted reasoning service
pub struct GeminiClient {
    http: reqwest::blocking::Client,
    config: ServiceConfig,
}

impl GeminiClient {
    /// Build a client, enforcing the configured request timeout
    pub fn new(config: ServiceConfig) -> Result<Self, ServiceError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url, self.config.model
        )
    }
}

impl ReasoningService for GeminiClient {
    fn generate(&self, request: &GenerationRequest) -> Result<String, ServiceError> {
        let mime = match request.format {
            ResponseFormat::Json => Some("application/json"),
            ResponseFormat::Text => None,
        };
        let body = WireRequest {
            system_instruction: WireContent {
                role: None,
                parts: vec![WirePart {
                    text: &request.system_instruction,
                }],
            },
            contents: vec![WireContent {
                role: Some("user"),
                parts: vec![WirePart {
                    text: &request.prompt,
                }],
            }],
            generation_config: WireGenerationConfig {
                response_mime_type: mime,
                temperature: request.temperature,
            },
        };

        debug!(model = %self.config.model, format = ?request.format, "reasoning request");

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::Timeout
                } else {
                    ServiceError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            warn!(status = status.as_u16(), "reasoning service error");
            return Err(classify_status(status.as_u16(), body));
        }

        let wire: WireResponse = response
            .json()
            .map_err(|e| ServiceError::MalformedResponse(e.to_string()))?;

        let text: String = wire
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ServiceError::EmptyResponse);
        }
        Ok(text)
    }
}

/// Map an HTTP error status to a typed service error
fn classify_status(status: u16, body: String) -> ServiceError {
    match status {
        400 => ServiceError::InvalidRequest(body),
        401 | 403 => ServiceError::AuthenticationFailed(body),
        429 => ServiceError::RateLimited,
        s => ServiceError::Server { status: s, body },
    }
}

/// Encode a request payload fragment as pretty JSON
pub(crate) fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, ServiceError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ServiceError::InvalidRequest(format!("failed to encode payload: {}", e)))
}

/// Strip markdown code fences some models wrap around JSON payloads
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the fence line.
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\r', '\n']);
    rest.strip_suffix("```").map_or(rest, str::trim).trim()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-process reasoning service for protocol tests

    use super::{GenerationRequest, ReasoningService};
    use crate::error::ServiceError;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    /// Returns pre-scripted replies in order and counts every call
    pub struct ScriptedService {
        replies: RefCell<VecDeque<Result<String, ServiceError>>>,
        calls: Cell<usize>,
        prompts: RefCell<Vec<String>>,
    }

    impl ScriptedService {
        pub fn new(replies: Vec<Result<String, ServiceError>>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                calls: Cell::new(0),
                prompts: RefCell::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.get()
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.borrow().clone()
        }
    }

    impl ReasoningService for ScriptedService {
        fn generate(&self, request: &GenerationRequest) -> Result<String, ServiceError> {
            self.calls.set(self.calls.get() + 1);
            self.prompts.borrow_mut().push(request.prompt.clone());
            self.replies
                .borrow_mut()
                .pop_front()
                .expect("unexpected reasoning-service call")
        }
    }
}
