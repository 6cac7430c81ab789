//! Error taxonomy for the preference pipeline
//!
//! Four families with distinct blast radii: `DataError` aborts only the
//! current trial, `StorageError` is fatal to the triggering operation,
//! `ServiceError` is skippable during draft generation and fatal everywhere
//! else, and `StateError` reports precondition violations. A structurally
//! invalid Judge response surfaces as `PipelineError::Inference`.

use std::path::PathBuf;
use thiserror::Error;

/// Malformed or insufficient trial input. Aborts only the current trial;
/// the run proceeds to the next option.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("sample sequence too short: got {got}, need at least {min}")]
    TooFewSamples { got: usize, min: usize },

    #[error("samples carry no emotion probabilities")]
    MissingEmotions,

    #[error("no frame in the sequence carries pose landmarks")]
    NoPoseData,

    #[error("preference score {0} outside 1-5")]
    InvalidScore(u8),
}

/// Seed or guideline persistence failure. Fatal to the triggering operation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("corrupt document at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Reasoning-service failure, classified so callers can decide retry policy.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("rate limit or quota exceeded")]
    RateLimited,

    #[error("service error (HTTP {status}): {body}")]
    Server { status: u16, body: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("malformed service payload: {0}")]
    MalformedResponse(String),

    #[error("service returned no candidates")]
    EmptyResponse,
}

impl ServiceError {
    /// Whether the failure is transient and worth retrying.
    ///
    /// Validation failures (`InvalidRequest`, `AuthenticationFailed`,
    /// `MalformedResponse`) are permanent; the caller must not retry them.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Timeout | ServiceError::RateLimited | ServiceError::Server { .. } => true,
            ServiceError::Network(e) => e.is_timeout() || e.is_connect(),
            ServiceError::InvalidRequest(_)
            | ServiceError::AuthenticationFailed(_)
            | ServiceError::MalformedResponse(_)
            | ServiceError::EmptyResponse => false,
        }
    }
}

/// Precondition violation: the requested operation cannot run against the
/// current stored state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("no labeled seeds available for guideline synthesis")]
    InsufficientData,

    #[error("no active guideline; run synthesis first")]
    NoGuideline,

    #[error("no seeds stored for session {0}")]
    SessionNotFound(String),

    #[error("no seed stored for session {session_id}, option {option_id}")]
    SeedNotFound {
        session_id: String,
        option_id: String,
    },
}

/// Umbrella error for every pipeline operation
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    State(#[from] StateError),

    /// The Judge received a response that parsed or validated incorrectly:
    /// an invented option title, a recommendation outside the supplied set,
    /// or an unparsable payload.
    #[error("inference failed: {0}")]
    Inference(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ServiceError::RateLimited.is_retryable());
        assert!(ServiceError::Timeout.is_retryable());
        assert!(ServiceError::Server {
            status: 503,
            body: "overloaded".to_string()
        }
        .is_retryable());

        assert!(!ServiceError::InvalidRequest("bad prompt".to_string()).is_retryable());
        assert!(!ServiceError::AuthenticationFailed("bad key".to_string()).is_retryable());
        assert!(!ServiceError::MalformedResponse("not json".to_string()).is_retryable());
        assert!(!ServiceError::EmptyResponse.is_retryable());
    }

    #[test]
    fn test_state_error_display_names_the_key() {
        let err = StateError::SeedNotFound {
            session_id: "abc123".to_string(),
            option_id: "opt2".to_string(),
        };
        assert!(err.to_string().contains("abc123"));
        assert!(err.to_string().contains("opt2"));
    }

    #[test]
    fn test_pipeline_error_wraps_taxonomy() {
        let err: PipelineError = StateError::NoGuideline.into();
        assert!(matches!(err, PipelineError::State(StateError::NoGuideline)));

        let err: PipelineError = DataError::TooFewSamples { got: 3, min: 5 }.into();
        assert!(err.to_string().contains("got 3"));
    }
}
