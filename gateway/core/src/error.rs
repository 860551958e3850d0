//! Error Types
//!
//! Errors raised while talking to the agent and decoding its reply, plus the
//! [`ChatError`] that surfaces see. Rate-limit and configuration errors live
//! next to their modules.

use thiserror::Error;

use crate::rate_limit::RateLimitError;

/// Errors raised while decoding an agent event-stream
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The stream carried no decodable text at all
    #[error("agent response contained no decodable segments")]
    EmptyResponse,

    /// The answer payload could not be located or decoded
    #[error("malformed agent payload: {0}")]
    MalformedPayload(String),
}

impl DecodeError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPayload(reason.into())
    }
}

/// Errors raised by an agent client before any bytes reach the decoder
#[derive(Debug, Error)]
pub enum TransportError {
    /// The agent endpoint answered with a non-200 status
    #[error("agent returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, if it could be read
        body: String,
    },

    /// The request could not be sent or the body could not be read
    #[error("agent request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// No signing credentials were available
    #[error("missing AWS credentials: {0}")]
    Credentials(String),

    /// The configured endpoint could not be turned into a request URL
    #[error("invalid agent endpoint: {0}")]
    InvalidEndpoint(String),

    /// The request body could not be serialized
    #[error("failed to encode agent request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors returned by [`crate::ChatService::ask`]
#[derive(Debug, Error)]
pub enum ChatError {
    /// The prompt was missing or blank
    #[error("Prompt is required")]
    EmptyPrompt,

    /// The prompt exceeded the configured length
    #[error("Prompt exceeds {max} characters")]
    PromptTooLong {
        /// Configured maximum length in characters
        max: usize,
    },

    /// The caller exceeded its request allowance
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    /// The agent could not be reached or refused the request
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The agent's reply could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl ChatError {
    /// HTTP status code surfaces should report for this error
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::EmptyPrompt | Self::PromptTooLong { .. } => 400,
            Self::RateLimited(_) => 429,
            Self::Transport(_) | Self::Decode(_) => 500,
        }
    }

    /// Whether the error was caused by the caller rather than the agent
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ChatError::EmptyPrompt.status_code(), 400);
        assert_eq!(ChatError::PromptTooLong { max: 10 }.status_code(), 400);
        assert_eq!(
            ChatError::RateLimited(RateLimitError::RateLimitExceeded {
                client: "10.0.0.1".to_string(),
                limit: 2,
                window_secs: 60,
                retry_after_secs: 30,
            })
            .status_code(),
            429
        );
        assert_eq!(
            ChatError::Decode(DecodeError::EmptyResponse).status_code(),
            500
        );
        assert_eq!(
            ChatError::Transport(TransportError::Status {
                status: 403,
                body: String::new(),
            })
            .status_code(),
            500
        );
    }

    #[test]
    fn test_client_error_classification() {
        assert!(ChatError::EmptyPrompt.is_client_error());
        assert!(!ChatError::Decode(DecodeError::malformed("x")).is_client_error());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(ChatError::EmptyPrompt.to_string(), "Prompt is required");
        assert_eq!(
            DecodeError::malformed("no text field").to_string(),
            "malformed agent payload: no text field"
        );
    }
}
