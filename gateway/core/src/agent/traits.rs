//! Agent Client Traits
//!
//! Common interface for invoking a managed agent.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// One invocation of the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRequest {
    /// The user's question, sent as the agent's input text
    pub question: String,
    /// Session identifier the agent keys its conversation state on
    pub session_id: String,
    /// Ask the agent to close the session after answering
    pub end_session: bool,
}

impl AgentRequest {
    /// Create a request that keeps the session open
    pub fn new(question: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            session_id: session_id.into(),
            end_session: false,
        }
    }

    /// Set whether the agent should end the session
    #[must_use]
    pub fn with_end_session(mut self, end_session: bool) -> Self {
        self.end_session = end_session;
        self
    }
}

/// How the body was split when it was read
#[derive(Debug, Clone, PartialEq, Eq)]
enum Framing {
    /// Chunks exactly as the transport delivered them
    Chunks(Vec<Vec<u8>>),
    /// One byte per chunk
    Bytewise(Vec<u8>),
}

/// Raw response body, still event-stream framed
///
/// Bedrock bodies are replayed one byte per chunk. Binary frame headers then
/// fail UTF-8 decoding byte by byte and are skipped, while the ASCII JSON and
/// base64 payloads survive intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    framing: Framing,
    /// Content type reported by the agent, if any
    pub content_type: Option<String>,
}

impl RawResponse {
    /// Wrap chunks that should be decoded as delivered
    #[must_use]
    pub fn from_chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            framing: Framing::Chunks(chunks),
            content_type: None,
        }
    }

    /// Wrap a full body that should be decoded one byte at a time
    #[must_use]
    pub fn bytewise(body: Vec<u8>) -> Self {
        Self {
            framing: Framing::Bytewise(body),
            content_type: None,
        }
    }

    /// Attach the reported content type
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Chunks in arrival order, ready for [`crate::decode`]
    #[must_use]
    pub fn chunks(&self) -> Box<dyn Iterator<Item = &[u8]> + '_> {
        match &self.framing {
            Framing::Chunks(chunks) => Box::new(chunks.iter().map(Vec::as_slice)),
            Framing::Bytewise(body) => Box::new(body.chunks(1)),
        }
    }

    /// Total body length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.framing {
            Framing::Chunks(chunks) => chunks.iter().map(Vec::len).sum(),
            Framing::Bytewise(body) => body.len(),
        }
    }

    /// Whether the body is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Managed agent client
///
/// Implementations send one question and return the undecoded body. A
/// non-success status must be reported as [`TransportError::Status`] and
/// never handed to the decoder.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Client name for logs
    fn name(&self) -> &str;

    /// Invoke the agent and collect the raw response body
    async fn invoke(&self, request: &AgentRequest) -> Result<RawResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_request_builder() {
        let req = AgentRequest::new("Hello", "s-1").with_end_session(true);
        assert_eq!(req.question, "Hello");
        assert_eq!(req.session_id, "s-1");
        assert!(req.end_session);
    }

    #[test]
    fn test_bytewise_chunks_are_single_bytes() {
        let raw = RawResponse::bytewise(b"abc".to_vec());
        let chunks: Vec<&[u8]> = raw.chunks().collect();
        assert_eq!(chunks, vec![&b"a"[..], &b"b"[..], &b"c"[..]]);
        assert_eq!(raw.len(), 3);
    }

    #[test]
    fn test_chunked_body_keeps_boundaries() {
        let raw = RawResponse::from_chunks(vec![b"ab".to_vec(), b"c".to_vec()])
            .with_content_type("application/vnd.amazon.eventstream");
        assert_eq!(raw.chunks().count(), 2);
        assert!(!raw.is_empty());
        assert_eq!(
            raw.content_type.as_deref(),
            Some("application/vnd.amazon.eventstream")
        );
    }
}
