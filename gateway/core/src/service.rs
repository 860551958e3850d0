//! Chat Service
//!
//! The pipeline every surface goes through:
//!
//! ```text
//! validate prompt ─► rate limit ─► log request ─► invoke agent ─► decode ─► log response
//!      400              429                          500            500
//! ```
//!
//! A rejected or failed request never produces a partial answer, and a
//! rate-limited request never reaches the agent.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agent::{AgentClient, AgentRequest};
use crate::config::{GatewayConfig, DEFAULT_MAX_PROMPT_LENGTH};
use crate::decoder::decode;
use crate::error::ChatError;
use crate::metadata::CitationRecord;
use crate::rate_limit::ClientRateLimiter;
use crate::request_log::{LogEntry, RequestLog, TracingRequestLog};
use crate::session::SessionId;

/// Client identity used when a surface has no caller address
pub const LOCAL_CLIENT: &str = "local";

/// A question from some surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user's question
    pub prompt: String,
    /// Session to continue; a new one is generated when absent
    pub session_id: Option<String>,
    /// Caller identity for rate limiting and logs
    pub client: Option<String>,
    /// Ask the agent to close the session after answering
    pub end_session: bool,
}

impl ChatRequest {
    /// Create a request for a new session
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            session_id: None,
            client: None,
            end_session: false,
        }
    }

    /// Continue an existing session
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the caller identity
    #[must_use]
    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    /// Set whether the agent should end the session
    #[must_use]
    pub fn with_end_session(mut self, end_session: bool) -> Self {
        self.end_session = end_session;
        self
    }
}

/// A decoded answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    /// Session the answer belongs to
    pub session_id: String,
    /// Cleaned answer text
    pub answer: String,
    /// Deduplicated citations
    pub citations: Vec<CitationRecord>,
    /// Decode transcript
    pub trace: String,
}

/// Rate-limits, invokes the agent, decodes and logs
pub struct ChatService {
    client: Arc<dyn AgentClient>,
    limiter: ClientRateLimiter,
    log: Arc<dyn RequestLog>,
    max_prompt_length: usize,
}

impl ChatService {
    /// Create a service
    pub fn new(
        client: Arc<dyn AgentClient>,
        limiter: ClientRateLimiter,
        log: Arc<dyn RequestLog>,
    ) -> Self {
        Self {
            client,
            limiter,
            log,
            max_prompt_length: DEFAULT_MAX_PROMPT_LENGTH,
        }
    }

    /// Create a service with the limits from `config`
    pub fn from_config(
        config: &GatewayConfig,
        client: Arc<dyn AgentClient>,
        log: Arc<dyn RequestLog>,
    ) -> Self {
        Self::new(client, ClientRateLimiter::new(config.rate_limit.clone()), log)
            .with_max_prompt_length(config.server.max_prompt_length)
    }

    /// Create a service with default limits that logs through `tracing`
    pub fn with_client(client: Arc<dyn AgentClient>) -> Self {
        Self::new(client, ClientRateLimiter::with_defaults(), Arc::new(TracingRequestLog))
    }

    /// Set the maximum accepted prompt length in characters
    #[must_use]
    pub fn with_max_prompt_length(mut self, max: usize) -> Self {
        self.max_prompt_length = max;
        self
    }

    /// Name of the underlying agent client
    #[must_use]
    pub fn client_name(&self) -> &str {
        self.client.name()
    }

    /// The rate limiter
    #[must_use]
    pub fn limiter(&self) -> &ClientRateLimiter {
        &self.limiter
    }

    /// Answer one question
    ///
    /// # Errors
    ///
    /// - [`ChatError::EmptyPrompt`] / [`ChatError::PromptTooLong`] for bad input
    /// - [`ChatError::RateLimited`] when the caller is over its allowance
    /// - [`ChatError::Transport`] / [`ChatError::Decode`] when the agent fails
    pub async fn ask(&self, request: ChatRequest) -> Result<ChatReply, ChatError> {
        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            return Err(ChatError::EmptyPrompt);
        }
        if prompt.chars().count() > self.max_prompt_length {
            return Err(ChatError::PromptTooLong {
                max: self.max_prompt_length,
            });
        }

        let client = request.client.as_deref().unwrap_or(LOCAL_CLIENT);
        if let Err(e) = self.limiter.check(client).into_result() {
            tracing::warn!(client = client, error = %e, "Chat request rate limited");
            return Err(e.into());
        }

        let session_id = request
            .session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| SessionId::new().0);
        let ip_address = request.client.as_deref();

        self.log
            .record(LogEntry::request(&session_id, prompt, ip_address));

        let agent_request = AgentRequest::new(prompt, session_id.as_str())
            .with_end_session(request.end_session);

        let raw = match self.client.invoke(&agent_request).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(session_id = %session_id, client = self.client.name(), error = %e, "Agent invocation failed");
                return Err(e.into());
            }
        };

        let decoded = match decode(raw.chunks()) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::error!(session_id = %session_id, bytes = raw.len(), error = %e, "Agent response could not be decoded");
                return Err(e.into());
            }
        };

        self.log
            .record(LogEntry::response(&session_id, &decoded.answer, ip_address));

        tracing::info!(
            session_id = %session_id,
            citations = decoded.citations.len(),
            "Chat request answered"
        );

        Ok(ChatReply {
            session_id,
            answer: decoded.answer,
            citations: decoded.citations,
            trace: decoded.trace,
        })
    }

    /// Log a health check from `ip_address`
    pub fn record_health_check(&self, ip_address: Option<&str>) {
        self.log.record(LogEntry::health_check(ip_address));
    }
}

impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService")
            .field("client", &self.client.name())
            .field("limiter", &self.limiter)
            .field("max_prompt_length", &self.max_prompt_length)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{MockAgentClient, MockReply};
    use crate::error::{DecodeError, TransportError};
    use crate::rate_limit::RateLimitConfig;
    use crate::request_log::{LogEvent, MemoryRequestLog};

    fn service(mock: Arc<MockAgentClient>, log: Arc<MemoryRequestLog>) -> ChatService {
        ChatService::new(mock, ClientRateLimiter::with_defaults(), log)
    }

    #[tokio::test]
    async fn test_successful_chat_logs_request_and_response() {
        let mock = Arc::new(MockAgentClient::always(MockReply::answer("All good", "")));
        let log = Arc::new(MemoryRequestLog::new());
        let svc = service(mock.clone(), log.clone());

        let reply = svc
            .ask(ChatRequest::new("  How are you?  ").with_client("1.2.3.4"))
            .await
            .unwrap();

        assert_eq!(reply.answer, "All good");
        assert_eq!(reply.session_id.len(), 36);
        assert_eq!(mock.calls()[0].question, "How are you?");
        assert_eq!(mock.calls()[0].session_id, reply.session_id);

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event, LogEvent::Request);
        assert_eq!(entries[0].ip_address.as_deref(), Some("1.2.3.4"));
        assert_eq!(entries[1].response.as_deref(), Some("All good"));
    }

    #[tokio::test]
    async fn test_supplied_session_id_is_reused() {
        let mock = Arc::new(MockAgentClient::always(MockReply::answer("ok", "")));
        let svc = service(mock.clone(), Arc::new(MemoryRequestLog::new()));

        let reply = svc
            .ask(ChatRequest::new("q").with_session_id("abc").with_end_session(true))
            .await
            .unwrap();

        assert_eq!(reply.session_id, "abc");
        assert!(mock.calls()[0].end_session);
    }

    #[tokio::test]
    async fn test_empty_prompt_never_reaches_agent() {
        let mock = Arc::new(MockAgentClient::always(MockReply::answer("ok", "")));
        let log = Arc::new(MemoryRequestLog::new());
        let svc = service(mock.clone(), log.clone());

        let err = svc.ask(ChatRequest::new("   ")).await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyPrompt));
        assert_eq!(mock.call_count(), 0);
        assert!(log.entries().is_empty());
    }

    #[tokio::test]
    async fn test_prompt_too_long() {
        let mock = Arc::new(MockAgentClient::always(MockReply::answer("ok", "")));
        let svc = service(mock, Arc::new(MemoryRequestLog::new())).with_max_prompt_length(5);

        let err = svc.ask(ChatRequest::new("123456")).await.unwrap_err();
        assert!(matches!(err, ChatError::PromptTooLong { max: 5 }));
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_third_request_is_rate_limited() {
        let mock = Arc::new(MockAgentClient::always(MockReply::answer("ok", "")));
        let svc = service(mock.clone(), Arc::new(MemoryRequestLog::new()));

        for _ in 0..2 {
            svc.ask(ChatRequest::new("q").with_client("9.9.9.9"))
                .await
                .unwrap();
        }
        let err = svc
            .ask(ChatRequest::new("q").with_client("9.9.9.9"))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), 429);
        assert_eq!(mock.call_count(), 2);

        // Other clients are unaffected
        svc.ask(ChatRequest::new("q").with_client("8.8.8.8"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_disabled_limiter_allows_everything() {
        let mock = Arc::new(MockAgentClient::always(MockReply::answer("ok", "")));
        let svc = ChatService::new(
            mock.clone(),
            ClientRateLimiter::new(RateLimitConfig::disabled()),
            Arc::new(MemoryRequestLog::new()),
        );

        for _ in 0..5 {
            svc.ask(ChatRequest::new("q")).await.unwrap();
        }
        assert_eq!(mock.call_count(), 5);
    }

    #[tokio::test]
    async fn test_transport_error_is_500_without_response_log() {
        let mock = Arc::new(MockAgentClient::new([MockReply::Status(403, "denied".into())]));
        let log = Arc::new(MemoryRequestLog::new());
        let svc = service(mock, log.clone());

        let err = svc.ask(ChatRequest::new("q")).await.unwrap_err();
        assert!(matches!(
            err,
            ChatError::Transport(TransportError::Status { status: 403, .. })
        ));
        assert_eq!(err.status_code(), 500);
        assert!(log.events(LogEvent::Response).is_empty());
        assert_eq!(log.events(LogEvent::Request).len(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_reply_is_decode_error() {
        let mock = Arc::new(MockAgentClient::new([MockReply::Chunks(vec![vec![0xff, 0xfe]])]));
        let svc = service(mock, Arc::new(MemoryRequestLog::new()));

        let err = svc.ask(ChatRequest::new("q")).await.unwrap_err();
        assert!(matches!(err, ChatError::Decode(DecodeError::EmptyResponse)));
    }

    #[test]
    fn test_health_check_is_logged() {
        let log = Arc::new(MemoryRequestLog::new());
        let svc = service(Arc::new(MockAgentClient::default()), log.clone());
        svc.record_health_check(Some("127.0.0.1"));
        assert_eq!(log.events(LogEvent::HealthCheck).len(), 1);
    }
}
