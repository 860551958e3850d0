//! Scripted agent client
//!
//! Replays queued replies in order and records every request it receives.
//! Once the script runs out, the fallback reply (if any) is repeated.

use std::collections::VecDeque;

use async_trait::async_trait;
use base64::Engine;
use parking_lot::Mutex;

use super::traits::{AgentClient, AgentRequest, RawResponse};
use crate::error::TransportError;

/// One scripted reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// Body chunks delivered with status 200
    Chunks(Vec<Vec<u8>>),
    /// A non-success status and its body
    Status(u16, String),
}

impl MockReply {
    /// A well-formed event-stream text whose last frame carries `answer`
    ///
    /// `reference` is placed verbatim inside one retrieved-reference object
    /// of the trace frame, so citation metadata can be scripted too.
    #[must_use]
    pub fn answer(answer: &str, reference: &str) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(answer);
        let body = format!(
            r#"{{"trace":{{"orchestrationTrace":{{"observation":{{"knowledgeBaseLookupOutput":{{"retrievedReferences":[{{{reference}}}]}}}}}}}}}}:message-type event{{"bytes":"{encoded}"}}"#
        );
        Self::Chunks(vec![body.into_bytes()])
    }
}

/// Agent client driven by a script
#[derive(Debug, Default)]
pub struct MockAgentClient {
    script: Mutex<VecDeque<MockReply>>,
    fallback: Option<MockReply>,
    calls: Mutex<Vec<AgentRequest>>,
}

impl MockAgentClient {
    /// Client that replays `replies` once each
    #[must_use]
    pub fn new(replies: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Client that answers every request with `reply`
    #[must_use]
    pub fn always(reply: MockReply) -> Self {
        Self {
            fallback: Some(reply),
            ..Self::default()
        }
    }

    /// Queue another reply
    pub fn push(&self, reply: MockReply) {
        self.script.lock().push_back(reply);
    }

    /// Requests received so far
    #[must_use]
    pub fn calls(&self) -> Vec<AgentRequest> {
        self.calls.lock().clone()
    }

    /// Number of requests received so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl AgentClient for MockAgentClient {
    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn invoke(&self, request: &AgentRequest) -> Result<RawResponse, TransportError> {
        self.calls.lock().push(request.clone());

        let reply = self.script.lock().pop_front().or_else(|| self.fallback.clone());
        match reply {
            Some(MockReply::Chunks(chunks)) => Ok(RawResponse::from_chunks(chunks)),
            Some(MockReply::Status(status, body)) => Err(TransportError::Status { status, body }),
            None => Err(TransportError::Status {
                status: 503,
                body: "mock script exhausted".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;

    #[tokio::test]
    async fn test_script_replays_in_order() {
        let client = MockAgentClient::new([
            MockReply::Chunks(vec![b"one".to_vec()]),
            MockReply::Status(403, "denied".into()),
        ]);

        let req = AgentRequest::new("q", "s");
        assert!(client.invoke(&req).await.is_ok());
        let err = client.invoke(&req).await.unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 403, .. }));
        let err = client.invoke(&req).await.unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 503, .. }));
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_always_repeats() {
        let client = MockAgentClient::always(MockReply::answer("Hi", ""));
        let req = AgentRequest::new("q", "s");
        client.invoke(&req).await.unwrap();
        client.invoke(&req).await.unwrap();
        assert_eq!(client.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_scripted_answer_decodes() {
        let client = MockAgentClient::always(MockReply::answer(
            "Use the installer",
            r#""metadata":{"title":"Guide","category":"Docs","url":"https://docs/guide"}"#,
        ));
        let raw = client.invoke(&AgentRequest::new("q", "s")).await.unwrap();
        let decoded = decode(raw.chunks()).unwrap();

        assert_eq!(decoded.answer, "Use the installer");
        assert_eq!(decoded.citations.len(), 1);
        assert_eq!(decoded.citations[0].title, "Guide");
    }
}
