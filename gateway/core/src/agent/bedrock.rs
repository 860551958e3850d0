//! Bedrock Agents Runtime Client
//!
//! Invokes a managed agent through the `InvokeAgent` REST operation:
//!
//! ```text
//! POST https://bedrock-agent-runtime.{region}.amazonaws.com
//!      /agents/{agentId}/agentAliases/{agentAliasId}/sessions/{sessionId}/text
//! {"inputText": "...", "enableTrace": true, "endSession": false}
//! ```
//!
//! The reply is an `application/vnd.amazon.eventstream` body. It is
//! collected whole and handed to the decoder one byte per chunk.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Url;
use serde::Serialize;

use super::signing::{Credentials, SigV4Signer};
use super::traits::{AgentClient, AgentRequest, RawResponse};
use crate::config::AgentConfig;
use crate::error::TransportError;

/// Signing service name for the agent runtime
const SIGNING_SERVICE: &str = "bedrock";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InvokeAgentBody<'a> {
    input_text: &'a str,
    enable_trace: bool,
    end_session: bool,
}

/// Bedrock Agents runtime client
#[derive(Clone, Debug)]
pub struct BedrockAgentClient {
    /// Base endpoint, e.g. `https://bedrock-agent-runtime.us-east-1.amazonaws.com`
    endpoint: Url,
    agent_id: String,
    agent_alias_id: String,
    signer: SigV4Signer,
    http_client: reqwest::Client,
}

impl BedrockAgentClient {
    /// Create a client for one agent alias
    ///
    /// # Errors
    ///
    /// Returns an error if `endpoint` is not a valid base URL or the HTTP
    /// client cannot be built.
    pub fn new(
        endpoint: &str,
        agent_id: impl Into<String>,
        agent_alias_id: impl Into<String>,
        signer: SigV4Signer,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| TransportError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(TransportError::InvalidEndpoint(endpoint.to_string()));
        }

        let http_client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint,
            agent_id: agent_id.into(),
            agent_alias_id: agent_alias_id.into(),
            signer,
            http_client,
        })
    }

    /// Create from [`AgentConfig`], reading credentials from the environment
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing or the endpoint is invalid.
    pub fn from_config(config: &AgentConfig) -> Result<Self, TransportError> {
        let credentials = Credentials::from_env()?;
        Self::from_config_with_credentials(config, credentials)
    }

    /// Create from [`AgentConfig`] with explicit credentials
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is invalid.
    pub fn from_config_with_credentials(
        config: &AgentConfig,
        credentials: Credentials,
    ) -> Result<Self, TransportError> {
        let endpoint = config.endpoint_url();
        let signer = SigV4Signer::new(credentials, &config.region, SIGNING_SERVICE);
        Self::new(
            &endpoint,
            &config.agent_id,
            &config.agent_alias_id,
            signer,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Invocation URL for a session
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidEndpoint`] if the base URL cannot take
    /// path segments.
    pub fn invoke_url(&self, session_id: &str) -> Result<Url, TransportError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::InvalidEndpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend([
                "agents",
                self.agent_id.as_str(),
                "agentAliases",
                self.agent_alias_id.as_str(),
                "sessions",
                session_id,
                "text",
            ]);
        Ok(url)
    }
}

#[async_trait]
impl AgentClient for BedrockAgentClient {
    fn name(&self) -> &'static str {
        "Bedrock"
    }

    async fn invoke(&self, request: &AgentRequest) -> Result<RawResponse, TransportError> {
        let url = self.invoke_url(&request.session_id)?;
        let body = serde_json::to_vec(&InvokeAgentBody {
            input_text: &request.question,
            enable_trace: true,
            end_session: request.end_session,
        })?;

        let content_type = "application/json";
        let accept = "application/json";
        let signed = self.signer.sign(
            "POST",
            &url,
            &[("content-type", content_type), ("accept", accept)],
            &body,
            chrono::Utc::now(),
        );

        tracing::debug!(
            agent_id = %self.agent_id,
            session_id = %request.session_id,
            end_session = request.end_session,
            "Invoking agent"
        );

        let mut builder = self
            .http_client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(reqwest::header::ACCEPT, accept);
        for (name, value) in signed {
            builder = builder.header(name, value);
        }

        let response = builder.body(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), body = %body, "Agent returned error status");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk?);
        }

        tracing::debug!(bytes = body.len(), "Agent response received");

        let raw = RawResponse::bytewise(body);
        Ok(match content_type {
            Some(ct) => raw.with_content_type(ct),
            None => raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(endpoint: &str) -> BedrockAgentClient {
        let signer = SigV4Signer::new(Credentials::new("AKID", "secret"), "us-east-1", SIGNING_SERVICE);
        BedrockAgentClient::new(endpoint, "AGENT1", "ALIAS1", signer, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_invoke_url_layout() {
        let client = client("https://bedrock-agent-runtime.us-east-1.amazonaws.com");
        let url = client.invoke_url("abc-123").unwrap();
        assert_eq!(
            url.as_str(),
            "https://bedrock-agent-runtime.us-east-1.amazonaws.com/agents/AGENT1/agentAliases/ALIAS1/sessions/abc-123/text"
        );
    }

    #[test]
    fn test_invoke_url_keeps_endpoint_prefix() {
        let client = client("http://localhost:4566/proxy/");
        let url = client.invoke_url("s").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:4566/proxy/agents/AGENT1/agentAliases/ALIAS1/sessions/s/text"
        );
    }

    #[test]
    fn test_invoke_url_escapes_session_id() {
        let client = client("https://example.com");
        let url = client.invoke_url("a/b").unwrap();
        assert!(url.path().ends_with("/sessions/a%2Fb/text"));
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let signer = SigV4Signer::new(Credentials::new("a", "b"), "us-east-1", SIGNING_SERVICE);
        let err = BedrockAgentClient::new("not a url", "a", "b", signer, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidEndpoint(_)));
    }

    #[test]
    fn test_request_body_field_names() {
        let body = serde_json::to_value(InvokeAgentBody {
            input_text: "hi",
            enable_trace: true,
            end_session: false,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"inputText": "hi", "enableTrace": true, "endSession": false})
        );
    }
}
