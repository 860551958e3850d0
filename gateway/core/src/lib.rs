//! Gateway Core - Agent Invocation and Event-Stream Decoding for agent-gateway
//!
//! This crate holds everything between a user's question and a rendered
//! answer, independent of any HTTP framework or terminal UI. The daemon crate
//! drives it from an axum server and from a terminal chat loop.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Surfaces (daemon)                          │
//! │   POST /chat      web widget      `gateway-daemon chat` / `ask`   │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │ ChatRequest
//! ┌───────────────────────────────┼──────────────────────────────────┐
//! │                         GATEWAY CORE                              │
//! │  ┌────────────┐   ┌────────────┐   ┌────────────┐  ┌───────────┐ │
//! │  │ Rate limit │ → │ AgentClient│ → │  Decoder   │→ │ Citations │ │
//! │  │ per client │   │ (SigV4)    │   │ (markers)  │  │ (regex)   │ │
//! │  └────────────┘   └────────────┘   └────────────┘  └───────────┘ │
//! │                 ChatService + RequestLog + ChatSession            │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`ChatService`]: rate-limits, invokes the agent, decodes, logs
//! - [`AgentClient`]: remote agent transport ([`BedrockAgentClient`], [`MockAgentClient`])
//! - [`decode`]: turns a raw event-stream body into trace, answer and citations
//! - [`CitationRecord`]: a deduplicated `(title, category, url)` reference
//! - [`ChatSession`]: explicit per-surface conversation history
//! - [`GatewayConfig`]: layered configuration (defaults, TOML, env, CLI)
//!
//! # Module Overview
//!
//! - [`agent`]: agent client trait, Bedrock client, SigV4 signer, mock client
//! - [`config`]: configuration loading
//! - [`decoder`]: event-stream decoding
//! - [`error`]: decode, transport and chat errors
//! - [`metadata`]: citation extraction
//! - [`presentation`]: answer rendering for text surfaces
//! - [`rate_limit`]: per-client fixed-window rate limiting
//! - [`request_log`]: request/response log entries and sinks
//! - [`service`]: the chat pipeline
//! - [`session`]: chat turns and sessions

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod agent;
pub mod config;
pub mod decoder;
pub mod error;
pub mod metadata;
pub mod presentation;
pub mod rate_limit;
pub mod request_log;
pub mod service;
pub mod session;

// Re-exports for convenience
pub use agent::{
    AgentClient, AgentRequest, BedrockAgentClient, Credentials, MockAgentClient, MockReply,
    RawResponse, SigV4Signer,
};
pub use config::{
    default_config_path, load_config, load_config_from_path, load_config_with_env, AgentConfig,
    ConfigError, ConfigOverrides, ConfigSource, GatewayConfig, GatewayToml, ServerConfig,
};
pub use decoder::{decode, DecodedResponse};
pub use error::{ChatError, DecodeError, TransportError};
pub use metadata::{extract_citations, CitationRecord};
pub use presentation::render_answer;
pub use rate_limit::{ClientRateLimiter, RateLimitConfig, RateLimitError, RateLimitResult};
pub use request_log::{
    JsonLinesRequestLog, LogEntry, LogEvent, MemoryRequestLog, RequestLog, TracingRequestLog,
};
pub use service::{ChatReply, ChatRequest, ChatService};
pub use session::{ChatSession, ChatTurn, SessionError, SessionId, SessionState};
