//! Agent Client Integration
//!
//! Access to the remote managed agent through a common trait, so the chat
//! pipeline can be driven by the real runtime or by a scripted mock.
//!
//! # Available Clients
//!
//! - **Bedrock**: Bedrock Agents runtime `InvokeAgent`, signed with SigV4
//! - **Mock**: scripted replies for tests and offline demos
//!
//! # Usage
//!
//! ```ignore
//! use gateway_core::agent::{AgentClient, AgentRequest, BedrockAgentClient};
//!
//! let client = BedrockAgentClient::from_config(&config.agent)?;
//! let raw = client.invoke(&AgentRequest::new("What is X?", "session-1")).await?;
//! let decoded = gateway_core::decode(raw.chunks())?;
//! ```

mod bedrock;
mod mock;
mod signing;
mod traits;

pub use bedrock::BedrockAgentClient;
pub use mock::{MockAgentClient, MockReply};
pub use signing::{Credentials, SigV4Signer};
pub use traits::{AgentClient, AgentRequest, RawResponse};
