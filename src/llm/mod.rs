//! Judge client abstraction.
//!
//! The escalation engine talks to its judge through the [`JudgeClient`]
//! trait: an ordered conversation in, one text per requested completion out.
//! The shipped implementation speaks the OpenAI chat-completions wire format
//! and rotates requests round-robin across an [`EndpointPool`], which is the
//! usual deployment shape for a fleet of local vLLM replicas.
//!
//! ## Example
//!
//! ```rust,ignore
//! use escalate_core::llm::{
//!     ChatMessage, ClientConfig, CompletionRequest, EndpointPool, JudgeClient,
//!     OpenAiCompatClient, ServerSpec,
//! };
//!
//! let pool = EndpointPool::from_servers(&[ServerSpec::new("127.0.0.1", vec![22020, 22021])])?;
//! let client = OpenAiCompatClient::new(ClientConfig::new("key", "judge-8b"), pool)?;
//!
//! let request = CompletionRequest::new()
//!     .with_message(ChatMessage::user("Rate this problem"))
//!     .with_json_mode(true);
//! let texts = client.complete(request).await?;
//! ```

mod client;
mod pool;
mod types;

pub use client::{ClientConfig, JudgeClient, OpenAiCompatClient};
pub use pool::{EndpointPool, ServerSpec};
pub use types::{ChatMessage, ChatRole, CompletionRequest};
