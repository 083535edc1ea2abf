//! # ai-chat-rust
//!
//! 多后端流式对话客户端：一个请求结构，三种推理后端，一个有序的增量回调。
//!
//! Multi-backend streaming chat client. A caller builds one [`ChatRequest`],
//! picks a backend by name, and receives incremental output through a single
//! ordered callback regardless of which backend answered.
//!
//! ## Core Properties
//!
//! - **Ordered delivery**: fragments reach the callback in the order the backend produced them
//! - **Backpressure**: the callback runs inline; fragment N+1 is not read before fragment N returns
//! - **Cancellable**: every network await races the call's [`CallContext`]
//! - **One error taxonomy**: [`ErrorKind`] is the same for every backend
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_chat_rust::{ChatClient, ChatRequest, StreamPreference};
//!
//! #[tokio::main]
//! async fn main() -> ai_chat_rust::Result<()> {
//!     let client = ChatClient::builder().provider("gemini").build()?;
//!
//!     let request = ChatRequest::builder()
//!         .model("gemini-2.0-flash")
//!         .prompt("Name three rivers as a JSON array")
//!         .stream(StreamPreference::ForceEnabled)
//!         .on_delta(|delta| {
//!             print!("{}", delta.content);
//!             Ok(())
//!         })
//!         .build()?;
//!
//!     client.chat(request).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Chat request model, builder, deltas |
//! | [`structured`] | Response format negotiation per backend |
//! | [`pipeline`] | Byte-to-line reassembly, SSE framing, NDJSON |
//! | [`drivers`] | [`ChatProvider`] trait, factory, the three backends |
//! | [`client`] | [`ChatClient`] facade, [`CallContext`] cancellation |
//! | [`transport`] | Pooled HTTP transport, cancellation-aware reads |
//! | [`config`] | Provider configuration snapshot |
//! | [`error`] | Unified error taxonomy |

pub mod client;
pub mod config;
pub mod drivers;
pub mod error_code;
pub mod multimodal;
pub mod pipeline;
pub mod structured;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{CallContext, CallStats, ChatClient, ChatClientBuilder};
pub use config::{AuthMode, ProviderConfig};
pub use drivers::{create_provider, ChatProvider, ProviderKind};
pub use error_code::StandardErrorCode;
pub use types::{ChatRequest, ChatRequestBuilder, Delta, ResponseFormat, StreamPreference};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{BoxError, Error, ErrorContext, ErrorKind, UpstreamError};
