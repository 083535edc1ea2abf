//! HTTP transport shared by all backends.

pub mod http;

pub use http::{body_snippet, next_chunk, HttpTransport, TransportConfig, TransportError, BODY_SNIPPET_LIMIT};
