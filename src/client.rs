//! Unified client interface.
//!
//! Keep the public surface small and predictable: pick a backend by name,
//! hand it a [`ChatRequest`](crate::types::ChatRequest), receive ordered deltas.
//! Implementation details are split into submodules under `src/client/`.

pub mod builder;
pub mod context;
pub mod core;

pub use builder::ChatClientBuilder;
pub use context::CallContext;
pub use core::{CallStats, ChatClient};
