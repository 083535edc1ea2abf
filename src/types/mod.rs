//! 类型系统模块：定义与后端无关的对话请求与增量回调类型。
//!
//! # Types Module
//!
//! The backend-agnostic description of one chat call and the callback that
//! receives its output.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ChatRequest`] | Model, prompt, images, sampling, format hint, extras, callback |
//! | [`ChatRequestBuilder`] | Validating builder for requests |
//! | [`StreamPreference`] | Use backend default / force enabled / force disabled |
//! | [`ResponseFormat`] | Free-form JSON sentinel or embedded schema |
//! | [`Delta`] | One content and/or thinking fragment |
//!
//! ## Example
//!
//! ```rust
//! use ai_chat_rust::types::{ChatRequest, ResponseFormat, StreamPreference};
//!
//! let request = ChatRequest::builder()
//!     .model("llama3")
//!     .prompt("List three colours as JSON")
//!     .format(ResponseFormat::Json)
//!     .stream(StreamPreference::ForceDisabled)
//!     .on_delta(|delta| {
//!         print!("{}", delta.content);
//!         Ok(())
//!     })
//!     .build()
//!     .unwrap();
//! assert_eq!(request.model, "llama3");
//! ```

pub mod request;

pub use request::{
    ChatRequest, ChatRequestBuilder, Delta, DeltaCallback, ResponseFormat, StreamPreference,
};
