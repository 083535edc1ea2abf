//! 流水线解码模块：把原始字节流还原为逐行、逐帧的载荷。
//!
//! Response decoding pipeline.
//!
//! | Decoder | Wire format | Used by |
//! |---------|-------------|---------|
//! | [`SseDecoder`] | `data:` lines, blank-line terminated events | Gemini-style backend |
//! | [`NdjsonDecoder`] | one JSON object per line | local daemon |
//!
//! Both are pure buffers: push bytes, pull frames. Network reads, cancellation
//! and dispatch live in the drivers.

pub mod decode;

pub use decode::{
    is_done_sentinel, LineSplitter, NdjsonDecoder, SseDecoder, SseFrameParser, DONE_SENTINEL,
};
