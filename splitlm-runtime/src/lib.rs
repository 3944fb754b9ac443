//! splitlm runtime: the streaming generation adapter
//!
//! # Architecture
//!
//! ```text
//! Runtime<T>                  ← text in, text out (Engine + Tokenizer)
//!   └── Engine                ← worker thread per request, fragment events
//!         └── G: Generator    ← fragment stream
//!               └── DecodingGenerator<M, T>  ← token ids → fragments
//!                     └── M: TokenModel
//! ```

mod engine;
mod loopback;
mod runtime;
mod streamer;

pub use engine::{Engine, FinishReason, FragmentSender, GenerationEvent};
pub use loopback::EchoModel;
pub use runtime::Runtime;
pub use streamer::{DecodingGenerator, TextStreamer};
