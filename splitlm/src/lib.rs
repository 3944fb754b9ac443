//! splitlm: core types for split causal-LM inference
//!
//! A front end turns text into token ids (and optionally hidden states), a
//! back end generates and streams text back. This crate holds the parts both
//! sides share: the byte-level BPE tokenizer, the generation capability
//! boundary, and the error type. Transport lives in `splitlm-serve`, the
//! streaming adapter in `splitlm-runtime`.

pub mod error;
pub mod generation;
pub mod model;
pub mod tokenizer;

pub use error::{Error, ErrorKind, Result};
pub use generation::{FragmentStream, GenerationConfig, Generator};
pub use model::{Embedder, GenerationInput, HiddenStates, TokenModel, TokenStream};
pub use tokenizer::{BpeTokenizer, Padding, TokenizedInput, Tokenizer};
