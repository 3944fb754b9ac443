//! Tokenizer integration
//!
//! Defines the [`Tokenizer`] trait and the byte-level BPE implementation.

mod bpe_tokenizer;
mod byte_symbols;
mod encoding;
mod merges;
mod pre_tokenizer;
mod special_tokens;
mod vocab;

use crate::Result;

pub use bpe_tokenizer::{
    BpeTokenizer, MERGES_FILE, SPECIAL_TOKENS_FILE, TOKENIZER_CONFIG_FILE, VOCAB_FILE,
};
pub use byte_symbols::ByteSymbolMap;
pub use encoding::{pad_or_truncate, Padding, TokenizedInput};
pub use merges::MergeTable;
pub use pre_tokenizer::{PreTokenizer, Segment, WORD_PATTERN};
pub use special_tokens::{
    SpecialTokenEntry, SpecialTokens, TokenizerConfig, DEFAULT_MODEL_MAX_LENGTH,
    DEFAULT_SPECIAL_TOKEN,
};
pub use vocab::Vocabulary;

/// Trait for tokenizers that convert between text and token IDs.
///
/// The client, the runtime and the incremental detokenizer are generic over
/// this trait; [`BpeTokenizer`] is the concrete implementation.
pub trait Tokenizer {
    /// Encode text to token IDs.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Decode token IDs to text, keeping special tokens.
    ///
    /// # Errors
    /// Returns an error if decoding fails.
    fn decode(&self, ids: &[u32]) -> Result<String>;

    /// Decode token IDs to text, optionally dropping special tokens.
    ///
    /// # Errors
    /// Returns an error if decoding fails.
    fn decode_with(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        if skip_special_tokens {
            let kept: Vec<u32> = ids.iter().copied().filter(|&id| !self.is_special(id)).collect();
            self.decode(&kept)
        } else {
            self.decode(ids)
        }
    }

    /// Decode a single token ID to text.
    ///
    /// # Errors
    /// Returns an error if decoding fails.
    fn decode_token(&self, id: u32) -> Result<String> {
        self.decode(&[id])
    }

    /// Get the end-of-sequence token ID.
    fn eos_token_id(&self) -> u32;

    /// Get the padding token ID.
    fn pad_token_id(&self) -> u32 {
        self.eos_token_id()
    }

    /// Whether `id` is a special (control) token.
    fn is_special(&self, _id: u32) -> bool {
        false
    }
}
