//! Model-side capability boundaries
//!
//! The neural network is opaque here. The back end sees it as a
//! [`TokenModel`] (input in, token ids out); the front end may compute the
//! numeric input representation through an [`Embedder`].

use serde::{Deserialize, Serialize};

use crate::generation::GenerationConfig;
use crate::tokenizer::TokenizedInput;
use crate::{Error, Result};

/// A lazy sequence of generated token ids.
pub type TokenStream = Box<dyn Iterator<Item = Result<u32>> + Send>;

/// Externally computed numeric representation of the input (e.g. embeddings).
///
/// Row-major `f32` data of the given shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HiddenStates {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl HiddenStates {
    /// Create hidden states, checking that `shape` matches `data`.
    ///
    /// # Errors
    /// Returns [`Error::Payload`] if the element count differs from the shape.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let states = Self { shape, data };
        states.validate()?;
        Ok(states)
    }

    /// Check that `shape` matches the element count.
    ///
    /// # Errors
    /// Returns [`Error::Payload`] on mismatch or overflow.
    pub fn validate(&self) -> Result<()> {
        let expected = self
            .shape
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| Error::Payload(format!("shape {:?} overflows", self.shape)))?;
        if expected != self.data.len() {
            return Err(Error::Payload(format!(
                "shape {:?} needs {expected} values, got {}",
                self.shape,
                self.data.len()
            )));
        }
        Ok(())
    }
}

/// Everything the generation capability receives for one request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GenerationInput {
    pub input_ids: Vec<u32>,
    /// 1 = real token, 0 = padding; same length as `input_ids`.
    pub attention_mask: Vec<u8>,
    pub hidden_states: Option<HiddenStates>,
}

impl GenerationInput {
    /// Input without precomputed hidden states.
    #[must_use]
    pub fn from_tokens(tokens: TokenizedInput) -> Self {
        Self {
            input_ids: tokens.input_ids,
            attention_mask: tokens.attention_mask,
            hidden_states: None,
        }
    }

    /// Ids of the attended (mask = 1) positions, in order.
    pub fn attended_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.input_ids
            .iter()
            .zip(&self.attention_mask)
            .filter(|&(_, &m)| m == 1)
            .map(|(&id, _)| id)
    }
}

/// The opaque model, at token granularity.
pub trait TokenModel: Send + Sync {
    /// Produce new token ids for `input`, lazily and in generation order.
    ///
    /// # Errors
    /// Returns an error if generation cannot start.
    fn generate_tokens(&self, input: GenerationInput, config: &GenerationConfig)
        -> Result<TokenStream>;
}

/// The front end's input-representation capability.
pub trait Embedder: Send + Sync {
    /// Compute hidden states for a (possibly padded) id sequence.
    ///
    /// # Errors
    /// Returns an error if an id has no embedding.
    fn embed(&self, input_ids: &[u32]) -> Result<HiddenStates>;
}
