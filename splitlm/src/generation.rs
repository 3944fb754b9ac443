//! Generation parameters and the fragment-level generation capability

use serde::{Deserialize, Serialize};

use crate::model::GenerationInput;
use crate::Result;

/// A lazy, finite, non-restartable sequence of generated text fragments.
///
/// Fragments come out in generation order. Dropping the stream tells the
/// producer to stop.
pub type FragmentStream = Box<dyn Iterator<Item = Result<String>> + Send>;

/// Options for text generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Maximum number of fragments (new tokens) to produce.
    pub max_new_tokens: usize,
    /// Temperature for logit scaling (higher = more random). Must be > 0.
    pub temperature: f32,
    /// Only the `top_k` most likely tokens are sampled from.
    pub top_k: usize,
    /// Seed for the PRNG. `None` lets the backend choose.
    pub seed: Option<u64>,
    /// Optional EOS token ID to stop generation early.
    pub eos_token_id: Option<u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 50,
            temperature: 0.7,
            top_k: 50,
            seed: None,
            eos_token_id: None,
        }
    }
}

/// The opaque generation capability, at fragment granularity.
///
/// Implementations may be a local model, a remote call or a test double.
/// `generate` is called once per request; it may block while producing
/// fragments, so callers drive it off the async executor.
pub trait Generator: Send + Sync {
    /// Start generating for `input`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Generation`] if generation cannot start.
    /// Failures after the first fragment are reported through the stream.
    fn generate(&self, input: GenerationInput, config: &GenerationConfig)
        -> Result<FragmentStream>;
}

impl<G: Generator + ?Sized> Generator for std::sync::Arc<G> {
    fn generate(
        &self,
        input: GenerationInput,
        config: &GenerationConfig,
    ) -> Result<FragmentStream> {
        (**self).generate(input, config)
    }
}
