//! Text-level inference runtime
//!
//! The [`Runtime`] wraps an [`Engine`] and a [`Tokenizer`], providing
//! a text-in, text-out interface for running both halves in one process.

use std::sync::Arc;

use splitlm::{GenerationConfig, GenerationInput, Result, TokenModel, Tokenizer};

use crate::engine::GenerationEvent;
use crate::streamer::DecodingGenerator;
use crate::Engine;

/// Text-level inference runtime.
///
/// Combines a token model (via [`Engine`]) with a tokenizer.
pub struct Runtime<T: Tokenizer> {
    engine: Engine,
    tokenizer: Arc<T>,
}

impl<T> Runtime<T>
where
    T: Tokenizer + Send + Sync + 'static,
{
    /// Create a runtime that decodes `model`'s tokens with `tokenizer`.
    pub fn new<M: TokenModel + 'static>(model: M, tokenizer: T) -> Self {
        let tokenizer = Arc::new(tokenizer);
        let generator = DecodingGenerator::new(model, Arc::clone(&tokenizer));
        Self {
            engine: Engine::new(generator),
            tokenizer,
        }
    }

    /// Get a reference to the underlying engine.
    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Get a reference to the tokenizer.
    #[must_use]
    pub fn tokenizer(&self) -> &T {
        &self.tokenizer
    }

    /// Generate text, blocking until complete.
    ///
    /// Returns only the completion, not the prompt.
    ///
    /// # Errors
    /// Returns an error if tokenization or generation fails.
    pub fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        let fragments = self.engine.generate(self.input(prompt)?, config)?;
        Ok(fragments.concat())
    }

    /// Generate text, calling `on_fragment` for each fragment as it arrives.
    ///
    /// Returns the full completion.
    ///
    /// # Errors
    /// Returns an error if tokenization or generation fails, or if
    /// `on_fragment` does.
    pub fn generate_stream<F>(
        &self,
        prompt: &str,
        config: &GenerationConfig,
        mut on_fragment: F,
    ) -> Result<String>
    where
        F: FnMut(&str) -> Result<()>,
    {
        let input = self.input(prompt)?;
        self.engine.generate_stream(input, config, |rx| {
            let mut text = String::new();
            for event in rx {
                match event {
                    GenerationEvent::Fragment(fragment) => {
                        on_fragment(&fragment)?;
                        text.push_str(&fragment);
                    }
                    GenerationEvent::Error(e) => return Err(e),
                    GenerationEvent::Finished(_) => break,
                }
            }
            Ok(text)
        })?
    }

    fn input(&self, prompt: &str) -> Result<GenerationInput> {
        let input_ids = self.tokenizer.encode(prompt)?;
        let attention_mask = vec![1; input_ids.len()];
        Ok(GenerationInput {
            input_ids,
            attention_mask,
            hidden_states: None,
        })
    }
}
