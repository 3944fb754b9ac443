//! Incremental detokenization
//!
//! Turns a stream of token ids into a stream of text fragments. The text of
//! each new token is taken as the suffix of the decoded text of every token
//! so far, so multi-token characters and merge-sensitive decodes come out
//! right.

use std::sync::Arc;

use splitlm::{
    FragmentStream, GenerationConfig, GenerationInput, Generator, Result, TokenModel, TokenStream,
    Tokenizer,
};

const REPLACEMENT: char = '\u{FFFD}';

/// Iterator adapter from token ids to text fragments.
///
/// A decoded suffix that ends in an incomplete UTF-8 character is held back
/// until a later token completes it. Whatever is still pending when the
/// token stream ends is flushed as the final fragment.
pub struct TextStreamer<T> {
    tokenizer: Arc<T>,
    tokens: TokenStream,
    ids: Vec<u32>,
    emitted: usize,
    eos_token_id: Option<u32>,
    skip_special_tokens: bool,
    done: bool,
}

impl<T: Tokenizer> TextStreamer<T> {
    #[must_use]
    pub fn new(tokenizer: Arc<T>, tokens: TokenStream) -> Self {
        Self {
            tokenizer,
            tokens,
            ids: Vec::new(),
            emitted: 0,
            eos_token_id: None,
            skip_special_tokens: true,
            done: false,
        }
    }

    /// End the stream when this id is produced. The id itself is not decoded.
    #[must_use]
    pub fn stop_at(mut self, eos_token_id: Option<u32>) -> Self {
        self.eos_token_id = eos_token_id;
        self
    }

    #[must_use]
    pub fn skip_special_tokens(mut self, skip: bool) -> Self {
        self.skip_special_tokens = skip;
        self
    }

    /// Ids consumed so far.
    #[must_use]
    pub fn token_ids(&self) -> &[u32] {
        &self.ids
    }

    fn decoded(&self) -> Result<String> {
        self.tokenizer.decode_with(&self.ids, self.skip_special_tokens)
    }

    /// Text decoded beyond what has already been emitted.
    fn take_suffix(&mut self, text: &str) -> Option<String> {
        if text.len() <= self.emitted || !text.is_char_boundary(self.emitted) {
            return None;
        }
        let fragment = text[self.emitted..].to_string();
        self.emitted = text.len();
        Some(fragment)
    }

    fn flush(&mut self) -> Option<Result<String>> {
        self.done = true;
        match self.decoded() {
            Ok(text) => self.take_suffix(&text).map(Ok),
            Err(e) => Some(Err(e)),
        }
    }
}

impl<T: Tokenizer> Iterator for TextStreamer<T> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let id = match self.tokens.next() {
                None => return self.flush(),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Some(Ok(id)) => id,
            };
            if Some(id) == self.eos_token_id {
                return self.flush();
            }
            self.ids.push(id);

            let text = match self.decoded() {
                Ok(text) => text,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            if text.ends_with(REPLACEMENT) {
                continue;
            }
            if let Some(fragment) = self.take_suffix(&text) {
                return Some(Ok(fragment));
            }
        }
    }
}

/// A [`Generator`] built from a token-level model and a tokenizer.
pub struct DecodingGenerator<M, T> {
    model: M,
    tokenizer: Arc<T>,
    skip_special_tokens: bool,
}

impl<M: TokenModel, T: Tokenizer> DecodingGenerator<M, T> {
    #[must_use]
    pub fn new(model: M, tokenizer: Arc<T>) -> Self {
        Self {
            model,
            tokenizer,
            skip_special_tokens: true,
        }
    }

    #[must_use]
    pub fn skip_special_tokens(mut self, skip: bool) -> Self {
        self.skip_special_tokens = skip;
        self
    }

    #[must_use]
    pub fn tokenizer(&self) -> &Arc<T> {
        &self.tokenizer
    }
}

impl<M, T> Generator for DecodingGenerator<M, T>
where
    M: TokenModel,
    T: Tokenizer + Send + Sync + 'static,
{
    fn generate(&self, input: GenerationInput, config: &GenerationConfig) -> Result<FragmentStream> {
        let eos = config
            .eos_token_id
            .unwrap_or_else(|| self.tokenizer.eos_token_id());
        let tokens = self.model.generate_tokens(input, config)?;
        let streamer = TextStreamer::new(Arc::clone(&self.tokenizer), tokens)
            .stop_at(Some(eos))
            .skip_special_tokens(self.skip_special_tokens);
        Ok(Box::new(streamer))
    }
}
