//! Front-end client
//!
//! Tokenizes a prompt, optionally computes hidden states, sends the request
//! frame and reads the fragment stream back.

use std::sync::Arc;

use tokio::net::TcpStream;

use splitlm::tokenizer::pad_or_truncate;
use splitlm::{Embedder, Error, Result, TokenizedInput, Tokenizer};

use crate::config::ClientConfig;
use crate::framing::{send_message, FragmentReader};
use crate::types::{GenerationOverrides, InferenceRequest};

pub struct Client<T> {
    tokenizer: T,
    embedder: Option<Arc<dyn Embedder>>,
    config: ClientConfig,
}

impl<T: Tokenizer> Client<T> {
    #[must_use]
    pub fn new(tokenizer: T, config: ClientConfig) -> Self {
        Self {
            tokenizer,
            embedder: None,
            config,
        }
    }

    /// Send hidden states computed by `embedder` along with the ids.
    #[must_use]
    pub fn with_embedder(mut self, embedder: impl Embedder + 'static) -> Self {
        self.embedder = Some(Arc::new(embedder));
        self
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn tokenizer(&self) -> &T {
        &self.tokenizer
    }

    /// Build the request for `prompt` without sending it.
    ///
    /// # Errors
    /// Returns an error if the prompt cannot be encoded or embedded.
    pub fn prepare(
        &self,
        prompt: &str,
        overrides: Option<GenerationOverrides>,
    ) -> Result<InferenceRequest> {
        let ids = self.tokenizer.encode(prompt)?;
        let tokens = match self.config.sequence_length {
            Some(len) => pad_or_truncate(ids, len, self.tokenizer.pad_token_id()),
            None => TokenizedInput::unpadded(ids),
        };
        let mut request = InferenceRequest::from_tokens(tokens);
        if let Some(embedder) = &self.embedder {
            request.hidden_states = Some(embedder.embed(&request.input_ids)?);
        }
        request.generation = overrides;
        Ok(request)
    }

    /// Send `request` and return the reader for the fragment stream.
    ///
    /// # Errors
    /// Returns an error if the connection or the write fails, or if the
    /// encoded request exceeds the configured frame limit.
    pub async fn send(&self, request: &InferenceRequest) -> Result<FragmentReader<TcpStream>> {
        let payload = request.encode()?;
        if payload.len() > self.config.max_frame_len {
            return Err(Error::FrameTooLarge {
                len: payload.len(),
                max: self.config.max_frame_len,
            });
        }

        let mut stream = self.connect().await?;
        send_message(&mut stream, &payload).await?;
        log::debug!("Sent {} byte request to {}", payload.len(), self.config.server);
        Ok(FragmentReader::new(stream))
    }

    /// Tokenize `prompt`, send it, and return the fragment stream.
    ///
    /// # Errors
    /// See [`Client::prepare`] and [`Client::send`].
    pub async fn generate(&self, prompt: &str) -> Result<FragmentReader<TcpStream>> {
        let request = self.prepare(prompt, None)?;
        self.send(&request).await
    }

    /// Generate and collect the whole response, calling `on_fragment` for
    /// each fragment as it arrives.
    ///
    /// # Errors
    /// Returns the first connection, encoding or read error.
    pub async fn generate_to_string<F>(&self, prompt: &str, mut on_fragment: F) -> Result<String>
    where
        F: FnMut(&str),
    {
        let mut reader = self.generate(prompt).await?;
        let mut text = String::new();
        while let Some(fragment) = reader.next_fragment().await? {
            on_fragment(&fragment);
            text.push_str(&fragment);
        }
        Ok(text)
    }

    async fn connect(&self) -> Result<TcpStream> {
        let addr = self.config.server;
        let connect = TcpStream::connect(addr);
        let stream = match self.config.connect_timeout() {
            Some(limit) => tokio::time::timeout(limit, connect).await.map_err(|_| {
                Error::Transport(format!("connecting to {addr} timed out after {limit:?}"))
            })??,
            None => connect.await?,
        };
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}
