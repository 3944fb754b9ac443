//! Wire payload types
//!
//! Hand-rolled serde structs carried as JSON inside the request frame.

use serde::{Deserialize, Serialize};

use splitlm::{Error, GenerationConfig, GenerationInput, HiddenStates, Result, TokenizedInput};

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// The single message a client sends per connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden_states: Option<HiddenStates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<GenerationOverrides>,
}

/// Per-request generation settings. Unset fields keep the server's values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOverrides {
    #[serde(default)]
    pub max_new_tokens: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl InferenceRequest {
    #[must_use]
    pub fn from_tokens(tokens: TokenizedInput) -> Self {
        Self {
            input_ids: tokens.input_ids,
            attention_mask: tokens.attention_mask,
            hidden_states: None,
            generation: None,
        }
    }

    #[must_use]
    pub fn with_hidden_states(mut self, hidden_states: HiddenStates) -> Self {
        self.hidden_states = Some(hidden_states);
        self
    }

    #[must_use]
    pub fn with_generation(mut self, overrides: GenerationOverrides) -> Self {
        self.generation = Some(overrides);
        self
    }

    /// Check the structural invariants of the payload.
    ///
    /// # Errors
    /// Returns [`Error::Payload`] if ids and mask differ in length, a mask
    /// value is not 0 or 1, or the hidden-state shape is inconsistent.
    pub fn validate(&self) -> Result<()> {
        if self.input_ids.len() != self.attention_mask.len() {
            return Err(Error::Payload(format!(
                "{} input ids but {} mask values",
                self.input_ids.len(),
                self.attention_mask.len()
            )));
        }
        if let Some(bad) = self.attention_mask.iter().find(|&&m| m > 1) {
            return Err(Error::Payload(format!("attention mask value {bad}")));
        }
        if let Some(states) = &self.hidden_states {
            states.validate()?;
        }
        Ok(())
    }

    /// Serialize for [`crate::framing::send_message`].
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse and validate a received frame.
    ///
    /// # Errors
    /// Returns [`Error::Payload`] if the bytes are not a valid request.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let request: Self =
            serde_json::from_slice(bytes).map_err(|e| Error::Payload(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    /// Resolve the effective generation settings against the server's.
    ///
    /// `max_new_tokens` can only be lowered.
    #[must_use]
    pub fn generation_config(&self, server: &GenerationConfig) -> GenerationConfig {
        let mut config = server.clone();
        if let Some(o) = &self.generation {
            if let Some(n) = o.max_new_tokens {
                config.max_new_tokens = n.min(server.max_new_tokens);
            }
            if let Some(t) = o.temperature.filter(|t| t.is_finite() && *t > 0.0) {
                config.temperature = t;
            }
            if let Some(k) = o.top_k.filter(|&k| k > 0) {
                config.top_k = k;
            }
            if o.seed.is_some() {
                config.seed = o.seed;
            }
        }
        config
    }

    /// Split into the generation input, dropping the overrides.
    #[must_use]
    pub fn into_input(self) -> GenerationInput {
        GenerationInput {
            input_ids: self.input_ids,
            attention_mask: self.attention_mask,
            hidden_states: self.hidden_states,
        }
    }
}
