//! Special-token declarations and tokenizer configuration files
//!
//! Hand-rolled serde structs for `special_tokens_map.json` and
//! `tokenizer_config.json`.

use std::path::Path;

use serde::Deserialize;

use crate::{Error, Result};

/// Fallback for every special token, as used by byte-level GPT-style vocabularies.
pub const DEFAULT_SPECIAL_TOKEN: &str = "<|endoftext|>";

/// Default `model_max_length` when the config omits it.
pub const DEFAULT_MODEL_MAX_LENGTH: usize = 1024;

/// A special token entry: either a bare string or an object with `content`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SpecialTokenEntry {
    Plain(String),
    Detailed { content: String },
}

impl SpecialTokenEntry {
    fn into_content(self) -> String {
        match self {
            Self::Plain(s) | Self::Detailed { content: s } => s,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SpecialTokensFile {
    #[serde(default)]
    bos_token: Option<SpecialTokenEntry>,
    #[serde(default)]
    eos_token: Option<SpecialTokenEntry>,
    #[serde(default)]
    unk_token: Option<SpecialTokenEntry>,
    #[serde(default)]
    pad_token: Option<SpecialTokenEntry>,
}

/// The special token strings of a tokenizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialTokens {
    pub bos_token: String,
    pub eos_token: String,
    pub unk_token: String,
    /// Padding token; byte-level GPT vocabularies reuse the eos token.
    pub pad_token: String,
}

impl Default for SpecialTokens {
    fn default() -> Self {
        Self {
            bos_token: DEFAULT_SPECIAL_TOKEN.to_string(),
            eos_token: DEFAULT_SPECIAL_TOKEN.to_string(),
            unk_token: DEFAULT_SPECIAL_TOKEN.to_string(),
            pad_token: DEFAULT_SPECIAL_TOKEN.to_string(),
        }
    }
}

impl SpecialTokens {
    /// Parse a `special_tokens_map.json` document.
    ///
    /// # Errors
    /// Returns [`Error::Load`] if the JSON is malformed.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: SpecialTokensFile = serde_json::from_str(json)
            .map_err(|e| Error::Load(format!("special_tokens_map.json: {e}")))?;

        let or_default = |entry: Option<SpecialTokenEntry>| {
            entry.map_or_else(|| DEFAULT_SPECIAL_TOKEN.to_string(), SpecialTokenEntry::into_content)
        };
        let eos_token = or_default(file.eos_token);
        let pad_token = file
            .pad_token
            .map_or_else(|| eos_token.clone(), SpecialTokenEntry::into_content);

        Ok(Self {
            bos_token: or_default(file.bos_token),
            eos_token,
            unk_token: or_default(file.unk_token),
            pad_token,
        })
    }

    /// Load a `special_tokens_map.json` file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Load(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Distinct special token strings.
    #[must_use]
    pub fn all(&self) -> Vec<&str> {
        let mut tokens = vec![
            self.bos_token.as_str(),
            self.eos_token.as_str(),
            self.unk_token.as_str(),
            self.pad_token.as_str(),
        ];
        tokens.sort_unstable();
        tokens.dedup();
        tokens
    }
}

#[derive(Debug, Default, Deserialize)]
struct TokenizerConfigFile {
    #[serde(default)]
    model_max_length: Option<f64>,
}

/// Settings from `tokenizer_config.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizerConfig {
    /// Default fixed sequence length for padding/truncation.
    pub model_max_length: usize,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            model_max_length: DEFAULT_MODEL_MAX_LENGTH,
        }
    }
}

impl TokenizerConfig {
    /// Parse a `tokenizer_config.json` document.
    ///
    /// Some configs store "unbounded" as a huge float (e.g. `1e30`); such
    /// values fall back to [`DEFAULT_MODEL_MAX_LENGTH`].
    ///
    /// # Errors
    /// Returns [`Error::Load`] if the JSON is malformed.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: TokenizerConfigFile = serde_json::from_str(json)
            .map_err(|e| Error::Load(format!("tokenizer_config.json: {e}")))?;

        let model_max_length = match file.model_max_length {
            None => DEFAULT_MODEL_MAX_LENGTH,
            Some(v) if v.is_finite() && v >= 1.0 && v <= f64::from(u32::MAX) => v as usize,
            Some(v) => {
                log::warn!(
                    "model_max_length {v} is not a usable length, using {DEFAULT_MODEL_MAX_LENGTH}"
                );
                DEFAULT_MODEL_MAX_LENGTH
            }
        };

        Ok(Self { model_max_length })
    }

    /// Load a `tokenizer_config.json` file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Load(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }
}
