//! Subword vocabulary: token string ↔ token id

use std::collections::HashMap;
use std::path::Path;

use crate::{Error, Result};

/// Immutable mapping between token strings and token ids.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    token_to_id: HashMap<String, u32>,
    id_to_token: HashMap<u32, String>,
}

impl Vocabulary {
    /// Build a vocabulary from `(token, id)` entries.
    ///
    /// # Errors
    /// Returns [`Error::Load`] if a token or an id appears twice.
    pub fn from_entries<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let mut token_to_id = HashMap::new();
        let mut id_to_token = HashMap::new();
        for (token, id) in entries {
            let token = token.into();
            if let Some(existing) = id_to_token.get(&id) {
                return Err(Error::Load(format!(
                    "Token id {id} is assigned to both {existing:?} and {token:?}"
                )));
            }
            if token_to_id.insert(token.clone(), id).is_some() {
                return Err(Error::Load(format!("Token {token:?} appears twice")));
            }
            id_to_token.insert(id, token);
        }
        Ok(Self {
            token_to_id,
            id_to_token,
        })
    }

    /// Parse a `vocab.json` document (a JSON object of token → id).
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed or the mapping is not one-to-one.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let map: HashMap<String, u32> = serde_json::from_str(json)
            .map_err(|e| Error::Load(format!("vocab.json: {e}")))?;
        Self::from_entries(map)
    }

    /// Load a `vocab.json` file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Load(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Id of `token`, if present.
    #[must_use]
    pub fn token_id(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    /// Token string for `id`, if present.
    #[must_use]
    pub fn token(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(&id).map(String::as_str)
    }

    /// Whether `token` is in the vocabulary.
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.token_to_id.contains_key(token)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.token_to_id.len()
    }

    /// Whether the vocabulary is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.token_to_id.is_empty()
    }
}
