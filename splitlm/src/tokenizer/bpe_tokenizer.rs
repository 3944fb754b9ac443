//! Byte-level BPE tokenizer
//!
//! Loads a `vocab.json` / `merges.txt` pair (plus optional special-token and
//! tokenizer config files) and implements greedy lowest-rank BPE over the
//! byte-symbol alphabet.

use std::collections::HashSet;
use std::path::Path;

use super::byte_symbols::ByteSymbolMap;
use super::encoding::{pad_or_truncate, Padding, TokenizedInput};
use super::merges::MergeTable;
use super::pre_tokenizer::{PreTokenizer, Segment};
use super::special_tokens::{SpecialTokens, TokenizerConfig};
use super::vocab::Vocabulary;
use crate::{Error, Result};

/// File names expected by [`BpeTokenizer::from_pretrained`].
pub const VOCAB_FILE: &str = "vocab.json";
pub const MERGES_FILE: &str = "merges.txt";
pub const SPECIAL_TOKENS_FILE: &str = "special_tokens_map.json";
pub const TOKENIZER_CONFIG_FILE: &str = "tokenizer_config.json";

/// A byte-level BPE tokenizer over immutable, mutually consistent tables.
///
/// Encoding and decoding are pure functions of the input and the tables, so a
/// single instance can be shared across threads.
#[derive(Debug, Clone)]
pub struct BpeTokenizer {
    vocab: Vocabulary,
    merges: MergeTable,
    byte_symbols: ByteSymbolMap,
    pre_tokenizer: PreTokenizer,
    special_tokens: SpecialTokens,
    special_ids: HashSet<u32>,
    eos_token_id: u32,
    pad_token_id: u32,
    model_max_length: usize,
}

impl BpeTokenizer {
    /// Load a tokenizer from a directory of assets.
    ///
    /// `vocab.json` and `merges.txt` are required. `special_tokens_map.json`
    /// and `tokenizer_config.json` are optional and fall back to defaults.
    ///
    /// # Errors
    /// Returns [`Error::Load`] if a required file is missing or any file is
    /// malformed. No partially loaded tokenizer is ever returned.
    pub fn from_pretrained(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();

        let vocab = Vocabulary::from_file(dir.join(VOCAB_FILE))?;
        let merges = MergeTable::from_file(dir.join(MERGES_FILE))?;

        let specials_path = dir.join(SPECIAL_TOKENS_FILE);
        let special_tokens = if specials_path.exists() {
            SpecialTokens::from_file(&specials_path)?
        } else {
            log::debug!("No {SPECIAL_TOKENS_FILE} in {}, using defaults", dir.display());
            SpecialTokens::default()
        };

        let config_path = dir.join(TOKENIZER_CONFIG_FILE);
        let config = if config_path.exists() {
            TokenizerConfig::from_file(&config_path)?
        } else {
            log::debug!("No {TOKENIZER_CONFIG_FILE} in {}, using defaults", dir.display());
            TokenizerConfig::default()
        };

        let tokenizer = Self::from_parts(vocab, merges, special_tokens, &config)?;
        log::info!(
            "Loaded tokenizer from {}: {} tokens, {} merges, max length {}",
            dir.display(),
            tokenizer.vocab_size(),
            tokenizer.merges.len(),
            tokenizer.model_max_length
        );
        Ok(tokenizer)
    }

    /// Assemble a tokenizer from already loaded tables.
    ///
    /// # Errors
    /// Returns [`Error::Load`] if the eos or pad token is not in the vocabulary.
    pub fn from_parts(
        vocab: Vocabulary,
        merges: MergeTable,
        special_tokens: SpecialTokens,
        config: &TokenizerConfig,
    ) -> Result<Self> {
        let require = |token: &str, role: &str| {
            vocab.token_id(token).ok_or_else(|| {
                Error::Load(format!("{role} token {token:?} is not in the vocabulary"))
            })
        };
        let eos_token_id = require(&special_tokens.eos_token, "eos")?;
        let pad_token_id = require(&special_tokens.pad_token, "pad")?;

        let mut specials = Vec::new();
        let mut special_ids = HashSet::new();
        for token in special_tokens.all() {
            match vocab.token_id(token) {
                Some(id) => {
                    specials.push(token);
                    special_ids.insert(id);
                }
                None => log::warn!("Special token {token:?} is not in the vocabulary, ignoring"),
            }
        }
        let pre_tokenizer = PreTokenizer::byte_level(specials.as_slice())?;

        let dangling = merges
            .pairs()
            .filter(|(l, r)| !vocab.contains(&format!("{l}{r}")))
            .count();
        if dangling > 0 {
            log::warn!("{dangling} merges produce symbols missing from the vocabulary");
        }

        Ok(Self {
            vocab,
            merges,
            byte_symbols: ByteSymbolMap::new(),
            pre_tokenizer,
            special_tokens,
            special_ids,
            eos_token_id,
            pad_token_id,
            model_max_length: config.model_max_length,
        })
    }

    /// Encode text into token ids.
    ///
    /// # Errors
    /// Returns [`Error::UnknownSymbol`] if a fully merged symbol is not in the
    /// vocabulary (the vocabulary and merge table disagree), or
    /// [`Error::PreTokenize`] if segmentation fails.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let mut ids = Vec::new();
        for segment in self.pre_tokenizer.split(text)? {
            match segment {
                Segment::Special(token) => {
                    let id = self.vocab.token_id(token).ok_or_else(|| Error::UnknownSymbol {
                        symbol: token.to_string(),
                    })?;
                    ids.push(id);
                }
                Segment::Text(chunk) => {
                    for symbol in self.bpe(chunk) {
                        let id = self
                            .vocab
                            .token_id(&symbol)
                            .ok_or(Error::UnknownSymbol { symbol })?;
                        ids.push(id);
                    }
                }
            }
        }
        Ok(ids)
    }

    /// Run the merge loop over one pre-tokenized chunk and return the merged symbols.
    #[must_use]
    pub fn bpe(&self, chunk: &str) -> Vec<String> {
        let symbols = self
            .byte_symbols
            .symbols(chunk.as_bytes())
            .map(String::from)
            .collect();
        self.merge_symbols(symbols)
    }

    /// Repeatedly merge every occurrence of the lowest-ranked adjacent pair.
    fn merge_symbols(&self, mut word: Vec<String>) -> Vec<String> {
        while word.len() > 1 {
            let best = word
                .windows(2)
                .filter_map(|pair| Some((self.merges.rank(&pair[0], &pair[1])?, pair)))
                .min_by_key(|&(rank, _)| rank)
                .map(|(_, pair)| (pair[0].clone(), pair[1].clone()));
            let Some((left, right)) = best else {
                break;
            };

            let merged = format!("{left}{right}");
            let mut next = Vec::with_capacity(word.len());
            let mut i = 0;
            while i < word.len() {
                if i + 1 < word.len() && word[i] == left && word[i + 1] == right {
                    next.push(merged.clone());
                    i += 2;
                } else {
                    next.push(std::mem::take(&mut word[i]));
                    i += 1;
                }
            }
            word = next;
        }
        word
    }

    /// Encode and shape the result according to `padding`.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn tokenize(&self, text: &str, padding: Padding) -> Result<TokenizedInput> {
        let ids = self.encode(text)?;
        Ok(match padding {
            Padding::None => TokenizedInput::unpadded(ids),
            Padding::MaxLength(max_length) => pad_or_truncate(ids, max_length, self.pad_token_id),
            Padding::ModelMaxLength => {
                pad_or_truncate(ids, self.model_max_length, self.pad_token_id)
            }
        })
    }

    /// Decode token ids to text, keeping special tokens.
    ///
    /// # Errors
    /// Returns [`Error::UnknownTokenId`] for an id outside the vocabulary.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.decode_with(ids, false)
    }

    /// Decode token ids to text.
    ///
    /// Byte sequences that are not valid UTF-8 (for example an id sequence
    /// that stops in the middle of a multi-byte character) decode to U+FFFD.
    ///
    /// # Errors
    /// Returns [`Error::UnknownTokenId`] for an id outside the vocabulary.
    pub fn decode_with(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        let bytes = self.decode_bytes(ids, skip_special_tokens)?;
        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    /// Decode token ids to the raw byte sequence they stand for.
    ///
    /// # Errors
    /// Returns [`Error::UnknownTokenId`] for an id outside the vocabulary, or
    /// [`Error::Tokenizer`] if a token contains a non byte-level symbol.
    pub fn decode_bytes(&self, ids: &[u32], skip_special_tokens: bool) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        for &id in ids {
            let token = self.vocab.token(id).ok_or(Error::UnknownTokenId(id))?;
            if self.special_ids.contains(&id) {
                if !skip_special_tokens {
                    bytes.extend_from_slice(token.as_bytes());
                }
            } else {
                self.byte_symbols.decode_into(token, &mut bytes)?;
            }
        }
        Ok(bytes)
    }

    /// Decode a single token id.
    ///
    /// # Errors
    /// Returns [`Error::UnknownTokenId`] for an id outside the vocabulary.
    pub fn decode_token(&self, id: u32) -> Result<String> {
        self.decode(&[id])
    }

    /// Pad or truncate already encoded ids with this tokenizer's pad token.
    #[must_use]
    pub fn pad(&self, ids: Vec<u32>, max_length: usize) -> TokenizedInput {
        pad_or_truncate(ids, max_length, self.pad_token_id)
    }

    /// Get the EOS token ID
    #[must_use]
    pub fn eos_token_id(&self) -> u32 {
        self.eos_token_id
    }

    /// Get the padding token ID
    #[must_use]
    pub fn pad_token_id(&self) -> u32 {
        self.pad_token_id
    }

    /// Whether `id` is one of the declared special tokens.
    #[must_use]
    pub fn is_special(&self, id: u32) -> bool {
        self.special_ids.contains(&id)
    }

    /// Default fixed length used by [`Padding::ModelMaxLength`].
    #[must_use]
    pub fn model_max_length(&self) -> usize {
        self.model_max_length
    }

    /// Get the vocabulary size
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    #[must_use]
    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    #[must_use]
    pub fn merges(&self) -> &MergeTable {
        &self.merges
    }

    #[must_use]
    pub fn special_tokens(&self) -> &SpecialTokens {
        &self.special_tokens
    }
}

impl super::Tokenizer for BpeTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        BpeTokenizer::encode(self, text)
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        BpeTokenizer::decode(self, ids)
    }

    fn decode_with(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        BpeTokenizer::decode_with(self, ids, skip_special_tokens)
    }

    fn eos_token_id(&self) -> u32 {
        self.eos_token_id
    }

    fn pad_token_id(&self) -> u32 {
        self.pad_token_id
    }

    fn is_special(&self, id: u32) -> bool {
        BpeTokenizer::is_special(self, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::DEFAULT_SPECIAL_TOKEN;

    const EOS_ID: u32 = 1000;

    fn make_tokenizer(tokens: &[(&str, u32)], merges: &[(&str, &str)]) -> BpeTokenizer {
        let mut entries: Vec<(String, u32)> =
            tokens.iter().map(|&(t, id)| (t.to_string(), id)).collect();
        entries.push((DEFAULT_SPECIAL_TOKEN.to_string(), EOS_ID));
        let vocab = Vocabulary::from_entries(entries).unwrap();
        let merges = MergeTable::from_pairs(merges.iter().copied()).unwrap();
        BpeTokenizer::from_parts(
            vocab,
            merges,
            SpecialTokens::default(),
            &TokenizerConfig { model_max_length: 8 },
        )
        .unwrap()
    }

    /// All 256 byte symbols (ids 0..=255) plus one token per merge.
    fn byte_level_tokenizer(merges: &[(&str, &str)]) -> BpeTokenizer {
        let map = ByteSymbolMap::new();
        let mut tokens: Vec<(String, u32)> = (0u8..=255)
            .map(|b| (map.symbol(b).to_string(), u32::from(b)))
            .collect();
        for (i, (l, r)) in merges.iter().enumerate() {
            tokens.push((format!("{l}{r}"), 256 + i as u32));
        }
        let borrowed: Vec<(&str, u32)> = tokens.iter().map(|(t, id)| (t.as_str(), *id)).collect();
        make_tokenizer(&borrowed, merges)
    }

    #[test]
    fn test_single_merge_scenario() {
        let tok = make_tokenizer(&[("a", 0), ("b", 1), ("ab", 2)], &[("a", "b")]);
        assert_eq!(tok.encode("ab").unwrap(), vec![2]);
    }

    #[test]
    fn test_lower_rank_merges_first() {
        let tok = make_tokenizer(
            &[("a", 0), ("b", 1), ("c", 2), ("ab", 3), ("bc", 4)],
            &[("a", "b"), ("b", "c")],
        );
        assert_eq!(tok.bpe("abc"), vec!["ab", "c"]);
        assert_eq!(tok.encode("abc").unwrap(), vec![3, 2]);

        // Same table, reversed priority.
        let tok = make_tokenizer(
            &[("a", 0), ("b", 1), ("c", 2), ("ab", 3), ("bc", 4)],
            &[("b", "c"), ("a", "b")],
        );
        assert_eq!(tok.encode("abc").unwrap(), vec![0, 4]);
    }

    #[test]
    fn test_all_occurrences_merged_in_one_pass() {
        let tok = make_tokenizer(&[("a", 0), ("b", 1), ("ab", 2)], &[("a", "b")]);
        assert_eq!(tok.encode("abab").unwrap(), vec![2, 2]);

        let tok = make_tokenizer(&[("a", 0), ("aa", 1)], &[("a", "a")]);
        // Non-overlapping, left to right.
        assert_eq!(tok.bpe("aaa"), vec!["aa", "a"]);
    }

    #[test]
    fn test_merges_chain_until_single_symbol() {
        let tok = byte_level_tokenizer(&[("Ġ", "t"), ("h", "e"), ("Ġt", "he")]);
        assert_eq!(tok.bpe(" the"), vec!["Ġthe"]);
        assert_eq!(tok.encode(" the").unwrap(), vec![258]);
    }

    #[test]
    fn test_chunks_never_merge_across_boundaries() {
        // "a" and " b" are separate chunks, so the (a, Ġ) merge cannot apply.
        let tok = byte_level_tokenizer(&[("a", "Ġ")]);
        let ids = tok.encode("a b").unwrap();
        assert_eq!(ids, vec![u32::from(b'a'), u32::from(b' '), u32::from(b'b')]);
    }

    #[test]
    fn test_unknown_symbol_is_error() {
        // The merge produces "ab", which the vocabulary lacks.
        let tok = make_tokenizer(&[("a", 0), ("b", 1)], &[("a", "b")]);
        let err = tok.encode("ab").unwrap_err();
        assert!(matches!(err, Error::UnknownSymbol { ref symbol } if symbol == "ab"));
    }

    #[test]
    fn test_roundtrip_printable_and_unicode() {
        let tok = byte_level_tokenizer(&[("Ġ", "t"), ("h", "e"), ("Ġt", "he"), ("l", "l")]);
        for text in [
            "Hello there, the world!",
            "  leading and trailing  ",
            "tabs\tand\nnewlines\n\n",
            "naïve café, 東京, emoji 🚀",
            "it's 2024; don't panic",
            "",
        ] {
            let ids = tok.encode(text).unwrap();
            assert_eq!(tok.decode(&ids).unwrap(), text, "roundtrip of {text:?}");
        }
    }

    #[test]
    fn test_long_whitespace_runs_roundtrip() {
        let tok = byte_level_tokenizer(&[("Ġ", "t"), ("h", "e")]);
        let text = format!("a{}b", " ".repeat(2_000_000));
        let ids = tok.encode(&text).unwrap();
        assert_eq!(ids.len(), 2_000_002);
        assert_eq!(tok.decode(&ids).unwrap(), text);

        let mixed = format!("the{}end", "\t \n".repeat(100_000));
        let ids = tok.encode(&mixed).unwrap();
        assert_eq!(tok.decode(&ids).unwrap(), mixed);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let tok = byte_level_tokenizer(&[("Ġ", "t"), ("h", "e")]);
        let text = "the theory of the thing";
        assert_eq!(tok.encode(text).unwrap(), tok.encode(text).unwrap());
    }

    #[test]
    fn test_special_token_in_text() {
        let tok = byte_level_tokenizer(&[]);
        let ids = tok.encode("a<|endoftext|>b").unwrap();
        assert_eq!(ids, vec![u32::from(b'a'), EOS_ID, u32::from(b'b')]);
        assert_eq!(tok.decode(&ids).unwrap(), "a<|endoftext|>b");
        assert_eq!(tok.decode_with(&ids, true).unwrap(), "ab");
        assert!(tok.is_special(EOS_ID));
    }

    #[test]
    fn test_decode_unknown_id_is_error() {
        let tok = byte_level_tokenizer(&[]);
        assert!(matches!(
            tok.decode(&[5000]).unwrap_err(),
            Error::UnknownTokenId(5000)
        ));
    }

    #[test]
    fn test_decode_partial_character_is_replaced() {
        let tok = byte_level_tokenizer(&[]);
        let ids = tok.encode("é").unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(tok.decode(&ids[..1]).unwrap(), "\u{FFFD}");
        assert_eq!(tok.decode_bytes(&ids[..1], false).unwrap(), vec![0xC3]);
    }

    #[test]
    fn test_tokenize_padding_modes() {
        let tok = make_tokenizer(&[("a", 0), ("b", 1), ("ab", 2)], &[("a", "b")]);

        let out = tok.tokenize("ab a", Padding::None);
        assert!(out.is_err(), "space symbol is missing from this vocabulary");

        let out = tok.tokenize("abab", Padding::MaxLength(4)).unwrap();
        assert_eq!(out.input_ids, vec![2, 2, EOS_ID, EOS_ID]);
        assert_eq!(out.attention_mask, vec![1, 1, 0, 0]);

        let out = tok.tokenize("ab", Padding::ModelMaxLength).unwrap();
        assert_eq!(out.len(), 8);
        assert_eq!(out.num_attended(), 1);

        let out = tok.tokenize("abab", Padding::MaxLength(1)).unwrap();
        assert_eq!(out.input_ids, vec![2]);
        assert_eq!(out.attention_mask, vec![1]);
    }

    #[test]
    fn test_missing_eos_rejected() {
        let vocab = Vocabulary::from_entries([("a", 0)]).unwrap();
        let err = BpeTokenizer::from_parts(
            vocab,
            MergeTable::default(),
            SpecialTokens::default(),
            &TokenizerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Load(_)));
    }
}
