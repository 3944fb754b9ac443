//! Fixed-length model inputs: padding, truncation and the attention mask

use serde::{Deserialize, Serialize};

/// How [`crate::tokenizer::BpeTokenizer::tokenize`] shapes its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Padding {
    /// Keep the natural length; the mask is all ones.
    #[default]
    None,
    /// Pad or truncate to exactly this many positions.
    MaxLength(usize),
    /// Pad or truncate to the tokenizer's `model_max_length`.
    ModelMaxLength,
}

/// Token ids plus the parallel attention mask (1 = real token, 0 = padding).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenizedInput {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u8>,
}

impl TokenizedInput {
    /// Unpadded input: every position is attended.
    #[must_use]
    pub fn unpadded(input_ids: Vec<u32>) -> Self {
        let attention_mask = vec![1; input_ids.len()];
        Self {
            input_ids,
            attention_mask,
        }
    }

    /// Number of positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    /// Whether there are no positions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    /// Number of real (non-padding) positions.
    #[must_use]
    pub fn num_attended(&self) -> usize {
        self.attention_mask.iter().filter(|&&m| m == 1).count()
    }

    /// Ids of the attended positions, in order.
    pub fn attended_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.input_ids
            .iter()
            .zip(&self.attention_mask)
            .filter(|&(_, &m)| m == 1)
            .map(|(&id, _)| id)
    }
}

/// Pad with `pad_id` or truncate so the result has exactly `max_length` positions.
///
/// The mask is 1 for each original id kept and 0 for each pad appended.
#[must_use]
pub fn pad_or_truncate(mut input_ids: Vec<u32>, max_length: usize, pad_id: u32) -> TokenizedInput {
    let real = input_ids.len().min(max_length);
    input_ids.resize(max_length, pad_id);

    let mut attention_mask = vec![1; real];
    attention_mask.resize(max_length, 0);

    TokenizedInput {
        input_ids,
        attention_mask,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_shorter() {
        let out = pad_or_truncate(vec![5, 6], 4, 0);
        assert_eq!(out.input_ids, vec![5, 6, 0, 0]);
        assert_eq!(out.attention_mask, vec![1, 1, 0, 0]);
    }

    #[test]
    fn test_truncate_longer() {
        let out = pad_or_truncate(vec![1, 2, 3, 4, 5], 3, 9);
        assert_eq!(out.input_ids, vec![1, 2, 3]);
        assert_eq!(out.attention_mask, vec![1, 1, 1]);
    }

    #[test]
    fn test_exact_length() {
        let out = pad_or_truncate(vec![7, 8], 2, 0);
        assert_eq!(out.input_ids, vec![7, 8]);
        assert_eq!(out.attention_mask, vec![1, 1]);
    }

    #[test]
    fn test_length_and_mask_sum_invariant() {
        let pad = 50_256;
        for original in 0..12usize {
            let ids: Vec<u32> = (0..original as u32).collect();
            for max_length in 1..10usize {
                let out = pad_or_truncate(ids.clone(), max_length, pad);
                assert_eq!(out.len(), max_length);
                assert_eq!(out.attention_mask.len(), max_length);
                assert_eq!(out.num_attended(), original.min(max_length));
            }
        }
    }

    #[test]
    fn test_attended_ids_skip_padding() {
        let out = pad_or_truncate(vec![3, 4], 5, 0);
        assert_eq!(out.attended_ids().collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(TokenizedInput::unpadded(vec![1, 2]).num_attended(), 2);
    }
}
