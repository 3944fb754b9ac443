//! Ordered BPE merge table
//!
//! A merge's rank is its position in `merges.txt`; lower ranks merge first.

use std::collections::HashMap;
use std::path::Path;

use crate::{Error, Result};

/// Ordered list of mergeable symbol pairs.
#[derive(Debug, Clone, Default)]
pub struct MergeTable {
    /// left → right → rank
    ranks: HashMap<String, HashMap<String, u32>>,
    pairs: Vec<(String, String)>,
}

impl MergeTable {
    /// Build a table from pairs in priority order.
    ///
    /// A pair listed more than once keeps the rank of its first occurrence.
    ///
    /// # Errors
    /// Returns [`Error::Load`] if there are more than `u32::MAX` merges.
    pub fn from_pairs<I, L, R>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (L, R)>,
        L: Into<String>,
        R: Into<String>,
    {
        let mut table = Self::default();
        for (left, right) in pairs {
            let rank = u32::try_from(table.pairs.len())
                .map_err(|_| Error::Load("Too many merges".into()))?;
            let (left, right) = (left.into(), right.into());
            let by_right = table.ranks.entry(left.clone()).or_default();
            if by_right.contains_key(&right) {
                log::debug!("Ignoring repeated merge {left:?} {right:?}");
                continue;
            }
            by_right.insert(right.clone(), rank);
            table.pairs.push((left, right));
        }
        Ok(table)
    }

    /// Parse `merges.txt` content.
    ///
    /// Lines starting with `#version` and blank lines are skipped; every other
    /// line must hold exactly two whitespace-separated symbols.
    ///
    /// # Errors
    /// Returns [`Error::Load`] naming the first malformed line.
    pub fn parse(text: &str) -> Result<Self> {
        let mut pairs = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("#version") {
                continue;
            }
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(left), Some(right), None) => pairs.push((left, right)),
                _ => {
                    return Err(Error::Load(format!(
                        "merges.txt line {}: expected two symbols, got {line:?}",
                        lineno + 1
                    )))
                }
            }
        }
        Self::from_pairs(pairs)
    }

    /// Load a `merges.txt` file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Load(format!("{}: {e}", path.display())))?;
        Self::parse(&text)
    }

    /// Rank of the pair `(left, right)`, or `None` if it is unmergeable.
    #[must_use]
    pub fn rank(&self, left: &str, right: &str) -> Option<u32> {
        self.ranks.get(left)?.get(right).copied()
    }

    /// Pairs in rank order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(l, r)| (l.as_str(), r.as_str()))
    }

    /// Number of merges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the table has no merges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
