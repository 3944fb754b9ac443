//! Pre-segmentation of raw text into independently merged chunks
//!
//! Special token strings are split out first (longest match wins), then the
//! remaining text is cut with the byte-level lexical pattern.

use fancy_regex::Regex;

use crate::{Error, Result};

/// The byte-level BPE word pattern: contractions, letter runs, digit runs,
/// other symbol runs (each optionally led by one space), then whitespace.
pub const WORD_PATTERN: &str =
    r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+";

/// One pre-tokenized piece of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Ordinary text, to be byte-mapped and merged.
    Text(&'a str),
    /// A declared special token, looked up verbatim.
    Special(&'a str),
}

impl<'a> Segment<'a> {
    /// The underlying text.
    #[must_use]
    pub fn as_str(&self) -> &'a str {
        match self {
            Segment::Text(s) | Segment::Special(s) => s,
        }
    }
}

/// Splits text into [`Segment`]s.
#[derive(Debug, Clone)]
pub struct PreTokenizer {
    word_re: Regex,
    special_re: Option<Regex>,
}

impl PreTokenizer {
    /// Build a pre-tokenizer with the given word pattern and special tokens.
    ///
    /// # Errors
    /// Returns [`Error::Load`] if either pattern fails to compile.
    pub fn new<S: AsRef<str>>(word_pattern: &str, specials: &[S]) -> Result<Self> {
        let word_re = Regex::new(word_pattern)
            .map_err(|e| Error::Load(format!("Invalid word pattern: {e}")))?;

        let mut specials: Vec<&str> = specials
            .iter()
            .map(AsRef::as_ref)
            .filter(|s| !s.is_empty())
            .collect();
        // Longest first, so a special that prefixes another cannot shadow it.
        specials.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        specials.dedup();

        let special_re = if specials.is_empty() {
            None
        } else {
            let alts: Vec<_> = specials.iter().map(|s| fancy_regex::escape(s)).collect();
            let pattern = format!("({})", alts.join("|"));
            Some(
                Regex::new(&pattern)
                    .map_err(|e| Error::Load(format!("Invalid special token pattern: {e}")))?,
            )
        };

        Ok(Self {
            word_re,
            special_re,
        })
    }

    /// Pre-tokenizer with the standard byte-level word pattern.
    ///
    /// # Errors
    /// Returns an error if a special token pattern fails to compile.
    pub fn byte_level<S: AsRef<str>>(specials: &[S]) -> Result<Self> {
        Self::new(WORD_PATTERN, specials)
    }

    /// Split `text` into segments, preserving order and covering all of it.
    ///
    /// # Errors
    /// Returns [`Error::PreTokenize`] if the regex engine gives up (e.g. the
    /// backtracking limit is hit).
    pub fn split<'a>(&self, text: &'a str) -> Result<Vec<Segment<'a>>> {
        let mut segments = Vec::new();
        let mut cursor = 0;

        if let Some(special_re) = &self.special_re {
            for m in special_re.find_iter(text) {
                let m = m.map_err(|e| Error::PreTokenize(e.to_string()))?;
                self.split_words(&text[cursor..m.start()], &mut segments)?;
                segments.push(Segment::Special(m.as_str()));
                cursor = m.end();
            }
        }
        self.split_words(&text[cursor..], &mut segments)?;

        Ok(segments)
    }

    /// Whitespace runs are cut here rather than by the regex, whose
    /// backtracking stack grows with the run length. A run followed by more
    /// text yields everything but its last character; a trailing space then
    /// leads the next word, any other last character stands alone. The regex
    /// only ever sees one non-whitespace span with at most one leading space.
    fn split_words<'a>(&self, text: &'a str, out: &mut Vec<Segment<'a>>) -> Result<()> {
        let mut rest = text;
        while !rest.is_empty() {
            let run_len = rest
                .find(|c: char| !c.is_whitespace())
                .unwrap_or(rest.len());
            if run_len == rest.len() {
                out.push(Segment::Text(rest));
                break;
            }
            if let Some(last) = rest[..run_len].chars().next_back() {
                let last_start = run_len - last.len_utf8();
                if last_start > 0 {
                    out.push(Segment::Text(&rest[..last_start]));
                }
                if last == ' ' {
                    rest = &rest[last_start..];
                } else {
                    out.push(Segment::Text(&rest[last_start..run_len]));
                    rest = &rest[run_len..];
                }
            }

            let lead = usize::from(rest.starts_with(' '));
            let span_len = rest[lead..]
                .find(char::is_whitespace)
                .map_or(rest.len(), |i| lead + i);
            let (span, tail) = rest.split_at(span_len);
            self.split_span(span, out)?;
            rest = tail;
        }
        Ok(())
    }

    fn split_span<'a>(&self, span: &'a str, out: &mut Vec<Segment<'a>>) -> Result<()> {
        for m in self.word_re.find_iter(span) {
            let m = m.map_err(|e| Error::PreTokenize(e.to_string()))?;
            out.push(Segment::Text(m.as_str()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(text: &str) -> Vec<String> {
        PreTokenizer::byte_level::<&str>(&[])
            .unwrap()
            .split(text)
            .unwrap()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect()
    }

    #[test]
    fn test_contractions_and_leading_spaces() {
        assert_eq!(
            words("I'll say it's 42!"),
            vec!["I", "'ll", " say", " it", "'s", " 42", "!"]
        );
    }

    #[test]
    fn test_whitespace_runs() {
        // The run keeps its last space for the following word.
        assert_eq!(words("a   b"), vec!["a", "  ", " b"]);
        // Trailing whitespace is its own chunk.
        assert_eq!(words("a  "), vec!["a", "  "]);
        assert_eq!(words("a\n\nb"), vec!["a", "\n", "\n", "b"]);
    }

    #[test]
    fn test_segments_cover_input() {
        let text = "Hello,  wörld\t 123 ... don't";
        assert_eq!(words(text).concat(), text);
    }

    #[test]
    fn test_special_tokens_split_first() {
        let pre = PreTokenizer::byte_level(&["<|endoftext|>"]).unwrap();
        let segments = pre.split("hi<|endoftext|> there").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Text("hi"),
                Segment::Special("<|endoftext|>"),
                Segment::Text(" there"),
            ]
        );
    }

    #[test]
    fn test_longest_special_wins() {
        let pre = PreTokenizer::byte_level(&["<a>", "<a><b>"]).unwrap();
        let segments = pre.split("<a><b><a>").unwrap();
        assert_eq!(
            segments,
            vec![Segment::Special("<a><b>"), Segment::Special("<a>")]
        );
    }

    #[test]
    fn test_mixed_whitespace_runs() {
        assert_eq!(words("a\t \nb"), vec!["a", "\t ", "\n", "b"]);
        assert_eq!(words("a\n b"), vec!["a", "\n", " b"]);
        assert_eq!(words(" x"), vec![" x"]);
        assert_eq!(words("\tx"), vec!["\t", "x"]);
        assert_eq!(words("x \u{3000}y"), vec!["x", " ", "\u{3000}", "y"]);
    }

    #[test]
    fn test_matches_plain_pattern() {
        let pre = PreTokenizer::byte_level::<&str>(&[]).unwrap();
        let plain = Regex::new(WORD_PATTERN).unwrap();
        for text in [
            "Hello,  wörld\t 123 ... don't",
            "  leading and trailing  ",
            "\n\n\nparagraph\r\n next",
            "a \t \n \t b",
            " 's  've\n'll",
            "tabs\t\tand  spaces \u{a0}nbsp",
            "😀 emoji  👋x",
            " ",
            "\n",
        ] {
            let expected: Vec<&str> = plain
                .find_iter(text)
                .map(|m| m.unwrap().as_str())
                .collect();
            let got: Vec<&str> = pre.split(text).unwrap().iter().map(Segment::as_str).collect();
            assert_eq!(got, expected, "{text:?}");
        }
    }

    #[test]
    fn test_long_whitespace_run() {
        let text = format!("a{}b", " ".repeat(2_000_000));
        let got = words(&text);
        assert_eq!(got.len(), 3);
        assert_eq!(got[1].len(), 1_999_999);
        assert_eq!(got[2], " b");

        let mixed = format!("x{}y", "\t \n".repeat(500_000));
        let got = words(&mixed);
        assert_eq!(got.concat(), mixed);
        assert_eq!(got.last().map(String::as_str), Some("y"));
    }

    #[test]
    fn test_empty_text() {
        assert!(words("").is_empty());
    }
}
