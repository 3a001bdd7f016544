//! # Pre-Tokenizer
//!
//! Deterministic regex-equivalent chunking ahead of the BPE encoder. Four
//! pattern variants are carried, one per OpenAI-class pretrained vocabulary
//! family (`r50k_base`, `p50k_base`, `cl100k_base`, `o200k_base`); pattern
//! text and ordering are a direct port of the teacher crate's
//! `pretrained::openai::patterns` table. `cl100k_base`'s pattern is the
//! default: contractions, optional leading punctuation plus a letter run,
//! digit runs capped at three, punctuation runs, and whitespace handling
//! that keeps a trailing space attached to the following non-whitespace run.
//!
//! The chunker yields borrowed byte slices into the input and never
//! allocates; malformed UTF-8 is treated as a sequence of non-letter,
//! non-digit bytes (each matched individually by the whitespace/punctuation
//! fallback arm), since these pattern families are themselves only
//! specified over valid UTF-8.

use fancy_regex::Regex;
use once_cell::sync::Lazy;

const R50K_BASE_PATTERN: &str = concat!(
    r"'(?:[sdmt]|ll|ve|re)",
    "|",
    r" ?\p{L}++",
    "|",
    r" ?\p{N}++",
    "|",
    r" ?[^\s\p{L}\p{N}]++",
    "|",
    r"\s++$",
    "|",
    r"\s+(?!\S)",
    "|",
    r"\s",
);

const CL100K_BASE_PATTERN: &str = concat!(
    r"'(?i:[sdmt]|ll|ve|re)",
    "|",
    r"[^\r\n\p{L}\p{N}]?+\p{L}++",
    "|",
    r"\p{N}{1,3}+",
    "|",
    r" ?[^\s\p{L}\p{N}]++[\r\n]*+",
    "|",
    r"\s++$",
    "|",
    r"\s*[\r\n]",
    "|",
    r"\s+(?!\S)",
    "|",
    r"\s",
);

const O200K_BASE_PATTERN: &str = concat!(
    r"[^\r\n\p{L}\p{N}]?[\p{Lu}\p{Lt}\p{Lm}\p{Lo}\p{M}]*[\p{Ll}\p{Lm}\p{Lo}\p{M}]+(?i:'s|'t|'re|'ve|'m|'ll|'d)?",
    "|",
    r"[^\r\n\p{L}\p{N}]?[\p{Lu}\p{Lt}\p{Lm}\p{Lo}\p{M}]+[\p{Ll}\p{Lm}\p{Lo}\p{M}]*(?i:'s|'t|'re|'ve|'m|'ll|'d)?",
    "|",
    r"\p{N}{1,3}",
    "|",
    r" ?[^\s\p{L}\p{N}]+[\r\n/]*",
    "|",
    r"\s*[\r\n]+",
    "|",
    r"\s+(?!\S)",
    "|",
    r"\s+",
);

/// Which pretrained-family word pattern to chunk with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreTokenizerPattern {
    /// `r50k_base` (and identically, `p50k_base`).
    R50kBase,
    /// `cl100k_base`. The default: the pattern family `gpt-3.5`/`gpt-4`
    /// generation models use.
    #[default]
    Cl100kBase,
    /// `o200k_base`.
    O200kBase,
}

static R50K_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(R50K_BASE_PATTERN).expect("r50k pattern compiles"));
static CL100K_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(CL100K_BASE_PATTERN).expect("cl100k pattern compiles"));
static O200K_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(O200K_BASE_PATTERN).expect("o200k pattern compiles"));

fn regex_for(pattern: PreTokenizerPattern) -> &'static Regex {
    match pattern {
        PreTokenizerPattern::R50kBase => &R50K_REGEX,
        PreTokenizerPattern::Cl100kBase => &CL100K_REGEX,
        PreTokenizerPattern::O200kBase => &O200K_REGEX,
    }
}

/// Splits text into pre-tokenization chunks using a configured word pattern.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreTokenizer {
    pattern: PreTokenizerPattern,
}

impl PreTokenizer {
    /// A pre-tokenizer using the `cl100k_base` pattern.
    pub fn new() -> Self {
        Self::default()
    }

    /// A pre-tokenizer using an explicit pattern family.
    pub fn with_pattern(pattern: PreTokenizerPattern) -> Self {
        Self { pattern }
    }

    /// A lazy, non-allocating iterator over `text`'s chunks.
    pub fn chunks<'t>(&self, text: &'t str) -> ChunkIter<'t> {
        ChunkIter {
            text,
            pos: 0,
            regex: regex_for(self.pattern),
        }
    }
}

/// Lazy chunk iterator; each `next()` call runs one regex match starting at
/// the current byte offset.
pub struct ChunkIter<'t> {
    text: &'t str,
    pos: usize,
    regex: &'static Regex,
}

impl<'t> ChunkIter<'t> {
    /// Next chunk as a borrowed byte slice, or `None` at end of input.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<&'t [u8]> {
        if self.pos >= self.text.len() {
            return None;
        }
        match self.regex.find_from_pos(self.text, self.pos) {
            Ok(Some(m)) if m.end() > self.pos => {
                let slice = &self.text.as_bytes()[m.start()..m.end()];
                self.pos = m.end();
                Some(slice)
            }
            // No pattern matched (or matched empty): fall back to a
            // single-byte chunk so malformed/unmatched input still makes
            // progress instead of looping forever.
            _ => {
                let start = self.pos;
                let mut end = start + 1;
                while !self.text.is_char_boundary(end) {
                    end += 1;
                }
                self.pos = end;
                Some(&self.text.as_bytes()[start..end])
            }
        }
    }
}

impl<'t> Iterator for ChunkIter<'t> {
    type Item = &'t [u8];

    fn next(&mut self) -> Option<Self::Item> {
        ChunkIter::next(self)
    }
}
