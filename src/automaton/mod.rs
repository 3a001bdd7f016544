//! # Double-Array Aho-Corasick Automaton
//!
//! A from-scratch double-array Aho-Corasick automaton over the vocabulary,
//! built in three passes (trie, failure links, arrangement) per the
//! construction algorithm this crate is built around. This is implemented
//! directly rather than via the `aho-corasick` crate: the arrangement
//! algorithm (bucket-based vacancy search, density-ordered BFS packing) is
//! the hard engineering this crate exists to demonstrate.

mod arrange;
mod state;
mod trie;

pub use state::DoubleArrayState;

pub(crate) use arrange::arrange_trie;
pub(crate) use trie::{NfaBuilder, NO_OUTPUT};

use crate::types::TokenId;

/// A built double-array Aho-Corasick automaton.
///
/// Root is state `0`. See [`DoubleArrayState`] for the transition rule.
#[derive(Debug, Clone)]
pub struct Automaton {
    pub(crate) states: Vec<DoubleArrayState>,
    pub(crate) outputs: Vec<TokenId>,
}

impl Automaton {
    /// Build an automaton from `patterns`, where `ids[i]` is the output for
    /// `patterns[i]`.
    ///
    /// # Panics
    /// Panics if `patterns.len() != ids.len()`, if any pattern is empty, or
    /// if a pattern is duplicated.
    pub fn build(patterns: &[&[u8]], ids: &[TokenId]) -> Self {
        assert_eq!(patterns.len(), ids.len(), "patterns/ids length mismatch");
        assert!(
            patterns.iter().all(|p| !p.is_empty()),
            "zero-length patterns are rejected"
        );
        {
            let mut seen = std::collections::HashSet::with_capacity(patterns.len());
            assert!(
                patterns.iter().all(|p| seen.insert(*p)),
                "duplicate patterns are rejected"
            );
        }

        let mut builder = NfaBuilder::new();
        for (pattern, &id) in patterns.iter().zip(ids.iter()) {
            builder.insert(pattern, id);
        }
        builder.build_failure_links();

        let (states, outputs) = arrange_trie(&builder);
        Automaton { states, outputs }
    }

    /// Number of states, including the root.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Number of entries in the outputs table.
    pub fn outputs_len(&self) -> usize {
        self.outputs.len()
    }

    /// The packed state records, root first. Exposed for the cache codec
    /// ([`crate::cache`]), which serializes them field-by-field.
    pub fn states(&self) -> &[DoubleArrayState] {
        &self.states
    }

    /// The outputs table. See [`Automaton::states`].
    pub fn outputs(&self) -> &[TokenId] {
        &self.outputs
    }

    /// Reconstruct an automaton from previously serialized parts (used by
    /// [`crate::cache::load`]). No validation is performed: the caller is
    /// trusted to have round-tripped a value this module produced.
    pub fn from_parts(states: Vec<DoubleArrayState>, outputs: Vec<TokenId>) -> Self {
        Self { states, outputs }
    }

    /// Leftmost-longest match of any vocabulary token beginning exactly at
    /// `start`: walk from root following only explicit children (never
    /// failure links), remembering the deepest output seen. Terminates
    /// early once there is no further child and a match has been recorded.
    pub fn longest_match(&self, text: &[u8], start: usize) -> Option<TokenId> {
        let mut state = 0u32;
        let mut best: Option<TokenId> = None;

        for &byte in &text[start..] {
            match self.child(state, byte) {
                Some(next) => {
                    state = next;
                    if let Some(output) = self.output_at(state) {
                        best = Some(output);
                    }
                }
                None => break,
            }
        }
        best
    }

    /// Every match (via failure-link fallback) ending at or before each
    /// position starting from `start`, appended to `out` as they are found.
    ///
    /// Used only for auxiliary construction (building `next_prefix_match`);
    /// the inference encoder uses [`Automaton::longest_match`] exclusively.
    pub fn overlapping_matches(&self, text: &[u8], start: usize, out: &mut Vec<TokenId>) {
        let mut state = 0u32;
        for &byte in &text[start..] {
            loop {
                if let Some(next) = self.child(state, byte) {
                    state = next;
                    break;
                }
                if state == 0 {
                    break;
                }
                state = self.states[state as usize].fail;
            }
            let mut s = state;
            loop {
                if let Some(output) = self.output_at(s) {
                    out.push(output);
                }
                if s == 0 {
                    break;
                }
                s = self.states[s as usize].fail;
            }
        }
    }

    #[inline]
    fn child(&self, state: u32, label: u8) -> Option<u32> {
        let base = self.states[state as usize].base;
        if base == 0 {
            return None;
        }
        let idx = base ^ (label as u32);
        let entry = self.states.get(idx as usize)?;
        if entry.check == label && idx != 0 {
            Some(idx)
        } else {
            None
        }
    }

    #[inline]
    fn output_at(&self, state: u32) -> Option<TokenId> {
        let pos = self.states[state as usize].output_pos;
        if pos == 0 {
            None
        } else {
            Some(self.outputs[pos as usize - 1])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(patterns: &[&str]) -> (Automaton, Vec<TokenId>) {
        let bytes: Vec<&[u8]> = patterns.iter().map(|s| s.as_bytes()).collect();
        let ids: Vec<TokenId> = (0..patterns.len() as TokenId).collect();
        let automaton = Automaton::build(&bytes, &ids);
        (automaton, ids)
    }

    #[test]
    fn longest_match_picks_deepest() {
        let (ac, _) = build(&["he", "hello", "hell"]);
        assert_eq!(ac.longest_match(b"hello world", 0), Some(1));
        assert_eq!(ac.longest_match(b"hell", 0), Some(2));
        assert_eq!(ac.longest_match(b"he", 0), Some(0));
    }

    #[test]
    fn longest_match_none_when_no_prefix_matches() {
        let (ac, _) = build(&["he", "hello"]);
        assert_eq!(ac.longest_match(b"world", 0), None);
    }

    #[test]
    fn longest_match_from_offset() {
        let (ac, _) = build(&["lo", "hello"]);
        assert_eq!(ac.longest_match(b"hello", 3), Some(0));
    }

    #[test]
    fn empty_pattern_set_yields_root_only() {
        let ac = Automaton::build(&[], &[]);
        assert_eq!(ac.state_count(), 1);
        assert_eq!(ac.longest_match(b"anything", 0), None);
    }

    #[test]
    #[should_panic]
    fn zero_length_pattern_rejected() {
        Automaton::build(&[b""], &[0]);
    }

    #[test]
    #[should_panic]
    fn duplicate_pattern_rejected() {
        Automaton::build(&[b"he", b"he"], &[0, 1]);
    }

    #[test]
    fn overlapping_matches_uses_failure_links() {
        let (ac, _) = build(&["he", "she", "his", "hers"]);
        let mut out = Vec::new();
        ac.overlapping_matches(b"she", 0, &mut out);
        out.sort_unstable();
        // "she" contains "she" (id 1) and, via failure links, "he" (id 0).
        assert_eq!(out, vec![0, 1]);
    }

    #[test]
    fn packing_stays_dense_for_a_long_single_child_chain() {
        // A chain of 200 nested prefixes: every trie node from the root
        // down has exactly one child. A packer that burns a full 256-slot
        // block per single-child parent would need roughly 200 * 256
        // states; genuine multi-offset search within a block packs these
        // densely into a handful of blocks.
        let chain: Vec<u8> = (0u8..200).collect();
        let patterns: Vec<&[u8]> = (1..=chain.len()).map(|n| &chain[..n]).collect();
        let ids: Vec<TokenId> = (0..patterns.len() as TokenId).collect();
        let ac = Automaton::build(&patterns, &ids);
        assert!(
            ac.state_count() < 256 * 4,
            "expected dense packing, got {} states for a 200-long single-child chain",
            ac.state_count()
        );
    }

    #[test]
    fn all_byte_vocab_round_trips() {
        let patterns: Vec<Vec<u8>> = (0u32..256).map(|b| vec![b as u8]).collect();
        let refs: Vec<&[u8]> = patterns.iter().map(|p| p.as_slice()).collect();
        let ids: Vec<TokenId> = (0..256).collect();
        let ac = Automaton::build(&refs, &ids);
        for b in 0u8..=255 {
            assert_eq!(ac.longest_match(&[b], 0), Some(b as TokenId));
        }
    }
}
