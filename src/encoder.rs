//! # Backtracking BPE Encoder
//!
//! Encodes a byte span into vocabulary tokens using the double-array
//! automaton for leftmost-longest matching plus a backtracking loop that
//! validates each candidate token against its left neighbor via the
//! pair-validity oracle. A direct port of the teacher crate's
//! `BpeBacktrackSpanEncoder::encode_append_compound_span`.
//!
//! Per-encode scratch state (the boundary bit set and a token buffer) is
//! pooled in a thread-local so repeated calls on the same thread do not
//! reallocate.

use std::cell::RefCell;

use crate::automaton::Automaton;
use crate::bitset::BitSet;
use crate::tables::BpeTables;
use crate::types::TokenId;

thread_local! {
    static SCRATCH: RefCell<BitSet> = RefCell::new(BitSet::new(0));
}

/// Encodes byte spans into tokens against a fixed automaton + table pair.
pub struct Encoder<'a> {
    automaton: &'a Automaton,
    tables: &'a BpeTables,
}

impl<'a> Encoder<'a> {
    pub fn new(automaton: &'a Automaton, tables: &'a BpeTables) -> Self {
        Self { automaton, tables }
    }

    /// Encode `span`, appending produced tokens to `out`. Empty spans
    /// produce no tokens.
    pub fn encode_append(&self, span: &[u8], out: &mut Vec<TokenId>) {
        if span.is_empty() {
            return;
        }

        SCRATCH.with(|cell| {
            let mut bits = cell.borrow_mut();
            bits.reset(span.len() + 1);
            self.encode_with_bits(span, out, &mut bits);
        });
    }

    fn encode_with_bits(&self, span: &[u8], tokens: &mut Vec<TokenId>, bits: &mut BitSet) {
        let base = tokens.len();
        let mut pos = 0usize;
        let mut next_token = self.automaton.longest_match(span, 0);

        while let Some(mut token) = next_token {
            let last = if tokens.len() > base {
                Some(tokens[tokens.len() - 1])
            } else {
                None
            };

            loop {
                let end_pos = pos + self.tables.token_len(token);
                let boundary_open = bits.is_set(end_pos);
                let pair_ok = last.is_none_or(|lt| self.tables.is_valid_pair(lt, token));

                if boundary_open && pair_ok {
                    tokens.push(token);
                    pos = end_pos;
                    next_token = self.automaton.longest_match(span, end_pos);
                    break;
                } else if let Some(shorter) = self.tables.next_prefix_of(token) {
                    token = shorter;
                } else {
                    bits.clear(pos);
                    if let Some(prev) = last {
                        tokens.pop();
                        pos -= self.tables.token_len(prev);
                        next_token = Some(prev);
                    } else {
                        next_token = None;
                    }
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Vocab V0: bytes 0-255, "he"=256, "ll"=257, "hello"=258.
    fn v0() -> (Automaton, BpeTables) {
        let mut span_pairs: Vec<(Vec<u8>, TokenId)> =
            (0u32..256).map(|b| (vec![b as u8], b)).collect();
        span_pairs.push((b"he".to_vec(), 256));
        span_pairs.push((b"ll".to_vec(), 257));
        span_pairs.push((b"hello".to_vec(), 258));

        let refs: Vec<&[u8]> = span_pairs.iter().map(|(b, _)| b.as_slice()).collect();
        let ids: Vec<TokenId> = span_pairs.iter().map(|(_, t)| *t).collect();
        let automaton = Automaton::build(&refs, &ids);
        let tables = BpeTables::build(&span_pairs, &automaton);
        (automaton, tables)
    }

    fn encode(text: &str) -> Vec<TokenId> {
        let (automaton, tables) = v0();
        let encoder = Encoder::new(&automaton, &tables);
        let mut out = Vec::new();
        encoder.encode_append(text.as_bytes(), &mut out);
        out
    }

    #[test]
    fn hello_is_one_token() {
        assert_eq!(encode("hello"), vec![258]);
    }

    #[test]
    fn hell_is_he_plus_ll() {
        assert_eq!(encode("hell"), vec![256, 257]);
    }

    #[test]
    fn helo_has_no_ll_merge() {
        assert_eq!(encode("helo"), vec![256, b'l' as u32, b'o' as u32]);
    }

    #[test]
    fn empty_span_yields_no_tokens() {
        assert_eq!(encode(""), Vec::<TokenId>::new());
    }

    #[test]
    fn hhello_is_h_then_hello() {
        assert_eq!(encode("hhello"), vec![b'h' as u32, 258]);
    }

    #[test]
    fn repeated_calls_reuse_thread_local_scratch() {
        for _ in 0..4 {
            assert_eq!(encode("hello"), vec![258]);
            assert_eq!(encode("x"), vec![b'x' as u32]);
        }
    }
}
