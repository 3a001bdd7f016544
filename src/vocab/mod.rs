//! # Vocabulary
//!
//! The bijection between byte sequences and token ids, plus the ordered
//! merge list that produced it and any special tokens recognized as whole
//! chunks before BPE runs. JSON IO lives in [`io`].

pub mod io;

use crate::types::{hashmap_with_capacity, CommonHashMap, Pair, TokenId};

/// A trained or loaded vocabulary: `token_bytes <-> id`, in merge order.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    /// `vocab_r`: dense, indexed by id.
    token_bytes: Vec<Vec<u8>>,
    /// `vocab`: bytes -> id.
    by_bytes: CommonHashMap<Vec<u8>, TokenId>,
    /// Ordered merge list, index = merge rank (for ids >= 256 in the
    /// byte-level case).
    merges: Vec<(Pair, TokenId)>,
    /// Whole-chunk special tokens, checked before BPE runs.
    special_tokens: Vec<(Vec<u8>, TokenId)>,
}

impl Vocabulary {
    /// Build from an explicit `(bytes, id)` table and merge list. `ids` must
    /// cover `0..table.len()` exactly once each (the bijection invariant);
    /// violating this is a programming error in the caller, not a
    /// recoverable runtime condition.
    pub fn from_parts(
        mut pairs: Vec<(Vec<u8>, TokenId)>,
        merges: Vec<(Pair, TokenId)>,
        special_tokens: Vec<(Vec<u8>, TokenId)>,
    ) -> Self {
        pairs.sort_by_key(|(_, id)| *id);
        let mut token_bytes = Vec::with_capacity(pairs.len());
        let mut by_bytes = hashmap_with_capacity(pairs.len());
        for (idx, (bytes, id)) in pairs.into_iter().enumerate() {
            debug_assert_eq!(idx as TokenId, id, "vocabulary ids must be dense from 0");
            by_bytes.insert(bytes.clone(), id);
            token_bytes.push(bytes);
        }
        Self {
            token_bytes,
            by_bytes,
            merges,
            special_tokens,
        }
    }

    /// Number of tokens in the vocabulary.
    pub fn len(&self) -> usize {
        self.token_bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_bytes.is_empty()
    }

    /// Byte form of `id`, or `None` if out of range.
    pub fn bytes_of(&self, id: TokenId) -> Option<&[u8]> {
        self.token_bytes.get(id as usize).map(|v| v.as_slice())
    }

    /// Id of `bytes`, if it is a registered token.
    pub fn id_of(&self, bytes: &[u8]) -> Option<TokenId> {
        self.by_bytes.get(bytes).copied()
    }

    /// Ordered merge list (index has no particular meaning beyond order;
    /// the `new_id` field carries the actual rank).
    pub fn merges(&self) -> &[(Pair, TokenId)] {
        &self.merges
    }

    /// Special tokens recognized as exact whole-chunk matches.
    pub fn special_tokens(&self) -> &[(Vec<u8>, TokenId)] {
        &self.special_tokens
    }

    /// Total byte length of every token's byte form, summed. Used to size
    /// the "ultra" cache variant's vocabulary-byte blob ([`crate::cache`]).
    pub fn total_byte_len(&self) -> usize {
        self.token_bytes.iter().map(|b| b.len()).sum()
    }

    /// All `(bytes, id)` pairs, in id order. Feeds automaton + table
    /// construction directly.
    pub fn span_pairs(&self) -> Vec<(Vec<u8>, TokenId)> {
        self.token_bytes
            .iter()
            .enumerate()
            .map(|(id, bytes)| (bytes.clone(), id as TokenId))
            .collect()
    }

    /// Decode a sequence of ids back to bytes by concatenation.
    pub fn decode(&self, ids: &[TokenId]) -> Vec<u8> {
        let mut out = Vec::with_capacity(ids.len() * 2);
        for &id in ids {
            if let Some(bytes) = self.bytes_of(id) {
                out.extend_from_slice(bytes);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v0_round_trips_bytes() {
        let mut pairs: Vec<(Vec<u8>, TokenId)> = (0u32..256).map(|b| (vec![b as u8], b)).collect();
        pairs.push((b"he".to_vec(), 256));
        pairs.push((b"ll".to_vec(), 257));
        pairs.push((b"hello".to_vec(), 258));

        let vocab = Vocabulary::from_parts(pairs, Vec::new(), Vec::new());
        assert_eq!(vocab.len(), 259);
        assert_eq!(vocab.id_of(b"hello"), Some(258));
        assert_eq!(vocab.decode(&[258]), b"hello");
        assert_eq!(vocab.decode(&[256, 257]), b"hell");
    }
}
