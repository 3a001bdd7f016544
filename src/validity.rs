//! # Pair-Validity Oracle
//!
//! Checks whether two adjacent tokens form a boundary BPE would actually
//! produce, without re-running BPE: recursively undo merges on both sides
//! of the candidate split, checking at each step whether a lower-ranked
//! merge would have combined bytes across the split point. A direct port of
//! the equivalent procedure in the teacher crate's backtracking encoder
//! (itself a port of the `rs-bpe` validity check).

use crate::types::{CommonHashMap, Pair, TokenId};

/// Whether `(token1, token2)` is a boundary that canonical BPE merging would
/// respect: no registered merge combines `token1` and `token2` (or any pair
/// produced by peeling their own splits) at a rank lower than either side's
/// own id.
pub fn is_valid_token_pair(
    pair_lookup: &CommonHashMap<Pair, TokenId>,
    split_table: &[Pair],
    mut token1: TokenId,
    mut token2: TokenId,
) -> bool {
    let mut limit = TokenId::MAX;
    loop {
        if let Some(&combined) = pair_lookup.get(&(token1, token2))
            && combined < limit
        {
            return false;
        }
        if token1 > token2 {
            limit = token1;
            token1 = split_table[token1 as usize].1;
            if token1 == limit {
                limit = token2 + 1;
                token2 = split_table[token2 as usize].0;
                if token2 + 1 == limit {
                    return true;
                }
            }
        } else {
            limit = token2 + 1;
            token2 = split_table[token2 as usize].0;
            if token2 + 1 == limit {
                limit = token1;
                token1 = split_table[token1 as usize].1;
                if token1 == limit {
                    return true;
                }
            }
        }
    }
}
