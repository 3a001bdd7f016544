//! # Common Types
//!
//! `tokenchipper` fixes its token id to [`TokenId`] (a 32-bit unsigned
//! integer) rather than generalizing over `{u16, u32, u64}` the way the
//! teacher crate's `TokenType` trait does — see `DESIGN.md` for the
//! rationale.

use std::collections::{HashMap, HashSet};

/// The token id type. 32 bits, per the data model: ids `0..=255` are
/// explicit byte-level tokens, `id = 256 + merge_index` for byte-level BPE.
pub type TokenId = u32;

/// Sentinel meaning "no token" / "no output" in tables indexed by [`TokenId`].
pub const NONE: TokenId = TokenId::MAX;

/// An ordered pair of token ids: `(left, right)`.
pub type Pair = (TokenId, TokenId);

/// Hash map type alias used throughout the crate, keyed on `foldhash` for
/// speed over the default `SipHash` `std::collections::HashMap`.
pub type CommonHashMap<K, V> = HashMap<K, V, foldhash::fast::RandomState>;

/// Hash set type alias, see [`CommonHashMap`].
pub type CommonHashSet<V> = HashSet<V, foldhash::fast::RandomState>;

/// Construct a [`CommonHashMap`] pre-sized for `capacity` entries.
///
/// `HashMap::with_capacity` is only an inherent method for the std
/// `RandomState` hasher, so a custom-hasher map needs this helper instead.
pub fn hashmap_with_capacity<K, V>(capacity: usize) -> CommonHashMap<K, V> {
    CommonHashMap::with_capacity_and_hasher(capacity, foldhash::fast::RandomState::default())
}

/// Construct a [`CommonHashSet`] pre-sized for `capacity` entries.
pub fn hashset_with_capacity<V>(capacity: usize) -> CommonHashSet<V> {
    CommonHashSet::with_capacity_and_hasher(capacity, foldhash::fast::RandomState::default())
}
