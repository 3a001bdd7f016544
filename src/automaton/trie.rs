//! # Trie Construction & Failure Links
//!
//! Passes 1 and 2 of automaton construction: build the NFA trie over the
//! patterns, then compute Aho-Corasick failure links by BFS. The resulting
//! [`NfaBuilder`] is consumed by [`super::arrange::arrange_trie`] (pass 3)
//! to produce the packed double array.
//!
//! Construction style (flat `Vec` of states referenced by index, BFS over a
//! `VecDeque`) follows the trie-building approach common to from-scratch
//! Aho-Corasick implementations, e.g. the offset-based automaton builder in
//! `sethhall-matchy`'s `ac_offset.rs`.

use std::collections::{BTreeMap, VecDeque};

use crate::types::TokenId;

/// Sentinel meaning "this NFA state has no output".
pub const NO_OUTPUT: TokenId = TokenId::MAX;

/// One NFA (trie) state during construction.
#[derive(Debug, Clone)]
pub(crate) struct NfaState {
    /// Sorted child map: byte label -> NFA state id. A `BTreeMap` keeps
    /// children naturally sorted ascending, which the arrangement pass
    /// relies on for deterministic packing.
    pub children: BTreeMap<u8, u32>,
    pub fail: u32,
    pub output: TokenId,
    pub depth: u32,
}

impl NfaState {
    fn new(depth: u32) -> Self {
        Self {
            children: BTreeMap::new(),
            fail: 0,
            output: NO_OUTPUT,
            depth,
        }
    }
}

/// Builder for the NFA trie + failure links (construction passes 1-2).
#[derive(Debug)]
pub(crate) struct NfaBuilder {
    pub states: Vec<NfaState>,
}

impl NfaBuilder {
    pub fn new() -> Self {
        Self {
            states: vec![NfaState::new(0)],
        }
    }

    /// Insert `pattern` into the trie, marking its terminal state with
    /// `output`. Duplicate patterns simply overwrite the output (callers are
    /// expected to reject duplicates by distinct output ids upstream; the
    /// automaton itself has no notion of "duplicate rejection" beyond
    /// keeping the last writer).
    pub fn insert(&mut self, pattern: &[u8], output: TokenId) {
        let mut current = 0u32;
        for &byte in pattern {
            let depth = self.states[current as usize].depth + 1;
            current = *self.states[current as usize]
                .children
                .entry(byte)
                .or_insert_with(|| {
                    self.states.push(NfaState::new(depth));
                    (self.states.len() - 1) as u32
                });
        }
        self.states[current as usize].output = output;
    }

    /// Compute failure links via BFS. For each non-root state `s` reached
    /// from parent `p` via label `c`: walk `p.fail` ancestors; the first
    /// ancestor with child `c` provides `s.fail`; if none, `s.fail = root`.
    pub fn build_failure_links(&mut self) {
        let mut queue = VecDeque::new();

        let root_children: Vec<(u8, u32)> = self.states[0]
            .children
            .iter()
            .map(|(&c, &s)| (c, s))
            .collect();
        for (_, child) in &root_children {
            self.states[*child as usize].fail = 0;
            queue.push_back(*child);
        }

        while let Some(state_id) = queue.pop_front() {
            let children: Vec<(u8, u32)> = self.states[state_id as usize]
                .children
                .iter()
                .map(|(&c, &s)| (c, s))
                .collect();

            for (label, child) in children {
                queue.push_back(child);

                let mut ancestor = self.states[state_id as usize].fail;
                let mut found = None;
                loop {
                    if let Some(&target) = self.states[ancestor as usize].children.get(&label) {
                        found = Some(target);
                        break;
                    }
                    if ancestor == 0 {
                        break;
                    }
                    ancestor = self.states[ancestor as usize].fail;
                }

                self.states[child as usize].fail = found.unwrap_or(0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_links_point_to_longest_proper_suffix_state() {
        let mut b = NfaBuilder::new();
        b.insert(b"he", 0);
        b.insert(b"she", 1);
        b.insert(b"his", 2);
        b.insert(b"hers", 3);
        b.build_failure_links();

        // "she" -> 's','h','e'; the 'h' state's failure should point to the
        // root-level 'h' state (start of "he"), and the 'e' state's failure
        // should point to the terminal 'he' state.
        let s_state = *b.states[0].children.get(&b's').unwrap();
        let sh_state = *b.states[s_state as usize].children.get(&b'h').unwrap();
        let she_state = *b.states[sh_state as usize].children.get(&b'e').unwrap();

        let h_state = *b.states[0].children.get(&b'h').unwrap();
        let he_state = *b.states[h_state as usize].children.get(&b'e').unwrap();

        assert_eq!(b.states[sh_state as usize].fail, h_state);
        assert_eq!(b.states[she_state as usize].fail, he_state);
        assert_eq!(b.states[she_state as usize].output, NO_OUTPUT);
        assert_eq!(b.states[he_state as usize].output, 0);
    }

    #[test]
    fn insert_duplicate_pattern_keeps_last_output() {
        let mut b = NfaBuilder::new();
        b.insert(b"ab", 0);
        b.insert(b"ab", 1);
        let a = *b.states[0].children.get(&b'a').unwrap();
        let ab = *b.states[a as usize].children.get(&b'b').unwrap();
        assert_eq!(b.states[ab as usize].output, 1);
    }
}
