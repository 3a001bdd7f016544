//! # Arrangement Into The Double Array (construction pass 3)
//!
//! Processes NFA states in a priority order (most children first — a
//! "density-ordered BFS": a priority frontier rather than a plain FIFO BFS)
//! and packs each parent's children into the double array using a
//! bucket-based vacancy search. `base ^ c` for any byte `c` (0..256) only
//! ever touches `base`'s low 8 bits, so every candidate `base` sharing the
//! same `base >> 8` ("block") lands its children in the same 256-slot
//! window. Each block tracks one free-slot count; a block with too few free
//! slots for a parent's child count is skipped outright, but within a block
//! that passes the count check, every low-byte offset `k` in `0..256` is
//! tried in turn as a candidate `base` before moving on to the next block.
//! This is what makes the search genuinely dense: a parent with few
//! children only consumes a few slots of a block, leaving the rest for
//! later parents, rather than permanently claiming the whole block.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use super::state::DoubleArrayState;
use super::trie::{NfaBuilder, NO_OUTPUT};
use crate::types::TokenId;

const BUCKET_SIZE: u32 = 256;

/// Mutable packing state threaded through the bucket vacancy search.
struct Packer {
    states: Vec<DoubleArrayState>,
    occupied: Vec<bool>,
    da_to_nfa: Vec<u32>,
    bucket_free: Vec<u32>,
    base_used: HashSet<u32>,
}

impl Packer {
    fn new() -> Self {
        Self {
            states: vec![DoubleArrayState::default()],
            occupied: vec![true], // root (index 0) is always "occupied".
            da_to_nfa: vec![0],
            bucket_free: Vec::new(),
            base_used: HashSet::new(),
        }
    }

    fn grow_bucket(&mut self) {
        let block = self.bucket_free.len() as u32;
        let new_len = self.states.len() + BUCKET_SIZE as usize;
        self.states.resize(new_len, DoubleArrayState::default());
        self.occupied.resize(new_len, false);
        self.da_to_nfa.resize(new_len, 0);
        // Block 0 covers indices 0..256, and index 0 (the root) is already
        // permanently occupied, so its block starts one slot short of a
        // freshly grown block.
        let free = if block == 0 {
            BUCKET_SIZE - 1
        } else {
            BUCKET_SIZE
        };
        self.bucket_free.push(free);
    }

    /// Find a `base` satisfying:
    /// (a) `base != 0`,
    /// (b) not previously used as any other parent's base,
    /// (c) every `base ^ label` in `labels` is currently unoccupied.
    ///
    /// Scans blocks in order, skipping any block whose free-slot count is
    /// too low to possibly fit `labels`; within a block that might fit,
    /// tries every low-byte offset `k` in `0..BUCKET_SIZE` as a candidate
    /// `base = block * BUCKET_SIZE + k` before giving up on the block.
    fn find_base(&mut self, labels: &[u8]) -> u32 {
        let needed = labels.len() as u32;
        let mut block = 0u32;
        loop {
            while (block as usize) >= self.bucket_free.len() {
                self.grow_bucket();
            }

            if self.bucket_free[block as usize] >= needed {
                for k in 0..BUCKET_SIZE {
                    let base = block * BUCKET_SIZE + k;
                    if base == 0 || self.base_used.contains(&base) {
                        continue;
                    }
                    let fits = labels.iter().all(|&label| {
                        let idx = base ^ (label as u32);
                        !self.occupied[idx as usize]
                    });
                    if fits {
                        return base;
                    }
                }
            }
            block += 1;
        }
    }
}

/// Pack `builder`'s trie + failure links into a double array.
///
/// Returns the packed states (root at index 0) and the outputs table.
pub(crate) fn arrange_trie(builder: &NfaBuilder) -> (Vec<DoubleArrayState>, Vec<TokenId>) {
    let mut packer = Packer::new();

    // Priority frontier: (children_count, Reverse(nfa_id)) so states with
    // more children are packed first (better packing), ties broken by
    // ascending nfa_id for determinism.
    let mut frontier: BinaryHeap<(usize, Reverse<u32>)> = BinaryHeap::new();
    frontier.push((builder.states[0].children.len(), Reverse(0)));

    // nfa_id -> da_id, populated as states are allocated as children.
    let mut nfa_to_da: Vec<u32> = vec![TokenId::MAX; builder.states.len()];
    nfa_to_da[0] = 0;

    while let Some((_, Reverse(nfa_id))) = frontier.pop() {
        let nfa_state = &builder.states[nfa_id as usize];
        if nfa_state.children.is_empty() {
            continue;
        }
        let parent_da = nfa_to_da[nfa_id as usize];
        let labels: Vec<u8> = nfa_state.children.keys().copied().collect();

        let base = packer.find_base(&labels);
        packer.base_used.insert(base);
        packer.states[parent_da as usize].base = base;

        for (&label, &child_nfa) in nfa_state.children.iter() {
            let child_da = base ^ (label as u32);
            packer.occupied[child_da as usize] = true;
            // child_da shares base's bits above bit 8 (XOR with a byte only
            // touches the low byte), so this is still the block find_base
            // charged against.
            packer.bucket_free[(child_da / BUCKET_SIZE) as usize] -= 1;
            packer.states[child_da as usize].check = label;
            packer.da_to_nfa[child_da as usize] = child_nfa;
            nfa_to_da[child_nfa as usize] = child_da;

            let grandchildren = builder.states[child_nfa as usize].children.len();
            frontier.push((grandchildren, Reverse(child_nfa)));
        }
    }

    // Final pass: translate fail links and outputs from NFA-space.
    let mut states = packer.states;
    let mut outputs: Vec<TokenId> = Vec::new();
    for da_id in 0..states.len() {
        if !packer.occupied[da_id] {
            continue;
        }
        let nfa_id = packer.da_to_nfa[da_id];
        let nfa_state = &builder.states[nfa_id as usize];
        states[da_id].fail = nfa_to_da[nfa_state.fail as usize];
        if nfa_state.output != NO_OUTPUT {
            outputs.push(nfa_state.output);
            states[da_id].output_pos = outputs.len() as u32;
        }
    }

    (states, outputs)
}
