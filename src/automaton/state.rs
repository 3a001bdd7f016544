//! # Double-Array State Record

/// One record of the double-array state table.
///
/// Transition on byte `c` from state `s` is valid iff `base[s] != 0`, the
/// child index `i = base[s] XOR c` is in range, and `check[i] == c`; the
/// child state id is `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DoubleArrayState {
    /// XOR base for this state's children. `0` means "no children".
    pub base: u32,
    /// The byte label that a parent used to reach this state via XOR.
    /// Meaningless for the root.
    pub check: u8,
    /// Aho-Corasick failure link, as a state index. `0` (root) for
    /// first-depth states with no better failure target.
    pub fail: u32,
    /// `1 + index into `Automaton::outputs`` if this state completes a
    /// pattern, else `0`.
    pub output_pos: u32,
}
