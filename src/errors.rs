//! # Error Types

/// Errors from tokenchipper operations.
#[derive(Debug, thiserror::Error)]
pub enum TokenchipperError {
    /// Malformed vocabulary JSON, invalid base64, duplicate ranks, or a
    /// non-contiguous rank set.
    #[error("vocab format error: {0}")]
    VocabFormatError(String),

    /// Training target vocab size is below the byte-alphabet size (256).
    #[error("vocab size ({size}) must be >= 256")]
    VocabSizeTooSmall {
        /// The vocab size that was too small.
        size: usize,
    },

    /// A merge referenced token ids that are not yet defined.
    ///
    /// This should never surface if internal invariants hold; it exists so
    /// that a broken vocabulary file fails loudly instead of panicking deep
    /// inside automaton construction.
    #[error("invalid merge: ({left}, {right}) references an undefined token")]
    InvalidMerge {
        /// Left operand of the offending merge.
        left: u32,
        /// Right operand of the offending merge.
        right: u32,
    },

    /// The on-disk automaton cache was invalid or stale.
    ///
    /// Never surfaced to callers: [`crate::Tokenizer::load_from_file`]
    /// catches this and falls back to rebuilding in memory.
    #[error("cache invalid: {0}")]
    CacheInvalid(String),

    /// Filesystem I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A parse error (base64, integer, JSON) outside the vocab-format path.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Result type for tokenchipper operations.
pub type Result<T> = core::result::Result<T, TokenchipperError>;
