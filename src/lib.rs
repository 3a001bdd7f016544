//! # tokenchipper
//!
//! A byte-level BPE tokenizer library: a double-array Aho-Corasick
//! automaton for inference-time encoding, a from-scratch BPE trainer, and a
//! binary cache so the automaton is rebuilt once per vocabulary rather than
//! once per process.
//!
//! [`Tokenizer`] is the usual entry point. [`BpeTrainer`] trains a fresh
//! vocabulary from a text corpus. Lower-level pieces ([`Automaton`],
//! [`BpeTables`], [`Encoder`]) are public for callers who want to drive the
//! encoder directly, e.g. against a vocabulary assembled some other way.

pub mod automaton;
pub mod bitset;
pub mod cache;
pub mod encoder;
pub mod errors;
pub mod pretokenizer;
pub mod tables;
pub mod tokenizer;
pub mod trainer;
pub mod types;
pub mod validity;
pub mod vocab;

pub use automaton::Automaton;
pub use cache::CacheVariant;
pub use encoder::Encoder;
pub use errors::{Result, TokenchipperError};
pub use pretokenizer::{PreTokenizer, PreTokenizerPattern};
pub use tables::BpeTables;
pub use tokenizer::Tokenizer;
pub use trainer::{BpeTrainer, CorpusMode, TrainResult, TrainerOptions};
pub use types::{Pair, TokenId};
pub use vocab::Vocabulary;
