//! # Tokenizer Façade
//!
//! Loads a vocabulary, builds or loads the automaton cache, and exposes the
//! public `encode`/`decode`/`save_to_file` surface (spec §6). Drives
//! pre-tokenization and the per-chunk backtrack encoder, same division of
//! labor as the teacher crate's top-level `Tokenizer<T>` (vocab + spanner +
//! encoder + decoder, wired together at one seam).

use std::env;
use std::path::{Path, PathBuf};

use crate::automaton::Automaton;
use crate::cache::{self, CacheVariant};
use crate::encoder::Encoder;
use crate::errors::Result;
use crate::pretokenizer::PreTokenizer;
use crate::tables::BpeTables;
use crate::types::TokenId;
use crate::vocab::{io as vocab_io, Vocabulary};

/// Overrides the automaton cache directory. Defaults to the platform temp
/// directory (spec §6's "Environment" note).
pub const CACHE_DIR_ENV: &str = "TOKENCHIPPER_CACHE_DIR";

/// A loaded tokenizer: vocabulary, automaton, and auxiliary tables, wired to
/// the cl100k-class pre-tokenizer. Immutable after construction; safe to
/// share across threads by reference (spec §5).
pub struct Tokenizer {
    vocab: Vocabulary,
    automaton: Automaton,
    tables: BpeTables,
    pretokenizer: PreTokenizer,
}

impl Tokenizer {
    /// Build a tokenizer directly from an in-memory vocabulary, constructing
    /// the automaton and auxiliary tables fresh (no cache involved).
    pub fn from_vocabulary(vocab: Vocabulary) -> Self {
        let span_pairs = vocab.span_pairs();
        let refs: Vec<&[u8]> = span_pairs.iter().map(|(b, _)| b.as_slice()).collect();
        let ids: Vec<TokenId> = span_pairs.iter().map(|(_, id)| *id).collect();
        let automaton = Automaton::build(&refs, &ids);
        let tables = BpeTables::build(&span_pairs, &automaton);
        Self {
            vocab,
            automaton,
            tables,
            pretokenizer: PreTokenizer::new(),
        }
    }

    /// Load a vocabulary JSON file, building or loading the automaton cache.
    ///
    /// Cache fidelity never affects correctness: any cache failure (missing
    /// file, bad magic, version mismatch, stale content hash or mtime) is
    /// logged at `debug` and silently falls back to an in-memory rebuild
    /// (spec §4.6, §7).
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let vocab_bytes = std::fs::read(path)?;
        let vocab_mtime = std::fs::metadata(path)?.modified()?;
        let vocab = vocab_io::parse_vocab_json(
            std::str::from_utf8(&vocab_bytes)
                .map_err(|e| crate::errors::TokenchipperError::Parse(e.to_string()))?,
        )?;

        let hash = cache::content_hash(&vocab_bytes);
        let cache_path = cache_path_for(path, hash);

        match cache::load(&cache_path, hash, vocab_mtime) {
            Ok(cached) => {
                if let Some(tables) = cached.tables {
                    log::debug!("loaded automaton cache from {}", cache_path.display());
                    return Ok(Self {
                        vocab,
                        automaton: cached.automaton,
                        tables,
                        pretokenizer: PreTokenizer::new(),
                    });
                }
                log::debug!(
                    "cache at {} carried no auxiliary tables; rebuilding",
                    cache_path.display()
                );
            }
            Err(e) => {
                log::debug!(
                    "no usable automaton cache at {} ({e}); rebuilding",
                    cache_path.display()
                );
            }
        }

        let tokenizer = Self::from_vocabulary(vocab);
        if let Err(e) = cache::save(
            &cache_path,
            CacheVariant::WithTables,
            hash,
            vocab_mtime,
            &tokenizer.automaton,
            Some(&tokenizer.tables),
            None,
        ) {
            log::debug!("failed to write automaton cache to {}: {e}", cache_path.display());
        }
        Ok(tokenizer)
    }

    /// Encode `text`: pre-tokenize into chunks, check each chunk against
    /// the special-token set, and run the backtrack encoder over whatever
    /// remains.
    pub fn encode(&self, text: &str) -> Vec<TokenId> {
        let encoder = Encoder::new(&self.automaton, &self.tables);
        let mut out = Vec::new();
        for chunk in self.pretokenizer.chunks(text) {
            match self.special_token_id(chunk) {
                Some(id) => out.push(id),
                None => encoder.encode_append(chunk, &mut out),
            }
        }
        out
    }

    fn special_token_id(&self, chunk: &[u8]) -> Option<TokenId> {
        self.vocab
            .special_tokens()
            .iter()
            .find(|(bytes, _)| bytes.as_slice() == chunk)
            .map(|(_, id)| *id)
    }

    /// Decode a token id sequence back to bytes: concatenation of each
    /// token's byte form (spec §6).
    pub fn decode(&self, ids: &[TokenId]) -> Vec<u8> {
        self.vocab.decode(ids)
    }

    /// Write this tokenizer's vocabulary back to a JSON file (spec §6).
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        vocab_io::save_vocab_json_path(&self.vocab, path)
    }

    /// The tokenizer's vocabulary.
    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// The tokenizer's automaton, for callers that want to drive it
    /// directly (benchmarking, inspection).
    pub fn automaton(&self) -> &Automaton {
        &self.automaton
    }
}

fn cache_path_for(vocab_path: &Path, hash: u64) -> PathBuf {
    let dir = env::var_os(CACHE_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(env::temp_dir);
    let stem = vocab_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("vocab");
    dir.join(format!("tokenchipper-{stem}-{hash:016x}.cache"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // TOKENCHIPPER_CACHE_DIR is process-global state; serialize tests that
    // touch it so they don't race each other's cache directories.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn v0_json() -> String {
        let mut pairs: Vec<(Vec<u8>, TokenId)> = (0u32..256).map(|b| (vec![b as u8], b)).collect();
        pairs.push((b"he".to_vec(), 256));
        pairs.push((b"ll".to_vec(), 257));
        pairs.push((b"hello".to_vec(), 258));
        let vocab = Vocabulary::from_parts(pairs, Vec::new(), Vec::new());
        vocab_io::write_vocab_json(&vocab)
    }

    #[test]
    fn encode_decode_round_trips_the_spec_v0_scenarios() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempdir::TempDir::new("tokenchipper-facade-test").unwrap();
        unsafe {
            env::set_var(CACHE_DIR_ENV, dir.path());
        }

        let vocab_path = dir.path().join("vocab.json");
        std::fs::write(&vocab_path, v0_json()).unwrap();

        let tok = Tokenizer::load_from_file(&vocab_path).unwrap();

        assert_eq!(tok.encode("hello"), vec![258]);
        assert_eq!(tok.encode("hell"), vec![256, 257]);
        assert_eq!(
            tok.encode("helo"),
            vec![256, b'l' as TokenId, b'o' as TokenId]
        );
        assert_eq!(tok.encode(""), Vec::<TokenId>::new());
        assert_eq!(tok.encode("hhello"), vec![b'h' as TokenId, 258]);

        for text in ["hello", "hell", "helo", "", "hhello"] {
            let ids = tok.encode(text);
            assert_eq!(tok.decode(&ids), text.as_bytes());
        }

        unsafe {
            env::remove_var(CACHE_DIR_ENV);
        }
    }

    #[test]
    fn second_load_reuses_the_written_cache() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempdir::TempDir::new("tokenchipper-facade-cache-test").unwrap();
        unsafe {
            env::set_var(CACHE_DIR_ENV, dir.path());
        }

        let vocab_path = dir.path().join("vocab.json");
        std::fs::write(&vocab_path, v0_json()).unwrap();

        let first = Tokenizer::load_from_file(&vocab_path).unwrap();
        let cache_dir_entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert!(cache_dir_entries >= 2); // vocab.json + at least one cache file

        let second = Tokenizer::load_from_file(&vocab_path).unwrap();
        assert_eq!(first.encode("hello"), second.encode("hello"));

        unsafe {
            env::remove_var(CACHE_DIR_ENV);
        }
    }

    #[test]
    fn special_tokens_match_as_whole_pre_tokenizer_chunks() {
        let mut pairs: Vec<(Vec<u8>, TokenId)> = (0u32..256).map(|b| (vec![b as u8], b)).collect();
        pairs.push((b"<|endoftext|>".to_vec(), 256));
        let vocab = Vocabulary::from_parts(
            pairs,
            Vec::new(),
            vec![(b"<|endoftext|>".to_vec(), 256)],
        );
        let tok = Tokenizer::from_vocabulary(vocab);
        assert_eq!(tok.encode("<|endoftext|>"), vec![256]);
    }
}
