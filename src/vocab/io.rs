//! # JSON Vocabulary IO
//!
//! `{"vocab": {<base64-token>: <rank>, ...}}`. Rank is a dense, contiguous
//! set `{0, ..., N-1}`. Token bytes are always base64-encoded, even for
//! printable ASCII, so the format round-trips arbitrary byte-level tokens
//! without escaping ambiguity.

use std::fs;
use std::path::Path;

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use serde_json::{Map, Value};

use crate::errors::{Result, TokenchipperError};
use crate::types::TokenId;
use crate::vocab::Vocabulary;

/// Parse a vocabulary from its JSON text form. Tolerant of insignificant
/// whitespace and key order; rejects malformed base64, duplicate or
/// non-contiguous ranks.
pub fn parse_vocab_json(text: &str) -> Result<Vocabulary> {
    let root: Value = serde_json::from_str(text)
        .map_err(|e| TokenchipperError::VocabFormatError(format!("invalid JSON: {e}")))?;

    let vocab_obj = root
        .get("vocab")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            TokenchipperError::VocabFormatError("missing top-level \"vocab\" object".into())
        })?;

    let mut pairs = Vec::with_capacity(vocab_obj.len());
    let mut seen_ranks = vec![false; vocab_obj.len()];

    for (key, value) in vocab_obj {
        let rank = value.as_u64().ok_or_else(|| {
            TokenchipperError::VocabFormatError(format!("rank for {key:?} is not an integer"))
        })?;
        if rank as usize >= vocab_obj.len() {
            return Err(TokenchipperError::VocabFormatError(format!(
                "rank {rank} out of range for {} entries",
                vocab_obj.len()
            )));
        }
        if seen_ranks[rank as usize] {
            return Err(TokenchipperError::VocabFormatError(format!(
                "duplicate rank {rank}"
            )));
        }
        seen_ranks[rank as usize] = true;

        let bytes = BASE64_STANDARD.decode(key.trim()).map_err(|e| {
            TokenchipperError::VocabFormatError(format!("invalid base64 token {key:?}: {e}"))
        })?;
        pairs.push((bytes, rank as TokenId));
    }

    if let Some(missing) = seen_ranks.iter().position(|&seen| !seen) {
        return Err(TokenchipperError::VocabFormatError(format!(
            "rank set is not contiguous: missing rank {missing}"
        )));
    }

    Ok(Vocabulary::from_parts(pairs, Vec::new(), Vec::new()))
}

/// Serialize a vocabulary to its JSON text form, tokens in ascending rank
/// order.
pub fn write_vocab_json(vocab: &Vocabulary) -> String {
    let mut obj = Map::with_capacity(vocab.len());
    for (bytes, id) in vocab.span_pairs() {
        let key = BASE64_STANDARD.encode(&bytes);
        obj.insert(key, Value::from(id));
    }
    let mut root = Map::new();
    root.insert("vocab".to_string(), Value::Object(obj));
    serde_json::to_string_pretty(&Value::Object(root)).expect("vocab json serialization")
}

/// Load a vocabulary from a JSON file on disk.
pub fn load_vocab_json_path<P: AsRef<Path>>(path: P) -> Result<Vocabulary> {
    let text = fs::read_to_string(path)?;
    parse_vocab_json(&text)
}

/// Save a vocabulary to a JSON file on disk.
pub fn save_vocab_json_path<P: AsRef<Path>>(vocab: &Vocabulary, path: P) -> Result<()> {
    fs::write(path, write_vocab_json(vocab))?;
    Ok(())
}
