//! # Automaton Cache
//!
//! A versioned little-endian binary encoding of a built [`Automaton`]
//! (states + outputs), optionally with the split/next-prefix-match
//! auxiliary tables and the vocabulary's own token bytes, loaded with
//! `mmap` when the `mmap` feature is enabled so large "ultra" caches avoid
//! a copy into an owned buffer. Write-out uses a create-temp-file +
//! rename pattern so concurrent loaders always see either the previous
//! valid cache file or the new one, never a partial write (spec §5).
//!
//! All cache failures (bad magic, version mismatch, truncated file,
//! content-hash mismatch, stale mtime) are reported as
//! [`TokenchipperError::CacheInvalid`] and are meant to be absorbed by the
//! caller ([`crate::Tokenizer`]), which falls back to an in-memory rebuild —
//! correctness never depends on cache state.
//!
//! Staleness is checked two ways, per spec §4.6: the content hash of the
//! source vocabulary bytes (the primary, always-correct check), and the
//! source file's modification time, stored in the header at save time and
//! compared against the source file's current mtime at load time. A newer
//! source mtime than the one recorded in the cache marks the cache stale
//! even before the (more expensive) hash comparison would catch it.

use std::fs::{self, File};
use std::hash::{BuildHasher, Hasher};
use std::io::{self, Write};
use std::path::Path;
use std::time::SystemTime;

use crate::automaton::{Automaton, DoubleArrayState};
use crate::errors::{Result, TokenchipperError};
use crate::tables::BpeTables;
use crate::types::TokenId;
use crate::vocab::Vocabulary;

const VERSION: u32 = 1;
const STATE_RECORD_LEN: usize = 13; // base:u32 + check:u8 + fail:u32 + output_pos:u32

/// Which cache variant to read or write. The magic tag distinguishes them on
/// disk so a loader never has to guess the shape of the trailing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheVariant {
    /// Automaton states + outputs only.
    AutomatonOnly,
    /// Automaton + split table + next-prefix-match table.
    WithTables,
    /// Automaton + auxiliary tables + vocabulary bytes, mmap-friendly.
    WithVocab,
}

impl CacheVariant {
    fn magic(self) -> [u8; 4] {
        match self {
            CacheVariant::AutomatonOnly => *b"WCA1",
            CacheVariant::WithTables => *b"WCA2",
            CacheVariant::WithVocab => *b"WCA3",
        }
    }

    fn from_magic(magic: [u8; 4]) -> Option<Self> {
        match &magic {
            b"WCA1" => Some(CacheVariant::AutomatonOnly),
            b"WCA2" => Some(CacheVariant::WithTables),
            b"WCA3" => Some(CacheVariant::WithVocab),
            _ => None,
        }
    }
}

/// Content-based cache key: a fixed-seed hash (not the per-process randomized
/// hasher used for in-memory maps) so the same vocabulary bytes hash
/// identically across separate process runs, letting a freshly computed
/// hash be compared against the one stored in a cache file.
pub fn content_hash(vocab_bytes: &[u8]) -> u64 {
    let mut hasher = foldhash::fast::FixedState::default().build_hasher();
    hasher.write(vocab_bytes);
    hasher.finish()
}

/// Convert a [`SystemTime`] to nanoseconds since the Unix epoch, saturating
/// to `0` for times before it (e.g. on platforms with a weird clock). This
/// is the on-disk representation of the source file's modification time.
fn mtime_nanos(t: SystemTime) -> u64 {
    t.duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Owned source for the "ultra" variant's vocabulary-byte slices: either a
/// memory map (feature `mmap`) or an eagerly read owned buffer (spec §9's
/// documented fallback for platforms without mmap). Never exposed directly;
/// [`CachedAutomaton::vocab_bytes`] borrows from it for the caller.
enum BytesSource {
    #[cfg(feature = "mmap")]
    Mapped(memmap2::Mmap),
    Owned(Vec<u8>),
}

impl BytesSource {
    fn as_slice(&self) -> &[u8] {
        match self {
            #[cfg(feature = "mmap")]
            BytesSource::Mapped(m) => m,
            BytesSource::Owned(v) => v,
        }
    }
}

/// The result of loading a cache file: the automaton, optional auxiliary
/// tables, and (for the "ultra" variant) borrowed vocabulary byte spans tied
/// to the mapping's lifetime.
pub struct CachedAutomaton {
    /// The rebuilt automaton.
    pub automaton: Automaton,
    /// Split + next-prefix-match tables, present for [`CacheVariant::WithTables`]
    /// and [`CacheVariant::WithVocab`].
    pub tables: Option<BpeTables>,
    source: Option<BytesSource>,
    vocab_spans: Vec<(u32, u32)>,
}

impl CachedAutomaton {
    /// Borrowed vocabulary bytes for token `id`, if this cache carried a
    /// vocabulary ([`CacheVariant::WithVocab`]).
    pub fn vocab_bytes(&self, id: TokenId) -> Option<&[u8]> {
        let (start, end) = *self.vocab_spans.get(id as usize)?;
        let source = self.source.as_ref()?;
        Some(&source.as_slice()[start as usize..end as usize])
    }

    /// Number of tokens whose bytes this cache carries (0 unless
    /// [`CacheVariant::WithVocab`]).
    pub fn vocab_len(&self) -> usize {
        self.vocab_spans.len()
    }
}

fn write_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn write_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> Result<u32> {
    let slice = bytes
        .get(*pos..*pos + 4)
        .ok_or_else(|| TokenchipperError::CacheInvalid("truncated u32 field".into()))?;
    *pos += 4;
    Ok(u32::from_le_bytes(slice.try_into().unwrap()))
}

fn read_u64(bytes: &[u8], pos: &mut usize) -> Result<u64> {
    let slice = bytes
        .get(*pos..*pos + 8)
        .ok_or_else(|| TokenchipperError::CacheInvalid("truncated u64 field".into()))?;
    *pos += 8;
    Ok(u64::from_le_bytes(slice.try_into().unwrap()))
}

/// Serialize `automaton` (and, depending on `variant`, `tables`/`vocab`) to
/// `path`, keyed by `hash` (see [`content_hash`]) and by `source_mtime` (the
/// source vocabulary file's modification time at save time, spec §4.6).
///
/// Writes to a sibling temp file and renames into place, so a concurrent
/// reader never observes a partially written cache file.
pub fn save(
    path: impl AsRef<Path>,
    variant: CacheVariant,
    hash: u64,
    source_mtime: SystemTime,
    automaton: &Automaton,
    tables: Option<&BpeTables>,
    vocab: Option<&Vocabulary>,
) -> Result<()> {
    let path = path.as_ref();
    let mut buf = Vec::new();
    buf.extend_from_slice(&variant.magic());
    write_u32(&mut buf, VERSION);
    write_u64(&mut buf, hash);
    write_u64(&mut buf, mtime_nanos(source_mtime));
    write_u32(&mut buf, automaton.state_count() as u32);
    write_u32(&mut buf, automaton.outputs_len() as u32);

    let vocab_len = match variant {
        CacheVariant::AutomatonOnly => 0,
        CacheVariant::WithTables | CacheVariant::WithVocab => {
            tables.map(|t| t.len()).unwrap_or(0)
        }
    };
    write_u32(&mut buf, vocab_len as u32);

    let vocab_bytes_len = if variant == CacheVariant::WithVocab {
        vocab.map(|v| v.total_byte_len()).unwrap_or(0)
    } else {
        0
    };
    write_u32(&mut buf, vocab_bytes_len as u32);

    for state in automaton.states() {
        write_u32(&mut buf, state.base);
        buf.push(state.check);
        write_u32(&mut buf, state.fail);
        write_u32(&mut buf, state.output_pos);
    }
    for &output in automaton.outputs() {
        write_u32(&mut buf, output);
    }

    if variant != CacheVariant::AutomatonOnly {
        let tables = tables.expect("WithTables/WithVocab cache requires tables");
        for id in 0..vocab_len as TokenId {
            let (l, r) = tables.split_of(id);
            write_u32(&mut buf, l);
            write_u32(&mut buf, r);
        }
        for id in 0..vocab_len as TokenId {
            write_u32(&mut buf, tables.next_prefix_raw(id));
        }
    }

    if variant == CacheVariant::WithVocab {
        let vocab = vocab.expect("WithVocab cache requires a vocabulary");
        let mut offset = 0u32;
        for id in 0..vocab_len as TokenId {
            write_u32(&mut buf, offset);
            offset += vocab.bytes_of(id).map(|b| b.len() as u32).unwrap_or(0);
        }
        write_u32(&mut buf, offset);
        for id in 0..vocab_len as TokenId {
            if let Some(bytes) = vocab.bytes_of(id) {
                buf.extend_from_slice(bytes);
            }
        }
    }

    let tmp_path = path.with_extension("tmp");
    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&buf)?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load a cache file previously written by [`save`], verifying its magic,
/// version, content hash against `expected_hash`, and stored source mtime
/// against `source_mtime` (the source vocabulary file's *current*
/// modification time; spec §4.6 — a cache is stale if the source is newer
/// than what the cache recorded at save time).
pub fn load(
    path: impl AsRef<Path>,
    expected_hash: u64,
    source_mtime: SystemTime,
) -> Result<CachedAutomaton> {
    let path = path.as_ref();
    let source_mtime = mtime_nanos(source_mtime);

    #[cfg(feature = "mmap")]
    {
        let file = File::open(path)?;
        if let Ok(mmap) = unsafe { memmap2::Mmap::map(&file) } {
            let mut cached = parse(&mmap, expected_hash, source_mtime)?;
            cached.source = Some(BytesSource::Mapped(mmap));
            return Ok(cached);
        }
        // Falls through to the eager-read path below on mmap failure
        // (e.g. zero-length file, unsupported filesystem).
    }

    let bytes = fs::read(path)?;
    let mut cached = parse(&bytes, expected_hash, source_mtime)?;
    cached.source = Some(BytesSource::Owned(bytes));
    Ok(cached)
}

fn parse(bytes: &[u8], expected_hash: u64, source_mtime: u64) -> Result<CachedAutomaton> {
    if bytes.len() < 4 {
        return Err(TokenchipperError::CacheInvalid("file too short".into()));
    }
    let magic: [u8; 4] = bytes[0..4].try_into().unwrap();
    let variant = CacheVariant::from_magic(magic)
        .ok_or_else(|| TokenchipperError::CacheInvalid("unrecognized magic".into()))?;

    let mut pos = 4usize;
    let version = read_u32(bytes, &mut pos)?;
    if version != VERSION {
        return Err(TokenchipperError::CacheInvalid(format!(
            "unsupported cache version {version}"
        )));
    }
    let hash = read_u64(bytes, &mut pos)?;
    if hash != expected_hash {
        return Err(TokenchipperError::CacheInvalid(
            "content hash mismatch; source vocabulary changed".into(),
        ));
    }
    let cached_mtime = read_u64(bytes, &mut pos)?;
    if source_mtime > cached_mtime {
        return Err(TokenchipperError::CacheInvalid(
            "source vocabulary file is newer than the cache".into(),
        ));
    }
    let states_len = read_u32(bytes, &mut pos)? as usize;
    let outputs_len = read_u32(bytes, &mut pos)? as usize;
    let vocab_len = read_u32(bytes, &mut pos)? as usize;
    let vocab_bytes_len = read_u32(bytes, &mut pos)? as usize;

    let min_remaining = states_len * STATE_RECORD_LEN + outputs_len * 4;
    if bytes.len() < pos + min_remaining {
        return Err(TokenchipperError::CacheInvalid(
            "file shorter than its own header declares".into(),
        ));
    }

    let mut states = Vec::with_capacity(states_len);
    for _ in 0..states_len {
        let base = read_u32(bytes, &mut pos)?;
        let check = *bytes
            .get(pos)
            .ok_or_else(|| TokenchipperError::CacheInvalid("truncated state record".into()))?;
        pos += 1;
        let fail = read_u32(bytes, &mut pos)?;
        let output_pos = read_u32(bytes, &mut pos)?;
        states.push(DoubleArrayState {
            base,
            check,
            fail,
            output_pos,
        });
    }
    let mut outputs = Vec::with_capacity(outputs_len);
    for _ in 0..outputs_len {
        outputs.push(read_u32(bytes, &mut pos)?);
    }
    let automaton = Automaton::from_parts(states, outputs);

    let tables = if variant == CacheVariant::AutomatonOnly {
        None
    } else {
        let mut split = Vec::with_capacity(vocab_len);
        for _ in 0..vocab_len {
            let l = read_u32(bytes, &mut pos)?;
            let r = read_u32(bytes, &mut pos)?;
            split.push((l, r));
        }
        let mut next_prefix = Vec::with_capacity(vocab_len);
        for _ in 0..vocab_len {
            next_prefix.push(read_u32(bytes, &mut pos)?);
        }
        Some(BpeTables::from_cached_parts(split, next_prefix))
    };

    let vocab_spans = if variant == CacheVariant::WithVocab {
        let mut offsets = Vec::with_capacity(vocab_len + 1);
        for _ in 0..=vocab_len {
            offsets.push(read_u32(bytes, &mut pos)?);
        }
        let blob_start = pos;
        if bytes.len() < blob_start + vocab_bytes_len {
            return Err(TokenchipperError::CacheInvalid(
                "truncated vocabulary byte blob".into(),
            ));
        }
        offsets
            .windows(2)
            .map(|w| (blob_start as u32 + w[0], blob_start as u32 + w[1]))
            .collect()
    } else {
        Vec::new()
    };

    Ok(CachedAutomaton {
        automaton,
        tables,
        source: None,
        vocab_spans,
    })
}

/// Wraps `std::io::Error` into [`TokenchipperError::Io`] for callers that
/// want to treat any I/O failure (missing file, permission denied) the same
/// way as a structurally invalid cache: a signal to rebuild.
pub fn io_error_is_cache_miss(err: &TokenchipperError) -> bool {
    matches!(err, TokenchipperError::Io(e) if e.kind() == io::ErrorKind::NotFound)
}
