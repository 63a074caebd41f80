//! `swamplog` is an append-only, block-compressed key-value log with online
//! compaction — the storage substrate for a single partition ("swamp") of
//! the HydrAIDE document database.
//!
//! A swamp is one file. Writes are buffered into size-bounded blocks,
//! Snappy-compressed and CRC-32-checksummed, and appended. Reads replay the
//! file sequentially into a flat in-memory index; there is no secondary
//! indexing or random-access mutation inside the file itself. When a file
//! accumulates enough dead records (overwritten or deleted keys),
//! [`Compactor`] rewrites it into a temp file and atomically renames it
//! into place.
//!
//! This crate has no transport, no service wrapper, and no CLI: those are
//! the enclosing system's concern. It also performs no background
//! compaction of its own — the predicate ([`Compactor::should_compact`]) is
//! provided, but invoking it on a schedule is left to the caller.

pub mod block;
pub mod compactor;
mod display;
pub mod entry;
pub mod error;
pub mod header;
pub mod metadata;
pub mod options;
pub mod reader;
pub mod writer;

pub use block::{Block, BlockHeader};
pub use compactor::{cleanup_compaction_temp, CompactionReport, Compactor};
pub use entry::{Entry, Op};
pub use error::{Error, Result};
pub use header::FileHeader;
pub use metadata::{PartitionMetadata, RESERVED_METADATA_KEY};
pub use options::{CompactorOptions, WriterOptions, DEFAULT_MAX_BLOCK_SIZE};
pub use reader::{ControlFlow, LiveIndex, Reader};
pub use writer::Writer;

/// Opens (creating if absent) the log file at `path` for appending.
/// `max_block_size == 0` selects the default (16 KiB).
pub fn open_writer(path: impl AsRef<std::path::Path>, max_block_size: u32) -> Result<Writer> {
	Writer::open(path, max_block_size)
}

/// Opens the log file at `path` for sequential reading and replay.
pub fn open_reader(path: impl AsRef<std::path::Path>) -> Result<Reader> {
	Reader::open(path)
}

/// Builds a [`Compactor`] for the log file at `path`. `threshold` is the
/// fragmentation ratio in `(0, 1]` at or above which `compact()` rewrites
/// the file.
pub fn compactor(path: impl AsRef<std::path::Path>, max_block_size: u32, threshold: f64) -> Compactor {
	Compactor::new(path, max_block_size, threshold)
}
