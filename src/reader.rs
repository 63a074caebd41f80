use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::block::{self, Block, BlockHeader, BLOCK_HEADER_SIZE};
use crate::entry::Op;
use crate::error::{Error, Result};
use crate::header::{FileHeader, HEADER_SIZE};
use crate::metadata::PartitionMetadata;

/// Returned from a `for_each_entry` callback to halt iteration early.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ControlFlow {
	Continue,
	Stop,
}

/// The replayed logical state of a swamp: live key -> latest payload,
/// plus the most recently applied partition metadata, if any.
#[derive(Debug, Clone, Default)]
pub struct LiveIndex {
	pub entries: HashMap<Vec<u8>, Vec<u8>>,
	pub metadata: Option<PartitionMetadata>,
	/// Every entry replayed, live or dead, including metadata entries.
	pub total_entries: u64,
}

impl LiveIndex {
	/// Number of currently-live records: user keys plus the metadata record, if present.
	pub fn live_count(&self) -> u64 {
		self.entries.len() as u64 + self.metadata.is_some() as u64
	}
}

pub struct Reader {
	path: PathBuf,
	file: File,
	pub header: FileHeader,
}

impl Reader {
	pub fn open(path: impl AsRef<Path>) -> Result<Reader> {
		let path = path.as_ref().to_path_buf();
		let mut file = File::open(&path).map_err(|e| Error::io(&path, e))?;
		let mut buf = [0u8; HEADER_SIZE];
		file.read_exact(&mut buf).map_err(|e| Error::io(&path, e))?;
		let header = FileHeader::deserialize(&buf)?;
		Ok(Reader { path, file, header })
	}

	/// Sequential iterator over `(offset, block)` pairs, starting right
	/// after the file header. Terminates at EOF; a partial/corrupt block at
	/// the tail surfaces as an error rather than being silently dropped.
	pub fn iter_blocks(&self) -> Result<BlockIter> {
		let file = self.file.try_clone().map_err(|e| Error::io(&self.path, e))?;
		Ok(BlockIter { path: self.path.clone(), reader: BufReader::new(file), offset: HEADER_SIZE as u64, done: false })
	}

	/// Stream every entry across every block, in file order. Halts as soon
	/// as `f` returns `ControlFlow::Stop`.
	pub fn for_each_entry<F>(&self, mut f: F) -> Result<()>
	where
		F: FnMut(&crate::entry::Entry) -> Result<ControlFlow>,
	{
		for item in self.iter_blocks()? {
			let (_offset, block) = item?;
			for entry in &block.entries {
				if f(entry)? == ControlFlow::Stop {
					return Ok(());
				}
			}
		}
		Ok(())
	}

	/// Replay every entry into a live map. `Insert`/`Update` install a
	/// defensive copy of the payload, `Delete` removes the key, `Metadata`
	/// is applied into a separate record. Last writer wins.
	pub fn build_live_index(&self) -> Result<LiveIndex> {
		let mut index = LiveIndex::default();
		self.for_each_entry(|entry| {
			index.total_entries += 1;
			match entry.op {
				Op::Insert | Op::Update => {
					index.entries.insert(entry.key.clone(), entry.payload.clone());
				}
				Op::Delete => {
					index.entries.remove(&entry.key);
				}
				Op::Metadata => {
					index.metadata = Some(PartitionMetadata::from_entry(entry)?);
				}
			}
			Ok(ControlFlow::Continue)
		})?;
		Ok(index)
	}

	/// `(ratio, live_count, total_count)`, `ratio = (total - live) / total`, `0/0 -> 0`.
	pub fn fragmentation(&self) -> Result<(f64, u64, u64)> {
		let index = self.build_live_index()?;
		let total = index.total_entries;
		let live = index.live_count();
		let ratio = if total == 0 { 0.0 } else { (total - live) as f64 / total as f64 };
		Ok((ratio, live, total))
	}
}

pub struct BlockIter {
	path: PathBuf,
	reader: BufReader<File>,
	offset: u64,
	done: bool,
}

impl BlockIter {
	fn read_one(&mut self) -> Result<Option<(u64, Block)>> {
		let start_offset = self.offset;
		let mut header_bytes = [0u8; BLOCK_HEADER_SIZE];
		let mut read_total = 0usize;
		loop {
			match self.reader.read(&mut header_bytes[read_total..]) {
				Ok(0) => break,
				Ok(n) => read_total += n,
				Err(e) => return Err(Error::io(&self.path, e)),
			}
			if read_total == BLOCK_HEADER_SIZE {
				break;
			}
		}
		if read_total == 0 {
			return Ok(None);
		}
		if read_total != BLOCK_HEADER_SIZE {
			return Err(Error::CorruptedBlock(format!(
				"truncated block header at offset {}: got {} of {} bytes",
				start_offset, read_total, BLOCK_HEADER_SIZE
			)));
		}
		let header = BlockHeader::decode(&header_bytes);
		let mut body = vec![0u8; header.compressed_size as usize];
		self.reader.read_exact(&mut body).map_err(|e| {
			Error::CorruptedBlock(format!("truncated block body at offset {}: {}", start_offset, e))
		})?;
		let block = block::parse_block(&header, &body)?;
		self.offset = start_offset + BLOCK_HEADER_SIZE as u64 + body.len() as u64;
		Ok(Some((start_offset, block)))
	}
}

impl Iterator for BlockIter {
	type Item = Result<(u64, Block)>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.done {
			return None;
		}
		match self.read_one() {
			Ok(Some(item)) => Some(Ok(item)),
			Ok(None) => {
				self.done = true;
				None
			}
			Err(e) => {
				self.done = true;
				Some(Err(e))
			}
		}
	}
}
