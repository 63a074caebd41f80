// On-disk block layout (little-endian):
// [compressed_size: 4][uncompressed_size: 4][entry_count: 2][checksum: 4][flags: 2]
// followed by `compressed_size` bytes of Snappy-compressed, concatenated entries.

use crate::entry::Entry;
use crate::error::{Error, Result};

pub const BLOCK_HEADER_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BlockHeader {
	pub compressed_size: u32,
	pub uncompressed_size: u32,
	pub entry_count: u16,
	pub checksum: u32,
	pub flags: u16,
}

impl BlockHeader {
	pub fn encode(&self) -> [u8; BLOCK_HEADER_SIZE] {
		let mut buf = [0u8; BLOCK_HEADER_SIZE];
		buf[0..4].copy_from_slice(&self.compressed_size.to_le_bytes());
		buf[4..8].copy_from_slice(&self.uncompressed_size.to_le_bytes());
		buf[8..10].copy_from_slice(&self.entry_count.to_le_bytes());
		buf[10..14].copy_from_slice(&self.checksum.to_le_bytes());
		buf[14..16].copy_from_slice(&self.flags.to_le_bytes());
		buf
	}

	pub fn decode(buf: &[u8; BLOCK_HEADER_SIZE]) -> BlockHeader {
		BlockHeader {
			compressed_size: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
			uncompressed_size: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
			entry_count: u16::from_le_bytes(buf[8..10].try_into().unwrap()),
			checksum: u32::from_le_bytes(buf[10..14].try_into().unwrap()),
			flags: u16::from_le_bytes(buf[14..16].try_into().unwrap()),
		}
	}
}

/// A decoded block: header plus the entries it held, in file order.
#[derive(Debug, Clone)]
pub struct Block {
	pub header: BlockHeader,
	pub entries: Vec<Entry>,
}

fn crc32(data: &[u8]) -> u32 {
	let mut hasher = crc32fast::Hasher::new();
	hasher.update(data);
	hasher.finalize()
}

/// Concatenate and Snappy-compress `entries`, computing the header fields
/// for the result. Errors if there are more than `u16::MAX` entries or any
/// entry fails to encode (e.g. empty key).
pub fn compress_entries(entries: &[Entry]) -> Result<(BlockHeader, Vec<u8>)> {
	if entries.len() > u16::MAX as usize {
		return Err(Error::CorruptedBlock(format!("too many entries in one block: {}", entries.len())));
	}
	let mut raw = Vec::new();
	for e in entries {
		e.encode(&mut raw)?;
	}
	let uncompressed_size = raw.len() as u32;
	let compressed = snap::raw::Encoder::new()
		.compress_vec(&raw)
		.map_err(|e| Error::CorruptedBlock(format!("snappy compression failed: {}", e)))?;
	let checksum = crc32(&compressed);
	let header = BlockHeader {
		compressed_size: compressed.len() as u32,
		uncompressed_size,
		entry_count: entries.len() as u16,
		checksum,
		flags: 0,
	};
	Ok((header, compressed))
}

/// Verify checksum, decompress, and decode exactly `header.entry_count`
/// entries out of `body`. Any residual bytes or premature exhaustion is
/// `CorruptedBlock` — partial recovery of a corrupt block is never attempted.
pub fn parse_block(header: &BlockHeader, body: &[u8]) -> Result<Block> {
	if body.len() != header.compressed_size as usize {
		return Err(Error::CorruptedBlock(format!(
			"body length {} does not match header compressed_size {}",
			body.len(),
			header.compressed_size
		)));
	}
	let checksum = crc32(body);
	if checksum != header.checksum {
		return Err(Error::CorruptedBlock(format!(
			"checksum mismatch: header says {:#x}, computed {:#x}",
			header.checksum, checksum
		)));
	}
	let raw = snap::raw::Decoder::new()
		.decompress_vec(body)
		.map_err(|e| Error::CorruptedBlock(format!("snappy decompression failed: {}", e)))?;
	if raw.len() != header.uncompressed_size as usize {
		return Err(Error::CorruptedBlock(format!(
			"decompressed length {} does not match header uncompressed_size {}",
			raw.len(),
			header.uncompressed_size
		)));
	}
	let mut entries = Vec::with_capacity(header.entry_count as usize);
	let mut cursor = 0;
	for _ in 0..header.entry_count {
		let (entry, consumed) = Entry::decode(&raw[cursor..])
			.map_err(|e| Error::CorruptedBlock(format!("entry decode failed: {}", e)))?;
		cursor += consumed;
		entries.push(entry);
	}
	if cursor != raw.len() {
		return Err(Error::CorruptedBlock(format!(
			"{} residual bytes after decoding {} entries",
			raw.len() - cursor,
			header.entry_count
		)));
	}
	Ok(Block { header: *header, entries })
}
