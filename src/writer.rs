use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::block;
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::header::{FileHeader, HEADER_SIZE};
use crate::options::WriterOptions;

fn now_ns() -> i64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_nanos() as i64)
		.unwrap_or(0)
}

struct WriterState {
	file: File,
	buffer: Vec<Entry>,
	buffered_bytes: usize,
	block_count: u64,
	entry_count: u64,
	closed: bool,
}

/// Buffered, thread-safe append path: entries are accumulated and flushed
/// into size-bounded compressed blocks. All public operations take the
/// single internal lock for their duration — this crate optimizes for
/// batched writes from one producer but is correct under any number of
/// concurrent callers.
pub struct Writer {
	path: PathBuf,
	max_block_size: u32,
	state: Mutex<WriterState>,
}

impl Writer {
	/// `max_block_size == 0` means the default (16 KiB).
	pub fn open(path: impl AsRef<Path>, max_block_size: u32) -> Result<Writer> {
		let path = path.as_ref().to_path_buf();
		let options = WriterOptions::new(max_block_size);
		let mut file = OpenOptions::new()
			.create(true)
			.read(true)
			.write(true)
			.open(&path)
			.map_err(|e| Error::io(&path, e))?;

		let file_len = file.metadata().map_err(|e| Error::io(&path, e))?.len();
		let header = if file_len == 0 {
			let header = FileHeader::new(options.max_block_size, now_ns());
			file.write_all(&header.serialize()).map_err(|e| Error::io(&path, e))?;
			log::debug!(target: "swamplog", "Created new log file {}", path.display());
			header
		} else {
			let mut buf = [0u8; HEADER_SIZE];
			file.read_exact(&mut buf).map_err(|e| Error::io(&path, e))?;
			let header = FileHeader::deserialize(&buf)?;
			log::debug!(
				target: "swamplog",
				"Reopened log file {} with {} blocks, {} advisory entries",
				path.display(),
				header.block_count,
				header.live_entry_count,
			);
			header
		};
		file.seek(SeekFrom::End(0)).map_err(|e| Error::io(&path, e))?;

		Ok(Writer {
			path,
			max_block_size: options.max_block_size,
			state: Mutex::new(WriterState {
				file,
				buffer: Vec::new(),
				buffered_bytes: 0,
				block_count: header.block_count,
				entry_count: header.live_entry_count,
				closed: false,
			}),
		})
	}

	pub fn append(&self, entry: Entry) -> Result<()> {
		let mut state = self.state.lock();
		Self::append_locked(&self.path, &mut state, entry)?;
		if state.buffered_bytes as u32 >= self.max_block_size {
			Self::flush_locked(&self.path, &mut state)?;
		}
		Ok(())
	}

	pub fn append_batch(&self, entries: impl IntoIterator<Item = Entry>) -> Result<()> {
		let mut state = self.state.lock();
		for entry in entries {
			Self::append_locked(&self.path, &mut state, entry)?;
			if state.buffered_bytes as u32 >= self.max_block_size {
				Self::flush_locked(&self.path, &mut state)?;
			}
		}
		Ok(())
	}

	fn append_locked(path: &Path, state: &mut WriterState, entry: Entry) -> Result<()> {
		if state.closed {
			return Err(Error::Closed);
		}
		if entry.key.is_empty() {
			return Err(Error::EmptyKey);
		}
		log::trace!(target: "swamplog", "{}: buffering entry key={}", path.display(), crate::display::hex(&entry.key));
		state.buffered_bytes += entry.encoded_len();
		state.buffer.push(entry);
		Ok(())
	}

	/// Compress the buffer into one block and append it. A no-op on an
	/// empty buffer.
	pub fn flush(&self) -> Result<()> {
		let mut state = self.state.lock();
		if state.closed {
			return Err(Error::Closed);
		}
		Self::flush_locked(&self.path, &mut state)
	}

	fn flush_locked(path: &Path, state: &mut WriterState) -> Result<()> {
		if state.buffer.is_empty() {
			return Ok(());
		}
		let (header, body) = block::compress_entries(&state.buffer)?;
		state.file.write_all(&header.encode()).map_err(|e| Error::io(path, e))?;
		state.file.write_all(&body).map_err(|e| Error::io(path, e))?;
		state.block_count += 1;
		state.entry_count += header.entry_count as u64;
		log::debug!(
			target: "swamplog",
			"{}: flushed block #{} with {} entries ({} -> {} bytes)",
			path.display(),
			state.block_count,
			header.entry_count,
			header.uncompressed_size,
			header.compressed_size,
		);
		state.buffer.clear();
		state.buffered_bytes = 0;
		Ok(())
	}

	/// Flush the buffer, rewrite the header with current counters, and
	/// fsync. The only operation that durably persists bytes to stable media —
	/// `append`/`flush` only guarantee bytes have been handed to the OS.
	pub fn sync(&self) -> Result<()> {
		let mut state = self.state.lock();
		if state.closed {
			return Err(Error::Closed);
		}
		Self::flush_locked(&self.path, &mut state)?;
		Self::rewrite_header_locked(&self.path, self.max_block_size, &mut state)?;
		state.file.sync_all().map_err(|e| Error::io(&self.path, e))?;
		Ok(())
	}

	fn rewrite_header_locked(path: &Path, max_block_size: u32, state: &mut WriterState) -> Result<()> {
		let mut existing = [0u8; HEADER_SIZE];
		state.file.seek(SeekFrom::Start(0)).map_err(|e| Error::io(path, e))?;
		state.file.read_exact(&mut existing).map_err(|e| Error::io(path, e))?;
		let created_at = FileHeader::deserialize(&existing).map(|h| h.created_at).unwrap_or_else(|_| now_ns());
		let header = FileHeader {
			flags: 0,
			created_at,
			modified_at: now_ns(),
			max_block_size,
			live_entry_count: state.entry_count,
			block_count: state.block_count,
		};
		state.file.seek(SeekFrom::Start(0)).map_err(|e| Error::io(path, e))?;
		state.file.write_all(&header.serialize()).map_err(|e| Error::io(path, e))?;
		state.file.seek(SeekFrom::End(0)).map_err(|e| Error::io(path, e))?;
		Ok(())
	}

	/// Idempotent: a final flush and header rewrite run only on the first call.
	pub fn close(&self) -> Result<()> {
		let mut state = self.state.lock();
		if state.closed {
			return Ok(());
		}
		Self::flush_locked(&self.path, &mut state)?;
		Self::rewrite_header_locked(&self.path, self.max_block_size, &mut state)?;
		state.file.sync_all().map_err(|e| Error::io(&self.path, e))?;
		state.closed = true;
		log::debug!(target: "swamplog", "{}: closed, {} blocks, {} entries", self.path.display(), state.block_count, state.entry_count);
		Ok(())
	}

	pub fn stats(&self) -> (u64, u64, usize) {
		let state = self.state.lock();
		(state.block_count, state.entry_count, state.buffer.len())
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}
