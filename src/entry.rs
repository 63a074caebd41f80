// Wire layout (little-endian): op u8, key_len u16, key, payload_len u32, payload.
// Minimum valid encoding is 7 bytes; an empty key is rejected at decode.

use std::convert::TryFrom;
use crate::error::{Error, Result};

const OP_SIZE: usize = 1;
const KEY_LEN_SIZE: usize = 2;
const PAYLOAD_LEN_SIZE: usize = 4;
const HEADER_SIZE: usize = OP_SIZE + KEY_LEN_SIZE + PAYLOAD_LEN_SIZE;

pub const MAX_KEY_LEN: usize = u16::MAX as usize;
pub const MAX_PAYLOAD_LEN: usize = u32::MAX as usize;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum Op {
	Insert = 1,
	Update = 2,
	Delete = 3,
	Metadata = 4,
}

impl TryFrom<u8> for Op {
	type Error = Error;

	fn try_from(b: u8) -> Result<Op> {
		match b {
			1 => Ok(Op::Insert),
			2 => Ok(Op::Update),
			3 => Ok(Op::Delete),
			4 => Ok(Op::Metadata),
			other => Err(Error::CorruptedEntry(format!("unknown op byte {}", other))),
		}
	}
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Entry {
	pub op: Op,
	pub key: Vec<u8>,
	pub payload: Vec<u8>,
}

impl Entry {
	pub fn insert(key: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) -> Entry {
		Entry { op: Op::Insert, key: key.into(), payload: payload.into() }
	}

	pub fn update(key: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) -> Entry {
		Entry { op: Op::Update, key: key.into(), payload: payload.into() }
	}

	pub fn delete(key: impl Into<Vec<u8>>) -> Entry {
		Entry { op: Op::Delete, key: key.into(), payload: Vec::new() }
	}

	pub fn encoded_len(&self) -> usize {
		HEADER_SIZE + self.key.len() + self.payload.len()
	}

	/// Total length = 1 + 2 + |key| + 4 + |payload|.
	pub fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
		if self.key.is_empty() {
			return Err(Error::EmptyKey);
		}
		if self.key.len() > MAX_KEY_LEN {
			return Err(Error::CorruptedEntry(format!("key too long: {} bytes", self.key.len())));
		}
		if self.op == Op::Delete && !self.payload.is_empty() {
			return Err(Error::CorruptedEntry("delete entry must carry an empty payload".into()));
		}
		out.reserve(self.encoded_len());
		out.push(self.op as u8);
		out.extend_from_slice(&(self.key.len() as u16).to_le_bytes());
		out.extend_from_slice(&self.key);
		out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
		out.extend_from_slice(&self.payload);
		Ok(())
	}

	/// Decode one entry starting at `buf[0]`. Returns the entry and the
	/// number of bytes consumed so callers can advance a cursor over a
	/// concatenation of entries.
	pub fn decode(buf: &[u8]) -> Result<(Entry, usize)> {
		if buf.len() < HEADER_SIZE {
			return Err(Error::CorruptedEntry("truncated entry header".into()));
		}
		let op = Op::try_from(buf[0])?;
		let key_len = u16::from_le_bytes([buf[1], buf[2]]) as usize;
		if key_len == 0 {
			return Err(Error::EmptyKey);
		}
		let key_start = OP_SIZE + KEY_LEN_SIZE;
		let key_end = key_start + key_len;
		if buf.len() < key_end + PAYLOAD_LEN_SIZE {
			return Err(Error::CorruptedEntry("truncated entry key".into()));
		}
		let key = buf[key_start..key_end].to_vec();
		let payload_len = u32::from_le_bytes([
			buf[key_end],
			buf[key_end + 1],
			buf[key_end + 2],
			buf[key_end + 3],
		]) as usize;
		let payload_start = key_end + PAYLOAD_LEN_SIZE;
		let payload_end = payload_start + payload_len;
		if buf.len() < payload_end {
			return Err(Error::CorruptedEntry("truncated entry payload".into()));
		}
		if op == Op::Delete && payload_len != 0 {
			return Err(Error::CorruptedEntry("delete entry carries a non-empty payload".into()));
		}
		let payload = buf[payload_start..payload_end].to_vec();
		Ok((Entry { op, key, payload }, payload_end))
	}
}
