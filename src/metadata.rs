// Partition-level attributes, carried as a Metadata-op Entry whose key is
// the reserved literal below. Payload layout:
// name_len u16, name, created_at i64, kv_count u16, [key_len u16, key, val_len u16, val]*

use crate::entry::{Entry, Op};
use crate::error::{Error, Result};

pub const RESERVED_METADATA_KEY: &[u8] = b"__swamp_metadata__";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartitionMetadata {
	pub name: String,
	pub created_at: i64,
	pub attributes: Vec<(String, String)>,
}

impl PartitionMetadata {
	pub fn new(name: impl Into<String>, created_at: i64) -> PartitionMetadata {
		PartitionMetadata { name: name.into(), created_at, attributes: Vec::new() }
	}

	pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> PartitionMetadata {
		self.attributes.push((key.into(), value.into()));
		self
	}

	fn encode_payload(&self) -> Result<Vec<u8>> {
		let mut buf = Vec::new();
		let name_bytes = self.name.as_bytes();
		if name_bytes.len() > u16::MAX as usize {
			return Err(Error::CorruptedEntry("metadata name too long".into()));
		}
		buf.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
		buf.extend_from_slice(name_bytes);
		buf.extend_from_slice(&self.created_at.to_le_bytes());
		if self.attributes.len() > u16::MAX as usize {
			return Err(Error::CorruptedEntry("too many metadata attributes".into()));
		}
		buf.extend_from_slice(&(self.attributes.len() as u16).to_le_bytes());
		for (k, v) in &self.attributes {
			let kb = k.as_bytes();
			let vb = v.as_bytes();
			if kb.len() > u16::MAX as usize || vb.len() > u16::MAX as usize {
				return Err(Error::CorruptedEntry("metadata attribute too long".into()));
			}
			buf.extend_from_slice(&(kb.len() as u16).to_le_bytes());
			buf.extend_from_slice(kb);
			buf.extend_from_slice(&(vb.len() as u16).to_le_bytes());
			buf.extend_from_slice(vb);
		}
		Ok(buf)
	}

	fn decode_payload(buf: &[u8]) -> Result<PartitionMetadata> {
		let mut cursor = 0;
		let read_u16 = |buf: &[u8], at: usize| -> Result<u16> {
			if buf.len() < at + 2 {
				return Err(Error::CorruptedEntry("truncated metadata".into()));
			}
			Ok(u16::from_le_bytes([buf[at], buf[at + 1]]))
		};
		let name_len = read_u16(buf, cursor)? as usize;
		cursor += 2;
		if buf.len() < cursor + name_len {
			return Err(Error::CorruptedEntry("truncated metadata name".into()));
		}
		let name = String::from_utf8(buf[cursor..cursor + name_len].to_vec())
			.map_err(|_| Error::CorruptedEntry("metadata name is not valid UTF-8".into()))?;
		cursor += name_len;
		if buf.len() < cursor + 8 {
			return Err(Error::CorruptedEntry("truncated metadata created_at".into()));
		}
		let created_at = i64::from_le_bytes(buf[cursor..cursor + 8].try_into().unwrap());
		cursor += 8;
		let kv_count = read_u16(buf, cursor)? as usize;
		cursor += 2;
		let mut attributes = Vec::with_capacity(kv_count);
		for _ in 0..kv_count {
			let key_len = read_u16(buf, cursor)? as usize;
			cursor += 2;
			if buf.len() < cursor + key_len {
				return Err(Error::CorruptedEntry("truncated metadata key".into()));
			}
			let key = String::from_utf8(buf[cursor..cursor + key_len].to_vec())
				.map_err(|_| Error::CorruptedEntry("metadata key is not valid UTF-8".into()))?;
			cursor += key_len;
			let val_len = read_u16(buf, cursor)? as usize;
			cursor += 2;
			if buf.len() < cursor + val_len {
				return Err(Error::CorruptedEntry("truncated metadata value".into()));
			}
			let val = String::from_utf8(buf[cursor..cursor + val_len].to_vec())
				.map_err(|_| Error::CorruptedEntry("metadata value is not valid UTF-8".into()))?;
			cursor += val_len;
			attributes.push((key, val));
		}
		Ok(PartitionMetadata { name, created_at, attributes })
	}

	pub fn to_entry(&self) -> Result<Entry> {
		Ok(Entry { op: Op::Metadata, key: RESERVED_METADATA_KEY.to_vec(), payload: self.encode_payload()? })
	}

	pub fn from_entry(entry: &Entry) -> Result<PartitionMetadata> {
		if entry.op != Op::Metadata {
			return Err(Error::CorruptedEntry("not a metadata entry".into()));
		}
		if entry.key != RESERVED_METADATA_KEY {
			return Err(Error::CorruptedEntry("metadata entry has the wrong reserved key".into()));
		}
		Self::decode_payload(&entry.payload)
	}
}
