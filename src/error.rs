use std::fmt;
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, Error>;

/// Distinct error kinds for the log format. Callers discriminate by variant,
/// not by string.
#[derive(Debug)]
pub enum Error {
	/// The first 4 bytes of the file were not `HYDR`.
	InvalidMagic,
	/// The header's version field did not equal the version this crate reads.
	UnsupportedVersion(u16),
	/// CRC mismatch, decompressed-size mismatch, or a decode failure inside a block body.
	CorruptedBlock(String),
	/// A truncated or malformed entry inside an otherwise valid block.
	CorruptedEntry(String),
	/// An entry was submitted with a zero-length key.
	EmptyKey,
	/// Operation attempted on a Writer after `close()` already ran.
	Closed,
	/// `compact()` called while another compaction is already running on this handle.
	CompactionAlreadyRunning,
	/// Any OS-level file error, with the path that was being operated on.
	Io { path: PathBuf, source: std::io::Error },
}

impl Error {
	pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Error {
		Error::Io { path: path.as_ref().to_path_buf(), source }
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::InvalidMagic => write!(f, "invalid file magic, expected \"HYDR\""),
			Error::UnsupportedVersion(v) => write!(f, "unsupported file version {}", v),
			Error::CorruptedBlock(msg) => write!(f, "corrupted block: {}", msg),
			Error::CorruptedEntry(msg) => write!(f, "corrupted entry: {}", msg),
			Error::EmptyKey => write!(f, "entry key must not be empty"),
			Error::Closed => write!(f, "operation on a closed writer"),
			Error::CompactionAlreadyRunning => write!(f, "compaction already running"),
			Error::Io { path, source } => write!(f, "I/O error on {}: {}", path.display(), source),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Io { source, .. } => Some(source),
			_ => None,
		}
	}
}

// Plain `?` conversion where the path is not locally known; call sites that
// have a path prefer `Error::io(path, e)` for better diagnostics.
impl From<std::io::Error> for Error {
	fn from(source: std::io::Error) -> Error {
		Error::Io { path: PathBuf::new(), source }
	}
}
