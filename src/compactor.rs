use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::options::CompactorOptions;
use crate::reader::{LiveIndex, Reader};
use crate::writer::Writer;

const COMPACT_SUFFIX: &str = "compact";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompactionReport {
	pub compacted: bool,
	pub old_size: u64,
	pub new_size: u64,
	pub total_entries: u64,
	pub live_entries: u64,
	pub removed_entries: u64,
	pub fragmentation_ratio: f64,
}

impl CompactionReport {
	fn unchanged(old_size: u64, total: u64, live: u64, ratio: f64) -> CompactionReport {
		CompactionReport {
			compacted: false,
			old_size,
			new_size: old_size,
			total_entries: total,
			live_entries: live,
			removed_entries: total.saturating_sub(live),
			fragmentation_ratio: ratio,
		}
	}
}

/// Online, atomic rewrite of a log file: read + replay -> write-to-temp ->
/// atomic rename. Gated on a fragmentation threshold and single-flight per
/// handle — a second concurrent call fails rather than racing the first.
pub struct Compactor {
	path: PathBuf,
	options: CompactorOptions,
	in_progress: AtomicBool,
}

impl Compactor {
	pub fn new(path: impl AsRef<Path>, max_block_size: u32, threshold: f64) -> Compactor {
		Compactor {
			path: path.as_ref().to_path_buf(),
			options: CompactorOptions::new(max_block_size, threshold),
			in_progress: AtomicBool::new(false),
		}
	}

	fn temp_path(&self) -> PathBuf {
		let mut p = self.path.clone().into_os_string();
		p.push(".");
		p.push(COMPACT_SUFFIX);
		PathBuf::from(p)
	}

	/// Reopens the file and computes fragmentation. A non-existent file is `(false, 0.0)`.
	pub fn should_compact(&self) -> Result<(bool, f64)> {
		if !self.path.exists() {
			return Ok((false, 0.0));
		}
		let reader = Reader::open(&self.path)?;
		let (ratio, _live, _total) = reader.fragmentation()?;
		Ok((ratio >= self.options.threshold, ratio))
	}

	/// Runs compaction unconditionally if the file exists, but exits early
	/// with `compacted == false` when fragmentation is below the threshold.
	pub fn compact(&self) -> Result<CompactionReport> {
		self.run(self.options.threshold)
	}

	/// `should_compact()` then `compact()`.
	pub fn compact_if_needed(&self) -> Result<CompactionReport> {
		let (_should, _ratio) = self.should_compact()?;
		self.compact()
	}

	/// `compact()` with an effective threshold of 0 — always rewrites an existing file.
	pub fn force_compact(&self) -> Result<CompactionReport> {
		self.run(0.0)
	}

	fn run(&self, effective_threshold: f64) -> Result<CompactionReport> {
		if self
			.in_progress
			.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
			.is_err()
		{
			return Err(Error::CompactionAlreadyRunning);
		}
		let result = self.run_locked(effective_threshold);
		self.in_progress.store(false, Ordering::SeqCst);
		result
	}

	fn run_locked(&self, effective_threshold: f64) -> Result<CompactionReport> {
		if !self.path.exists() {
			return Ok(CompactionReport::unchanged(0, 0, 0, 0.0));
		}
		let old_size = std::fs::metadata(&self.path).map_err(|e| Error::io(&self.path, e))?.len();

		let reader = Reader::open(&self.path)?;
		let index: LiveIndex = reader.build_live_index()?;
		let total = index.total_entries;
		let live = index.live_count();
		let ratio = if total == 0 { 0.0 } else { (total - live) as f64 / total as f64 };

		if ratio < effective_threshold {
			log::debug!(
				target: "swamplog",
				"{}: skipping compaction, fragmentation {:.3} below threshold {:.3}",
				self.path.display(),
				ratio,
				effective_threshold,
			);
			return Ok(CompactionReport::unchanged(old_size, total, live, ratio));
		}

		log::info!(
			target: "swamplog",
			"{}: compacting, fragmentation {:.3}, {} live of {} total entries",
			self.path.display(),
			ratio,
			live,
			total,
		);

		let temp_path = self.temp_path();
		match self.write_compacted(&temp_path, &index) {
			Ok(()) => {}
			Err(e) => {
				let _ = std::fs::remove_file(&temp_path);
				return Err(e);
			}
		}

		std::fs::rename(&temp_path, &self.path).map_err(|e| Error::io(&self.path, e))?;

		let new_size = std::fs::metadata(&self.path).map_err(|e| Error::io(&self.path, e))?.len();
		log::info!(target: "swamplog", "{}: compacted {} -> {} bytes", self.path.display(), old_size, new_size);

		Ok(CompactionReport {
			compacted: true,
			old_size,
			new_size,
			total_entries: total,
			live_entries: live,
			removed_entries: total - live,
			fragmentation_ratio: ratio,
		})
	}

	fn write_compacted(&self, temp_path: &Path, index: &LiveIndex) -> Result<()> {
		let writer = Writer::open(temp_path, self.options.max_block_size)?;
		// Tie-breaking is not needed: the live index already enforces
		// last-writer-wins, and there are no duplicate keys to order between.
		for (key, payload) in &index.entries {
			writer.append(Entry::insert(key.clone(), payload.clone()))?;
		}
		if let Some(metadata) = &index.metadata {
			writer.append(metadata.to_entry()?)?;
		}
		writer.close()
	}
}

/// Removes stray `*.compact` files left by a crash between the temp
/// writer's final fsync and the rename. Intended to run once on start-up
/// over a partition directory.
pub fn cleanup_compaction_temp(dir: impl AsRef<Path>) -> Result<usize> {
	let dir = dir.as_ref();
	let mut removed = 0;
	let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
	for entry in entries {
		let entry = entry.map_err(|e| Error::io(dir, e))?;
		let path = entry.path();
		if path.extension().and_then(|e| e.to_str()) == Some(COMPACT_SUFFIX) {
			std::fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
			log::warn!(target: "swamplog", "Removed stray compaction temp file {}", path.display());
			removed += 1;
		}
	}
	Ok(removed)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::entry::Entry;
	use crate::writer::Writer;

	struct TempDir(PathBuf);

	impl TempDir {
		fn new(name: &'static str) -> TempDir {
			env_logger::try_init().ok();
			let mut path = std::env::temp_dir();
			path.push("swamplog-test");
			path.push("compactor");
			path.push(name);
			if path.exists() {
				std::fs::remove_dir_all(&path).unwrap();
			}
			std::fs::create_dir_all(&path).unwrap();
			TempDir(path)
		}

		fn log_path(&self, name: &str) -> PathBuf {
			self.0.join(name)
		}
	}

	impl Drop for TempDir {
		fn drop(&mut self) {
			if self.0.exists() {
				std::fs::remove_dir_all(&self.0).unwrap();
			}
		}
	}

	fn write_s1(path: &Path) {
		let writer = Writer::open(path, 0).unwrap();
		writer.append(Entry::insert(b"k1".to_vec(), b"a".to_vec())).unwrap();
		writer.append(Entry::insert(b"k2".to_vec(), b"b".to_vec())).unwrap();
		writer.append(Entry::update(b"k1".to_vec(), b"aa".to_vec())).unwrap();
		writer.append(Entry::delete(b"k2".to_vec())).unwrap();
		writer.close().unwrap();
	}

	#[test]
	fn should_compact_on_nonexistent_file() {
		let dir = TempDir::new("nonexistent");
		let path = dir.log_path("swamp.log");
		let compactor = Compactor::new(&path, 0, 0.5);
		assert_eq!(compactor.should_compact().unwrap(), (false, 0.0));
	}

	#[test]
	fn compact_at_threshold_rewrites_to_single_insert() {
		let dir = TempDir::new("compact_threshold");
		let path = dir.log_path("swamp.log");
		write_s1(&path);

		let compactor = Compactor::new(&path, 0, 0.5);
		let (should, ratio) = compactor.should_compact().unwrap();
		assert!(should);
		assert!((ratio - 0.75).abs() < 1e-9);

		let report = compactor.compact().unwrap();
		assert!(report.compacted);
		assert_eq!(report.total_entries, 4);
		assert_eq!(report.live_entries, 1);
		assert_eq!(report.removed_entries, 3);

		let reader = Reader::open(&path).unwrap();
		let index = reader.build_live_index().unwrap();
		assert_eq!(index.entries.len(), 1);
		assert_eq!(index.total_entries, 1);
		assert_eq!(index.entries.get(b"k1".as_slice()), Some(&b"aa".to_vec()));

		let blocks: Vec<_> = reader.iter_blocks().unwrap().collect::<Result<Vec<_>>>().unwrap();
		let total_entries: usize = blocks.iter().map(|(_, b)| b.entries.len()).sum();
		assert_eq!(total_entries, 1);
		for (_, block) in &blocks {
			for e in &block.entries {
				assert_eq!(e.op, crate::entry::Op::Insert);
			}
		}
	}

	#[test]
	fn compact_below_threshold_is_a_no_op() {
		let dir = TempDir::new("below_threshold");
		let path = dir.log_path("swamp.log");
		write_s1(&path);
		let old_bytes = std::fs::read(&path).unwrap();

		let compactor = Compactor::new(&path, 0, 0.9);
		let report = compactor.compact().unwrap();
		assert!(!report.compacted);

		let new_bytes = std::fs::read(&path).unwrap();
		assert_eq!(old_bytes, new_bytes);
	}

	#[test]
	fn force_compact_on_zero_fragmentation_still_succeeds() {
		let dir = TempDir::new("force_idempotent");
		let path = dir.log_path("swamp.log");
		write_s1(&path);
		let compactor = Compactor::new(&path, 0, 0.5);
		compactor.compact().unwrap();

		let before = Reader::open(&path).unwrap().build_live_index().unwrap();
		let report = compactor.force_compact().unwrap();
		assert!(report.compacted);
		assert_eq!(report.total_entries, report.live_entries);

		let after = Reader::open(&path).unwrap().build_live_index().unwrap();
		assert_eq!(before.entries, after.entries);
	}

	#[test]
	fn preserves_partition_metadata_across_compaction() {
		let dir = TempDir::new("metadata_preserved");
		let path = dir.log_path("swamp.log");
		let writer = Writer::open(&path, 0).unwrap();
		let meta = crate::metadata::PartitionMetadata::new("orders", 123).with_attribute("owner", "team-x");
		writer.append(meta.to_entry().unwrap()).unwrap();
		writer.append(Entry::insert(b"k1".to_vec(), b"a".to_vec())).unwrap();
		writer.append(Entry::delete(b"k1".to_vec())).unwrap();
		writer.append(Entry::insert(b"k2".to_vec(), b"b".to_vec())).unwrap();
		writer.close().unwrap();

		let compactor = Compactor::new(&path, 0, 0.1);
		let report = compactor.compact().unwrap();
		assert!(report.compacted);

		let index = Reader::open(&path).unwrap().build_live_index().unwrap();
		assert_eq!(index.metadata, Some(meta));
		assert_eq!(index.entries.get(b"k2".as_slice()), Some(&b"b".to_vec()));
		assert!(!index.entries.contains_key(b"k1".as_slice()));
	}

	#[test]
	fn concurrent_compact_rejected_with_already_running() {
		let dir = TempDir::new("reentrant");
		let path = dir.log_path("swamp.log");
		write_s1(&path);
		let compactor = Compactor::new(&path, 0, 0.5);
		compactor.in_progress.store(true, Ordering::SeqCst);
		assert!(matches!(compactor.compact(), Err(Error::CompactionAlreadyRunning)));
		compactor.in_progress.store(false, Ordering::SeqCst);
	}

	#[test]
	fn cleanup_removes_stray_temp_files() {
		let dir = TempDir::new("cleanup");
		let stray = dir.log_path("swamp.log.compact");
		std::fs::write(&stray, b"partial").unwrap();
		let kept = dir.log_path("swamp.log");
		std::fs::write(&kept, b"real").unwrap();

		let removed = cleanup_compaction_temp(&dir.0).unwrap();
		assert_eq!(removed, 1);
		assert!(!stray.exists());
		assert!(kept.exists());
	}

	// A failure injected between the temp writer's close and the rename must
	// leave the original file untouched. Pre-creating the temp file lets it
	// be opened and written without directory permission (opening an
	// existing file needs no directory write access), while stripping write
	// permission from the directory blocks only the rename that follows.
	#[cfg(unix)]
	#[test]
	fn rename_failure_leaves_original_file_untouched() {
		use std::os::unix::fs::PermissionsExt;

		let dir = TempDir::new("rename_failure");
		let path = dir.log_path("swamp.log");
		write_s1(&path);
		let original_bytes = std::fs::read(&path).unwrap();

		let temp_path = dir.log_path("swamp.log.compact");
		std::fs::write(&temp_path, b"").unwrap();

		let readonly = std::fs::Permissions::from_mode(0o555);
		std::fs::set_permissions(&dir.0, readonly).unwrap();

		let compactor = Compactor::new(&path, 0, 0.5);
		let result = compactor.compact();

		std::fs::set_permissions(&dir.0, std::fs::Permissions::from_mode(0o755)).unwrap();

		assert!(matches!(result, Err(Error::Io { .. })));
		let bytes_after = std::fs::read(&path).unwrap();
		assert_eq!(bytes_after, original_bytes);
	}
}
