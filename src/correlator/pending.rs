use std::collections::{HashMap, VecDeque};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::correlator::config::CorrelatorConfig;

/// A delete notification waiting for a matching create.
#[derive(Debug, Clone)]
pub struct PendingDeletion {
	pub path: PathBuf,
	/// Last-known size; None when the file vanished before anyone could
	/// stat or index it
	pub size: Option<u64>,
	pub recorded_at: Instant,
}

impl PendingDeletion {
	pub fn file_name(&self) -> Option<&OsStr> {
		self.path.file_name()
	}
}

/// A create notification that matched nothing. Kept for flush reporting
/// only; the delete path never consults this table.
#[derive(Debug, Clone)]
pub struct PendingCreation {
	pub path: PathBuf,
	pub size: Option<u64>,
	pub recorded_at: Instant,
}

/// One observed directory-level move.
#[derive(Debug, Clone)]
pub struct DirectoryMoveRecord {
	pub old_dir: PathBuf,
	pub new_dir: PathBuf,
}

impl DirectoryMoveRecord {
	/// True when an old/new path pair is already explained by this record:
	/// both fall under the mapping with the same relative suffix.
	pub fn explains(&self, old_path: &Path, new_path: &Path) -> bool {
		match (
			old_path.strip_prefix(&self.old_dir),
			new_path.strip_prefix(&self.new_dir),
		) {
			(Ok(old_rel), Ok(new_rel)) => old_rel == new_rel,
			_ => false,
		}
	}
}

/// A move the engine already emitted, kept briefly for chain reconstruction.
#[derive(Debug, Clone)]
pub struct RecentMove {
	pub old_path: PathBuf,
	pub new_path: PathBuf,
	pub recorded_at: Instant,
}

/// All time-windowed correlation tables.
///
/// Pending deletions keep insertion order: when several entries satisfy a
/// create, the first inserted wins. That order is deterministic given
/// identical input order but is not a documented guarantee.
#[derive(Debug, Default)]
pub struct PendingTables {
	pub deletions: Vec<PendingDeletion>,
	pub creations: Vec<PendingCreation>,
	pub directory_moves: VecDeque<DirectoryMoveRecord>,
	pub processed: HashMap<PathBuf, Instant>,
	pub recent_moves: VecDeque<RecentMove>,
}

impl PendingTables {
	pub fn new() -> Self {
		Self::default()
	}

	/// Insert a deletion, replacing any stale entry for the same path.
	pub fn push_deletion(&mut self, deletion: PendingDeletion) {
		self.deletions.retain(|d| d.path != deletion.path);
		self.deletions.push(deletion);
	}

	pub fn push_creation(&mut self, creation: PendingCreation) {
		self.creations.retain(|c| c.path != creation.path);
		self.creations.push(creation);
	}

	pub fn remove_deletion(&mut self, path: &Path) {
		self.deletions.retain(|d| d.path != path);
	}

	/// Remember a directory move, evicting the oldest half once the table
	/// grows past `cap`.
	pub fn record_directory_move(&mut self, old_dir: PathBuf, new_dir: PathBuf, cap: usize) {
		self.directory_moves
			.push_back(DirectoryMoveRecord { old_dir, new_dir });
		if self.directory_moves.len() > cap {
			let drop_count = self.directory_moves.len() - cap / 2;
			self.directory_moves.drain(..drop_count);
		}
	}

	/// The record that already explains this old/new pair, if any.
	pub fn directory_move_explaining(
		&self, old_path: &Path, new_path: &Path,
	) -> Option<&DirectoryMoveRecord> {
		self.directory_moves
			.iter()
			.find(|record| record.explains(old_path, new_path))
	}

	pub fn mark_processed(&mut self, path: &Path) {
		self.processed.insert(path.to_path_buf(), Instant::now());
	}

	pub fn is_processed(&self, path: &Path, ttl: Duration) -> bool {
		self.processed
			.get(path)
			.is_some_and(|at| at.elapsed() <= ttl)
	}

	pub fn record_move(&mut self, old_path: &Path, new_path: &Path) {
		self.recent_moves.push_back(RecentMove {
			old_path: old_path.to_path_buf(),
			new_path: new_path.to_path_buf(),
			recorded_at: Instant::now(),
		});
	}

	/// Most recent emitted move whose destination carries `name`, still
	/// inside `window`, destination different from `exclude`.
	pub fn chain_candidate(
		&self, name: &OsStr, exclude: &Path, window: Duration,
	) -> Option<&RecentMove> {
		self.recent_moves.iter().rev().find(|recent| {
			recent.recorded_at.elapsed() <= window
				&& recent.new_path.as_path() != exclude
				&& recent.new_path.file_name() == Some(name)
		})
	}

	/// Drain pending entries past the correlation window, returning them so
	/// the caller can report them as unmatched.
	pub fn take_expired(
		&mut self, window: Duration,
	) -> (Vec<PendingDeletion>, Vec<PendingCreation>) {
		let now = Instant::now();
		let (expired_deletions, live_deletions): (Vec<_>, Vec<_>) =
			std::mem::take(&mut self.deletions)
				.into_iter()
				.partition(|d| now.duration_since(d.recorded_at) > window);
		self.deletions = live_deletions;

		let (expired_creations, live_creations): (Vec<_>, Vec<_>) =
			std::mem::take(&mut self.creations)
				.into_iter()
				.partition(|c| now.duration_since(c.recorded_at) > window);
		self.creations = live_creations;

		(expired_deletions, expired_creations)
	}

	/// Expire processed markers and the chain-move lookback.
	pub fn prune(&mut self, config: &CorrelatorConfig) {
		let now = Instant::now();
		self.processed
			.retain(|_, at| now.duration_since(*at) <= config.processed_marker_ttl);
		while let Some(front) = self.recent_moves.front() {
			if now.duration_since(front.recorded_at) > config.chain_window {
				self.recent_moves.pop_front();
			} else {
				break;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn deletion(path: &str) -> PendingDeletion {
		PendingDeletion {
			path: PathBuf::from(path),
			size: None,
			recorded_at: Instant::now(),
		}
	}

	#[test]
	fn test_deletions_keep_insertion_order() {
		let mut tables = PendingTables::new();
		tables.push_deletion(deletion("/a/x.blend"));
		tables.push_deletion(deletion("/b/y.blend"));
		tables.push_deletion(deletion("/c/z.blend"));

		let order: Vec<_> = tables.deletions.iter().map(|d| d.path.clone()).collect();
		assert_eq!(
			order,
			vec![
				PathBuf::from("/a/x.blend"),
				PathBuf::from("/b/y.blend"),
				PathBuf::from("/c/z.blend"),
			]
		);

		// Re-inserting a path moves it to the back
		tables.push_deletion(deletion("/a/x.blend"));
		assert_eq!(tables.deletions.len(), 3);
		assert_eq!(tables.deletions[2].path, PathBuf::from("/a/x.blend"));
	}

	#[test]
	fn test_directory_move_cap_evicts_oldest_half() {
		let mut tables = PendingTables::new();
		for i in 0..17 {
			tables.record_directory_move(
				PathBuf::from(format!("/old{i}")),
				PathBuf::from(format!("/new{i}")),
				16,
			);
		}
		assert!(tables.directory_moves.len() <= 16);
		// The newest record always survives eviction
		assert!(tables
			.directory_moves
			.iter()
			.any(|r| r.old_dir == PathBuf::from("/old16")));
		// The oldest does not
		assert!(!tables
			.directory_moves
			.iter()
			.any(|r| r.old_dir == PathBuf::from("/old0")));
	}

	#[test]
	fn test_directory_move_explains_equal_suffix_only() {
		let record = DirectoryMoveRecord {
			old_dir: PathBuf::from("/proj/d1"),
			new_dir: PathBuf::from("/proj/d2"),
		};

		assert!(record.explains(
			Path::new("/proj/d1/sub/a.blend"),
			Path::new("/proj/d2/sub/a.blend")
		));
		assert!(!record.explains(
			Path::new("/proj/d1/sub/a.blend"),
			Path::new("/proj/d2/other/a.blend")
		));
		assert!(!record.explains(
			Path::new("/elsewhere/a.blend"),
			Path::new("/proj/d2/a.blend")
		));
	}

	#[test]
	fn test_processed_marker_expiry() {
		let mut tables = PendingTables::new();
		tables.mark_processed(Path::new("/a.blend"));

		assert!(tables.is_processed(Path::new("/a.blend"), Duration::from_secs(10)));
		std::thread::sleep(Duration::from_millis(30));
		assert!(!tables.is_processed(Path::new("/a.blend"), Duration::from_millis(10)));
	}

	#[test]
	fn test_chain_candidate_matches_filename() {
		let mut tables = PendingTables::new();
		tables.record_move(Path::new("/a/x.blend"), Path::new("/b/x.blend"));
		tables.record_move(Path::new("/a/y.blend"), Path::new("/b/y.blend"));

		let hit = tables
			.chain_candidate(
				OsStr::new("x.blend"),
				Path::new("/c/x.blend"),
				Duration::from_secs(5),
			)
			.unwrap();
		assert_eq!(hit.new_path, PathBuf::from("/b/x.blend"));

		// The create at the destination itself is not a chain
		assert!(tables
			.chain_candidate(
				OsStr::new("x.blend"),
				Path::new("/b/x.blend"),
				Duration::from_secs(5),
			)
			.is_none());
	}

	#[test]
	fn test_take_expired_partitions_by_age() {
		let mut tables = PendingTables::new();
		tables.push_deletion(deletion("/old.blend"));
		std::thread::sleep(Duration::from_millis(60));
		tables.push_deletion(deletion("/fresh.blend"));

		let (expired, _) = tables.take_expired(Duration::from_millis(40));
		assert_eq!(expired.len(), 1);
		assert_eq!(expired[0].path, PathBuf::from("/old.blend"));
		assert_eq!(tables.deletions.len(), 1);
		assert_eq!(tables.deletions[0].path, PathBuf::from("/fresh.blend"));
	}
}
