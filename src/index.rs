use crate::filter::PathFilter;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Mtime tolerance when comparing two records of the same file.
const MTIME_TOLERANCE: Duration = Duration::from_secs(1);
/// Mtime tolerance when matching a creation against a recorded deletion.
const DELETION_MATCH_TOLERANCE: Duration = Duration::from_secs(2);
/// Looser tolerance for the directory-move fallback, where the stale
/// snapshot entry may be a full scan old.
const FALLBACK_MATCH_TOLERANCE: Duration = Duration::from_secs(5);
/// Bound on waiting for the rescan loop to exit.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Snapshot entry for one tracked file.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedFile {
	pub path: PathBuf,
	pub size: u64,
	pub mtime: SystemTime,
}

impl TrackedFile {
	fn from_fs(path: &Path) -> std::io::Result<Self> {
		let metadata = std::fs::metadata(path)?;
		Ok(Self {
			path: path.to_path_buf(),
			size: metadata.len(),
			mtime: metadata.modified()?,
		})
	}
}

impl PartialEq for TrackedFile {
	/// Exact size; mtime within 1s (filesystem timestamp granularity).
	fn eq(&self, other: &Self) -> bool {
		self.path == other.path
			&& self.size == other.size
			&& times_within(self.mtime, other.mtime, MTIME_TOLERANCE)
	}
}

fn times_within(a: SystemTime, b: SystemTime, tolerance: Duration) -> bool {
	match a.duration_since(b) {
		Ok(diff) => diff <= tolerance,
		Err(e) => e.duration() <= tolerance,
	}
}

#[derive(Debug, Default)]
struct IndexState {
	files: HashMap<PathBuf, TrackedFile>,
	recent_deletions: HashMap<PathBuf, (TrackedFile, Instant)>,
	recent_creations: HashMap<PathBuf, (TrackedFile, Instant)>,
}

/// Counters for status output and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSummary {
	pub tracked_files: usize,
	pub recent_deletions: usize,
	pub recent_creations: usize,
}

struct RescanTask {
	stop_tx: watch::Sender<bool>,
	handle: JoinHandle<()>,
}

/// Point-in-time snapshot of the tracked files under one root.
///
/// The index exists to recover moves the notification layer never reports
/// as moves: a directory relocated in one syscall surfaces as creates for
/// its files with no matching deletes, but the stale snapshot entries still
/// carry the old paths. `record_creation` matches new files against recent
/// deletions first and against silently vanished snapshot entries second.
pub struct FileIndex {
	root: PathBuf,
	filter: PathFilter,
	rescan_interval: Duration,
	correlation_window: Duration,
	state: Mutex<IndexState>,
	rescan_task: Mutex<Option<RescanTask>>,
}

impl FileIndex {
	pub fn new(
		root: PathBuf, filter: PathFilter, rescan_interval: Duration, correlation_window: Duration,
	) -> Self {
		Self {
			root,
			filter,
			rescan_interval,
			correlation_window,
			state: Mutex::new(IndexState::default()),
			rescan_task: Mutex::new(None),
		}
	}

	/// One full synchronous scan, then the periodic rescan loop if an
	/// interval is configured.
	pub fn start(self: &Arc<Self>) {
		info!("Starting file index for {:?}", self.root);
		self.rescan();

		if self.rescan_interval.is_zero() {
			debug!("Rescan interval is zero, background loop disabled");
			return;
		}

		let (stop_tx, mut stop_rx) = watch::channel(false);
		let index = Arc::clone(self);
		let interval = self.rescan_interval;
		let handle = tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
			// The first tick completes immediately; the initial scan already ran
			ticker.tick().await;
			loop {
				tokio::select! {
					_ = ticker.tick() => {
						index.rescan();
						index.cleanup_expired();
					}
					_ = stop_rx.changed() => break,
				}
			}
			debug!("File index rescan loop stopped");
		});

		*self.rescan_task.lock() = Some(RescanTask { stop_tx, handle });
	}

	/// Signal the rescan loop and wait for it, bounded by a timeout.
	pub async fn stop(&self) {
		let task = self.rescan_task.lock().take();
		if let Some(task) = task {
			let _ = task.stop_tx.send(true);
			if tokio::time::timeout(STOP_TIMEOUT, task.handle).await.is_err() {
				warn!("Timed out waiting for the index rescan loop to stop");
			}
		}
		info!("File index stopped");
	}

	/// Walk the tree once and swap in a fresh snapshot.
	///
	/// Ignored subdirectories are pruned during the walk. A walk error ends
	/// the cycle without swapping, so the previous snapshot stays
	/// authoritative; per-file stat failures only skip that file.
	pub fn rescan(&self) {
		debug!("Rescanning directory tree: {:?}", self.root);
		let started = Instant::now();

		let filter = &self.filter;
		let mut new_files = HashMap::new();
		let walker = WalkDir::new(&self.root)
			.into_iter()
			.filter_entry(|entry| !(entry.file_type().is_dir() && filter.is_ignored(entry.path())));

		for entry in walker {
			let entry = match entry {
				Ok(entry) => entry,
				Err(e) => {
					warn!("Directory walk failed, keeping previous snapshot: {}", e);
					return;
				}
			};
			if !entry.file_type().is_file() {
				continue;
			}
			let path = entry.path();
			if !filter.is_trackable(path) || filter.is_ignored(path) {
				continue;
			}
			match TrackedFile::from_fs(path) {
				Ok(file) => {
					new_files.insert(path.to_path_buf(), file);
				}
				Err(e) => warn!("Could not stat file {:?}: {}", path, e),
			}
		}

		let file_count = new_files.len();
		{
			let mut state = self.state.lock();
			// The diff is observability only; notifications drive all bookkeeping
			let deleted = state
				.files
				.keys()
				.filter(|path| !new_files.contains_key(*path))
				.count();
			let created = new_files
				.keys()
				.filter(|path| !state.files.contains_key(*path))
				.count();
			if deleted > 0 {
				debug!("Files gone since last scan: {}", deleted);
			}
			if created > 0 {
				debug!("Files new since last scan: {}", created);
			}
			state.files = new_files;
		}

		info!(
			"Rescan completed: {} files indexed in {:.2?}",
			file_count,
			started.elapsed()
		);
	}

	/// Move a snapshot entry into the recent-deletions table, returning the
	/// last-known record. No-op for files the index never saw.
	pub fn record_deletion(&self, path: &Path) -> Option<TrackedFile> {
		let mut state = self.state.lock();
		match state.files.remove(path) {
			Some(file) => {
				debug!("Recorded deletion: {:?}", path);
				state
					.recent_deletions
					.insert(path.to_path_buf(), (file.clone(), Instant::now()));
				Some(file)
			}
			None => {
				debug!("Deletion recorded for unknown file: {:?}", path);
				None
			}
		}
	}

	/// Record a creation and look for the move it might complete.
	///
	/// Returns the `(old_path, new_path)` pair when the new file matches a
	/// recently recorded deletion, or a snapshot entry whose backing file
	/// silently vanished (the directory-move case, where no deletion was
	/// ever reported).
	pub fn record_creation(&self, path: &Path) -> Option<(PathBuf, PathBuf)> {
		let created = match TrackedFile::from_fs(path) {
			Ok(file) => file,
			Err(e) => {
				warn!("Could not stat created file {:?}: {}", path, e);
				return None;
			}
		};

		let mut state = self.state.lock();
		state.files.insert(path.to_path_buf(), created.clone());
		state
			.recent_creations
			.insert(path.to_path_buf(), (created.clone(), Instant::now()));

		// Explicitly recorded deletions first: same size, close mtime, same
		// filename
		let matched = state.recent_deletions.iter().find_map(|(old_path, (old, _))| {
			(old.size == created.size
				&& times_within(old.mtime, created.mtime, DELETION_MATCH_TOLERANCE)
				&& old_path.file_name() == path.file_name())
			.then(|| old_path.clone())
		});
		if let Some(old_path) = matched {
			state.recent_deletions.remove(&old_path);
			info!("Move detected: {:?} -> {:?}", old_path, path);
			return Some((old_path, path.to_path_buf()));
		}

		// Fallback: a snapshot entry whose backing file is gone without any
		// deletion on record
		let vanished = state.files.iter().find_map(|(old_path, old)| {
			(old_path.as_path() != path
				&& old_path.file_name() == path.file_name()
				&& old.size == created.size
				&& times_within(old.mtime, created.mtime, FALLBACK_MATCH_TOLERANCE)
				&& !old_path.exists())
			.then(|| old_path.clone())
		});
		if let Some(old_path) = vanished {
			if let Some(old) = state.files.remove(&old_path) {
				state
					.recent_deletions
					.insert(old_path.clone(), (old, Instant::now()));
			}
			info!("Move detected from stale index entry: {:?} -> {:?}", old_path, path);
			return Some((old_path, path.to_path_buf()));
		}

		debug!("Recorded creation (no move detected): {:?}", path);
		None
	}

	/// Snapshot paths under `dir`, including subdirectories.
	pub fn get_files_in_directory(&self, dir: &Path) -> Vec<PathBuf> {
		let state = self.state.lock();
		state
			.files
			.keys()
			.filter(|path| path.starts_with(dir))
			.cloned()
			.collect()
	}

	pub fn is_tracked(&self, path: &Path) -> bool {
		self.state.lock().files.contains_key(path)
	}

	pub fn file_count(&self) -> usize {
		self.state.lock().files.len()
	}

	pub fn summary(&self) -> IndexSummary {
		let state = self.state.lock();
		IndexSummary {
			tracked_files: state.files.len(),
			recent_deletions: state.recent_deletions.len(),
			recent_creations: state.recent_creations.len(),
		}
	}

	/// Sweep recent tables past the index's own correlation window.
	pub fn cleanup_expired(&self) {
		let now = Instant::now();
		let window = self.correlation_window;
		let mut state = self.state.lock();
		state
			.recent_deletions
			.retain(|_, (_, at)| now.duration_since(*at) <= window);
		state
			.recent_creations
			.retain(|_, (_, at)| now.duration_since(*at) <= window);
	}
}
