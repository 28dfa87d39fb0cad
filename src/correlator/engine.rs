use crate::correlator::config::CorrelatorConfig;
use crate::correlator::pending::{PendingCreation, PendingDeletion, PendingTables};
use crate::events::{DetectionMethod, EntryKind, MoveEvent, UnmatchedEvent, UnmatchedKind};
use crate::filter::PathFilter;
use crate::index::FileIndex;
use crate::sink::EventSink;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use walkdir::WalkDir;

struct CorrelatorState {
	tables: PendingTables,
	sink: Box<dyn EventSink>,
}

/// Counts of live table entries, for status output and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSummary {
	pub pending_deletions: usize,
	pub pending_creations: usize,
	pub directory_moves: usize,
	pub processed_markers: usize,
}

/// The correlation engine.
///
/// Three entry points consume the filtered notification stream; all of them
/// serialize on one lock, so the engine sees a strict total order of
/// deletes, creates and moves. Matched pairs become [`MoveEvent`]s; pending
/// entries that outlive their window are reported as unmatched, never as
/// moves.
pub struct MoveCorrelator {
	config: CorrelatorConfig,
	filter: PathFilter,
	index: Arc<FileIndex>,
	state: Mutex<CorrelatorState>,
}

impl MoveCorrelator {
	pub fn new(
		config: CorrelatorConfig, filter: PathFilter, index: Arc<FileIndex>,
		sink: Box<dyn EventSink>,
	) -> Self {
		Self {
			config,
			filter,
			index,
			state: Mutex::new(CorrelatorState {
				tables: PendingTables::new(),
				sink,
			}),
		}
	}

	/// The notification source reported the move itself.
	///
	/// Directory moves are expanded into one event per trackable file the
	/// directory carried along; the directory itself is logged but not
	/// reported to the sink.
	pub fn on_direct_move(&self, old_path: &Path, new_path: &Path, is_directory: bool) {
		if self.filter.is_ignored(old_path) || self.filter.is_ignored(new_path) {
			return;
		}
		if !is_directory
			&& !self.filter.is_trackable(old_path)
			&& !self.filter.is_trackable(new_path)
		{
			return;
		}

		// Collect the directory contents before taking the lock; only
		// bounded stat calls happen under it
		let moved_files = if is_directory {
			self.trackable_files_under(new_path)
		} else {
			Vec::new()
		};

		let mut state = self.state.lock();
		self.sweep(&mut state);

		if is_directory {
			info!("Directory moved: {:?} -> {:?}", old_path, new_path);
			state.tables.record_directory_move(
				old_path.to_path_buf(),
				new_path.to_path_buf(),
				self.config.max_directory_moves,
			);

			for new_file in moved_files {
				let Ok(rel) = new_file.strip_prefix(new_path) else {
					continue;
				};
				let old_file = old_path.join(rel);
				if state.tables.is_processed(&old_file, self.config.processed_marker_ttl)
					&& state.tables.is_processed(&new_file, self.config.processed_marker_ttl)
				{
					continue;
				}

				// Keep the snapshot in step with the move
				self.index.record_deletion(&old_file);
				self.index.record_creation(&new_file);

				self.emit(
					&mut state,
					EntryKind::File,
					&old_file,
					&new_file,
					DetectionMethod::Direct,
				);
				state.tables.mark_processed(&old_file);
				state.tables.mark_processed(&new_file);
			}
			return;
		}

		if state.tables.is_processed(old_path, self.config.processed_marker_ttl)
			&& state.tables.is_processed(new_path, self.config.processed_marker_ttl)
		{
			debug!("Move {:?} -> {:?} already explained", old_path, new_path);
			return;
		}
		self.emit(
			&mut state,
			EntryKind::File,
			old_path,
			new_path,
			DetectionMethod::Direct,
		);
		state.tables.mark_processed(old_path);
		state.tables.mark_processed(new_path);
	}

	/// A raw delete notification.
	pub fn on_delete(&self, path: &Path, is_directory: bool) {
		if self.filter.is_ignored(path) {
			return;
		}
		if !is_directory && !self.filter.is_trackable(path) {
			return;
		}

		let mut state = self.state.lock();
		self.sweep(&mut state);
		if state.tables.is_processed(path, self.config.processed_marker_ttl) {
			debug!("Delete for {:?} already explained", path);
			return;
		}

		if is_directory {
			// Every file the directory held gets the same bookkeeping, so
			// later creates elsewhere can still match them individually
			for file in self.index.get_files_in_directory(path) {
				let removed = self.index.record_deletion(&file);
				state.tables.push_deletion(PendingDeletion {
					path: file,
					size: removed.map(|f| f.size),
					recorded_at: Instant::now(),
				});
			}
			return;
		}

		let removed = self.index.record_deletion(path);
		state.tables.push_deletion(PendingDeletion {
			path: path.to_path_buf(),
			size: removed.map(|f| f.size),
			recorded_at: Instant::now(),
		});
	}

	/// A raw create notification; the point where moves are recognized.
	pub fn on_create(&self, path: &Path, is_directory: bool) {
		if self.filter.is_ignored(path) {
			return;
		}
		if !is_directory && !self.filter.is_trackable(path) {
			return;
		}

		let mut state = self.state.lock();
		self.sweep(&mut state);
		if state.tables.is_processed(path, self.config.processed_marker_ttl) {
			debug!("Create for {:?} already explained", path);
			return;
		}

		if !is_directory {
			// Chain move: the same object moved again before the previous
			// move's marker expired, with no delete observed in between
			if let Some(file_name) = path.file_name() {
				let chained = state
					.tables
					.chain_candidate(file_name, path, self.config.chain_window)
					.map(|recent| recent.new_path.clone());
				if let Some(old_path) = chained {
					self.emit(
						&mut state,
						EntryKind::File,
						&old_path,
						path,
						DetectionMethod::Chain,
					);
					state.tables.mark_processed(&old_path);
					state.tables.mark_processed(path);
					return;
				}
			}

			// Snapshot index: catches moves whose delete was never reported
			if let Some((old_path, new_path)) = self.index.record_creation(path) {
				self.emit(
					&mut state,
					EntryKind::File,
					&old_path,
					&new_path,
					DetectionMethod::Index,
				);
				state.tables.mark_processed(&old_path);
				state.tables.mark_processed(&new_path);
				return;
			}
		}

		// Pending-deletion scan, oldest entry first
		if let Some(old_path) = self.match_pending_deletion(&state.tables, path) {
			let explained = match state.tables.directory_move_explaining(&old_path, path) {
				Some(record) => {
					debug!(
						"Create {:?} already explained by directory move {:?} -> {:?}",
						path, record.old_dir, record.new_dir
					);
					true
				}
				None => false,
			};
			state.tables.remove_deletion(&old_path);
			if !explained {
				let entry = if is_directory {
					EntryKind::Directory
				} else {
					EntryKind::File
				};
				self.emit(&mut state, entry, &old_path, path, DetectionMethod::Correlated);
				state.tables.mark_processed(&old_path);
				state.tables.mark_processed(path);
			}
			return;
		}

		// Nothing matched; remembered only so it can be reported unmatched
		let size = std::fs::metadata(path)
			.ok()
			.filter(|m| m.is_file())
			.map(|m| m.len());
		state.tables.push_creation(PendingCreation {
			path: path.to_path_buf(),
			size,
			recorded_at: Instant::now(),
		});
	}

	/// Report every pending entry as a standalone unmatched event, then
	/// clear both tables. Called once at shutdown.
	pub fn flush(&self) {
		let mut state = self.state.lock();
		let deletions = std::mem::take(&mut state.tables.deletions);
		let creations = std::mem::take(&mut state.tables.creations);

		for deletion in deletions {
			info!("Unmatched delete at flush: {:?}", deletion.path);
			state
				.sink
				.on_unmatched(&UnmatchedEvent::new(UnmatchedKind::Delete, deletion.path));
		}
		for creation in creations {
			info!("Unmatched create at flush: {:?}", creation.path);
			state
				.sink
				.on_unmatched(&UnmatchedEvent::new(UnmatchedKind::Create, creation.path));
		}
	}

	pub fn pending_summary(&self) -> PendingSummary {
		let state = self.state.lock();
		PendingSummary {
			pending_deletions: state.tables.deletions.len(),
			pending_creations: state.tables.creations.len(),
			directory_moves: state.tables.directory_moves.len(),
			processed_markers: state.tables.processed.len(),
		}
	}

	/// First pending deletion satisfying the create, in insertion order.
	///
	/// Criteria: same extension, inside the correlation window, and same
	/// filename OR a size within tolerance OR no size on record (the file
	/// vanished before anyone could stat it, so timing plus extension has
	/// to carry the match).
	fn match_pending_deletion(&self, tables: &PendingTables, create_path: &Path) -> Option<PathBuf> {
		let create_ext = extension_of(create_path);
		let create_size = std::fs::metadata(create_path).ok().map(|m| m.len());

		tables
			.deletions
			.iter()
			.find(|deletion| {
				// A recreate at the same path is not a move
				if deletion.path == create_path {
					return false;
				}
				if deletion.recorded_at.elapsed() > self.config.correlation_window {
					return false;
				}
				if extension_of(&deletion.path) != create_ext {
					return false;
				}

				let same_name = deletion.file_name() == create_path.file_name();
				let similar_size = match (deletion.size, create_size) {
					(Some(old), Some(new)) if old > 0 => {
						old.abs_diff(new) < self.config.size_tolerance
					}
					_ => false,
				};
				let unknown_size = deletion.size.unwrap_or(0) == 0;

				same_name || similar_size || unknown_size
			})
			.map(|deletion| deletion.path.clone())
	}

	fn emit(
		&self, state: &mut CorrelatorState, entry: EntryKind, old_path: &Path, new_path: &Path,
		method: DetectionMethod,
	) {
		if old_path == new_path {
			debug!("Dropping degenerate move event for {:?}", old_path);
			return;
		}
		// A pending delete for the source is explained by this move
		state.tables.remove_deletion(old_path);
		let event = MoveEvent::new(
			entry,
			old_path.to_path_buf(),
			new_path.to_path_buf(),
			method,
		);
		debug!(
			"Emitting {}: {:?} -> {:?} ({:?})",
			event.type_label(),
			old_path,
			new_path,
			method
		);
		state.tables.record_move(old_path, new_path);
		state.sink.on_move(&event);
	}

	/// Expire every table; pending entries past their window are reported
	/// as unmatched on their way out.
	fn sweep(&self, state: &mut CorrelatorState) {
		state.tables.prune(&self.config);
		let (deletions, creations) = state.tables.take_expired(self.config.correlation_window);
		for deletion in deletions {
			debug!("Pending delete expired unmatched: {:?}", deletion.path);
			state
				.sink
				.on_unmatched(&UnmatchedEvent::new(UnmatchedKind::Delete, deletion.path));
		}
		for creation in creations {
			debug!("Pending create expired unmatched: {:?}", creation.path);
			state
				.sink
				.on_unmatched(&UnmatchedEvent::new(UnmatchedKind::Create, creation.path));
		}
	}

	/// Trackable files currently on disk below `dir`.
	fn trackable_files_under(&self, dir: &Path) -> Vec<PathBuf> {
		let filter = &self.filter;
		WalkDir::new(dir)
			.into_iter()
			.filter_entry(|entry| !(entry.file_type().is_dir() && filter.is_ignored(entry.path())))
			.filter_map(|entry| entry.ok())
			.filter(|entry| entry.file_type().is_file())
			.map(|entry| entry.into_path())
			.filter(|path| filter.is_trackable(path) && !filter.is_ignored(path))
			.collect()
	}
}

fn extension_of(path: &Path) -> Option<String> {
	path.extension()
		.map(|ext| ext.to_string_lossy().to_lowercase())
}
