use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Whether a move event concerns a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
	File,
	Directory,
}

/// A rename keeps the parent directory; anything else is a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveKind {
	Moved,
	Renamed,
}

/// How a move was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
	/// The notification source reported the move itself
	Direct,
	/// Reconstructed from a delete/create pair inside the correlation window
	Correlated,
	/// Reconstructed from consecutive creates of the same object
	Chain,
	/// Detected by the snapshot index
	Index,
}

/// A detected logical move or rename. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveEvent {
	pub timestamp: DateTime<Utc>,
	pub entry: EntryKind,
	pub kind: MoveKind,
	pub old_path: PathBuf,
	pub new_path: PathBuf,
	pub detection_method: DetectionMethod,
}

impl MoveEvent {
	pub fn new(
		entry: EntryKind, old_path: PathBuf, new_path: PathBuf, detection_method: DetectionMethod,
	) -> Self {
		let kind = classify_move(&old_path, &new_path);
		Self {
			timestamp: Utc::now(),
			entry,
			kind,
			old_path,
			new_path,
			detection_method,
		}
	}

	/// Event label used in the activity log, e.g. "file_renamed".
	pub fn type_label(&self) -> &'static str {
		match (self.entry, self.kind) {
			(EntryKind::File, MoveKind::Moved) => "file_moved",
			(EntryKind::File, MoveKind::Renamed) => "file_renamed",
			(EntryKind::Directory, MoveKind::Moved) => "directory_moved",
			(EntryKind::Directory, MoveKind::Renamed) => "directory_renamed",
		}
	}

	pub fn to_json(&self) -> serde_json::Result<String> {
		serde_json::to_string(self)
	}
}

/// Classify by parent-directory equality.
pub fn classify_move(old_path: &Path, new_path: &Path) -> MoveKind {
	if old_path.parent() == new_path.parent() {
		MoveKind::Renamed
	} else {
		MoveKind::Moved
	}
}

/// Side of the pending tables an unmatched entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedKind {
	Delete,
	Create,
}

/// A pending delete or create that never found a partner. Reported when its
/// window expires or at flush, never as a move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedEvent {
	pub timestamp: DateTime<Utc>,
	pub kind: UnmatchedKind,
	pub path: PathBuf,
}

impl UnmatchedEvent {
	pub fn new(kind: UnmatchedKind, path: PathBuf) -> Self {
		Self {
			timestamp: Utc::now(),
			kind,
			path,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_classify_same_parent_is_rename() {
		assert_eq!(
			classify_move(Path::new("/a/b/x.blend"), Path::new("/a/b/y.blend")),
			MoveKind::Renamed
		);
	}

	#[test]
	fn test_classify_different_parent_is_move() {
		assert_eq!(
			classify_move(Path::new("/a/b/x.blend"), Path::new("/a/c/x.blend")),
			MoveKind::Moved
		);
	}

	#[test]
	fn test_move_event_classifies_on_construction() {
		let event = MoveEvent::new(
			EntryKind::File,
			PathBuf::from("/src/a.blend"),
			PathBuf::from("/dst/a.blend"),
			DetectionMethod::Correlated,
		);
		assert_eq!(event.kind, MoveKind::Moved);
		assert_eq!(event.type_label(), "file_moved");
	}

	#[test]
	fn test_type_labels() {
		let rename = MoveEvent::new(
			EntryKind::File,
			PathBuf::from("/a/x.txt"),
			PathBuf::from("/a/y.txt"),
			DetectionMethod::Direct,
		);
		assert_eq!(rename.type_label(), "file_renamed");

		let dir_move = MoveEvent::new(
			EntryKind::Directory,
			PathBuf::from("/a/d1"),
			PathBuf::from("/b/d1"),
			DetectionMethod::Direct,
		);
		assert_eq!(dir_move.type_label(), "directory_moved");
	}

	#[test]
	fn test_event_serialization() {
		let event = MoveEvent::new(
			EntryKind::File,
			PathBuf::from("/src/a.blend"),
			PathBuf::from("/dst/a.blend"),
			DetectionMethod::Chain,
		);
		let json = event.to_json().unwrap();
		assert!(json.contains("a.blend"));
		assert!(json.contains("chain"));
		assert!(json.contains("file"));
	}

	#[test]
	fn test_unmatched_serialization() {
		let event = UnmatchedEvent::new(UnmatchedKind::Delete, PathBuf::from("/gone.blend"));
		let json = serde_json::to_string(&event).unwrap();
		assert!(json.contains("delete"));
		assert!(json.contains("gone.blend"));
	}
}
