//! Common test utilities for the movewatch integration tests

#![allow(unused_imports, dead_code)]

use movewatch::{CorrelatorConfig, FileIndex, MemorySink, MoveCorrelator, PathFilter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Create a temporary directory for testing
pub fn setup_temp_dir() -> TempDir {
	TempDir::new().expect("Failed to create temp directory")
}

/// Create a file (and its parent directories) with the given content
pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
	let path = dir.join(name);
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent).expect("Failed to create parent directories");
	}
	std::fs::write(&path, contents).expect("Failed to write test file");
	path
}

/// A correlator wired to a fresh index and a memory sink
pub struct Harness {
	pub correlator: MoveCorrelator,
	pub index: Arc<FileIndex>,
	pub sink: MemorySink,
}

/// Build a correlation harness over `root`. The index has no background
/// loop; tests drive rescans explicitly.
pub fn correlation_harness(
	root: &Path, extensions: &[&str], ignore_patterns: &[&str], window: Duration,
) -> Harness {
	let extensions: Vec<String> = extensions.iter().map(|s| s.to_string()).collect();
	let ignore_patterns: Vec<String> = ignore_patterns.iter().map(|s| s.to_string()).collect();
	let filter = PathFilter::new(&extensions, &ignore_patterns);

	let index = Arc::new(FileIndex::new(
		root.to_path_buf(),
		filter.clone(),
		Duration::ZERO,
		Duration::from_secs(10),
	));

	let sink = MemorySink::new();
	let correlator = MoveCorrelator::new(
		CorrelatorConfig::with_window(window),
		filter,
		Arc::clone(&index),
		Box::new(sink.clone()),
	);

	Harness {
		correlator,
		index,
		sink,
	}
}
