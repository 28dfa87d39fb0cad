use regex::Regex;
use std::path::{Component, Path};
use tracing::warn;

/// Decides which paths the engine cares about.
///
/// Two independent checks: an extension allow-list for files, and ignore
/// patterns that exclude whole subtrees. A path that is ignored produces no
/// events of any kind, regardless of timing.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
	/// Lowercased, dot-prefixed. Empty list tracks everything.
	extensions: Vec<String>,
	ignore_patterns: Vec<Regex>,
}

impl PathFilter {
	/// Compile the ignore patterns, skipping malformed ones with a warning.
	pub fn new(extensions: &[String], ignore_patterns: &[String]) -> Self {
		let extensions = extensions
			.iter()
			.map(|ext| {
				let ext = ext.to_lowercase();
				if ext.starts_with('.') {
					ext
				} else {
					format!(".{ext}")
				}
			})
			.collect();

		let ignore_patterns = ignore_patterns
			.iter()
			.filter_map(|pattern| match Regex::new(pattern) {
				Ok(re) => Some(re),
				Err(e) => {
					warn!("Skipping invalid ignore pattern '{}': {}", pattern, e);
					None
				}
			})
			.collect();

		Self {
			extensions,
			ignore_patterns,
		}
	}

	/// True when no allow-list is configured or the path's extension
	/// (case-insensitive) is on it.
	pub fn is_trackable(&self, path: &Path) -> bool {
		if self.extensions.is_empty() {
			return true;
		}
		match path.extension().and_then(|ext| ext.to_str()) {
			Some(ext) => self
				.extensions
				.iter()
				.any(|tracked| tracked[1..].eq_ignore_ascii_case(ext)),
			None => false,
		}
	}

	/// True when any ignore pattern matches a path segment or the whole
	/// path string.
	pub fn is_ignored(&self, path: &Path) -> bool {
		if self.ignore_patterns.is_empty() {
			return false;
		}

		let path_str = path.to_string_lossy();
		for pattern in &self.ignore_patterns {
			if pattern.is_match(&path_str) {
				return true;
			}
		}

		for component in path.components() {
			if let Component::Normal(segment) = component {
				let segment = segment.to_string_lossy();
				if self.ignore_patterns.iter().any(|p| p.is_match(&segment)) {
					return true;
				}
			}
		}

		false
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::path::PathBuf;

	fn strings(items: &[&str]) -> Vec<String> {
		items.iter().map(|s| s.to_string()).collect()
	}

	#[test]
	fn test_trackable_extensions() {
		let filter = PathFilter::new(&strings(&[".py", ".txt"]), &[]);

		assert!(filter.is_trackable(Path::new("/path/to/file.py")));
		assert!(filter.is_trackable(Path::new("/path/to/file.txt")));
		assert!(filter.is_trackable(Path::new("/path/to/FILE.PY")));

		assert!(!filter.is_trackable(Path::new("/path/to/file.jpg")));
		assert!(!filter.is_trackable(Path::new("/path/to/noext")));
	}

	#[test]
	fn test_empty_allow_list_tracks_everything() {
		let filter = PathFilter::new(&[], &[]);
		assert!(filter.is_trackable(Path::new("/anything.xyz")));
		assert!(filter.is_trackable(Path::new("/no_extension")));
	}

	#[test]
	fn test_extensions_normalized_without_dot() {
		let filter = PathFilter::new(&strings(&["blend"]), &[]);
		assert!(filter.is_trackable(Path::new("/scene.blend")));
		assert!(!filter.is_trackable(Path::new("/scene.py")));
	}

	#[test]
	fn test_ignored_segments() {
		let filter = PathFilter::new(&[], &strings(&["__pycache__", r"\.git"]));

		assert!(filter.is_ignored(Path::new("/project/__pycache__/mod.py")));
		assert!(filter.is_ignored(Path::new("/project/.git/objects/ab")));
		assert!(!filter.is_ignored(Path::new("/project/src/mod.py")));
	}

	#[test]
	fn test_ignored_full_path_patterns() {
		let filter = PathFilter::new(&[], &strings(&[r".*\.blend[0-9]+$", r".*\.blend@$"]));

		assert!(filter.is_ignored(Path::new("/assets/scene.blend1")));
		assert!(filter.is_ignored(Path::new("/assets/scene.blend9")));
		assert!(filter.is_ignored(Path::new("/assets/scene.blend@")));
		assert!(!filter.is_ignored(Path::new("/assets/scene.blend")));
	}

	#[test]
	fn test_malformed_pattern_skipped() {
		// The broken bracket expression is dropped; the valid pattern still applies
		let filter = PathFilter::new(&[], &strings(&["[invalid", "__pycache__"]));

		assert!(filter.is_ignored(Path::new("/a/__pycache__/x.py")));
		assert!(!filter.is_ignored(PathBuf::from("/a/src/x.py").as_path()));
	}
}
