use crate::config::WatchConfig;
use crate::correlator::{CorrelatorConfig, MoveCorrelator};
use crate::error::{Result, WatchError};
use crate::filter::PathFilter;
use crate::index::FileIndex;
use crate::sink::EventSink;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Bound on waiting for the notification pump after the watch closes.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the OS watch, the snapshot index, and the correlation engine.
///
/// Thin glue only: raw notify events are mapped onto the correlator entry
/// points and everything else happens in the engine.
pub struct DirectoryWatcher {
	config: WatchConfig,
	root: PathBuf,
	index: Arc<FileIndex>,
	correlator: Arc<MoveCorrelator>,
	watcher: Option<RecommendedWatcher>,
	pump: Option<tokio::task::JoinHandle<()>>,
}

impl DirectoryWatcher {
	pub fn new(root: impl Into<PathBuf>, config: WatchConfig, sink: Box<dyn EventSink>) -> Result<Self> {
		config.validate()?;
		let root = root.into();
		let filter = PathFilter::new(&config.extensions, &config.ignore_dirs);
		let index = Arc::new(FileIndex::new(
			root.clone(),
			filter.clone(),
			config.index_rescan_interval(),
			config.index_correlation_window(),
		));
		let correlator = Arc::new(MoveCorrelator::new(
			CorrelatorConfig::with_window(config.correlation_window()),
			filter,
			Arc::clone(&index),
			sink,
		));
		Ok(Self {
			config,
			root,
			index,
			correlator,
			watcher: None,
			pump: None,
		})
	}

	pub fn correlator(&self) -> &Arc<MoveCorrelator> {
		&self.correlator
	}

	pub fn index(&self) -> &Arc<FileIndex> {
		&self.index
	}

	pub fn start(&mut self) -> Result<()> {
		if !self.root.exists() {
			return Err(WatchError::InvalidPath {
				path: self.root.to_string_lossy().into_owned(),
			});
		}

		info!(
			"Starting watch on {:?} (recursive: {})",
			self.root, self.config.recursive
		);

		// Index first, so the correlator has a snapshot to consult
		self.index.start();

		let (notify_tx, notify_rx) = mpsc::channel();
		let mut watcher = RecommendedWatcher::new(
			notify_tx,
			NotifyConfig::default().with_poll_interval(Duration::from_millis(100)),
		)?;
		let mode = if self.config.recursive {
			RecursiveMode::Recursive
		} else {
			RecursiveMode::NonRecursive
		};
		watcher.watch(&self.root, mode)?;
		self.watcher = Some(watcher);

		// Notify delivers over std mpsc, so the pump runs on a blocking thread
		let correlator = Arc::clone(&self.correlator);
		self.pump = Some(tokio::task::spawn_blocking(move || {
			for result in notify_rx {
				match result {
					Ok(event) => dispatch_notify_event(&correlator, event),
					Err(e) => error!("Notify error: {}", e),
				}
			}
			debug!("Notification pump stopped");
		}));

		Ok(())
	}

	/// Stop watching: close the notify channel, drain the pump, flush the
	/// engine's pending state, stop the index.
	pub async fn stop(&mut self) {
		info!("Stopping watch on {:?}", self.root);

		// Dropping the watcher closes the channel, which ends the pump
		self.watcher = None;
		if let Some(pump) = self.pump.take() {
			if tokio::time::timeout(STOP_TIMEOUT, pump).await.is_err() {
				warn!("Timed out waiting for the notification pump to stop");
			}
		}

		self.correlator.flush();
		self.index.stop().await;
	}

	pub fn is_watching(&self) -> bool {
		self.watcher.is_some()
	}
}

/// Map one raw notification onto the correlator entry points.
fn dispatch_notify_event(correlator: &MoveCorrelator, event: Event) {
	use notify::event::{ModifyKind, RenameMode};

	match event.kind {
		EventKind::Create(_) => {
			for path in &event.paths {
				correlator.on_create(path, is_directory(path));
			}
		}
		EventKind::Remove(_) => {
			for path in &event.paths {
				correlator.on_delete(path, is_directory(path));
			}
		}
		EventKind::Modify(ModifyKind::Name(mode)) => match mode {
			RenameMode::Both if event.paths.len() == 2 => {
				let new_path = &event.paths[1];
				correlator.on_direct_move(&event.paths[0], new_path, is_directory(new_path));
			}
			// One-sided renames degrade to delete/create and go through
			// correlation like any other pair
			RenameMode::From => {
				for path in &event.paths {
					correlator.on_delete(path, is_directory(path));
				}
			}
			RenameMode::To => {
				for path in &event.paths {
					correlator.on_create(path, is_directory(path));
				}
			}
			_ => debug!("Ignoring unpaired rename notification: {:?}", event),
		},
		_ => {}
	}
}

/// Whether the path is (or, if already gone, likely was) a directory.
fn is_directory(path: &Path) -> bool {
	match std::fs::metadata(path) {
		Ok(metadata) => metadata.is_dir(),
		// Removed paths cannot be statted; no extension is the best guess left
		Err(_) => path.extension().is_none(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sink::MemorySink;
	use tempfile::TempDir;

	fn test_config() -> WatchConfig {
		WatchConfig {
			extensions: vec![".blend".to_string()],
			index_rescan_interval_secs: 0,
			..Default::default()
		}
	}

	#[tokio::test]
	async fn test_start_stop_lifecycle() {
		let root = TempDir::new().unwrap();
		let sink = MemorySink::new();
		let mut watcher =
			DirectoryWatcher::new(root.path(), test_config(), Box::new(sink)).unwrap();

		assert!(!watcher.is_watching());
		watcher.start().unwrap();
		assert!(watcher.is_watching());
		watcher.stop().await;
		assert!(!watcher.is_watching());
	}

	#[tokio::test]
	async fn test_start_rejects_missing_path() {
		let sink = MemorySink::new();
		let mut watcher = DirectoryWatcher::new(
			PathBuf::from("/definitely/not/a/real/path"),
			test_config(),
			Box::new(sink),
		)
		.unwrap();

		assert!(matches!(
			watcher.start(),
			Err(WatchError::InvalidPath { .. })
		));
	}

	#[test]
	fn test_new_rejects_invalid_config() {
		let config = WatchConfig {
			correlation_window_secs: -1.0,
			..Default::default()
		};
		let result = DirectoryWatcher::new(
			PathBuf::from("/tmp"),
			config,
			Box::new(MemorySink::new()),
		);
		assert!(result.is_err());
	}

	#[test]
	fn test_is_directory_heuristic_for_missing_paths() {
		assert!(is_directory(Path::new("/gone/some_dir")));
		assert!(!is_directory(Path::new("/gone/file.blend")));
	}
}
