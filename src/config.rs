use crate::error::{Result, WatchError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Watcher configuration, loadable from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
	/// File extensions to track (dot-prefixed, case-insensitive)
	pub extensions: Vec<String>,
	/// Regex patterns for paths to ignore
	pub ignore_dirs: Vec<String>,
	pub log_level: String,
	/// Maximum delete-to-create gap treated as one logical move (seconds)
	pub correlation_window_secs: f64,
	/// Background index rescan cadence; 0 disables the rescan loop
	pub index_rescan_interval_secs: u64,
	/// The index keeps its own recent-event window, independent of the
	/// correlator's
	pub index_correlation_window_secs: f64,
	pub recursive: bool,
	/// Optional JSON-lines activity log
	pub output: Option<PathBuf>,
}

impl Default for WatchConfig {
	fn default() -> Self {
		Self {
			extensions: [".blend", ".py", ".txt", ".json", ".toml"]
				.map(String::from)
				.to_vec(),
			ignore_dirs: [
				r"\.git",
				"__pycache__",
				r"\.venv",
				r".*\.blend[0-9]+$",
				r".*\.blend@$",
			]
			.map(String::from)
			.to_vec(),
			log_level: "info".to_string(),
			correlation_window_secs: 3.0,
			index_rescan_interval_secs: 300,
			index_correlation_window_secs: 10.0,
			recursive: true,
			output: None,
		}
	}
}

impl WatchConfig {
	pub fn correlation_window(&self) -> Duration {
		Duration::from_secs_f64(self.correlation_window_secs)
	}

	pub fn index_rescan_interval(&self) -> Duration {
		Duration::from_secs(self.index_rescan_interval_secs)
	}

	pub fn index_correlation_window(&self) -> Duration {
		Duration::from_secs_f64(self.index_correlation_window_secs)
	}

	pub fn validate(&self) -> Result<()> {
		if self.correlation_window_secs <= 0.0 {
			return Err(WatchError::Configuration {
				parameter: "correlation_window_secs".to_string(),
				reason: "must be positive".to_string(),
			});
		}
		if self.index_correlation_window_secs <= 0.0 {
			return Err(WatchError::Configuration {
				parameter: "index_correlation_window_secs".to_string(),
				reason: "must be positive".to_string(),
			});
		}
		Ok(())
	}

	/// Load from a TOML file. Settings may sit at the top level or nested
	/// under a `[movewatch]` table.
	pub fn load(path: &Path) -> Result<Self> {
		let raw = std::fs::read_to_string(path)?;
		let value: toml::Value = raw.parse()?;
		let table = match value.get("movewatch") {
			Some(nested) => nested.clone(),
			None => value,
		};
		let config: WatchConfig = table.try_into()?;
		config.validate()?;
		Ok(config)
	}
}
