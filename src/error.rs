use thiserror::Error;

pub type Result<T> = std::result::Result<T, WatchError>;

/// Errors surfaced by the watcher lifecycle and the configuration layer.
///
/// The correlation engine itself never fails outward: stat failures,
/// malformed ignore patterns, and rescan errors all degrade to "no match"
/// and are reported through logging only.
#[derive(Error, Debug)]
pub enum WatchError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Notify error: {0}")]
	Notify(#[from] notify::Error),

	#[error("JSON serialization error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("Config parse error: {0}")]
	TomlParse(#[from] toml::de::Error),

	#[error("Invalid path: {path}")]
	InvalidPath { path: String },

	#[error("Configuration error: {parameter} - {reason}")]
	Configuration { parameter: String, reason: String },

	#[error("Watcher not initialized")]
	NotInitialized,

	#[error("Operation timeout: {operation}")]
	Timeout { operation: String },
}
