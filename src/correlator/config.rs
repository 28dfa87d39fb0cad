use std::time::Duration;

/// Tunables for the correlation engine.
#[derive(Debug, Clone)]
pub struct CorrelatorConfig {
	/// Maximum delete-to-create gap treated as one logical move
	pub correlation_window: Duration,
	/// How long an emitted move keeps suppressing raw notifications for its
	/// paths
	pub processed_marker_ttl: Duration,
	/// Lookback for chaining a create onto a previously emitted move
	pub chain_window: Duration,
	/// Cap on remembered directory-level moves; the oldest half is evicted
	/// once the table grows past it
	pub max_directory_moves: usize,
	/// Size slack when matching a create against a pending deletion (bytes)
	pub size_tolerance: u64,
}

impl Default for CorrelatorConfig {
	fn default() -> Self {
		Self::with_window(Duration::from_secs(3))
	}
}

impl CorrelatorConfig {
	/// Derive the dependent windows from the correlation window: markers
	/// must outlive the chain lookback that consults them.
	pub fn with_window(correlation_window: Duration) -> Self {
		Self {
			correlation_window,
			processed_marker_ttl: correlation_window * 3,
			chain_window: correlation_window * 2,
			max_directory_moves: 16,
			size_tolerance: 1024,
		}
	}

	pub fn validate(&self) -> Result<(), String> {
		if self.correlation_window.is_zero() {
			return Err("correlation_window must be positive".to_string());
		}
		if self.processed_marker_ttl < self.chain_window {
			return Err("processed_marker_ttl must cover the chain window".to_string());
		}
		if self.max_directory_moves == 0 {
			return Err("max_directory_moves must be greater than 0".to_string());
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_windows_derive_from_correlation_window() {
		let config = CorrelatorConfig::with_window(Duration::from_secs(2));
		assert_eq!(config.chain_window, Duration::from_secs(4));
		assert_eq!(config.processed_marker_ttl, Duration::from_secs(6));
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_validate_rejects_bad_values() {
		let mut config = CorrelatorConfig::default();
		config.correlation_window = Duration::ZERO;
		assert!(config.validate().is_err());

		let mut config = CorrelatorConfig::default();
		config.processed_marker_ttl = Duration::from_millis(1);
		assert!(config.validate().is_err());

		let mut config = CorrelatorConfig::default();
		config.max_directory_moves = 0;
		assert!(config.validate().is_err());
	}
}
