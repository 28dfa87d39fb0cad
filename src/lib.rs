mod config;
mod correlator;
mod error;
mod events;
mod filter;
mod index;
mod sink;
mod watcher;

pub use config::WatchConfig;
pub use correlator::engine::PendingSummary;
pub use correlator::{CorrelatorConfig, MoveCorrelator};
pub use error::{Result, WatchError};
pub use events::{
	classify_move, DetectionMethod, EntryKind, MoveEvent, MoveKind, UnmatchedEvent, UnmatchedKind,
};
pub use filter::PathFilter;
pub use index::{FileIndex, IndexSummary, TrackedFile};
pub use sink::{ChannelSink, EventSink, JsonLinesSink, LogSink, MemorySink, SinkRecord};
pub use watcher::DirectoryWatcher;
