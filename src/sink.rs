use crate::error::Result;
use crate::events::{MoveEvent, UnmatchedEvent, UnmatchedKind};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One record as the sink sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkRecord {
	Move(MoveEvent),
	Unmatched(UnmatchedEvent),
}

/// Receives the engine's output in emission order.
pub trait EventSink: Send {
	fn on_move(&mut self, event: &MoveEvent);
	fn on_unmatched(&mut self, event: &UnmatchedEvent);
}

/// Fan out to several sinks in order.
impl EventSink for Vec<Box<dyn EventSink>> {
	fn on_move(&mut self, event: &MoveEvent) {
		for sink in self.iter_mut() {
			sink.on_move(event);
		}
	}

	fn on_unmatched(&mut self, event: &UnmatchedEvent) {
		for sink in self.iter_mut() {
			sink.on_unmatched(event);
		}
	}
}

/// Collects records in memory. Clones share the same buffer, so a handle
/// kept by the caller observes everything the engine emits.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
	records: Arc<Mutex<Vec<SinkRecord>>>,
}

impl MemorySink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn records(&self) -> Vec<SinkRecord> {
		self.records.lock().clone()
	}

	pub fn moves(&self) -> Vec<MoveEvent> {
		self.records
			.lock()
			.iter()
			.filter_map(|record| match record {
				SinkRecord::Move(event) => Some(event.clone()),
				SinkRecord::Unmatched(_) => None,
			})
			.collect()
	}

	pub fn unmatched(&self) -> Vec<UnmatchedEvent> {
		self.records
			.lock()
			.iter()
			.filter_map(|record| match record {
				SinkRecord::Unmatched(event) => Some(event.clone()),
				SinkRecord::Move(_) => None,
			})
			.collect()
	}

	pub fn clear(&self) {
		self.records.lock().clear();
	}
}

impl EventSink for MemorySink {
	fn on_move(&mut self, event: &MoveEvent) {
		self.records.lock().push(SinkRecord::Move(event.clone()));
	}

	fn on_unmatched(&mut self, event: &UnmatchedEvent) {
		self.records
			.lock()
			.push(SinkRecord::Unmatched(event.clone()));
	}
}

/// Forwards records over an unbounded channel to an async consumer.
pub struct ChannelSink {
	tx: mpsc::UnboundedSender<SinkRecord>,
}

impl ChannelSink {
	pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkRecord>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(Self { tx }, rx)
	}
}

impl EventSink for ChannelSink {
	fn on_move(&mut self, event: &MoveEvent) {
		if self.tx.send(SinkRecord::Move(event.clone())).is_err() {
			debug!("Sink receiver dropped, discarding move event");
		}
	}

	fn on_unmatched(&mut self, event: &UnmatchedEvent) {
		if self.tx.send(SinkRecord::Unmatched(event.clone())).is_err() {
			debug!("Sink receiver dropped, discarding unmatched event");
		}
	}
}

/// Appends one JSON object per event, flushed per line so a crash loses at
/// most the current record.
pub struct JsonLinesSink {
	writer: BufWriter<File>,
}

impl JsonLinesSink {
	pub fn create(path: &Path) -> Result<Self> {
		let file = OpenOptions::new().create(true).append(true).open(path)?;
		Ok(Self {
			writer: BufWriter::new(file),
		})
	}

	fn write_line(&mut self, json: serde_json::Result<String>) {
		let line = match json {
			Ok(line) => line,
			Err(e) => {
				warn!("Could not serialize event: {}", e);
				return;
			}
		};
		if let Err(e) = writeln!(self.writer, "{line}").and_then(|_| self.writer.flush()) {
			warn!("Could not write activity log: {}", e);
		}
	}
}

impl EventSink for JsonLinesSink {
	fn on_move(&mut self, event: &MoveEvent) {
		self.write_line(event.to_json());
	}

	fn on_unmatched(&mut self, event: &UnmatchedEvent) {
		self.write_line(serde_json::to_string(event));
	}
}

/// Logs each record through tracing; the default CLI sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
	fn on_move(&mut self, event: &MoveEvent) {
		info!(
			"{}: {} -> {}",
			event.type_label().to_uppercase(),
			event.old_path.display(),
			event.new_path.display()
		);
	}

	fn on_unmatched(&mut self, event: &UnmatchedEvent) {
		let label = match event.kind {
			UnmatchedKind::Delete => "UNMATCHED_DELETE",
			UnmatchedKind::Create => "UNMATCHED_CREATE",
		};
		info!("{}: {}", label, event.path.display());
	}
}
