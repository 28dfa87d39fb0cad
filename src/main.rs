use clap::Parser;
use movewatch::{DirectoryWatcher, EventSink, JsonLinesSink, LogSink, WatchConfig};
use std::path::PathBuf;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "movewatch")]
#[command(about = "Watches a directory tree and reports logical file moves and renames")]
struct Cli {
	/// Path to watch
	#[arg(short, long)]
	path: PathBuf,

	/// TOML configuration file
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// Append detected events to this JSON-lines file
	#[arg(short, long)]
	output: Option<PathBuf>,

	/// Enable verbose logging
	#[arg(short, long)]
	verbose: bool,

	/// Watch subdirectories recursively
	#[arg(short, long, default_value_t = true)]
	recursive: bool,

	/// Correlation window for delete/create matching, in seconds
	#[arg(short, long)]
	timeout: Option<f64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	let mut config = match &cli.config {
		Some(path) => WatchConfig::load(path)?,
		None => WatchConfig::default(),
	};
	config.recursive = cli.recursive;
	if let Some(secs) = cli.timeout {
		config.correlation_window_secs = secs;
	}
	if cli.output.is_some() {
		config.output = cli.output.clone();
	}

	let level = if cli.verbose {
		Level::DEBUG
	} else {
		config.log_level.parse().unwrap_or(Level::INFO)
	};
	tracing_subscriber::fmt().with_max_level(level).init();

	info!("Starting movewatch for path: {:?}", cli.path);

	let sink: Box<dyn EventSink> = match &config.output {
		Some(path) => Box::new(vec![
			Box::new(LogSink) as Box<dyn EventSink>,
			Box::new(JsonLinesSink::create(path)?),
		]),
		None => Box::new(LogSink),
	};

	let mut watcher = DirectoryWatcher::new(cli.path, config, sink)?;
	watcher.start()?;

	tokio::signal::ctrl_c().await?;
	info!("Shutting down...");
	watcher.stop().await;

	Ok(())
}
