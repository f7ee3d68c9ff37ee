//! Date-partitioned JSONL output for the `jsonl` sink
//!
//! Batches arrive from a [`ChannelConsumer`](mdstream_middleware::ChannelConsumer)
//! and are written one line per batch to `<base>/<date>/<broker>.<pipeline>.jsonl`.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use mdstream_middleware::ConsumerMessage;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct JsonlSink {
    base_dir: PathBuf,
    current_date: String,
    writers: HashMap<String, BufWriter<File>>,
}

impl JsonlSink {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            current_date: String::new(),
            writers: HashMap::new(),
        }
    }

    pub fn write(&mut self, msg: &ConsumerMessage) -> Result<(), SinkError> {
        // Wall-clock timestamp at I/O boundary
        let now = chrono::Utc::now();
        let date = now.format("%Y-%m-%d").to_string();

        // Rotate all files when the date changes
        if date != self.current_date {
            self.flush()?;
            self.writers.clear();
            fs::create_dir_all(self.base_dir.join(&date))?;
            self.current_date = date;
        }

        let name = format!("{}.{}", msg.broker, msg.pipeline);
        let writer = match self.writers.entry(name) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let path = self
                    .base_dir
                    .join(&self.current_date)
                    .join(format!("{}.jsonl", entry.key()));
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                entry.insert(BufWriter::new(file))
            }
        };

        // Payload is already a JSON array, written through unchanged
        write!(
            writer,
            "{{\"ts\":\"{}\",\"broker\":\"{}\",\"pipeline\":\"{}\",\"data\":",
            now.to_rfc3339(),
            msg.broker,
            msg.pipeline
        )?;
        writer.write_all(&msg.payload)?;
        writeln!(writer, "}}")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), SinkError> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Drain `rx` into `sink` until every sender is dropped
pub async fn run_sink(mut sink: JsonlSink, mut rx: mpsc::Receiver<ConsumerMessage>) {
    let mut flush = interval(FLUSH_INTERVAL);
    flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(msg) = msg else {
                    break;
                };
                if let Err(e) = sink.write(&msg) {
                    error!(broker = %msg.broker, pipeline = %msg.pipeline, error = %e, "Failed to write batch");
                }
            }
            _ = flush.tick() => {
                if let Err(e) = sink.flush() {
                    error!(error = %e, "Failed to flush JSONL sink");
                }
            }
        }
    }

    if let Err(e) = sink.flush() {
        error!(error = %e, "Failed to flush JSONL sink");
    }
    info!(path = %sink.base_dir.display(), "JSONL sink closed");
}
