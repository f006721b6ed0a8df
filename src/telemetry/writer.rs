//! Durable latency log
//!
//! A single consumer drains the record queue in arrival order and appends one
//! comma separated row per record, flushing after every row.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::record::{CSV_COLUMNS, LatencyRecord};

/// Spreadsheet hint telling the reader which separator the file uses
const SEPARATOR_DIRECTIVE: &str = "sep=,";

pub struct LogWriter<W: Write> {
    out: W,
    rows: u64,
}

impl LogWriter<BufWriter<File>> {
    /// Creates (or truncates) the log file and writes its header
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
        Self::new(BufWriter::new(file))
            .with_context(|| format!("cannot write header to {}", path.display()))
    }
}

impl<W: Write> LogWriter<W> {
    pub fn new(mut out: W) -> std::io::Result<Self> {
        writeln!(out, "{SEPARATOR_DIRECTIVE}")?;
        writeln!(out, "{}", CSV_COLUMNS.join(","))?;
        out.flush()?;
        Ok(Self { out, rows: 0 })
    }

    pub fn write_record(&mut self, record: &LatencyRecord) -> std::io::Result<()> {
        writeln!(self.out, "{}", record.csv_row())?;
        self.out.flush()?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Blocks on the queue until every sender is gone and the queue is empty.
    ///
    /// Returns the number of rows written. Must not be called from an async context.
    pub fn run(mut self, mut rx: mpsc::Receiver<LatencyRecord>) -> Result<u64> {
        while let Some(record) = rx.blocking_recv() {
            self.write_record(&record)
                .with_context(|| format!("failed to log frame {}", record.frame_id))?;
        }
        info!("latency log closed after {} rows", self.rows);
        Ok(self.rows)
    }
}

impl<W: Write + Send + 'static> LogWriter<W> {
    /// Runs the writer on the blocking thread pool
    pub fn spawn(self, rx: mpsc::Receiver<LatencyRecord>) -> JoinHandle<Result<u64>> {
        tokio::task::spawn_blocking(move || self.run(rx))
    }
}
