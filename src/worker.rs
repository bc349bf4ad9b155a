use std::mem;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, trace, warn};
use tokio_util::sync::CancellationToken;

use crate::error::CountError;
use crate::freq_table::{count_identifier, Chunk, FreqTable};
use crate::line_source::{Line, LineSource};
use crate::log_histogram::LogHistogram;
use crate::record::RecordParser;

/// Successful increments after which a worker hands its table over.
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// How a worker delivers its counts to the aggregator.
///
/// Both variants yield the same merged totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// A chunk after every `n` successful increments, then the remainder
    Chunked(usize),
    /// A single chunk at end of stream
    WholeFile,
}

impl Default for Transport {
    fn default() -> Self {
        Transport::Chunked(DEFAULT_CHUNK_SIZE)
    }
}

impl Transport {
    fn threshold(self) -> Option<u64> {
        match self {
            Transport::Chunked(n) => Some(n.max(1) as u64),
            Transport::WholeFile => None,
        }
    }
}

/// Per-file tallies reported when a worker completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub lines: u64,
    pub parsed: u64,
    pub malformed: u64,
    pub chunks: u64,
}

/// Counts one file end to end.
pub struct CountingWorker {
    path: PathBuf,
    parser: RecordParser,
    transport: Transport,
    cancel: CancellationToken,
}

impl CountingWorker {
    pub fn new(path: impl Into<PathBuf>, parser: RecordParser, transport: Transport) -> Self {
        CountingWorker {
            path: path.into(),
            parser,
            transport,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the file and counts it, handing every chunk to `emit`.
    ///
    /// An error from `emit` stops the worker; chunks already emitted stay
    /// emitted.
    pub fn run<F>(self, emit: F) -> Result<WorkerSummary, CountError>
    where
        F: FnMut(Chunk) -> Result<(), CountError>,
    {
        if self.cancel.is_cancelled() {
            return Err(CountError::Cancelled { path: self.path });
        }
        let source = LineSource::open(&self.path)?;
        self.count_lines(source, emit)
    }

    pub fn count_lines<I, F>(&self, lines: I, mut emit: F) -> Result<WorkerSummary, CountError>
    where
        I: IntoIterator<Item = Result<Line, CountError>>,
        F: FnMut(Chunk) -> Result<(), CountError>,
    {
        debug!("counting {}", self.path.display());
        let threshold = self.transport.threshold();
        let mut summary = WorkerSummary::default();
        let mut frequency = FreqTable::new();
        let mut since_chunk: u64 = 0;
        let mut emit_hist = LogHistogram::new();

        for line in lines {
            if self.cancel.is_cancelled() {
                debug!("cancelled while counting {}", self.path.display());
                return Err(CountError::Cancelled {
                    path: self.path.clone(),
                });
            }
            let line = line?;
            summary.lines += 1;

            let parsed = line.as_str().and_then(|text| self.parser.parse(text));
            match parsed {
                Ok(identifier) => {
                    count_identifier(&mut frequency, identifier);
                    summary.parsed += 1;
                    since_chunk += 1;
                }
                Err(e) => {
                    summary.malformed += 1;
                    warn!(
                        "{}:{}: skipping malformed line {:?}: {}",
                        self.path.display(),
                        line.number,
                        String::from_utf8_lossy(&line.bytes),
                        e
                    );
                    continue;
                }
            }

            if threshold == Some(since_chunk) {
                self.emit_chunk(&mut frequency, &mut emit, &mut summary, &mut emit_hist)?;
                since_chunk = 0;
            }
        }

        if !frequency.is_empty() {
            self.emit_chunk(&mut frequency, &mut emit, &mut summary, &mut emit_hist)?;
        }

        emit_hist.log_stats(&format!("emit {}", self.path.display()));
        debug!(
            "finished {}: {} lines, {} counted, {} malformed, {} chunks",
            self.path.display(),
            summary.lines,
            summary.parsed,
            summary.malformed,
            summary.chunks
        );
        Ok(summary)
    }

    fn emit_chunk<F>(
        &self,
        frequency: &mut FreqTable,
        emit: &mut F,
        summary: &mut WorkerSummary,
        emit_hist: &mut LogHistogram,
    ) -> Result<(), CountError>
    where
        F: FnMut(Chunk) -> Result<(), CountError>,
    {
        let chunk = mem::take(frequency);
        trace!(
            "{}: chunk {} with {} identifiers",
            self.path.display(),
            summary.chunks,
            chunk.len()
        );
        let start = Instant::now();
        emit(chunk)?;
        emit_hist.sample_now(&start);
        summary.chunks += 1;
        Ok(())
    }
}
