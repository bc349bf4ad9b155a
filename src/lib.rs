//! Parallel top-K counting of an identifier field across a directory of
//! (optionally gzip compressed) JSON-lines files.
//!
//! One worker per file streams its lines, counts the identifier into a
//! local table and hands it over in bounded chunks through a bounded
//! channel. A single aggregator merges the chunks; the top-K selector ranks
//! the merged table.
//!
//! ```no_run
//! use artist_count::{Pipeline, PipelineConfig};
//!
//! let mut config = PipelineConfig::new("data/hard");
//! config.top_k = 5;
//! let report = Pipeline::new(config)?.run_blocking()?;
//! for entry in &report.ranked {
//!     println!("{} {}", entry.identifier, entry.count);
//! }
//! # Ok::<(), artist_count::RunError>(())
//! ```

pub mod aggregator;
pub mod error;
pub mod freq_table;
pub mod line_source;
mod log_histogram;
pub mod logging;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod top_k;
pub mod util;
pub mod worker;

pub use crate::aggregator::{Aggregate, Aggregator, FailurePolicy, WorkerEvent};
pub use crate::error::{CountError, ParseError, RunError};
pub use crate::freq_table::{Chunk, FreqTable};
pub use crate::line_source::{Line, LineSource};
pub use crate::log_histogram::LogHistogram;
pub use crate::pipeline::{discover_inputs, Pipeline, PipelineConfig, RunReport};
pub use crate::record::RecordParser;
pub use crate::top_k::{top_k, RankedEntry};
pub use crate::worker::{CountingWorker, Transport, WorkerSummary};
