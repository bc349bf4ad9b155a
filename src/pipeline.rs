use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::aggregator::{Aggregate, Aggregator, FailurePolicy, WorkerEvent};
use crate::error::{CountError, Result, RunError};
use crate::record::{RecordParser, DEFAULT_FIELD};
use crate::top_k::{top_k, RankedEntry};
use crate::worker::{CountingWorker, Transport};

pub const DEFAULT_SUFFIXES: &[&str] = &[".jsonl", ".jsonl.gz", ".json.gz", ".ndjson"];
pub const DEFAULT_TOP_K: usize = 10;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Everything a run needs, fixed before it starts.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub suffixes: Vec<String>,
    pub field: String,
    pub top_k: usize,
    pub transport: Transport,
    /// Upper bound on concurrently counting workers
    pub max_workers: usize,
    pub channel_capacity: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            input_dir: PathBuf::from("data"),
            suffixes: DEFAULT_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            field: DEFAULT_FIELD.to_owned(),
            top_k: DEFAULT_TOP_K,
            transport: Transport::default(),
            max_workers: 4,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        PipelineConfig {
            input_dir: input_dir.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(RunError::Config("worker count must be at least 1".into()));
        }
        if self.channel_capacity == 0 {
            return Err(RunError::Config("channel capacity must be at least 1".into()));
        }
        if self.transport == Transport::Chunked(0) {
            return Err(RunError::Config("chunk size must be at least 1".into()));
        }
        if self.suffixes.is_empty() {
            return Err(RunError::Config("no input suffixes given".into()));
        }
        Ok(())
    }
}

/// Result of a successful run
#[derive(Debug)]
pub struct RunReport {
    pub ranked: Vec<RankedEntry>,
    pub files: usize,
    pub lines: u64,
    pub parsed: u64,
    pub malformed: u64,
    pub distinct: usize,
    pub elapsed: Duration,
}

/// Regular files directly inside `dir` whose names end in one of
/// `suffixes`, sorted by path.
pub fn discover_inputs(dir: &Path, suffixes: &[String]) -> Result<Vec<PathBuf>> {
    let discovery_error = |source| RunError::Discovery {
        path: dir.to_owned(),
        source,
    };

    let mut inputs = Vec::new();
    for entry in fs::read_dir(dir).map_err(discovery_error)? {
        let entry = entry.map_err(discovery_error)?;
        let path = entry.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };
        if !suffixes.iter().any(|suffix| name.ends_with(suffix.as_str())) {
            continue;
        }
        // follows symlinks
        if fs::metadata(&path).map(|m| m.is_file()).unwrap_or(false) {
            inputs.push(path);
        }
    }
    inputs.sort();
    Ok(inputs)
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Pipeline { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Counts every input file and ranks the merged table.
    pub async fn run(&self) -> Result<RunReport> {
        let start = Instant::now();
        let inputs = discover_inputs(&self.config.input_dir, &self.config.suffixes)?;
        info!(
            "counting \"{}\" in {} files from {} ({} workers max)",
            self.config.field,
            inputs.len(),
            self.config.input_dir.display(),
            self.config.max_workers
        );

        let files = inputs.len();
        let cancel = CancellationToken::new();
        let result = self.count_files(inputs, cancel.clone()).await;
        // stops stragglers on failure, no-op after success
        cancel.cancel();
        let aggregate = result?;

        let ranked = top_k(&aggregate.frequency, self.config.top_k);
        let report = RunReport {
            ranked,
            files,
            lines: aggregate.totals.lines,
            parsed: aggregate.totals.parsed,
            malformed: aggregate.totals.malformed,
            distinct: aggregate.frequency.len(),
            elapsed: start.elapsed(),
        };
        info!(
            "{} lines, {} counted, {} malformed, {} distinct in {:?}",
            report.lines, report.parsed, report.malformed, report.distinct, report.elapsed
        );
        Ok(report)
    }

    /// Synchronous entry point on a fresh multi-thread runtime.
    pub fn run_blocking(&self) -> Result<RunReport> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("artist-count")
            .build()
            .map_err(RunError::Runtime)?;
        runtime.block_on(self.run())
    }

    async fn count_files(
        &self,
        inputs: Vec<PathBuf>,
        cancel: CancellationToken,
    ) -> Result<Aggregate> {
        let (tx, mut rx) = mpsc::channel::<WorkerEvent>(self.config.channel_capacity);
        let permits = Arc::new(Semaphore::new(self.config.max_workers));
        let parser = RecordParser::new(self.config.field.clone());

        for (file, path) in inputs.iter().enumerate() {
            let worker = CountingWorker::new(path.clone(), parser.clone(), self.config.transport)
                .with_cancellation(cancel.clone());
            tokio::spawn(supervise(file, worker, tx.clone(), Arc::clone(&permits), cancel.clone()));
        }
        drop(tx);

        let mut aggregator = Aggregator::new(inputs, self.config.failure_policy);
        while !aggregator.is_complete() {
            let event = match rx.recv().await {
                Some(event) => event,
                None => break,
            };
            if let Err(e) = aggregator.accept(event) {
                info!("cancelling outstanding workers");
                cancel.cancel();
                return Err(e);
            }
        }
        aggregator.finish()
    }
}

/// Runs one worker once a pool permit is free and reports how it ended.
async fn supervise(
    file: usize,
    worker: CountingWorker,
    tx: mpsc::Sender<WorkerEvent>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
) {
    let _permit = tokio::select! {
        permit = permits.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return,
        },
        _ = cancel.cancelled() => return,
    };

    let path = worker.path().to_owned();
    debug!("starting worker #{} for {}", file, path.display());
    let chunk_tx = tx.clone();
    let handle = tokio::task::spawn_blocking(move || {
        let path = worker.path().to_owned();
        worker.run(|chunk| {
            chunk_tx
                .blocking_send(WorkerEvent::Chunk { file, chunk })
                .map_err(|_| CountError::Cancelled { path: path.clone() })
        })
    });

    let event = match handle.await {
        Ok(Ok(summary)) => WorkerEvent::Finished { file, summary },
        Ok(Err(error)) => WorkerEvent::Failed { file, error },
        Err(join_error) => WorkerEvent::Failed {
            file,
            error: CountError::WorkerFailure {
                path,
                reason: panic_reason(join_error),
            },
        },
    };
    // receiver is gone once the run has been decided
    let _ = tx.send(event).await;
}

fn panic_reason(join_error: tokio::task::JoinError) -> String {
    if !join_error.is_panic() {
        return join_error.to_string();
    }
    let payload = join_error.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {}", msg)
    } else {
        "panicked".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn test_discovery_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in &["b.jsonl", "a.jsonl.gz", "notes.txt", "c.json", "d.ndjson"] {
            File::create(dir.path().join(name)).unwrap();
        }
        fs::create_dir(dir.path().join("nested.jsonl")).unwrap();

        let found = discover_inputs(dir.path(), &PipelineConfig::default().suffixes).unwrap();
        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jsonl.gz", "b.jsonl", "d.ndjson"]);
    }

    #[test]
    fn test_missing_directory_is_discovery_error() {
        let result = discover_inputs(Path::new("/nonexistent/input"), &["jsonl".to_owned()]);
        assert!(matches!(result, Err(RunError::Discovery { .. })));
    }

    #[tokio::test]
    async fn test_panic_reason_keeps_message() {
        let handle = tokio::task::spawn_blocking(|| -> u64 { panic!("decoder exploded") });
        let reason = panic_reason(handle.await.unwrap_err());
        assert_eq!(reason, "panicked: decoder exploded");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = PipelineConfig::new("data");
        config.transport = Transport::Chunked(0);
        assert!(matches!(Pipeline::new(config), Err(RunError::Config(_))));

        let mut config = PipelineConfig::new("data");
        config.max_workers = 0;
        assert!(matches!(Pipeline::new(config), Err(RunError::Config(_))));

        let mut config = PipelineConfig::new("data");
        config.channel_capacity = 0;
        assert!(matches!(Pipeline::new(config), Err(RunError::Config(_))));
    }
}
